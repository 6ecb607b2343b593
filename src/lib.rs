// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! An in-memory DNS zone store kept up to date from a remote source.
//!
//! A name server that embeds this crate asks it, on every incoming
//! question, whether it serves a zone and which records exist for an
//! owner name. Those questions are answered from memory. Meanwhile, a
//! background thread periodically fetches the authoritative data from a
//! remote endpoint (over HTTP, encoded as JSON), builds fresh [`Zone`]s
//! from it, and publishes them into the [`ZoneStore`].
//!
//! ## Structure
//!
//! * [`zone`] defines [`Record`]s and the [`Zone`] structure, which
//!   enforces the record-acceptance rules (at most one SOA or CNAME per
//!   owner, no exact duplicates).
//! * [`store`] provides the [`ZoneStore`], the shared map of published
//!   zones, including the closest-enclosing-zone lookup.
//! * [`source`] abstracts fetching the payload behind the
//!   [`RemoteSource`] trait. With the `http` feature (on by default),
//!   [`HttpSource`](source::HttpSource) implements it over HTTP.
//! * [`payload`] decodes the JSON payload into zones.
//! * [`refresh`] runs fetch-decode-publish cycles, once or
//!   periodically.
//! * [`thread`] manages the background thread and its shutdown.
//! * [`instance`] ties the above together into the [`Instance`] that a
//!   name server adapter talks to.
//!
//! ## Consistency
//!
//! Published zones are never modified. A refresh builds every zone from
//! scratch and then swaps it into the store under a short write lock,
//! so a lookup sees either the old zone or the new zone in full. A
//! lookup may also keep its [`Arc`](std::sync::Arc) to a zone after the
//! zone has been replaced; it simply keeps reading the old data.

pub mod instance;
pub mod payload;
pub mod refresh;
pub mod source;
pub mod store;
pub mod thread;
mod util;
pub mod zone;

pub use instance::{Answer, ConfigError, Instance, InstanceConfig, RecordSink};
pub use refresh::{RefreshOutcome, RefreshStats, Refresher};
pub use source::{RemoteSource, TransportError};
pub use store::ZoneStore;
pub use zone::{Record, Ttl, Zone};
