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

//! Implementation of DNS zone data structures, for keeping zones
//! received from the remote source in memory.

use std::collections::HashMap;

mod error;
mod record;
mod ttl;
pub use error::Rejection;
pub use record::{is_singleton_type, Record};
pub use ttl::Ttl;

/// A DNS zone held in memory.
///
/// A `Zone` maps owner names to the [`Record`]s they own, in the order
/// in which the records were added. `Zone`s are constructed with
/// [`Zone::new`], which provides an empty structure, and subsequent
/// calls to [`Zone::add_record`] (or [`Zone::try_add_record`]). Each
/// addition is checked against two rules:
///
/// 1. An owner has at most one record of a single-valued type (SOA or
///    CNAME).
/// 2. An owner never has two records with the same type and RDATA. The
///    TTL does not count, so the first record added wins.
///
/// Record types are compared without regard to ASCII case. The record
/// type and RDATA are otherwise not validated.
///
/// Once a `Zone` has been published to a
/// [`ZoneStore`](crate::store::ZoneStore), it is only ever accessed
/// through a shared reference and thus never changes.
#[derive(Clone, Debug, Default)]
pub struct Zone {
    records: HashMap<Box<str>, Vec<Record>>,
    record_count: usize,
}

impl Zone {
    /// Creates a new, initially empty `Zone`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record to the `Zone`, returning whether it was accepted.
    /// See [`Zone::try_add_record`] for the conditions under which a
    /// record is rejected.
    pub fn add_record(&mut self, owner: &str, rr_type: &str, rdata: &str, ttl: Ttl) -> bool {
        self.try_add_record(owner, rr_type, rdata, ttl).is_ok()
    }

    /// Adds a record to the `Zone`.
    ///
    /// This fails if `rr_type` is single-valued and `owner` already has
    /// a record of that type, or if `owner` already has a record with
    /// the same type and RDATA. On failure, the `Zone` is unchanged.
    pub fn try_add_record(
        &mut self,
        owner: &str,
        rr_type: &str,
        rdata: &str,
        ttl: Ttl,
    ) -> Result<(), Rejection> {
        let existing = self.records.get(owner).map_or(&[][..], Vec::as_slice);
        if is_singleton_type(rr_type) && existing.iter().any(|r| r.has_type(rr_type)) {
            return Err(Rejection::SingletonConflict);
        }
        if existing
            .iter()
            .any(|r| r.has_type(rr_type) && r.rdata() == rdata)
        {
            return Err(Rejection::Duplicate);
        }

        self.records
            .entry(owner.into())
            .or_default()
            .push(Record::new(owner, rr_type, rdata, ttl));
        self.record_count += 1;
        Ok(())
    }

    /// Returns the records owned by `owner`, or [`None`] if there are
    /// none.
    pub fn records(&self, owner: &str) -> Option<&[Record]> {
        self.records
            .get(owner)
            .map(Vec::as_slice)
            .filter(|records| !records.is_empty())
    }

    /// Returns an iterator over the owner names that have records.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(AsRef::as_ref)
    }

    /// Returns the number of distinct owner names in the `Zone`.
    pub fn owner_count(&self) -> usize {
        self.records.len()
    }

    /// Returns the total number of records in the `Zone`.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
