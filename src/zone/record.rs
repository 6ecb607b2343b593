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

//! Provides the [`Record`] structure.

use std::fmt;

use super::Ttl;
use crate::util::Caseless;

/// Record types of which an owner may have at most one record.
const SINGLETON_TYPES: [&str; 2] = ["soa", "cname"];

/// Returns whether `rr_type` names a type restricted to one record per
/// owner (SOA or CNAME). The comparison is ASCII-case-insensitive.
pub fn is_singleton_type(rr_type: &str) -> bool {
    SINGLETON_TYPES
        .iter()
        .any(|singleton| Caseless(singleton) == Caseless(rr_type))
}

/// A single resource record within a [`Zone`](super::Zone).
///
/// Records are immutable. The type and RDATA are kept in the textual
/// form in which the remote source provided them; in particular, the
/// type's case is preserved, and multi-field RDATA is a single string
/// with its fields separated by spaces. Interpreting these is left to
/// the name server that receives them.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Record {
    owner: Box<str>,
    rr_type: Box<str>,
    rdata: Box<str>,
    ttl: Ttl,
}

impl Record {
    /// Creates a new `Record`.
    pub fn new(owner: &str, rr_type: &str, rdata: &str, ttl: Ttl) -> Self {
        Self {
            owner: owner.into(),
            rr_type: rr_type.into(),
            rdata: rdata.into(),
            ttl,
        }
    }

    /// Returns the owner name of the record, relative to nothing in
    /// particular: it is whatever the remote source used.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the record type mnemonic, as received.
    pub fn rr_type(&self) -> &str {
        &self.rr_type
    }

    pub fn rdata(&self) -> &str {
        &self.rdata
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Returns whether this record's type is `rr_type`, ignoring ASCII
    /// case.
    pub fn has_type(&self, rr_type: &str) -> bool {
        Caseless(&self.rr_type) == Caseless(rr_type)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.owner, self.ttl, self.rr_type, self.rdata
        )
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
