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

//! Implementation of the [`Rejection`] type.

use std::fmt;

/// The reasons a [`Zone`](super::Zone) refuses to accept a record.
///
/// Rejection is a normal outcome of building a zone from remote data,
/// not a failure: the zone is left unchanged and building continues.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Rejection {
    /// The owner already has a record of this type, and the type (SOA
    /// or CNAME) allows only one.
    SingletonConflict,

    /// The owner already has a record with the same type and RDATA.
    Duplicate,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::SingletonConflict => {
                f.write_str("the owner already has a record of this single-valued type")
            }
            Self::Duplicate => {
                f.write_str("the owner already has a record with the same type and RDATA")
            }
        }
    }
}

impl std::error::Error for Rejection {}
