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

//! Decoding of the remote source's JSON payload.
//!
//! The payload is a JSON object whose keys are zone names:
//!
//! ```text
//! {
//!   "example.com": {
//!     "records": [
//!       "www A 10.0.0.1",
//!       "example.com SOA ns1.example.com admin.example.com 1 2 3 4 5"
//!     ],
//!     "last_update": 42
//!   }
//! }
//! ```
//!
//! Each record is a string of the form `<owner> <type> <rdata>`. The
//! owner and type are delimited by the first two spaces; everything
//! after the second space is the RDATA, which may itself contain
//! spaces. `last_update` is an unsigned integer. A non-negative number
//! with a fractional part is truncated; when it is absent, negative, or
//! not a number, it is taken to be zero.
//!
//! Decoding is tolerant below the top level. A `records` member that is
//! not an array contributes no records, and a record entry that is not
//! a string or lacks the two delimiters is skipped (and counted), while
//! the rest of the zone is still built.

use std::fmt;

use log::debug;
use serde_json::Value;

use crate::zone::{Ttl, Zone};

/// A zone decoded from the payload, not yet published.
#[derive(Debug)]
pub struct DecodedZone {
    pub name: String,
    pub zone: Zone,

    /// The zone's `last_update` value (zero if absent).
    pub last_update: u64,

    /// The number of record entries that could not be decoded.
    pub skipped: usize,

    /// The number of decoded records that the zone rejected (see
    /// [`Zone::try_add_record`]).
    pub rejected: usize,
}

/// Decodes `payload` into freshly built zones. Every record is given
/// the TTL `default_ttl`.
///
/// This fails only if `payload` is not JSON, or if its top level is not
/// a non-empty object. Problems within a zone never fail the decoding.
pub fn decode(payload: &[u8], default_ttl: Ttl) -> Result<Vec<DecodedZone>, ParseError> {
    let root: Value = serde_json::from_slice(payload)?;
    let zones = match root {
        Value::Object(zones) => zones,
        _ => return Err(ParseError::NotAnObject),
    };
    if zones.is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(zones
        .into_iter()
        .map(|(name, zone_info)| decode_zone(name, &zone_info, default_ttl))
        .collect())
}

/// Builds a single zone from its JSON description.
fn decode_zone(name: String, zone_info: &Value, default_ttl: Ttl) -> DecodedZone {
    let mut zone = Zone::new();
    let mut skipped = 0;
    let mut rejected = 0;

    if let Some(entries) = zone_info.get("records").and_then(Value::as_array) {
        for entry in entries {
            let fields = entry.as_str().and_then(split_record);
            let (owner, rr_type, rdata) = match fields {
                Some(fields) => fields,
                None => {
                    debug!("Skipping malformed record {} in zone {}.", entry, name);
                    skipped += 1;
                    continue;
                }
            };
            if let Err(rejection) = zone.try_add_record(owner, rr_type, rdata, default_ttl) {
                debug!(
                    "Record \"{} {} {}\" in zone {} was not added: {}.",
                    owner, rr_type, rdata, name, rejection,
                );
                rejected += 1;
            }
        }
    }

    let last_update = zone_info
        .get("last_update")
        .and_then(read_timestamp)
        .unwrap_or(0);

    DecodedZone {
        name,
        zone,
        last_update,
        skipped,
        rejected,
    }
}

/// Reads a `last_update` value. Integers are taken as is; other numbers
/// are truncated if they are finite, non-negative, and fit in a `u64`.
fn read_timestamp(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && *f < u64::MAX as f64)
            .map(|f| f as u64)
    })
}

/// Splits a record entry into its owner, type, and RDATA. Returns
/// [`None`] if the entry has fewer than two spaces, or if its owner or
/// type is empty.
pub fn split_record(entry: &str) -> Option<(&str, &str, &str)> {
    let mut fields = entry.splitn(3, ' ');
    let owner = fields.next().filter(|s| !s.is_empty())?;
    let rr_type = fields.next().filter(|s| !s.is_empty())?;
    let rdata = fields.next()?;
    Some((owner, rr_type, rdata))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error that makes a payload unusable as a whole.
#[derive(Debug)]
pub enum ParseError {
    /// The payload is not valid JSON.
    Json(serde_json::Error),

    /// The top-level JSON value is not an object.
    NotAnObject,

    /// The top-level JSON object has no members.
    Empty,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid JSON: {}", err),
            Self::NotAnObject => f.write_str("the payload is not a JSON object"),
            Self::Empty => f.write_str("the payload contains no zones"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
