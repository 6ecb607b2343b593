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

//! Implementation of the [`ZoneStore`] structure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::util::canonical_zone_name;
use crate::zone::Zone;

/// The published zones of an instance.
///
/// A `ZoneStore` maps zone names to [`Zone`]s and records the newest
/// `last_update` timestamp reported by the remote source. It is shared
/// between the refresher, which publishes zones, and any number of
/// threads performing lookups.
///
/// Zones are held as `Arc<Zone>` and never modified once they are in
/// the store. [`ZoneStore::replace_zone`] swaps the `Arc` for a zone
/// name under a write lock that is held only for the swap itself, so a
/// reader sees either the old zone or the new one, never a mix. A
/// reader may keep its `Arc` after the zone has been replaced.
///
/// Zone names are compared without regard to ASCII case, and a single
/// trailing dot is ignored. Owner names within zones are not
/// normalized.
#[derive(Debug, Default)]
pub struct ZoneStore {
    zones: RwLock<HashMap<String, Arc<Zone>>>,
    last_update: AtomicU64,
}

impl ZoneStore {
    /// Creates a new, initially empty `ZoneStore`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the zone named exactly `zone_name`, if any.
    pub fn get(&self, zone_name: &str) -> Option<Arc<Zone>> {
        let key = canonical_zone_name(zone_name);
        self.zones.read().unwrap().get(&key).cloned()
    }

    /// Returns whether the store has a zone named exactly `zone_name`.
    pub fn contains(&self, zone_name: &str) -> bool {
        let key = canonical_zone_name(zone_name);
        self.zones.read().unwrap().contains_key(&key)
    }

    /// Looks up the zone that is the nearest ancestor of (or equal to)
    /// `domain`, returning its name and the zone.
    ///
    /// The full name is tried first. Then the leftmost label and the dot
    /// following it are removed and the remainder is tried, and so on
    /// until no dot remains. Thus `www.example.com` finds a zone named
    /// `example.com` (or `com`) when there is no `www.example.com` zone.
    /// A name without a dot only matches a zone of exactly that name.
    pub fn lookup_by_suffix(&self, domain: &str) -> Option<(String, Arc<Zone>)> {
        let domain = canonical_zone_name(domain);
        let zones = self.zones.read().unwrap();
        let mut candidate = domain.as_str();
        loop {
            if let Some(zone) = zones.get(candidate) {
                return Some((candidate.to_owned(), zone.clone()));
            }
            match candidate.split_once('.') {
                Some((_, parent)) => candidate = parent,
                None => return None,
            }
        }
    }

    /// Installs `zone` under `zone_name`, returning the zone it
    /// replaced (if any). Other zones are not affected.
    pub fn replace_zone(&self, zone_name: &str, zone: Arc<Zone>) -> Option<Arc<Zone>> {
        let key = canonical_zone_name(zone_name);
        self.zones.write().unwrap().insert(key, zone)
    }

    /// Removes the zone named `zone_name`, returning it (if it was
    /// present).
    pub fn remove_zone(&self, zone_name: &str) -> Option<Arc<Zone>> {
        let key = canonical_zone_name(zone_name);
        self.zones.write().unwrap().remove(&key)
    }

    /// Returns the names of all zones in the store, sorted.
    pub fn zone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zones.read().unwrap().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of zones in the store.
    pub fn len(&self) -> usize {
        self.zones.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raises the last-update timestamp to `candidate`. A `candidate`
    /// older than the current timestamp is ignored.
    pub fn advance_timestamp(&self, candidate: u64) {
        self.last_update.fetch_max(candidate, Ordering::AcqRel);
    }

    /// Returns the newest `last_update` timestamp seen so far (zero
    /// before any was seen).
    pub fn last_update(&self) -> u64 {
        self.last_update.load(Ordering::Acquire)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
