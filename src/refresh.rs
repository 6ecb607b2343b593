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

//! Refreshing a [`ZoneStore`] from a [`RemoteSource`].
//!
//! A refresh cycle consists of three steps: fetching the payload,
//! decoding it into new zones, and publishing those zones. A failure in
//! either of the first two steps ends the cycle before anything is
//! published, so the store keeps serving the data of the last
//! successful cycle. Zones that the payload does not mention are left
//! alone.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::payload::{self, ParseError};
use crate::source::{RemoteSource, TransportError};
use crate::store::ZoneStore;
use crate::thread::{self, ThreadGroup};
use crate::zone::Ttl;

////////////////////////////////////////////////////////////////////////
// OUTCOMES                                                           //
////////////////////////////////////////////////////////////////////////

/// The result of a single refresh cycle.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Every zone in the payload was decoded in full and published.
    Success(RefreshStats),

    /// Every zone in the payload was published, but some record entries
    /// could not be decoded and were skipped.
    PartialSuccess(RefreshStats),

    /// The payload could not be fetched. Nothing was published.
    FetchFailed(TransportError),

    /// The payload could not be decoded. Nothing was published.
    ParseFailed(ParseError),
}

impl RefreshOutcome {
    /// Returns whether zones were published.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_) | Self::PartialSuccess(_))
    }

    /// Returns the cycle's statistics, if zones were published.
    pub fn stats(&self) -> Option<&RefreshStats> {
        match self {
            Self::Success(stats) | Self::PartialSuccess(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Counters describing a successful refresh cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RefreshStats {
    /// The number of zones published.
    pub zones: usize,

    /// The number of records in the published zones.
    pub records: usize,

    /// The number of record entries skipped because they could not be
    /// decoded.
    pub skipped: usize,

    /// The number of records the zones refused (duplicates and extra
    /// SOA or CNAME records).
    pub rejected: usize,
}

////////////////////////////////////////////////////////////////////////
// THE REFRESHER                                                      //
////////////////////////////////////////////////////////////////////////

/// Runs refresh cycles for a [`ZoneStore`].
///
/// [`Refresher::run_once`] performs one cycle. [`Refresher::start`]
/// runs cycles periodically on a background thread: it sleeps for the
/// update interval, runs a cycle, and repeats as long as the interval
/// is non-zero. Cycles never overlap, even when [`Refresher::run_once`]
/// is called from another thread while the background loop is active.
pub struct Refresher {
    store: Arc<ZoneStore>,
    source: Arc<dyn RemoteSource>,
    address: String,
    default_ttl: Ttl,

    /// The update interval in milliseconds.
    update_interval: AtomicU64,

    /// Whether the background loop should run a cycle before its first
    /// sleep. Cleared once that cycle has started.
    refresh_on_start: AtomicBool,

    /// Held for the duration of each cycle.
    cycle: Mutex<()>,
}

impl Refresher {
    /// Creates a new `Refresher` that fetches from `address` through
    /// `source` and publishes into `store`.
    pub fn new(
        store: Arc<ZoneStore>,
        source: Arc<dyn RemoteSource>,
        address: impl Into<String>,
        update_interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            address: address.into(),
            default_ttl: Ttl::DEFAULT,
            update_interval: AtomicU64::new(duration_to_millis(update_interval)),
            refresh_on_start: AtomicBool::new(false),
            cycle: Mutex::new(()),
        }
    }

    /// Sets the TTL given to every record received.
    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Makes the background loop run a cycle immediately when started,
    /// instead of waiting out the first interval.
    pub fn with_refresh_on_start(self, refresh_on_start: bool) -> Self {
        self.refresh_on_start.store(refresh_on_start, Ordering::Relaxed);
        self
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval.load(Ordering::Acquire))
    }

    /// Changes the update interval. The new interval takes effect at
    /// the next sleep; a sleep already in progress is not shortened or
    /// extended. Setting the interval to zero makes the background loop
    /// exit after the cycle that follows its current sleep.
    pub fn set_update_interval(&self, interval: Duration) {
        self.update_interval
            .store(duration_to_millis(interval), Ordering::Release);
    }

    /// Runs a single refresh cycle.
    pub fn run_once(&self) -> RefreshOutcome {
        // The mutex guards no data, so a panic in an earlier cycle does
        // not matter.
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);

        let payload = match self.source.fetch(&self.address) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to fetch zones from {}: {}.", self.address, e);
                return RefreshOutcome::FetchFailed(e);
            }
        };

        let zones = match payload::decode(&payload, self.default_ttl) {
            Ok(zones) => zones,
            Err(e) => {
                warn!("Failed to parse zones from {}: {}.", self.address, e);
                return RefreshOutcome::ParseFailed(e);
            }
        };

        let mut stats = RefreshStats::default();
        for decoded in zones {
            stats.zones += 1;
            stats.records += decoded.zone.record_count();
            stats.skipped += decoded.skipped;
            stats.rejected += decoded.rejected;

            self.store.advance_timestamp(decoded.last_update);
            let record_count = decoded.zone.record_count();
            let previous = self
                .store
                .replace_zone(&decoded.name, Arc::new(decoded.zone));
            if previous.is_some() {
                debug!("Updated zone {} ({} records).", decoded.name, record_count);
            } else {
                debug!("Added zone {} ({} records).", decoded.name, record_count);
            }
        }

        if stats.skipped > 0 {
            warn!(
                "Refreshed {} zones from {}, skipping {} malformed record entries.",
                stats.zones, self.address, stats.skipped,
            );
            RefreshOutcome::PartialSuccess(stats)
        } else {
            info!(
                "Refreshed {} zones ({} records) from {}.",
                stats.zones, stats.records, self.address,
            );
            RefreshOutcome::Success(stats)
        }
    }

    /// Runs refresh cycles until the update interval becomes zero or
    /// `group` begins shutting down. Shutdown interrupts the sleep
    /// between cycles but not a cycle in progress.
    pub fn run_periodically(&self, group: &ThreadGroup) {
        if self.refresh_on_start.swap(false, Ordering::AcqRel) && !group.is_shutting_down() {
            self.run_once();
        }
        loop {
            let interval = self.update_interval();
            if interval.is_zero() || !group.sleep(interval) {
                break;
            }
            self.run_once();
            if self.update_interval().is_zero() {
                break;
            }
        }
        debug!("Refresh loop for {} stopped.", self.address);
    }

    /// Starts [`Refresher::run_periodically`] on a supervised thread
    /// in `group`. If a cycle panics, the loop is restarted.
    pub fn start(
        self: &Arc<Self>,
        group: &Arc<ThreadGroup>,
        name: &str,
    ) -> Result<(), thread::Error> {
        let refresher = self.clone();
        let group_cloned = group.clone();
        group.start_supervised(Some(format!("{} refresher", name)), move || {
            refresher.run_periodically(&group_cloned)
        })
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread as std_thread;
    use std::time::Instant;

    use lazy_static::lazy_static;

    use super::*;
    use crate::source::testing::StaticSource;

    lazy_static! {
        static ref EXAMPLE: Vec<u8> = br#"{
            "example.com": {
                "records": [
                    "www A 10.0.0.1",
                    "example.com SOA ns1.example.com admin.example.com 1 2 3 4 5"
                ],
                "last_update": 42
            }
        }"#
        .to_vec();
    }

    fn new_refresher(source: &Arc<StaticSource>, interval: Duration) -> Arc<Refresher> {
        Arc::new(Refresher::new(
            Arc::new(ZoneStore::new()),
            source.clone(),
            "http://zones.test/",
            interval,
        ))
    }

    #[test]
    fn run_once_publishes_zones() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = new_refresher(&source, Duration::from_secs(60));
        let outcome = refresher.run_once();

        assert!(matches!(
            outcome,
            RefreshOutcome::Success(RefreshStats {
                zones: 1,
                records: 2,
                skipped: 0,
                rejected: 0,
            })
        ));
        let store = refresher.store();
        let zone = store.get("example.com").unwrap();
        let www = zone.records("www").unwrap();
        assert_eq!(www.len(), 1);
        assert_eq!(www[0].rr_type(), "A");
        assert_eq!(www[0].rdata(), "10.0.0.1");
        assert_eq!(www[0].ttl().as_secs(), 300);
        assert_eq!(store.last_update(), 42);
    }

    #[test]
    fn fetch_failure_leaves_store_untouched() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = new_refresher(&source, Duration::from_secs(60));
        refresher.run_once();
        let store = refresher.store();
        let before = store.get("example.com").unwrap();

        source.set_failing();
        let outcome = refresher.run_once();
        assert!(matches!(outcome, RefreshOutcome::FetchFailed(_)));
        assert!(!outcome.is_success());
        assert!(Arc::ptr_eq(&before, &store.get("example.com").unwrap()));
        assert_eq!(store.zone_names(), ["example.com"]);
        assert_eq!(store.last_update(), 42);
    }

    #[test]
    fn parse_failure_leaves_store_untouched() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = new_refresher(&source, Duration::from_secs(60));
        refresher.run_once();
        let before = refresher.store().get("example.com").unwrap();

        let bad_payloads: [&[u8]; 3] = [b"{\"example.com\": ", b"[]", b"{}"];
        for bad in bad_payloads {
            source.set_payload(bad);
            assert!(matches!(
                refresher.run_once(),
                RefreshOutcome::ParseFailed(_)
            ));
        }
        let store = refresher.store();
        assert!(Arc::ptr_eq(&before, &store.get("example.com").unwrap()));
        assert_eq!(store.last_update(), 42);
    }

    #[test]
    fn skipped_entries_yield_partial_success() {
        let source = Arc::new(StaticSource::new(
            br#"{"example.com": {"records": ["www A 10.0.0.1", "www"]}}"#,
        ));
        let refresher = new_refresher(&source, Duration::from_secs(60));
        let outcome = refresher.run_once();
        assert!(matches!(outcome, RefreshOutcome::PartialSuccess(_)));
        assert!(outcome.is_success());
        assert_eq!(outcome.stats().unwrap().skipped, 1);
        assert!(refresher.store().get("example.com").unwrap().records("www").is_some());
    }

    #[test]
    fn refresh_replaces_mentioned_zones_only() {
        let source = Arc::new(StaticSource::new(
            br#"{
                "a.com": {"records": ["www A 10.0.0.1"], "last_update": 10},
                "b.com": {"records": ["www A 10.0.0.2"], "last_update": 20}
            }"#,
        ));
        let refresher = new_refresher(&source, Duration::from_secs(60));
        refresher.run_once();

        source.set_payload(br#"{"a.com": {"records": ["mail A 10.0.0.3"], "last_update": 5}}"#);
        refresher.run_once();

        let store = refresher.store();
        let a = store.get("a.com").unwrap();
        assert!(a.records("www").is_none());
        assert_eq!(a.records("mail").unwrap()[0].rdata(), "10.0.0.3");
        assert_eq!(
            store.get("b.com").unwrap().records("www").unwrap()[0].rdata(),
            "10.0.0.2"
        );
        assert_eq!(store.last_update(), 20);
    }

    #[test]
    fn zero_interval_stops_loop_after_one_more_cycle() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = new_refresher(&source, Duration::from_millis(10));
        let group = ThreadGroup::new();
        let handle = {
            let refresher = refresher.clone();
            let group = group.clone();
            std_thread::spawn(move || refresher.run_periodically(&group))
        };

        let deadline = Instant::now() + Duration::from_secs(30);
        while source.fetches() < 2 {
            assert!(Instant::now() < deadline, "refresh loop did not run");
            std_thread::sleep(Duration::from_millis(5));
        }
        refresher.set_update_interval(Duration::ZERO);
        let fetches_when_stopped = source.fetches();
        handle.join().unwrap();
        assert!(source.fetches() - fetches_when_stopped <= 1);
        assert!(refresher.store().contains("example.com"));
    }

    #[test]
    fn shutdown_interrupts_sleep() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = new_refresher(&source, Duration::from_secs(3600));
        let group = ThreadGroup::new();
        refresher.start(&group, "test").unwrap();

        let start = Instant::now();
        std_thread::sleep(Duration::from_millis(20));
        group.shut_down();
        group.await_shutdown();
        assert!(Instant::now().duration_since(start) < Duration::from_secs(60));
        assert_eq!(source.fetches(), 0);
    }

    #[test]
    fn refresh_on_start_runs_before_first_sleep() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let refresher = Arc::new(
            Refresher::new(
                Arc::new(ZoneStore::new()),
                source.clone(),
                "http://zones.test/",
                Duration::from_secs(3600),
            )
            .with_refresh_on_start(true),
        );
        let group = ThreadGroup::new();
        refresher.start(&group, "test").unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        while !refresher.store().contains("example.com") {
            assert!(Instant::now() < deadline, "initial refresh did not run");
            std_thread::sleep(Duration::from_millis(5));
        }
        group.shut_down();
        group.await_shutdown();
        assert_eq!(source.fetches(), 1);
    }
}
