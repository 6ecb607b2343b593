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

//! The [`Instance`] structure, the entry point for name server
//! adapters.
//!
//! An adapter creates one [`Instance`] per configured database, asks it
//! [`Instance::find_zone`] to decide whether a query falls under one of
//! its zones, and then [`Instance::answer`] (or [`Instance::lookup`])
//! to obtain the records for the queried owner name.
//!
//! ## Zone resolution
//!
//! Both [`Instance::find_zone`] and [`Instance::lookup`] match zone
//! names exactly. Name servers that embed a database this way walk from
//! the query name toward the root themselves, asking for each candidate
//! zone in turn, and then look records up in the zone they found. Doing
//! a suffix search here as well would make `find_zone` claim zones that
//! `lookup` then could not find. Adapters for hosts that do not perform
//! that walk can use [`Instance::resolve_zone`], which finds the
//! closest enclosing zone.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{info, trace};

use crate::refresh::{RefreshOutcome, Refresher};
use crate::source::RemoteSource;
use crate::store::ZoneStore;
use crate::thread::{self, ThreadGroup};
use crate::zone::{Record, Ttl};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION                                                      //
////////////////////////////////////////////////////////////////////////

/// The parameters of an [`Instance`].
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    /// The instance name, used in logs and thread names.
    pub name: String,

    /// The address of the remote source (a URL for HTTP).
    pub address: String,

    /// The time between refreshes. Must be non-zero.
    pub update_interval: Duration,

    /// The timeout for each fetch. Must be non-zero.
    pub timeout: Duration,

    /// The TTL given to every record.
    pub default_ttl: Ttl,

    /// Whether to refresh once right away, rather than waiting for the
    /// first update interval to pass.
    pub refresh_on_start: bool,
}

impl InstanceConfig {
    /// The default fetch timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a configuration with default values for everything but
    /// the name, address, and update interval.
    pub fn new(name: &str, address: &str, update_interval: Duration) -> Self {
        Self {
            name: name.to_owned(),
            address: address.to_owned(),
            update_interval,
            timeout: Self::DEFAULT_TIMEOUT,
            default_ttl: Ttl::DEFAULT,
            refresh_on_start: false,
        }
    }

    /// Checks the configuration for values that cannot work with any
    /// [`RemoteSource`].
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            Err(ConfigError::EmptyName)
        } else if self.address.trim().is_empty() {
            Err(ConfigError::MissingAddress)
        } else if self.update_interval.is_zero() {
            Err(ConfigError::ZeroInterval)
        } else if self.timeout.is_zero() {
            Err(ConfigError::ZeroTimeout)
        } else {
            Ok(())
        }
    }
}

////////////////////////////////////////////////////////////////////////
// INSTANCES                                                          //
////////////////////////////////////////////////////////////////////////

/// A zone store together with the background thread that refreshes it.
///
/// Lookups through an `Instance` never block on I/O: they read the
/// zones published by the most recent successful refresh. Dropping an
/// `Instance` shuts it down (see [`Instance::shutdown`]).
pub struct Instance {
    name: String,
    store: Arc<ZoneStore>,
    refresher: Arc<Refresher>,
    group: Arc<ThreadGroup>,
}

impl Instance {
    /// Creates an instance that refreshes from the HTTP URL
    /// `remote_address` every `update_interval_secs` seconds, with
    /// defaults for all other parameters.
    #[cfg(feature = "http")]
    pub fn create(
        name: &str,
        remote_address: &str,
        update_interval_secs: u64,
    ) -> Result<Self, ConfigError> {
        Self::from_config(InstanceConfig::new(
            name,
            remote_address,
            Duration::from_secs(update_interval_secs),
        ))
    }

    /// Creates an instance that refreshes over HTTP according to
    /// `config`.
    #[cfg(feature = "http")]
    pub fn from_config(config: InstanceConfig) -> Result<Self, ConfigError> {
        use crate::source::HttpSource;

        config.validate()?;
        if let Err(e) = reqwest::Url::parse(&config.address) {
            return Err(ConfigError::InvalidAddress(format!(
                "{}: {}",
                config.address, e
            )));
        }
        let source =
            HttpSource::new(config.timeout).map_err(|e| ConfigError::Client(e.to_string()))?;
        Self::with_source(config, Arc::new(source))
    }

    /// Creates an instance that refreshes from `source` according to
    /// `config`. (`config.timeout` is up to the source to honor.)
    pub fn with_source(
        config: InstanceConfig,
        source: Arc<dyn RemoteSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(ZoneStore::new());
        let refresher = Arc::new(
            Refresher::new(
                store.clone(),
                source,
                config.address.clone(),
                config.update_interval,
            )
            .with_default_ttl(config.default_ttl)
            .with_refresh_on_start(config.refresh_on_start),
        );
        let group = ThreadGroup::new();
        refresher
            .start(&group, &config.name)
            .map_err(ConfigError::Thread)?;

        info!(
            "Instance {} started: refreshing from {} every {} s.",
            config.name,
            config.address,
            config.update_interval.as_secs_f64(),
        );
        Ok(Self {
            name: config.name,
            store,
            refresher,
            group,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the instance's zone store.
    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    /// Returns the instance's refresher, for changing the update
    /// interval and the like.
    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    /// Returns whether the instance has a zone named exactly `name`.
    pub fn find_zone(&self, name: &str) -> bool {
        let found = self.store.contains(name);
        trace!("{}: find zone {}: {}", self.name, name, found);
        found
    }

    /// Returns the name of the closest zone enclosing `domain` (or equal
    /// to it), if any.
    pub fn resolve_zone(&self, domain: &str) -> Option<String> {
        self.store.lookup_by_suffix(domain).map(|(name, _)| name)
    }

    /// Returns copies of the records owned by `owner` in the zone named
    /// exactly `zone_name`. Returns [`None`] if there is no such zone or
    /// the owner has no records.
    pub fn lookup(&self, zone_name: &str, owner: &str) -> Option<Vec<Record>> {
        let zone = self.store.get(zone_name)?;
        zone.records(owner).map(<[Record]>::to_vec)
    }

    /// Passes each record owned by `owner` in the zone named exactly
    /// `zone_name` to `sink`, in order. Stops at the first error that
    /// `sink` returns and passes it on.
    pub fn answer<S>(&self, zone_name: &str, owner: &str, sink: &mut S) -> Result<Answer, S::Error>
    where
        S: RecordSink + ?Sized,
    {
        trace!("{}: lookup {} in {}", self.name, owner, zone_name);
        let zone = match self.store.get(zone_name) {
            Some(zone) => zone,
            None => return Ok(Answer::NoZone),
        };
        let records = match zone.records(owner) {
            Some(records) => records,
            None => return Ok(Answer::NoRecords),
        };
        for record in records {
            trace!("{}: >> {}", self.name, record);
            sink.put_record(record)?;
        }
        Ok(Answer::Records(records.len()))
    }

    /// Runs a refresh cycle right away, on the calling thread. This
    /// waits for a cycle already running in the background to finish.
    pub fn refresh_now(&self) -> RefreshOutcome {
        self.refresher.run_once()
    }

    /// Stops the background refresher and waits for it to exit. A sleep
    /// between cycles is interrupted; a cycle in progress is allowed to
    /// finish. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if !self.group.is_shutting_down() {
            info!("Instance {} shutting down.", self.name);
        }
        self.group.shut_down();
        self.group.await_shutdown();
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("address", &self.refresher.address())
            .field("zones", &self.store.len())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// RECORD SINKS                                                       //
////////////////////////////////////////////////////////////////////////

/// A receiver of records found by [`Instance::answer`].
///
/// Adapters implement this over the host name server's facility for
/// adding a record to a response.
pub trait RecordSink {
    type Error;

    fn put_record(&mut self, record: &Record) -> Result<(), Self::Error>;
}

impl RecordSink for Vec<Record> {
    type Error = Infallible;

    fn put_record(&mut self, record: &Record) -> Result<(), Self::Error> {
        self.push(record.clone());
        Ok(())
    }
}

/// The result of a successful [`Instance::answer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Answer {
    /// This many records were passed to the sink.
    Records(usize),

    /// The zone exists, but the owner has no records.
    NoRecords,

    /// There is no zone of the given name.
    NoZone,
}

impl Answer {
    pub fn is_found(self) -> bool {
        matches!(self, Self::Records(_))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error that prevents an [`Instance`] from being created.
#[derive(Debug)]
pub enum ConfigError {
    EmptyName,
    MissingAddress,
    InvalidAddress(String),
    ZeroInterval,
    ZeroTimeout,

    /// The HTTP client could not be set up.
    Client(String),

    /// The background thread could not be started.
    Thread(thread::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EmptyName => f.write_str("the instance name is empty"),
            Self::MissingAddress => f.write_str("no remote address was given"),
            Self::InvalidAddress(details) => write!(f, "invalid remote address {}", details),
            Self::ZeroInterval => f.write_str("the update interval must be greater than zero"),
            Self::ZeroTimeout => f.write_str("the fetch timeout must be greater than zero"),
            Self::Client(details) => write!(f, "failed to set up the HTTP client: {}", details),
            Self::Thread(err) => write!(f, "failed to start the refresher thread: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Thread(err) => Some(err),
            _ => None,
        }
    }
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

    fn new_instance(source: &Arc<StaticSource>) -> Instance {
        let config = InstanceConfig::new("test", "http://zones.test/", Duration::from_secs(3600));
        Instance::with_source(config, source.clone()).unwrap()
    }

    /// A sink that accepts a fixed number of records and then fails.
    struct FailingSink {
        accepted: Vec<Record>,
        capacity: usize,
    }

    impl RecordSink for FailingSink {
        type Error = &'static str;

        fn put_record(&mut self, record: &Record) -> Result<(), Self::Error> {
            if self.accepted.len() == self.capacity {
                return Err("sink is full");
            }
            self.accepted.push(record.clone());
            Ok(())
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let source: Arc<StaticSource> = Arc::new(StaticSource::default());
        let interval = Duration::from_secs(60);
        let cases = [
            (InstanceConfig::new("", "http://zones.test/", interval), "EmptyName"),
            (InstanceConfig::new("test", " ", interval), "MissingAddress"),
            (InstanceConfig::new("test", "http://zones.test/", Duration::ZERO), "ZeroInterval"),
        ];
        for (config, expected) in cases {
            let err = Instance::with_source(config, source.clone()).unwrap_err();
            assert_eq!(format!("{:?}", err), expected);
        }

        let mut config = InstanceConfig::new("test", "http://zones.test/", interval);
        config.timeout = Duration::ZERO;
        assert!(matches!(
            Instance::with_source(config, source),
            Err(ConfigError::ZeroTimeout)
        ));
    }

    #[cfg(feature = "http")]
    #[test]
    fn create_validates_the_url() {
        assert!(matches!(
            Instance::create("test", "not a url", 60),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(
            Instance::create("test", "http://127.0.0.1:1/zones", 0),
            Err(ConfigError::ZeroInterval)
        ));
        let instance = Instance::create("test", "http://127.0.0.1:1/zones", 60).unwrap();
        assert_eq!(instance.name(), "test");
        instance.shutdown();
    }

    #[test]
    fn lookup_after_refresh_works() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let instance = new_instance(&source);
        assert!(instance.lookup("example.com", "www").is_none());

        assert!(instance.refresh_now().is_success());
        let records = instance.lookup("example.com", "www").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rr_type(), "A");
        assert_eq!(records[0].rdata(), "10.0.0.1");
        assert_eq!(records[0].ttl(), Ttl::from(300));
        assert_eq!(instance.store().last_update(), 42);

        assert!(instance.lookup("example.com", "").is_none());
        assert!(instance.lookup("example.com", "ftp").is_none());
        assert!(instance.lookup("example.org", "www").is_none());
    }

    #[test]
    fn find_zone_is_exact() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let instance = new_instance(&source);
        instance.refresh_now();

        assert!(instance.find_zone("example.com"));
        assert!(instance.find_zone("EXAMPLE.com."));
        assert!(!instance.find_zone("www.example.com"));
        assert!(!instance.find_zone("com"));
        assert_eq!(
            instance.resolve_zone("www.example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(instance.resolve_zone("www.example.org"), None);
    }

    #[test]
    fn answer_feeds_the_sink() {
        let source = Arc::new(StaticSource::new(
            br#"{"example.com": {"records": ["www A 10.0.0.1", "www A 10.0.0.2"]}}"#,
        ));
        let instance = new_instance(&source);
        instance.refresh_now();

        let mut records = Vec::new();
        assert_eq!(
            instance.answer("example.com", "www", &mut records),
            Ok(Answer::Records(2))
        );
        assert_eq!(records[1].rdata(), "10.0.0.2");
        assert_eq!(
            instance.answer("example.com", "mail", &mut records),
            Ok(Answer::NoRecords)
        );
        assert_eq!(
            instance.answer("example.org", "www", &mut records),
            Ok(Answer::NoZone)
        );
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn answer_stops_at_first_sink_error() {
        let source = Arc::new(StaticSource::new(
            br#"{"example.com": {
                "records": ["www A 10.0.0.1", "www A 10.0.0.2", "www A 10.0.0.3"]
            }}"#,
        ));
        let instance = new_instance(&source);
        instance.refresh_now();

        let mut sink = FailingSink {
            accepted: Vec::new(),
            capacity: 1,
        };
        assert_eq!(
            instance.answer("example.com", "www", &mut sink),
            Err("sink is full")
        );
        assert_eq!(sink.accepted.len(), 1);
        assert_eq!(sink.accepted[0].rdata(), "10.0.0.1");
    }

    #[test]
    fn shutdown_is_prompt_and_idempotent() {
        let source = Arc::new(StaticSource::new(&EXAMPLE));
        let instance = new_instance(&source);
        let start = Instant::now();
        instance.shutdown();
        instance.shutdown();
        assert!(Instant::now().duration_since(start) < Duration::from_secs(60));
        assert_eq!(source.fetches(), 0);
    }

    #[test]
    fn lookups_during_refreshes_see_whole_zones() {
        fn payload(generation: usize) -> Vec<u8> {
            let records: Vec<String> = (0..100)
                .map(|i| format!("host{} TXT generation-{}", i, generation))
                .collect();
            serde_json::to_vec(&serde_json::json!({
                "example.com": {"records": records, "last_update": generation}
            }))
            .unwrap()
        }

        let source = Arc::new(StaticSource::new(&payload(0)));
        let instance = Arc::new(new_instance(&source));
        instance.refresh_now();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let instance = instance.clone();
                std_thread::spawn(move || {
                    for _ in 0..200 {
                        let zone = instance.store().get("example.com").unwrap();
                        assert_eq!(zone.record_count(), 100);
                        let first = zone.records("host0").unwrap()[0].rdata().to_owned();
                        let last = zone.records("host99").unwrap()[0].rdata().to_owned();
                        assert_eq!(first, last);
                    }
                })
            })
            .collect();

        for generation in 1..20 {
            source.set_payload(&payload(generation));
            assert!(instance.refresh_now().is_success());
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(instance.store().last_update(), 19);
    }
}
