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

//! The `fetch` command.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use zonefeed::source::HttpSource;
use zonefeed::{InstanceConfig, RefreshOutcome, Refresher, Ttl, ZoneStore};

use crate::args::FetchArgs;
use crate::config;

/// The update interval given to the refresher. Only
/// [`Refresher::run_once`] is used, so it never takes effect.
const ONE_SHOT_INTERVAL: Duration = Duration::from_secs(60);

pub fn fetch(args: FetchArgs) {
    crate::init_logging();

    if let Err(e) = try_fetching(args) {
        crate::exit_with_failure("Failed to fetch", &e);
    }
}

fn try_fetching(args: FetchArgs) -> Result<()> {
    let (url, timeout, default_ttl) = if let Some(ref config_path) = args.config {
        let config =
            config::load_from_path(config_path).context("failed to load the configuration")?;
        (
            config.url,
            Duration::from_secs(config.timeout),
            Ttl::from(config.default_ttl),
        )
    } else {
        let url = args.url.ok_or_else(|| anyhow!("no URL was given"))?;
        let timeout = args
            .timeout
            .map_or(InstanceConfig::DEFAULT_TIMEOUT, Duration::from_secs);
        (url, timeout, Ttl::DEFAULT)
    };

    let source = HttpSource::new(timeout).context("failed to set up the HTTP client")?;
    let store = Arc::new(ZoneStore::new());

    let refresher = Refresher::new(store.clone(), Arc::new(source), url, ONE_SHOT_INTERVAL)
        .with_default_ttl(default_ttl);
    match refresher.run_once() {
        RefreshOutcome::FetchFailed(e) => {
            return Err(anyhow::Error::new(e).context("failed to fetch the zone data"))
        }
        RefreshOutcome::ParseFailed(e) => {
            return Err(anyhow::Error::new(e).context("failed to decode the zone data"))
        }
        _ => (),
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.lookup.as_deref() {
        Some([zone_name, owner]) => print_records(&mut out, &store, zone_name, owner)?,
        _ => print_summary(&mut out, &store)?,
    }
    Ok(())
}

fn print_records(
    out: &mut impl Write,
    store: &ZoneStore,
    zone_name: &str,
    owner: &str,
) -> Result<()> {
    let zone = store
        .get(zone_name)
        .ok_or_else(|| anyhow!("there is no zone named {}", zone_name))?;
    let records = zone
        .records(owner)
        .ok_or_else(|| anyhow!("{} has no records in {}", owner, zone_name))?;
    for record in records {
        writeln!(out, "{}", record)?;
    }
    Ok(())
}

fn print_summary(out: &mut impl Write, store: &ZoneStore) -> Result<()> {
    writeln!(out, "Last update: {}", store.last_update())?;
    for zone_name in store.zone_names() {
        if let Some(zone) = store.get(&zone_name) {
            writeln!(
                out,
                "{}: {} owners, {} records",
                zone_name,
                zone.owner_count(),
                zone.record_count(),
            )?;
        }
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
