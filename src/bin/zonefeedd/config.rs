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

//! Loading of the daemon configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::Deserialize;

use zonefeed::{InstanceConfig, Ttl};

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

pub fn load_from_args(args: RunArgs) -> Result<Config> {
    let config = Config {
        name: args.name.unwrap_or_else(default_name),
        url: args.url.ok_or_else(|| anyhow!("no URL was given"))?,
        update_interval: args
            .interval
            .ok_or_else(|| anyhow!("no update interval was given"))?,
        timeout: args.timeout.unwrap_or_else(default_timeout),
        default_ttl: default_ttl(),
        refresh_on_start: args.refresh_on_start,
    };
    log_config_summary(&config);
    Ok(config)
}

fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    debug!(
        "Configuration loaded:\n\
         Name:             {}\n\
         URL:              {}\n\
         Update interval:  {} s\n\
         Timeout:          {} s\n\
         Default TTL:      {}\n\
         Refresh on start: {}",
        config.name,
        config.url,
        config.update_interval,
        config.timeout,
        config.default_ttl,
        config.refresh_on_start,
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION STRUCTURE                                            //
////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    pub url: String,
    pub update_interval: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    #[serde(default)]
    pub refresh_on_start: bool,
}

fn default_name() -> String {
    String::from("zonefeed")
}

fn default_timeout() -> u64 {
    InstanceConfig::DEFAULT_TIMEOUT.as_secs()
}

fn default_ttl() -> u32 {
    Ttl::DEFAULT.as_secs()
}

impl Config {
    /// Converts the configuration into the library's form. Values are
    /// checked when the instance is created.
    pub fn to_instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            name: self.name.clone(),
            address: self.url.clone(),
            update_interval: Duration::from_secs(self.update_interval),
            timeout: Duration::from_secs(self.timeout),
            default_ttl: Ttl::from(self.default_ttl),
            refresh_on_start: self.refresh_on_start,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
