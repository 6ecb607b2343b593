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

//! The zonefeed daemon.
//!
//! `zonefeedd run` keeps one instance refreshing until it is told to
//! stop; `zonefeedd fetch` runs a single refresh and prints what it
//! received.

use std::fmt::Write;
use std::process;

use env_logger::Env;
use log::error;

mod args;
mod config;
mod fetch;
mod run;

use args::Command;

fn main() {
    let args = args::parse();
    match args.command {
        Command::Run(run_args) => run::run(run_args),
        Command::Fetch(fetch_args) => fetch::fetch(fetch_args),
    }
}

/// Installs the logger. `RUST_LOG` overrides the default filter.
fn init_logging() {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));
}

/// Logs `err` and its chain of causes, then exits with failure.
fn exit_with_failure(what: &str, err: &anyhow::Error) -> ! {
    let mut message = format!("{}:", what);
    for (i, cause) in err.chain().enumerate() {
        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
    }
    message.push_str("\nExiting with failure.");
    error!("{}", message);
    process::exit(1);
}
