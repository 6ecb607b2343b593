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

//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

pub fn parse() -> Args {
    Args::parse()
}

#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an instance until interrupted
    Run(RunArgs),

    /// Refresh once and print the zones received
    Fetch(FetchArgs),
}

#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "url"])))]
pub struct RunArgs {
    /// Set the configuration file to use
    #[arg(
        long,
        conflicts_with_all = ["name", "url", "interval", "timeout", "refresh_on_start"],
        value_name = "FILE",
    )]
    pub config: Option<PathBuf>,

    /// Set the instance name
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Set the URL to fetch zone data from
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Set the time between refreshes
    #[arg(
        long,
        required_unless_present = "config",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub interval: Option<u64>,

    /// Set the fetch timeout
    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub timeout: Option<u64>,

    /// Refresh right away instead of after the first interval
    #[arg(long)]
    pub refresh_on_start: bool,
}

#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "url"])))]
pub struct FetchArgs {
    /// Take the URL, timeout, and default TTL from a configuration file
    #[arg(long, conflicts_with_all = ["url", "timeout"], value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set the URL to fetch zone data from
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Set the fetch timeout
    #[arg(
        long,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub timeout: Option<u64>,

    /// Print the records of one owner instead of a summary
    #[arg(long, num_args = 2, value_names = ["ZONE", "OWNER"])]
    pub lookup: Option<Vec<String>>,
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
