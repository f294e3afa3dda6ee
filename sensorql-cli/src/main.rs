// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! A command-line client for SensorQL.

mod args;
mod query;
mod transform;

use anyhow::Result;
use clap::{crate_version, App, AppSettings};

#[tokio::main]
pub async fn main() -> Result<()> {
    // Command line arg parsing and configuration.
    let matches = App::new("SensorQL")
        .version(crate_version!())
        .about("Command Line Client for SensorQL")
        .author("UMD Database Group")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .args(args::get_logging_args())
        .subcommand(query::command())
        .subcommand(transform::command())
        .get_matches();

    args::get_logging(&matches)?.init();

    match matches.subcommand() {
        Some(("query", query_matches)) => query::run(query_matches).await?,
        Some(("transform", transform_matches)) => transform::run(transform_matches).await?,
        _ => unreachable!(),
    }

    Ok(())
}
