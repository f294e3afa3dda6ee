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

//! Arguments shared by every subcommand.

use anyhow::Result;
use clap::{Arg, ArgMatches};
use std::io::Write;

/// Global logging flags.
pub fn get_logging_args() -> Vec<Arg<'static>> {
    vec![
        Arg::new("log-level")
            .short('L')
            .long("log-level")
            .possible_values(["error", "warn", "info", "debug", "trace", "off"])
            .help("Log level [default: info]")
            .global(true)
            .takes_value(true),
        Arg::new("trace")
            .long("trace")
            .help("Log ultra-verbose (trace level) information")
            .global(true)
            .takes_value(false),
        Arg::new("silent")
            .long("silent")
            .help("Suppress all log output")
            .global(true)
            .takes_value(false),
    ]
}

fn level(matches: &ArgMatches) -> log::LevelFilter {
    if matches.is_present("trace") {
        log::LevelFilter::Trace
    } else if matches.is_present("silent") {
        log::LevelFilter::Off
    } else {
        match matches.value_of("log-level") {
            Some("error") => log::LevelFilter::Error,
            Some("warn") => log::LevelFilter::Warn,
            Some("debug") => log::LevelFilter::Debug,
            Some("trace") => log::LevelFilter::Trace,
            Some("off") => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }
}

/// A logger configured from the global flags.
pub fn get_logging(matches: &ArgMatches) -> Result<env_logger::Builder> {
    let mut builder = env_logger::Builder::new();

    let level = level(matches);
    builder.filter(None, level);
    builder.filter_module("reqwest", log::LevelFilter::Warn);
    builder.filter_module("hyper", log::LevelFilter::Warn);

    if level == log::LevelFilter::Trace {
        builder.format_timestamp_secs();
    } else {
        builder.format(|f, record| {
            writeln!(
                f,
                "[{}] {}",
                record.level().to_string().to_lowercase(),
                record.args()
            )
        });
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::App;

    fn matches(args: &[&str]) -> ArgMatches {
        App::new("test")
            .args(get_logging_args())
            .get_matches_from(args)
    }

    #[test]
    fn logging_levels() {
        assert_eq!(log::LevelFilter::Info, level(&matches(&["test"])));
        assert_eq!(log::LevelFilter::Trace, level(&matches(&["test", "--trace"])));
        assert_eq!(log::LevelFilter::Off, level(&matches(&["test", "--silent"])));
        assert_eq!(
            log::LevelFilter::Debug,
            level(&matches(&["test", "-L", "debug"]))
        );
    }
}
