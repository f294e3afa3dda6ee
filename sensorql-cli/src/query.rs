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

//! The `query` subcommand: builds the statement for one analytic and either
//! prints it or runs it on the configured warehouse.

use anyhow::{anyhow, Result};
use clap::{App, Arg, ArgMatches};
use datafusion::arrow::util::pretty;
use log::info;
use sensorql::prelude::*;
use sensorql_function::api::response::Envelope;
use sensorql_function::api::validation::{query_parameters, TagSource};

/// Parameters accepted as flags, keyed by their API name.
const PARAMETERS: [(&str, &str); 18] = [
    ("business_unit", "business-unit"),
    ("region", "region"),
    ("asset", "asset"),
    ("data_security_level", "data-security-level"),
    ("data_type", "data-type"),
    ("start_date", "start-date"),
    ("end_date", "end-date"),
    ("include_bad_data", "include-bad-data"),
    ("limit", "limit"),
    ("offset", "offset"),
    ("time_interval_rate", "time-interval-rate"),
    ("time_interval_unit", "time-interval-unit"),
    ("agg_method", "agg-method"),
    ("interpolation_method", "interpolation-method"),
    ("lower_bound", "lower-bound"),
    ("upper_bound", "upper-bound"),
    ("pivot", "pivot"),
    ("display_uom", "display-uom"),
];

/// The `query` subcommand.
pub fn command() -> App<'static> {
    let analytics: Vec<&'static str> = QueryType::ALL.iter().map(|t| t.name()).collect();
    App::new("query")
        .about("Builds and runs a time-series query")
        .arg(
            Arg::new("analytic")
                .help("The analytic to run")
                .required(true)
                .possible_values(analytics)
                .index(1),
        )
        .args(PARAMETERS.iter().map(|(name, long)| {
            Arg::new(*name)
                .long(*long)
                .value_name("VALUE")
                .takes_value(true)
        }))
        .arg(
            Arg::new("tag_names")
                .short('t')
                .long("tag-name")
                .value_name("TAG")
                .help("A tag to query, may be repeated")
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            Arg::new("case_insensitivity_tag_search")
                .long("case-insensitive")
                .help("Match tag names regardless of case"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("Access token, defaults to $DATABRICKS_TOKEN")
                .takes_value(true),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .possible_values(["table", "json"])
                .default_value("table")
                .takes_value(true),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Prints the SQL statement instead of running it"),
        )
}

/// Collects the flags as API query pairs.
fn query_pairs(matches: &ArgMatches) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = PARAMETERS
        .iter()
        .filter_map(|(name, _)| {
            matches
                .value_of(*name)
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();
    if let Some(tags) = matches.values_of("tag_names") {
        pairs.extend(tags.map(|tag| ("tag_names".to_string(), tag.to_string())));
    }
    if matches.is_present("case_insensitivity_tag_search") {
        pairs.push((
            "case_insensitivity_tag_search".to_string(),
            "true".to_string(),
        ));
    }
    pairs
}

fn parameters(matches: &ArgMatches) -> Result<(QueryType, QueryParameters)> {
    let query_type: QueryType = matches
        .value_of("analytic")
        .ok_or_else(|| anyhow!("No analytic provided"))?
        .parse()?;
    let params = query_parameters(query_type, &query_pairs(matches), TagSource::Query)
        .map_err(|errors| {
            let fields: Vec<String> = errors
                .iter()
                .map(|e| {
                    let field = e.loc.last().and_then(|l| l.as_str()).unwrap_or("body");
                    format!("{}: {}", field, e.msg)
                })
                .collect();
            anyhow!("Invalid parameters: {}", fields.join("; "))
        })?;
    Ok((query_type, params))
}

/// Runs the `query` subcommand.
pub async fn run(matches: &ArgMatches) -> Result<()> {
    let (query_type, params) = parameters(matches)?;

    if matches.is_present("dry-run") {
        println!("{}", QueryBuilder::build(&params, query_type)?);
        return Ok(());
    }

    let factory = DatabricksConnectionFactory::from_env()?;
    let connection = factory.connect(matches.value_of("token")).await?;
    info!("Running {} on {}", query_type, connection.name());
    let table = timeseries::get(connection, &params, query_type).await?;

    match matches.value_of("format") {
        Some("json") => {
            let envelope = Envelope::try_new(&table, &params)?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        _ => pretty::print_batches(table.batches())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["query"];
        argv.extend_from_slice(args);
        command().get_matches_from(argv)
    }

    #[test]
    fn flags_become_parameters() -> Result<()> {
        let matches = matches(&[
            "resample",
            "--business-unit",
            "bu",
            "--region",
            "r",
            "--asset",
            "a",
            "--data-security-level",
            "s",
            "--data-type",
            "float",
            "-t",
            "T1",
            "--tag-name",
            "T2",
            "--start-date",
            "2011-01-01",
            "--end-date",
            "2011-01-02",
            "--include-bad-data",
            "false",
            "--time-interval-rate",
            "15",
            "--time-interval-unit",
            "minute",
            "--agg-method",
            "avg",
            "--case-insensitive",
        ]);
        let (query_type, params) = parameters(&matches)?;
        assert_eq!(QueryType::Resample, query_type);
        assert_eq!(vec!["T1", "T2"], params.tag_names);
        assert!(params.case_insensitivity_tag_search);
        assert_eq!(Some(15), params.time_interval_rate);
        assert!(QueryBuilder::build(&params, query_type)?
            .contains("`bu`.`sensors`.`a_s_events_float`"));
        Ok(())
    }

    #[test]
    fn missing_flags_are_reported() {
        let matches = matches(&["raw", "--business-unit", "bu"]);
        let err = parameters(&matches).unwrap_err().to_string();
        assert!(err.starts_with("Invalid parameters: "));
        assert!(err.contains("start_date: Field required"));
    }
}
