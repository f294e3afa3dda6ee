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

//! The `transform` subcommand: turns gateway payloads into PCDM rows.

use anyhow::{anyhow, Result};
use clap::{App, Arg, ArgMatches};
use datafusion::arrow::array::StringArray;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::pretty;
use log::info;
use sensorql::prelude::*;
use std::fs;
use std::sync::Arc;

/// The `transform` subcommand.
pub fn command() -> App<'static> {
    App::new("transform")
        .about("Converts newline-delimited gateway payloads into PCDM rows")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("A file with one JSON payload per line")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("column")
                .short('c')
                .long("column")
                .value_name("NAME")
                .help("Name of the payload column")
                .default_value("body")
                .takes_value(true),
        )
}

/// Packs every non-blank line into one batch with a single Utf8 column.
fn payload_batch(column: &str, contents: &str) -> Result<RecordBatch> {
    let lines: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, false)]));
    Ok(RecordBatch::try_new(
        schema,
        vec![Arc::new(StringArray::from(lines))],
    )?)
}

/// Runs the `transform` subcommand.
pub async fn run(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("No input file provided"))?;
    let column = matches.value_of("column").unwrap_or("body");

    let batch = payload_batch(column, &fs::read_to_string(path)?)?;
    let transformer = AioJsonToPcdmTransformer::new(column);
    info!("{} rows from {} through {}", batch.num_rows(), path, transformer.name());

    let output = transformer.transform(&[batch])?;
    pretty::print_batches(&output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() -> Result<()> {
        let contents = concat!(
            r#"{"SequenceNumber":1,"Timestamp":"2023-01-01T00:00:00.000Z","DataSetWriterName":"w","MessageType":"ua-deltaframe","Payload":{"a":{"SourceTimestamp":"2023-01-01T00:00:00.000Z","Value":1}}}"#,
            "\n\n",
            r#"{"SequenceNumber":2,"Timestamp":"2023-01-01T00:00:01.000Z","DataSetWriterName":"w","MessageType":"ua-deltaframe","Payload":{"b":{"SourceTimestamp":"2023-01-01T00:00:01.000Z","Value":"on"}}}"#,
            "\n",
        );
        let batch = payload_batch("body", contents)?;
        assert_eq!(2, batch.num_rows());

        let output = AioJsonToPcdmTransformer::default().transform(&[batch])?;
        assert_eq!(2, output[0].num_rows());
        assert_eq!(pcdm_schema(), output[0].schema());
        Ok(())
    }
}
