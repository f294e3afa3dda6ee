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

//! Industrial IoT gateway ("AIO") OPC UA JSON messages.
//!
//! ```json
//! {"SequenceNumber": 12345, "Timestamp": "2024-05-13T13:05:10.975317Z",
//!  "DataSetWriterName": "test", "MessageType": "test",
//!  "Payload": {"test_tag1": {"SourceTimestamp": "2024-05-13T13:05:19.7278555Z", "Value": 67}}}
//! ```
//!
//! Every payload entry becomes one PCDM event, in payload order.

use super::{pcdm_schema, Transformer, PCDM_CHANGE_TYPE_INSERT, PCDM_STATUS_GOOD};
use crate::datetime::parse_timestamp_micros;
use crate::error::{Result, SensorError};
use datafusion::arrow::array::{Array, StringArray, TimestampMicrosecondArray};
use datafusion::arrow::record_batch::RecordBatch;
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct AioMessage {
    #[serde(rename = "Payload", default)]
    payload: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct AioDataPoint {
    #[serde(rename = "SourceTimestamp", default)]
    source_timestamp: Option<String>,
    #[serde(rename = "Value", default)]
    value:            Value,
}

#[derive(Debug, Default)]
struct PcdmColumns {
    tag_names:   Vec<String>,
    event_times: Vec<Option<i64>>,
    values:      Vec<Option<String>>,
    value_types: Vec<&'static str>,
}

impl PcdmColumns {
    fn into_batch(self) -> Result<RecordBatch> {
        let rows = self.tag_names.len();
        Ok(RecordBatch::try_new(
            pcdm_schema(),
            vec![
                Arc::new(
                    self.tag_names
                        .iter()
                        .map(|t| Some(t.as_str()))
                        .collect::<StringArray>(),
                ),
                Arc::new(TimestampMicrosecondArray::from(self.event_times)),
                Arc::new(StringArray::from(vec![PCDM_STATUS_GOOD; rows])),
                Arc::new(self.values.iter().map(|v| v.as_deref()).collect::<StringArray>()),
                Arc::new(StringArray::from(self.value_types)),
                Arc::new(StringArray::from(vec![PCDM_CHANGE_TYPE_INSERT; rows])),
            ],
        )?)
    }
}

/// The value as text: numbers as written, strings verbatim, `null` kept.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.to_owned()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// `float` when the value is numeric or its text parses as a number.
fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "float",
        Value::String(s) if s.trim().parse::<f64>().is_ok() => "float",
        _ => "string",
    }
}

/// Flattens AIO JSON messages held in a string column into PCDM events.
#[derive(Debug, Clone)]
pub struct AioJsonToPcdmTransformer {
    /// The column holding the JSON messages.
    pub source_column_name: String,
}

impl Default for AioJsonToPcdmTransformer {
    fn default() -> Self {
        Self::new("body")
    }
}

impl AioJsonToPcdmTransformer {
    /// Reads messages from `source_column_name`.
    pub fn new(source_column_name: &str) -> Self {
        Self {
            source_column_name: source_column_name.to_owned(),
        }
    }

    fn transform_batch(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let index = schema.index_of(&self.source_column_name).map_err(|_| {
            SensorError::Execution(format!(
                "source column {} not found",
                self.source_column_name
            ))
        })?;
        let bodies = batch
            .column(index)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                SensorError::Execution(format!(
                    "source column {} must be a string column",
                    self.source_column_name
                ))
            })?;

        let mut columns = PcdmColumns::default();
        for row in 0..bodies.len() {
            if bodies.is_null(row) {
                continue;
            }
            let message: AioMessage = serde_json::from_str(bodies.value(row)).map_err(|e| {
                SensorError::Execution(format!(
                    "row {} of {} is not a valid AIO message: {}",
                    row, self.source_column_name, e
                ))
            })?;
            for (tag, point) in message.payload {
                let point: AioDataPoint = serde_json::from_value(point).map_err(|e| {
                    SensorError::Execution(format!(
                        "row {}: invalid data point for tag {}: {}",
                        row, tag, e
                    ))
                })?;
                let event_time = point
                    .source_timestamp
                    .as_deref()
                    .map(parse_timestamp_micros)
                    .transpose()
                    .map_err(|e| {
                        SensorError::Execution(format!(
                            "row {}: invalid SourceTimestamp for tag {}: {}",
                            row, tag, e
                        ))
                    })?;
                columns.values.push(value_text(&point.value));
                columns.value_types.push(value_type(&point.value));
                columns.event_times.push(event_time);
                columns.tag_names.push(tag);
            }
        }
        debug!(
            "Transformed {} messages into {} events",
            bodies.len(),
            columns.tag_names.len()
        );
        columns.into_batch()
    }
}

impl Transformer for AioJsonToPcdmTransformer {
    fn name(&self) -> String {
        "AioJsonToPcdmTransformer".to_string()
    }

    fn transform(&self, batches: &[RecordBatch]) -> Result<Vec<RecordBatch>> {
        batches.iter().map(|b| self.transform_batch(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::arrow;
    use datafusion::assert_batches_eq;

    const AIO_JSON: &str = r#"{"SequenceNumber":12345,"Timestamp":"2024-05-13T13:05:10.975317Z","DataSetWriterName":"test","MessageType":"test","Payload":{"test_tag1":{"SourceTimestamp":"2024-05-13T13:05:19.7278555Z","Value":67},"test_tag2":{"SourceTimestamp":"2024-05-13T13:05:19.7288616Z","Value":165.5}}}"#;

    fn bodies(rows: Vec<Option<&str>>) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(vec![Field::new("body", DataType::Utf8, true)]));
        Ok(RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(rows))],
        )?)
    }

    fn without_event_time(batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let keep: Vec<usize> = (0..schema.fields().len()).filter(|&i| i != 1).collect();
        Ok(RecordBatch::try_new(
            Arc::new(Schema::new(
                keep.iter().map(|&i| schema.field(i).clone()).collect(),
            )),
            keep.iter().map(|&i| batch.column(i).clone()).collect(),
        )?)
    }

    #[test]
    fn aio_json_to_pcdm() -> Result<()> {
        let transformer = AioJsonToPcdmTransformer::default();
        let batches = transformer.transform(&[bodies(vec![Some(AIO_JSON)])?])?;
        assert_eq!(1, batches.len());
        assert_eq!(pcdm_schema(), batches[0].schema());

        let expected = vec![
            "+-----------+--------+-------+-----------+------------+",
            "| TagName   | Status | Value | ValueType | ChangeType |",
            "+-----------+--------+-------+-----------+------------+",
            "| test_tag1 | Good   | 67    | float     | insert     |",
            "| test_tag2 | Good   | 165.5 | float     | insert     |",
            "+-----------+--------+-------+-----------+------------+",
        ];
        assert_batches_eq!(expected, &[without_event_time(&batches[0])?]);

        let times = batches[0]
            .column(1)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(1_715_605_519_727_855, times.value(0));
        assert_eq!(1_715_605_519_728_861, times.value(1));
        Ok(())
    }

    #[test]
    fn value_types_follow_the_value() -> Result<()> {
        let json = r#"{"Payload":{"a":{"SourceTimestamp":"2024-05-13T13:05:19Z","Value":"12.5"},"b":{"Value":"open"},"c":{"SourceTimestamp":"2024-05-13T13:05:19Z","Value":null},"d":{"Value":true}}}"#;
        let transformer = AioJsonToPcdmTransformer::new("body");
        let batches = transformer.transform(&[bodies(vec![Some(json), None])?])?;

        let expected = vec![
            "+---------+--------+-------+-----------+------------+",
            "| TagName | Status | Value | ValueType | ChangeType |",
            "+---------+--------+-------+-----------+------------+",
            "| a       | Good   | 12.5  | float     | insert     |",
            "| b       | Good   | open  | string    | insert     |",
            "| c       | Good   |       | string    | insert     |",
            "| d       | Good   | true  | string    | insert     |",
            "+---------+--------+-------+-----------+------------+",
        ];
        assert_batches_eq!(expected, &[without_event_time(&batches[0])?]);
        assert!(batches[0].column(1).is_null(1));
        Ok(())
    }

    #[test]
    fn malformed_messages_name_the_row() -> Result<()> {
        let transformer = AioJsonToPcdmTransformer::default();
        let err = transformer
            .transform(&[bodies(vec![Some(AIO_JSON), Some("{not json")])?])
            .unwrap_err();
        assert!(matches!(err, SensorError::Execution(_)));
        assert!(err.to_string().contains("row 1 of body"));

        let missing = AioJsonToPcdmTransformer::new("payload");
        assert!(missing.transform(&[bodies(vec![Some(AIO_JSON)])?]).is_err());
        Ok(())
    }
}
