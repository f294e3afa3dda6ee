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

//! Query results and their JSON shape.
//!
//! A [`ResultTable`] is either flat (one row per tag and timestamp) or
//! pivoted (one row per timestamp, one column per tag). Each variant has its
//! own record serializer; both share the cell encoding: timestamps as
//! ISO-8601 with microseconds, non-finite floats as `null`.

use crate::datetime::format_micros;
use crate::error::{Result, SensorError};
use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use datafusion::arrow::datatypes::{DataType, Schema, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// The name of the timestamp column every time-series result carries.
pub const EVENT_TIME: &str = "EventTime";

/// Column types as reported to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Timestamps and dates.
    Datetime,
    /// Text.
    String,
    /// Floating point numbers.
    Number,
    /// Integers.
    Integer,
    /// Booleans.
    Boolean,
    /// Anything else.
    Any,
}

impl From<&DataType> for FieldType {
    fn from(data_type: &DataType) -> Self {
        match data_type {
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
                FieldType::Datetime
            }
            DataType::Utf8 | DataType::LargeUtf8 => FieldType::String,
            DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal(_, _) => {
                FieldType::Number
            }
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => FieldType::Integer,
            DataType::Boolean => FieldType::Boolean,
            _ => FieldType::Any,
        }
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Column name.
    pub name:       String,
    /// Column type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// The `schema` member of a response envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns, in record order.
    pub fields: Vec<FieldSchema>,
}

/// The rows a query function returns.
#[derive(Debug, Clone)]
pub enum ResultTable {
    /// `EventTime`, `TagName`, `Status`, `Value` (and optionally `UoM`), or
    /// any other row-per-tag result.
    Flat(Vec<RecordBatch>),
    /// `EventTime` followed by one column per tag.
    Pivoted(Vec<RecordBatch>),
}

impl ResultTable {
    /// Wraps `batches` in the variant matching `pivoted`.
    pub fn new(batches: Vec<RecordBatch>, pivoted: bool) -> Self {
        if pivoted {
            ResultTable::Pivoted(batches)
        } else {
            ResultTable::Flat(batches)
        }
    }

    /// The underlying batches.
    pub fn batches(&self) -> &[RecordBatch] {
        match self {
            ResultTable::Flat(batches) | ResultTable::Pivoted(batches) => batches,
        }
    }

    /// Consumes the table, returning its batches.
    pub fn into_batches(self) -> Vec<RecordBatch> {
        match self {
            ResultTable::Flat(batches) | ResultTable::Pivoted(batches) => batches,
        }
    }

    /// Whether the table is pivoted.
    pub fn is_pivoted(&self) -> bool {
        matches!(self, ResultTable::Pivoted(_))
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        self.batches().iter().map(|b| b.num_rows()).sum()
    }

    /// The client-facing schema, in record order.
    pub fn table_schema(&self) -> TableSchema {
        let schema = match self.batches().first() {
            Some(batch) => batch.schema(),
            None => return TableSchema::default(),
        };
        let fields = column_order(&schema, self.is_pivoted())
            .into_iter()
            .map(|i| {
                let field = schema.field(i);
                FieldSchema {
                    name:       field.name().to_owned(),
                    field_type: field.data_type().into(),
                }
            })
            .collect();
        TableSchema { fields }
    }

    /// The rows as JSON objects.
    pub fn records(&self) -> Result<Vec<Map<String, Value>>> {
        match self {
            ResultTable::Flat(batches) => flat_records(batches),
            ResultTable::Pivoted(batches) => pivoted_records(batches),
        }
    }
}

/// Column indices in output order. Pivoted tables lead with `EventTime`.
fn column_order(schema: &Schema, pivoted: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..schema.fields().len()).collect();
    if pivoted {
        if let Some(pos) = schema.fields().iter().position(|f| f.name() == EVENT_TIME) {
            order.remove(pos);
            order.insert(0, pos);
        }
    }
    order
}

fn records(batches: &[RecordBatch], pivoted: bool) -> Result<Vec<Map<String, Value>>> {
    let mut rows = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());
    for batch in batches {
        let schema = batch.schema();
        let order = column_order(&schema, pivoted);
        for row in 0..batch.num_rows() {
            let mut record = Map::with_capacity(order.len());
            for &i in &order {
                record.insert(schema.field(i).name().to_owned(), cell(batch.column(i), row)?);
            }
            rows.push(record);
        }
    }
    Ok(rows)
}

/// Serializes row-per-tag batches, keeping column order.
pub fn flat_records(batches: &[RecordBatch]) -> Result<Vec<Map<String, Value>>> {
    records(batches, false)
}

/// Serializes pivoted batches with `EventTime` as the first key of each row.
pub fn pivoted_records(batches: &[RecordBatch]) -> Result<Vec<Map<String, Value>>> {
    records(batches, true)
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        SensorError::Internal(format!("unexpected array type {:?}", array.data_type()))
    })
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn timestamp(micros: Option<i64>, tz: &Option<String>) -> Value {
    micros
        .and_then(|micros| format_micros(micros, tz.is_some()))
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Encodes one cell.
pub fn cell(array: &ArrayRef, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    Ok(match array.data_type() {
        DataType::Utf8 => Value::String(downcast::<StringArray>(array)?.value(row).to_owned()),
        DataType::LargeUtf8 => {
            Value::String(downcast::<LargeStringArray>(array)?.value(row).to_owned())
        }
        DataType::Boolean => Value::Bool(downcast::<BooleanArray>(array)?.value(row)),
        DataType::Int8 => downcast::<Int8Array>(array)?.value(row).into(),
        DataType::Int16 => downcast::<Int16Array>(array)?.value(row).into(),
        DataType::Int32 => downcast::<Int32Array>(array)?.value(row).into(),
        DataType::Int64 => downcast::<Int64Array>(array)?.value(row).into(),
        DataType::UInt8 => downcast::<UInt8Array>(array)?.value(row).into(),
        DataType::UInt16 => downcast::<UInt16Array>(array)?.value(row).into(),
        DataType::UInt32 => downcast::<UInt32Array>(array)?.value(row).into(),
        DataType::UInt64 => downcast::<UInt64Array>(array)?.value(row).into(),
        DataType::Float32 => float(f64::from(downcast::<Float32Array>(array)?.value(row))),
        DataType::Float64 => float(downcast::<Float64Array>(array)?.value(row)),
        DataType::Timestamp(TimeUnit::Second, tz) => {
            let seconds = downcast::<TimestampSecondArray>(array)?.value(row);
            timestamp(seconds.checked_mul(1_000_000), tz)
        }
        DataType::Timestamp(TimeUnit::Millisecond, tz) => {
            let millis = downcast::<TimestampMillisecondArray>(array)?.value(row);
            timestamp(millis.checked_mul(1_000), tz)
        }
        DataType::Timestamp(TimeUnit::Microsecond, tz) => {
            timestamp(Some(downcast::<TimestampMicrosecondArray>(array)?.value(row)), tz)
        }
        DataType::Timestamp(TimeUnit::Nanosecond, tz) => timestamp(
            Some(
                downcast::<TimestampNanosecondArray>(array)?
                    .value(row)
                    .div_euclid(1_000),
            ),
            tz,
        ),
        _ => Value::String(array_value_to_string(array, row)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{raw_batch, JAN_1_2011_MICROS};
    use datafusion::arrow::datatypes::Field;
    use std::sync::Arc;

    #[test]
    fn flat_records_keep_column_order() -> Result<()> {
        let table = ResultTable::new(vec![raw_batch()?], false);
        assert_eq!(2, table.num_rows());
        assert_eq!(
            r#"{"fields":[{"name":"EventTime","type":"datetime"},{"name":"TagName","type":"string"},{"name":"Status","type":"string"},{"name":"Value","type":"number"}]}"#,
            serde_json::to_string(&table.table_schema())?
        );
        assert_eq!(
            r#"[{"EventTime":"2011-01-01T00:00:00.000000","TagName":"TestTag","Status":"Good","Value":1.01},{"EventTime":"2011-01-01T00:01:00.000000","TagName":"TestTag","Status":"Good","Value":2.5}]"#,
            serde_json::to_string(&table.records()?)?
        );
        Ok(())
    }

    #[test]
    fn non_finite_values_become_null() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("TagName", DataType::Utf8, true),
            Field::new("Value", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec![Some("A"), Some("B"), None])),
                Arc::new(Float64Array::from(vec![
                    Some(f64::NAN),
                    Some(f64::INFINITY),
                    None,
                ])),
            ],
        )?;
        let records = flat_records(&[batch])?;
        assert_eq!(
            r#"[{"TagName":"A","Value":null},{"TagName":"B","Value":null},{"TagName":null,"Value":null}]"#,
            serde_json::to_string(&records)?
        );
        Ok(())
    }

    #[test]
    fn pivoted_records_lead_with_event_time() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("T1", DataType::Float64, true),
            Field::new(
                "EventTime",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".to_string())),
                true,
            ),
            Field::new("T2", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![0.5])),
                Arc::new(TimestampMicrosecondArray::from_vec(
                    vec![JAN_1_2011_MICROS + 123_456],
                    Some("UTC".to_string()),
                )),
                Arc::new(Int64Array::from(vec![7])),
            ],
        )?;
        let table = ResultTable::new(vec![batch], true);
        assert!(table.is_pivoted());

        let names: Vec<String> = table
            .table_schema()
            .fields
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(vec!["EventTime", "T1", "T2"], names);
        assert_eq!(
            r#"[{"EventTime":"2011-01-01T00:00:00.123456Z","T1":0.5,"T2":7}]"#,
            serde_json::to_string(&table.records()?)?
        );
        Ok(())
    }

    #[test]
    fn out_of_range_timestamps_become_null() -> Result<()> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Seconds", DataType::Timestamp(TimeUnit::Second, None), true),
            Field::new("Millis", DataType::Timestamp(TimeUnit::Millisecond, None), true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(TimestampSecondArray::from(vec![i64::MAX, 1_293_840_000])),
                Arc::new(TimestampMillisecondArray::from(vec![
                    i64::MIN,
                    1_293_840_000_250,
                ])),
            ],
        )?;
        assert_eq!(
            r#"[{"Seconds":null,"Millis":null},{"Seconds":"2011-01-01T00:00:00.000000","Millis":"2011-01-01T00:00:00.250000"}]"#,
            serde_json::to_string(&flat_records(&[batch])?)?
        );
        Ok(())
    }

    #[test]
    fn empty_tables_have_no_fields() -> Result<()> {
        let table = ResultTable::new(vec![], false);
        assert_eq!(TableSchema::default(), table.table_schema());
        assert!(table.records()?.is_empty());
        Ok(())
    }
}
