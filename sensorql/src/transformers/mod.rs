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

//! Stream transformers that normalize vendor payloads into the Process
//! Control Data Model (PCDM).

pub mod aio;

use crate::error::Result;
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::record_batch::RecordBatch;
use std::fmt::Debug;
use std::sync::Arc;

/// Status of every event a transformer emits.
pub const PCDM_STATUS_GOOD: &str = "Good";

/// Change type of every event a transformer emits.
pub const PCDM_CHANGE_TYPE_INSERT: &str = "insert";

/// The PCDM event schema.
pub fn pcdm_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("TagName", DataType::Utf8, false),
        Field::new(
            "EventTime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("Status", DataType::Utf8, false),
        Field::new("Value", DataType::Utf8, true),
        Field::new("ValueType", DataType::Utf8, true),
        Field::new("ChangeType", DataType::Utf8, false),
    ]))
}

/// A transformer turns source batches into PCDM batches.
pub trait Transformer: Debug + Send + Sync {
    /// The type of the transformer.
    fn name(&self) -> String;
    /// Transforms every batch. Output batches follow [`pcdm_schema`].
    fn transform(&self, batches: &[RecordBatch]) -> Result<Vec<RecordBatch>>;
}
