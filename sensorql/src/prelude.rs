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

//! A "prelude" for users of the sensorql crate.
//!
//! Like the standard library's prelude, this module simplifies importing of
//! common items. Unlike the standard prelude, the contents of this module must
//! be imported manually:
//!
//! ```
//! use sensorql::prelude::*;
//! ```

pub use crate::configs::*;
pub use crate::connectors::databricks::{DatabricksConnection, DatabricksConnectionFactory};
pub use crate::connectors::{execute, Connection, ConnectionFactory, Cursor};
pub use crate::error::{Result, SensorError};
pub use crate::query::builder::QueryBuilder;
pub use crate::query::parameters::{
    AggregationMethod, InterpolationMethod, IntervalUnit, QueryParameters,
};
pub use crate::query::QueryType;
pub use crate::result::{FieldSchema, FieldType, ResultTable, TableSchema};
pub use crate::timeseries;
pub use crate::transformers::aio::AioJsonToPcdmTransformer;
pub use crate::transformers::{pcdm_schema, Transformer};
