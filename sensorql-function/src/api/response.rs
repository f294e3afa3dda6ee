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

//! Response bodies.

use super::validation::FieldError;
use sensorql::error::Result;
use sensorql::query::parameters::QueryParameters;
use sensorql::result::{ResultTable, TableSchema};
use serde::Serialize;
use serde_json::{Map, Value};

/// Paging information echoed back to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pagination {
    /// The requested page size.
    pub limit:  Option<i64>,
    /// The requested offset.
    pub offset: Option<i64>,
    /// Offset of the next page, present only when this page came back full.
    pub next:   Option<i64>,
}

impl Pagination {
    /// Paging for a page of `rows` rows fetched with `params`.
    pub fn new(params: &QueryParameters, rows: usize) -> Self {
        let next = match params.limit {
            Some(limit) if limit > 0 && rows as i64 == limit => {
                Some(params.offset.unwrap_or(0) + limit)
            }
            _ => None,
        };
        Pagination {
            limit: params.limit,
            offset: params.offset,
            next,
        }
    }
}

/// The body of a successful response.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    /// Column names and types.
    pub schema:     TableSchema,
    /// One object per row.
    pub data:       Vec<Map<String, Value>>,
    /// Paging information.
    pub pagination: Pagination,
}

impl Envelope {
    /// Wraps a query result.
    pub fn try_new(table: &ResultTable, params: &QueryParameters) -> Result<Self> {
        Ok(Envelope {
            schema:     table.table_schema(),
            data:       table.records()?,
            pagination: Pagination::new(params, table.num_rows()),
        })
    }
}

/// The body of a failed response.
#[derive(Debug, Clone, Serialize)]
pub struct Detail<T: Serialize> {
    /// A message, or the list of validation errors.
    pub detail: T,
}

/// `{"detail": "<message>"}`
pub fn message(msg: &str) -> Detail<&str> {
    Detail { detail: msg }
}

/// `{"detail": [<field errors>]}`
pub fn field_errors(errors: &[FieldError]) -> Detail<&[FieldError]> {
    Detail { detail: errors }
}
