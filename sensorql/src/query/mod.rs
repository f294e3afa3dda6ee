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

//! Query construction: parameters in, one Spark SQL statement out.

pub mod builder;
pub mod parameters;
pub mod sql;

use crate::error::{Result, SensorError};
use parameters::QueryParameters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The analytics a statement can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Raw events in a time range.
    Raw,
    /// Events aggregated into fixed-width buckets.
    Resample,
    /// Resampled events with gaps filled.
    Interpolate,
    /// Circular mean per bucket.
    CircularAverage,
    /// Circular standard deviation per bucket.
    CircularStandardDeviation,
    /// Resampled events, one column per tag.
    Pivot,
    /// The most recent value of each tag.
    Latest,
    /// Tag metadata such as description and unit of measure.
    Metadata,
    /// Per-tag descriptive statistics over raw events.
    Summary,
}

impl QueryType {
    /// All query types, in routing order.
    pub const ALL: [QueryType; 9] = [
        QueryType::Raw,
        QueryType::Resample,
        QueryType::Interpolate,
        QueryType::CircularAverage,
        QueryType::CircularStandardDeviation,
        QueryType::Pivot,
        QueryType::Latest,
        QueryType::Metadata,
        QueryType::Summary,
    ];

    /// The name used in API paths, e.g. `circularaverage`.
    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Raw => "raw",
            QueryType::Resample => "resample",
            QueryType::Interpolate => "interpolate",
            QueryType::CircularAverage => "circularaverage",
            QueryType::CircularStandardDeviation => "circularstandarddeviation",
            QueryType::Pivot => "pivot",
            QueryType::Latest => "latest",
            QueryType::Metadata => "metadata",
            QueryType::Summary => "summary",
        }
    }

    /// Whether the analytic reads the raw event table in a time range.
    pub fn is_time_series(&self) -> bool {
        !matches!(self, QueryType::Latest | QueryType::Metadata)
    }

    /// Whether the analytic buckets events into time windows.
    pub fn is_aggregated(&self) -> bool {
        matches!(
            self,
            QueryType::Resample
                | QueryType::Interpolate
                | QueryType::CircularAverage
                | QueryType::CircularStandardDeviation
                | QueryType::Pivot
        )
    }

    /// Whether the statement built for `params` returns one column per tag.
    pub fn is_pivoted(&self, params: &QueryParameters) -> bool {
        match self {
            QueryType::Pivot => true,
            t if t.is_aggregated() => params.pivot,
            _ => false,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryType {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_lowercase().replace(|c| c == '_' || c == '-', "");
        QueryType::ALL
            .iter()
            .find(|t| t.name() == normalized)
            .copied()
            .ok_or_else(|| SensorError::InvalidParameters(format!("Unknown query type '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_from_path() -> Result<()> {
        assert_eq!(QueryType::Raw, "raw".parse()?);
        assert_eq!(QueryType::CircularAverage, "circular_average".parse()?);
        assert_eq!(
            QueryType::CircularStandardDeviation,
            "circularstandarddeviation".parse()?
        );
        for t in QueryType::ALL.iter() {
            assert_eq!(*t, t.name().parse()?);
        }
        assert!(matches!(
            "median".parse::<QueryType>(),
            Err(SensorError::InvalidParameters(_))
        ));
        Ok(())
    }

    #[test]
    fn pivot_flag_only_applies_to_aggregates() {
        let params = QueryParameters {
            pivot: true,
            ..Default::default()
        };
        assert!(QueryType::Pivot.is_pivoted(&QueryParameters::default()));
        assert!(QueryType::Resample.is_pivoted(&params));
        assert!(!QueryType::Raw.is_pivoted(&params));
        assert!(!QueryType::Summary.is_pivoted(&params));
    }
}
