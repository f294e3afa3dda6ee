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

//! Logical query parameters.

use crate::error::{Result, SensorError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The logical request every analytic is built from.
///
/// `business_unit`, `region`, `asset`, `data_security_level` and `data_type`
/// identify the physical table; the remaining fields shape the statement.
/// Aggregation fields are only read by the analytics that need them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParameters {
    /// Business unit, the catalog of the sensor tables.
    pub business_unit:                 String,
    /// Region. Not part of the table name but kept for auditing.
    pub region:                        String,
    /// Asset.
    pub asset:                         String,
    /// Data security level.
    pub data_security_level:           String,
    /// Value type of the table: `float`, `integer`, `double` or `string`.
    pub data_type:                     String,
    /// Tags to select, in request order.
    pub tag_names:                     Vec<String>,
    /// Inclusive range start.
    pub start_date:                    Option<String>,
    /// Inclusive range end.
    pub end_date:                      Option<String>,
    /// Keep rows whose status is `Bad`.
    pub include_bad_data:              bool,
    /// Page size. Requires `offset`.
    pub limit:                         Option<i64>,
    /// Rows to skip. Requires `limit`.
    pub offset:                        Option<i64>,
    /// Add the unit of measure from the metadata table.
    pub display_uom:                   bool,
    /// Compare tag names case-insensitively.
    pub case_insensitivity_tag_search: bool,
    /// Bucket width, in `time_interval_unit`s.
    pub time_interval_rate:            Option<u32>,
    /// Bucket width unit.
    pub time_interval_unit:            Option<IntervalUnit>,
    /// Aggregate applied inside each bucket.
    pub agg_method:                    Option<AggregationMethod>,
    /// Gap filling strategy.
    pub interpolation_method:          Option<InterpolationMethod>,
    /// Lower bound of a circular quantity, e.g. `0` degrees.
    pub lower_bound:                   Option<f64>,
    /// Upper bound of a circular quantity, e.g. `360` degrees.
    pub upper_bound:                   Option<f64>,
    /// Pivot aggregated output into one column per tag.
    pub pivot:                         bool,
}

/// Units accepted for bucket widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Seconds.
    #[serde(alias = "seconds")]
    Second,
    /// Minutes.
    #[serde(alias = "minutes")]
    Minute,
    /// Hours.
    #[serde(alias = "hours")]
    Hour,
    /// Days.
    #[serde(alias = "days")]
    Day,
}

impl IntervalUnit {
    /// The keyword used inside `INTERVAL '<n> <unit>'`.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
        }
    }

    /// Number of seconds in one unit.
    pub fn seconds(&self) -> i64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3_600,
            IntervalUnit::Day => 86_400,
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "second" | "seconds" => Ok(IntervalUnit::Second),
            "minute" | "minutes" => Ok(IntervalUnit::Minute),
            "hour" | "hours" => Ok(IntervalUnit::Hour),
            "day" | "days" => Ok(IntervalUnit::Day),
            _ => Err(SensorError::InvalidParameters(format!(
                "Unsupported time_interval_unit '{}'",
                s
            ))),
        }
    }
}

/// Aggregates available to resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// First value of the bucket.
    First,
    /// Last value of the bucket.
    Last,
    /// Mean.
    Avg,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Sum.
    Sum,
    /// Sample standard deviation.
    Stddev,
}

impl AggregationMethod {
    /// The Spark SQL function name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::First => "first",
            AggregationMethod::Last => "last",
            AggregationMethod::Avg => "avg",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Sum => "sum",
            AggregationMethod::Stddev => "stddev",
        }
    }
}

impl FromStr for AggregationMethod {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "first" => Ok(AggregationMethod::First),
            "last" => Ok(AggregationMethod::Last),
            "avg" => Ok(AggregationMethod::Avg),
            "min" => Ok(AggregationMethod::Min),
            "max" => Ok(AggregationMethod::Max),
            "sum" => Ok(AggregationMethod::Sum),
            "stddev" => Ok(AggregationMethod::Stddev),
            _ => Err(SensorError::InvalidParameters(format!(
                "Unsupported agg_method '{}'",
                s
            ))),
        }
    }
}

/// Gap filling strategies for interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Carry the last known value forward.
    ForwardFill,
    /// Carry the next known value backward.
    BackwardFill,
    /// Interpolate linearly in time between the surrounding known values.
    Linear,
}

impl FromStr for InterpolationMethod {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forward_fill" => Ok(InterpolationMethod::ForwardFill),
            "backward_fill" => Ok(InterpolationMethod::BackwardFill),
            "linear" => Ok(InterpolationMethod::Linear),
            _ => Err(SensorError::InvalidParameters(format!(
                "Unsupported interpolation_method '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_from_json() -> Result<()> {
        let params: QueryParameters = serde_json::from_str(
            r#"{
                "business_unit": "bu",
                "region": "r",
                "asset": "a",
                "data_security_level": "s",
                "data_type": "float",
                "tag_names": ["T1"],
                "start_date": "2011-01-01",
                "end_date": "2011-01-02",
                "include_bad_data": true,
                "time_interval_unit": "minutes",
                "agg_method": "avg",
                "interpolation_method": "forward_fill"
            }"#,
        )?;
        assert_eq!(vec!["T1".to_string()], params.tag_names);
        assert_eq!(Some(IntervalUnit::Minute), params.time_interval_unit);
        assert_eq!(Some(AggregationMethod::Avg), params.agg_method);
        assert_eq!(
            Some(InterpolationMethod::ForwardFill),
            params.interpolation_method
        );
        assert!(params.limit.is_none());
        assert!(!params.pivot);
        Ok(())
    }

    #[test]
    fn enums_from_str() -> Result<()> {
        assert_eq!(IntervalUnit::Hour, "Hours".parse()?);
        assert_eq!(900, IntervalUnit::Minute.seconds() * 15);
        assert_eq!(AggregationMethod::Stddev, "stddev".parse()?);
        assert_eq!(InterpolationMethod::Linear, "linear".parse()?);
        assert!("fortnight".parse::<IntervalUnit>().is_err());
        assert!("median".parse::<AggregationMethod>().is_err());
        Ok(())
    }
}
