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

//! Query functions: build the statement, run it on the caller's connection,
//! and hand the rows back unchanged.
//!
//! Each function consumes the connection. It is closed before the function
//! returns, whether or not the query succeeded.

use crate::connectors::{execute, Connection};
use crate::error::Result;
use crate::query::builder::QueryBuilder;
use crate::query::parameters::QueryParameters;
use crate::query::QueryType;
use crate::result::ResultTable;
use log::{error, info};

/// Runs `query_type` for `params` on `connection`.
///
/// Invalid parameters fail before the connection is used; it is still closed.
pub async fn get(
    mut connection: Box<dyn Connection>,
    params: &QueryParameters,
    query_type: QueryType,
) -> Result<ResultTable> {
    let builder = match QueryBuilder::try_new(params, query_type) {
        Ok(builder) => builder,
        Err(e) => {
            error!("error with {} function: {}", query_type, e);
            if let Err(close_error) = connection.close().await {
                error!("error closing connection: {}", close_error);
            }
            return Err(e);
        }
    };

    let sql = builder.to_sql();
    match execute(connection, &sql).await {
        Ok(batches) => {
            let table = ResultTable::new(batches, builder.is_pivoted());
            info!("{} returned {} rows", query_type, table.num_rows());
            Ok(table)
        }
        Err(e) => {
            error!("error returning {} results: {}", query_type, e);
            Err(e)
        }
    }
}

/// Raw events of the requested tags.
pub async fn raw(connection: Box<dyn Connection>, params: &QueryParameters) -> Result<ResultTable> {
    get(connection, params, QueryType::Raw).await
}

/// Events aggregated into `time_interval_rate` x `time_interval_unit` buckets
/// with `agg_method`.
pub async fn resample(
    connection: Box<dyn Connection>,
    params: &QueryParameters,
) -> Result<ResultTable> {
    get(connection, params, QueryType::Resample).await
}

/// Resampled events with empty buckets filled by `interpolation_method`.
pub async fn interpolate(
    connection: Box<dyn Connection>,
    params: &QueryParameters,
) -> Result<ResultTable> {
    get(connection, params, QueryType::Interpolate).await
}

/// Circular mean per bucket, within `[lower_bound, upper_bound)`.
pub async fn circular_average(
    connection: Box<dyn Connection>,
    params: &QueryParameters,
) -> Result<ResultTable> {
    get(connection, params, QueryType::CircularAverage).await
}

/// Circular standard deviation per bucket, in the units of the bounds.
pub async fn circular_standard_deviation(
    connection: Box<dyn Connection>,
    params: &QueryParameters,
) -> Result<ResultTable> {
    get(connection, params, QueryType::CircularStandardDeviation).await
}

/// Resampled events, one column per tag.
pub async fn pivot(connection: Box<dyn Connection>, params: &QueryParameters) -> Result<ResultTable> {
    get(connection, params, QueryType::Pivot).await
}

/// The latest value of each tag.
pub async fn latest(connection: Box<dyn Connection>, params: &QueryParameters) -> Result<ResultTable> {
    get(connection, params, QueryType::Latest).await
}

/// Tag metadata.
pub async fn metadata(
    connection: Box<dyn Connection>,
    params: &QueryParameters,
) -> Result<ResultTable> {
    get(connection, params, QueryType::Metadata).await
}

/// Per-tag statistics over raw events.
pub async fn summary(connection: Box<dyn Connection>, params: &QueryParameters) -> Result<ResultTable> {
    get(connection, params, QueryType::Summary).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::query::parameters::{AggregationMethod, IntervalUnit};
    use crate::test_util::{raw_batch, MockConnection};

    fn params() -> QueryParameters {
        QueryParameters {
            business_unit: "mocked-buiness-unit".to_string(),
            region: "mocked-region".to_string(),
            asset: "mocked-asset".to_string(),
            data_security_level: "mocked-data-security-level".to_string(),
            data_type: "mocked-data-type".to_string(),
            tag_names: vec!["MOCKED-TAGNAME".to_string()],
            start_date: Some("2011-01-01".to_string()),
            end_date: Some("2011-01-02".to_string()),
            include_bad_data: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn raw_get() -> Result<()> {
        let connection = MockConnection::new(vec![raw_batch()?]);
        let log = connection.log();

        let table = raw(Box::new(connection), &params()).await?;
        assert!(!table.is_pivoted());
        assert_eq!(2, table.num_rows());

        let log = log.lock().await;
        assert_eq!(
            vec![QueryBuilder::build(&params(), QueryType::Raw)?],
            log.executed
        );
        assert!(log.executed[0].contains(
            "FROM `mocked-buiness-unit`.`sensors`.\
             `mocked-asset_mocked-data-security-level_events_mocked-data-type`"
        ));
        assert_eq!(vec!["cursor.close", "connection.close"], log.closed);
        Ok(())
    }

    #[tokio::test]
    async fn raw_offset_limit() -> Result<()> {
        let connection = MockConnection::new(vec![raw_batch()?]);
        let log = connection.log();
        let params = QueryParameters {
            limit: Some(10),
            offset: Some(10),
            ..params()
        };

        raw(Box::new(connection), &params).await?;
        assert!(log.lock().await.executed[0].ends_with("LIMIT 10 OFFSET 10"));
        Ok(())
    }

    #[tokio::test]
    async fn pivot_results_are_tagged() -> Result<()> {
        let connection = MockConnection::new(vec![raw_batch()?]);
        let params = QueryParameters {
            time_interval_rate: Some(15),
            time_interval_unit: Some(IntervalUnit::Minute),
            agg_method: Some(AggregationMethod::Avg),
            ..params()
        };
        let table = pivot(Box::new(connection), &params).await?;
        assert!(table.is_pivoted());
        Ok(())
    }

    #[tokio::test]
    async fn driver_errors_pass_through() -> Result<()> {
        let connection = MockConnection::failing("Error Connecting to Database");
        let log = connection.log();

        let err = raw(Box::new(connection), &params()).await.unwrap_err();
        assert_eq!("Error Connecting to Database", err.to_string());
        assert_eq!(vec!["cursor.close", "connection.close"], log.lock().await.closed);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_the_warehouse() -> Result<()> {
        let connection = MockConnection::new(vec![raw_batch()?]);
        let log = connection.log();
        let params = QueryParameters {
            offset: Some(10),
            ..params()
        };

        let err = raw(Box::new(connection), &params).await.unwrap_err();
        assert!(matches!(err, SensorError::InvalidParameters(_)));

        let log = log.lock().await;
        assert!(log.executed.is_empty());
        assert_eq!(vec!["connection.close"], log.closed);
        Ok(())
    }
}
