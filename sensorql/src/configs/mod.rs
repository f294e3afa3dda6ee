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

//! This module provides various default configurations for SensorQL.

pub mod databricks;
pub use databricks::DatabricksConfig;

mod sensorql;
pub use self::sensorql::SENSORQL_CONF;
use lazy_static::lazy_static;

lazy_static! {
    /// The schema every sensor table lives in, i.e. the `sensors` part of
    /// `{business_unit}.sensors.{asset}_{data_security_level}_events_{data_type}`.
    pub static ref SENSORQL_TABLE_SCHEMA: String = SENSORQL_CONF["tables"]["schema"].to_string();
    /// Suffix of the per-asset metadata table.
    pub static ref SENSORQL_METADATA_SUFFIX: String = SENSORQL_CONF["tables"]["metadata_suffix"].to_string();
    /// Suffix of the per-asset latest-value table.
    pub static ref SENSORQL_LATEST_SUFFIX: String = SENSORQL_CONF["tables"]["latest_suffix"].to_string();

    /// Default Databricks workspace host name.
    pub static ref DATABRICKS_SERVER_HOSTNAME: String = SENSORQL_CONF["databricks"]["server_hostname"].to_string();
    /// Default Databricks SQL warehouse HTTP path.
    pub static ref DATABRICKS_HTTP_PATH: String = SENSORQL_CONF["databricks"]["http_path"].to_string();
    /// Default SQL warehouse id, empty when it comes from the HTTP path.
    pub static ref DATABRICKS_WAREHOUSE_ID: String = SENSORQL_CONF["databricks"]["warehouse_id"].to_string();
    /// How long the warehouse may hold a statement request before answering
    /// with a pending state.
    pub static ref DATABRICKS_WAIT_TIMEOUT: String = SENSORQL_CONF["databricks"]["wait_timeout"].to_string();
    /// Delay between two polls of a pending statement.
    pub static ref DATABRICKS_POLL_INTERVAL: String = SENSORQL_CONF["databricks"]["poll_interval"].to_string();

    /// Path prefix the HTTP API is mounted under.
    pub static ref SENSORQL_API_PREFIX: String = SENSORQL_CONF["api"]["prefix"].to_string();
}
