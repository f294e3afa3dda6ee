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

//! Connection settings for the Databricks SQL warehouse.

use crate::configs::*;
use crate::error::{Result, SensorError};
use std::env;
use std::time::Duration;

/// Databricks SQL warehouse configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabricksConfig {
    /// The workspace host name, e.g. `adb-1234567890123456.7.azuredatabricks.net`.
    pub server_hostname: String,
    /// The HTTP path of the SQL warehouse.
    ///
    /// Both `/sql/1.0/warehouses/<id>` and the older `/sql/1.0/endpoints/<id>`
    /// forms are accepted; the warehouse id is the last path segment.
    pub http_path:       String,
    /// An explicit warehouse id. Takes precedence over the id embedded in
    /// `http_path`.
    pub warehouse_id:    Option<String>,
    /// The personal access token or AAD token used when the caller doesn't
    /// supply one.
    pub access_token:    Option<String>,
    /// How long a statement request may block before the warehouse returns a
    /// pending statement, in the `<n>s` form the REST API expects.
    pub wait_timeout:    String,
    /// Delay between two polls of a pending statement.
    pub poll_interval:   Duration,
}

impl DatabricksConfig {
    /// Loads the configuration from the embedded settings and lets the
    /// `DATABRICKS_*` environment variables override them.
    pub fn from_env() -> Result<Self> {
        let poll_interval = humantime::parse_duration(&DATABRICKS_POLL_INTERVAL)
            .map_err(|e| SensorError::Internal(format!("invalid poll interval: {}", e)))?;

        Ok(DatabricksConfig {
            server_hostname: env::var("DATABRICKS_SERVER_HOSTNAME")
                .unwrap_or_else(|_| DATABRICKS_SERVER_HOSTNAME.to_string()),
            http_path: env::var("DATABRICKS_HTTP_PATH")
                .unwrap_or_else(|_| DATABRICKS_HTTP_PATH.to_string()),
            warehouse_id: env::var("DATABRICKS_WAREHOUSE_ID")
                .ok()
                .or_else(|| Some(DATABRICKS_WAREHOUSE_ID.to_string()))
                .filter(|id| !id.trim().is_empty()),
            access_token: env::var("DATABRICKS_TOKEN").ok(),
            wait_timeout: DATABRICKS_WAIT_TIMEOUT.to_string(),
            poll_interval,
        })
    }

    /// Returns the id of the SQL warehouse statements are sent to.
    pub fn warehouse_id(&self) -> Result<String> {
        if let Some(id) = &self.warehouse_id {
            return Ok(id.to_owned());
        }
        self.http_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(|id| id.to_string())
            .ok_or_else(|| {
                SensorError::Driver(format!(
                    "Unable to find a warehouse id in http path: {}",
                    self.http_path
                ))
            })
    }

    /// Returns the base URL of the workspace REST API.
    pub fn base_url(&self) -> String {
        let host = self
            .server_hostname
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("https://{}", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(http_path: &str) -> DatabricksConfig {
        DatabricksConfig {
            server_hostname: "https://mock.cloud.databricks.com/".to_string(),
            http_path:       http_path.to_string(),
            warehouse_id:    None,
            access_token:    None,
            wait_timeout:    "30s".to_string(),
            poll_interval:   Duration::from_millis(10),
        }
    }

    #[test]
    fn warehouse_id_from_http_path() -> Result<()> {
        assert_eq!(
            "9ecb6a8d6707260c",
            config("/sql/1.0/endpoints/9ecb6a8d6707260c").warehouse_id()?
        );
        assert_eq!(
            "abc",
            config("/sql/1.0/warehouses/abc/").warehouse_id()?
        );

        let mut explicit = config("/sql/1.0/warehouses/abc");
        explicit.warehouse_id = Some("xyz".to_string());
        assert_eq!("xyz", explicit.warehouse_id()?);

        assert!(config("").warehouse_id().is_err());
        Ok(())
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            "https://mock.cloud.databricks.com",
            config("/sql/1.0/warehouses/abc").base_url()
        );
    }
}
