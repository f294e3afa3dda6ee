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

//! API Gateway REST proxy integration.

use crate::api::{self, ApiRequest};
use sensorql::connectors::ConnectionFactory;
use sensorql::error::{Result, SensorError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The subset of an API Gateway proxy event the API reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// HTTP method.
    pub http_method:                      String,
    /// Request path.
    pub path:                             String,
    /// Single-valued headers.
    #[serde(default)]
    pub headers:                          Option<HashMap<String, String>>,
    /// Single-valued query parameters, last value wins.
    #[serde(default)]
    pub query_string_parameters:          Option<HashMap<String, String>>,
    /// Every query parameter value in arrival order.
    #[serde(default)]
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    /// Raw request body.
    #[serde(default)]
    pub body:                             Option<String>,
    /// Whether `body` is base64-encoded.
    #[serde(default)]
    pub is_base64_encoded:                Option<bool>,
}

/// The response API Gateway expects from a proxy integration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// HTTP status code.
    pub status_code:       u16,
    /// Response headers.
    pub headers:           HashMap<String, String>,
    /// JSON body.
    pub body:              String,
    /// Always false, bodies are plain JSON.
    pub is_base64_encoded: bool,
}

impl ProxyRequest {
    /// Converts the event into a platform-neutral request.
    pub fn into_api_request(self) -> Result<ApiRequest> {
        let mut query = vec![];
        if let Some(multi) = self.multi_value_query_string_parameters {
            let mut keys: Vec<_> = multi.into_iter().collect();
            keys.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, values) in keys {
                query.extend(values.into_iter().map(|v| (key.clone(), v)));
            }
        } else if let Some(single) = self.query_string_parameters {
            let mut pairs: Vec<_> = single.into_iter().collect();
            pairs.sort();
            query = pairs;
        }

        let body = match (self.body, self.is_base64_encoded.unwrap_or(false)) {
            (Some(body), true) => {
                let bytes = base64::decode(&body).map_err(|e| {
                    SensorError::InvalidParameters(format!("invalid base64 body: {}", e))
                })?;
                Some(String::from_utf8(bytes).map_err(|e| {
                    SensorError::InvalidParameters(format!("body is not UTF-8: {}", e))
                })?)
            }
            (body, _) => body,
        };

        Ok(ApiRequest {
            method: self.http_method.to_uppercase(),
            path: self.path,
            query,
            headers: self
                .headers
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            body,
        })
    }
}

fn json_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers
}

/// Serves one proxy event.
pub async fn handler(event: ProxyRequest, factory: &dyn ConnectionFactory) -> Result<ProxyResponse> {
    let response = match event.into_api_request() {
        Ok(request) => api::handle(&request, factory).await,
        Err(e) => api::ApiResponse {
            status: 400,
            body:   serde_json::to_string(&api::response::message(&e.to_string()))?,
        },
    };
    Ok(ProxyResponse {
        status_code:       response.status,
        headers:           json_headers(),
        body:              response.body,
        is_base64_encoded: false,
    })
}
