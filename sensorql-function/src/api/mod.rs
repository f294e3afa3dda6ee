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

//! The HTTP API: routing, validation and response encoding, independent of
//! the platform the function is deployed on.

pub mod response;
pub mod validation;

use log::{error, info, warn};
use sensorql::configs::SENSORQL_API_PREFIX;
use sensorql::connectors::ConnectionFactory;
use sensorql::query::builder::QueryBuilder;
use sensorql::query::QueryType;
use sensorql::timeseries;
use serde::Serialize;
use std::collections::HashMap;
use validation::TagSource;

/// A platform-neutral HTTP request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiRequest {
    /// Upper-case HTTP method.
    pub method:  String,
    /// Request path, with or without the API prefix.
    pub path:    String,
    /// Query parameters in arrival order. Keys may repeat.
    pub query:   Vec<(String, String)>,
    /// Headers keyed by lower-case name.
    pub headers: HashMap<String, String>,
    /// Decoded request body.
    pub body:    Option<String>,
}

/// A status code and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON-encoded body.
    pub body:   String,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => ApiResponse { status, body },
            Err(e) => {
                error!("Failed to encode response: {}", e);
                ApiResponse {
                    status: 500,
                    body:   r#"{"detail":"Internal Server Error"}"#.to_string(),
                }
            }
        }
    }

    fn detail(status: u16, msg: &str) -> Self {
        Self::json(status, &response::message(msg))
    }
}

enum Route {
    Query(QueryType),
    NotFound,
}

fn route(path: &str) -> Route {
    let path = path.trim_end_matches('/');
    let path = path.strip_prefix(SENSORQL_API_PREFIX.as_str()).unwrap_or(path);
    match path.trim_start_matches('/').split('/').collect::<Vec<_>>()[..] {
        ["metadata"] => Route::Query(QueryType::Metadata),
        ["events", analytic] => QueryType::ALL
            .iter()
            .find(|t| t.name() == analytic)
            .map(|t| Route::Query(*t))
            .unwrap_or(Route::NotFound),
        _ => Route::NotFound,
    }
}

fn bearer_token(request: &ApiRequest) -> Option<&str> {
    let value = request.headers.get("authorization")?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Serves one request.
pub async fn handle(request: &ApiRequest, factory: &dyn ConnectionFactory) -> ApiResponse {
    let query_type = match route(&request.path) {
        Route::Query(query_type) => query_type,
        Route::NotFound => return ApiResponse::detail(404, "Not Found"),
    };
    let tags = match request.method.as_str() {
        "GET" => TagSource::Query,
        "POST" => TagSource::Body(request.body.as_deref()),
        _ => return ApiResponse::detail(405, "Method Not Allowed"),
    };

    let params = match validation::query_parameters(query_type, &request.query, tags) {
        Ok(params) => params,
        Err(errors) => {
            warn!("Rejected {} request: {} invalid fields", query_type, errors.len());
            return ApiResponse::json(422, &response::field_errors(&errors));
        }
    };

    if let Err(e) = QueryBuilder::try_new(&params, query_type) {
        warn!("Rejected {} request: {}", query_type, e);
        return ApiResponse::detail(400, &e.to_string());
    }

    let connection = match factory.connect(bearer_token(request)).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to connect for {}: {}", query_type, e);
            return ApiResponse::detail(400, &e.to_string());
        }
    };

    let table = match timeseries::get(connection, &params, query_type).await {
        Ok(table) => table,
        Err(e) => return ApiResponse::detail(400, &e.to_string()),
    };

    match response::Envelope::try_new(&table, &params) {
        Ok(envelope) => {
            info!("{} {} -> {} rows", request.method, request.path, envelope.data.len());
            ApiResponse::json(200, &envelope)
        }
        Err(e) => {
            error!("Failed to encode {} results: {}", query_type, e);
            ApiResponse::detail(400, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorql::error::Result;
    use sensorql::test_util::{raw_batch, MockConnection, MockConnectionFactory};
    use serde_json::Value;
    use std::str::FromStr;

    #[tokio::test]
    async fn version_check() -> Result<()> {
        let manifest = cargo_toml::Manifest::from_str(include_str!("../../Cargo.toml")).unwrap();
        assert_eq!(env!("CARGO_PKG_VERSION"), manifest.package.unwrap().version.get().unwrap());
        Ok(())
    }

    fn raw_query(with_tags: bool) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("business_unit", "mocked-buiness-unit"),
            ("region", "mocked-region"),
            ("asset", "mocked-asset"),
            ("data_security_level", "mocked-data-security-level"),
            ("data_type", "mocked-data-type"),
            ("start_date", "2011-01-01"),
            ("end_date", "2011-01-02"),
            ("include_bad_data", "true"),
        ];
        if with_tags {
            pairs.push(("tag_names", "TestTag"));
        }
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn get(path: &str, query: Vec<(String, String)>) -> ApiRequest {
        ApiRequest {
            method: "GET".to_string(),
            path: path.to_string(),
            query,
            ..Default::default()
        }
    }

    fn factory() -> Result<MockConnectionFactory> {
        Ok(MockConnectionFactory::new(MockConnection::new(vec![
            raw_batch()?,
        ])))
    }

    #[tokio::test]
    async fn raw_get_and_post_agree() -> Result<()> {
        let factory = factory()?;
        let by_get = handle(&get("/api/v1/events/raw", raw_query(true)), &factory).await;

        let post = ApiRequest {
            method: "POST".to_string(),
            body: Some(r#"{"tag_names": ["TestTag"]}"#.to_string()),
            ..get("/events/raw", raw_query(false))
        };
        let by_post = handle(&post, &factory).await;

        assert_eq!(200, by_get.status);
        assert_eq!(by_get, by_post);

        let json: Value = serde_json::from_str(&by_get.body)?;
        assert_eq!(
            r#"{"fields":[{"name":"EventTime","type":"datetime"},{"name":"TagName","type":"string"},{"name":"Status","type":"string"},{"name":"Value","type":"number"}]}"#,
            json["schema"].to_string()
        );
        assert_eq!(
            r#"{"EventTime":"2011-01-01T00:00:00.000000","TagName":"TestTag","Status":"Good","Value":1.01}"#,
            json["data"][0].to_string()
        );
        assert_eq!(
            r#"{"limit":null,"offset":null,"next":null}"#,
            json["pagination"].to_string()
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_start_date_is_unprocessable() -> Result<()> {
        let factory = factory()?;
        let query = raw_query(true)
            .into_iter()
            .filter(|(k, _)| k != "start_date")
            .collect();
        let response = handle(&get("/events/raw", query), &factory).await;
        assert_eq!(422, response.status);
        assert_eq!(
            r#"{"detail":[{"type":"missing","loc":["query","start_date"],"msg":"Field required","input":null}]}"#,
            response.body
        );
        assert!(factory.tokens.lock().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn driver_errors_are_bad_requests() -> Result<()> {
        let factory = MockConnectionFactory::unreachable("Error Connecting to Database");
        let response = handle(&get("/events/raw", raw_query(true)), &factory).await;
        assert_eq!(400, response.status);
        assert_eq!(r#"{"detail":"Error Connecting to Database"}"#, response.body);

        let factory = MockConnectionFactory::new(MockConnection::failing("Statement failed"));
        let response = handle(&get("/events/raw", raw_query(true)), &factory).await;
        assert_eq!(400, response.status);
        assert_eq!(r#"{"detail":"Statement failed"}"#, response.body);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_parameters_are_bad_requests() -> Result<()> {
        let factory = factory()?;
        let mut query = raw_query(true);
        query.push(("offset".to_string(), "10".to_string()));
        let response = handle(&get("/events/raw", query), &factory).await;
        assert_eq!(400, response.status);
        assert_eq!(
            r#"{"detail":"limit and offset must be supplied together"}"#,
            response.body
        );
        assert!(factory.tokens.lock().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_routes_and_methods() -> Result<()> {
        let factory = factory()?;
        let response = handle(&get("/events/median", raw_query(true)), &factory).await;
        assert_eq!(
            ApiResponse {
                status: 404,
                body:   r#"{"detail":"Not Found"}"#.to_string(),
            },
            response
        );

        let delete = ApiRequest {
            method: "DELETE".to_string(),
            ..get("/events/raw", raw_query(true))
        };
        let response = handle(&delete, &factory).await;
        assert_eq!(405, response.status);
        assert_eq!(r#"{"detail":"Method Not Allowed"}"#, response.body);
        Ok(())
    }

    #[tokio::test]
    async fn bearer_token_is_forwarded() -> Result<()> {
        let factory = factory()?;
        let mut request = get("/events/raw", raw_query(true));
        request
            .headers
            .insert("authorization".to_string(), "Bearer abc123".to_string());
        handle(&request, &factory).await;

        request.headers.clear();
        handle(&request, &factory).await;

        assert_eq!(
            vec![Some("abc123".to_string()), None],
            *factory.tokens.lock().await
        );
        Ok(())
    }

    #[tokio::test]
    async fn full_page_points_at_the_next() -> Result<()> {
        let factory = factory()?;
        let mut query = raw_query(true);
        query.push(("limit".to_string(), "2".to_string()));
        query.push(("offset".to_string(), "0".to_string()));
        let response = handle(&get("/events/raw", query), &factory).await;
        let json: Value = serde_json::from_str(&response.body)?;
        assert_eq!(
            r#"{"limit":2,"offset":0,"next":2}"#,
            json["pagination"].to_string()
        );
        Ok(())
    }

    #[test]
    fn routes() {
        assert!(matches!(
            route("/api/v1/events/circularaverage/"),
            Route::Query(QueryType::CircularAverage)
        ));
        assert!(matches!(route("/metadata"), Route::Query(QueryType::Metadata)));
        assert!(matches!(route("/api/v1/events"), Route::NotFound));
    }
}
