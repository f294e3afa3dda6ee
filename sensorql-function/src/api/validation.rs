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

//! Request validation.
//!
//! Turns query strings and JSON bodies into [`QueryParameters`], collecting
//! every problem as a [`FieldError`] instead of stopping at the first one.
//! Nothing here talks to the warehouse.

use sensorql::datetime::{parse_query_date, Boundary};
use sensorql::query::parameters::QueryParameters;
use sensorql::query::QueryType;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// One validation failure, reported under `detail` in a 422 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Machine-readable error kind, e.g. `missing` or `int_parsing`.
    #[serde(rename = "type")]
    pub error_type: &'static str,
    /// Where the offending value lives, e.g. `["query", "start_date"]`.
    pub loc:        Vec<Value>,
    /// Human-readable description.
    pub msg:        String,
    /// The rejected input, `null` when missing.
    pub input:      Value,
}

/// Where tag names are read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagSource<'a> {
    /// Repeated `tag_names` query parameters (GET).
    Query,
    /// A `{"tag_names": [...]}` JSON body (POST).
    Body(Option<&'a str>),
}

const UNIT_CHOICES: &str = "'second', 'minute', 'hour' or 'day'";
const AGG_CHOICES: &str = "'first', 'last', 'avg', 'min', 'max', 'sum' or 'stddev'";
const FILL_CHOICES: &str = "'forward_fill', 'backward_fill' or 'linear'";

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

struct QueryFields<'a> {
    query:  &'a [(String, String)],
    errors: Vec<FieldError>,
}

impl<'a> QueryFields<'a> {
    fn last(&self, name: &str) -> Option<&'a str> {
        self.query
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn all(&self, name: &str) -> Vec<String> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.to_owned())
            .collect()
    }

    fn error(&mut self, error_type: &'static str, name: &str, msg: String, input: Value) {
        self.errors.push(FieldError {
            error_type,
            loc: vec!["query".into(), name.into()],
            msg,
            input,
        });
    }

    fn present(&mut self, name: &str, required: bool) -> Option<&'a str> {
        let value = self.last(name);
        if value.is_none() && required {
            self.error("missing", name, "Field required".to_string(), Value::Null);
        }
        value
    }

    fn parsed<T>(
        &mut self,
        name: &str,
        required: bool,
        error_type: &'static str,
        msg: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        let value = self.present(name, required)?;
        let parsed = parse(value);
        if parsed.is_none() {
            self.error(error_type, name, msg.to_string(), value.into());
        }
        parsed
    }

    fn string(&mut self, name: &str, required: bool) -> Option<String> {
        self.present(name, required).map(|v| v.to_owned())
    }

    fn boolean(&mut self, name: &str, required: bool) -> Option<bool> {
        self.parsed(
            name,
            required,
            "bool_parsing",
            "Input should be a valid boolean, unable to interpret input",
            parse_bool,
        )
    }

    fn integer<T: FromStr>(&mut self, name: &str, required: bool) -> Option<T> {
        self.parsed(
            name,
            required,
            "int_parsing",
            "Input should be a valid integer, unable to parse string as an integer",
            |v| v.trim().parse::<T>().ok(),
        )
    }

    fn number(&mut self, name: &str, required: bool) -> Option<f64> {
        self.parsed(
            name,
            required,
            "float_parsing",
            "Input should be a valid number, unable to parse string as a number",
            |v| v.trim().parse::<f64>().ok(),
        )
    }

    fn choice<T: FromStr>(&mut self, name: &str, required: bool, choices: &str) -> Option<T> {
        self.parsed(
            name,
            required,
            "enum",
            &format!("Input should be {}", choices),
            |v| v.parse::<T>().ok(),
        )
    }

    fn date(&mut self, name: &str, required: bool, boundary: Boundary) -> Option<String> {
        self.parsed(
            name,
            required,
            "datetime_parsing",
            "Input should be a valid datetime or date",
            |v| parse_query_date(v, boundary).ok().map(|_| v.to_owned()),
        )
    }
}

fn body_error(error_type: &'static str, loc: Vec<Value>, msg: &str, input: Value) -> FieldError {
    let mut full = vec![Value::from("body")];
    full.extend(loc);
    FieldError {
        error_type,
        loc: full,
        msg: msg.to_string(),
        input,
    }
}

/// Reads `tag_names` from a POST body.
fn body_tags(body: Option<&str>, required: bool, errors: &mut Vec<FieldError>) -> Vec<String> {
    let body = match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => body,
        None => {
            if required {
                errors.push(body_error("missing", vec![], "Field required", Value::Null));
            }
            return vec![];
        }
    };
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => {
            errors.push(body_error(
                "json_invalid",
                vec![],
                "JSON decode error",
                Value::String(e.to_string()),
            ));
            return vec![];
        }
    };
    let object = match json.as_object() {
        Some(object) => object,
        None => {
            errors.push(body_error(
                "dict_type",
                vec![],
                "Input should be a valid dictionary",
                json.clone(),
            ));
            return vec![];
        }
    };
    match object.get("tag_names") {
        None if required => {
            errors.push(body_error(
                "missing",
                vec!["tag_names".into()],
                "Field required",
                Value::Null,
            ));
            vec![]
        }
        None => vec![],
        Some(Value::Array(items)) => {
            let mut tags = vec![];
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(tag) => tags.push(tag.to_owned()),
                    None => errors.push(body_error(
                        "string_type",
                        vec!["tag_names".into(), i.into()],
                        "Input should be a valid string",
                        item.clone(),
                    )),
                }
            }
            tags
        }
        Some(other) => {
            errors.push(body_error(
                "list_type",
                vec!["tag_names".into()],
                "Input should be a valid list",
                other.clone(),
            ));
            vec![]
        }
    }
}

/// Validates a request for `query_type`.
///
/// Time-series analytics require the table, the time range and at least the
/// `tag_names` field; `latest` and `metadata` only need the table.
pub fn query_parameters(
    query_type: QueryType,
    query: &[(String, String)],
    tags: TagSource<'_>,
) -> Result<QueryParameters, Vec<FieldError>> {
    let mut fields = QueryFields {
        query,
        errors: vec![],
    };
    let time_series = query_type.is_time_series();
    let mut params = QueryParameters {
        business_unit: fields.string("business_unit", true).unwrap_or_default(),
        region: fields.string("region", true).unwrap_or_default(),
        asset: fields.string("asset", true).unwrap_or_default(),
        data_security_level: fields
            .string("data_security_level", true)
            .unwrap_or_default(),
        ..Default::default()
    };

    if time_series {
        params.data_type = fields.string("data_type", true).unwrap_or_default();
        params.include_bad_data = fields.boolean("include_bad_data", true).unwrap_or_default();
        params.start_date = fields.date("start_date", true, Boundary::Start);
        params.end_date = fields.date("end_date", true, Boundary::End);
    }

    params.tag_names = match tags {
        TagSource::Query => {
            let tags = fields.all("tag_names");
            if tags.is_empty() && time_series {
                fields.present("tag_names", true);
            }
            tags
        }
        TagSource::Body(body) => body_tags(body, time_series, &mut fields.errors),
    };

    let bucketed = query_type.is_aggregated();
    if bucketed {
        params.time_interval_rate = fields.integer("time_interval_rate", true);
        params.time_interval_unit = fields.choice("time_interval_unit", true, UNIT_CHOICES);
    }
    match query_type {
        QueryType::Resample | QueryType::Pivot => {
            params.agg_method = fields.choice("agg_method", true, AGG_CHOICES);
        }
        QueryType::Interpolate => {
            params.agg_method = fields.choice("agg_method", true, AGG_CHOICES);
            params.interpolation_method =
                fields.choice("interpolation_method", true, FILL_CHOICES);
        }
        QueryType::CircularAverage | QueryType::CircularStandardDeviation => {
            params.lower_bound = fields.number("lower_bound", true);
            params.upper_bound = fields.number("upper_bound", true);
        }
        _ => {}
    }

    params.limit = fields.integer("limit", false);
    params.offset = fields.integer("offset", false);
    if bucketed && query_type != QueryType::Pivot {
        params.pivot = fields.boolean("pivot", false).unwrap_or_default();
    }
    if time_series {
        params.display_uom = fields.boolean("display_uom", false).unwrap_or_default();
    }
    params.case_insensitivity_tag_search = fields
        .boolean("case_insensitivity_tag_search", false)
        .unwrap_or_default();

    if fields.errors.is_empty() {
        Ok(params)
    } else {
        Err(fields.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorql::query::parameters::{AggregationMethod, IntervalUnit};

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn raw_query() -> Vec<(String, String)> {
        query(&[
            ("business_unit", "mocked-buiness-unit"),
            ("region", "mocked-region"),
            ("asset", "mocked-asset"),
            ("data_security_level", "mocked-data-security-level"),
            ("data_type", "mocked-data-type"),
            ("tag_names", "MOCKED-TAGNAME1"),
            ("tag_names", "MOCKED-TAGNAME2"),
            ("start_date", "2011-01-01"),
            ("end_date", "2011-01-02"),
            ("include_bad_data", "true"),
        ])
    }

    #[test]
    fn raw_parameters() {
        let params = query_parameters(QueryType::Raw, &raw_query(), TagSource::Query).unwrap();
        assert_eq!(vec!["MOCKED-TAGNAME1", "MOCKED-TAGNAME2"], params.tag_names);
        assert!(params.include_bad_data);
        assert_eq!(Some("2011-01-01".to_string()), params.start_date);
        assert_eq!(None, params.limit);
    }

    #[test]
    fn missing_start_date() {
        let query: Vec<_> = raw_query()
            .into_iter()
            .filter(|(k, _)| k != "start_date")
            .collect();
        let errors = query_parameters(QueryType::Raw, &query, TagSource::Query).unwrap_err();
        assert_eq!(
            r#"[{"type":"missing","loc":["query","start_date"],"msg":"Field required","input":null}]"#,
            serde_json::to_string(&errors).unwrap()
        );
    }

    #[test]
    fn every_error_is_reported() {
        let mut query = raw_query();
        query.push(("include_bad_data".to_string(), "maybe".to_string()));
        query.push(("limit".to_string(), "ten".to_string()));
        query.push(("time_interval_unit".to_string(), "fortnight".to_string()));
        let errors = query_parameters(QueryType::Resample, &query, TagSource::Query).unwrap_err();
        let kinds: Vec<(&str, Value)> = errors
            .iter()
            .map(|e| (e.error_type, e.loc[1].clone()))
            .collect();
        assert_eq!(
            vec![
                ("bool_parsing", Value::from("include_bad_data")),
                ("missing", Value::from("time_interval_rate")),
                ("enum", Value::from("time_interval_unit")),
                ("missing", Value::from("agg_method")),
                ("int_parsing", Value::from("limit")),
            ],
            kinds
        );
        assert_eq!(
            "Input should be 'second', 'minute', 'hour' or 'day'",
            errors[2].msg
        );
        assert_eq!(Value::from("fortnight"), errors[2].input);
    }

    #[test]
    fn resample_parameters() {
        let mut query = raw_query();
        query.extend(self::query(&[
            ("time_interval_rate", "15"),
            ("time_interval_unit", "minute"),
            ("agg_method", "avg"),
            ("pivot", "True"),
            ("limit", "10"),
            ("offset", "20"),
        ]));
        let params = query_parameters(QueryType::Resample, &query, TagSource::Query).unwrap();
        assert_eq!(Some(15), params.time_interval_rate);
        assert_eq!(Some(IntervalUnit::Minute), params.time_interval_unit);
        assert_eq!(Some(AggregationMethod::Avg), params.agg_method);
        assert!(params.pivot);
        assert_eq!((Some(10), Some(20)), (params.limit, params.offset));
    }

    #[test]
    fn tags_from_the_body() {
        let query: Vec<_> = raw_query()
            .into_iter()
            .filter(|(k, _)| k != "tag_names")
            .collect();
        let params = query_parameters(
            QueryType::Raw,
            &query,
            TagSource::Body(Some(r#"{"tag_names": ["A", "B"]}"#)),
        )
        .unwrap();
        assert_eq!(vec!["A", "B"], params.tag_names);

        let errors = query_parameters(QueryType::Raw, &query, TagSource::Body(None)).unwrap_err();
        assert_eq!(vec![Value::from("body")], errors[0].loc);

        let errors = query_parameters(
            QueryType::Raw,
            &query,
            TagSource::Body(Some(r#"{"tag_names": "A"}"#)),
        )
        .unwrap_err();
        assert_eq!("list_type", errors[0].error_type);

        let errors =
            query_parameters(QueryType::Raw, &query, TagSource::Body(Some("{"))).unwrap_err();
        assert_eq!("json_invalid", errors[0].error_type);
    }

    #[test]
    fn metadata_needs_no_time_range() {
        let query = query(&[
            ("business_unit", "bu"),
            ("region", "r"),
            ("asset", "a"),
            ("data_security_level", "s"),
        ]);
        let params = query_parameters(QueryType::Metadata, &query, TagSource::Query).unwrap();
        assert!(params.tag_names.is_empty());
        assert!(params.start_date.is_none());
    }
}
