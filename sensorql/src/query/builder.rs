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

//! Turns [`QueryParameters`] into a single Spark SQL statement.
//!
//! Every statement over the event table starts from a `raw_events` CTE that
//! normalizes `EventTime` to the caller's timezone and applies the time range,
//! tag and status filters. Aggregated analytics then bucket the events with a
//! generated timestamp sequence and a range join.

use super::parameters::{AggregationMethod, InterpolationMethod, IntervalUnit, QueryParameters};
use super::sql::*;
use super::QueryType;
use crate::configs::{SENSORQL_LATEST_SUFFIX, SENSORQL_METADATA_SUFFIX, SENSORQL_TABLE_SCHEMA};
use crate::datetime::{offset_hhmm, parse_query_date, render_query_date, Boundary};
use crate::error::{Result, SensorError};
use chrono::{DateTime, FixedOffset};
use itertools::Itertools;
use log::debug;

/// The `Value` aggregate frame: every row of the partition.
const WHOLE_PARTITION: WindowFrame = WindowFrame {
    start: WindowFrameBound::UnboundedPreceding,
    end:   WindowFrameBound::UnboundedFollowing,
};

const UP_TO_CURRENT: WindowFrame = WindowFrame {
    start: WindowFrameBound::UnboundedPreceding,
    end:   WindowFrameBound::CurrentRow,
};

const FROM_CURRENT: WindowFrame = WindowFrame {
    start: WindowFrameBound::CurrentRow,
    end:   WindowFrameBound::UnboundedFollowing,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bucket {
    rate: u32,
    unit: IntervalUnit,
}

impl Bucket {
    fn seconds(&self) -> i64 {
        i64::from(self.rate) * self.unit.seconds()
    }

    fn interval(&self) -> Expr {
        Expr::Value(Literal::Interval {
            rate: self.rate,
            unit: self.unit.as_str(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Aggregation {
    Resample(AggregationMethod),
    Interpolate(AggregationMethod, InterpolationMethod),
    CircularAverage { lower: f64, upper: f64 },
    CircularStandardDeviation { lower: f64, upper: f64 },
}

#[derive(Debug, Clone, PartialEq)]
struct TimeRange {
    start: DateTime<FixedOffset>,
    end:   DateTime<FixedOffset>,
}

/// A validated query, ready to be rendered.
///
/// All validation happens in [`QueryBuilder::try_new`]; rendering cannot
/// fail and is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    query_type:       QueryType,
    events_table:     Option<TableName>,
    metadata_table:   TableName,
    latest_table:     TableName,
    tags:             Vec<String>,
    range:            Option<TimeRange>,
    include_bad_data: bool,
    case_insensitive: bool,
    display_uom:      bool,
    pivot:            bool,
    limit:            Option<Limit>,
    bucket:           Option<Bucket>,
    aggregation:      Option<Aggregation>,
}

impl QueryBuilder {
    /// Validates `params` for `query_type`.
    pub fn try_new(params: &QueryParameters, query_type: QueryType) -> Result<Self> {
        let catalog = table_part("business_unit", &params.business_unit)?;
        let asset = table_part("asset", &params.asset)?;
        let security = table_part("data_security_level", &params.data_security_level)?;
        let schema = Ident::try_quoted(SENSORQL_TABLE_SCHEMA.to_string())?;

        let table = |name: String| -> Result<TableName> {
            Ok(TableName(vec![
                Ident::try_quoted(catalog.clone())?,
                schema.clone(),
                Ident::try_quoted(name)?,
            ]))
        };

        let events_table = if query_type.is_time_series() {
            let data_type = table_part("data_type", &params.data_type)?;
            Some(table(format!("{}_{}_events_{}", asset, security, data_type))?)
        } else {
            None
        };
        let metadata_table = table(format!(
            "{}_{}_{}",
            asset, security, *SENSORQL_METADATA_SUFFIX
        ))?;
        let latest_table = table(format!("{}_{}_{}", asset, security, *SENSORQL_LATEST_SUFFIX))?;

        let tags: Vec<String> = params
            .tag_names
            .iter()
            .map(|tag| {
                if params.case_insensitivity_tag_search {
                    tag.to_uppercase()
                } else {
                    tag.to_owned()
                }
            })
            .unique()
            .collect();
        if query_type.is_time_series() && tags.is_empty() {
            return Err(SensorError::InvalidParameters(
                "At least one tag name is required".to_string(),
            ));
        }

        let range = if query_type.is_time_series() {
            Some(time_range(params)?)
        } else {
            None
        };

        let limit = match (params.limit, params.offset) {
            (None, None) => None,
            (Some(limit), Some(offset)) if limit >= 0 && offset >= 0 => {
                Some(Limit { limit, offset })
            }
            (Some(_), Some(_)) => {
                return Err(SensorError::InvalidParameters(
                    "limit and offset must not be negative".to_string(),
                ))
            }
            _ => {
                return Err(SensorError::InvalidParameters(
                    "limit and offset must be supplied together".to_string(),
                ))
            }
        };

        let bucket = if query_type.is_aggregated() {
            Some(bucket(params)?)
        } else {
            None
        };

        let aggregation = match query_type {
            QueryType::Resample | QueryType::Pivot => {
                Some(Aggregation::Resample(required(params.agg_method, "agg_method")?))
            }
            QueryType::Interpolate => Some(Aggregation::Interpolate(
                required(params.agg_method, "agg_method")?,
                required(params.interpolation_method, "interpolation_method")?,
            )),
            QueryType::CircularAverage => {
                let (lower, upper) = bounds(params)?;
                Some(Aggregation::CircularAverage { lower, upper })
            }
            QueryType::CircularStandardDeviation => {
                let (lower, upper) = bounds(params)?;
                Some(Aggregation::CircularStandardDeviation { lower, upper })
            }
            _ => None,
        };

        Ok(QueryBuilder {
            query_type,
            events_table,
            metadata_table,
            latest_table,
            tags,
            range,
            include_bad_data: params.include_bad_data,
            case_insensitive: params.case_insensitivity_tag_search,
            display_uom: params.display_uom,
            pivot: query_type.is_pivoted(params),
            limit,
            bucket,
            aggregation,
        })
    }

    /// Validates `params` and renders the statement for `query_type`.
    pub fn build(params: &QueryParameters, query_type: QueryType) -> Result<String> {
        let sql = Self::try_new(params, query_type)?.to_sql();
        debug!("{} query: {}", query_type, sql);
        Ok(sql)
    }

    /// The analytic this builder renders.
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Whether the statement returns one column per tag.
    pub fn is_pivoted(&self) -> bool {
        self.pivot
    }

    /// Renders the statement.
    pub fn to_sql(&self) -> String {
        self.query().to_string()
    }

    /// The statement as a syntax tree.
    pub fn query(&self) -> Query {
        match (self.query_type, &self.events_table, &self.range) {
            (QueryType::Latest, _, _) => self.lookup(&self.latest_table),
            (QueryType::Metadata, _, _) => self.lookup(&self.metadata_table),
            (QueryType::Raw, Some(events), Some(range)) => self.raw(events, range),
            (QueryType::Summary, Some(events), Some(range)) => self.summary(events, range),
            (_, Some(events), Some(range)) => self.aggregate(events, range),
            // try_new always sets a table and range for time-series analytics.
            _ => self.lookup(&self.latest_table),
        }
    }

    fn tag_column(&self) -> Expr {
        if self.case_insensitive {
            func("UPPER", vec![col("TagName")])
        } else {
            col("TagName")
        }
    }

    /// Bucketed analytics join and pivot on the upper-cased tag names when the
    /// search is case-insensitive.
    fn folds_tag_names(&self) -> bool {
        self.case_insensitive && self.query_type.is_aggregated()
    }

    fn tag_values(&self) -> Vec<Expr> {
        self.tags.iter().map(|tag| string(tag.as_str())).collect()
    }

    fn raw_events(&self, events: &TableName, range: &TimeRange) -> Select {
        let event_time = func(
            "from_utc_timestamp",
            vec![
                func(
                    "to_timestamp",
                    vec![func(
                        "date_format",
                        vec![col("EventTime"), string("yyyy-MM-dd HH:mm:ss.SSS")],
                    )],
                ),
                string(offset_hhmm(&range.start)),
            ],
        );

        let tag_name = if self.folds_tag_names() {
            self.tag_column().alias("TagName")
        } else {
            col("TagName").into()
        };

        let mut selection = col("EventTime")
            .between(
                func("to_timestamp", vec![string(render_query_date(&range.start))]),
                func("to_timestamp", vec![string(render_query_date(&range.end))]),
            )
            .and(self.tag_column().in_list(self.tag_values()));
        if !self.include_bad_data {
            selection = selection.and(col("Status").not_eq(string("Bad")));
        }

        Select::new(
            vec![
                event_time.alias("EventTime"),
                tag_name,
                col("Status").into(),
                col("Value").into(),
            ],
            Relation::Table {
                name:  events.clone(),
                alias: None,
            },
        )
        .with_distinct()
        .with_selection(selection)
    }

    fn raw(&self, events: &TableName, range: &TimeRange) -> Query {
        let raw_events = self.raw_events(events, range);
        if self.display_uom {
            return self.finish(
                vec![Cte {
                    name:   "raw_events",
                    select: raw_events,
                }],
                "raw_events",
                &["TagName", "EventTime"],
            );
        }
        Query {
            ctes: vec![],
            body: raw_events
                .with_order_by(vec![col("TagName"), col("EventTime")])
                .with_limit(self.limit),
        }
    }

    fn summary(&self, events: &TableName, range: &TimeRange) -> Query {
        let stat = |name: &'static str, alias: &'static str| func(name, vec![col("Value")]).alias(alias);
        let summary = Select::new(
            vec![
                col("TagName").into(),
                stat("count", "Count"),
                stat("avg", "Avg"),
                stat("min", "Min"),
                stat("max", "Max"),
                stat("stddev", "StDev"),
                stat("sum", "Sum"),
                stat("variance", "Var"),
            ],
            Relation::named("raw_events"),
        )
        .with_group_by(vec![col("TagName")]);

        self.finish(
            vec![
                Cte {
                    name:   "raw_events",
                    select: self.raw_events(events, range),
                },
                Cte {
                    name:   "summary",
                    select: summary,
                },
            ],
            "summary",
            &["TagName"],
        )
    }

    fn lookup(&self, table: &TableName) -> Query {
        let mut select = Select::wildcard(Relation::Table {
            name:  table.clone(),
            alias: None,
        });
        if !self.tags.is_empty() {
            select = select.with_selection(self.tag_column().in_list(self.tag_values()));
        }
        Query {
            ctes: vec![],
            body: select
                .with_order_by(vec![col("TagName")])
                .with_limit(self.limit),
        }
    }

    /// `date_array` and `window_buckets`: one row per bucket with its bounds.
    fn buckets(&self, range: &TimeRange, bucket: &Bucket) -> Vec<Cte> {
        let tz = string(offset_hhmm(&range.start));
        let local = |date: &DateTime<FixedOffset>| {
            func(
                "from_utc_timestamp",
                vec![
                    func("to_timestamp", vec![string(render_query_date(date))]),
                    tz.clone(),
                ],
            )
        };
        let date_array = Select::values(vec![func(
            "explode",
            vec![func(
                "sequence",
                vec![local(&range.start), local(&range.end), bucket.interval()],
            )],
        )
        .alias_bare("timestamp_array")]);

        let window_buckets = Select::new(
            vec![
                bare("timestamp_array").alias_bare("window_start"),
                func("LEAD", vec![bare("timestamp_array")])
                    .over(vec![], vec![bare("timestamp_array")], None)
                    .alias_bare("window_end"),
            ],
            Relation::named("date_array"),
        );

        vec![
            Cte {
                name:   "date_array",
                select: date_array,
            },
            Cte {
                name:   "window_buckets",
                select: window_buckets,
            },
        ]
    }

    /// Range joins the buckets with the raw events, projecting `columns`.
    fn bucketed(&self, bucket: &Bucket, mut columns: Vec<SelectItem>) -> Select {
        let mut projection = vec![
            qbare("d", "window_start").into(),
            qbare("d", "window_end").into(),
            qcol("e", "TagName").into(),
        ];
        projection.append(&mut columns);

        let on = qbare("d", "window_start")
            .lt_eq(qcol("e", "EventTime"))
            .and(qbare("d", "window_end").gt(qcol("e", "EventTime")));

        Select::new(
            projection,
            Relation::named_as("window_buckets", "d").join(
                JoinOperator::Inner(on),
                Relation::named_as("raw_events", "e"),
            ),
        )
        .with_hint(Hint::RangeJoin {
            relation: "d",
            bin_size: bucket.seconds(),
        })
    }

    fn resample(&self, bucket: &Bucket, method: AggregationMethod) -> Vec<Cte> {
        let value = func(method.as_str(), vec![qcol("e", "Value")])
            .over(
                vec![qcol("e", "TagName"), qbare("d", "window_start")],
                vec![qcol("e", "EventTime")],
                Some(WHOLE_PARTITION),
            )
            .alias("Value");

        let project = Select::new(
            vec![
                bare("window_start").alias("EventTime"),
                col("TagName").into(),
                col("Value").into(),
            ],
            Relation::named("resample"),
        )
        .with_group_by(vec![bare("window_start"), col("TagName"), col("Value")]);

        vec![
            Cte {
                name:   "resample",
                select: self.bucketed(bucket, vec![value]),
            },
            Cte {
                name:   "project",
                select: project,
            },
        ]
    }

    /// Fills the (bucket, tag) grid left empty by resampling.
    fn interpolate(&self, method: InterpolationMethod) -> Vec<Cte> {
        let tags = Select::values(vec![func(
            "explode",
            vec![func("array", self.tag_values())],
        )
        .alias("TagName")]);

        let grid = Select::new(
            vec![
                qbare("b", "window_start").alias("EventTime"),
                qcol("t", "TagName").into(),
            ],
            Relation::named_as("window_buckets", "b")
                .join(JoinOperator::Cross, Relation::named_as("tags", "t")),
        );

        let joined = Select::new(
            vec![
                qcol("g", "EventTime").into(),
                qcol("g", "TagName").into(),
                qcol("p", "Value").into(),
            ],
            Relation::named_as("grid", "g").join(
                JoinOperator::LeftOuter(
                    qcol("g", "EventTime")
                        .equals(qcol("p", "EventTime"))
                        .and(qcol("g", "TagName").equals(qcol("p", "TagName"))),
                ),
                Relation::named_as("project", "p"),
            ),
        );

        let known = |name: &'static str, expr: Expr, frame: WindowFrame| {
            func(name, vec![expr, boolean(true)])
                .over(vec![col("TagName")], vec![col("EventTime")], Some(frame))
        };
        let known_time = || Expr::Case {
            conditions:  vec![(col("Value").is_not_null(), col("EventTime"))],
            else_result: None,
        };
        let base = || vec![col("EventTime").into(), col("TagName").into()];

        let mut ctes = vec![
            Cte {
                name:   "tags",
                select: tags,
            },
            Cte {
                name:   "grid",
                select: grid,
            },
            Cte {
                name:   "joined",
                select: joined,
            },
        ];

        let fill = match method {
            InterpolationMethod::ForwardFill => {
                let mut projection = base();
                projection.push(known("last_value", col("Value"), UP_TO_CURRENT).alias("Value"));
                Select::new(projection, Relation::named("joined"))
            }
            InterpolationMethod::BackwardFill => {
                let mut projection = base();
                projection.push(known("first_value", col("Value"), FROM_CURRENT).alias("Value"));
                Select::new(projection, Relation::named("joined"))
            }
            InterpolationMethod::Linear => {
                let mut projection = base();
                projection.push(col("Value").into());
                projection.push(known("last_value", known_time(), UP_TO_CURRENT).alias_bare("prev_time"));
                projection.push(known("last_value", col("Value"), UP_TO_CURRENT).alias_bare("prev_value"));
                projection.push(known("first_value", known_time(), FROM_CURRENT).alias_bare("next_time"));
                projection.push(known("first_value", col("Value"), FROM_CURRENT).alias_bare("next_value"));
                ctes.push(Cte {
                    name:   "fill_bounds",
                    select: Select::new(projection, Relation::named("joined")),
                });

                let seconds = |e: Expr| func("unix_timestamp", vec![e]);
                let linear = bare("prev_value").plus(
                    bare("next_value")
                        .minus(bare("prev_value"))
                        .nested()
                        .times(seconds(col("EventTime")).minus(seconds(bare("prev_time"))).nested())
                        .divide(seconds(bare("next_time")).minus(seconds(bare("prev_time"))).nested()),
                );
                let value = Expr::Case {
                    conditions:  vec![
                        (col("Value").is_not_null(), col("Value")),
                        (
                            bare("prev_value").is_not_null().and(bare("next_value").is_not_null()),
                            linear,
                        ),
                    ],
                    else_result: None,
                };
                let mut projection = base();
                projection.push(value.alias("Value"));
                Select::new(projection, Relation::named("fill_bounds"))
            }
        };
        ctes.push(Cte {
            name:   "interpolate",
            select: fill,
        });
        ctes
    }

    fn circular(&self, bucket: &Bucket, lower: f64, upper: f64, mean: bool) -> Vec<Cte> {
        let range = upper - lower;
        let two_pi = || int(2).times(func("pi", vec![]));
        let radians = || {
            qcol("e", "Value")
                .minus(float(lower))
                .nested()
                .times(two_pi())
                .divide(float(range))
        };

        let calculations = self.bucketed(
            bucket,
            vec![
                func("sin", vec![radians()]).alias_bare("Sin_Value"),
                func("cos", vec![radians()]).alias_bare("Cos_Value"),
            ],
        );

        let aggregates = Select::new(
            vec![
                bare("window_start").alias("EventTime"),
                col("TagName").into(),
                func("avg", vec![bare("Sin_Value")]).alias_bare("Avg_Sin"),
                func("avg", vec![bare("Cos_Value")]).alias_bare("Avg_Cos"),
            ],
            Relation::named("circular_calculations"),
        )
        .with_group_by(vec![bare("window_start"), col("TagName")]);

        let value = if mean {
            func(
                "pmod",
                vec![
                    func("atan2", vec![bare("Avg_Sin"), bare("Avg_Cos")]),
                    two_pi(),
                ],
            )
            .times(float(range))
            .divide(two_pi().nested())
            .plus(float(lower))
        } else {
            let resultant = func(
                "sqrt",
                vec![func("pow", vec![bare("Avg_Sin"), int(2)])
                    .plus(func("pow", vec![bare("Avg_Cos"), int(2)]))],
            );
            // Rounding can push R marginally above one.
            let resultant = func("least", vec![resultant, float(1.0)]);
            func(
                "sqrt",
                vec![int(-2).times(func("ln", vec![resultant]))],
            )
            .times(float(range))
            .divide(two_pi().nested())
        };

        let project = Select::new(
            vec![
                col("EventTime").into(),
                col("TagName").into(),
                value.alias("Value"),
            ],
            Relation::named("circular_aggregates"),
        );

        vec![
            Cte {
                name:   "circular_calculations",
                select: calculations,
            },
            Cte {
                name:   "circular_aggregates",
                select: aggregates,
            },
            Cte {
                name:   "project",
                select: project,
            },
        ]
    }

    fn aggregate(&self, events: &TableName, range: &TimeRange) -> Query {
        let mut ctes = vec![Cte {
            name:   "raw_events",
            select: self.raw_events(events, range),
        }];
        let (bucket, aggregation) = match (&self.bucket, &self.aggregation) {
            (Some(bucket), Some(aggregation)) => (bucket, aggregation),
            // try_new always sets both for aggregated analytics.
            _ => return self.finish(ctes, "raw_events", &["TagName", "EventTime"]),
        };
        ctes.extend(self.buckets(range, bucket));

        let result = match *aggregation {
            Aggregation::Resample(method) => {
                ctes.extend(self.resample(bucket, method));
                "project"
            }
            Aggregation::Interpolate(method, fill) => {
                ctes.extend(self.resample(bucket, method));
                ctes.extend(self.interpolate(fill));
                "interpolate"
            }
            Aggregation::CircularAverage { lower, upper } => {
                ctes.extend(self.circular(bucket, lower, upper, true));
                "project"
            }
            Aggregation::CircularStandardDeviation { lower, upper } => {
                ctes.extend(self.circular(bucket, lower, upper, false));
                "project"
            }
        };
        self.finish(ctes, result, &["TagName", "EventTime"])
    }

    /// Selects the final rows from `result`: pivoted, joined with the unit of
    /// measure, or as they are. Applies ordering and the row limit.
    fn finish(&self, mut ctes: Vec<Cte>, result: &'static str, order: &[&'static str]) -> Query {
        if self.pivot {
            ctes.push(Cte {
                name:   "pivot",
                select: Select::wildcard(Relation::Pivot {
                    source:    Box::new(Relation::named(result)),
                    aggregate: func("FIRST", vec![col("Value")]),
                    column:    col("TagName"),
                    values:    self.tag_values(),
                }),
            });
            return Query {
                ctes,
                body: Select::wildcard(Relation::named("pivot"))
                    .with_order_by(vec![col("EventTime")])
                    .with_limit(self.limit),
            };
        }

        if self.display_uom {
            let metadata_tag = if self.folds_tag_names() {
                func("UPPER", vec![qcol("m", "TagName")])
            } else {
                qcol("m", "TagName")
            };
            let body = Select::new(
                vec![
                    Expr::QualifiedWildcard(Ident::bare("p")).into(),
                    qcol("m", "UoM").into(),
                ],
                Relation::named_as(result, "p").join(
                    JoinOperator::LeftOuter(qcol("p", "TagName").equals(metadata_tag)),
                    Relation::table_as(self.metadata_table.clone(), "m"),
                ),
            )
            .with_order_by(order.iter().map(|c| qcol("p", *c)).collect())
            .with_limit(self.limit);
            return Query { ctes, body };
        }

        Query {
            ctes,
            body: Select::wildcard(Relation::named(result))
                .with_order_by(order.iter().map(|c| col(*c)).collect())
                .with_limit(self.limit),
        }
    }
}

fn table_part(field: &str, value: &str) -> Result<String> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(SensorError::InvalidParameters(format!(
            "Invalid {} '{}': only letters, digits, '_' and '-' are allowed",
            field, value
        )));
    }
    Ok(value.to_lowercase())
}

fn time_range(params: &QueryParameters) -> Result<TimeRange> {
    let start = required(params.start_date.as_deref(), "start_date")?;
    let end = required(params.end_date.as_deref(), "end_date")?;
    let start = parse_query_date(start, Boundary::Start)?;
    let end = parse_query_date(end, Boundary::End)?;
    if start > end {
        return Err(SensorError::InvalidParameters(format!(
            "start_date {} is after end_date {}",
            render_query_date(&start),
            render_query_date(&end)
        )));
    }
    Ok(TimeRange { start, end })
}

fn bucket(params: &QueryParameters) -> Result<Bucket> {
    let rate = required(params.time_interval_rate, "time_interval_rate")?;
    if rate == 0 {
        return Err(SensorError::InvalidParameters(
            "time_interval_rate must be greater than zero".to_string(),
        ));
    }
    let unit = required(params.time_interval_unit, "time_interval_unit")?;
    Ok(Bucket { rate, unit })
}

fn bounds(params: &QueryParameters) -> Result<(f64, f64)> {
    let lower = required(params.lower_bound, "lower_bound")?;
    let upper = required(params.upper_bound, "upper_bound")?;
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(SensorError::InvalidParameters(format!(
            "lower_bound {} must be less than upper_bound {}",
            lower, upper
        )));
    }
    Ok((lower, upper))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| SensorError::InvalidParameters(format!("{} is required", field)))
}
