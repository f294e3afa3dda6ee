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

//! A small Spark SQL syntax tree.
//!
//! Statements are assembled as data and rendered exactly once through
//! `Display`. User supplied values only ever reach the output as escaped
//! [`Literal`]s; identifiers are either compile-time constants or values that
//! went through [`Ident::try_quoted`].

use crate::error::{Result, SensorError};
use std::borrow::Cow;
use std::fmt;

struct DisplaySeparated<'a, T: fmt::Display> {
    slice: &'a [T],
    sep:   &'static str,
}

impl<'a, T: fmt::Display> fmt::Display for DisplaySeparated<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut delim = "";
        for t in self.slice {
            write!(f, "{}", delim)?;
            delim = self.sep;
            write!(f, "{}", t)?;
        }
        Ok(())
    }
}

fn display_comma_separated<T: fmt::Display>(slice: &[T]) -> DisplaySeparated<'_, T> {
    DisplaySeparated { slice, sep: ", " }
}

/// An identifier, optionally wrapped in backticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    /// The identifier text without quotes.
    pub value:  Cow<'static, str>,
    /// Whether the identifier is rendered inside backticks.
    pub quoted: bool,
}

impl Ident {
    /// A backtick-quoted identifier known at compile time.
    pub const fn quoted(value: &'static str) -> Self {
        Ident {
            value:  Cow::Borrowed(value),
            quoted: true,
        }
    }

    /// An unquoted identifier known at compile time, e.g. a CTE name.
    pub const fn bare(value: &'static str) -> Self {
        Ident {
            value:  Cow::Borrowed(value),
            quoted: false,
        }
    }

    /// A backtick-quoted identifier built at runtime. Values that could break
    /// out of the quotes are rejected.
    pub fn try_quoted(value: String) -> Result<Self> {
        if value.is_empty() || value.contains('`') {
            return Err(SensorError::InvalidParameters(format!(
                "Invalid identifier '{}'",
                value
            )));
        }
        Ok(Ident {
            value:  Cow::Owned(value),
            quoted: true,
        })
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "`{}`", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// A multi-part table name such as `` `bu`.`sensors`.`a_s_events_float` ``.
#[derive(Debug, Clone, PartialEq)]
pub struct TableName(pub Vec<Ident>);

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            DisplaySeparated {
                slice: &self.0,
                sep:   ".",
            }
        )
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A single-quoted string.
    String(String),
    /// An integer.
    Integer(i64),
    /// A floating point number. Must be finite.
    Float(f64),
    /// `true` or `false`.
    Boolean(bool),
    /// `INTERVAL '<rate> <unit>'`.
    Interval {
        /// Number of units.
        rate: u32,
        /// Singular unit keyword.
        unit: &'static str,
    },
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Interval { rate, unit } => write!(f, "INTERVAL '{} {}'", rate, unit),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `AND`
    And,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
        })
    }
}

/// One end of a `ROWS BETWEEN` frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowFrameBound {
    /// `UNBOUNDED PRECEDING`
    UnboundedPreceding,
    /// `CURRENT ROW`
    CurrentRow,
    /// `UNBOUNDED FOLLOWING`
    UnboundedFollowing,
}

impl fmt::Display for WindowFrameBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WindowFrameBound::UnboundedPreceding => "UNBOUNDED PRECEDING",
            WindowFrameBound::CurrentRow => "CURRENT ROW",
            WindowFrameBound::UnboundedFollowing => "UNBOUNDED FOLLOWING",
        })
    }
}

/// A `ROWS BETWEEN start AND end` window frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowFrame {
    /// Frame start.
    pub start: WindowFrameBound,
    /// Frame end.
    pub end:   WindowFrameBound,
}

impl fmt::Display for WindowFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ROWS BETWEEN {} AND {}", self.start, self.end)
    }
}

/// SQL expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column or CTE column, e.g. `` `TagName` `` or `window_start`.
    Identifier(Ident),
    /// A qualified column, e.g. ``e.`TagName` ``.
    CompoundIdentifier(Vec<Ident>),
    /// `alias.*`
    QualifiedWildcard(Ident),
    /// `*`
    Wildcard,
    /// A literal value.
    Value(Literal),
    /// A function call. Function names are always constants.
    Function {
        /// Function name.
        name: &'static str,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `left op right`, rendered without parentheses.
    BinaryOp {
        /// Left operand.
        left:  Box<Expr>,
        /// Operator.
        op:    BinaryOperator,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `expr BETWEEN low AND high`
    Between {
        /// Tested expression.
        expr: Box<Expr>,
        /// Lower bound.
        low:  Box<Expr>,
        /// Upper bound.
        high: Box<Expr>,
    },
    /// `expr IN (list)`
    InList {
        /// Tested expression.
        expr: Box<Expr>,
        /// Candidate values.
        list: Vec<Expr>,
    },
    /// `expr IS NULL`
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`
    IsNotNull(Box<Expr>),
    /// `CASE WHEN c THEN r ... [ELSE e] END`
    Case {
        /// `(condition, result)` pairs.
        conditions:  Vec<(Expr, Expr)>,
        /// Fallback.
        else_result: Option<Box<Expr>>,
    },
    /// `function OVER (PARTITION BY .. ORDER BY .. frame)`
    Window {
        /// The windowed function call.
        function:     Box<Expr>,
        /// Partitioning expressions.
        partition_by: Vec<Expr>,
        /// Ordering expressions.
        order_by:     Vec<Expr>,
        /// Optional frame.
        frame:        Option<WindowFrame>,
    },
    /// `(expr)`
    Nested(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Identifier(ident) => write!(f, "{}", ident),
            Expr::CompoundIdentifier(parts) => write!(
                f,
                "{}",
                DisplaySeparated {
                    slice: parts,
                    sep:   ".",
                }
            ),
            Expr::QualifiedWildcard(prefix) => write!(f, "{}.*", prefix),
            Expr::Wildcard => f.write_str("*"),
            Expr::Value(v) => write!(f, "{}", v),
            Expr::Function { name, args } => {
                write!(f, "{}({})", name, display_comma_separated(args))
            }
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expr::Between { expr, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", expr, low, high)
            }
            Expr::InList { expr, list } => {
                write!(f, "{} IN ({})", expr, display_comma_separated(list))
            }
            Expr::IsNull(expr) => write!(f, "{} IS NULL", expr),
            Expr::IsNotNull(expr) => write!(f, "{} IS NOT NULL", expr),
            Expr::Case {
                conditions,
                else_result,
            } => {
                f.write_str("CASE")?;
                for (condition, result) in conditions {
                    write!(f, " WHEN {} THEN {}", condition, result)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                f.write_str(" END")
            }
            Expr::Window {
                function,
                partition_by,
                order_by,
                frame,
            } => {
                let mut clauses = vec![];
                if !partition_by.is_empty() {
                    clauses.push(format!(
                        "PARTITION BY {}",
                        display_comma_separated(partition_by)
                    ));
                }
                if !order_by.is_empty() {
                    clauses.push(format!("ORDER BY {}", display_comma_separated(order_by)));
                }
                if let Some(frame) = frame {
                    clauses.push(frame.to_string());
                }
                write!(f, "{} OVER ({})", function, clauses.join(" "))
            }
            Expr::Nested(expr) => write!(f, "({})", expr),
        }
    }
}

impl Expr {
    fn binary(self, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// `self = other`
    pub fn equals(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    /// `self <> other`
    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::NotEq, other)
    }

    /// `self < other`
    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Lt, other)
    }

    /// `self <= other`
    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::LtEq, other)
    }

    /// `self > other`
    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Gt, other)
    }

    /// `self >= other`
    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::GtEq, other)
    }

    /// `self AND other`
    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::And, other)
    }

    /// `self + other`
    pub fn plus(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Plus, other)
    }

    /// `self - other`
    pub fn minus(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Minus, other)
    }

    /// `self * other`
    pub fn times(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Multiply, other)
    }

    /// `self / other`
    pub fn divide(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Divide, other)
    }

    /// `(self)`
    pub fn nested(self) -> Expr {
        Expr::Nested(Box::new(self))
    }

    /// `self BETWEEN low AND high`
    pub fn between(self, low: Expr, high: Expr) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low:  Box::new(low),
            high: Box::new(high),
        }
    }

    /// `self IN (list)`
    pub fn in_list(self, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
        }
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    /// `self OVER (...)`
    pub fn over(
        self,
        partition_by: Vec<Expr>,
        order_by: Vec<Expr>,
        frame: Option<WindowFrame>,
    ) -> Expr {
        Expr::Window {
            function: Box::new(self),
            partition_by,
            order_by,
            frame,
        }
    }

    /// `self AS `alias``
    pub fn alias(self, alias: &'static str) -> SelectItem {
        SelectItem {
            expr:  self,
            alias: Some(Ident::quoted(alias)),
        }
    }

    /// `self AS alias`, with the alias left unquoted.
    pub fn alias_bare(self, alias: &'static str) -> SelectItem {
        SelectItem {
            expr:  self,
            alias: Some(Ident::bare(alias)),
        }
    }
}

/// A backtick-quoted column.
pub fn col(name: &'static str) -> Expr {
    Expr::Identifier(Ident::quoted(name))
}

/// An unquoted column or relation name.
pub fn bare(name: &'static str) -> Expr {
    Expr::Identifier(Ident::bare(name))
}

/// A qualified, backtick-quoted column such as ``e.`Value` ``.
pub fn qcol(relation: &'static str, name: &'static str) -> Expr {
    Expr::CompoundIdentifier(vec![Ident::bare(relation), Ident::quoted(name)])
}

/// A qualified, unquoted column such as `d.window_start`.
pub fn qbare(relation: &'static str, name: &'static str) -> Expr {
    Expr::CompoundIdentifier(vec![Ident::bare(relation), Ident::bare(name)])
}

/// A function call.
pub fn func(name: &'static str, args: Vec<Expr>) -> Expr {
    Expr::Function { name, args }
}

/// A string literal.
pub fn string(value: impl Into<String>) -> Expr {
    Expr::Value(Literal::String(value.into()))
}

/// An integer literal.
pub fn int(value: i64) -> Expr {
    Expr::Value(Literal::Integer(value))
}

/// A float literal.
pub fn float(value: f64) -> Expr {
    Expr::Value(Literal::Float(value))
}

/// A boolean literal.
pub fn boolean(value: bool) -> Expr {
    Expr::Value(Literal::Boolean(value))
}

/// An item of a projection list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    /// The projected expression.
    pub expr:  Expr,
    /// Optional output name.
    pub alias: Option<Ident>,
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        SelectItem { expr, alias: None }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// Join flavours.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOperator {
    /// `INNER JOIN .. ON ..`
    Inner(Expr),
    /// `LEFT OUTER JOIN .. ON ..`
    LeftOuter(Expr),
    /// `CROSS JOIN ..`
    Cross,
}

/// Anything that can appear after `FROM`.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// A physical table.
    Table {
        /// Table name.
        name:  TableName,
        /// Optional alias.
        alias: Option<Ident>,
    },
    /// A CTE defined earlier in the same statement.
    Named {
        /// CTE name.
        name:  Ident,
        /// Optional alias.
        alias: Option<Ident>,
    },
    /// Two relations joined together.
    Join {
        /// Left input.
        left:     Box<Relation>,
        /// Join type and condition.
        operator: JoinOperator,
        /// Right input.
        right:    Box<Relation>,
    },
    /// `source PIVOT (aggregate FOR column IN (values))`
    Pivot {
        /// Pivoted input.
        source:    Box<Relation>,
        /// Aggregate applied to each cell.
        aggregate: Expr,
        /// Column whose values become output columns.
        column:    Expr,
        /// Values to pivot on.
        values:    Vec<Expr>,
    },
}

impl Relation {
    /// A CTE reference.
    pub fn named(name: &'static str) -> Self {
        Relation::Named {
            name:  Ident::bare(name),
            alias: None,
        }
    }

    /// A CTE reference with an alias.
    pub fn named_as(name: &'static str, alias: &'static str) -> Self {
        Relation::Named {
            name:  Ident::bare(name),
            alias: Some(Ident::bare(alias)),
        }
    }

    /// A physical table with an alias.
    pub fn table_as(name: TableName, alias: &'static str) -> Self {
        Relation::Table {
            name,
            alias: Some(Ident::bare(alias)),
        }
    }

    /// Joins `self` with `right`.
    pub fn join(self, operator: JoinOperator, right: Relation) -> Self {
        Relation::Join {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }
}

fn fmt_alias(f: &mut fmt::Formatter<'_>, alias: &Option<Ident>) -> fmt::Result {
    match alias {
        Some(alias) => write!(f, " {}", alias),
        None => Ok(()),
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Table { name, alias } => {
                write!(f, "{}", name)?;
                fmt_alias(f, alias)
            }
            Relation::Named { name, alias } => {
                write!(f, "{}", name)?;
                fmt_alias(f, alias)
            }
            Relation::Join {
                left,
                operator,
                right,
            } => match operator {
                JoinOperator::Inner(on) => write!(f, "{} INNER JOIN {} ON {}", left, right, on),
                JoinOperator::LeftOuter(on) => {
                    write!(f, "{} LEFT OUTER JOIN {} ON {}", left, right, on)
                }
                JoinOperator::Cross => write!(f, "{} CROSS JOIN {}", left, right),
            },
            Relation::Pivot {
                source,
                aggregate,
                column,
                values,
            } => write!(
                f,
                "{} PIVOT ({} FOR {} IN ({}))",
                source,
                aggregate,
                column,
                display_comma_separated(values)
            ),
        }
    }
}

/// Optimizer hints placed right after `SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// `/*+ RANGE_JOIN(relation, bin_size) */`
    RangeJoin {
        /// The relation holding the ranges.
        relation: &'static str,
        /// Bin size in the units of the range column (seconds for timestamps).
        bin_size: i64,
    },
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::RangeJoin { relation, bin_size } => {
                write!(f, "/*+ RANGE_JOIN({}, {}) */", relation, bin_size)
            }
        }
    }
}

/// `LIMIT n OFFSET m`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    /// Maximum number of rows.
    pub limit:  i64,
    /// Rows skipped before the first returned one.
    pub offset: i64,
}

/// A `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// `SELECT DISTINCT`
    pub distinct:   bool,
    /// Optional optimizer hint.
    pub hint:       Option<Hint>,
    /// Projection list.
    pub projection: Vec<SelectItem>,
    /// `FROM` relation. Generator selects have none.
    pub from:       Option<Relation>,
    /// `WHERE` condition.
    pub selection:  Option<Expr>,
    /// `GROUP BY` expressions.
    pub group_by:   Vec<Expr>,
    /// `ORDER BY` expressions.
    pub order_by:   Vec<Expr>,
    /// Row limit.
    pub limit:      Option<Limit>,
}

impl Select {
    /// `SELECT projection FROM from`.
    pub fn new(projection: Vec<SelectItem>, from: Relation) -> Self {
        Select {
            from: Some(from),
            ..Self::values(projection)
        }
    }

    /// `SELECT projection` without a `FROM` clause.
    pub fn values(projection: Vec<SelectItem>) -> Self {
        Select {
            distinct: false,
            hint: None,
            projection,
            from: None,
            selection: None,
            group_by: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    /// `SELECT * FROM from`.
    pub fn wildcard(from: Relation) -> Self {
        Self::new(vec![Expr::Wildcard.into()], from)
    }

    /// Adds `DISTINCT`.
    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Adds an optimizer hint.
    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    /// Sets the `WHERE` condition.
    pub fn with_selection(mut self, selection: Expr) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Sets the `GROUP BY` list.
    pub fn with_group_by(mut self, group_by: Vec<Expr>) -> Self {
        self.group_by = group_by;
        self
    }

    /// Sets the `ORDER BY` list.
    pub fn with_order_by(mut self, order_by: Vec<Expr>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Sets the row limit.
    pub fn with_limit(mut self, limit: Option<Limit>) -> Self {
        self.limit = limit;
        self
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if let Some(hint) = &self.hint {
            write!(f, "{} ", hint)?;
        }
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write!(f, "{}", display_comma_separated(&self.projection))?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(selection) = &self.selection {
            write!(f, " WHERE {}", selection)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", display_comma_separated(&self.group_by))?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", display_comma_separated(&self.order_by))?;
        }
        if let Some(Limit { limit, offset }) = &self.limit {
            write!(f, " LIMIT {} OFFSET {}", limit, offset)?;
        }
        Ok(())
    }
}

/// A named subquery in a `WITH` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// CTE name.
    pub name:   &'static str,
    /// CTE body.
    pub select: Select,
}

impl fmt::Display for Cte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS ({})", self.name, self.select)
    }
}

/// A complete statement: optional CTEs followed by a `SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// `WITH` clause entries, in definition order.
    pub ctes: Vec<Cte>,
    /// The final `SELECT`.
    pub body: Select,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ctes.is_empty() {
            write!(f, "WITH {} ", display_comma_separated(&self.ctes))?;
        }
        write!(f, "{}", self.body)
    }
}
