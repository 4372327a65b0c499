//! Partition bounds: the value set or interval a child partition owns.
//!
//! Bounds follow PostgreSQL declarative partitioning: a list bound owns a set of discrete values,
//! a range bound owns the half-open interval `[from, to)`. [`parse_bound_expr`] reads the
//! `FOR VALUES ...` text PostgreSQL reports for an attached partition.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{PartitionStrategy, PartitionValue};

/// A bound that cannot own values, or bound text that cannot be read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BoundError {
    #[error("list partition bound must contain at least one value")]
    EmptyList,

    #[error("empty range bound: lower bound {from} must be below upper bound {to}")]
    EmptyRange {
        from: RangeEndpoint,
        to: RangeEndpoint,
    },

    /// A well-formed bound this crate does not model.
    #[error("unsupported partition bound: {expr}")]
    Unsupported { expr: String },

    #[error("invalid partition bound {expr:?} at offset {offset}: {reason}")]
    Parse {
        expr: String,
        offset: usize,
        reason: &'static str,
    },
}

/// One end of a range bound.
///
/// The declaration order gives the ordering: `MinValue` sorts below every value and `MaxValue`
/// above every value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeEndpoint {
    /// `MINVALUE`, below every value.
    MinValue,
    /// A concrete key value.
    Value(PartitionValue),
    /// `MAXVALUE`, above every value.
    MaxValue,
}

impl RangeEndpoint {
    fn to_sql(&self) -> String {
        match self {
            Self::MinValue => "MINVALUE".to_string(),
            Self::Value(v) => v.to_sql_literal(),
            Self::MaxValue => "MAXVALUE".to_string(),
        }
    }
}

impl Display for RangeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl From<PartitionValue> for RangeEndpoint {
    fn from(value: PartitionValue) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for RangeEndpoint {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<i32> for RangeEndpoint {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<&str> for RangeEndpoint {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for RangeEndpoint {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

/// The key values a child partition owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionBound {
    /// `FOR VALUES IN (...)`.
    List(Vec<PartitionValue>),
    /// `FOR VALUES FROM (from) TO (to)`, owning `[from, to)`.
    Range {
        /// Inclusive lower end.
        from: RangeEndpoint,
        /// Exclusive upper end.
        to: RangeEndpoint,
    },
}

impl PartitionBound {
    /// A list bound owning `values`.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    /// A range bound owning `[from, to)`.
    pub fn range(from: impl Into<RangeEndpoint>, to: impl Into<RangeEndpoint>) -> Self {
        Self::Range {
            from: from.into(),
            to: to.into(),
        }
    }

    /// The partitioning strategy this bound belongs to.
    pub fn strategy(&self) -> PartitionStrategy {
        match self {
            Self::List(_) => PartitionStrategy::List,
            Self::Range { .. } => PartitionStrategy::Range,
        }
    }

    /// Reject bounds that cannot own any value.
    pub fn validate(&self) -> Result<(), BoundError> {
        match self {
            Self::List(values) if values.is_empty() => Err(BoundError::EmptyList),
            Self::Range { from, to } if from >= to => Err(BoundError::EmptyRange {
                from: from.clone(),
                to: to.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Whether a row with key `value` belongs to this bound.
    pub fn contains(&self, value: &PartitionValue) -> bool {
        match self {
            Self::List(values) => values.contains(value),
            Self::Range { from, to } => {
                let value = RangeEndpoint::Value(value.clone());
                *from <= value && value < *to
            }
        }
    }

    /// Whether the two bounds share at least one value.
    ///
    /// Bounds of different strategies never overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.iter().any(|v| b.contains(v)),
            (
                Self::Range { from: a_from, to: a_to },
                Self::Range { from: b_from, to: b_to },
            ) => a_from < b_to && b_from < a_to,
            _ => false,
        }
    }

    /// The `FOR VALUES ...` clause for this bound.
    pub fn to_sql(&self) -> String {
        match self {
            Self::List(values) => {
                let values = values
                    .iter()
                    .map(PartitionValue::to_sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("FOR VALUES IN ({values})")
            }
            Self::Range { from, to } => {
                format!("FOR VALUES FROM ({}) TO ({})", from.to_sql(), to.to_sql())
            }
        }
    }
}

impl Display for PartitionBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A physical child partition as discovered in the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildPartition {
    /// Physical table name.
    pub name: String,
    /// Key values the child owns.
    pub bound: PartitionBound,
    /// Name of the parent table; the child does not own it.
    pub parent: String,
}

impl ChildPartition {
    /// A child `name` of `parent` owning `bound`.
    pub fn new(name: impl Into<String>, bound: PartitionBound, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound,
            parent: parent.into(),
        }
    }
}

/// The type of the partition key column, which decides how bound literals are read.
///
/// PostgreSQL prints only non-negative `integer` bounds bare. Negative values and every
/// `smallint` or `bigint` value come back quoted, e.g. `FOR VALUES IN ('1', '-5')`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyType {
    /// `smallint`, `integer` or `bigint`. Quoted literals are read as integers.
    Integer,
    /// Any other type. Quoted literals stay text.
    #[default]
    Other,
}

/// Parse a partition bound as printed by PostgreSQL's `pg_get_expr(relpartbound, oid)`.
///
/// Single-column list and range bounds are supported. `DEFAULT`, hash (`WITH (...)`), `NULL`
/// members and multi-column ranges yield [`BoundError::Unsupported`].
pub fn parse_bound_expr(expr: &str, key_type: KeyType) -> Result<PartitionBound, BoundError> {
    let mut parser = BoundParser {
        expr,
        pos: 0,
        key_type,
    };
    let bound = parser.bound()?;
    parser.skip_ws();
    if parser.pos < expr.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(bound)
}

struct BoundParser<'a> {
    expr: &'a str,
    pos: usize,
    key_type: KeyType,
}

impl BoundParser<'_> {
    fn bound(&mut self) -> Result<PartitionBound, BoundError> {
        if self.eat_keyword("DEFAULT") {
            return Err(self.unsupported());
        }
        self.expect_keyword("FOR")?;
        self.expect_keyword("VALUES")?;

        if self.eat_keyword("IN") {
            self.expect_char('(')?;
            let mut values = vec![self.value()?];
            while self.eat_char(',') {
                values.push(self.value()?);
            }
            self.expect_char(')')?;
            Ok(PartitionBound::List(values))
        } else if self.eat_keyword("FROM") {
            let from = self.endpoint()?;
            self.expect_keyword("TO")?;
            let to = self.endpoint()?;
            Ok(PartitionBound::Range { from, to })
        } else if self.eat_keyword("WITH") {
            Err(self.unsupported())
        } else {
            Err(self.error("expected IN, FROM or WITH"))
        }
    }

    fn endpoint(&mut self) -> Result<RangeEndpoint, BoundError> {
        self.expect_char('(')?;
        let endpoint = if self.eat_keyword("MINVALUE") {
            RangeEndpoint::MinValue
        } else if self.eat_keyword("MAXVALUE") {
            RangeEndpoint::MaxValue
        } else {
            RangeEndpoint::Value(self.value()?)
        };
        if self.eat_char(',') {
            // multi-column range keys
            return Err(self.unsupported());
        }
        self.expect_char(')')?;
        Ok(endpoint)
    }

    fn value(&mut self) -> Result<PartitionValue, BoundError> {
        self.skip_ws();
        if self.eat_keyword("NULL") {
            return Err(self.unsupported());
        }
        let value = match self.peek() {
            Some('\'') => {
                let start = self.pos;
                let text = self.text_literal()?;
                match self.key_type {
                    KeyType::Integer => {
                        PartitionValue::Int(text.parse().map_err(|_| BoundError::Parse {
                            expr: self.expr.to_string(),
                            offset: start,
                            reason: "invalid integer literal",
                        })?)
                    }
                    KeyType::Other => PartitionValue::Text(text),
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => PartitionValue::Int(self.int_literal()?),
            _ => return Err(self.error("expected a literal")),
        };
        self.skip_cast();
        Ok(value)
    }

    fn text_literal(&mut self) -> Result<String, BoundError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string literal"));
            };
            self.pos += c.len_utf8();
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.pos += 1;
                    out.push('\'');
                } else {
                    return Ok(out);
                }
            } else {
                out.push(c);
            }
        }
    }

    fn int_literal(&mut self) -> Result<i64, BoundError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.expr[start..self.pos]
            .parse()
            .map_err(|_| BoundError::Parse {
                expr: self.expr.to_string(),
                offset: start,
                reason: "invalid integer literal",
            })
    }

    /// Skip a `::type` cast trailing a literal, e.g. `'2024-01-01'::date`.
    fn skip_cast(&mut self) {
        self.skip_ws();
        if self.rest().starts_with("::") {
            while self.peek().is_some_and(|c| c != ',' && c != ')') {
                self.pos += 1;
            }
        }
    }

    fn rest(&self) -> &str {
        &self.expr[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.expr.len() - trimmed.len();
    }

    fn eat_char(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), BoundError> {
        if self.eat_char(c) {
            Ok(())
        } else {
            Err(self.error(match c {
                '(' => "expected '('",
                ')' => "expected ')'",
                _ => "unexpected character",
            }))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        let rest = self.rest();
        let matches = rest
            .get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
            && !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if matches {
            self.pos += keyword.len();
        }
        matches
    }

    fn expect_keyword(&mut self, keyword: &'static str) -> Result<(), BoundError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error("expected keyword"))
        }
    }

    fn error(&self, reason: &'static str) -> BoundError {
        BoundError::Parse {
            expr: self.expr.to_string(),
            offset: self.pos,
            reason,
        }
    }

    fn unsupported(&self) -> BoundError {
        BoundError::Unsupported {
            expr: self.expr.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn render() {
        assert_eq!(
            PartitionBound::list([1, 2, 3]).to_sql(),
            "FOR VALUES IN (1, 2, 3)"
        );
        assert_eq!(
            PartitionBound::list(["eu", "us"]).to_sql(),
            "FOR VALUES IN ('eu', 'us')"
        );
        assert_eq!(
            PartitionBound::range(RangeEndpoint::MinValue, 100).to_sql(),
            "FOR VALUES FROM (MINVALUE) TO (100)"
        );
    }

    #[test]
    fn parse_list() {
        assert_eq!(
            parse_bound_expr("FOR VALUES IN (1, 2)", KeyType::Other).unwrap(),
            PartitionBound::list([1, 2])
        );
        assert_eq!(
            parse_bound_expr("FOR VALUES IN ('a', 'it''s')", KeyType::Other).unwrap(),
            PartitionBound::list(["a", "it's"])
        );
        assert_eq!(
            parse_bound_expr("for values in (-7)", KeyType::Other).unwrap(),
            PartitionBound::list([-7])
        );
    }

    #[test]
    fn parse_range() {
        assert_eq!(
            parse_bound_expr("FOR VALUES FROM (1) TO (10)", KeyType::Other).unwrap(),
            PartitionBound::range(1, 10)
        );
        assert_eq!(
            parse_bound_expr(
                "FOR VALUES FROM (MINVALUE) TO ('2024-01-01')",
                KeyType::Other
            )
            .unwrap(),
            PartitionBound::range(RangeEndpoint::MinValue, "2024-01-01")
        );
        assert_eq!(
            parse_bound_expr(
                "FOR VALUES FROM ('2024-01-01'::date) TO (MAXVALUE)",
                KeyType::Other
            )
            .unwrap(),
            PartitionBound::range("2024-01-01", RangeEndpoint::MaxValue)
        );
    }

    #[test]
    fn parse_quoted_integers() {
        assert_eq!(
            parse_bound_expr("FOR VALUES IN ('1', '2')", KeyType::Integer).unwrap(),
            PartitionBound::list([1, 2])
        );
        assert_eq!(
            parse_bound_expr("FOR VALUES IN ('-5', 3)", KeyType::Integer).unwrap(),
            PartitionBound::list([-5, 3])
        );
        assert_eq!(
            parse_bound_expr("FOR VALUES FROM ('0') TO ('10')", KeyType::Integer).unwrap(),
            PartitionBound::range(0, 10)
        );
        assert_eq!(
            parse_bound_expr("FOR VALUES FROM (MINVALUE) TO ('-1')", KeyType::Integer).unwrap(),
            PartitionBound::range(RangeEndpoint::MinValue, -1)
        );

        // the same text read for a text key
        assert_eq!(
            parse_bound_expr("FOR VALUES IN ('1', '2')", KeyType::Other).unwrap(),
            PartitionBound::list(["1", "2"])
        );

        assert!(matches!(
            parse_bound_expr("FOR VALUES IN ('eu')", KeyType::Integer),
            Err(BoundError::Parse { offset: 15, .. })
        ));
    }

    #[test]
    fn parse_unsupported() {
        for expr in [
            "DEFAULT",
            "FOR VALUES WITH (modulus 4, remainder 0)",
            "FOR VALUES IN (NULL)",
            "FOR VALUES FROM (1, 2) TO (3, 4)",
        ] {
            assert!(
                matches!(
                    parse_bound_expr(expr, KeyType::Other),
                    Err(BoundError::Unsupported { .. })
                ),
                "{expr}"
            );
        }
    }

    #[test]
    fn parse_malformed() {
        for expr in [
            "",
            "FOR VALUES IN (1",
            "FOR VALUES IN ('open)",
            "FOR VALUES FROM (1)",
            "FOR VALUES IN (1) trailing",
            "FOR VALUES IN (99999999999999999999)",
        ] {
            assert!(
                matches!(parse_bound_expr(expr, KeyType::Other), Err(BoundError::Parse { .. })),
                "{expr}"
            );
        }
    }

    #[test]
    fn validate() {
        assert_eq!(
            PartitionBound::List(vec![]).validate(),
            Err(BoundError::EmptyList)
        );
        assert!(matches!(
            PartitionBound::range(10, 10).validate(),
            Err(BoundError::EmptyRange { .. })
        ));
        assert!(
            PartitionBound::range(RangeEndpoint::MinValue, RangeEndpoint::MaxValue)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn range_is_half_open() {
        let bound = PartitionBound::range(10, 20);
        assert!(bound.contains(&10.into()));
        assert!(bound.contains(&19.into()));
        assert!(!bound.contains(&20.into()));

        assert!(!bound.overlaps(&PartitionBound::range(20, 30)));
        assert!(bound.overlaps(&PartitionBound::range(19, 30)));
        assert!(bound.overlaps(&PartitionBound::range(RangeEndpoint::MinValue, 11)));
        assert!(!bound.overlaps(&PartitionBound::list([15])));
    }

    proptest! {
        #[test]
        fn rendered_bounds_parse_back(values in prop::collection::vec(any::<i64>(), 1..8)) {
            let bound = PartitionBound::list(values);
            prop_assert_eq!(parse_bound_expr(&bound.to_sql(), KeyType::Other).unwrap(), bound);
        }

        #[test]
        fn rendered_ranges_parse_back(a in any::<i64>(), b in any::<i64>(), text in "[a-z' ]{0,12}") {
            let bound = PartitionBound::range(a.min(b), a.max(b));
            prop_assert_eq!(parse_bound_expr(&bound.to_sql(), KeyType::Other).unwrap(), bound);

            let bound = PartitionBound::range(text.as_str(), RangeEndpoint::MaxValue);
            prop_assert_eq!(parse_bound_expr(&bound.to_sql(), KeyType::Other).unwrap(), bound);
        }
    }
}
