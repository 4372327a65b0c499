use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::quote_literal;

/// A literal value of a partition key.
///
/// Values of different kinds never compare equal. The derived ordering sorts every integer before
/// every text value, which only serves to keep spans over mixed input deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionValue {
    /// Any integer key column.
    Int(i64),
    /// Text and every other quoted literal, e.g. dates.
    Text(String),
}

impl PartitionValue {
    /// Render as an SQL literal suitable for a partition bound expression.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Text(v) => quote_literal(v),
        }
    }
}

impl Display for PartitionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PartitionValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PartitionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A single column value of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Integer column of any width.
    Int(i64),
    /// Text column.
    Text(String),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The partition key view of this value, if it can be one.
    pub fn as_partition_value(&self) -> Option<PartitionValue> {
        match self {
            Self::Int(v) => Some(PartitionValue::Int(*v)),
            Self::Text(v) => Some(PartitionValue::Text(v.clone())),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// The integer, if this is [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The text, if this is [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<PartitionValue> for Value {
    fn from(value: PartitionValue) -> Self {
        match value {
            PartitionValue::Int(v) => Self::Int(v),
            PartitionValue::Text(v) => Self::Text(v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// A row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(PartitionValue::from(-4).to_sql_literal(), "-4");
        assert_eq!(PartitionValue::from("it's").to_sql_literal(), "'it''s'");
    }

    #[test]
    fn ints_order_before_text() {
        let mut values = vec![
            PartitionValue::from("b"),
            PartitionValue::from(10),
            PartitionValue::from("a"),
            PartitionValue::from(-1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                PartitionValue::from(-1),
                PartitionValue::from(10),
                PartitionValue::from("a"),
                PartitionValue::from("b"),
            ]
        );
    }

    #[test]
    fn build_row() {
        let r = row([("name", Value::from("x")), ("category", Value::from(2))]);
        assert_eq!(r.get("category"), Some(&Value::Int(2)));
        assert_eq!(r.get("name").and_then(Value::as_str), Some("x"));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn serde_untagged() {
        let r = row([("n", Value::Null), ("i", Value::from(3)), ("t", Value::from("s"))]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"i":3,"n":null,"t":"s"}"#);
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
