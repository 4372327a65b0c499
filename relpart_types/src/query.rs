use crate::{Row, Value};

/// The relation a [`Query`] reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableSource {
    /// A single physical or logical table, optionally aliased.
    Table {
        /// Table name.
        name: String,
        /// Name the table is referenced by in predicates.
        alias: Option<String>,
    },
    /// `UNION ALL` of several tables, exposed under one alias.
    Union {
        /// Tables in scan order.
        tables: Vec<String>,
        /// Name the union is referenced by in predicates.
        alias: String,
    },
    /// An opaque SQL fragment; it has no resolvable table reference.
    Raw(String),
}

impl TableSource {
    /// An unaliased table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table {
            name: name.into(),
            alias: None,
        }
    }

    /// The name predicates must be qualified with: the alias if one is set, else the table name.
    ///
    /// Returns `None` for a [`TableSource::Raw`] source.
    pub fn reference_name(&self) -> Option<&str> {
        match self {
            Self::Table { name, alias } => Some(alias.as_deref().unwrap_or(name)),
            Self::Union { alias, .. } => Some(alias.as_str()),
            Self::Raw(_) => None,
        }
    }

    /// Physical tables scanned by this source, in scan order.
    pub fn tables(&self) -> Vec<&str> {
        match self {
            Self::Table { name, .. } => vec![name.as_str()],
            Self::Union { tables, .. } => tables.iter().map(String::as_str).collect(),
            Self::Raw(_) => vec![],
        }
    }
}

/// Comparison of a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// Equality; comparing against [`Value::Null`] means `IS NULL`.
    Eq(Value),
    /// Membership in a value set. `NULL` members never match.
    In(Vec<Value>),
}

/// A predicate on one column of the query's source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Unqualified column name.
    pub column: String,
    /// Comparison applied to the column.
    pub op: FilterOp,
}

impl Filter {
    /// `column = value`, or `column IS NULL` for [`Value::Null`].
    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq(value.into()),
        }
    }

    /// `column IN (values)`. An empty set matches nothing.
    pub fn in_values(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::In(values),
        }
    }

    /// Evaluate the predicate against `row`; a missing column reads as `NULL`.
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(&self.column).filter(|v| !v.is_null());
        match (&self.op, value) {
            (FilterOp::Eq(Value::Null), value) => value.is_none(),
            (FilterOp::Eq(expected), Some(value)) => value == expected,
            (FilterOp::In(values), Some(value)) => values.contains(value),
            (_, None) => false,
        }
    }
}

/// Description of a `SELECT *` query: a source relation and a conjunction of filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    source: TableSource,
    filters: Vec<Filter>,
    none: bool,
}

impl Query {
    /// All rows of `source`.
    pub fn new(source: TableSource) -> Self {
        Self {
            source,
            filters: vec![],
            none: false,
        }
    }

    /// All rows of the unaliased table `name`.
    pub fn from_table(name: impl Into<String>) -> Self {
        Self::new(TableSource::table(name))
    }

    /// The relation read from.
    pub fn source(&self) -> &TableSource {
        &self.source
    }

    /// Filters, all of which must match.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether the query is known to match no rows without consulting the database.
    pub fn is_none(&self) -> bool {
        self.none
    }

    /// Replace the source, keeping the filters.
    pub fn with_source(mut self, source: TableSource) -> Self {
        self.source = source;
        self
    }

    /// Add a filter to the conjunction.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Mark the query as matching no rows.
    pub fn none(mut self) -> Self {
        self.none = true;
        self
    }

    /// In-memory evaluation of the filters against `row`.
    pub fn matches(&self, row: &Row) -> bool {
        !self.none && self.filters.iter().all(|f| f.matches(row))
    }
}
