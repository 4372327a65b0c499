//! In-memory implementation of [`Database`].
//!
//! Tables, partitions and rows live in a single mutex-protected map. Partition handling mirrors
//! PostgreSQL closely enough to exercise the full partition lifecycle in tests: overlapping bounds
//! are refused, rows are routed from a parent to the child owning their key, and rows outside
//! every bound are rejected with a constraint violation. Primary keys added with
//! [`Ddl::AddPrimaryKey`] are unique per table.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use relpart_types::{
    ChildPartition, PartitionBound, PartitionStrategy, PartitionValue, PartitionedTable, Query,
    Row, TableSource, Value,
};
use tracing::debug;

use crate::{Database, Ddl, Error, Result};

/// In-memory database for tests and for running without PostgreSQL.
pub struct MemDatabase {
    state: Mutex<MemState>,
}

impl MemDatabase {
    /// An empty database.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState::default()),
        }
    }

    /// Create the partitioned parent described by `table`.
    pub fn create_partitioned_table(&self, table: &PartitionedTable) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_absent(table.name())?;
        state.tables.insert(
            table.name().to_string(),
            MemTable::new(
                TableKind::Partitioned {
                    strategy: table.strategy(),
                    key: table.partition_key().to_string(),
                    children: vec![],
                },
                table.primary_key(),
            ),
        );
        Ok(())
    }

    /// Create an ordinary, unpartitioned table.
    pub fn create_table(&self, name: &str, id_column: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_absent(name)?;
        state
            .tables
            .insert(name.to_string(), MemTable::new(TableKind::Plain, id_column));
        Ok(())
    }
}

impl Default for MemDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDatabase").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MemState {
    tables: HashMap<String, MemTable>,
    /// Shared sequence for generated primary keys.
    last_id: i64,
}

#[derive(Debug)]
struct MemTable {
    kind: TableKind,
    /// Column receiving generated ids.
    id_column: String,
    primary_key: Vec<String>,
    rows: Vec<Row>,
}

impl MemTable {
    fn new(kind: TableKind, id_column: &str) -> Self {
        Self {
            kind,
            id_column: id_column.to_string(),
            primary_key: vec![],
            rows: vec![],
        }
    }

    /// Whether a stored row already has the primary key of `row`.
    fn has_key_of(&self, row: &Row) -> bool {
        !self.primary_key.is_empty() && {
            let key = key_values(&self.primary_key, row);
            self.rows
                .iter()
                .any(|stored| key_values(&self.primary_key, stored) == key)
        }
    }
}

fn key_values(columns: &[String], row: &Row) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

#[derive(Debug)]
enum TableKind {
    Plain,
    Partitioned {
        strategy: PartitionStrategy,
        key: String,
        /// Attached partitions, in attach order.
        children: Vec<String>,
    },
    Partition {
        parent: String,
        bound: PartitionBound,
    },
}

impl MemState {
    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables.get(name).ok_or_else(|| Error::TableNotFound {
            name: name.to_string(),
        })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables.get_mut(name).ok_or_else(|| Error::TableNotFound {
            name: name.to_string(),
        })
    }

    fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(Error::TableExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn children_mut(&mut self, parent: &str) -> Result<&mut Vec<String>> {
        match &mut self.table_mut(parent)?.kind {
            TableKind::Partitioned { children, .. } => Ok(children),
            _ => Err(Error::NotPartitioned {
                name: parent.to_string(),
            }),
        }
    }

    fn partition_key(&self, parent: &str) -> Result<&str> {
        match &self.table(parent)?.kind {
            TableKind::Partitioned { key, .. } => Ok(key),
            _ => Err(Error::NotPartitioned {
                name: parent.to_string(),
            }),
        }
    }

    /// Check that `bound` may be attached to `parent` as partition `name`.
    fn check_bound(&self, parent: &str, name: &str, bound: &PartitionBound) -> Result<()> {
        let invalid = |message: String| Error::InvalidPartitionDefinition {
            table: name.to_string(),
            message,
        };

        let TableKind::Partitioned {
            strategy, children, ..
        } = &self.table(parent)?.kind
        else {
            return Err(Error::NotPartitioned {
                name: parent.to_string(),
            });
        };
        if bound.strategy() != *strategy {
            return Err(invalid(format!(
                "invalid bound specification for a {} partition",
                strategy.as_sql().to_lowercase()
            )));
        }
        bound.validate().map_err(|e| invalid(e.to_string()))?;

        for child in children {
            if let Ok(MemTable {
                kind: TableKind::Partition {
                    bound: existing, ..
                },
                ..
            }) = self.table(child)
            {
                if existing.overlaps(bound) {
                    return Err(invalid(format!(
                        "partition \"{name}\" would overlap partition \"{child}\""
                    )));
                }
            }
        }
        Ok(())
    }

    /// The leaf table a row inserted into `table` is stored in.
    fn route(&self, table: &str, row: &Row) -> Result<String> {
        let key_value = |key: &str| row.get(key).and_then(Value::as_partition_value);
        match &self.table(table)?.kind {
            TableKind::Plain => Ok(table.to_string()),
            TableKind::Partition { parent, bound } => {
                let value = key_value(self.partition_key(parent)?);
                if value.is_some_and(|v| bound.contains(&v)) {
                    Ok(table.to_string())
                } else {
                    Err(Error::ConstraintViolation {
                        table: table.to_string(),
                        message: format!(
                            "new row for relation \"{table}\" violates partition constraint"
                        ),
                    })
                }
            }
            TableKind::Partitioned { key, children, .. } => {
                let value = key_value(key);
                let owner = value.and_then(|value| {
                    children
                        .iter()
                        .find(|child| self.child_contains(child, &value))
                });
                match owner {
                    // a child may itself be partitioned
                    Some(child) => self.route(child, row),
                    None => Err(Error::ConstraintViolation {
                        table: table.to_string(),
                        message: format!("no partition of relation \"{table}\" found for row"),
                    }),
                }
            }
        }
    }

    fn child_contains(&self, child: &str, value: &PartitionValue) -> bool {
        matches!(
            self.tables.get(child).map(|t| &t.kind),
            Some(TableKind::Partition { bound, .. }) if bound.contains(value)
        )
    }

    fn scan<'a>(&'a self, name: &str, out: &mut Vec<&'a Row>) -> Result<()> {
        let table = self.table(name)?;
        match &table.kind {
            TableKind::Partitioned { children, .. } => {
                for child in children {
                    self.scan(child, out)?;
                }
            }
            TableKind::Plain | TableKind::Partition { .. } => out.extend(table.rows.iter()),
        }
        Ok(())
    }

    fn execute(&mut self, ddl: &Ddl) -> Result<()> {
        match ddl {
            Ddl::CreatePartitionOf {
                parent,
                name,
                bound,
            } => {
                self.ensure_absent(name)?;
                self.check_bound(parent, name, bound)?;
                let id_column = self.table(parent)?.id_column.clone();
                let kind = TableKind::Partition {
                    parent: parent.clone(),
                    bound: bound.clone(),
                };
                self.tables
                    .insert(name.clone(), MemTable::new(kind, &id_column));
                self.children_mut(parent)?.push(name.clone());
            }
            Ddl::CreateTableLike { name, like } => {
                self.ensure_absent(name)?;
                let like = self.table(like)?;
                let mut table = MemTable::new(TableKind::Plain, &like.id_column);
                table.primary_key = like.primary_key.clone();
                self.tables.insert(name.clone(), table);
            }
            Ddl::AttachPartition {
                parent,
                name,
                bound,
            } => {
                let table = self.table(name)?;
                if !matches!(table.kind, TableKind::Plain) {
                    return Err(Error::InvalidPartitionDefinition {
                        table: name.clone(),
                        message: format!("\"{name}\" is already a partition or partitioned"),
                    });
                }
                self.check_bound(parent, name, bound)?;
                let key = self.partition_key(parent)?;
                let fits = table.rows.iter().all(|row| {
                    row.get(key)
                        .and_then(Value::as_partition_value)
                        .is_some_and(|v| bound.contains(&v))
                });
                if !fits {
                    return Err(Error::ConstraintViolation {
                        table: name.clone(),
                        message: format!(
                            "partition constraint of relation \"{name}\" is violated by some row"
                        ),
                    });
                }
                self.table_mut(name)?.kind = TableKind::Partition {
                    parent: parent.clone(),
                    bound: bound.clone(),
                };
                self.children_mut(parent)?.push(name.clone());
            }
            Ddl::DetachPartition { parent, name } => {
                let table = self.table_mut(name)?;
                if !matches!(&table.kind, TableKind::Partition { parent: p, .. } if p == parent) {
                    return Err(Error::NotAPartition {
                        name: name.clone(),
                        parent: parent.clone(),
                    });
                }
                table.kind = TableKind::Plain;
                self.children_mut(parent)?.retain(|c| c != name);
            }
            Ddl::AddPrimaryKey { table, columns } => {
                let t = self.table_mut(table)?;
                if !t.primary_key.is_empty() {
                    return Err(Error::InvalidPartitionDefinition {
                        table: table.clone(),
                        message: format!("multiple primary keys for table \"{table}\" are not allowed"),
                    });
                }
                let mut seen = HashSet::new();
                let unique = t.rows.iter().all(|row| seen.insert(key_values(columns, row)));
                if !unique {
                    return Err(Error::ConstraintViolation {
                        table: table.clone(),
                        message: "could not create unique index: duplicate key".to_string(),
                    });
                }
                t.primary_key = columns.clone();
            }
            Ddl::DropTable { name } => {
                let table = self.tables.remove(name).ok_or_else(|| Error::TableNotFound {
                    name: name.clone(),
                })?;
                match table.kind {
                    TableKind::Partitioned { children, .. } => {
                        for child in children {
                            self.tables.remove(&child);
                        }
                    }
                    TableKind::Partition { parent, .. } => {
                        self.children_mut(&parent)?.retain(|c| c != name);
                    }
                    TableKind::Plain => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemDatabase {
    async fn execute(&self, ddl: &Ddl) -> Result<()> {
        debug!(%ddl, "executing DDL");
        self.state.lock().execute(ddl)
    }

    async fn list_partitions(&self, parent: &str) -> Result<Vec<ChildPartition>> {
        let state = self.state.lock();
        let TableKind::Partitioned { children, .. } = &state.table(parent)?.kind else {
            return Err(Error::NotPartitioned {
                name: parent.to_string(),
            });
        };
        Ok(children
            .iter()
            .filter_map(|child| match state.tables.get(child).map(|t| &t.kind) {
                Some(TableKind::Partition { bound, .. }) => {
                    Some(ChildPartition::new(child.as_str(), bound.clone(), parent))
                }
                _ => None,
            })
            .collect())
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().tables.contains_key(name))
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row> {
        let mut state = self.state.lock();
        let target = state.route(table, &row)?;

        let id_column = state.table(&target)?.id_column.clone();
        if row.get(&id_column).is_none_or(Value::is_null) {
            state.last_id += 1;
            row.insert(id_column, Value::Int(state.last_id));
        }

        let stored = state.table_mut(&target)?;
        if stored.has_key_of(&row) {
            return Err(Error::ConstraintViolation {
                message: format!(
                    "duplicate key value violates unique constraint \"{target}_pkey\""
                ),
                table: target,
            });
        }
        stored.rows.push(row.clone());
        Ok(row)
    }

    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        if query.is_none() {
            return Ok(vec![]);
        }
        if let TableSource::Raw(sql) = query.source() {
            return Err(Error::UnsupportedQuery {
                reason: format!("raw source {sql:?} cannot be evaluated in memory"),
            });
        }

        let state = self.state.lock();
        let mut rows = vec![];
        for table in query.source().tables() {
            state.scan(table, &mut rows)?;
        }
        Ok(rows
            .into_iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect())
    }
}
