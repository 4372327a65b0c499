use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::PartitionBound;

/// How a parent table distributes rows over its child partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Every child owns a fixed, disjoint set of discrete key values.
    List,
    /// Every child owns a contiguous, non-overlapping interval of key values.
    Range,
}

impl PartitionStrategy {
    /// Keyword used in `PARTITION BY`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::List => "LIST",
            Self::Range => "RANGE",
        }
    }
}

impl Display for PartitionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Definition of a logical, partitioned parent relation.
///
/// The primary key and the partitioning strategy are fixed when the definition is built and never
/// change for the lifetime of the table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionedTable {
    name: String,
    primary_key: String,
    strategy: PartitionStrategy,
    partition_key: String,
}

impl PartitionedTable {
    /// Primary key column used when none is given explicitly.
    pub const DEFAULT_PRIMARY_KEY: &'static str = "id";

    /// A parent `name` partitioned by `strategy` on the column `partition_key`.
    ///
    /// The primary key defaults to [`Self::DEFAULT_PRIMARY_KEY`].
    pub fn new(
        name: impl Into<String>,
        strategy: PartitionStrategy,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: Self::DEFAULT_PRIMARY_KEY.to_string(),
            strategy,
            partition_key: partition_key.into(),
        }
    }

    /// Override the primary key column.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Name of the parent relation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key column of the parent and of every child.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Partitioning strategy.
    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    /// Column whose value decides the owning partition.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Whether `bound` has the shape this table's strategy requires.
    pub fn accepts(&self, bound: &PartitionBound) -> bool {
        bound.strategy() == self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_id_primary_key() {
        let table = PartitionedTable::new("events", PartitionStrategy::List, "region");
        assert_eq!(table.primary_key(), "id");
        assert_eq!(table.partition_key(), "region");

        let table = table.with_primary_key("event_id");
        assert_eq!(table.primary_key(), "event_id");
    }

    #[test]
    fn accepts_only_matching_bounds() {
        let table = PartitionedTable::new("events", PartitionStrategy::Range, "created_at");
        assert!(table.accepts(&PartitionBound::range(1, 10)));
        assert!(!table.accepts(&PartitionBound::list([1, 2])));
    }
}
