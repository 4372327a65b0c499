use std::fmt::Display;

use relpart_types::{PartitionBound, quote_ident};

/// The DDL statements needed to manage child partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Ddl {
    /// Create `name` as a partition of `parent` in one statement.
    CreatePartitionOf {
        parent: String,
        name: String,
        bound: PartitionBound,
    },
    /// Create a standalone table with the columns, defaults and constraints of `like`.
    CreateTableLike { name: String, like: String },
    /// Attach the existing table `name` to `parent`.
    AttachPartition {
        parent: String,
        name: String,
        bound: PartitionBound,
    },
    /// Turn partition `name` back into a standalone table.
    DetachPartition { parent: String, name: String },
    AddPrimaryKey { table: String, columns: Vec<String> },
    /// Drop `name`; dropping a parent drops its partitions.
    DropTable { name: String },
}

impl Ddl {
    /// The table this statement creates, alters or drops.
    pub fn target(&self) -> &str {
        match self {
            Self::CreatePartitionOf { name, .. }
            | Self::CreateTableLike { name, .. }
            | Self::AttachPartition { name, .. }
            | Self::DetachPartition { name, .. }
            | Self::DropTable { name } => name,
            Self::AddPrimaryKey { table, .. } => table,
        }
    }

    /// The statement as PostgreSQL SQL, with quoted identifiers.
    pub fn to_sql(&self) -> String {
        match self {
            Self::CreatePartitionOf {
                parent,
                name,
                bound,
            } => format!(
                "CREATE TABLE {} PARTITION OF {} {}",
                quote_ident(name),
                quote_ident(parent),
                bound.to_sql()
            ),
            Self::CreateTableLike { name, like } => format!(
                "CREATE TABLE {} (LIKE {} INCLUDING ALL)",
                quote_ident(name),
                quote_ident(like)
            ),
            Self::AttachPartition {
                parent,
                name,
                bound,
            } => format!(
                "ALTER TABLE {} ATTACH PARTITION {} {}",
                quote_ident(parent),
                quote_ident(name),
                bound.to_sql()
            ),
            Self::DetachPartition { parent, name } => format!(
                "ALTER TABLE {} DETACH PARTITION {}",
                quote_ident(parent),
                quote_ident(name)
            ),
            Self::AddPrimaryKey { table, columns } => format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                quote_ident(table),
                columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::DropTable { name } => format!("DROP TABLE {}", quote_ident(name)),
        }
    }
}

impl Display for Ddl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn statements() {
        let bound = PartitionBound::list([1, 2]);
        let cases = [
            (
                Ddl::CreatePartitionOf {
                    parent: "events".to_string(),
                    name: "events_a".to_string(),
                    bound: bound.clone(),
                },
                r#"CREATE TABLE "events_a" PARTITION OF "events" FOR VALUES IN (1, 2)"#,
            ),
            (
                Ddl::CreateTableLike {
                    name: "events_a".to_string(),
                    like: "events".to_string(),
                },
                r#"CREATE TABLE "events_a" (LIKE "events" INCLUDING ALL)"#,
            ),
            (
                Ddl::AttachPartition {
                    parent: "events".to_string(),
                    name: "events_a".to_string(),
                    bound,
                },
                r#"ALTER TABLE "events" ATTACH PARTITION "events_a" FOR VALUES IN (1, 2)"#,
            ),
            (
                Ddl::DetachPartition {
                    parent: "events".to_string(),
                    name: "events_a".to_string(),
                },
                r#"ALTER TABLE "events" DETACH PARTITION "events_a""#,
            ),
            (
                Ddl::AddPrimaryKey {
                    table: "events_a".to_string(),
                    columns: vec!["id".to_string(), "category".to_string()],
                },
                r#"ALTER TABLE "events_a" ADD PRIMARY KEY ("id", "category")"#,
            ),
            (
                Ddl::DropTable {
                    name: "events_a".to_string(),
                },
                r#"DROP TABLE "events_a""#,
            ),
        ];
        for (ddl, sql) in cases {
            assert_eq!(ddl.to_sql(), sql);
            assert_eq!(ddl.target(), "events_a");
        }
    }
}
