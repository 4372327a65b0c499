//! Creation and detachment of child partitions.

use std::sync::Arc;

use rand::Rng;
use relpart_cache::PartitionCache;
use relpart_db::{Database, Ddl};
use relpart_types::{PartitionBound, PartitionedTable};
use tracing::{error, info};

use crate::{Error, Result};

/// Length of the random suffix of generated partition names.
pub const GENERATED_SUFFIX_LEN: usize = 7;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// How a new child partition is brought into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreationMode {
    /// `CREATE TABLE child PARTITION OF parent ...` in a single statement.
    Direct,
    /// Create a standalone copy of the parent, then attach it.
    #[default]
    Attach,
}

/// How a [`PartitionCreator`] builds new partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatorOptions {
    /// Statement sequence used for creation.
    pub mode: CreationMode,
    /// Add the parent's primary key to the new child.
    pub with_primary_key: bool,
}

/// `<parent>_<suffix>` with a random lowercase alphanumeric suffix.
pub fn generate_partition_name(parent: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix = (0..GENERATED_SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())]))
        .collect::<String>();
    format!("{parent}_{suffix}")
}

/// Creates and detaches the child partitions of partitioned tables.
#[derive(Debug, Clone)]
pub struct PartitionCreator {
    db: Arc<dyn Database>,
    cache: Arc<PartitionCache>,
    options: CreatorOptions,
}

impl PartitionCreator {
    /// A creator running DDL on `db` and invalidating `cache` when partitions change.
    pub fn new(db: Arc<dyn Database>, cache: Arc<PartitionCache>, options: CreatorOptions) -> Self {
        Self { db, cache, options }
    }

    /// The options new partitions are created with.
    pub fn options(&self) -> CreatorOptions {
        self.options
    }

    /// Create a child partition of `table` owning `bound` and return its name.
    ///
    /// Without an explicit `name` one is generated. If a statement fails after the child table
    /// exists, the child is dropped again before the error is returned. Once the child table
    /// exists the cached partition list of `table` is invalidated, whether or not creation
    /// succeeds.
    pub async fn create_partition(
        &self,
        table: &PartitionedTable,
        bound: PartitionBound,
        name: Option<&str>,
    ) -> Result<String> {
        if !table.accepts(&bound) {
            return Err(Error::InvalidPartitionDefinition {
                table: table.name().to_string(),
                reason: format!(
                    "bound {bound} does not fit a {} partitioned table",
                    table.strategy()
                ),
            });
        }
        bound
            .validate()
            .map_err(|e| Error::InvalidPartitionDefinition {
                table: table.name().to_string(),
                reason: e.to_string(),
            })?;

        let name = name.map_or_else(|| generate_partition_name(table.name()), ToString::to_string);
        let mut statements = self.plan(table, &name, bound).into_iter();

        // a failing first statement created nothing, and the name may belong to another table
        if let Some(create) = statements.next() {
            self.db
                .execute(&create)
                .await
                .map_err(|e| definition_error(table, e))?;
        }
        for ddl in statements {
            if let Err(e) = self.db.execute(&ddl).await {
                self.drop_partial(&name).await;
                // a directly created child was visible until it was dropped
                self.cache.invalidate(table.name());
                return Err(definition_error(table, e));
            }
        }

        self.cache.invalidate(table.name());
        info!(
            table = %table.name(),
            partition = %name,
            mode = ?self.options.mode,
            "created partition"
        );
        Ok(name)
    }

    /// Detach `name` from `table`, leaving it as a standalone table.
    pub async fn detach_partition(&self, table: &PartitionedTable, name: &str) -> Result<()> {
        self.db
            .execute(&Ddl::DetachPartition {
                parent: table.name().to_string(),
                name: name.to_string(),
            })
            .await?;
        self.cache.invalidate(table.name());
        info!(table = %table.name(), partition = %name, "detached partition");
        Ok(())
    }

    /// The statements creating partition `name`; the first one creates the table.
    pub(crate) fn plan(&self, table: &PartitionedTable, name: &str, bound: PartitionBound) -> Vec<Ddl> {
        let parent = table.name().to_string();
        let name = name.to_string();
        let primary_key = self.options.with_primary_key.then(|| Ddl::AddPrimaryKey {
            table: name.clone(),
            columns: vec![table.primary_key().to_string()],
        });

        match self.options.mode {
            CreationMode::Direct => std::iter::once(Ddl::CreatePartitionOf {
                parent,
                name,
                bound,
            })
            .chain(primary_key)
            .collect(),
            CreationMode::Attach => std::iter::once(Ddl::CreateTableLike {
                name: name.clone(),
                like: parent.clone(),
            })
            .chain(primary_key)
            .chain(std::iter::once(Ddl::AttachPartition {
                parent,
                name,
                bound,
            }))
            .collect(),
        }
    }

    async fn drop_partial(&self, name: &str) {
        let drop = Ddl::DropTable {
            name: name.to_string(),
        };
        if let Err(e) = self.db.execute(&drop).await {
            error!(partition = %name, %e, "failed to drop partially created partition");
        }
    }
}

fn definition_error(table: &PartitionedTable, e: relpart_db::Error) -> Error {
    match e {
        relpart_db::Error::InvalidPartitionDefinition { message, .. } => {
            Error::InvalidPartitionDefinition {
                table: table.name().to_string(),
                reason: message,
            }
        }
        e => Error::Database(e),
    }
}
