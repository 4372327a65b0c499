//! The database collaborator: DDL, catalog queries and row access for partitioned tables.
//!
//! [`Database`] is the only way the rest of the workspace talks to storage. It is implemented by
//! [`mem::MemDatabase`], an in-memory store with PostgreSQL partitioning semantics, and by
//! [`postgres::PostgresDatabase`].
#![warn(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use relpart_cache::{FetchError, PartitionSource};
use relpart_types::{ChildPartition, Query, Row};

mod ddl;
mod error;
pub mod mem;
pub mod postgres;

pub use ddl::Ddl;
pub use error::{Error, Result};

/// Storage holding partitioned tables and their rows.
#[async_trait]
pub trait Database: std::fmt::Debug + Send + Sync + 'static {
    /// Run a single DDL statement.
    ///
    /// A bound the database refuses (overlap with a sibling, empty range, strategy mismatch) is
    /// reported as [`Error::InvalidPartitionDefinition`].
    async fn execute(&self, ddl: &Ddl) -> Result<()>;

    /// List the physical child partitions of `parent`, in catalog discovery order.
    async fn list_partitions(&self, parent: &str) -> Result<Vec<ChildPartition>>;

    /// Whether any relation called `name` exists.
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Insert `row` into `table` and return the stored row, including a generated primary key.
    ///
    /// Rows outside every partition's bound fail with [`Error::ConstraintViolation`].
    async fn insert(&self, table: &str, row: Row) -> Result<Row>;

    /// Rows of `query`. A query marked as matching nothing is answered without a round trip.
    async fn select(&self, query: &Query) -> Result<Vec<Row>>;
}

/// Exposes the catalog query of a [`Database`] as a [`PartitionSource`].
#[derive(Debug)]
pub struct CatalogPartitionSource {
    db: Arc<dyn Database>,
}

impl CatalogPartitionSource {
    /// Read partitions from `db`.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PartitionSource for CatalogPartitionSource {
    async fn list_partitions(&self, parent: &str) -> Result<Vec<ChildPartition>, FetchError> {
        Ok(self.db.list_partitions(parent).await?)
    }
}
