//! Query handles scoped to a partitioned table or to one of its partitions.
//!
//! [`PartitionedModel`] is the handle for the logical parent. [`ScopedTable`] is a value handle
//! for a single physical child, created by [`PartitionedModel::in_partition`]. Both hand out
//! [`Relation`]s, chainable query descriptions that can be narrowed to the partitions holding a
//! set of partition key values before they are executed.

use std::sync::Arc;

use relpart_cache::PartitionCache;
use relpart_db::Database;
use relpart_types::{
    Filter, PartitionBound, PartitionValue, PartitionedTable, Query, Row, TableSource, Value,
};
use tracing::debug;

use crate::{
    Error, Result,
    creator::{CreatorOptions, PartitionCreator},
    resolver::PartitionResolver,
};

/// Handle for a logical, partitioned parent table.
///
/// Cloning is cheap; clones share the database, the partition cache and the table definition.
#[derive(Debug, Clone)]
pub struct PartitionedModel {
    table: Arc<PartitionedTable>,
    db: Arc<dyn Database>,
    cache: Arc<PartitionCache>,
    creator: PartitionCreator,
    resolver: PartitionResolver,
}

impl PartitionedModel {
    /// A handle for `table`, creating partitions with the default [`CreatorOptions`].
    pub fn new(table: PartitionedTable, db: Arc<dyn Database>, cache: Arc<PartitionCache>) -> Self {
        let creator = PartitionCreator::new(
            Arc::clone(&db),
            Arc::clone(&cache),
            CreatorOptions::default(),
        );
        let resolver = PartitionResolver::new(Arc::clone(&cache));
        Self {
            table: Arc::new(table),
            db,
            cache,
            creator,
            resolver,
        }
    }

    /// Use `options` for partitions created through this handle.
    pub fn with_creator_options(mut self, options: CreatorOptions) -> Self {
        self.creator = PartitionCreator::new(Arc::clone(&self.db), Arc::clone(&self.cache), options);
        self
    }

    /// Definition of the parent table.
    pub fn table(&self) -> &PartitionedTable {
        &self.table
    }

    /// Name of the parent table.
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Primary key column of the parent table.
    pub fn primary_key(&self) -> &str {
        self.table.primary_key()
    }

    /// Names of the current child partitions, in catalog discovery order.
    ///
    /// Empty when the partition list cannot be read.
    pub async fn partitions(&self) -> Vec<String> {
        self.cache.partition_names(self.table.name()).await
    }

    /// Create a child owning `bound`, named `name` or a generated name, and return its name.
    ///
    /// See [`PartitionCreator::create_partition`].
    pub async fn create_partition(&self, bound: PartitionBound, name: Option<&str>) -> Result<String> {
        self.creator
            .create_partition(&self.table, bound, name)
            .await
    }

    /// Detach the child `name`, keeping it as a standalone table.
    pub async fn detach_partition(&self, name: &str) -> Result<()> {
        self.creator.detach_partition(&self.table, name).await
    }

    /// Forget the cached partition list so the next lookup rereads it.
    pub fn invalidate_partitions(&self) {
        self.cache.invalidate(self.table.name());
    }

    /// A handle bound to the child partition `name`.
    ///
    /// The partition is not checked for existence.
    pub fn in_partition(&self, name: impl Into<String>) -> ScopedTable {
        ScopedTable {
            model: self.clone(),
            partition: name.into(),
        }
    }

    /// All rows of the logical table.
    pub fn all(&self) -> Relation {
        Relation {
            model: self.clone(),
            pinned: None,
            query: Query::from_table(self.table.name()),
        }
    }

    /// Insert through the parent; the database routes the row to its partition.
    pub async fn create(&self, row: Row) -> Result<Row> {
        Ok(self.db.insert(self.table.name(), row).await?)
    }

    /// All rows whose partition key is one of `values`. See [`Relation::partition_key_in`].
    pub async fn partition_key_in(&self, values: Vec<PartitionValue>) -> Result<Relation> {
        self.all().partition_key_in(values).await
    }

    /// All rows whose partition key is `value`.
    pub async fn partition_key_eq(&self, value: PartitionValue) -> Result<Relation> {
        self.all().partition_key_eq(value).await
    }
}

/// Handle for one physical child partition of a [`PartitionedModel`].
#[derive(Debug, Clone)]
pub struct ScopedTable {
    model: PartitionedModel,
    partition: String,
}

impl ScopedTable {
    /// The physical child table.
    pub fn table_name(&self) -> &str {
        &self.partition
    }

    /// Definition of the parent table this partition belongs to.
    pub fn logical_table(&self) -> &PartitionedTable {
        self.model.table()
    }

    /// Primary key column, shared with the parent.
    pub fn primary_key(&self) -> &str {
        self.model.primary_key()
    }

    /// Handle of the parent table.
    pub fn model(&self) -> &PartitionedModel {
        &self.model
    }

    /// All rows of this partition.
    pub fn all(&self) -> Relation {
        Relation {
            model: self.model.clone(),
            pinned: Some(self.partition.clone()),
            query: Query::from_table(self.partition.as_str()),
        }
    }

    /// Insert directly into this partition. Rows outside its bound are rejected.
    pub async fn create(&self, row: Row) -> Result<Row> {
        Ok(self.model.db.insert(&self.partition, row).await?)
    }

    /// Rows of this partition whose partition key is one of `values`.
    ///
    /// Matches nothing unless this partition is a candidate for `values`.
    pub async fn partition_key_in(&self, values: Vec<PartitionValue>) -> Result<Relation> {
        self.all().partition_key_in(values).await
    }

    /// Rows of this partition whose partition key is `value`.
    pub async fn partition_key_eq(&self, value: PartitionValue) -> Result<Relation> {
        self.all().partition_key_eq(value).await
    }
}

impl PartialEq for ScopedTable {
    fn eq(&self, other: &Self) -> bool {
        self.model.table_name() == other.model.table_name() && self.partition == other.partition
    }
}

impl Eq for ScopedTable {}

/// A chainable query against a partitioned table or one of its partitions.
#[derive(Debug, Clone)]
pub struct Relation {
    model: PartitionedModel,
    /// Set for relations obtained from a [`ScopedTable`].
    pinned: Option<String>,
    query: Query,
}

impl Relation {
    /// The query [`load`](Self::load) executes.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Add `column = value`.
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query = self.query.filter(Filter::equals(column, value));
        self
    }

    /// Add `column IN (values)`.
    pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.query = self.query.filter(Filter::in_values(column, values));
        self
    }

    /// Expose the current source under `alias`. Raw sources are left untouched.
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        let source = match self.query.source().clone() {
            TableSource::Table { name, .. } => TableSource::Table {
                name,
                alias: Some(alias.into()),
            },
            TableSource::Union { tables, .. } => TableSource::Union {
                tables,
                alias: alias.into(),
            },
            raw @ TableSource::Raw(_) => raw,
        };
        self.query = self.query.with_source(source);
        self
    }

    /// Read from `source` instead, keeping the filters.
    pub fn from_source(mut self, source: TableSource) -> Self {
        self.query = self.query.with_source(source);
        self
    }

    /// Read from an opaque SQL fragment instead of a table.
    pub fn from_raw(self, sql: impl Into<String>) -> Self {
        self.from_source(TableSource::Raw(sql.into()))
    }

    /// Match no rows.
    pub fn none(mut self) -> Self {
        self.query = self.query.none();
        self
    }

    /// Restrict the relation to rows whose partition key is one of `values`, reading only the
    /// partitions that can hold them.
    ///
    /// The source is replaced by the single candidate partition, or by a union of all candidates
    /// exposed under the current reference name, so predicates written against the original name
    /// keep working. Without any candidate the relation matches nothing. A source without a
    /// resolvable reference name, such as a raw SQL fragment, is refused.
    pub async fn partition_key_in(mut self, values: Vec<PartitionValue>) -> Result<Self> {
        let reference = self
            .query
            .source()
            .reference_name()
            .ok_or(Error::UnresolvableTableReference)?
            .to_string();

        let mut candidates = self.model.resolver.resolve(&self.model.table, &values).await;
        if let Some(pinned) = &self.pinned {
            candidates.retain(|candidate| candidate == pinned);
        }
        debug!(
            table = %self.model.table_name(),
            %reference,
            ?candidates,
            "routing relation to partitions"
        );

        let query = match candidates.len() {
            0 => self.query.none(),
            1 => {
                let name = candidates.remove(0);
                let alias = (name != reference).then_some(reference);
                self.query.with_source(TableSource::Table { name, alias })
            }
            _ => self.query.with_source(TableSource::Union {
                tables: candidates,
                alias: reference,
            }),
        };

        let key = self.model.table.partition_key().to_string();
        let values = values.into_iter().map(Value::from).collect();
        self.query = query.filter(Filter::in_values(key, values));
        Ok(self)
    }

    /// [`partition_key_in`](Self::partition_key_in) for a single value.
    pub async fn partition_key_eq(self, value: PartitionValue) -> Result<Self> {
        self.partition_key_in(vec![value]).await
    }

    /// Execute the relation.
    pub async fn load(&self) -> Result<Vec<Row>> {
        Ok(self.model.db.select(&self.query).await?)
    }
}
