//! Partition-aware routing for logical, partitioned tables.
//!
//! A [`PartitionedModel`] stands for the parent table. It creates and detaches child partitions
//! through a [`relpart_db::Database`], and it narrows queries to the children that can hold a
//! given set of partition key values. Which children exist is read through a shared
//! [`relpart_cache::PartitionCache`].
#![warn(missing_docs)]

pub mod creator;
mod error;
pub mod resolver;
pub mod scoped;

pub use creator::{CreationMode, CreatorOptions, PartitionCreator, generate_partition_name};
pub use error::{Error, Result};
pub use resolver::{PartitionResolver, resolve_candidates};
pub use scoped::{PartitionedModel, Relation, ScopedTable};
