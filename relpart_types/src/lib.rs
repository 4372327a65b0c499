//! Shared data model for declaratively partitioned tables.
//!
//! Everything in here is plain data: the definition of a partitioned parent table, the bound of a
//! child partition, the literal values rows and predicates carry, and the description of a query
//! that is handed to a database for execution.
#![warn(missing_docs)]

pub mod bound;
mod ident;
mod query;
mod table;
mod value;

pub use bound::{BoundError, ChildPartition, KeyType, PartitionBound, RangeEndpoint};
pub use ident::{quote_ident, quote_literal};
pub use query::{Filter, FilterOp, Query, TableSource};
pub use table::{PartitionStrategy, PartitionedTable};
pub use value::{PartitionValue, Row, Value, row};
