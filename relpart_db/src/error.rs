use relpart_types::BoundError;
use thiserror::Error;

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("invalid partition definition for {table}: {message}")]
    InvalidPartitionDefinition { table: String, message: String },

    #[error("constraint violation on {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("table {name} already exists")]
    TableExists { name: String },

    #[error("table {name} does not exist")]
    TableNotFound { name: String },

    #[error("table {name} is not partitioned")]
    NotPartitioned { name: String },

    #[error("table {name} is not a partition of {parent}")]
    NotAPartition { name: String, parent: String },

    #[error("unsupported query: {reason}")]
    UnsupportedQuery { reason: String },

    #[error("column {column} has unsupported type {type_name}")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("could not read the partition bound of {table}: {source}")]
    Bound {
        table: String,
        #[source]
        source: BoundError,
    },

    #[error("unhandled sqlx error: {source}")]
    Sqlx {
        #[from]
        source: sqlx::Error,
    },
}

/// A specialized `Error` for database errors
pub type Result<T, E = Error> = std::result::Result<T, E>;
