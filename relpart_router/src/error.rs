use thiserror::Error;

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("invalid partition definition for {table}: {reason}")]
    InvalidPartitionDefinition { table: String, reason: String },

    #[error("could not find a resolvable table reference in the current query")]
    UnresolvableTableReference,

    #[error(transparent)]
    Database(#[from] relpart_db::Error),
}

/// A specialized `Error` for routing errors
pub type Result<T, E = Error> = std::result::Result<T, E>;
