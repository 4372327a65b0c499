//! Building blocks for [`clap`]-driven configs.
//!
//! They can easily be re-used using `#[clap(flatten)]`.
pub mod database_dsn;
pub mod partition_cache;
pub mod partition_creation;
