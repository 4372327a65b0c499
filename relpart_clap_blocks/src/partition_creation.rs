//! Config for creating child partitions.
use relpart_router::{CreationMode, CreatorOptions};

/// How new partitions are created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PartitionCreationMode {
    /// `CREATE TABLE ... PARTITION OF` in a single statement.
    Direct,

    /// Create a copy of the parent table, then attach it.
    #[default]
    Attach,
}

impl From<PartitionCreationMode> for CreationMode {
    fn from(mode: PartitionCreationMode) -> Self {
        match mode {
            PartitionCreationMode::Direct => Self::Direct,
            PartitionCreationMode::Attach => Self::Attach,
        }
    }
}

/// CLI config for creating partitions.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct PartitionCreationConfig {
    /// Statements used to create a partition.
    #[clap(
        long = "partition-creation-mode",
        env = "RELPART_PARTITION_CREATION_MODE",
        value_enum,
        default_value_t = PartitionCreationMode::default(),
    )]
    pub mode: PartitionCreationMode,

    /// Add the primary key of the parent table to every new partition.
    #[clap(
        long = "partition-create-primary-key",
        env = "RELPART_PARTITION_CREATE_PRIMARY_KEY",
        default_value_t = false,
        action = clap::ArgAction::Set,
    )]
    pub with_primary_key: bool,
}

impl From<PartitionCreationConfig> for CreatorOptions {
    fn from(config: PartitionCreationConfig) -> Self {
        Self {
            mode: config.mode.into(),
            with_primary_key: config.with_primary_key,
        }
    }
}
