//! Database-DSN-related configs.
use std::{sync::Arc, time::Duration};

use relpart_db::{
    Database,
    mem::MemDatabase,
    postgres::{PostgresConnectionOptions, PostgresDatabase},
};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "Unknown database DSN {dsn}. Expected a string like 'postgresql://postgres@localhost:5432/postgres' or 'memory'"
    )]
    UnknownDsn { dsn: String },

    #[error(
        "Database DSN not specified. Expected a string like 'postgresql://postgres@localhost:5432/postgres' or 'memory'"
    )]
    DsnNotSpecified,

    #[error("A database error occurred: {0}")]
    Database(#[from] relpart_db::Error),
}

fn default_connect_timeout() -> &'static str {
    let s =
        humantime::format_duration(PostgresConnectionOptions::DEFAULT_CONNECT_TIMEOUT).to_string();
    Box::leak(Box::new(s))
}

fn default_idle_timeout() -> &'static str {
    let s = humantime::format_duration(PostgresConnectionOptions::DEFAULT_IDLE_TIMEOUT).to_string();
    Box::leak(Box::new(s))
}

/// CLI config for the database holding the partitioned tables.
#[derive(Debug, Clone, clap::Parser)]
pub struct DatabaseDsnConfig {
    /// Database connection string.
    ///
    /// The dsn determines the type of database used.
    ///
    /// PostgreSQL: `postgresql://postgres@localhost:5432/postgres`
    ///
    /// Memory (ephemeral, only useful for testing): `memory`
    ///
    #[clap(long = "database-dsn", env = "RELPART_DATABASE_DSN", action)]
    pub dsn: Option<String>,

    /// Maximum number of connections allowed to the database at any one time.
    #[clap(
        long = "database-max-connections",
        env = "RELPART_DATABASE_MAX_CONNECTIONS",
        default_value_t = PostgresConnectionOptions::DEFAULT_MAX_CONNS,
        action,
    )]
    pub max_connections: u32,

    /// Set the amount of time to attempt connecting to the database.
    #[clap(
        long = "database-connect-timeout",
        env = "RELPART_DATABASE_CONNECT_TIMEOUT",
        default_value = default_connect_timeout(),
        value_parser = humantime::parse_duration,
    )]
    pub connect_timeout: Duration,

    /// Set a maximum idle duration for individual connections.
    #[clap(
        long = "database-idle-timeout",
        env = "RELPART_DATABASE_IDLE_TIMEOUT",
        default_value = default_idle_timeout(),
        value_parser = humantime::parse_duration,
    )]
    pub idle_timeout: Duration,

    /// Application name reported to PostgreSQL, unless the DSN sets one.
    #[clap(
        long = "database-app-name",
        env = "RELPART_DATABASE_APP_NAME",
        default_value = PostgresConnectionOptions::DEFAULT_APP_NAME,
        action,
    )]
    pub app_name: String,
}

impl DatabaseDsnConfig {
    /// Get config-dependent database.
    pub async fn get_database(&self) -> Result<Arc<dyn Database>, Error> {
        let Some(dsn) = self.dsn.as_ref() else {
            return Err(Error::DsnNotSpecified);
        };

        if dsn.starts_with("postgres") {
            // do not log entire postgres dsn as it may contain credentials
            info!(app_name = %self.app_name, "Database: Postgres");
            let options = PostgresConnectionOptions {
                app_name: self.app_name.clone(),
                dsn: dsn.clone(),
                max_conns: self.max_connections,
                connect_timeout: self.connect_timeout,
                idle_timeout: self.idle_timeout,
            };
            Ok(Arc::new(PostgresDatabase::connect(options).await?))
        } else if dsn == "memory" {
            info!("Database: In-memory");
            Ok(Arc::new(MemDatabase::new()))
        } else {
            Err(Error::UnknownDsn {
                dsn: dsn.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = DatabaseDsnConfig::try_parse_from(["server"]).unwrap();
        assert_eq!(config.dsn, None);
        assert_eq!(
            config.max_connections,
            PostgresConnectionOptions::DEFAULT_MAX_CONNS
        );
        assert_eq!(
            config.connect_timeout,
            PostgresConnectionOptions::DEFAULT_CONNECT_TIMEOUT
        );
        assert_eq!(
            config.idle_timeout,
            PostgresConnectionOptions::DEFAULT_IDLE_TIMEOUT
        );
        assert_eq!(config.app_name, "relpart");
    }

    #[test]
    fn explicit_values() {
        let config = DatabaseDsnConfig::try_parse_from([
            "server",
            "--database-dsn",
            "postgresql://localhost/db",
            "--database-max-connections",
            "3",
            "--database-connect-timeout",
            "500ms",
            "--database-idle-timeout",
            "1m",
            "--database-app-name",
            "partitioner",
        ])
        .unwrap();
        assert_eq!(config.dsn.as_deref(), Some("postgresql://localhost/db"));
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.app_name, "partitioner");

        assert!(
            DatabaseDsnConfig::try_parse_from(["server", "--database-idle-timeout", "soon"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn get_database() {
        let config =
            DatabaseDsnConfig::try_parse_from(["server", "--database-dsn", "memory"]).unwrap();
        let db = config.get_database().await.unwrap();
        assert!(!db.table_exists("anything").await.unwrap());

        let config =
            DatabaseDsnConfig::try_parse_from(["server", "--database-dsn", "mysql://db"]).unwrap();
        assert!(matches!(
            config.get_database().await,
            Err(Error::UnknownDsn { .. })
        ));

        let config = DatabaseDsnConfig::try_parse_from(["server"]).unwrap();
        assert!(matches!(
            config.get_database().await,
            Err(Error::DsnNotSpecified)
        ));
    }
}
