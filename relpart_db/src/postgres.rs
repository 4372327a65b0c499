//! A PostgreSQL backed implementation of [`Database`].

use std::{borrow::Cow, str::FromStr, time::Duration};

use async_trait::async_trait;
use relpart_types::{
    BoundError, ChildPartition, FilterOp, KeyType, Query, Row, TableSource, Value,
    bound::parse_bound_expr, quote_ident,
};
use sqlx::{
    Column, PgPool, Postgres, QueryBuilder, Row as _, TypeInfo,
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
};
use tracing::{debug, info, warn};

use crate::{Database, Ddl, Error, Result};

/// Postgres connection options.
#[derive(Debug, Clone)]
pub struct PostgresConnectionOptions {
    /// Application name.
    ///
    /// This will be reported to postgres.
    pub app_name: String,

    /// DSN.
    pub dsn: String,

    /// Maximum number of concurrent connections.
    pub max_conns: u32,

    /// Set the amount of time to attempt connecting to the database.
    pub connect_timeout: Duration,

    /// Set a maximum idle duration for individual connections.
    pub idle_timeout: Duration,
}

impl PostgresConnectionOptions {
    /// Default value for [`app_name`](Self::app_name).
    pub const DEFAULT_APP_NAME: &'static str = "relpart";

    /// Default value for [`max_conns`](Self::max_conns).
    pub const DEFAULT_MAX_CONNS: u32 = 10;

    /// Default value for [`connect_timeout`](Self::connect_timeout).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Default value for [`idle_timeout`](Self::idle_timeout).
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for PostgresConnectionOptions {
    fn default() -> Self {
        Self {
            app_name: String::from(Self::DEFAULT_APP_NAME),
            dsn: String::new(),
            max_conns: Self::DEFAULT_MAX_CONNS,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// The kind of a relation and, for a partitioned table, the type of its first key column.
///
/// Expression keys have no key column, so their type is `NULL`.
const DESCRIBE_RELATION: &str = r#"
SELECT c.relkind::text, (
    SELECT a.atttypid::regtype::text
    FROM pg_partitioned_table p
    JOIN pg_attribute a ON a.attrelid = p.partrelid AND a.attnum = p.partattrs[0]
    WHERE p.partrelid = c.oid
)
FROM pg_class c
WHERE c.oid = to_regclass($1);
"#;

/// Lists the children of a partitioned table together with their bound expressions.
const LIST_PARTITIONS: &str = r#"
SELECT c.relname::text, pg_get_expr(c.relpartbound, c.oid)
FROM pg_inherits i
JOIN pg_class c ON c.oid = i.inhrelid
WHERE i.inhparent = to_regclass($1)
ORDER BY c.oid;
"#;

/// PostgreSQL database.
#[derive(Debug)]
pub struct PostgresDatabase {
    pool: PgPool,
    // Connection options for display
    options: PostgresConnectionOptions,
}

impl PostgresDatabase {
    /// Connect to the database.
    pub async fn connect(options: PostgresConnectionOptions) -> Result<Self> {
        let connect_options = PgConnectOptions::from_str(&options.dsn)?;

        let app_name = options.app_name.clone();
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(options.max_conns)
            .acquire_timeout(options.connect_timeout)
            .idle_timeout(options.idle_timeout)
            .test_before_acquire(true)
            .after_connect(move |c, _meta| {
                let app_name = app_name.clone();
                Box::pin(async move {
                    // An application name given in the DSN takes precedence.
                    let current_application_name: String =
                        sqlx::query_scalar("SELECT current_setting('application_name');")
                            .fetch_one(&mut *c)
                            .await?;
                    if current_application_name.is_empty() {
                        sqlx::query("SELECT set_config('application_name', $1, false);")
                            .bind(&*app_name)
                            .execute(&mut *c)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;

        info!(application_name = %options.app_name, "connected to partition database");

        Ok(Self { pool, options })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Options the pool was connected with.
    pub fn options(&self) -> &PostgresConnectionOptions {
        &self.options
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn execute(&self, ddl: &Ddl) -> Result<()> {
        let sql = ddl.to_sql();
        debug!(%sql, "executing DDL");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_error(e, ddl.target()))?;
        Ok(())
    }

    async fn list_partitions(&self, parent: &str) -> Result<Vec<ChildPartition>> {
        let relation: Option<(String, Option<String>)> = sqlx::query_as(DESCRIBE_RELATION)
            .bind(quote_ident(parent))
            .fetch_optional(&self.pool)
            .await?;
        let key_type = match relation {
            Some((relkind, key_type)) if relkind == "p" => partition_key_type(key_type.as_deref()),
            Some(_) => {
                return Err(Error::NotPartitioned {
                    name: parent.to_string(),
                });
            }
            None => {
                return Err(Error::TableNotFound {
                    name: parent.to_string(),
                });
            }
        };

        let children: Vec<(String, Option<String>)> = sqlx::query_as(LIST_PARTITIONS)
            .bind(quote_ident(parent))
            .fetch_all(&self.pool)
            .await?;

        let mut partitions = Vec::with_capacity(children.len());
        for (name, expr) in children {
            let Some(expr) = expr else {
                continue;
            };
            match parse_bound_expr(&expr, key_type) {
                Ok(bound) => partitions.push(ChildPartition::new(name, bound, parent)),
                Err(e @ BoundError::Unsupported { .. }) => {
                    warn!(%parent, partition = %name, %e, "ignoring partition");
                }
                Err(source) => return Err(Error::Bound { table: name, source }),
            }
        }
        Ok(partitions)
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL;")
            .bind(quote_ident(name))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let mut qb = insert_sql(table, &row);
        let stored = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_error(e, table))?;
        decode_row(&stored)
    }

    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        if query.is_none() {
            return Ok(vec![]);
        }
        let mut qb = select_sql(query);
        debug!(sql = qb.sql(), "select");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

/// How bound literals of a key column of type `type_name` are read.
fn partition_key_type(type_name: Option<&str>) -> KeyType {
    match type_name {
        Some("smallint" | "integer" | "bigint") => KeyType::Integer,
        _ => KeyType::Other,
    }
}

/// `INSERT ... RETURNING *` for `row`.
///
/// Null columns are left out so column defaults, in particular generated keys, apply.
pub(crate) fn insert_sql(table: &str, row: &Row) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(quote_ident(table));

    let columns = row
        .iter()
        .filter(|(_, value)| !value.is_null())
        .collect::<Vec<_>>();
    if columns.is_empty() {
        qb.push(" DEFAULT VALUES");
    } else {
        qb.push(" (");
        for (i, (column, _)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(quote_ident(column));
        }
        qb.push(") VALUES (");
        for (i, (_, value)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(")");
    }
    qb.push(" RETURNING *");
    qb
}

/// `SELECT *` over the source of `query`, with its filters qualified by the reference name.
pub(crate) fn select_sql(query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT * FROM ");
    match query.source() {
        TableSource::Table { name, alias } => {
            qb.push(quote_ident(name));
            if let Some(alias) = alias {
                qb.push(" AS ").push(quote_ident(alias));
            }
        }
        TableSource::Union { tables, alias } => {
            qb.push("(");
            for (i, table) in tables.iter().enumerate() {
                if i > 0 {
                    qb.push(" UNION ALL ");
                }
                qb.push("SELECT * FROM ").push(quote_ident(table));
            }
            qb.push(") AS ").push(quote_ident(alias));
        }
        TableSource::Raw(sql) => {
            qb.push(sql);
        }
    }

    let qualifier = query
        .source()
        .reference_name()
        .map(|name| format!("{}.", quote_ident(name)))
        .unwrap_or_default();
    for (i, filter) in query.filters().iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        let column = format!("{qualifier}{}", quote_ident(&filter.column));
        match &filter.op {
            FilterOp::Eq(Value::Null) => {
                qb.push(column).push(" IS NULL");
            }
            FilterOp::Eq(value) => {
                qb.push(column).push(" = ");
                push_value(&mut qb, value);
            }
            FilterOp::In(values) if values.is_empty() => {
                qb.push("FALSE");
            }
            FilterOp::In(values) => {
                qb.push(column).push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    push_value(&mut qb, value);
                }
                qb.push(")");
            }
        }
    }
    qb
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Bool(v) => {
            qb.push_bind(*v);
        }
        Value::Int(v) => {
            qb.push_bind(*v);
        }
        Value::Text(v) => {
            qb.push_bind(v.clone());
        }
    }
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut decoded = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| Value::Int(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(idx)?.map(Value::from)
            }
            other => {
                return Err(Error::UnsupportedColumnType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                });
            }
        };
        decoded.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(decoded)
}

/// Error codes returned by Postgres that map onto dedicated [`Error`] variants.
///
/// See <https://www.postgresql.org/docs/current/errcodes-appendix.html>
const PG_INVALID_OBJECT_DEFINITION: &str = "42P17";
const PG_INVALID_TABLE_DEFINITION: &str = "42P16";
const PG_CHECK_VIOLATION: &str = "23514";
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_DUPLICATE_TABLE: &str = "42P07";
const PG_UNDEFINED_TABLE: &str = "42P01";

/// Translate a failure of a statement against `table`.
fn map_error(e: sqlx::Error, table: &str) -> Error {
    let (code, message) = match &e {
        sqlx::Error::Database(inner) => (
            inner.code().map(Cow::into_owned),
            inner.message().to_string(),
        ),
        _ => (None, String::new()),
    };
    let table = table.to_string();
    match code.as_deref() {
        Some(PG_INVALID_OBJECT_DEFINITION | PG_INVALID_TABLE_DEFINITION) => {
            Error::InvalidPartitionDefinition { table, message }
        }
        Some(PG_CHECK_VIOLATION | PG_UNIQUE_VIOLATION) => {
            Error::ConstraintViolation { table, message }
        }
        Some(PG_DUPLICATE_TABLE) => Error::TableExists { name: table },
        Some(PG_UNDEFINED_TABLE) => Error::TableNotFound { name: table },
        _ => Error::from(e),
    }
}

/// Test helpers postgres testing.
#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use rand::Rng;

    pub(crate) const TEST_DSN_ENV: &str = "TEST_RELPART_POSTGRES_DSN";

    /// Helper macro to skip tests if TEST_INTEGRATION and TEST_RELPART_POSTGRES_DSN environment
    /// variables are not set.
    macro_rules! maybe_skip_integration {
        ($panic_msg:expr) => {{
            dotenvy::dotenv().ok();

            let required_vars = [crate::postgres::test_utils::TEST_DSN_ENV];
            let unset_vars: Vec<_> = required_vars
                .iter()
                .filter_map(|&name| match std::env::var(name) {
                    Ok(_) => None,
                    Err(_) => Some(name),
                })
                .collect();
            let unset_var_names = unset_vars.join(", ");

            let force = std::env::var("TEST_INTEGRATION");

            if force.is_ok() && !unset_var_names.is_empty() {
                panic!(
                    "TEST_INTEGRATION is set, \
                            but variable(s) {} need to be set",
                    unset_var_names
                );
            } else if force.is_err() {
                eprintln!(
                    "skipping Postgres integration test - set {}TEST_INTEGRATION to run",
                    if unset_var_names.is_empty() {
                        String::new()
                    } else {
                        format!("{} and ", unset_var_names)
                    }
                );

                let panic_msg: &'static str = $panic_msg;
                if !panic_msg.is_empty() {
                    panic!("{}", panic_msg);
                }

                return;
            }
        }};
        () => {
            maybe_skip_integration!("")
        };
    }

    pub(crate) use maybe_skip_integration;

    pub(crate) async fn setup_db() -> PostgresDatabase {
        let dsn = std::env::var(TEST_DSN_ENV).unwrap();
        PostgresDatabase::connect(PostgresConnectionOptions {
            app_name: String::from("test"),
            dsn,
            ..Default::default()
        })
        .await
        .expect("failed to connect to database")
    }

    /// A table name that is unique to this test run.
    pub(crate) fn random_table_name(prefix: &str) -> String {
        // use scope to make it clear to clippy / rust that `rng` is
        // not carried past await points
        let mut rng = rand::thread_rng();
        let suffix = (&mut rng)
            .sample_iter(rand::distributions::Alphanumeric)
            .filter(|c| c.is_ascii_alphabetic())
            .take(12)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect::<String>();
        format!("{prefix}_{suffix}")
    }
}
