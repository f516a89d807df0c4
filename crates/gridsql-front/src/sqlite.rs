//! SQLite-backed [`QueryEngine`] for development and tests.
//!
//! Stands in for the cluster so the forward path can be exercised end to end.
//! The database is treated as a single local node.

use std::{collections::BTreeMap, path::Path, str::FromStr, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Column, Either, Row, SqlitePool, TypeInfo, ValueRef,
};
use tracing::debug;
use uuid::Uuid;

use crate::engine::{
    ClusterNode, ExecutionTarget, QueryEngine, ResultSet, ScalarValue, SubmitOptions,
};
use crate::error::EngineError;

/// Default SQLite busy timeout in milliseconds when the DB is under load.
const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone, Debug)]
pub struct SqliteEngine {
    pool: SqlitePool,
    node: ClusterNode,
}

impl SqliteEngine {
    /// Opens (or creates) the database at `database_url`, e.g.
    /// `sqlite://./dev.db` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS));

        // Every connection to an in-memory database sees its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            8
        };

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            node: ClusterNode {
                id: Uuid::new_v4(),
                consistent_id: database_url.to_string(),
                addresses: vec![database_url.to_string()],
                is_local: true,
                is_client: false,
                attributes: BTreeMap::from([("engine".to_string(), "sqlite".to_string())]),
            },
        })
    }

    pub async fn connect_file(path: &Path) -> Result<Self> {
        let url = format!("sqlite://{}", path.display());
        Self::connect(&url).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run(&self, sql: &str) -> Result<ResultSet, EngineError> {
        let mut result = ResultSet::default();
        let mut steps = sqlx::raw_sql(sql).fetch_many(&self.pool);
        while let Some(step) = steps.try_next().await.map_err(map_sqlx_error)? {
            match step {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if result.columns.is_empty() {
                        result.columns = row
                            .columns()
                            .iter()
                            .map(|column| column.name().to_string())
                            .collect();
                    }
                    result.rows.push(decode_row(&row)?);
                }
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl QueryEngine for SqliteEngine {
    async fn submit(
        &self,
        sql: &str,
        target: &ExecutionTarget,
        options: &SubmitOptions,
    ) -> Result<ResultSet, EngineError> {
        match target {
            ExecutionTarget::WholeCluster | ExecutionTarget::Local => {}
            other => {
                return Err(EngineError::unsupported(format!(
                    "Execution target '{other}' is not available on the SQLite engine"
                )))
            }
        }

        if options.cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }

        debug!(%target, timeout = ?options.timeout, "running statement on sqlite");

        let work = async {
            match options.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.run(sql)).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::timeout(limit)),
                },
                None => self.run(sql).await,
            }
        };

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(EngineError::cancelled()),
            result = work => result,
        }
    }

    async fn topology(&self) -> Result<Vec<ClusterNode>, EngineError> {
        Ok(vec![self.node.clone()])
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<ScalarValue>, EngineError> {
    (0..row.len())
        .map(|idx| {
            let raw = row.try_get_raw(idx).map_err(map_sqlx_error)?;
            if raw.is_null() {
                return Ok(ScalarValue::Null);
            }
            let type_name = raw.type_info().name().to_ascii_uppercase();
            let value = match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => {
                    ScalarValue::Integer(row.try_get(idx).map_err(map_sqlx_error)?)
                }
                "REAL" => ScalarValue::Real(row.try_get(idx).map_err(map_sqlx_error)?),
                "BLOB" => ScalarValue::Blob(row.try_get(idx).map_err(map_sqlx_error)?),
                _ => ScalarValue::Text(row.try_get_unchecked(idx).map_err(map_sqlx_error)?),
            };
            Ok(value)
        })
        .collect()
}

fn map_sqlx_error(error: sqlx::Error) -> EngineError {
    match &error {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if message.contains("syntax error") || message.starts_with("no such") {
                EngineError::syntax(message)
            } else {
                EngineError::general(message)
            }
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            EngineError::link_failure(error.to_string())
        }
        _ => EngineError::general(error.to_string()),
    }
}
