//! Line-oriented statement shell.
//!
//! Reads one statement per line, runs it through the statement router and
//! writes one JSON record per statement.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gridsql_front::{
    Diagnostic, ExecutionContext, ExecutionTarget, FrontendConfig, SessionState, SqliteEngine,
    StatementOutcome, StatementRouter,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "gridsql-shell")]
#[command(version)]
#[command(about = "Run SQL statements and driver directives against a development engine")]
pub struct Cli {
    /// Database URL of the development engine
    #[arg(long, env = "GRIDSQL_DB_DSN", default_value = "sqlite::memory:")]
    pub dsn: String,

    /// Execution target: cluster, local, servers, clients, data-nodes:<cache>,
    /// nodes:<uuid,...> or attr:<name>=<value>
    #[arg(long)]
    pub target: Option<ExecutionTarget>,

    /// Query timeout in seconds (0 disables the limit)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Stop at the first failing statement and exit non-zero
    #[arg(long)]
    pub fail_fast: bool,
}

impl Cli {
    pub fn frontend_config(&self) -> FrontendConfig {
        let mut config = FrontendConfig::from_env();
        if let Some(target) = &self.target {
            config.default_target = target.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.query_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }

    pub async fn connect(&self) -> Result<StatementRouter> {
        let engine = SqliteEngine::connect(&self.dsn)
            .await
            .with_context(|| format!("failed to open database '{}'", self.dsn))?;
        StatementRouter::from_config(&self.frontend_config(), Arc::new(engine))
    }
}

/// One output line.
#[derive(Debug, Serialize)]
pub struct Record {
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StatementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Diagnostic>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub failed: usize,
}

/// Executes every non-blank line of `input`. Cancelling `shutdown` aborts the
/// running statement and ends the loop.
pub async fn run<R, W>(
    router: &StatementRouter,
    fail_fast: bool,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = SessionState::new();
    let mut summary = RunSummary::default();
    let mut lines = input.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await.context("failed to read statement")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        if shutdown.is_cancelled() {
            info!(line = line_no, "shutdown requested; skipping remaining statements");
            break;
        }

        let ctx = ExecutionContext::default().with_cancel(shutdown.child_token());
        let record = match router.execute(&line, &mut state, &ctx).await {
            Ok(outcome) => Record {
                line: line_no,
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => {
                debug!(line = line_no, error = %err, "statement failed");
                summary.failed += 1;
                Record {
                    line: line_no,
                    outcome: None,
                    error: Some(err.diagnostic()),
                }
            }
        };
        summary.executed += 1;

        let mut encoded = serde_json::to_vec(&record).context("failed to encode record")?;
        encoded.push(b'\n');
        output.write_all(&encoded).await.context("failed to write record")?;

        if fail_fast && record.error.is_some() {
            break;
        }
    }

    output.flush().await.context("failed to flush output")?;
    Ok(summary)
}
