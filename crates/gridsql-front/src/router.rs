//! Statement routing.
//!
//! Every statement is tokenized and classified exactly once. Internal
//! commands run their handler locally against the connection's driver state;
//! everything else is handed to the [`QueryEngine`] verbatim.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::args::{convert, Arguments};
use crate::command::{Classification, CommandOutcome, CommandSpec, CommandTable};
use crate::config::FrontendConfig;
use crate::engine::{ClusterNode, ExecutionTarget, QueryEngine, ResultSet, SubmitOptions};
use crate::error::FrontendError;
use crate::lexer::{tokenize, Statement};
use crate::state::DriverState;
use crate::streaming::builtin_commands;

/// Per-call execution settings. Unset fields fall back to the router defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub target: Option<ExecutionTarget>,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn with_target(mut self, target: ExecutionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A statement after tokenizing, classification and argument conversion.
#[derive(Debug)]
pub enum PreparedStatement<'t> {
    Internal {
        command: &'t CommandSpec,
        arguments: Arguments,
    },
    Forward {
        statement: Statement,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StatementOutcome {
    Command(CommandOutcome),
    Rows(ResultSet),
}

#[derive(Clone)]
pub struct StatementRouter {
    commands: Arc<CommandTable>,
    engine: Arc<dyn QueryEngine>,
    default_target: ExecutionTarget,
    default_timeout: Option<Duration>,
}

impl StatementRouter {
    pub fn new(commands: Arc<CommandTable>, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            commands,
            engine,
            default_target: ExecutionTarget::WholeCluster,
            default_timeout: None,
        }
    }

    /// Router with the built-in directives and the defaults from `config`.
    pub fn from_config(
        config: &FrontendConfig,
        engine: Arc<dyn QueryEngine>,
    ) -> anyhow::Result<Self> {
        let commands = builtin_commands(config.streaming)?;
        let mut router = Self::new(Arc::new(commands), engine)
            .with_default_target(config.default_target.clone());
        router.default_timeout = config.query_timeout;
        Ok(router)
    }

    pub fn with_default_target(mut self, target: ExecutionTarget) -> Self {
        self.default_target = target;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>, FrontendError> {
        let statement = tokenize(sql)?;
        let internal = match self.commands.classify(&statement) {
            Classification::Internal { command, arguments } => {
                Some((command, convert(command, arguments)?))
            }
            Classification::Forward { .. } => None,
        };
        Ok(match internal {
            Some((command, arguments)) => PreparedStatement::Internal { command, arguments },
            None => PreparedStatement::Forward { statement },
        })
    }

    #[instrument(skip_all, fields(len = sql.len()))]
    pub async fn execute(
        &self,
        sql: &str,
        state: &mut dyn DriverState,
        ctx: &ExecutionContext,
    ) -> Result<StatementOutcome, FrontendError> {
        match self.prepare(sql)? {
            PreparedStatement::Internal { command, arguments } => {
                debug!(command = command.name(), "executing internal command");
                command
                    .handler()
                    .execute(&arguments, state)
                    .map(StatementOutcome::Command)
                    .map_err(|source| FrontendError::HandlerExecution {
                        command: command.name().to_string(),
                        source,
                    })
            }
            PreparedStatement::Forward { statement } => {
                let target = ctx.target.as_ref().unwrap_or(&self.default_target);
                let options = SubmitOptions {
                    timeout: ctx.timeout.or(self.default_timeout),
                    cancel: ctx.cancel.clone(),
                };
                debug!(%target, "forwarding statement to engine");
                match self.engine.submit(statement.raw_text(), target, &options).await {
                    Ok(rows) => Ok(StatementOutcome::Rows(rows)),
                    Err(err) => {
                        warn!(
                            sql_state = %err.sql_state(),
                            error = %err,
                            "engine rejected statement"
                        );
                        Err(FrontendError::Forward(err))
                    }
                }
            }
        }
    }

    pub async fn topology(&self) -> Result<Vec<ClusterNode>, FrontendError> {
        Ok(self.engine.topology().await?)
    }
}
