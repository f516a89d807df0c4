//! Statement front-end of the gridsql client driver.
//!
//! Submitted SQL text is tokenized, checked against a table of internal
//! driver directives (`SET STREAMING ...`) and then either executed locally
//! or forwarded unchanged to a [`QueryEngine`].

pub mod args;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod router;
pub mod sqlite;
pub mod state;
pub mod streaming;

pub use args::{convert, Arguments, TypedArgument};
pub use command::{
    ArgumentKind, Classification, CommandHandler, CommandOutcome, CommandSpec, CommandTable,
    OptionSpec,
};
pub use config::FrontendConfig;
pub use engine::{ClusterNode, ExecutionTarget, QueryEngine, ResultSet, ScalarValue, SubmitOptions};
pub use error::{Diagnostic, EngineError, FrontendError, SqlState};
pub use lexer::{tokenize, Statement, Token, TokenKind};
pub use router::{ExecutionContext, PreparedStatement, StatementOutcome, StatementRouter};
pub use sqlite::SqliteEngine;
pub use state::{DriverState, OptionValue, SessionState};
pub use streaming::{builtin_commands, StreamingSettings};
