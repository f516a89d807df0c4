//! `SET STREAMING` directive.
//!
//! Switches the connection into (or out of) streaming ingestion mode and
//! records the data streamer parameters in the driver state. Nothing is sent
//! to the cluster.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::args::Arguments;
use crate::command::{
    ArgumentKind, CommandHandler, CommandOutcome, CommandSpec, CommandTable, OptionSpec,
};
use crate::state::{DriverState, OptionValue};

pub const STREAMING_COMMAND: &str = "SET STREAMING";

pub const BATCH_SIZE: &str = "BATCH_SIZE";
pub const PER_NODE_BUFFER_SIZE: &str = "PER_NODE_BUFFER_SIZE";
pub const PER_NODE_PARALLEL_OPERATIONS: &str = "PER_NODE_PARALLEL_OPERATIONS";
pub const ALLOW_OVERWRITE: &str = "ALLOW_OVERWRITE";
pub const FLUSH_FREQUENCY: &str = "FLUSH_FREQUENCY";
pub const ORDERED: &str = "ORDERED";

const STATE_PREFIX: &str = "streaming.";
const POSITIVE: ArgumentKind = ArgumentKind::integer(1, i32::MAX as i64);
const NON_NEGATIVE: ArgumentKind = ArgumentKind::integer(0, i32::MAX as i64);

/// Data streamer parameters of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamingSettings {
    pub enabled: bool,
    pub batch_size: i64,
    pub per_node_buffer_size: i64,
    pub per_node_parallel_operations: i64,
    pub allow_overwrite: bool,
    /// Flush interval in milliseconds; `0` disables periodic flushing.
    pub flush_frequency_ms: i64,
    pub ordered: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 2048,
            per_node_buffer_size: 1024,
            per_node_parallel_operations: 16,
            allow_overwrite: false,
            flush_frequency_ms: 0,
            ordered: false,
        }
    }
}

impl StreamingSettings {
    /// Reads the settings stored by the last `SET STREAMING`, falling back to
    /// `defaults` for anything missing.
    pub fn from_state(state: &dyn DriverState, defaults: &StreamingSettings) -> Self {
        let boolean = |key: &str, fallback: bool| {
            state
                .get_option(&state_key(key))
                .and_then(|value| value.as_bool())
                .unwrap_or(fallback)
        };
        let integer = |key: &str, fallback: i64| {
            state
                .get_option(&state_key(key))
                .and_then(|value| value.as_integer())
                .unwrap_or(fallback)
        };

        Self {
            enabled: boolean("enabled", defaults.enabled),
            batch_size: integer("batch_size", defaults.batch_size),
            per_node_buffer_size: integer("per_node_buffer_size", defaults.per_node_buffer_size),
            per_node_parallel_operations: integer(
                "per_node_parallel_operations",
                defaults.per_node_parallel_operations,
            ),
            allow_overwrite: boolean("allow_overwrite", defaults.allow_overwrite),
            flush_frequency_ms: integer("flush_frequency_ms", defaults.flush_frequency_ms),
            ordered: boolean("ordered", defaults.ordered),
        }
    }

    pub fn store(&self, state: &mut dyn DriverState) {
        let entries = [
            ("enabled", OptionValue::Boolean(self.enabled)),
            ("batch_size", OptionValue::Integer(self.batch_size)),
            ("per_node_buffer_size", OptionValue::Integer(self.per_node_buffer_size)),
            (
                "per_node_parallel_operations",
                OptionValue::Integer(self.per_node_parallel_operations),
            ),
            ("allow_overwrite", OptionValue::Boolean(self.allow_overwrite)),
            ("flush_frequency_ms", OptionValue::Integer(self.flush_frequency_ms)),
            ("ordered", OptionValue::Boolean(self.ordered)),
        ];
        for (key, value) in entries {
            state.set_option(&state_key(key), value);
        }
    }

    fn apply(&mut self, arguments: &Arguments) -> Result<()> {
        self.enabled = arguments
            .get(0)
            .and_then(|value| value.as_bool())
            .context("missing streaming mode")?;

        if let Some(value) = integer_option(arguments, BATCH_SIZE)? {
            self.batch_size = value;
        }
        if let Some(value) = integer_option(arguments, PER_NODE_BUFFER_SIZE)? {
            self.per_node_buffer_size = value;
        }
        if let Some(value) = integer_option(arguments, PER_NODE_PARALLEL_OPERATIONS)? {
            self.per_node_parallel_operations = value;
        }
        if let Some(value) = integer_option(arguments, FLUSH_FREQUENCY)? {
            self.flush_frequency_ms = value;
        }
        if let Some(value) = arguments.option_value(ALLOW_OVERWRITE) {
            self.allow_overwrite = value
                .as_bool()
                .with_context(|| format!("{ALLOW_OVERWRITE} expects a boolean"))?;
        }
        self.ordered = arguments.has_option(ORDERED);
        Ok(())
    }
}

fn state_key(key: &str) -> String {
    format!("{STATE_PREFIX}{key}")
}

fn integer_option(arguments: &Arguments, name: &str) -> Result<Option<i64>> {
    arguments
        .option_value(name)
        .map(|value| {
            value
                .as_integer()
                .with_context(|| format!("{name} expects an integer"))
        })
        .transpose()
}

/// Handler bound to [`STREAMING_COMMAND`].
#[derive(Debug, Clone)]
pub struct SetStreamingHandler {
    defaults: StreamingSettings,
}

impl SetStreamingHandler {
    pub fn new(defaults: StreamingSettings) -> Self {
        Self { defaults }
    }
}

impl CommandHandler for SetStreamingHandler {
    fn execute(
        &self,
        arguments: &Arguments,
        state: &mut dyn DriverState,
    ) -> Result<CommandOutcome> {
        // Options left out revert to the defaults rather than the previous call.
        let mut settings = self.defaults;
        settings.apply(arguments)?;
        settings.store(state);

        info!(
            enabled = settings.enabled,
            batch_size = settings.batch_size,
            per_node_buffer_size = settings.per_node_buffer_size,
            per_node_parallel_operations = settings.per_node_parallel_operations,
            allow_overwrite = settings.allow_overwrite,
            flush_frequency_ms = settings.flush_frequency_ms,
            ordered = settings.ordered,
            "streaming mode updated"
        );

        let summary = if settings.enabled {
            format!(
                "streaming enabled (batch size {}, ordered {})",
                settings.batch_size,
                OptionValue::Boolean(settings.ordered)
            )
        } else {
            "streaming disabled".to_string()
        };
        Ok(CommandOutcome::new(STREAMING_COMMAND, summary))
    }
}

pub fn streaming_command(defaults: StreamingSettings) -> CommandSpec {
    CommandSpec::new(STREAMING_COMMAND, Arc::new(SetStreamingHandler::new(defaults)))
        .argument(ArgumentKind::Boolean)
        .option(OptionSpec::valued(BATCH_SIZE, POSITIVE))
        .option(OptionSpec::valued(PER_NODE_BUFFER_SIZE, POSITIVE))
        .option(OptionSpec::valued(PER_NODE_PARALLEL_OPERATIONS, POSITIVE))
        .option(OptionSpec::valued(ALLOW_OVERWRITE, ArgumentKind::Boolean))
        .option(OptionSpec::valued(FLUSH_FREQUENCY, NON_NEGATIVE))
        .option(OptionSpec::flag(ORDERED))
}

/// Command table with every directive the driver understands.
pub fn builtin_commands(defaults: StreamingSettings) -> Result<CommandTable> {
    CommandTable::builder()
        .register(streaming_command(defaults))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::convert;
    use crate::command::Classification;
    use crate::error::FrontendError;
    use crate::lexer::tokenize;
    use crate::state::SessionState;

    fn run(sql: &str, state: &mut SessionState) -> Result<CommandOutcome, FrontendError> {
        let table = builtin_commands(StreamingSettings::default()).unwrap();
        let statement = tokenize(sql)?;
        match table.classify(&statement) {
            Classification::Internal { command, arguments } => {
                let arguments = convert(command, arguments)?;
                Ok(command.handler().execute(&arguments, state).unwrap())
            }
            Classification::Forward { .. } => panic!("{sql} was not classified as internal"),
        }
    }

    #[test]
    fn defaults_match_data_streamer_defaults() {
        let defaults = StreamingSettings::default();
        assert!(!defaults.enabled);
        assert_eq!(defaults.batch_size, 2048);
        assert_eq!(defaults.per_node_buffer_size, 1024);
        assert_eq!(defaults.per_node_parallel_operations, 16);
        assert_eq!(defaults.flush_frequency_ms, 0);
        assert!(!defaults.allow_overwrite);
        assert!(!defaults.ordered);
    }

    #[test]
    fn enabling_stores_settings() {
        let mut state = SessionState::new();
        let outcome = run(
            "SET STREAMING ON BATCH_SIZE 512 ALLOW_OVERWRITE 1 FLUSH_FREQUENCY 100 ORDERED",
            &mut state,
        )
        .unwrap();
        assert_eq!(outcome.command, STREAMING_COMMAND);
        assert!(outcome.summary.contains("batch size 512"));

        let settings = StreamingSettings::from_state(&state, &StreamingSettings::default());
        assert_eq!(
            settings,
            StreamingSettings {
                enabled: true,
                batch_size: 512,
                allow_overwrite: true,
                flush_frequency_ms: 100,
                ordered: true,
                ..StreamingSettings::default()
            }
        );
        assert_eq!(
            state.get_option("streaming.enabled"),
            Some(OptionValue::Boolean(true))
        );
    }

    #[test]
    fn disabling_resets_omitted_options() {
        let mut state = SessionState::new();
        run("SET STREAMING ON PER_NODE_BUFFER_SIZE 8 ORDERED", &mut state).unwrap();
        let outcome = run("set streaming off", &mut state).unwrap();
        assert_eq!(outcome.summary, "streaming disabled");

        let settings = StreamingSettings::from_state(&state, &StreamingSettings::default());
        assert_eq!(settings, StreamingSettings::default());
    }

    #[test]
    fn options_are_validated_when_disabling() {
        let mut state = SessionState::new();
        let err = run("SET STREAMING OFF BATCH_SIZE 0", &mut state).unwrap_err();
        assert!(matches!(err, FrontendError::ArgumentType { .. }));
        assert!(err.to_string().contains("out of range"));
        assert!(state.is_empty());
    }

    #[test]
    fn flush_frequency_accepts_zero() {
        let mut state = SessionState::new();
        run("SET STREAMING 1 FLUSH_FREQUENCY 0", &mut state).unwrap();
        let settings = StreamingSettings::from_state(&state, &StreamingSettings::default());
        assert!(settings.enabled);
        assert_eq!(settings.flush_frequency_ms, 0);
    }

    #[test]
    fn from_state_falls_back_to_defaults() {
        let defaults = StreamingSettings {
            batch_size: 64,
            ..StreamingSettings::default()
        };
        let state =
            SessionState::new().with_option("streaming.ordered", OptionValue::Boolean(true));
        let settings = StreamingSettings::from_state(&state, &defaults);
        assert_eq!(settings.batch_size, 64);
        assert!(settings.ordered);
    }

    #[test]
    fn configured_defaults_apply_to_omitted_options() {
        let defaults = StreamingSettings {
            per_node_parallel_operations: 4,
            ..StreamingSettings::default()
        };
        let table = builtin_commands(defaults).unwrap();
        let statement = tokenize("SET STREAMING ON").unwrap();
        let Classification::Internal { command, arguments } = table.classify(&statement) else {
            panic!("expected internal command");
        };
        let arguments = convert(command, arguments).unwrap();
        let mut state = SessionState::new();
        command.handler().execute(&arguments, &mut state).unwrap();
        assert_eq!(
            state.get_option("streaming.per_node_parallel_operations"),
            Some(OptionValue::Integer(4))
        );
    }
}
