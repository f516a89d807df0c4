//! Internal command table and statement classification.
//!
//! Internal commands are driver directives such as `SET STREAMING ON`; they
//! are handled locally and never reach the cluster. The table is built once
//! at start-up and only read afterwards, so one `Arc<CommandTable>` can be
//! shared by every connection.

use std::{fmt, sync::Arc};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::args::Arguments;
use crate::lexer::{Statement, Token};
use crate::state::DriverState;

/// Expected shape of one argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// `ON`, `OFF`, `1` or `0`, any case.
    Boolean,
    /// Integral number within `min..=max`.
    Integer { min: i64, max: i64 },
    /// Bare or double-quoted identifier.
    Identifier,
    /// Single-quoted string literal.
    StringLiteral,
}

impl ArgumentKind {
    pub const fn integer(min: i64, max: i64) -> Self {
        ArgumentKind::Integer { min, max }
    }

    pub fn describe(&self) -> String {
        match self {
            ArgumentKind::Boolean => "boolean".to_string(),
            ArgumentKind::Integer { min, max } => format!("integer in [{min}, {max}]"),
            ArgumentKind::Identifier => "identifier".to_string(),
            ArgumentKind::StringLiteral => "string literal".to_string(),
        }
    }
}

/// Keyword-introduced optional clause that may follow the positional
/// arguments, e.g. `BATCH_SIZE 512` or the bare flag `ORDERED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    name: String,
    value: Option<ArgumentKind>,
}

impl OptionSpec {
    pub fn flag(name: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            value: None,
        }
    }

    pub fn valued(name: &str, kind: ArgumentKind) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            value: Some(kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<ArgumentKind> {
        self.value
    }
}

/// Result of a successfully executed internal command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub summary: String,
}

impl CommandOutcome {
    pub fn new(command: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            summary: summary.into(),
        }
    }
}

/// Local operation bound to an internal command.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, arguments: &Arguments, state: &mut dyn DriverState)
        -> Result<CommandOutcome>;
}

/// One entry of the command table.
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    words: Vec<String>,
    arguments: Vec<ArgumentKind>,
    options: Vec<OptionSpec>,
    handler: Arc<dyn CommandHandler>,
}

impl CommandSpec {
    /// Creates a command named by one or more whitespace-separated words.
    pub fn new(name: &str, handler: Arc<dyn CommandHandler>) -> Self {
        let words: Vec<String> = name
            .split_whitespace()
            .map(|word| word.to_ascii_uppercase())
            .collect();
        Self {
            name: words.join(" "),
            words,
            arguments: Vec::new(),
            options: Vec::new(),
            handler,
        }
    }

    pub fn argument(mut self, kind: ArgumentKind) -> Self {
        self.arguments.push(kind);
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[ArgumentKind] {
        &self.arguments
    }

    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    /// Option introduced by `token`, if the token is a bare word naming one.
    pub fn find_option(&self, token: &Token) -> Option<&OptionSpec> {
        self.options
            .iter()
            .find(|option| token.matches_word(&option.name))
    }

    pub fn handler(&self) -> &dyn CommandHandler {
        self.handler.as_ref()
    }

    fn matches_prefix(&self, tokens: &[Token]) -> bool {
        self.words.len() <= tokens.len()
            && self
                .words
                .iter()
                .zip(tokens)
                .all(|(word, token)| token.matches_word(word))
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Outcome of classifying a statement against the command table.
#[derive(Debug, Clone, Copy)]
pub enum Classification<'t, 's> {
    /// The statement starts with a registered command name. `arguments` are the
    /// tokens after the name, including the trailing `End` token.
    Internal {
        command: &'t CommandSpec,
        arguments: &'s [Token],
    },
    /// Anything else; `text` is the raw statement exactly as submitted.
    Forward { text: &'s str },
}

/// Immutable, ordered set of internal commands.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: Vec<CommandSpec>,
}

impl CommandTable {
    pub fn builder() -> CommandTableBuilder {
        CommandTableBuilder::default()
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.commands
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        let wanted: Vec<String> = name
            .split_whitespace()
            .map(|word| word.to_ascii_uppercase())
            .collect();
        self.commands.iter().find(|spec| spec.words == wanted)
    }

    /// Matches the statement's leading words against the registered names.
    ///
    /// The longest matching name wins; equal lengths go to the command
    /// registered first. Only bare words take part, so text inside literals
    /// or quoted identifiers never triggers a match.
    pub fn classify<'t, 's>(&'t self, statement: &'s Statement) -> Classification<'t, 's> {
        let tokens = statement.tokens();
        let mut best: Option<&CommandSpec> = None;
        for spec in &self.commands {
            if spec.matches_prefix(tokens)
                && best.map_or(true, |current| spec.words.len() > current.words.len())
            {
                best = Some(spec);
            }
        }

        match best {
            Some(command) => Classification::Internal {
                command,
                arguments: &tokens[command.words.len()..],
            },
            None => Classification::Forward {
                text: statement.raw_text(),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandTableBuilder {
    commands: Vec<CommandSpec>,
}

impl CommandTableBuilder {
    pub fn register(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    pub fn build(self) -> Result<CommandTable> {
        for (idx, command) in self.commands.iter().enumerate() {
            if command.words.is_empty() {
                bail!("command at index {idx} has an empty name");
            }
            if self.commands[..idx]
                .iter()
                .any(|earlier| earlier.words == command.words)
            {
                bail!("command '{}' is registered more than once", command.name);
            }
        }
        Ok(CommandTable {
            commands: self.commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    struct Noop;

    impl CommandHandler for Noop {
        fn execute(
            &self,
            _arguments: &Arguments,
            _state: &mut dyn DriverState,
        ) -> Result<CommandOutcome> {
            Ok(CommandOutcome::new("noop", "nothing to do"))
        }
    }

    fn spec(name: &str) -> CommandSpec {
        CommandSpec::new(name, Arc::new(Noop))
    }

    fn table() -> CommandTable {
        CommandTable::builder()
            .register(spec("SET").argument(ArgumentKind::Identifier))
            .register(spec("SET STREAMING").argument(ArgumentKind::Boolean))
            .build()
            .unwrap()
    }

    fn classified_name(table: &CommandTable, sql: &str) -> Option<String> {
        let statement = tokenize(sql).unwrap();
        match table.classify(&statement) {
            Classification::Internal { command, .. } => Some(command.name().to_string()),
            Classification::Forward { .. } => None,
        }
    }

    #[test]
    fn longest_name_wins() {
        let table = table();
        assert_eq!(
            classified_name(&table, "SET STREAMING ON").as_deref(),
            Some("SET STREAMING")
        );
        assert_eq!(classified_name(&table, "SET schema").as_deref(), Some("SET"));
    }

    #[test]
    fn registration_order_does_not_change_longest_match() {
        let table = CommandTable::builder()
            .register(spec("SET STREAMING"))
            .register(spec("SET"))
            .build()
            .unwrap();
        assert_eq!(
            classified_name(&table, "set streaming 1").as_deref(),
            Some("SET STREAMING")
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let table = table();
        assert_eq!(
            classified_name(&table, "sEt StReAmInG off").as_deref(),
            Some("SET STREAMING")
        );
    }

    #[test]
    fn internal_arguments_follow_the_name() {
        let table = table();
        let statement = tokenize("SET STREAMING ON").unwrap();
        match table.classify(&statement) {
            Classification::Internal { arguments, .. } => {
                assert_eq!(arguments.len(), 2);
                assert_eq!(arguments[0].lexeme(), "ON");
                assert!(arguments[1].is_end());
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn unknown_statements_forward_raw_text() {
        let table = table();
        let sql = "  SELECT * FROM t  -- keep me";
        let statement = tokenize(sql).unwrap();
        match table.classify(&statement) {
            Classification::Forward { text } => assert_eq!(text, sql),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn names_inside_literals_do_not_match() {
        let table = table();
        assert_eq!(classified_name(&table, "'SET' STREAMING ON"), None);
        assert_eq!(classified_name(&table, "\"SET\" STREAMING ON"), None);
        assert_eq!(classified_name(&table, "SELECT 'SET STREAMING ON'"), None);
        assert_eq!(classified_name(&table, ""), None);
    }

    #[test]
    fn classification_is_deterministic() {
        let table = table();
        let statement = tokenize("SET STREAMING ON").unwrap();
        let first = format!("{:?}", table.classify(&statement));
        for _ in 0..10 {
            assert_eq!(format!("{:?}", table.classify(&statement)), first);
        }
    }

    #[test]
    fn builder_rejects_duplicate_names() {
        let err = CommandTable::builder()
            .register(spec("set streaming"))
            .register(spec("SET  STREAMING"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("registered more than once"));

        assert!(CommandTable::builder().register(spec("  ")).build().is_err());
    }

    #[test]
    fn lookup_by_name() {
        let table = table();
        assert!(table.get("set streaming").is_some());
        assert!(table.get("SET SCHEMA").is_none());
    }
}
