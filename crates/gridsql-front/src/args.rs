//! Typed conversion of internal command arguments.
//!
//! The converter checks the argument count first and only then converts each
//! token. Errors name the offending token and its byte position; the first
//! error in scan order is reported.

use serde::Serialize;

use crate::command::{ArgumentKind, CommandSpec, OptionSpec};
use crate::error::FrontendError;
use crate::lexer::{Token, TokenKind};

/// Converted argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TypedArgument {
    Boolean(bool),
    Integer(i64),
    Identifier(String),
    StringLiteral(String),
}

impl TypedArgument {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedArgument::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedArgument::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedArgument::Identifier(value) | TypedArgument::StringLiteral(value) => Some(value),
            _ => None,
        }
    }
}

/// Converted arguments of one internal command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Arguments {
    positional: Vec<TypedArgument>,
    options: Vec<(String, Option<TypedArgument>)>,
}

impl Arguments {
    pub fn positional(&self) -> &[TypedArgument] {
        &self.positional
    }

    pub fn get(&self, index: usize) -> Option<&TypedArgument> {
        self.positional.get(index)
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.options
            .iter()
            .any(|(option, _)| option.eq_ignore_ascii_case(name))
    }

    /// Value given for a valued option, if the option was supplied.
    pub fn option_value(&self, name: &str) -> Option<&TypedArgument> {
        self.options
            .iter()
            .find(|(option, _)| option.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn option_names(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|(name, _)| name.as_str())
    }
}

/// Clause after the positional arguments: an option keyword and, for valued
/// options, the token holding its value.
struct Clause<'a> {
    option: &'a OptionSpec,
    value: Option<&'a Token>,
}

/// Converts the argument tokens of a classified internal command.
///
/// `tokens` are the tokens following the command name and must end with the
/// `End` token produced by the lexer. One trailing `;` is accepted as a
/// statement terminator.
pub fn convert(command: &CommandSpec, tokens: &[Token]) -> Result<Arguments, FrontendError> {
    let (tokens, end_position) = strip_terminator(tokens);

    // Positional arguments come first; option clauses may only follow them.
    let expected = command.arguments().len();
    if tokens.len() < expected {
        return Err(FrontendError::ArgumentCount {
            command: command.name().to_string(),
            expected,
            actual: tokens.len(),
            position: end_position,
        });
    }
    let (positional, rest) = tokens.split_at(expected);

    let mut clauses: Vec<Clause> = Vec::new();
    let mut extra: Vec<&Token> = Vec::new();
    let mut clause_error: Option<FrontendError> = None;
    let mut idx = 0;
    while idx < rest.len() {
        let token = &rest[idx];
        idx += 1;
        let Some(option) = command.find_option(token) else {
            extra.push(token);
            continue;
        };
        if clause_error.is_some() {
            continue;
        }
        if clauses
            .iter()
            .any(|clause| clause.option.name() == option.name())
        {
            clause_error = Some(FrontendError::DuplicateOption {
                option: option.name().to_string(),
                position: token.position(),
            });
            continue;
        }
        let value = match option.value() {
            Some(_) => {
                let value = rest.get(idx);
                idx += 1;
                match value {
                    Some(value) => Some(value),
                    None => {
                        clause_error = Some(missing_option_value(option, end_position));
                        continue;
                    }
                }
            }
            None => None,
        };
        clauses.push(Clause { option, value });
    }

    if let Some(first_extra) = extra.first() {
        let precedes_clause_error = clause_error
            .as_ref()
            .and_then(FrontendError::position)
            .map_or(true, |position| first_extra.position() < position);
        if precedes_clause_error {
            return Err(FrontendError::ArgumentCount {
                command: command.name().to_string(),
                expected,
                actual: expected + extra.len(),
                position: first_extra.position(),
            });
        }
    }
    if let Some(err) = clause_error {
        return Err(err);
    }

    let mut arguments = Arguments::default();
    for (token, kind) in positional.iter().zip(command.arguments()) {
        arguments.positional.push(convert_token(token, *kind)?);
    }
    for clause in clauses {
        let value = match (clause.option.value(), clause.value) {
            (Some(kind), Some(token)) => Some(convert_token(token, kind)?),
            _ => None,
        };
        arguments
            .options
            .push((clause.option.name().to_string(), value));
    }

    Ok(arguments)
}

/// Converts a single token to the requested kind.
pub fn convert_token(token: &Token, kind: ArgumentKind) -> Result<TypedArgument, FrontendError> {
    match kind {
        ArgumentKind::Boolean => token_to_bool(token).map(TypedArgument::Boolean),
        ArgumentKind::Integer { min, max } => {
            token_to_integer(token, min, max).map(TypedArgument::Integer)
        }
        ArgumentKind::Identifier => match token.kind() {
            TokenKind::Identifier | TokenKind::Keyword => {
                Ok(TypedArgument::Identifier(token.lexeme().to_string()))
            }
            TokenKind::QuotedIdentifier => token
                .unquoted()
                .map(TypedArgument::Identifier)
                .ok_or_else(|| unexpected(token, kind, "identifier")),
            _ => Err(unexpected(token, kind, "identifier")),
        },
        ArgumentKind::StringLiteral => match token.kind() {
            TokenKind::StringLiteral => token
                .unquoted()
                .map(TypedArgument::StringLiteral)
                .ok_or_else(|| unexpected(token, kind, "string literal")),
            _ => Err(unexpected(token, kind, "string literal")),
        },
    }
}

/// Parses `ON`, `OFF`, `1` or `0` (any case) into a boolean.
pub fn token_to_bool(token: &Token) -> Result<bool, FrontendError> {
    match token.lexeme().to_ascii_lowercase().as_str() {
        "1" | "on" => Ok(true),
        "0" | "off" => Ok(false),
        _ => Err(unexpected(token, ArgumentKind::Boolean, "ON, OFF, 1 or 0")),
    }
}

fn token_to_integer(token: &Token, min: i64, max: i64) -> Result<i64, FrontendError> {
    let kind = ArgumentKind::integer(min, max);
    if token.kind() != TokenKind::Number {
        return Err(unexpected(token, kind, "integer"));
    }

    let lexeme = token.lexeme();
    if lexeme.contains(['.', 'e', 'E']) {
        return Err(FrontendError::ArgumentType {
            position: token.position(),
            expected: kind.describe(),
            lexeme: lexeme.to_string(),
            message: format!("Unexpected token: '{lexeme}', integer expected."),
        });
    }

    match lexeme.parse::<i64>() {
        Ok(value) if (min..=max).contains(&value) => Ok(value),
        _ => Err(FrontendError::ArgumentType {
            position: token.position(),
            expected: kind.describe(),
            lexeme: lexeme.to_string(),
            message: format!("Value {lexeme} is out of range, expected value in [{min}, {max}]."),
        }),
    }
}

fn unexpected(token: &Token, kind: ArgumentKind, vocabulary: &str) -> FrontendError {
    let message = if token.is_end() {
        format!("Unexpected end of statement, {vocabulary} expected.")
    } else {
        format!("Unexpected token: '{}', {vocabulary} expected.", token.lexeme())
    };
    FrontendError::ArgumentType {
        position: token.position(),
        expected: kind.describe(),
        lexeme: token.lexeme().to_string(),
        message,
    }
}

fn missing_option_value(option: &OptionSpec, position: usize) -> FrontendError {
    let kind = option.value().unwrap_or(ArgumentKind::Boolean);
    FrontendError::ArgumentType {
        position,
        expected: kind.describe(),
        lexeme: String::new(),
        message: format!(
            "Unexpected end of statement, {} expected after {}.",
            kind.describe(),
            option.name()
        ),
    }
}

/// Drops the `End` sentinel and an optional trailing `;`, returning the
/// position where the arguments end.
fn strip_terminator(tokens: &[Token]) -> (&[Token], usize) {
    let (end, rest) = match tokens.split_last() {
        Some((last, rest)) if last.is_end() => (last.position(), rest),
        _ => (tokens.last().map_or(0, Token::position), tokens),
    };
    match rest.split_last() {
        Some((last, rest)) if last.is_punctuation(";") => (rest, last.position()),
        _ => (rest, end),
    }
}
