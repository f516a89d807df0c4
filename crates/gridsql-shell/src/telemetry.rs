use std::env;

use anyhow::{anyhow, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Installs the global subscriber. Logs go to stderr; stdout carries results.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (format, format_warning) =
        parse_log_format(env::var("GRIDSQL_LOG_FORMAT").ok().as_deref());

    let installed = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    if let Some(message) = format_warning {
        warn!(%message, "invalid log format configuration");
    }
    info!(service = service_name, ?format, "telemetry initialised");
    Ok(())
}

pub fn parse_log_format(raw: Option<&str>) -> (LogFormat, Option<String>) {
    match raw.map(str::trim) {
        None | Some("") => (LogFormat::Text, None),
        Some(value) if value.eq_ignore_ascii_case("json") => (LogFormat::Json, None),
        Some(value)
            if value.eq_ignore_ascii_case("text") || value.eq_ignore_ascii_case("pretty") =>
        {
            (LogFormat::Text, None)
        }
        Some(value) => (
            LogFormat::Text,
            Some(format!(
                "GRIDSQL_LOG_FORMAT '{value}' is not recognised; defaulting to text"
            )),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_defaults_to_text() {
        assert_eq!(parse_log_format(None), (LogFormat::Text, None));
        assert_eq!(parse_log_format(Some("  ")), (LogFormat::Text, None));
    }

    #[test]
    fn log_format_accepts_json_in_any_case() {
        assert_eq!(parse_log_format(Some("JSON")), (LogFormat::Json, None));
        assert_eq!(parse_log_format(Some("text")), (LogFormat::Text, None));
    }

    #[test]
    fn log_format_warns_on_unknown_value() {
        let (format, warning) = parse_log_format(Some("xml"));
        assert_eq!(format, LogFormat::Text);
        let warning = warning.expect("warning expected");
        assert!(warning.contains("xml"));
    }
}
