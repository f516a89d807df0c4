//! Front-end defaults read from `GRIDSQL_*` environment variables.

use std::{env, time::Duration};

use tracing::warn;

use crate::engine::ExecutionTarget;
use crate::streaming::StreamingSettings;

/// Defaults applied by [`crate::router::StatementRouter::from_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontendConfig {
    pub default_target: ExecutionTarget,
    pub query_timeout: Option<Duration>,
    pub streaming: StreamingSettings,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            default_target: ExecutionTarget::WholeCluster,
            query_timeout: None,
            streaming: StreamingSettings::default(),
        }
    }
}

impl FrontendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unparseable values are
    /// logged and replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_target = lookup("GRIDSQL_EXECUTION_TARGET")
            .and_then(|raw| match raw.parse::<ExecutionTarget>() {
                Ok(target) => Some(target),
                Err(err) => {
                    warn!(error = %err, "ignoring GRIDSQL_EXECUTION_TARGET");
                    None
                }
            })
            .unwrap_or(defaults.default_target);

        // 0 means no timeout.
        let query_timeout = integer_var(&lookup, "GRIDSQL_QUERY_TIMEOUT_SECS", 0, u32::MAX as i64)
            .map(|secs| (secs > 0).then(|| Duration::from_secs(secs as u64)))
            .unwrap_or(defaults.query_timeout);

        let base = defaults.streaming;
        let positive = |key: &str, fallback: i64| {
            integer_var(&lookup, key, 1, i32::MAX as i64).unwrap_or(fallback)
        };
        let streaming = StreamingSettings {
            enabled: false,
            batch_size: positive("GRIDSQL_STREAMING_BATCH_SIZE", base.batch_size),
            per_node_buffer_size: positive(
                "GRIDSQL_STREAMING_PER_NODE_BUFFER_SIZE",
                base.per_node_buffer_size,
            ),
            per_node_parallel_operations: positive(
                "GRIDSQL_STREAMING_PER_NODE_PARALLEL_OPERATIONS",
                base.per_node_parallel_operations,
            ),
            allow_overwrite: lookup("GRIDSQL_STREAMING_ALLOW_OVERWRITE")
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(base.allow_overwrite),
            flush_frequency_ms: integer_var(
                &lookup,
                "GRIDSQL_STREAMING_FLUSH_FREQUENCY_MS",
                0,
                i32::MAX as i64,
            )
            .unwrap_or(base.flush_frequency_ms),
            ordered: lookup("GRIDSQL_STREAMING_ORDERED")
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(base.ordered),
        };

        Self {
            default_target,
            query_timeout,
            streaming,
        }
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn integer_var<F>(lookup: &F, key: &str, min: i64, max: i64) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<i64>() {
        Ok(value) if (min..=max).contains(&value) => Some(value),
        _ => {
            warn!(key, value = %raw, min, max, "ignoring out-of-range or invalid value");
            None
        }
    }
}
