//! Cluster query engine collaborator.
//!
//! The router forwards ordinary statements through [`QueryEngine`]; it knows
//! nothing about transport. Timeouts and cancellation travel with each call
//! in [`SubmitOptions`] and are enforced by the engine.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::EngineError;

/// Cluster group a forwarded statement runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExecutionTarget {
    #[default]
    WholeCluster,
    Local,
    Servers,
    Clients,
    DataNodes {
        cache: String,
    },
    Nodes {
        ids: Vec<Uuid>,
    },
    Attribute {
        name: String,
        value: String,
    },
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionTarget::WholeCluster => f.write_str("cluster"),
            ExecutionTarget::Local => f.write_str("local"),
            ExecutionTarget::Servers => f.write_str("servers"),
            ExecutionTarget::Clients => f.write_str("clients"),
            ExecutionTarget::DataNodes { cache } => write!(f, "data-nodes:{cache}"),
            ExecutionTarget::Nodes { ids } => {
                let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
                write!(f, "nodes:{}", ids.join(","))
            }
            ExecutionTarget::Attribute { name, value } => write!(f, "attr:{name}={value}"),
        }
    }
}

impl FromStr for ExecutionTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (kind, rest) = match trimmed.split_once(':') {
            Some((kind, rest)) => (kind, Some(rest.trim())),
            None => (trimmed, None),
        };

        match (kind.to_ascii_lowercase().as_str(), rest) {
            ("cluster" | "all", None) => Ok(ExecutionTarget::WholeCluster),
            ("local", None) => Ok(ExecutionTarget::Local),
            ("servers", None) => Ok(ExecutionTarget::Servers),
            ("clients", None) => Ok(ExecutionTarget::Clients),
            ("data-nodes", Some(cache)) if !cache.is_empty() => Ok(ExecutionTarget::DataNodes {
                cache: cache.to_string(),
            }),
            ("nodes", Some(list)) => {
                let ids = list
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| {
                        Uuid::parse_str(item).with_context(|| format!("invalid node id '{item}'"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                if ids.is_empty() {
                    bail!("execution target 'nodes:' needs at least one node id");
                }
                Ok(ExecutionTarget::Nodes { ids })
            }
            ("attr", Some(pair)) => {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("execution target 'attr:' expects name=value"))?;
                Ok(ExecutionTarget::Attribute {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            _ => Err(anyhow!("unknown execution target '{trimmed}'")),
        }
    }
}

/// Topology entry reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterNode {
    pub id: Uuid,
    pub consistent_id: String,
    pub addresses: Vec<String>,
    pub is_local: bool,
    pub is_client: bool,
    pub attributes: BTreeMap<String, String>,
}

/// Per-call obligations handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Rows (or an update count) returned for a forwarded statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
    pub rows_affected: u64,
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Runs `sql` against `target`. Errors are returned to the caller as-is.
    async fn submit(
        &self,
        sql: &str,
        target: &ExecutionTarget,
        options: &SubmitOptions,
    ) -> Result<ResultSet, EngineError>;

    async fn topology(&self) -> Result<Vec<ClusterNode>, EngineError>;
}
