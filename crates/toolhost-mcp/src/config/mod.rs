//! Configuration loading and resolution.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::{McpError, McpResult};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 300;

/// Resolve the HTTP bind address.
pub fn resolve_bind_addr(explicit: Option<&str>) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }

    if let Ok(env_addr) = std::env::var("TOOLHOST_ADDR") {
        if !env_addr.trim().is_empty() {
            return env_addr;
        }
    }

    DEFAULT_BIND_ADDR.to_string()
}

/// Resolve the client-side request deadline.
pub fn resolve_timeout(explicit: Option<u64>) -> Duration {
    let secs = explicit.or_else(|| {
        std::env::var("TOOLHOST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
    });
    Duration::from_secs(secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
}

/// Resolve how long an idle streaming HTTP session is kept.
pub fn resolve_session_ttl(explicit: Option<u64>) -> Duration {
    let secs = explicit.or_else(|| {
        std::env::var("TOOLHOST_SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|s| *s > 0)
    });
    Duration::from_secs(secs.unwrap_or(DEFAULT_SESSION_TTL_SECS))
}

/// Which binding a client session connects through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// Spawn the host as a child process and speak over its stdio.
    Pipe {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// `POST` messages to a streaming HTTP endpoint.
    StreamableHttp { url: String },
    /// Open an SSE stream and post messages to the endpoint it names.
    Sse { url: String },
}

impl TransportConfig {
    /// Parse a connection target.
    ///
    /// - `stdio:<command> [args…]` (whitespace-separated)
    /// - `http://…` / `https://…`
    /// - `sse+http://…` / `sse+https://…`
    pub fn parse(target: &str) -> McpResult<Self> {
        let target = target.trim();

        if let Some(rest) = target.strip_prefix("stdio:") {
            let mut parts = rest.split_whitespace().map(str::to_string);
            let command = parts.next().ok_or_else(|| {
                McpError::InvalidParams("stdio target needs a command".to_string())
            })?;
            return Ok(TransportConfig::Pipe {
                command,
                args: parts.collect(),
                env: HashMap::new(),
            });
        }

        if let Some(url) = target.strip_prefix("sse+") {
            if url.starts_with("http://") || url.starts_with("https://") {
                return Ok(TransportConfig::Sse {
                    url: url.to_string(),
                });
            }
        } else if target.starts_with("http://") || target.starts_with("https://") {
            return Ok(TransportConfig::StreamableHttp {
                url: target.to_string(),
            });
        }

        Err(McpError::InvalidParams(format!(
            "Unrecognized target '{target}' (expected stdio:<cmd>, http(s)://… or sse+http(s)://…)"
        )))
    }

    /// Add an environment variable for a pipe child; ignored otherwise.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::Pipe { env, .. } = &mut self {
            env.insert(key.into(), value.into());
        }
        self
    }
}

impl std::fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::Pipe { command, args, .. } => {
                write!(f, "stdio:{command}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            TransportConfig::StreamableHttp { url } => f.write_str(url),
            TransportConfig::Sse { url } => write!(f, "sse+{url}"),
        }
    }
}
