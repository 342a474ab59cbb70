//! Core data types for capabilities and invocation outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three kinds of capability a host can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [
        CapabilityKind::Tool,
        CapabilityKind::Resource,
        CapabilityKind::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
            CapabilityKind::Prompt => "prompt",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CapabilityKind {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tool" | "tools" => Ok(CapabilityKind::Tool),
            "resource" | "resources" => Ok(CapabilityKind::Resource),
            "prompt" | "prompts" => Ok(CapabilityKind::Prompt),
            other => Err(HostError::InvalidDescriptor(format!(
                "Unknown capability kind: {other}"
            ))),
        }
    }
}

/// Classification of an in-protocol invocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No registry entry for the name, or no resource template matched the URI.
    UnknownCapability,
    /// Arguments failed schema validation; the handler never ran.
    InvalidArguments,
    /// The capability body returned an error or panicked.
    HandlerError,
    /// A request arrived before the handshake completed.
    NotNegotiated,
    /// The session was torn down before the request was answered.
    SessionClosed,
    /// The caller's deadline expired before a response arrived.
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownCapability => "UnknownCapability",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::HandlerError => "HandlerError",
            ErrorKind::NotNegotiated => "NotNegotiated",
            ErrorKind::SessionClosed => "SessionClosed",
            ErrorKind::Timeout => "Timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UnknownCapability" => Some(ErrorKind::UnknownCapability),
            "InvalidArguments" => Some(ErrorKind::InvalidArguments),
            "HandlerError" => Some(ErrorKind::HandlerError),
            "NotNegotiated" => Some(ErrorKind::NotNegotiated),
            "SessionClosed" => Some(ErrorKind::SessionClosed),
            "Timeout" => Some(ErrorKind::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured invocation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub error_kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(error_kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error_kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_kind, self.message)
    }
}

/// Outcome of a single invocation. Exactly one of success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationResult {
    Success { payload: Value },
    Failure(Failure),
}

impl InvocationResult {
    pub fn success(payload: Value) -> Self {
        InvocationResult::Success { payload }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        InvocationResult::Failure(Failure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    /// The failure kind, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            InvocationResult::Success { .. } => None,
            InvocationResult::Failure(f) => Some(f.error_kind),
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            InvocationResult::Success { payload } => Some(payload),
            InvocationResult::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Value, Failure> {
        match self {
            InvocationResult::Success { payload } => Ok(payload),
            InvocationResult::Failure(f) => Err(f),
        }
    }
}

impl From<Failure> for InvocationResult {
    fn from(f: Failure) -> Self {
        InvocationResult::Failure(f)
    }
}

/// Errors raised while building or querying the capability registry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: CapabilityKind, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: CapabilityKind, name: String },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid URI template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

/// Convenience result type.
pub type HostResult<T> = Result<T, HostError>;
