//! Failure taxonomy shared by collaborators and the retry policy.
//!
//! Collaborators convert low-level faults (transport errors, HTTP statuses,
//! unusable bodies) into a [`FailureEvent`] before returning. Failures are
//! values, never errors crossing the core boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Network,
    RateLimit,
    ServerError,
    ClientError,
    Semantic,
    Unknown,
}

impl FailureClass {
    /// Every class, in declaration order.
    pub const ALL: [FailureClass; 6] = [
        FailureClass::Network,
        FailureClass::RateLimit,
        FailureClass::ServerError,
        FailureClass::ClientError,
        FailureClass::Semantic,
        FailureClass::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Network => "network",
            FailureClass::RateLimit => "rate_limit",
            FailureClass::ServerError => "server_error",
            FailureClass::ClientError => "client_error",
            FailureClass::Semantic => "semantic",
            FailureClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a failure, produced by tools or validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    failure_class: FailureClass,
    http_status: Option<u16>,
    message: String,
    retry_after_seconds: Option<u64>,
}

impl FailureEvent {
    pub fn new(failure_class: FailureClass, http_status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            failure_class,
            http_status,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    /// Rate-limit failure carrying the server's `Retry-After` hint, if any.
    pub fn rate_limited(http_status: u16, retry_after_seconds: Option<u64>) -> Self {
        Self {
            failure_class: FailureClass::RateLimit,
            http_status: Some(http_status),
            message: "rate limited".to_string(),
            retry_after_seconds,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Network, None, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Semantic, None, message)
    }

    pub fn failure_class(&self) -> FailureClass {
        self.failure_class
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.retry_after_seconds
    }
}

impl fmt::Display for FailureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.http_status {
            Some(status) => write!(f, "{} ({}): {}", self.failure_class, status, self.message),
            None => write!(f, "{}: {}", self.failure_class, self.message),
        }
    }
}
