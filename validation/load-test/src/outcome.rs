//! Request outcome records emitted by virtual users.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::user::UserId;

/// Sending half of the outcome stream. Each virtual user holds a clone.
pub type OutcomeSender = mpsc::UnboundedSender<RequestOutcome>;

/// Receiving half of the outcome stream, consumed by the aggregator.
pub type OutcomeReceiver = mpsc::UnboundedReceiver<RequestOutcome>;

/// Create a fresh outcome stream for one run.
pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    mpsc::unbounded_channel()
}

/// How a single request ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The server answered with this status code.
    Status(u16),
    /// The per-request timeout elapsed.
    Timeout,
    /// Connection refused, reset, DNS failure and friends.
    Transport(String),
}

impl OutcomeKind {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Status(code) if (200..300).contains(code))
    }

    /// Short label used for failure breakdowns.
    pub fn label(&self) -> String {
        match self {
            OutcomeKind::Status(code) => format!("HTTP {}", code),
            OutcomeKind::Timeout => "timeout".to_string(),
            OutcomeKind::Transport(_) => "transport error".to_string(),
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Status(code) => write!(f, "HTTP {}", code),
            OutcomeKind::Timeout => f.write_str("timeout"),
            OutcomeKind::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// Immutable record of one executed request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub user_id: UserId,
    pub task: String,
    pub method: String,
    pub path: String,
    pub kind: OutcomeKind,
    #[serde(serialize_with = "serialize_micros")]
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }

    pub fn latency_us(&self) -> u64 {
        self.elapsed.as_micros() as u64
    }
}

fn serialize_micros<S: serde::Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(value.as_micros() as u64)
}
