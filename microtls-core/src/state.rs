//! Connection lifecycle.

use core::fmt;

/// Where a [`Connection`](crate::Connection) is in its lifecycle.
///
/// ```text
/// Start ──▶ Handshaking ──▶ Established ──▶ Closed
///                 │               │
///                 └──────┬────────┘
///                        ▼
///                      Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionPhase {
    /// Nothing sent yet
    #[default]
    Start,
    /// Handshake in progress
    Handshaking,
    /// Application data may flow
    Established,
    /// Closed by `close_notify` in either direction
    Closed,
    /// Aborted by an error
    Failed,
}

impl ConnectionPhase {
    /// No further records are sent or accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Closed | ConnectionPhase::Failed)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Start => "start",
            ConnectionPhase::Handshaking => "handshaking",
            ConnectionPhase::Established => "established",
            ConnectionPhase::Closed => "closed",
            ConnectionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}
