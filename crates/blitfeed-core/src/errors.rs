//! Error types for blitfeed
//!
//! Configuration, transport and session errors are kept apart so callers can
//! tell a usage mistake (fatal before any network activity) from a recoverable
//! connection failure. `ReplayError` unifies them.

use crate::channel::ErrorClass;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Problems with the recognized options, detected before any network activity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid address '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },
    #[error("Client mode requires a target host:port")]
    MissingTarget,
    #[error("Server mode requires a listen address (--listen)")]
    MissingListen,
    #[error("Unexpected target '{target}' in server mode")]
    UnexpectedTarget { target: String },
    #[error("Blit address {addr} collides with the listen address")]
    BlitConflictsWithListen { addr: String },
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Failures of the underlying connection or listener sockets
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to resolve {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("Send to {peer} failed: {source}")]
    Send {
        peer: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),
}

/// Misuse of the feed session state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid transition from {from_state} on event {event}")]
    InvalidTransition {
        from_state: &'static str,
        event: &'static str,
    },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Main error type for blitfeed operations
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ReplayError {
    /// Operator-facing classification of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            ReplayError::Config(_) => ErrorClass::Configuration,
            ReplayError::Transport(_) | ReplayError::Session(_) => ErrorClass::Transport,
        }
    }
}

pub type Result<T> = core::result::Result<T, ReplayError>;
