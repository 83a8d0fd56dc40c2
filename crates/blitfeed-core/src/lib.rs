//! blitfeed Core
//!
//! This crate provides the I/O-free heart of the blitfeed protocol replay tool:
//! the message feed and its cursor, peer bookkeeping, configuration types and
//! the `FeedSession` state machine. It never touches sockets; the runtime crate
//! feeds it `SessionEvent`s and executes the `SessionEffect`s it returns.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod message;
pub mod peer;
pub mod session;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{CloseCause, ErrorClass, Notice, SendOrigin, SessionEffect, SessionEvent};
pub use config::{Endpoint, ReplayConfig, Role, SessionFlags, TransportKind};
pub use errors::{ConfigError, ReplayError, Result, SessionError, TransportError};
pub use message::{FeedBuilder, FeedCursor, Message, MessageFeed};
pub use peer::{Peer, PeerObservation, PeerRegistry, PeerState, MAX_TRACKED_STRANGERS};
pub use session::{ActiveMode, FeedSession, SessionPhase, SessionStats, Transition};
