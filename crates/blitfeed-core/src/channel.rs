//! Session Communication Protocol Types
//!
//! All traffic between the runtime and the `FeedSession` state machine flows
//! through these types:
//! - `SessionEvent`: runtime → session (something happened)
//! - `SessionEffect`: session → runtime (something must be done)
//! - `Notice`: operator-visible announcements carried by `SessionEffect::Notify`

use std::fmt;

use crate::message::Message;
use crate::peer::Peer;

// ----------------------------------------------------------------------------
// SessionEvent: Runtime → Session
// ----------------------------------------------------------------------------

/// Discrete events the session reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection ready (TCP handshake done, or UDP socket bound)
    Established { peer: Option<Peer> },
    /// Inbound payload from a peer
    Received { from: Peer, payload: Vec<u8> },
    /// The in-flight send finished
    SendComplete,
    /// The in-flight send failed
    SendFailed { reason: String },
    /// Payload forwarded from a blit control connection
    Injected { message: Message },
    /// Operator confirmed the staged step
    StepContinue,
    /// Peer closed the TCP connection
    PeerClosed,
    /// Connection setup or socket failure
    TransportFailed { reason: String },
    /// Operator interrupt
    Interrupted,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Established { .. } => "Established",
            SessionEvent::Received { .. } => "Received",
            SessionEvent::SendComplete => "SendComplete",
            SessionEvent::SendFailed { .. } => "SendFailed",
            SessionEvent::Injected { .. } => "Injected",
            SessionEvent::StepContinue => "StepContinue",
            SessionEvent::PeerClosed => "PeerClosed",
            SessionEvent::TransportFailed { .. } => "TransportFailed",
            SessionEvent::Interrupted => "Interrupted",
        }
    }
}

// ----------------------------------------------------------------------------
// SessionEffect: Session → Runtime
// ----------------------------------------------------------------------------

/// Where a sent message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOrigin {
    /// Scripted message at this feed index
    Feed { index: usize },
    Injected,
}

impl fmt::Display for SendOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendOrigin::Feed { index } => write!(f, "feed #{}", index),
            SendOrigin::Injected => write!(f, "blit"),
        }
    }
}

/// Side effects requested by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Send a message; the runtime answers with `SendComplete`/`SendFailed`
    Send {
        peer: Peer,
        message: Message,
        origin: SendOrigin,
    },
    /// Ask the operator to confirm the staged scripted send
    AwaitStep { index: usize, message: Message },
    /// Emit an operator notice
    Notify(Notice),
    /// Tear the connection down; the session is closed
    Close { cause: CloseCause },
}

// ----------------------------------------------------------------------------
// Notices and Termination Causes
// ----------------------------------------------------------------------------

/// Operator-facing classification of termination and failure paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Configuration,
    Transport,
    Exhaustion,
    Injection,
    Interrupt,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Transport => write!(f, "transport"),
            ErrorClass::Exhaustion => write!(f, "exhaustion"),
            ErrorClass::Injection => write!(f, "injection"),
            ErrorClass::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Why a session reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Feed exhausted with `close_at_end`
    FeedExhausted,
    /// Orderly close by the peer
    PeerDisconnected,
    /// Setup failure or socket error
    TransportFailure { reason: String },
    Interrupted,
}

impl CloseCause {
    pub fn class(&self) -> ErrorClass {
        match self {
            CloseCause::FeedExhausted => ErrorClass::Exhaustion,
            CloseCause::PeerDisconnected | CloseCause::TransportFailure { .. } => {
                ErrorClass::Transport
            }
            CloseCause::Interrupted => ErrorClass::Interrupt,
        }
    }

    /// Whether the process should exit non-zero when this ends a non-persistent run
    pub fn is_failure(&self) -> bool {
        matches!(self, CloseCause::TransportFailure { .. })
    }
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::FeedExhausted => write!(f, "feed exhausted"),
            CloseCause::PeerDisconnected => write!(f, "peer disconnected"),
            CloseCause::TransportFailure { reason } => write!(f, "transport failure: {}", reason),
            CloseCause::Interrupted => write!(f, "interrupted by operator"),
        }
    }
}

/// Operator-visible announcements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Established { peer: Option<Peer> },
    PeerLearned { peer: Peer },
    /// Traffic from a peer other than the active one
    StrayInbound { from: Peer, len: usize },
    FeedExhausted { sent: usize },
    /// Injection queued because no peer is known yet
    InjectionDeferred { queued: usize },
    InjectionDropped { reason: String },
    Closed { cause: CloseCause },
    Reconnecting { next_cycle: u64 },
}

impl Notice {
    /// Classification for notices that report a failure or termination
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Notice::FeedExhausted { .. } => Some(ErrorClass::Exhaustion),
            Notice::InjectionDropped { .. } => Some(ErrorClass::Injection),
            Notice::Closed { cause } => Some(cause.class()),
            _ => None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Established { peer: Some(peer) } => write!(f, "connected to {}", peer),
            Notice::Established { peer: None } => write!(f, "ready, waiting for a peer"),
            Notice::PeerLearned { peer } => write!(f, "peer is {}", peer),
            Notice::StrayInbound { from, len } => {
                write!(f, "ignoring {} bytes from non-active peer {}", len, from)
            }
            Notice::FeedExhausted { sent } => {
                write!(f, "feed exhausted after {} messages", sent)
            }
            Notice::InjectionDeferred { queued } => {
                write!(f, "injection queued until a peer is known ({} pending)", queued)
            }
            Notice::InjectionDropped { reason } => write!(f, "injection dropped: {}", reason),
            Notice::Closed { cause } => write!(f, "session closed [{}]: {}", cause.class(), cause),
            Notice::Reconnecting { next_cycle } => {
                write!(f, "reconnecting (cycle {})", next_cycle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_cause_classes() {
        assert_eq!(CloseCause::FeedExhausted.class(), ErrorClass::Exhaustion);
        assert_eq!(CloseCause::PeerDisconnected.class(), ErrorClass::Transport);
        assert_eq!(CloseCause::Interrupted.class(), ErrorClass::Interrupt);
        assert!(CloseCause::TransportFailure {
            reason: "refused".to_string()
        }
        .is_failure());
        assert!(!CloseCause::PeerDisconnected.is_failure());
    }

    #[test]
    fn test_notice_display() {
        let notice = Notice::Closed {
            cause: CloseCause::FeedExhausted,
        };
        assert_eq!(notice.to_string(), "session closed [exhaustion]: feed exhausted");
        assert_eq!(notice.class(), Some(ErrorClass::Exhaustion));
        assert_eq!(Notice::Reconnecting { next_cycle: 2 }.class(), None);
    }
}
