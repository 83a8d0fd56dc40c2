//! Feed Session State Machine
//!
//! `FeedSession` owns one feed cursor, the injection queue and the active-peer
//! registry for a single connection. It is driven by `handle`, a single
//! dispatch over `(phase, event)` that returns the effects the runtime must
//! execute. It performs no I/O.
//!
//! Phases: `Connecting → Active → Exhausted → Closed`. While `Active` the
//! session is in one of the sub-modes reported by `active_mode`.
//!
//! Pacing rules:
//! - A scripted send needs the turn. The turn is granted by `go_first` on
//!   establishment and by every inbound message from the active peer; each
//!   scripted send consumes it.
//! - Injected messages go before the next scripted message, skip the turn gate
//!   and `step`, and never move the cursor.
//! - Nothing is sent while another send is in flight or while no peer is known.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::channel::{CloseCause, Notice, SendOrigin, SessionEffect, SessionEvent};
use crate::config::SessionFlags;
use crate::errors::SessionError;
use crate::message::{FeedCursor, Message};
use crate::peer::{Peer, PeerObservation, PeerRegistry};

// ----------------------------------------------------------------------------
// Session Phases
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Active,
    Exhausted,
    Closed,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Connecting => "Connecting",
            SessionPhase::Active => "Active",
            SessionPhase::Exhausted => "Exhausted",
            SessionPhase::Closed => "Closed",
        }
    }
}

/// What an `Active` session is currently blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    /// No turn yet, or no peer known
    AwaitingPeer,
    /// A scripted send is staged until the operator continues
    AwaitingStep,
    /// A send is in flight
    Sending,
    /// Free to send; only observed between events
    Ready,
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub feed_sent: usize,
    pub injected_sent: usize,
    pub received: usize,
    pub stray_received: usize,
    pub injections_dropped: usize,
}

/// Result of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: &'static str,
    pub to: &'static str,
    pub effects: Vec<SessionEffect>,
}

#[derive(Debug, Clone)]
struct StagedSend {
    index: usize,
    message: Message,
    released: bool,
}

// ----------------------------------------------------------------------------
// Feed Session
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct FeedSession {
    flags: SessionFlags,
    phase: SessionPhase,
    close_cause: Option<CloseCause>,
    cursor: FeedCursor,
    injections: VecDeque<Message>,
    peers: PeerRegistry,
    our_turn: bool,
    in_flight: Option<SendOrigin>,
    staged: Option<StagedSend>,
    stats: SessionStats,
}

impl FeedSession {
    pub fn new(flags: SessionFlags, cursor: FeedCursor) -> Self {
        Self {
            flags,
            phase: SessionPhase::Connecting,
            close_cause: None,
            cursor,
            injections: VecDeque::new(),
            peers: PeerRegistry::new(),
            our_turn: false,
            in_flight: None,
            staged: None,
            stats: SessionStats::default(),
        }
    }

    /// Register the active peer before any traffic
    pub fn register_peer(&mut self, peer: Peer) -> bool {
        self.peers.register(peer)
    }

    /// Dispatch one event and return the resulting effects
    pub fn handle(&mut self, event: SessionEvent) -> Result<Transition, SessionError> {
        let from = self.phase.name();
        let event_name = event.name();
        let mut effects = Vec::new();

        match (self.phase, event) {
            (SessionPhase::Closed, _) => {
                return Err(SessionError::InvalidTransition {
                    from_state: from,
                    event: event_name,
                });
            }

            // From Connecting
            (SessionPhase::Connecting, SessionEvent::Established { peer }) => {
                if let Some(peer) = peer {
                    self.peers.register(peer);
                }
                self.phase = SessionPhase::Active;
                self.our_turn = self.flags.go_first;
                effects.push(SessionEffect::Notify(Notice::Established {
                    peer: self.peers.active(),
                }));
                self.pump(&mut effects);
            }

            (SessionPhase::Connecting, SessionEvent::Injected { .. }) => {
                self.stats.injections_dropped += 1;
                effects.push(SessionEffect::Notify(Notice::InjectionDropped {
                    reason: "session not yet active".to_string(),
                }));
            }

            // From Active or Exhausted
            (
                SessionPhase::Active | SessionPhase::Exhausted,
                SessionEvent::Received { from: sender, payload },
            ) => {
                self.stats.received += 1;
                match self.peers.observe(sender) {
                    PeerObservation::Learned(peer) => {
                        effects.push(SessionEffect::Notify(Notice::PeerLearned { peer }));
                        self.our_turn = true;
                    }
                    PeerObservation::Active => {
                        if self.our_turn {
                            trace!("Inbound while already holding the turn");
                        }
                        self.our_turn = true;
                    }
                    PeerObservation::Stranger { first_seen } => {
                        self.stats.stray_received += 1;
                        if first_seen {
                            effects.push(SessionEffect::Notify(Notice::StrayInbound {
                                from: sender,
                                len: payload.len(),
                            }));
                        }
                    }
                }
                self.pump(&mut effects);
            }

            (SessionPhase::Active | SessionPhase::Exhausted, SessionEvent::SendComplete) => {
                match self.in_flight.take() {
                    Some(SendOrigin::Feed { .. }) => self.stats.feed_sent += 1,
                    Some(SendOrigin::Injected) => self.stats.injected_sent += 1,
                    None => {
                        return Err(SessionError::InvalidTransition {
                            from_state: from,
                            event: event_name,
                        });
                    }
                }
                self.pump(&mut effects);
            }

            (
                SessionPhase::Active | SessionPhase::Exhausted,
                SessionEvent::Injected { message },
            ) => {
                self.injections.push_back(message);
                if self.peers.active().is_none() {
                    effects.push(SessionEffect::Notify(Notice::InjectionDeferred {
                        queued: self.injections.len(),
                    }));
                }
                self.pump(&mut effects);
            }

            (SessionPhase::Active | SessionPhase::Exhausted, SessionEvent::StepContinue) => {
                match self.staged.as_mut() {
                    Some(staged) => {
                        staged.released = true;
                        self.pump(&mut effects);
                    }
                    None => debug!("Step signal with nothing staged, ignoring"),
                }
            }

            (SessionPhase::Active | SessionPhase::Exhausted, SessionEvent::SendFailed { reason }) => {
                self.close(CloseCause::TransportFailure { reason }, &mut effects);
            }

            // Universal transitions
            (_, SessionEvent::PeerClosed) => {
                self.close(CloseCause::PeerDisconnected, &mut effects);
            }

            (_, SessionEvent::TransportFailed { reason }) => {
                self.close(CloseCause::TransportFailure { reason }, &mut effects);
            }

            (_, SessionEvent::Interrupted) => {
                self.close(CloseCause::Interrupted, &mut effects);
            }

            // Invalid transitions
            (_, _) => {
                return Err(SessionError::InvalidTransition {
                    from_state: from,
                    event: event_name,
                });
            }
        }

        Ok(Transition {
            from,
            to: self.phase.name(),
            effects,
        })
    }

    /// Take the next unit of work, if the session is free to send one
    fn pump(&mut self, effects: &mut Vec<SessionEffect>) {
        if !matches!(self.phase, SessionPhase::Active | SessionPhase::Exhausted)
            || self.in_flight.is_some()
        {
            return;
        }

        // Injections preempt the feed but still need somebody to send to
        if !self.injections.is_empty() {
            let Some(peer) = self.peers.active() else {
                return;
            };
            if let Some(message) = self.injections.pop_front() {
                self.in_flight = Some(SendOrigin::Injected);
                effects.push(SessionEffect::Send {
                    peer,
                    message,
                    origin: SendOrigin::Injected,
                });
            }
            return;
        }

        if let Some(staged) = self.staged.take() {
            if !staged.released {
                self.staged = Some(staged);
                return;
            }
            if let Some(peer) = self.peers.active() {
                let origin = SendOrigin::Feed {
                    index: staged.index,
                };
                self.in_flight = Some(origin);
                effects.push(SessionEffect::Send {
                    peer,
                    message: staged.message,
                    origin,
                });
            }
            return;
        }

        if self.phase == SessionPhase::Exhausted {
            return;
        }

        if self.cursor.is_exhausted() {
            self.exhaust(effects);
            return;
        }

        let Some(peer) = self.peers.active() else {
            return;
        };
        if !self.our_turn {
            return;
        }
        let Some((index, message)) = self.cursor.next_indexed() else {
            return;
        };
        self.our_turn = false;

        if self.flags.step {
            self.staged = Some(StagedSend {
                index,
                message: message.clone(),
                released: false,
            });
            effects.push(SessionEffect::AwaitStep { index, message });
        } else {
            let origin = SendOrigin::Feed { index };
            self.in_flight = Some(origin);
            effects.push(SessionEffect::Send {
                peer,
                message,
                origin,
            });
        }
    }

    fn exhaust(&mut self, effects: &mut Vec<SessionEffect>) {
        self.phase = SessionPhase::Exhausted;
        if !self.flags.squelch_exhausted {
            effects.push(SessionEffect::Notify(Notice::FeedExhausted {
                sent: self.stats.feed_sent,
            }));
        }
        if self.flags.close_at_end {
            self.close(CloseCause::FeedExhausted, effects);
        }
    }

    fn close(&mut self, cause: CloseCause, effects: &mut Vec<SessionEffect>) {
        self.phase = SessionPhase::Closed;
        self.in_flight = None;
        self.staged = None;
        let dropped = self.injections.len();
        if dropped > 0 {
            self.stats.injections_dropped += dropped;
            self.injections.clear();
            effects.push(SessionEffect::Notify(Notice::InjectionDropped {
                reason: format!("{} pending injections discarded on close", dropped),
            }));
        }
        self.close_cause = Some(cause.clone());
        effects.push(SessionEffect::Notify(Notice::Closed {
            cause: cause.clone(),
        }));
        effects.push(SessionEffect::Close { cause });
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Sub-mode while `Active`; `None` in every other phase
    pub fn active_mode(&self) -> Option<ActiveMode> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        let mode = if self.in_flight.is_some() {
            ActiveMode::Sending
        } else if self.staged.as_ref().is_some_and(|s| !s.released) {
            ActiveMode::AwaitingStep
        } else if !self.our_turn || self.peers.active().is_none() {
            ActiveMode::AwaitingPeer
        } else {
            ActiveMode::Ready
        };
        Some(mode)
    }

    pub fn close_cause(&self) -> Option<&CloseCause> {
        self.close_cause.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn cursor_position(&self) -> usize {
        self.cursor.position()
    }

    pub fn pending_injections(&self) -> usize {
        self.injections.len()
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFeed;
    use std::net::SocketAddr;

    fn peer() -> Peer {
        Peer::tcp(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }

    fn session(payloads: &[&[u8]], flags: SessionFlags) -> FeedSession {
        let mut builder = MessageFeed::builder();
        builder.append(payloads.iter().map(|p| Message::new(p.to_vec())));
        FeedSession::new(flags, FeedCursor::new(builder.build()))
    }

    fn sends(effects: &[SessionEffect]) -> Vec<(Vec<u8>, SendOrigin)> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::Send {
                    message, origin, ..
                } => Some((message.payload().to_vec(), *origin)),
                _ => None,
            })
            .collect()
    }

    fn established(session: &mut FeedSession) -> Transition {
        session
            .handle(SessionEvent::Established { peer: Some(peer()) })
            .unwrap()
    }

    #[test]
    fn test_initial_state() {
        let session = session(&[b"A"], SessionFlags::default());
        assert_eq!(session.phase(), SessionPhase::Connecting);
        assert_eq!(session.active_mode(), None);
        assert_eq!(session.cursor_position(), 0);
    }

    #[test]
    fn test_go_first_sends_immediately() {
        let flags = SessionFlags {
            go_first: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[b"A", b"B"], flags);

        let transition = established(&mut session);
        assert_eq!(transition.from, "Connecting");
        assert_eq!(transition.to, "Active");
        assert_eq!(
            sends(&transition.effects),
            vec![(b"A".to_vec(), SendOrigin::Feed { index: 0 })]
        );
        assert_eq!(session.active_mode(), Some(ActiveMode::Sending));
    }

    #[test]
    fn test_peer_leads_without_go_first() {
        let mut session = session(&[b"A"], SessionFlags::default());

        let transition = established(&mut session);
        assert!(sends(&transition.effects).is_empty());
        assert_eq!(session.active_mode(), Some(ActiveMode::AwaitingPeer));

        let transition = session
            .handle(SessionEvent::Received {
                from: peer(),
                payload: b"hello".to_vec(),
            })
            .unwrap();
        assert_eq!(sends(&transition.effects).len(), 1);
    }

    #[test]
    fn test_send_complete_does_not_grant_turn() {
        let flags = SessionFlags {
            go_first: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[b"A", b"B"], flags);
        established(&mut session);

        let transition = session.handle(SessionEvent::SendComplete).unwrap();
        assert!(sends(&transition.effects).is_empty());
        assert_eq!(session.active_mode(), Some(ActiveMode::AwaitingPeer));
        assert_eq!(session.stats().feed_sent, 1);
    }

    #[test]
    fn test_step_stages_until_continue() {
        let flags = SessionFlags {
            go_first: true,
            step: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[b"A"], flags);

        let transition = established(&mut session);
        assert!(sends(&transition.effects).is_empty());
        assert!(transition
            .effects
            .iter()
            .any(|e| matches!(e, SessionEffect::AwaitStep { index: 0, .. })));
        assert_eq!(session.active_mode(), Some(ActiveMode::AwaitingStep));

        let transition = session.handle(SessionEvent::StepContinue).unwrap();
        assert_eq!(
            sends(&transition.effects),
            vec![(b"A".to_vec(), SendOrigin::Feed { index: 0 })]
        );
    }

    #[test]
    fn test_stray_step_signal_is_ignored() {
        let mut session = session(&[b"A"], SessionFlags::default());
        established(&mut session);
        let transition = session.handle(SessionEvent::StepContinue).unwrap();
        assert!(transition.effects.is_empty());
    }

    #[test]
    fn test_injection_jumps_the_gate() {
        let mut session = session(&[b"A"], SessionFlags::default());
        established(&mut session);

        let transition = session
            .handle(SessionEvent::Injected {
                message: Message::new(*b"X"),
            })
            .unwrap();
        assert_eq!(
            sends(&transition.effects),
            vec![(b"X".to_vec(), SendOrigin::Injected)]
        );
        assert_eq!(session.cursor_position(), 0);

        session.handle(SessionEvent::SendComplete).unwrap();
        assert_eq!(session.stats().injected_sent, 1);
        assert_eq!(session.active_mode(), Some(ActiveMode::AwaitingPeer));
    }

    #[test]
    fn test_injection_before_active_is_dropped() {
        let mut session = session(&[b"A"], SessionFlags::default());
        let transition = session
            .handle(SessionEvent::Injected {
                message: Message::new(*b"X"),
            })
            .unwrap();
        assert_eq!(
            transition.effects,
            vec![SessionEffect::Notify(Notice::InjectionDropped {
                reason: "session not yet active".to_string()
            })]
        );
        assert_eq!(session.stats().injections_dropped, 1);
        assert_eq!(session.phase(), SessionPhase::Connecting);
    }

    #[test]
    fn test_injection_deferred_without_peer() {
        let flags = SessionFlags {
            go_first: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[b"A"], flags);
        let transition = session
            .handle(SessionEvent::Established { peer: None })
            .unwrap();
        assert!(sends(&transition.effects).is_empty());

        let transition = session
            .handle(SessionEvent::Injected {
                message: Message::new(*b"X"),
            })
            .unwrap();
        assert!(transition
            .effects
            .contains(&SessionEffect::Notify(Notice::InjectionDeferred { queued: 1 })));
        assert!(sends(&transition.effects).is_empty());

        let udp_peer = Peer::udp(SocketAddr::from(([127, 0, 0, 1], 9000)));
        let transition = session
            .handle(SessionEvent::Received {
                from: udp_peer,
                payload: vec![1],
            })
            .unwrap();
        assert!(transition
            .effects
            .contains(&SessionEffect::Notify(Notice::PeerLearned { peer: udp_peer })));
        assert_eq!(
            sends(&transition.effects),
            vec![(b"X".to_vec(), SendOrigin::Injected)]
        );

        let transition = session.handle(SessionEvent::SendComplete).unwrap();
        assert_eq!(
            sends(&transition.effects),
            vec![(b"A".to_vec(), SendOrigin::Feed { index: 0 })]
        );
    }

    #[test]
    fn test_exhaustion_without_close_keeps_relaying() {
        let flags = SessionFlags {
            go_first: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[b"A"], flags);
        established(&mut session);

        let transition = session.handle(SessionEvent::SendComplete).unwrap();
        assert_eq!(transition.to, "Exhausted");
        assert!(transition
            .effects
            .contains(&SessionEffect::Notify(Notice::FeedExhausted { sent: 1 })));
        assert_eq!(session.active_mode(), None);

        let transition = session
            .handle(SessionEvent::Received {
                from: peer(),
                payload: vec![0],
            })
            .unwrap();
        assert!(transition.effects.is_empty());

        let transition = session
            .handle(SessionEvent::Injected {
                message: Message::new(*b"late"),
            })
            .unwrap();
        assert_eq!(sends(&transition.effects).len(), 1);
        assert_eq!(session.phase(), SessionPhase::Exhausted);
    }

    #[test]
    fn test_squelch_suppresses_only_exhaustion_notice() {
        let flags = SessionFlags {
            go_first: true,
            close_at_end: true,
            squelch_exhausted: true,
            ..SessionFlags::default()
        };
        let mut session = session(&[], flags);

        let transition = established(&mut session);
        let notices: Vec<&Notice> = transition
            .effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::Notify(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(
            notices,
            vec![
                &Notice::Established { peer: Some(peer()) },
                &Notice::Closed {
                    cause: CloseCause::FeedExhausted
                },
            ]
        );
        assert_eq!(session.close_cause(), Some(&CloseCause::FeedExhausted));
    }

    #[test]
    fn test_peer_close_discards_pending_injections() {
        let mut session = session(&[b"A"], SessionFlags::default());
        session
            .handle(SessionEvent::Established { peer: None })
            .unwrap();
        session
            .handle(SessionEvent::Injected {
                message: Message::new(*b"X"),
            })
            .unwrap();

        let transition = session.handle(SessionEvent::PeerClosed).unwrap();
        assert_eq!(transition.to, "Closed");
        assert_eq!(session.pending_injections(), 0);
        assert_eq!(session.stats().injections_dropped, 1);
        assert!(matches!(
            transition.effects.last(),
            Some(SessionEffect::Close {
                cause: CloseCause::PeerDisconnected
            })
        ));
    }

    #[test]
    fn test_connect_failure_closes_from_connecting() {
        let mut session = session(&[b"A"], SessionFlags::default());
        let transition = session
            .handle(SessionEvent::TransportFailed {
                reason: "connection refused".to_string(),
            })
            .unwrap();
        assert_eq!(transition.from, "Connecting");
        assert_eq!(transition.to, "Closed");
        assert!(session.close_cause().is_some_and(CloseCause::is_failure));
    }

    #[test]
    fn test_events_after_close_are_rejected() {
        let mut session = session(&[b"A"], SessionFlags::default());
        session.handle(SessionEvent::Interrupted).unwrap();

        let result = session.handle(SessionEvent::Received {
            from: peer(),
            payload: vec![],
        });
        assert_eq!(
            result,
            Err(SessionError::InvalidTransition {
                from_state: "Closed",
                event: "Received"
            })
        );
    }

    #[test]
    fn test_unsolicited_send_complete_is_invalid() {
        let mut session = session(&[b"A"], SessionFlags::default());
        established(&mut session);
        assert!(session.handle(SessionEvent::SendComplete).is_err());
        assert!(session
            .handle(SessionEvent::Established { peer: None })
            .is_err());
    }
}
