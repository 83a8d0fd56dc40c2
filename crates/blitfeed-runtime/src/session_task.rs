//! Session Task
//!
//! Drives one `FeedSession` over one established connection: translates link
//! traffic, blit injections, step signals and shutdown into `SessionEvent`s and
//! executes the returned `SessionEffect`s until the session closes.
//!
//! A send in progress is one more branch of the event loop. It owns the link
//! until it finishes, so inbound traffic and shutdown are still observed while
//! a write is stalled on a peer that stopped reading.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use blitfeed_core::{
    CloseCause, Endpoint, FeedCursor, FeedSession, Message, Peer, SendOrigin, SessionEffect,
    SessionEvent, SessionFlags, SessionStats, TransportError,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::adapter::{ConnectionAdapter, Established};
use crate::blit::BlitChannel;
use crate::link::{Link, LinkEvent};
use crate::notice::NoticeEmitter;

/// A send that has been handed to the link and not yet finished
type SendFuture = Pin<Box<dyn Future<Output = SendOutcome> + Send>>;

struct SendOutcome {
    link: Box<dyn Link>,
    peer: Peer,
    message: Message,
    origin: SendOrigin,
    result: Result<(), TransportError>,
}

/// Outcome of one session cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub cause: CloseCause,
    pub stats: SessionStats,
}

pub struct SessionTask<'a> {
    cycle: u64,
    session: FeedSession,
    emitter: &'a NoticeEmitter,
    blit: Option<Endpoint>,
    step_signals: Option<&'a mut mpsc::Receiver<()>>,
}

impl<'a> SessionTask<'a> {
    pub fn new(
        cycle: u64,
        flags: SessionFlags,
        cursor: FeedCursor,
        emitter: &'a NoticeEmitter,
    ) -> Self {
        Self {
            cycle,
            session: FeedSession::new(flags, cursor),
            emitter,
            blit: None,
            step_signals: None,
        }
    }

    pub fn with_blit(mut self, endpoint: Option<Endpoint>) -> Self {
        self.blit = endpoint;
        self
    }

    pub fn with_step_signals(mut self, signals: Option<&'a mut mpsc::Receiver<()>>) -> Self {
        self.step_signals = signals;
        self
    }

    /// Establish a connection and run the session until it closes
    pub async fn run<F>(
        self,
        adapter: &ConnectionAdapter,
        mut shutdown: Pin<&mut F>,
    ) -> SessionReport
    where
        F: Future<Output = ()>,
    {
        let SessionTask {
            cycle,
            mut session,
            emitter,
            blit,
            mut step_signals,
        } = self;
        let mut pending = VecDeque::new();

        let established = tokio::select! {
            result = adapter.establish() => result,
            _ = shutdown.as_mut() => {
                dispatch(&mut session, SessionEvent::Interrupted, &mut pending);
                drain_notices(cycle, emitter, &mut pending);
                return report(cycle, &session);
            }
        };
        let established = match established {
            Ok(established) => established,
            Err(e) => {
                dispatch(
                    &mut session,
                    SessionEvent::TransportFailed {
                        reason: e.to_string(),
                    },
                    &mut pending,
                );
                drain_notices(cycle, emitter, &mut pending);
                return report(cycle, &session);
            }
        };

        // Blit lives exactly as long as this connection
        let (injector, mut injections) = mpsc::unbounded_channel();
        let (_blit, first_event) = match &blit {
            Some(endpoint) => match BlitChannel::bind(endpoint, injector).await {
                Ok(channel) => (
                    Some(channel),
                    SessionEvent::Established {
                        peer: established.peer,
                    },
                ),
                Err(e) => (
                    None,
                    SessionEvent::TransportFailed {
                        reason: format!("blit channel: {}", e),
                    },
                ),
            },
            None => {
                drop(injector);
                (
                    None,
                    SessionEvent::Established {
                        peer: established.peer,
                    },
                )
            }
        };
        let mut injections_open = blit.is_some();
        let mut steps_open = step_signals.is_some();

        let Established {
            link,
            mut events,
            peer: _,
        } = established;
        // `None` while a send owns the link
        let mut link = Some(link);
        let mut in_flight: Option<SendFuture> = None;

        dispatch(&mut session, first_event, &mut pending);

        loop {
            while let Some(effect) = pending.pop_front() {
                match effect {
                    SessionEffect::Send {
                        peer,
                        message,
                        origin,
                    } => match link.take() {
                        Some(owned) => in_flight = Some(start_send(owned, peer, message, origin)),
                        None => debug!("Link busy or gone, dropping {} send to {}", origin, peer),
                    },
                    SessionEffect::AwaitStep { index, message } => {
                        emitter.step_prompt(index, &message);
                    }
                    SessionEffect::Notify(notice) => emitter.emit(cycle, &notice),
                    SessionEffect::Close { cause } => {
                        trace!("Closing link: {}", cause);
                        if in_flight.take().is_some() {
                            debug!("Abandoning unfinished send");
                        }
                        if let Some(link) = link.as_mut() {
                            if let Err(e) = link.close().await {
                                debug!("Error while closing link: {}", e);
                            }
                        }
                    }
                }
            }

            if session.is_closed() {
                return report(cycle, &session);
            }

            let event = tokio::select! {
                outcome = finish_send(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    link = Some(outcome.link);
                    match outcome.result {
                        Ok(()) => {
                            emitter.sent(outcome.origin, &outcome.peer, &outcome.message);
                            SessionEvent::SendComplete
                        }
                        Err(e) => SessionEvent::SendFailed {
                            reason: e.to_string(),
                        },
                    }
                },
                link_event = events.recv() => match link_event {
                    Some(LinkEvent::Received { from, payload }) => {
                        emitter.received(&from, &payload);
                        SessionEvent::Received { from, payload }
                    }
                    Some(LinkEvent::Closed) => SessionEvent::PeerClosed,
                    Some(LinkEvent::Failed { reason }) => SessionEvent::TransportFailed { reason },
                    None => SessionEvent::TransportFailed {
                        reason: "link reader stopped".to_string(),
                    },
                },
                injected = injections.recv(), if injections_open => match injected {
                    Some(message) => SessionEvent::Injected { message },
                    None => {
                        injections_open = false;
                        continue;
                    }
                },
                signal = next_step(&mut step_signals), if steps_open => match signal {
                    Some(()) => SessionEvent::StepContinue,
                    None => {
                        warn!("Step input closed; staged messages will not be released");
                        steps_open = false;
                        continue;
                    }
                },
                _ = shutdown.as_mut() => SessionEvent::Interrupted,
            };
            dispatch(&mut session, event, &mut pending);
        }
    }
}

fn dispatch(session: &mut FeedSession, event: SessionEvent, pending: &mut VecDeque<SessionEffect>) {
    match session.handle(event) {
        Ok(transition) => {
            if transition.from != transition.to {
                debug!("Session {} -> {}", transition.from, transition.to);
            }
            pending.extend(transition.effects);
        }
        Err(e) => debug!("Event ignored: {}", e),
    }
}

/// Emit notices from a session that closed before it had a link
fn drain_notices(cycle: u64, emitter: &NoticeEmitter, pending: &mut VecDeque<SessionEffect>) {
    for effect in pending.drain(..) {
        if let SessionEffect::Notify(notice) = effect {
            emitter.emit(cycle, &notice);
        }
    }
}

fn start_send(
    mut link: Box<dyn Link>,
    peer: Peer,
    message: Message,
    origin: SendOrigin,
) -> SendFuture {
    Box::pin(async move {
        let result = link.send(&peer, message.payload()).await;
        SendOutcome {
            link,
            peer,
            message,
            origin,
            result,
        }
    })
}

async fn finish_send(in_flight: &mut Option<SendFuture>) -> SendOutcome {
    match in_flight {
        Some(send) => send.await,
        None => std::future::pending().await,
    }
}

async fn next_step(signals: &mut Option<&mut mpsc::Receiver<()>>) -> Option<()> {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}

fn report(cycle: u64, session: &FeedSession) -> SessionReport {
    let cause = session
        .close_cause()
        .cloned()
        .unwrap_or(CloseCause::TransportFailure {
            reason: "session ended without closing".to_string(),
        });
    SessionReport {
        cycle,
        cause,
        stats: session.stats(),
    }
}
