//! Session Supervisor
//!
//! Runs session cycles one after another. Without `persist` the first cycle's
//! report is the result; with it, every closed session is followed by a fresh
//! connection attempt and a fresh cursor until the operator interrupts.

use std::future::Future;
use std::sync::Arc;

use blitfeed_core::{CloseCause, FeedCursor, MessageFeed, Notice, ReplayConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::adapter::ConnectionAdapter;
use crate::notice::NoticeEmitter;
use crate::session_task::{SessionReport, SessionTask};

/// How a supervisor run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// A non-persistent run's single session closed
    Finished(SessionReport),
    /// The operator interrupted the run
    Interrupted {
        completed_cycles: u64,
        last: Option<SessionReport>,
    },
}

impl SupervisorOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::Finished(report) if report.cause.is_failure() => 1,
            SupervisorOutcome::Finished(_) | SupervisorOutcome::Interrupted { .. } => 0,
        }
    }
}

pub struct Supervisor {
    config: ReplayConfig,
    feed: Arc<MessageFeed>,
    emitter: NoticeEmitter,
    step_signals: Option<mpsc::Receiver<()>>,
}

impl Supervisor {
    pub fn new(config: ReplayConfig, feed: Arc<MessageFeed>, emitter: NoticeEmitter) -> Self {
        Self {
            config,
            feed,
            emitter,
            step_signals: None,
        }
    }

    /// Operator confirmations for `step` mode, one `()` per scripted send
    pub fn with_step_signals(mut self, signals: mpsc::Receiver<()>) -> Self {
        self.step_signals = Some(signals);
        self
    }

    /// Run until completion or Ctrl-C
    pub async fn run(self) -> SupervisorOutcome {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                debug!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until completion or until `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F) -> SupervisorOutcome
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Replaying {} messages ({} sendable) as {}",
            self.feed.len(),
            self.feed.sendable_len(),
            self.config.summary()
        );

        let mut cycle: u64 = 0;
        let mut last = None;
        loop {
            cycle += 1;
            // Fresh adapter and cursor per cycle; the feed itself is shared
            let adapter = ConnectionAdapter::new(&self.config);
            let report = SessionTask::new(
                cycle,
                self.config.flags,
                FeedCursor::new(self.feed.clone()),
                &self.emitter,
            )
            .with_blit(self.config.blit.clone())
            .with_step_signals(self.step_signals.as_mut())
            .run(&adapter, shutdown.as_mut())
            .await;

            debug!(
                "Cycle {} ended ({}): {} scripted, {} injected, {} received",
                report.cycle,
                report.cause,
                report.stats.feed_sent,
                report.stats.injected_sent,
                report.stats.received
            );

            if report.cause == CloseCause::Interrupted {
                return SupervisorOutcome::Interrupted {
                    completed_cycles: cycle - 1,
                    last,
                };
            }
            if !self.config.persist {
                return SupervisorOutcome::Finished(report);
            }

            last = Some(report);
            self.emitter.emit(cycle, &Notice::Reconnecting { next_cycle: cycle + 1 });
            // Persist retries immediately; let other tasks run between cycles
            tokio::task::yield_now().await;
        }
    }
}
