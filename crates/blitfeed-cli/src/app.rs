//! blitfeed application wiring
//!
//! Turns parsed arguments into a resolved configuration and a message feed,
//! then hands both to the runtime supervisor.

use std::sync::Arc;

use clap::ArgMatches;
use tracing::{info, warn};

use blitfeed_core::MessageFeed;
use blitfeed_runtime::{NoticeEmitter, Supervisor, SupervisorOutcome};

use crate::cli::{import_sources, Cli};
use crate::config::AppConfig;
use crate::error::Result;
use crate::import::build_feed;
use crate::step::spawn_step_reader;

pub struct ReplayApp {
    config: AppConfig,
    feed: Arc<MessageFeed>,
}

impl ReplayApp {
    /// Resolve configuration and import every message source
    pub fn from_cli(cli: &Cli, matches: &ArgMatches) -> Result<Self> {
        let config = AppConfig::resolve(cli)?;
        let feed = build_feed(&import_sources(matches))?;
        if feed.sendable_len() == 0 {
            warn!("Feed has no sendable messages; only injected messages will be sent");
        }
        Ok(Self { config, feed })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn feed(&self) -> &Arc<MessageFeed> {
        &self.feed
    }

    /// Replay until the session ends (or forever with `persist`)
    pub async fn run(self) -> SupervisorOutcome {
        let step = self.config.replay.flags.step;
        let mut supervisor = Supervisor::new(
            self.config.replay,
            self.feed,
            NoticeEmitter::new(self.config.presentation),
        );
        if step {
            info!("Step mode: press Enter to release each scripted message");
            supervisor = supervisor.with_step_signals(spawn_step_reader(tokio::io::stdin()));
        }

        let outcome = supervisor.run().await;
        match &outcome {
            SupervisorOutcome::Finished(report) => info!(
                "Done after {} scripted and {} injected messages ({})",
                report.stats.feed_sent, report.stats.injected_sent, report.cause
            ),
            SupervisorOutcome::Interrupted {
                completed_cycles, ..
            } => info!("Interrupted after {} completed sessions", completed_cycles),
        }
        outcome
    }
}
