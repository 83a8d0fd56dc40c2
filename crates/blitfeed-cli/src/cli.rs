//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{ArgAction, ArgMatches, Parser};

use blitfeed_core::{Endpoint, ReplayConfig, Role, TransportKind};
use blitfeed_runtime::DumpStyle;

use crate::import::ImportSource;

#[derive(Parser, Debug)]
#[command(
    name = "blitfeed",
    author,
    version,
    about = "Replay a scripted conversation over TCP or UDP, with live injection",
    long_about = None
)]
pub struct Cli {
    /// Remote host:port to connect to (client mode)
    #[arg(value_name = "HOST:PORT")]
    pub target: Option<Endpoint>,

    /// Act as server (default: client)
    #[arg(short, long)]
    pub server: bool,

    /// Use UDP (default: TCP)
    #[arg(short, long)]
    pub udp: bool,

    /// Server: listen address. Client: local bind address
    #[arg(short, long, value_name = "ADDR:PORT")]
    pub listen: Option<Endpoint>,

    /// Open a blit listener for live injection
    #[arg(short, long, value_name = "ADDR:PORT")]
    pub blit: Option<Endpoint>,

    /// Send the first message before the peer speaks
    #[arg(short, long)]
    pub go_first: bool,

    /// Close the connection once the feed is exhausted
    #[arg(short, long)]
    pub close_at_end: bool,

    /// Wait for Enter on stdin before each scripted send
    #[arg(long)]
    pub step: bool,

    /// Restart the session forever after it closes
    #[arg(short, long)]
    pub persist: bool,

    /// Suppress the feed-exhausted notice
    #[arg(short = 'q', long)]
    pub squelch: bool,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Payload presentation: none, hex or hexdump
    #[arg(long, value_name = "STYLE")]
    pub dump: Option<DumpStyle>,

    /// Write log output to FILE instead of stderr
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Import FILE as a single message
    #[arg(long, value_name = "FILE")]
    pub raw: Vec<PathBuf>,

    /// Import one hex-encoded message per line of FILE
    #[arg(long, value_name = "FILE")]
    pub hex: Vec<PathBuf>,

    /// Import one base64 message per line of FILE
    #[arg(long, value_name = "FILE")]
    pub b64: Vec<PathBuf>,

    /// Import a literal message (escapes: \n \r \t \0 \\ \xHH)
    #[arg(short, long, value_name = "TEXT")]
    pub msg: Vec<String>,
}

impl Cli {
    /// Apply command-line settings on top of `base`; flags can only switch
    /// options on
    pub fn apply_to(&self, mut base: ReplayConfig) -> ReplayConfig {
        if self.server {
            base.role = Role::Server;
        }
        if self.udp {
            base.transport = TransportKind::Udp;
        }
        if let Some(target) = &self.target {
            base.target = Some(target.clone());
        }
        if let Some(listen) = &self.listen {
            base.listen = Some(listen.clone());
        }
        if let Some(blit) = &self.blit {
            base.blit = Some(blit.clone());
        }
        base.persist |= self.persist;
        base.flags.go_first |= self.go_first;
        base.flags.close_at_end |= self.close_at_end;
        base.flags.step |= self.step;
        base.flags.squelch_exhausted |= self.squelch;
        base
    }
}

/// Import sources in the order they appeared on the command line
pub fn import_sources(matches: &ArgMatches) -> Vec<ImportSource> {
    let mut ordered: Vec<(usize, ImportSource)> = Vec::new();

    let mut collect_paths = |id: &str, make: fn(PathBuf) -> ImportSource| {
        if let (Some(indices), Some(values)) =
            (matches.indices_of(id), matches.get_many::<PathBuf>(id))
        {
            ordered.extend(indices.zip(values.cloned().map(make)));
        }
    };
    collect_paths("raw", ImportSource::Raw);
    collect_paths("hex", ImportSource::Hex);
    collect_paths("b64", ImportSource::Base64);

    if let (Some(indices), Some(values)) = (
        matches.indices_of("msg"),
        matches.get_many::<String>("msg"),
    ) {
        ordered.extend(indices.zip(values.cloned().map(ImportSource::Literal)));
    }

    ordered.sort_by_key(|(index, _)| *index);
    ordered.into_iter().map(|(_, source)| source).collect()
}
