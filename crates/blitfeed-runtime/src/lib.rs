//! blitfeed Runtime
//!
//! This crate runs the `blitfeed-core` feed session on tokio, including:
//! - `Link`: TCP and UDP links with their reader tasks
//! - `ConnectionAdapter`: connect, listen or bind per the configured role
//! - `BlitChannel`: local listener for live message injection
//! - `SessionTask`: executes one session's effects over one connection
//! - `Supervisor`: runs session cycles, restarting them in persist mode
//!
//! `blitfeed-core` decides what to do; this crate does it.

pub mod adapter;
pub mod blit;
pub mod link;
pub mod notice;
pub mod session_task;
pub mod supervisor;

pub use adapter::{ConnectionAdapter, Established};
pub use blit::{BlitChannel, InjectionReceiver, InjectionSender};
pub use link::{Link, LinkEvent, TcpLink, UdpLink};
pub use notice::{DumpStyle, NoticeEmitter, PresentationConfig};
pub use session_task::{SessionReport, SessionTask};
pub use supervisor::{Supervisor, SupervisorOutcome};

// Re-export core types for convenience
pub use blitfeed_core::{
    CloseCause, Endpoint, FeedCursor, Message, MessageFeed, Notice, ReplayConfig, ReplayError,
    Role, SessionFlags, SessionStats, TransportKind,
};
