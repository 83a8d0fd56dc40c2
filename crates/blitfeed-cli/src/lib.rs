//! blitfeed CLI library
//!
//! Argument parsing, configuration layering, message import and logging for
//! the `blitfeed` binary.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod step;

pub use app::ReplayApp;
pub use cli::{import_sources, Cli};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use import::ImportSource;
