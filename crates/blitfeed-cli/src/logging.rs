//! Logging setup

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;

use crate::error::{CliError, Result};

/// Log level for the given `-v` count and `--quiet`
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::WARN;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber, writing to `output` when given, else stderr
pub fn setup_logging(level: Level, output: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match output {
        Some(path) => {
            let file = File::create(path).map_err(|source| CliError::Io {
                path: path.display().to_string(),
                source,
            })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}
