//! blitfeed CLI Configuration
//!
//! Configuration is layered with increasing priority:
//! defaults < TOML file (`--config`) < command-line flags.
//!
//! The file carries the replay options at the top level and payload
//! presentation in a `[presentation]` table:
//!
//! ```toml
//! role = "server"
//! transport = "udp"
//! listen = "0.0.0.0:5353"
//! go_first = true
//!
//! [presentation]
//! dump = "hex"
//! max_dump_len = 64
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use blitfeed_core::ReplayConfig;
use blitfeed_runtime::PresentationConfig;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Everything a configuration file can set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub replay: ReplayConfig,
    pub presentation: PresentationConfig,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the final configuration from file and flags, then validate it
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => Self::default(),
        };
        config.replay = cli.apply_to(config.replay);
        if let Some(dump) = cli.dump {
            config.presentation.dump = dump;
        }
        config.replay.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blitfeed_core::{ConfigError, ReplayError, Role, TransportKind};
    use blitfeed_runtime::DumpStyle;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_file_with_presentation_table() {
        let config = AppConfig::from_toml(
            r#"
            role = "server"
            transport = "udp"
            listen = "0.0.0.0:5353"
            squelch_exhausted = true

            [presentation]
            dump = "hex"
            max_dump_len = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.replay.role, Role::Server);
        assert_eq!(config.replay.transport, TransportKind::Udp);
        assert!(config.replay.flags.squelch_exhausted);
        assert_eq!(config.presentation.dump, DumpStyle::Hex);
        assert_eq!(config.presentation.max_dump_len, 64);
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target = \"10.0.0.1:80\"\ngo_first = true").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::parse_from([
            "blitfeed",
            "--config",
            path.as_str(),
            "--dump",
            "none",
            "127.0.0.1:8080",
        ]);
        let config = AppConfig::resolve(&cli).unwrap();

        assert_eq!(config.replay.target, Some("127.0.0.1:8080".parse().unwrap()));
        assert!(config.replay.flags.go_first);
        assert_eq!(config.presentation.dump, DumpStyle::None);
    }

    #[test]
    fn test_resolve_validates() {
        let cli = Cli::parse_from(["blitfeed", "--server"]);
        let err = AppConfig::resolve(&cli).unwrap_err();
        assert!(matches!(
            err,
            CliError::Replay(ReplayError::Config(ConfigError::MissingListen))
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let cli = Cli::parse_from(["blitfeed", "--config", "/nonexistent/blitfeed.toml", "h:1"]);
        assert!(matches!(AppConfig::resolve(&cli), Err(CliError::Io { .. })));
    }
}
