//! Operator notices and payload presentation
//!
//! Everything the operator sees about a session goes through `NoticeEmitter`,
//! which maps notices to log levels and renders payload dumps according to an
//! explicit `PresentationConfig`.

use std::fmt::Write as _;
use std::str::FromStr;

use blitfeed_core::{ErrorClass, Message, Notice, Peer, SendOrigin};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Bytes per line in `hexdump` rendering
const HEXDUMP_WIDTH: usize = 16;

/// How payload bytes are shown in traffic logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpStyle {
    /// Sizes only
    None,
    /// One contiguous hex string
    Hex,
    /// Offset, hex and ASCII columns
    #[default]
    Hexdump,
}

impl FromStr for DumpStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(DumpStyle::None),
            "hex" => Ok(DumpStyle::Hex),
            "hexdump" => Ok(DumpStyle::Hexdump),
            other => Err(format!(
                "unknown dump style '{}' (expected none, hex or hexdump)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub dump: DumpStyle,
    /// Longest prefix of a payload that is dumped; the rest is elided
    pub max_dump_len: usize,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            dump: DumpStyle::Hexdump,
            max_dump_len: 256,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoticeEmitter {
    config: PresentationConfig,
}

impl NoticeEmitter {
    pub fn new(config: PresentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PresentationConfig {
        &self.config
    }

    /// Log a session notice at the level its class calls for
    pub fn emit(&self, cycle: u64, notice: &Notice) {
        match notice.class() {
            None => info!(cycle, "{}", notice),
            Some(ErrorClass::Exhaustion) | Some(ErrorClass::Interrupt) => {
                info!(cycle, "{}", notice)
            }
            Some(ErrorClass::Injection) => warn!(cycle, "{}", notice),
            Some(ErrorClass::Transport) => match notice {
                Notice::Closed { cause } if cause.is_failure() => error!(cycle, "{}", notice),
                _ => warn!(cycle, "{}", notice),
            },
            Some(ErrorClass::Configuration) => error!(cycle, "{}", notice),
        }
    }

    pub fn sent(&self, origin: SendOrigin, peer: &Peer, message: &Message) {
        info!("--> {} to {}: {} {}", origin, peer, message, message.preview());
        self.dump(message.payload());
    }

    pub fn received(&self, from: &Peer, payload: &[u8]) {
        info!("<-- {} bytes from {}", payload.len(), from);
        self.dump(payload);
    }

    pub fn step_prompt(&self, index: usize, message: &Message) {
        info!(
            "step: feed #{} staged ({}), press Enter to send",
            index, message
        );
        self.dump(message.payload());
    }

    fn dump(&self, payload: &[u8]) {
        if let Some(rendered) = self.render(payload) {
            debug!("\n{}", rendered);
        }
    }

    /// Render a payload per the configured style; `None` when dumps are off
    pub fn render(&self, payload: &[u8]) -> Option<String> {
        let shown = &payload[..payload.len().min(self.config.max_dump_len)];
        let mut out = match self.config.dump {
            DumpStyle::None => return None,
            DumpStyle::Hex => hex::encode(shown),
            DumpStyle::Hexdump => hexdump(shown),
        };
        if shown.len() < payload.len() {
            let _ = write!(out, "\n... {} more bytes", payload.len() - shown.len());
        }
        Some(out)
    }
}

fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(HEXDUMP_WIDTH).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let hex_column = chunk
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect();
        let _ = write!(
            out,
            "{:08x}  {:<width$}  |{}|",
            line * HEXDUMP_WIDTH,
            hex_column,
            ascii,
            width = HEXDUMP_WIDTH * 3 - 1
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter(dump: DumpStyle, max_dump_len: usize) -> NoticeEmitter {
        NoticeEmitter::new(PresentationConfig { dump, max_dump_len })
    }

    #[test]
    fn test_dump_style_parsing() {
        assert_eq!("hex".parse::<DumpStyle>(), Ok(DumpStyle::Hex));
        assert_eq!("HEXDUMP".parse::<DumpStyle>(), Ok(DumpStyle::Hexdump));
        assert_eq!("none".parse::<DumpStyle>(), Ok(DumpStyle::None));
        assert!("octal".parse::<DumpStyle>().is_err());
    }

    #[test]
    fn test_render_hex() {
        let rendered = emitter(DumpStyle::Hex, 64).render(b"\x00\xffAB");
        assert_eq!(rendered.as_deref(), Some("00ff4142"));
        assert_eq!(emitter(DumpStyle::None, 64).render(b"AB"), None);
    }

    #[test]
    fn test_render_hexdump_columns() {
        let rendered = emitter(DumpStyle::Hexdump, 64)
            .render(b"GET / HTTP/1.1\r\nHost")
            .unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000  47 45 54 20"));
        assert!(lines[0].ends_with("|GET / HTTP/1.1..|"));
        assert!(lines[1].starts_with("00000010  48 6f 73 74"));
        assert!(lines[1].ends_with("|Host|"));
    }

    #[test]
    fn test_render_truncates_long_payloads() {
        let rendered = emitter(DumpStyle::Hex, 2).render(b"abcdef").unwrap();
        assert_eq!(rendered, "6162\n... 4 more bytes");
    }
}
