//! Message import
//!
//! Builds the message feed from the sources named on the command line, in the
//! order they were given. Line-oriented formats (`hex`, `b64`) share these
//! rules: blank lines and lines starting with `#` are ignored, and a leading
//! `!` keeps the message in the feed but marks it skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use base64::Engine as _;
use tracing::debug;

use blitfeed_core::{Message, MessageFeed};

use crate::error::{CliError, Result};

/// One `--raw`, `--hex`, `--b64` or `--msg` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// Whole file is one message
    Raw(PathBuf),
    /// One hex-encoded message per line
    Hex(PathBuf),
    /// One base64 message per line
    Base64(PathBuf),
    /// Literal text with backslash escapes
    Literal(String),
}

/// Concatenate every source, in order, into one shared feed
pub fn build_feed(sources: &[ImportSource]) -> Result<Arc<MessageFeed>> {
    let mut builder = MessageFeed::builder();
    let mut literals = 0;
    for source in sources {
        let messages = match source {
            ImportSource::Raw(path) => load_raw(path),
            ImportSource::Hex(path) => load_lines(path, "hex", decode_hex),
            ImportSource::Base64(path) => load_lines(path, "b64", decode_base64),
            ImportSource::Literal(text) => {
                literals += 1;
                load_literal(text, literals).map(|m| vec![m])
            }
        }
        .map_err(CliError::Import)?;
        debug!("Imported {} messages from {:?}", messages.len(), source);
        builder.append(messages);
    }
    Ok(builder.build())
}

pub fn load_raw(path: &Path) -> anyhow::Result<Vec<Message>> {
    let payload = std::fs::read(path).with_context(|| format!("raw:{}", path.display()))?;
    Ok(vec![
        Message::new(payload).with_annotation(format!("raw:{}", path.display()))
    ])
}

fn load_lines(
    path: &Path,
    kind: &str,
    decode: fn(&str) -> anyhow::Result<Vec<u8>>,
) -> anyhow::Result<Vec<Message>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("{}:{}", kind, path.display()))?;
    parse_lines(&text, &format!("{}:{}", kind, path.display()), decode)
}

/// Parse line-oriented text; `origin` prefixes each message's annotation
pub fn parse_lines(
    text: &str,
    origin: &str,
    decode: fn(&str) -> anyhow::Result<Vec<u8>>,
) -> anyhow::Result<Vec<Message>> {
    let mut messages = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let number = number + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (skip, encoded) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, line),
        };

        let payload = decode(encoded).with_context(|| format!("{}:{}", origin, number))?;
        let message = Message::new(payload).with_annotation(format!("{}:{}", origin, number));
        messages.push(if skip { message.skipped() } else { message });
    }
    Ok(messages)
}

/// Hex digits; whitespace and `:` separators are ignored
pub fn decode_hex(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = encoded
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    Ok(hex::decode(digits)?)
}

pub fn decode_base64(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

pub fn load_literal(text: &str, number: usize) -> anyhow::Result<Message> {
    let payload = unescape(text).with_context(|| format!("msg:#{}", number))?;
    Ok(Message::new(payload).with_annotation(format!("msg:#{}", number)))
}

/// Expand `\n`, `\r`, `\t`, `\0`, `\\` and `\xHH`
pub fn unescape(text: &str) -> anyhow::Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = *bytes
            .get(i + 1)
            .ok_or_else(|| anyhow!("trailing backslash"))?;
        match escape {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'\\' => out.push(b'\\'),
            b'x' => {
                let digits = bytes
                    .get(i + 2..i + 4)
                    .ok_or_else(|| anyhow!("\\x needs two hex digits"))?;
                let byte = hex::decode(digits).context("\\x needs two hex digits")?;
                out.extend_from_slice(&byte);
                i += 2;
            }
            other => bail!("unknown escape \\{}", other as char),
        }
        i += 2;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("GET /\\r\\n").unwrap(), b"GET /\r\n");
        assert_eq!(unescape("\\x00\\xFFz").unwrap(), vec![0x00, 0xff, b'z']);
        assert_eq!(unescape("a\\\\b\\t").unwrap(), b"a\\b\t");
        assert_eq!(unescape("caf\u{e9}").unwrap(), "caf\u{e9}".as_bytes());
        assert!(unescape("oops\\").is_err());
        assert!(unescape("\\q").is_err());
        assert!(unescape("\\x4").is_err());
        assert!(unescape("\\xzz").is_err());
    }

    #[test]
    fn test_hex_lines() {
        let messages = parse_lines(
            "# greeting\n48 65 6c 6c 6f\n\n!de:ad:be:ef\n  0a0b  \n",
            "hex:feed.txt",
            decode_hex,
        )
        .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].payload(), b"Hello");
        assert_eq!(messages[0].annotation(), Some("hex:feed.txt:2"));
        assert!(messages[1].is_skipped());
        assert_eq!(messages[1].payload(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(messages[2].payload(), &[0x0a, 0x0b]);
        assert_eq!(messages[2].annotation(), Some("hex:feed.txt:5"));
    }

    #[test]
    fn test_bad_hex_reports_line() {
        let err = parse_lines("00\nxyz\n", "hex:feed.txt", decode_hex).unwrap_err();
        assert!(format!("{:#}", err).starts_with("hex:feed.txt:2"));
    }

    #[test]
    fn test_base64_lines() {
        let messages = parse_lines("SGVsbG8=\n! AAE=\n", "b64:x", decode_base64).unwrap();
        assert_eq!(messages[0].payload(), b"Hello");
        assert!(messages[1].is_skipped());
        assert_eq!(messages[1].payload(), &[0x00, 0x01]);
        assert!(parse_lines("not base64!\n", "b64:x", decode_base64).is_err());
    }

    #[test]
    fn test_build_feed_keeps_source_order() {
        let raw = temp_file(b"\x01\x02raw");
        let hex = temp_file(b"aa\n!bb\n");
        let b64 = temp_file(b"Yg==\n");

        let feed = build_feed(&[
            ImportSource::Literal("first".to_string()),
            ImportSource::Hex(hex.path().to_path_buf()),
            ImportSource::Raw(raw.path().to_path_buf()),
            ImportSource::Literal("last\\n".to_string()),
            ImportSource::Base64(b64.path().to_path_buf()),
        ])
        .unwrap();

        let payloads: Vec<&[u8]> = feed.iter().map(|m| m.payload()).collect();
        assert_eq!(
            payloads,
            vec![
                &b"first"[..],
                &[0xaa][..],
                &[0xbb][..],
                &b"\x01\x02raw"[..],
                &b"last\n"[..],
                &b"b"[..],
            ]
        );
        assert_eq!(feed.len(), 6);
        assert_eq!(feed.sendable_len(), 5);
        assert_eq!(feed.get(0).and_then(|m| m.annotation()), Some("msg:#1"));
        assert_eq!(feed.get(4).and_then(|m| m.annotation()), Some("msg:#2"));
    }

    #[test]
    fn test_missing_file_is_import_error() {
        let result = build_feed(&[ImportSource::Raw(PathBuf::from("/nonexistent/blitfeed"))]);
        assert!(matches!(result, Err(CliError::Import(_))));
    }
}
