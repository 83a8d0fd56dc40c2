//! Messages and the Message Feed
//!
//! A `Message` is an opaque, immutable payload with an optional provenance
//! annotation. The `MessageFeed` is built once at startup with a `FeedBuilder`
//! and then shared read-only; every session cycle walks it with its own
//! `FeedCursor`.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Number of payload bytes shown by `Message::preview`
const PREVIEW_LEN: usize = 16;

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// Opaque payload plus provenance metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Arc<[u8]>,
    annotation: Option<String>,
    skip: bool,
}

impl Message {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Arc::from(payload.into()),
            annotation: None,
            skip: false,
        }
    }

    /// Attach a provenance annotation such as `hex:capture.txt:4`
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    /// Mark the message as skipped: it stays in the feed but is never sent
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Hex of the first few payload bytes, for one-line log output
    pub fn preview(&self) -> String {
        let shown = &self.payload[..self.payload.len().min(PREVIEW_LEN)];
        let mut out = hex::encode(shown);
        if self.payload.len() > PREVIEW_LEN {
            out.push_str("..");
        }
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.len())?;
        if let Some(annotation) = &self.annotation {
            write!(f, " ({})", annotation)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Message Feed
// ----------------------------------------------------------------------------

/// Ordered, read-only sequence of messages to replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFeed {
    messages: Vec<Message>,
}

impl MessageFeed {
    pub fn builder() -> FeedBuilder {
        FeedBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages that will actually be sent
    pub fn sendable_len(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_skipped()).count()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

/// Append-only construction phase of a `MessageFeed`
#[derive(Debug, Default)]
pub struct FeedBuilder {
    messages: Vec<Message>,
}

impl FeedBuilder {
    pub fn push(&mut self, message: Message) -> &mut Self {
        self.messages.push(message);
        self
    }

    /// Concatenate the messages of one import source
    pub fn append(&mut self, messages: impl IntoIterator<Item = Message>) -> &mut Self {
        self.messages.extend(messages);
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Freeze the feed for shared read-only use
    pub fn build(self) -> Arc<MessageFeed> {
        Arc::new(MessageFeed {
            messages: self.messages,
        })
    }
}

// ----------------------------------------------------------------------------
// Feed Cursor
// ----------------------------------------------------------------------------

/// Independent read position over a shared feed
///
/// The position only moves forward until `reset` is called.
#[derive(Debug, Clone)]
pub struct FeedCursor {
    feed: Arc<MessageFeed>,
    position: usize,
}

impl FeedCursor {
    pub fn new(feed: Arc<MessageFeed>) -> Self {
        Self { feed, position: 0 }
    }

    /// Return the next sendable message and its feed index, passing over
    /// skipped entries. `None` means the feed is exhausted.
    pub fn next_indexed(&mut self) -> Option<(usize, Message)> {
        while let Some(message) = self.feed.get(self.position) {
            let index = self.position;
            self.position += 1;
            if message.is_skipped() {
                debug!("Skipping feed message #{}: {}", index, message);
                continue;
            }
            return Some((index, message.clone()));
        }
        None
    }

    /// Sendable messages left ahead of the cursor
    pub fn peek_remaining(&self) -> usize {
        self.feed
            .iter()
            .skip(self.position)
            .filter(|m| !m.is_skipped())
            .count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.peek_remaining() == 0
    }

    /// Raw index of the next entry to examine
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn feed(&self) -> &Arc<MessageFeed> {
        &self.feed
    }
}

impl Iterator for FeedCursor {
    type Item = Message;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_indexed().map(|(_, message)| message)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
