//! Ordered, deduplicated log for the active conversation
//!
//! The log is a reducer over [`LogEvent`]s and performs no I/O:
//!
//! - `history` messages are appended unconditionally, in arrival order
//! - `chat` and `bot` messages are appended only if no entry already carries their id
//! - `Clear` empties the log; it is applied once per conversation switch
//!
//! No timestamp sorting happens here. The relay is the ordering authority.

use std::collections::HashSet;

use crate::frame::{FrameKind, Message};

/// Input to [`MessageLog::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Received(Message),
    Clear,
}

/// What [`MessageLog::apply`] did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    Duplicate,
    Cleared,
}

#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
    seen: HashSet<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event in place
    pub fn apply(&mut self, event: LogEvent) -> Applied {
        match event {
            LogEvent::Clear => {
                self.entries.clear();
                self.seen.clear();
                Applied::Cleared
            }
            LogEvent::Received(message) => match message.kind {
                FrameKind::History => {
                    self.seen.insert(message.id.clone());
                    self.entries.push(message);
                    Applied::Appended
                }
                FrameKind::Chat | FrameKind::Bot => {
                    if self.seen.insert(message.id.clone()) {
                        self.entries.push(message);
                        Applied::Appended
                    } else {
                        Applied::Duplicate
                    }
                }
            },
        }
    }

    /// Functional form of [`apply`](Self::apply)
    pub fn reduce(mut self, event: LogEvent) -> Self {
        self.apply(event);
        self
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.seen.contains(id)
    }
}

impl FromIterator<LogEvent> for MessageLog {
    fn from_iter<I: IntoIterator<Item = LogEvent>>(iter: I) -> Self {
        iter.into_iter().fold(MessageLog::new(), MessageLog::reduce)
    }
}
