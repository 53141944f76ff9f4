//! Append-only conversation thread

use crate::state::{Message, MessageId, Sender};
use chrono::Utc;
use tokio::sync::watch;

/// Ordered list of messages. Insertion order is display order.
///
/// Nothing is ever removed or edited. Observers subscribe to a revision
/// counter that bumps once per append.
#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    last_id: Option<MessageId>,
    revision: watch::Sender<u64>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            last_id: None,
            revision,
        }
    }

    /// Issue the next message id: current Unix millis, bumped past the
    /// previous id if the clock hasn't moved.
    pub fn next_id(&mut self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        let millis = match self.last_id {
            Some(prev) if prev.as_millis() >= now => prev.as_millis() + 1,
            _ => now,
        };
        let id = MessageId::from_millis(millis);
        self.last_id = Some(id);
        id
    }

    /// Create a message with a fresh id and push it to the tail.
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> MessageId {
        let id = self.next_id();
        self.append(Message::new(id, sender, text));
        id
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Receiver that changes every time a message is appended
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
