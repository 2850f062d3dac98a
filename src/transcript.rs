//! Transcript view contract and an in-memory chat log.
//!
//! The controller renders through `TranscriptView`; the embedding UI decides
//! what "render" means. `ChatLog` is the reference adapter: it backs tests
//! and headless hosts, and a DOM-backed adapter mirrors the same calls.

use serde::{Deserialize, Serialize};

/// Who a transcript message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    System,
}

/// Identifier of an appended message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId(pub u64);

/// Identifier of a transient "typing" placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderId(pub u64);

/// Rendering surface for the conversation.
pub trait TranscriptView {
    /// Append a finished message.
    fn append_message(&mut self, text: &str, role: Role) -> MessageId;

    /// Append a transient "typing" placeholder shown while a reply is pending.
    fn append_placeholder(&mut self) -> PlaceholderId;

    /// Remove a placeholder. Removing one that is already gone is a no-op.
    fn remove_placeholder(&mut self, id: PlaceholderId);

    /// Update the live draft shown while the user is still speaking.
    fn set_draft(&mut self, _text: &str) {}
}

#[derive(Debug, Clone)]
enum Entry {
    Message { id: u64, role: Role, text: String },
    Typing { id: u64 },
}

/// In-memory transcript. Entries keep insertion order; placeholders are
/// removed in place.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<Entry>,
    draft: String,
    next_id: u64,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished messages in insertion order, placeholders excluded.
    pub fn messages(&self) -> impl Iterator<Item = (Role, &str)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Message { role, text, .. } => Some((*role, text.as_str())),
            Entry::Typing { .. } => None,
        })
    }

    /// Number of placeholders currently visible.
    pub fn placeholder_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Typing { .. }))
            .count()
    }

    /// The in-progress draft text (interim transcript preview).
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl TranscriptView for ChatLog {
    fn append_message(&mut self, text: &str, role: Role) -> MessageId {
        let id = self.next_id();
        self.entries.push(Entry::Message {
            id,
            role,
            text: text.to_string(),
        });
        MessageId(id)
    }

    fn append_placeholder(&mut self) -> PlaceholderId {
        let id = self.next_id();
        self.entries.push(Entry::Typing { id });
        PlaceholderId(id)
    }

    fn remove_placeholder(&mut self, target: PlaceholderId) {
        self.entries
            .retain(|e| !matches!(e, Entry::Typing { id } if *id == target.0));
    }

    fn set_draft(&mut self, text: &str) {
        self.draft.clear();
        self.draft.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_insertion_order() {
        let mut log = ChatLog::new();
        log.append_message("hello", Role::User);
        log.append_message("hi there", Role::System);

        let msgs: Vec<_> = log.messages().collect();
        assert_eq!(msgs, vec![(Role::User, "hello"), (Role::System, "hi there")]);
    }

    #[test]
    fn placeholder_lifecycle() {
        let mut log = ChatLog::new();
        log.append_message("question", Role::User);
        let p = log.append_placeholder();
        assert_eq!(log.placeholder_count(), 1);

        log.remove_placeholder(p);
        assert_eq!(log.placeholder_count(), 0);

        // Removing again is a no-op
        log.remove_placeholder(p);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn draft_is_replaced_not_appended() {
        let mut log = ChatLog::new();
        log.set_draft("hel");
        log.set_draft("hello");
        assert_eq!(log.draft(), "hello");
        log.set_draft("");
        assert!(log.draft().is_empty());
    }
}
