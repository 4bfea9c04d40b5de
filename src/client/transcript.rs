//! Typed transcript state and the reducer that folds inbound envelopes into
//! it. Pure state: no I/O, no rendering side effects beyond the one-time
//! markdown conversion at seal time.

use tracing::{debug, warn};

use crate::client::render::render_markdown;
use crate::protocol::{ChatMessage, ServerEnvelope, STREAM_DONE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    pub fn from_wire(role: &str) -> Self {
        match role {
            "assistant" => Role::Assistant,
            "error" => Role::Error,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    /// Whether markdown-to-HTML conversion has been applied. An assistant
    /// entry with `rendered == false` is the one entry open for streaming.
    pub rendered: bool,
}

impl TranscriptEntry {
    pub fn is_open(&self) -> bool {
        self.role == Role::Assistant && !self.rendered
    }
}

/// Transcript plus the input affordance it controls.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub entries: Vec<TranscriptEntry>,
    /// Initial placeholder view; dismissed the first time an entry lands.
    pub show_placeholder: bool,
    pub input_enabled: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            show_placeholder: true,
            input_enabled: true,
        }
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one inbound envelope into the transcript.
    pub fn apply(&mut self, envelope: &ServerEnvelope) {
        match envelope {
            ServerEnvelope::Stream {
                content: Some(content),
            } if content == STREAM_DONE => self.seal_open_entry(),
            ServerEnvelope::Stream {
                content: Some(fragment),
            } => self.append_fragment(fragment),
            ServerEnvelope::Stream { content: None } => {}
            ServerEnvelope::FullMessage { role, content } => self.append_full(role, content),
            ServerEnvelope::History { messages } => self.replace_with_history(messages),
            ServerEnvelope::Error { detail } => self.append_server_error(detail.as_deref()),
            ServerEnvelope::Unknown => debug!("Ignoring envelope with unknown tag"),
        }
    }

    /// Append a fragment verbatim to the open assistant entry, creating one
    /// if none is open. Input stays disabled while a stream is in progress.
    fn append_fragment(&mut self, fragment: &str) {
        self.input_enabled = false;
        match self.entries.last_mut() {
            Some(last) if last.is_open() => last.content.push_str(fragment),
            _ => self.push_entry(TranscriptEntry {
                role: Role::Assistant,
                content: fragment.to_string(),
                rendered: false,
            }),
        }
    }

    /// Seal the open assistant entry: convert its accumulated raw text to
    /// rendered markup exactly once, then re-enable input.
    fn seal_open_entry(&mut self) {
        self.input_enabled = true;
        match self.entries.last_mut() {
            Some(last) if last.is_open() => {
                if let Some(html) = render_markdown(&last.content) {
                    last.content = html;
                }
                last.rendered = true;
            }
            Some(_) => warn!("Duplicate terminal sentinel; entry already sealed"),
            None => warn!("Terminal sentinel with no open entry"),
        }
    }

    /// Append a complete message as a sealed entry. Assistant content is
    /// rendered immediately; other roles remain plain text.
    fn append_full(&mut self, role: &str, content: &str) {
        let role = Role::from_wire(role);
        let (content, rendered) = if role == Role::Assistant {
            match render_markdown(content) {
                Some(html) => (html, true),
                None => (content.to_string(), true),
            }
        } else {
            (content.to_string(), false)
        };
        self.push_entry(TranscriptEntry {
            role,
            content,
            rendered,
        });
    }

    /// Replace the whole transcript with a replayed history. An empty list
    /// restores the initial state.
    fn replace_with_history(&mut self, messages: &[ChatMessage]) {
        *self = ChatState::default();
        for message in messages {
            self.append_full(&message.role, &message.content);
        }
    }

    /// A server-side error must not leave the UI stuck waiting: surface it
    /// inline and re-enable input.
    fn append_server_error(&mut self, detail: Option<&str>) {
        let detail = detail.unwrap_or("An unknown error occurred.");
        self.push_entry(TranscriptEntry {
            role: Role::Error,
            content: format!("Server error: {}", detail),
            rendered: false,
        });
        self.input_enabled = true;
    }

    /// A locally detected error (parse failure, stalled stream, send
    /// failure), surfaced inline without the server prefix.
    pub fn push_local_error(&mut self, detail: &str) {
        self.push_entry(TranscriptEntry {
            role: Role::Error,
            content: detail.to_string(),
            rendered: false,
        });
        self.input_enabled = true;
    }

    /// Optimistic local append of a sent user message; input stays disabled
    /// until the stream completes or errors.
    pub fn push_user(&mut self, content: &str) {
        self.push_entry(TranscriptEntry {
            role: Role::User,
            content: content.to_string(),
            rendered: false,
        });
        self.input_enabled = false;
    }

    pub fn open_entry(&self) -> Option<&TranscriptEntry> {
        self.entries.last().filter(|entry| entry.is_open())
    }

    fn push_entry(&mut self, entry: TranscriptEntry) {
        self.show_placeholder = false;
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerEnvelope;

    fn stream(fragment: &str) -> ServerEnvelope {
        ServerEnvelope::stream(fragment)
    }

    fn done() -> ServerEnvelope {
        ServerEnvelope::stream_done()
    }

    #[test]
    fn fragments_accumulate_and_seal_into_rendered_entry() {
        let mut state = ChatState::new();
        state.push_user("hello");
        state.apply(&stream("Hi"));
        assert!(!state.input_enabled);
        state.apply(&stream(" there"));
        state.apply(&done());

        assert_eq!(state.entries.len(), 2);
        let entry = state.entries.last().unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert!(entry.rendered);
        assert_eq!(entry.content, render_markdown("Hi there").unwrap());
        assert!(state.input_enabled);
    }

    #[test]
    fn sealed_output_is_a_function_of_fragment_concatenation() {
        let fragments = ["The ", "quick *brown* ", "fox"];

        let mut piecewise = ChatState::new();
        for fragment in fragments {
            piecewise.apply(&stream(fragment));
        }
        piecewise.apply(&done());

        let mut whole = ChatState::new();
        whole.apply(&stream(&fragments.concat()));
        whole.apply(&done());

        assert_eq!(piecewise.entries, whole.entries);
    }

    #[test]
    fn duplicate_sentinel_does_not_alter_sealed_content() {
        let mut state = ChatState::new();
        state.apply(&stream("Hi"));
        state.apply(&done());
        let sealed = state.entries.last().unwrap().clone();

        state.apply(&done());
        assert_eq!(state.entries.last().unwrap(), &sealed);
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn sentinel_alone_does_not_dismiss_placeholder() {
        let mut state = ChatState::new();
        state.apply(&done());
        assert!(state.show_placeholder);
        assert!(state.entries.is_empty());
        assert!(state.input_enabled);
    }

    #[test]
    fn fragment_after_user_entry_opens_a_new_assistant_entry() {
        let mut state = ChatState::new();
        state.push_user("hello");
        state.apply(&stream("Hi"));
        assert_eq!(state.entries.len(), 2);
        assert!(state.entries.last().unwrap().is_open());
    }

    #[test]
    fn empty_history_restores_initial_state() {
        let mut state = ChatState::new();
        state.push_user("hello");
        state.apply(&stream("Hi"));

        state.apply(&ServerEnvelope::History { messages: vec![] });
        assert_eq!(state, ChatState::default());
        assert!(state.show_placeholder);
    }

    #[test]
    fn history_replaces_prior_transcript_in_order() {
        let mut state = ChatState::new();
        state.push_user("stale");
        state.push_user("entries");

        state.apply(&ServerEnvelope::History {
            messages: vec![
                ChatMessage::user("one"),
                ChatMessage::assistant("two"),
                ChatMessage::user("three"),
            ],
        });

        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.entries[0].role, Role::User);
        assert_eq!(state.entries[0].content, "one");
        assert_eq!(state.entries[1].role, Role::Assistant);
        assert!(state.entries[1].rendered);
        assert_eq!(state.entries[2].content, "three");
        assert!(!state.show_placeholder);
    }

    #[test]
    fn replayed_assistant_entries_are_sealed_not_open() {
        let mut state = ChatState::new();
        state.apply(&ServerEnvelope::History {
            messages: vec![ChatMessage::assistant("two")],
        });
        assert!(state.open_entry().is_none());
    }

    #[test]
    fn server_error_appends_entry_and_reenables_input() {
        let mut state = ChatState::new();
        state.push_user("hello");
        state.apply(&stream("partial"));
        assert!(!state.input_enabled);

        state.apply(&ServerEnvelope::error("rate limited"));
        let entry = state.entries.last().unwrap();
        assert_eq!(entry.role, Role::Error);
        assert_eq!(entry.content, "Server error: rate limited");
        assert!(state.input_enabled);
    }

    #[test]
    fn error_without_detail_uses_fallback() {
        let mut state = ChatState::new();
        state.apply(&ServerEnvelope::Error { detail: None });
        assert_eq!(
            state.entries.last().unwrap().content,
            "Server error: An unknown error occurred."
        );
    }

    #[test]
    fn unknown_envelope_is_ignored() {
        let mut state = ChatState::new();
        state.apply(&ServerEnvelope::Unknown);
        assert_eq!(state, ChatState::default());
    }

    #[test]
    fn full_message_keeps_non_assistant_roles_plain() {
        let mut state = ChatState::new();
        state.apply(&ServerEnvelope::FullMessage {
            role: "user".to_string(),
            content: "*not markdown*".to_string(),
        });
        let entry = state.entries.last().unwrap();
        assert_eq!(entry.content, "*not markdown*");
        assert!(!entry.rendered);
    }
}
