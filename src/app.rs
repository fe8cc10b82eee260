use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::backend::{ChatClient, ChatError, StreamEvent};
use crate::tui::AppEvent;

/// Shown when the endpoint environment variables are not set.
pub const CONFIG_ERROR_MESSAGE: &str = "Configuration error: API URL or Path not set.";
/// Shown when the request or the response stream fails.
pub const STREAM_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// One chat message as sent over the wire. Ids are generation-time based and
/// only carried for the backend; collisions are tolerated.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    #[serde(rename = "isUser")]
    pub is_user: bool,
}

impl ChatMessage {
    pub fn user(content: String) -> Self {
        Self {
            id: format!("user-{}", timestamp_millis()),
            content,
            is_user: true,
        }
    }

    /// Empty assistant message appended at dispatch; its content is the
    /// projection of the exchange accumulator while the stream runs.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: format!("ai-{}", timestamp_millis()),
            content: String::new(),
            is_user: false,
        }
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

pub struct App {
    pub should_quit: bool,

    // Conversation state
    pub messages: Vec<ChatMessage>,
    pub input_text: String,
    pub input_cursor: usize, // cursor position in input_text, in chars
    pub is_responding: bool,
    accumulator: String,

    // Chat viewport (dimensions captured during render for scroll math)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Exchange dispatch
    pub client: ChatClient,
    pub events_tx: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(client: ChatClient, events_tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            messages: Vec::new(),
            input_text: String::new(),
            input_cursor: 0,
            is_responding: false,
            accumulator: String::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            client,
            events_tx,
        }
    }

    /// Start an exchange from the current draft. Returns the request history
    /// (full conversation including the new user message, excluding the
    /// placeholder), or `None` when the draft is blank or a response is
    /// already in flight — both are silent no-ops.
    pub fn begin_exchange(&mut self) -> Option<Vec<ChatMessage>> {
        if self.is_responding || self.input_text.trim().is_empty() {
            return None;
        }

        let draft = std::mem::take(&mut self.input_text);
        self.input_cursor = 0;

        self.messages.push(ChatMessage::user(draft));
        let history = self.messages.clone();

        self.messages.push(ChatMessage::assistant_placeholder());
        self.is_responding = true;
        self.accumulator.clear();
        self.scroll_chat_to_bottom();

        Some(history)
    }

    /// Apply one stream event to the in-flight exchange. Events arriving
    /// after the exchange has settled are ignored; the reply message is
    /// never mutated once the stream ends.
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        if !self.is_responding {
            return;
        }

        match event {
            StreamEvent::Chunk(text) => {
                self.accumulator.push_str(&text);
                if let Some(reply) = self.messages.last_mut() {
                    reply.content = self.accumulator.clone();
                }
                self.scroll_chat_to_bottom();
            }
            StreamEvent::Done => {
                self.is_responding = false;
                self.accumulator.clear();
            }
            StreamEvent::Failed(err) => {
                // Partially streamed content is discarded, not preserved.
                let notice = match err {
                    ChatError::ConfigurationMissing => CONFIG_ERROR_MESSAGE,
                    ChatError::RequestFailed(_) | ChatError::StreamFailed(_) => {
                        STREAM_ERROR_MESSAGE
                    }
                };
                if let Some(reply) = self.messages.last_mut() {
                    reply.content = notice.to_string();
                }
                self.is_responding = false;
                self.accumulator.clear();
                self.scroll_chat_to_bottom();
            }
        }
    }

    // Draft editing (char-indexed, UTF-8 safe)

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input_text, self.input_cursor);
        self.input_text.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn delete_before_cursor(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input_text, self.input_cursor);
            self.input_text.remove(byte_pos);
        }
    }

    pub fn delete_at_cursor(&mut self) {
        let char_count = self.input_text.chars().count();
        if self.input_cursor < char_count {
            let byte_pos = char_to_byte_index(&self.input_text, self.input_cursor);
            self.input_text.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input_text.chars().count();
        self.input_cursor = (self.input_cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input_text.chars().count();
    }

    // Chat scrolling

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max_scroll = self
            .chat_total_lines()
            .saturating_sub(self.chat_height.max(1));
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_chat_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_chat_down((self.chat_height / 2).max(1));
    }

    /// Scroll so the newest content is visible, using the chat dimensions
    /// captured during the previous render.
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_total_lines();
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines - visible_height;
        } else {
            self.chat_scroll = 0;
        }
    }

    fn chat_total_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for msg in &self.messages {
            total += 1; // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total += 1;
                } else {
                    total += ((char_count / wrap_width) + 1) as u16;
                }
            }
            if msg.content.is_empty() {
                total += 1; // Placeholder renders the typing indicator line
            }
            total += 1; // Blank line after message
        }
        total
    }

    /// Tick the typing-indicator animation (driven by the Tick event).
    pub fn tick_animation(&mut self) {
        if self.is_responding {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(ChatClient::new(), tx);
        app.chat_height = 20;
        app.chat_width = 50;
        app
    }

    fn set_draft(app: &mut App, draft: &str) {
        app.input_text = draft.to_string();
        app.input_cursor = app.input_text.chars().count();
    }

    #[test]
    fn submit_appends_user_then_placeholder_and_clears_draft() {
        let mut app = test_app();
        set_draft(&mut app, "hello there");

        let history = app.begin_exchange().unwrap();

        assert_eq!(app.messages.len(), 2);
        assert!(app.messages[0].is_user);
        assert_eq!(app.messages[0].content, "hello there");
        assert!(!app.messages[1].is_user);
        assert_eq!(app.messages[1].content, "");
        assert!(app.is_responding);
        assert_eq!(app.input_text, "");
        assert_eq!(app.input_cursor, 0);

        // The request history includes the new user message but not the placeholder.
        assert_eq!(history.len(), 1);
        assert!(history[0].is_user);
    }

    #[test]
    fn blank_draft_is_a_noop() {
        let mut app = test_app();
        set_draft(&mut app, "   \n ");

        assert!(app.begin_exchange().is_none());
        assert!(app.messages.is_empty());
        assert!(!app.is_responding);
        // The draft is not cleared by a rejected submit.
        assert_eq!(app.input_text, "   \n ");
    }

    #[test]
    fn submit_while_responding_is_a_noop() {
        let mut app = test_app();
        set_draft(&mut app, "first");
        app.begin_exchange().unwrap();

        set_draft(&mut app, "second");
        assert!(app.begin_exchange().is_none());
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.input_text, "second");
    }

    #[test]
    fn chunks_accumulate_in_order() {
        let mut app = test_app();
        set_draft(&mut app, "hi");
        app.begin_exchange().unwrap();

        app.apply_stream_event(StreamEvent::Chunk("He".to_string()));
        assert_eq!(app.messages[1].content, "He");
        app.apply_stream_event(StreamEvent::Chunk("llo".to_string()));
        assert_eq!(app.messages[1].content, "Hello");
        assert!(app.is_responding);
    }

    #[test]
    fn done_settles_the_exchange_and_later_events_are_ignored() {
        let mut app = test_app();
        set_draft(&mut app, "hi");
        app.begin_exchange().unwrap();

        app.apply_stream_event(StreamEvent::Chunk("Hello".to_string()));
        app.apply_stream_event(StreamEvent::Done);
        assert!(!app.is_responding);
        assert_eq!(app.messages[1].content, "Hello");

        // Stale events after completion must not mutate the reply.
        app.apply_stream_event(StreamEvent::Chunk("!!".to_string()));
        assert_eq!(app.messages[1].content, "Hello");
    }

    #[test]
    fn failure_discards_partial_content_and_shows_apology() {
        let mut app = test_app();
        set_draft(&mut app, "hi");
        app.begin_exchange().unwrap();

        app.apply_stream_event(StreamEvent::Chunk("partial rep".to_string()));
        app.apply_stream_event(StreamEvent::Failed(ChatError::RequestFailed(500)));

        assert_eq!(app.messages[1].content, STREAM_ERROR_MESSAGE);
        assert!(!app.is_responding);
    }

    #[test]
    fn missing_configuration_shows_config_error() {
        let mut app = test_app();
        set_draft(&mut app, "hi");
        app.begin_exchange().unwrap();

        app.apply_stream_event(StreamEvent::Failed(ChatError::ConfigurationMissing));

        assert_eq!(app.messages[1].content, CONFIG_ERROR_MESSAGE);
        assert!(!app.is_responding);
    }

    #[test]
    fn session_is_usable_again_after_completion() {
        let mut app = test_app();
        set_draft(&mut app, "first");
        app.begin_exchange().unwrap();
        app.apply_stream_event(StreamEvent::Done);

        set_draft(&mut app, "second");
        let history = app.begin_exchange().unwrap();

        assert_eq!(app.messages.len(), 4);
        // History carries the whole conversation so far, placeholder excluded.
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "second");
    }

    #[test]
    fn draft_editing_is_utf8_safe() {
        let mut app = test_app();
        for c in "héllo".chars() {
            app.insert_char(c);
        }
        assert_eq!(app.input_text, "héllo");

        app.cursor_left();
        app.cursor_left();
        app.delete_before_cursor(); // removes the second 'l'
        assert_eq!(app.input_text, "hélo");

        app.cursor_home();
        app.delete_at_cursor();
        assert_eq!(app.input_text, "élo");
    }

    #[test]
    fn wire_format_uses_is_user_rename() {
        let msg = ChatMessage::user("hi".to_string());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["isUser"], true);
        assert!(value.get("is_user").is_none());
        assert!(value["id"].as_str().unwrap().starts_with("user-"));
    }
}
