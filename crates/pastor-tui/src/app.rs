use pastor_core::{Message, Orchestrator, Outcome, RequestFailure, Sender};
use tokio::task::JoinHandle;
use tracing::debug;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Approximate number of rendered rows for the chat pane, including the
/// loading indicator.
pub fn chat_line_count(messages: &[Message], wrap_width: usize, busy: bool) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total_lines: u16 = 0;

    for msg in messages {
        total_lines = total_lines.saturating_add(1); // sender label
        for line in msg.text().lines() {
            // Character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            let rows = char_count.div_ceil(wrap_width).max(1);
            total_lines = total_lines.saturating_add(rows as u16);
        }
        total_lines = total_lines.saturating_add(1); // blank line after message
    }

    if busy {
        total_lines = total_lines.saturating_add(2);
    }

    total_lines
}

pub struct App {
    pub should_quit: bool,
    pub orchestrator: Orchestrator,

    // Input field cursor, in characters
    pub input_cursor: usize,

    // Chat pane
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub follow_tail: bool,

    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub request_task: Option<JoinHandle<Result<String, RequestFailure>>>,
}

impl App {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            should_quit: false,
            orchestrator,
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_tail: true,
            animation_frame: 0,
            request_task: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.orchestrator.session().pending_input
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Send the input field. Does nothing while a request is in flight or
    /// when the field is blank.
    pub fn submit(&mut self) {
        if self.is_busy() {
            return;
        }

        if let Ok(pending) = self.orchestrator.begin_pending() {
            self.input_cursor = 0;
            self.follow_tail = true;
            self.request_task = Some(tokio::spawn(pending.send()));
        }
    }

    /// Settle the in-flight request if its task has finished.
    pub async fn poll_request(&mut self) -> Option<Outcome> {
        if !self.request_task.as_ref().is_some_and(|task| task.is_finished()) {
            return None;
        }

        let task = self.request_task.take()?;
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(RequestFailure::unknown(format!("request task failed: {}", e))),
        };

        let outcome = self.orchestrator.settle(result);
        debug!(?outcome, "request settled");
        self.follow_tail = true;
        Some(outcome)
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let cursor = self.input_cursor;
        let input = self.orchestrator.pending_input_mut();
        let byte_pos = char_to_byte_index(input, cursor);
        input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn delete_before_cursor(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let cursor = self.input_cursor;
            let input = self.orchestrator.pending_input_mut();
            let byte_pos = char_to_byte_index(input, cursor);
            input.remove(byte_pos);
        }
    }

    pub fn delete_at_cursor(&mut self) {
        let cursor = self.input_cursor;
        let input = self.orchestrator.pending_input_mut();
        if cursor < input.chars().count() {
            let byte_pos = char_to_byte_index(input, cursor);
            input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input().chars().count();
        self.input_cursor = (self.input_cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input().chars().count();
    }

    // Chat scrolling

    fn max_chat_scroll(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        chat_line_count(self.orchestrator.conversation().messages(), wrap_width, self.is_busy())
            .saturating_sub(visible_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.max_chat_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
        self.follow_tail = self.chat_scroll >= max_scroll;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Keep the newest message (or "Thinking...") in view
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    pub fn sender_label(sender: Sender) -> &'static str {
        match sender {
            Sender::User => "You:",
            Sender::Assistant => "Pastor:",
        }
    }
}
