use ratatui::layout::Rect;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use wschat_core::{ChannelEvent, ChatMessage, ConnectionManager};

/// Messages take at most this share of the chat width, like chat bubbles
const BUBBLE_WIDTH_PERCENT: usize = 70;

pub struct App {
    pub should_quit: bool,
    pub connection: ConnectionManager,

    // Draft input (cursor is a character index, not a byte index)
    pub draft: String,
    pub cursor: usize,

    // Message list scrolling
    pub scroll: u16,
    pub follow_latest: bool,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    pub animation_frame: u8,
}

impl App {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            should_quit: false,
            connection,
            draft: String::new(),
            cursor: 0,
            scroll: 0,
            follow_latest: true,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
        }
    }

    /// The input field only accepts edits while the channel is usable
    pub fn can_edit(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn can_send(&self) -> bool {
        self.connection.is_connected() && !self.draft.trim().is_empty()
    }

    /// Forward the draft to the connection and clear it.
    ///
    /// Blank drafts never reach the connection manager.
    pub fn submit(&mut self) -> bool {
        if !self.can_send() {
            return false;
        }

        let text = std::mem::take(&mut self.draft);
        self.cursor = 0;
        self.follow_latest = true;
        self.connection.send_message(&text)
    }

    pub fn on_channel_event(&mut self, event: ChannelEvent) {
        self.connection.apply(event);
    }

    pub fn insert_char(&mut self, c: char) {
        if !self.can_edit() {
            return;
        }
        let byte_pos = char_to_byte_index(&self.draft, self.cursor);
        self.draft.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn delete_before_cursor(&mut self) {
        if !self.can_edit() || self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let byte_pos = char_to_byte_index(&self.draft, self.cursor);
        self.draft.remove(byte_pos);
    }

    pub fn delete_at_cursor(&mut self) {
        if !self.can_edit() || self.cursor >= self.draft.chars().count() {
            return;
        }
        let byte_pos = char_to_byte_index(&self.draft, self.cursor);
        self.draft.remove(byte_pos);
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.draft.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.draft.chars().count();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_latest = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
        if self.scroll == self.max_scroll() {
            self.follow_latest = true;
        }
    }

    pub fn scroll_to_latest(&mut self) {
        self.follow_latest = true;
        self.scroll = self.max_scroll();
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if !self.connection.is_connected() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn bubble_width(&self) -> usize {
        let width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };
        (width * BUBBLE_WIDTH_PERCENT / 100).max(1)
    }

    /// Rendered height of the whole conversation at the current width
    pub fn total_chat_lines(&self) -> u16 {
        let width = self.bubble_width();
        self.connection
            .messages()
            .iter()
            .map(|msg| message_height(msg, width))
            .fold(0u16, |acc, h| acc.saturating_add(h))
    }

    pub fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.total_chat_lines().saturating_sub(visible_height)
    }

    /// Keep the newest message in view unless the user scrolled away
    pub fn sync_scroll(&mut self) {
        if self.follow_latest {
            self.scroll = self.max_scroll();
        } else {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }
}

/// Label line, wrapped content, blank separator
fn message_height(msg: &ChatMessage, width: usize) -> u16 {
    let body = wrap_text(&msg.content, width).len();
    (body + 2).min(u16::MAX as usize) as u16
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Greedy word wrap measured in terminal columns. Words wider than `width`
/// are split between characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for raw_line in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;

        for word in raw_line.split_whitespace() {
            let word_width = word.width();

            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }

            if word_width > width {
                // Hard break on column boundaries; a wide glyph never straddles two lines
                for c in word.chars() {
                    let char_width = c.width().unwrap_or(0);
                    if current_width > 0 && current_width + char_width > width {
                        lines.push(std::mem::take(&mut current));
                        current_width = 0;
                    }
                    current.push(c);
                    current_width += char_width;
                }
                continue;
            }

            if current_width > 0 {
                current.push(' ');
                current_width += 1;
            }
            current.push_str(word);
            current_width += word_width;
        }

        lines.push(current);
    }

    lines
}
