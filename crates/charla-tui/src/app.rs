use charla_core::{ChatMessage, ChatRole, ConversationStore, Storage};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Wrap text to fit within a given width, returning multiple lines
/// Uses word boundaries for wrapping; words longer than a row are split
pub fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word = word;
        let mut word_len = word.chars().count();

        while word_len > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            let split = char_to_byte_index(word, width);
            lines.push(word[..split].to_string());
            word = &word[split..];
            word_len -= width;
        }

        if current_len == 0 {
            // First word on line
            current_line = word.to_string();
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            // Word fits on current line
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
        } else {
            // Word doesn't fit, start new line
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// One rendered row of the chat pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRow {
    Role(ChatRole), // "You:" / "AI:"
    Text(String),
    Blank,
    Loading,
}

/// Role row, wrapped text rows, trailing blank row
fn message_rows(msg: &ChatMessage, width: usize) -> Vec<ChatRow> {
    let mut rows = vec![ChatRow::Role(msg.role)];
    for line in msg.text.lines() {
        rows.extend(wrap_text_to_width(line, width).into_iter().map(ChatRow::Text));
    }
    rows.push(ChatRow::Blank);
    rows
}

/// Per-message row counts at one wrap width. Messages are append-only, so
/// the cache only ever grows until the width changes.
#[derive(Debug, Default)]
struct RowCounts {
    width: usize,
    counts: Vec<usize>,
    total: usize,
}

pub struct App<S: Storage> {
    pub should_quit: bool,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat view
    pub scroll: usize,    // first visible row
    pub chat_height: u16, // inner height of the chat area, set during render
    pub chat_width: u16,  // inner width, the wrap width
    pub follow: bool,     // stick to the bottom as messages arrive
    pub animation_frame: u8, // 0-2 for the loading ellipsis

    // Status
    pub model: String,
    pub key_source: Option<&'static str>,

    pub store: ConversationStore<S>,
    rows: RowCounts,
}

impl<S: Storage> App<S> {
    pub fn new(store: ConversationStore<S>, model: &str, key_source: Option<&'static str>) -> Self {
        let mut app = Self {
            should_quit: false,
            input: String::new(),
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow: true,
            animation_frame: 0,
            model: model.to_string(),
            key_source,
            store,
            rows: RowCounts::default(),
        };
        app.scroll_to_bottom();
        app
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    pub fn is_awaiting(&self) -> bool {
        self.store.is_awaiting()
    }

    /// Send the input box contents. Blank input stays in the box untouched.
    pub fn submit_input(&mut self) {
        if !self.store.submit(&self.input) {
            return;
        }
        self.input.clear();
        self.cursor = 0;
        self.follow = true;
        self.scroll_to_bottom();
    }

    /// Apply answers that finished since the last call
    pub fn sync_answers(&mut self) {
        if self.store.drain_completed() > 0 && self.follow {
            self.scroll_to_bottom();
        }
    }

    pub fn on_tick(&mut self) {
        if self.is_awaiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.sync_answers();
    }

    // Input editing
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    // Chat scrolling
    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.max_scroll();
        self.scroll = self.scroll.min(max).saturating_sub(lines);
        self.follow = self.scroll >= max;
    }

    pub fn scroll_down(&mut self, lines: usize) {
        let max = self.max_scroll();
        self.scroll = self.scroll.saturating_add(lines).min(max);
        self.follow = self.scroll >= max;
    }

    pub fn page_size(&self) -> usize {
        (self.visible_height() / 2).max(1)
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn visible_height(&self) -> usize {
        if self.chat_height > 0 {
            self.chat_height as usize
        } else {
            20
        }
    }

    fn wrap_width(&self) -> usize {
        if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        }
    }

    fn max_scroll(&mut self) -> usize {
        self.total_lines().saturating_sub(self.visible_height())
    }

    /// Count rows for messages appended since the last call
    fn refresh_row_counts(&mut self) {
        let width = self.wrap_width();
        let messages = self.store.messages();
        if self.rows.width != width || self.rows.counts.len() > messages.len() {
            self.rows = RowCounts {
                width,
                ..RowCounts::default()
            };
        }

        for msg in &messages[self.rows.counts.len()..] {
            let count = message_rows(msg, width).len();
            self.rows.counts.push(count);
            self.rows.total += count;
        }
    }

    /// Rendered row count, including the loading placeholder
    pub fn total_lines(&mut self) -> usize {
        self.refresh_row_counts();
        let loading = if self.is_awaiting() { 2 } else { 0 }; // "AI:" + "loading..."
        self.rows.total + loading
    }

    /// Rows from `scroll` down, at most one screen. Messages above the
    /// window are skipped by their cached counts and never wrapped.
    pub fn visible_rows(&mut self) -> Vec<ChatRow> {
        self.refresh_row_counts();
        let width = self.rows.width;
        let height = self.visible_height();
        let start = self.scroll;

        let mut rows = Vec::with_capacity(height);
        let mut row = 0;
        for (msg, &count) in self.store.messages().iter().zip(&self.rows.counts) {
            if rows.len() >= height {
                break;
            }
            if row + count > start {
                let skip = start.saturating_sub(row);
                let take = height - rows.len();
                rows.extend(message_rows(msg, width).into_iter().skip(skip).take(take));
            }
            row += count;
        }

        if self.is_awaiting() {
            for loading_row in [ChatRow::Role(ChatRole::Assistant), ChatRow::Loading] {
                if row >= start && rows.len() < height {
                    rows.push(loading_row);
                }
                row += 1;
            }
        }

        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use charla_core::{AnswerSource, Conversation, MemoryStorage, Persistence};
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl AnswerSource for Echo {
        async fn answer(&self, prompt: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {}", prompt))
        }
    }

    fn app() -> App<MemoryStorage> {
        let store = ConversationStore::initialize(Persistence::new(MemoryStorage::new()), Arc::new(Echo));
        App::new(store, "gemini-test", None)
    }

    #[tokio::test]
    async fn submit_clears_input_and_appends_user_message() {
        let mut app = app();
        for c in "Hola".chars() {
            app.insert_char(c);
        }

        app.submit_input();

        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
        assert_eq!(app.messages(), &[ChatMessage::user("Hola")]);
        assert!(app.is_awaiting());

        while app.is_awaiting() {
            tokio::task::yield_now().await;
            app.sync_answers();
        }
        assert_eq!(app.messages()[1], ChatMessage::assistant("echo: Hola"));
    }

    #[tokio::test]
    async fn blank_submit_keeps_input() {
        let mut app = app();
        app.insert_char(' ');

        app.submit_input();

        assert_eq!(app.input, " ");
        assert!(app.messages().is_empty());
        assert!(!app.is_awaiting());
    }

    #[tokio::test]
    async fn editing_is_utf8_safe() {
        let mut app = app();
        for c in "añb".chars() {
            app.insert_char(c);
        }

        app.cursor_left();
        app.backspace();
        assert_eq!(app.input, "ab");
        assert_eq!(app.cursor, 1);

        app.cursor_home();
        app.delete();
        assert_eq!(app.input, "b");

        app.cursor_end();
        app.insert_char('¿');
        assert_eq!(app.input, "b¿");
        app.cursor_right();
        assert_eq!(app.cursor, 2);
    }

    #[tokio::test]
    async fn loading_lines_count_while_awaiting() {
        let mut app = app();
        let idle = app.total_lines();

        app.input = "question".to_string();
        app.submit_input();

        // user message: role line + text + blank, plus the loading placeholder
        assert_eq!(app.total_lines(), idle + 3 + 2);
    }

    #[tokio::test]
    async fn scrolling_up_stops_following() {
        let mut app = app();
        app.chat_height = 2;
        app.chat_width = 40;
        for i in 0..3 {
            app.input = format!("message {}", i);
            app.submit_input();
        }
        app.scroll_to_bottom();
        let bottom = app.scroll;
        assert!(bottom > 0);

        app.scroll_up(1);
        assert!(!app.follow);
        assert_eq!(app.scroll, bottom - 1);

        app.scroll_down(100);
        assert!(app.follow);
        assert_eq!(app.scroll, bottom);
    }

    fn app_with_history(messages: Vec<ChatMessage>) -> App<MemoryStorage> {
        let storage = MemoryStorage::new();
        Persistence::new(storage.clone())
            .save(&Conversation::from(messages))
            .unwrap();
        let store = ConversationStore::initialize(Persistence::new(storage), Arc::new(Echo));
        App::new(store, "gemini-test", None)
    }

    #[test]
    fn wrap_keeps_exact_width_line_on_one_row() {
        assert_eq!(wrap_text_to_width("abcd efgh", 9), vec!["abcd efgh"]);
        assert_eq!(wrap_text_to_width("abcd efghi", 9), vec!["abcd", "efghi"]);
        assert_eq!(wrap_text_to_width("", 9), vec![""]);
    }

    #[test]
    fn wrap_splits_words_longer_than_a_row() {
        assert_eq!(
            wrap_text_to_width("ok añbcdefghij", 5),
            vec!["ok", "añbcd", "efghi", "j"]
        );
        assert_eq!(wrap_text_to_width("abcdefghij", 5), vec!["abcde", "fghij"]);
    }

    #[test]
    fn long_history_scrolls_to_last_row() {
        let mut messages = Vec::new();
        for i in 0..2000 {
            messages.push(ChatMessage::user(format!("question {}", i)));
            let answer: Vec<String> = (0..40).map(|j| format!("answer {} line {}", i, j)).collect();
            messages.push(ChatMessage::assistant(answer.join("\n")));
        }
        let mut app = app_with_history(messages);
        app.chat_height = 30;
        app.chat_width = 40;

        app.scroll_to_bottom();

        // 2000 * (3 user rows + 42 answer rows)
        assert_eq!(app.total_lines(), 90_000);
        assert_eq!(app.scroll + app.chat_height as usize, 90_000);

        let rows = app.visible_rows();
        assert_eq!(rows.len(), 30);
        assert_eq!(rows[28], ChatRow::Text("answer 1999 line 39".to_string()));
        assert_eq!(rows[29], ChatRow::Blank);
    }

    #[test]
    fn visible_rows_match_full_layout_at_every_offset() {
        let messages = vec![
            ChatMessage::user("short"),
            ChatMessage::assistant("a reply that wraps over several rows\n\nwith a gap"),
            ChatMessage::user("x"),
            ChatMessage::assistant(""),
        ];
        let width = 12;
        let full: Vec<ChatRow> = messages.iter().flat_map(|m| message_rows(m, width)).collect();
        let mut app = app_with_history(messages);
        app.chat_height = 4;
        app.chat_width = width as u16;

        assert_eq!(app.total_lines(), full.len());
        for start in 0..=app.max_scroll() {
            app.scroll = start;
            assert_eq!(app.visible_rows(), full[start..start + 4].to_vec(), "offset {}", start);
        }
    }

    #[tokio::test]
    async fn loading_rows_follow_last_message() {
        let mut app = app();
        app.chat_height = 3;
        app.input = "question".to_string();
        app.submit_input();

        assert_eq!(
            app.visible_rows(),
            vec![ChatRow::Blank, ChatRow::Role(ChatRole::Assistant), ChatRow::Loading]
        );
    }

    #[test]
    fn resize_recounts_rows() {
        let mut app = app_with_history(vec![ChatMessage::assistant("one two three four")]);
        app.chat_width = 20;
        assert_eq!(app.total_lines(), 3);

        app.chat_width = 5;
        assert_eq!(app.total_lines(), 6);
    }

    #[test]
    fn markdown_markers_are_shown_verbatim() {
        let mut app = app_with_history(vec![ChatMessage::assistant("**bold** and `code`")]);
        app.chat_width = 40;
        app.chat_height = 3;

        assert_eq!(
            app.visible_rows(),
            vec![
                ChatRow::Role(ChatRole::Assistant),
                ChatRow::Text("**bold** and `code`".to_string()),
                ChatRow::Blank,
            ]
        );
    }
}
