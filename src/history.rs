/// Direction of a history recall keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Up,
    Down,
}

/// Submitted commands plus a recall cursor.
///
/// The cursor ranges over `[0, len]`; `len` is the empty draft slot that a
/// fresh prompt starts in.
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: usize,
    draft: String,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted command and park the cursor on the empty slot.
    pub fn push(&mut self, command: &str) {
        self.entries.push(command.to_string());
        self.cursor = self.entries.len();
        self.draft.clear();
    }

    /// Move the cursor and return the text the input should now show.
    pub fn navigate(&mut self, direction: HistoryDirection) -> &str {
        match direction {
            HistoryDirection::Up => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.draft.clone_from(&self.entries[self.cursor]);
                }
            }
            HistoryDirection::Down => {
                if self.cursor + 1 < self.entries.len() {
                    self.cursor += 1;
                    self.draft.clone_from(&self.entries[self.cursor]);
                } else {
                    self.cursor = self.entries.len();
                    self.draft.clear();
                }
            }
        }
        &self.draft
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
