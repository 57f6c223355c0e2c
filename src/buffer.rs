/// Fixed-capacity console output text, the authoritative buffer of the local backend.
/// Appends past `max_chars` drop the oldest text, always at a char boundary.
pub struct OutputBuffer {
    text: String,
    max_chars: usize,
}

/// Default cap, matching the hosted backend's terminal buffer.
pub const OUTPUT_BUFFER_MAX_CHARS: usize = 100_000;

impl OutputBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars: max_chars.max(1),
        }
    }

    pub fn append(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        self.text.push_str(data);

        // Byte length bounds char count from above, so this skips the count in the common case
        if self.text.len() <= self.max_chars {
            return;
        }
        let chars = self.text.chars().count();
        if chars > self.max_chars {
            let excess = chars - self.max_chars;
            let cut = self
                .text
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or(self.text.len());
            self.text.drain(..cut);
        }
    }

    pub fn snapshot(&self) -> String {
        self.text.clone()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    #[cfg(test)]
    pub fn len_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `data` at the last position not inside an incomplete escape sequence.
/// Returns `data.len()` if everything is complete. A buffer fetched mid-write can
/// end with `ESC [ 3` or an unterminated OSC; those bytes are held back from rendering.
pub fn safe_boundary(data: &str) -> usize {
    let bytes = data.as_bytes();
    let len = bytes.len();
    if len == 0 {
        return 0;
    }

    // Escape sequences longer than this are garbage, not something worth holding back
    let scan_start = len.saturating_sub(256);

    let mut i = scan_start;
    let mut last_safe = len;

    while i < len {
        if bytes[i] != 0x1b {
            i += 1;
            continue;
        }
        let seq_start = i;
        i += 1;
        if i >= len {
            last_safe = seq_start;
            break;
        }

        match bytes[i] {
            b'[' => {
                // CSI: params 0x30-0x3F, intermediates 0x20-0x2F, final 0x40-0x7E
                i += 1;
                let mut found_final = false;
                while i < len {
                    let c = bytes[i];
                    if (0x40..=0x7E).contains(&c) {
                        i += 1;
                        found_final = true;
                        break;
                    }
                    if c == 0x1b {
                        // Interrupted by a new ESC: broken, but complete
                        found_final = true;
                        break;
                    }
                    i += 1;
                }
                if !found_final {
                    last_safe = seq_start;
                }
            }
            b']' | b'P' => {
                // OSC / DCS: terminated by BEL (OSC only) or ST (ESC \)
                let allow_bel = bytes[i] == b']';
                i += 1;
                let mut terminated = false;
                while i < len {
                    let c = bytes[i];
                    if allow_bel && c == 0x07 {
                        i += 1;
                        terminated = true;
                        break;
                    }
                    if c == 0x1b {
                        if i + 1 < len && bytes[i + 1] == b'\\' {
                            i += 2;
                        }
                        terminated = true;
                        break;
                    }
                    i += 1;
                }
                if !terminated {
                    last_safe = seq_start;
                }
            }
            _ => {
                // ESC + single char (ESC c, ESC 7, ...)
                i += 1;
            }
        }
    }

    // last_safe only ever lands on an ESC byte or len, both char boundaries
    last_safe
}

/// The renderable part of `data`: everything before a trailing incomplete escape.
pub fn complete_prefix(data: &str) -> &str {
    &data[..safe_boundary(data)]
}
