//! Display surfaces for console output.

use std::io::Write;

use crate::buffer::complete_prefix;
use crate::markup::render_markup;

/// Where console output ends up. `append` is used for local echoes and
/// error lines, `replace` when a fetched buffer supersedes the display.
pub trait Renderer: Send {
    fn append(&mut self, markup: &str);

    fn replace(&mut self, markup: &str);

    /// Console text to this surface's markup.
    fn translate(&self, text: &str) -> String {
        render_markup(text)
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Keeps the display as an HTML fragment, the way a browser output pane would.
#[derive(Debug, Default)]
pub struct HtmlRenderer {
    html: String,
    replacements: usize,
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// How many times the whole display has been replaced.
    pub fn replacements(&self) -> usize {
        self.replacements
    }
}

impl Renderer for HtmlRenderer {
    fn append(&mut self, markup: &str) {
        self.html.push_str(markup);
    }

    fn replace(&mut self, markup: &str) {
        self.html.clear();
        self.html.push_str(markup);
        self.replacements += 1;
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

/// Writes console text straight to a terminal. The terminal understands the
/// colour codes itself, so translation only holds back an incomplete trailing
/// escape sequence.
pub struct AnsiRenderer<W: Write + Send> {
    out: W,
    /// Last buffer written by `replace`; local appends are not part of it
    last_buffer: String,
}

impl<W: Write + Send> AnsiRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_buffer: String::new(),
        }
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "terminal write failed");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for AnsiRenderer<W> {
    fn append(&mut self, markup: &str) {
        self.write(markup);
    }

    fn replace(&mut self, markup: &str) {
        // The buffer only grows between clears, so a replacement extending the
        // previous one is written as its tail
        if let Some(tail) = markup.strip_prefix(self.last_buffer.as_str()) {
            let tail = tail.to_string();
            self.write(&tail);
        } else {
            self.write("\x1b[2J\x1b[H");
            self.write(markup);
        }
        self.last_buffer.clear();
        self.last_buffer.push_str(markup);
    }

    fn translate(&self, text: &str) -> String {
        complete_prefix(text).to_string()
    }
}
