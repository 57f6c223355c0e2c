//! Console text → display markup.
//!
//! Only one colour pair is understood: `ESC[31m` opens the error span and
//! `ESC[0m` (or `ESC[m`) closes it. Every other complete escape sequence is
//! dropped, and an incomplete one at the very end is held back until the
//! next fetch completes it.

use crate::buffer::complete_prefix;

pub(crate) const ERROR_SPAN_OPEN: &str = "<span class=\"text-red\">";
pub(crate) const SPAN_CLOSE: &str = "</span>";

#[derive(Debug, PartialEq)]
enum Escape {
    ErrorOn,
    Reset,
    Other,
}

/// Translate console text into display markup. Pure: the same input always
/// yields the same output, and nothing outside the returned string changes.
pub fn render_markup(text: &str) -> String {
    let complete = complete_prefix(text);
    let bytes = complete.as_bytes();
    let mut out = String::with_capacity(complete.len() + complete.len() / 4);
    let mut in_error = false;
    let mut i = 0;

    while i < bytes.len() {
        // Copy runs of plain text in one go. Every special byte is ASCII, so
        // the run boundaries are always char boundaries.
        let run_start = i;
        while i < bytes.len() && !is_special(bytes[i]) {
            i += 1;
        }
        if run_start < i {
            out.push_str(&complete[run_start..i]);
        }
        if i >= bytes.len() {
            break;
        }

        match bytes[i] {
            0x1b => {
                let (escape, next) = parse_escape(complete, i);
                match escape {
                    Escape::ErrorOn if !in_error => {
                        out.push_str(ERROR_SPAN_OPEN);
                        in_error = true;
                    }
                    Escape::Reset if in_error => {
                        out.push_str(SPAN_CLOSE);
                        in_error = false;
                    }
                    _ => {}
                }
                i = next;
                continue;
            }
            b'\n' => out.push_str("<br>"),
            b' ' => out.push_str("&nbsp;"),
            b'&' => out.push_str("&amp;"),
            b'<' => out.push_str("&lt;"),
            b'>' => out.push_str("&gt;"),
            _ => {}
        }
        i += 1;
    }

    if in_error {
        out.push_str(SPAN_CLOSE);
    }
    out
}

fn is_special(b: u8) -> bool {
    matches!(b, 0x1b | b'\n' | b' ' | b'&' | b'<' | b'>')
}

/// Parse the escape sequence starting at `start` (an ESC byte).
/// Returns what it means and the index just past it.
fn parse_escape(text: &str, start: usize) -> (Escape, usize) {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = start + 1;

    match bytes.get(i) {
        None => (Escape::Other, len),
        Some(b'[') => {
            i += 1;
            let params_start = i;
            while i < len {
                let c = bytes[i];
                if c == 0x1b {
                    return (Escape::Other, i);
                }
                if (0x40..=0x7E).contains(&c) {
                    let escape = match (c, &bytes[params_start..i]) {
                        (b'm', b"31") => Escape::ErrorOn,
                        (b'm', b"0") | (b'm', b"") => Escape::Reset,
                        _ => Escape::Other,
                    };
                    return (escape, i + 1);
                }
                i += 1;
            }
            (Escape::Other, len)
        }
        Some(b']') | Some(b'P') => {
            i += 1;
            while i < len {
                match bytes[i] {
                    0x07 => return (Escape::Other, i + 1),
                    0x1b if bytes.get(i + 1) == Some(&b'\\') => return (Escape::Other, i + 2),
                    0x1b => return (Escape::Other, i),
                    _ => i += 1,
                }
            }
            (Escape::Other, len)
        }
        Some(_) => {
            // ESC + one char; skip the whole char even if it is multi-byte
            let width = text[i..].chars().next().map_or(1, char::len_utf8);
            (Escape::Other, i + width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_error_colour_pair() {
        assert_eq!(
            render_markup("\x1b[31mboom\x1b[0m"),
            "<span class=\"text-red\">boom</span>"
        );
    }

    #[test]
    fn translates_line_breaks_and_spaces() {
        assert_eq!(render_markup("$ ls -a\nsrc\n"), "$&nbsp;ls&nbsp;-a<br>src<br>");
    }

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(render_markup("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn closes_unterminated_error_span() {
        assert_eq!(
            render_markup("\x1b[31mTraceback"),
            "<span class=\"text-red\">Traceback</span>"
        );
    }

    #[test]
    fn stray_reset_emits_nothing() {
        assert_eq!(render_markup("ok\x1b[0m"), "ok");
        assert_eq!(render_markup("ok\x1b[m!"), "ok!");
    }

    #[test]
    fn repeated_error_on_does_not_nest() {
        assert_eq!(
            render_markup("\x1b[31ma\x1b[31mb\x1b[0m"),
            "<span class=\"text-red\">ab</span>"
        );
    }

    #[test]
    fn drops_unknown_sequences() {
        assert_eq!(render_markup("\x1b[1;32mgreen\x1b[0m"), "green");
        assert_eq!(render_markup("\x1b]0;title\x07body"), "body");
        assert_eq!(render_markup("\x1b7saved"), "saved");
    }

    #[test]
    fn holds_back_incomplete_trailing_escape() {
        assert_eq!(render_markup("line\x1b[3"), "line");
        assert_eq!(
            render_markup("line\x1b[31mred"),
            "line<span class=\"text-red\">red</span>"
        );
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        assert_eq!(render_markup("héllo wörld ✓"), "héllo&nbsp;wörld&nbsp;✓");
        assert_eq!(render_markup("\x1bé!"), "!");
    }

    #[test]
    fn rendering_is_deterministic() {
        let input = "$ python main.py\n\x1b[31mError: x\n\x1b[0m\nProcess exited with code 1\n";
        assert_eq!(render_markup(input), render_markup(input));
    }
}
