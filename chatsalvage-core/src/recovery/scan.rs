//! String-aware brace scanning over raw log text.
//!
//! Only `{`, `}`, `"` and `\` are structural here, all ASCII, so byte
//! positions reported by the scanner are always valid `str` boundaries.
//! A raw newline can never occur inside a valid JSON string, so string state
//! is dropped at every newline; a corrupted quote therefore damages at most
//! one line. Strings only open inside an object: a `"` at depth zero is
//! separator noise.

/// Incremental brace depth tracker.
#[derive(Debug, Default, Clone)]
pub struct BraceCounter {
    depth: i64,
    in_string: bool,
    escaped: bool,
    opened: bool,
}

impl BraceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the depth after it.
    pub fn push(&mut self, byte: u8) -> i64 {
        if byte == b'\n' {
            self.in_string = false;
            self.escaped = false;
            return self.depth;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return self.depth;
        }

        match byte {
            b'"' if self.depth > 0 => self.in_string = true,
            b'{' => {
                self.depth += 1;
                self.opened = true;
            }
            b'}' => self.depth -= 1,
            _ => {}
        }
        self.depth
    }

    pub fn feed(&mut self, text: &str) {
        for byte in text.bytes() {
            self.push(byte);
        }
    }

    pub fn depth(&self) -> i64 {
        self.depth
    }

    /// At least one `{` was seen and every one of them has been closed.
    pub fn is_balanced(&self) -> bool {
        self.opened && self.depth == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of scanning for top-level objects.
#[derive(Debug, Default)]
pub struct ObjectScan {
    /// `(start, end)` byte ranges of balanced top-level objects
    pub spans: Vec<(usize, usize)>,
    /// Start of an object still open at end of input
    pub unterminated: Option<usize>,
}

/// Locate balanced objects at brace depth zero.
///
/// Square brackets are ignored, so the elements of a top-level array are
/// found the same way as objects separated by arbitrary text.
pub fn top_level_objects(text: &str) -> ObjectScan {
    let mut scan = ObjectScan::default();
    let mut counter = BraceCounter::new();
    let mut start = None;

    for (i, byte) in text.bytes().enumerate() {
        let before = counter.depth();
        let after = counter.push(byte);

        if before == 0 && after == 1 {
            start = Some(i);
        } else if before == 1 && after == 0 {
            if let Some(s) = start.take() {
                scan.spans.push((s, i + 1));
            }
        } else if after < 0 {
            // Stray closing brace between objects
            counter.reset();
            start = None;
        }
    }

    scan.unterminated = start;
    scan
}

/// End (exclusive) of the object opened by the `{` at `open`, if it closes.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut counter = BraceCounter::new();
    for (offset, &byte) in bytes[open..].iter().enumerate() {
        if counter.push(byte) == 0 {
            return Some(open + offset + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let mut counter = BraceCounter::new();
        counter.feed(r#"{"code": "fn main() { } }}", "n": "\"{"}"#);
        assert!(counter.is_balanced());
    }

    #[test]
    fn test_array_elements_are_top_level() {
        let text = r#"[{"a":{"b":1}}, {"c":2}]"#;
        let scan = top_level_objects(text);
        let chunks: Vec<&str> = scan.spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(chunks, vec![r#"{"a":{"b":1}}"#, r#"{"c":2}"#]);
        assert!(scan.unterminated.is_none());
    }

    #[test]
    fn test_unterminated_tail_is_reported() {
        let text = r#"[{"a":1},{"b":"cut"#;
        let scan = top_level_objects(text);
        assert_eq!(scan.spans.len(), 1);
        assert_eq!(scan.unterminated, Some(9));
    }

    #[test]
    fn test_newline_ends_broken_string() {
        let mut counter = BraceCounter::new();
        counter.feed("{\"a\":\"broken\n");
        assert_eq!(counter.depth(), 1);
        counter.feed("}");
        assert!(counter.is_balanced());
    }

    #[test]
    fn test_quote_between_objects_is_not_a_string() {
        let text = r#"{"a":1} it"s broken {"b":2}"#;
        let scan = top_level_objects(text);
        let chunks: Vec<&str> = scan.spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(chunks, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn test_matching_close() {
        let text = r#"xx{"a":{"b":"}"}}yy"#;
        assert_eq!(matching_close(text, 2), Some(text.len() - 2));
        assert_eq!(matching_close(text, 0), None);
        assert_eq!(matching_close(r#"{"a":1"#, 0), None);
    }
}
