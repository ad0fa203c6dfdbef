//! Pattern matching over the trailing window of child output.
//!
//! The window is bounded, but the offsets used for de-duplication are
//! absolute: counted from the first byte the child ever wrote.

use crate::config::{Action, ActionId};
use crate::state::SessionState;
use crate::template;
use regex::bytes::{Regex, RegexBuilder};

/// Upper bound on the number of trailing output bytes kept for matching.
pub const MAX_WINDOW_LEN: usize = 4096;

/// A compiled action pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(Vec<u8>),
    Regex(Regex),
}

impl Pattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into().into_bytes())
    }

    /// Compile `source` as a byte regex with Unicode mode off.
    ///
    /// `.` and negated classes match any single byte, including bytes that are
    /// not valid UTF-8. Non-ASCII text in the pattern has to be spelled with
    /// `\xNN` escapes.
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        let re = RegexBuilder::new(source).unicode(false).build()?;
        Ok(Pattern::Regex(re))
    }

    /// Offset of the first match within `haystack`.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        match self {
            Pattern::Literal(needle) => template::find(haystack, needle),
            Pattern::Regex(re) => re.find(haystack).map(|m| m.start()),
        }
    }
}

/// Rolling buffer of the most recent child output.
#[derive(Debug)]
pub struct MatchWindow {
    buf: Vec<u8>,
    total: u64,
    capacity: usize,
}

impl Default for MatchWindow {
    fn default() -> Self {
        Self::with_capacity(MAX_WINDOW_LEN)
    }
}

impl MatchWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        MatchWindow {
            buf: Vec::with_capacity(capacity),
            total: 0,
            capacity,
        }
    }

    /// Append a chunk, keeping only the trailing `capacity` bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        self.total += data.len() as u64;
        if self.buf.len() > self.capacity {
            let excess = self.buf.len() - self.capacity;
            self.buf.drain(..excess);
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total bytes seen since the session started.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Convert an index into the window to an absolute stream offset.
    pub fn absolute(&self, idx: usize) -> u64 {
        self.total - self.buf.len() as u64 + idx as u64
    }
}

/// Decide whether `action` fires against the current window.
///
/// Oneshot actions that already fired are skipped. The first match fires only
/// when its absolute offset lies past the one recorded at the previous
/// firing. Returns that offset when the action fires.
pub fn poll(
    id: ActionId,
    action: &Action,
    window: &MatchWindow,
    state: &mut SessionState,
) -> Option<u64> {
    if state.has_fired(id) {
        return None;
    }
    let offset = window.absolute(action.pattern.find(window.bytes())?);
    state.record_match(id, offset).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(pattern: Pattern) -> Action {
        Action {
            pattern,
            effects: Vec::new(),
            oneshot: false,
            reset_logs: false,
            reset_oneshots: false,
        }
    }

    #[test]
    fn test_literal_find() {
        let p = Pattern::literal("=> ");
        assert_eq!(p.find(b"U-Boot\r\n=> "), Some(8));
        assert_eq!(p.find(b"U-Boot"), None);
    }

    #[test]
    fn test_regex_find_on_bytes() {
        let p = Pattern::regex(r"login: ?$").unwrap();
        assert_eq!(p.find(b"\xffbox login: "), Some(5));
        assert_eq!(p.find(b"login: more"), None);
    }

    #[test]
    fn test_regex_dot_matches_any_byte() {
        let p = Pattern::regex(r"key.").unwrap();
        assert_eq!(p.find(b"noise key\xff"), Some(6));
        let p = Pattern::regex(r"[^a]\xfe").unwrap();
        assert_eq!(p.find(b"\x80\xfe"), Some(0));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = MatchWindow::with_capacity(8);
        window.push(b"0123456789");
        assert_eq!(window.bytes(), b"23456789");
        assert_eq!(window.total(), 10);
        assert_eq!(window.absolute(0), 2);
        window.push(b"ab");
        assert_eq!(window.bytes(), b"456789ab");
        assert_eq!(window.absolute(7), 11);
    }

    #[test]
    fn test_same_occurrence_fires_once() {
        let a = action(Pattern::literal("A"));
        let mut state = SessionState::default();
        let mut window = MatchWindow::default();
        window.push(b"xA");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), Some(1));
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), None);
        // New bytes that do not move the first occurrence.
        window.push(b"yyy");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), None);
    }

    #[test]
    fn test_new_occurrence_after_eviction_fires() {
        let a = action(Pattern::literal("=> "));
        let mut state = SessionState::default();
        let mut window = MatchWindow::with_capacity(16);
        window.push(b"=> ");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), Some(0));
        // Push the first prompt out of the window, then print a new one.
        window.push(b"0123456789abcdef=> ");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), Some(19));
        assert_eq!(state.last_match(ActionId(0)), Some(19));
    }

    #[test]
    fn test_longer_alternative_completed_by_next_chunk() {
        let a = action(Pattern::regex("abcd|c").unwrap());
        let mut state = SessionState::default();
        let mut window = MatchWindow::default();
        window.push(b"abc");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), Some(2));
        // Now "abcd" matches first, starting before the recorded offset.
        window.push(b"d");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), None);
        assert_eq!(state.last_match(ActionId(0)), Some(2));
    }

    #[test]
    fn test_fired_oneshot_is_skipped() {
        let a = action(Pattern::literal("A"));
        let mut state = SessionState::default();
        state.mark_fired(ActionId(0));
        let mut window = MatchWindow::default();
        window.push(b"A");
        assert_eq!(poll(ActionId(0), &a, &window, &mut state), None);
    }
}
