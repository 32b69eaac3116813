//! Streaming secret redaction, correct across arbitrary chunk boundaries.

/// Replacement text substituted for every secret token occurrence.
pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

/// One-shot redaction for already-complete strings (command lines, messages).
#[must_use]
pub fn redact_text(text: &str, tokens: &[String]) -> String {
    let mut out = text.to_string();
    for token in tokens {
        if !token.is_empty() && out.contains(token.as_str()) {
            out = out.replace(token.as_str(), REDACTION_PLACEHOLDER);
        }
    }
    out
}

/// Redacts secret tokens from a byte stream fed in arbitrary chunks.
///
/// Two kinds of state survive between chunks: a carry of trailing bytes that
/// form an incomplete UTF-8 sequence, and a tail of the last `L - 1`
/// characters of substituted text (`L` being the longest token length), held
/// back because a token occurrence may still be completed by the next chunk.
/// `feed` returns the text that is safe to emit now; `flush` drains what
/// remains once the stream ends.
pub struct StreamRedactor {
    tokens: Vec<String>,
    hold_chars: usize,
    tail: String,
    carry: Vec<u8>,
}

impl StreamRedactor {
    #[must_use]
    pub fn new(tokens: Vec<String>) -> Self {
        let tokens: Vec<String> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        let hold_chars = tokens.iter().map(|t| t.chars().count()).max().unwrap_or(0);
        Self {
            tokens,
            hold_chars,
            tail: String::new(),
            carry: Vec::new(),
        }
    }

    /// Feed one chunk; returns the redacted text that can no longer be part
    /// of a token match.
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);
        let text = self.decode(&bytes);
        if self.tokens.is_empty() {
            return text;
        }
        let mut window = std::mem::take(&mut self.tail);
        window.push_str(&text);
        let substituted = redact_text(&window, &self.tokens);
        if self.hold_chars < 2 {
            return substituted;
        }
        let keep = self.hold_chars - 1;
        let char_count = substituted.chars().count();
        if char_count <= keep {
            self.tail = substituted;
            return String::new();
        }
        let split_at = substituted
            .char_indices()
            .nth(char_count - keep)
            .map_or(substituted.len(), |(i, _)| i);
        self.tail = substituted[split_at..].to_string();
        substituted[..split_at].to_string()
    }

    /// Drain held-back text at end of stream. An incomplete trailing UTF-8
    /// sequence is emitted lossily since no continuation can arrive.
    pub fn flush(&mut self) -> String {
        let mut out = std::mem::take(&mut self.tail);
        if !self.carry.is_empty() {
            out.push_str(&String::from_utf8_lossy(&self.carry));
            self.carry.clear();
        }
        out
    }

    /// Decode bytes, replacing invalid sequences and carrying an incomplete
    /// trailing sequence over to the next chunk.
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push('\u{FFFD}');
                            rest = &rest[valid + len..];
                        }
                        None => {
                            self.carry = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(tokens: &[&str]) -> StreamRedactor {
        StreamRedactor::new(tokens.iter().map(|t| (*t).to_string()).collect())
    }

    fn drive(tokens: &[&str], chunks: &[&str]) -> String {
        let mut r = redactor(tokens);
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&r.feed(chunk.as_bytes()));
        }
        out.push_str(&r.flush());
        out
    }

    #[test]
    fn token_split_across_chunks_is_redacted() {
        assert_eq!(drive(&["sekret"], &["a se", "kret b"]), "a [REDACTED] b");
    }

    #[test]
    fn token_split_one_byte_per_chunk() {
        let chunks: Vec<&str> = "xsekrety".split("").filter(|s| !s.is_empty()).collect();
        assert_eq!(drive(&["sekret"], &chunks), "x[REDACTED]y");
    }

    #[test]
    fn empty_token_list_passes_through() {
        assert_eq!(drive(&[], &["hello ", "world"]), "hello world");
    }

    #[test]
    fn multiple_occurrences_in_one_chunk() {
        assert_eq!(drive(&["tok"], &["tok and tok"]), "[REDACTED] and [REDACTED]");
    }

    #[test]
    fn multiple_tokens_applied_in_order() {
        assert_eq!(drive(&["aa", "bb"], &["aa-bb-cc"]), "[REDACTED]-[REDACTED]-cc");
    }

    #[test]
    fn incomplete_utf8_sequence_carries_over() {
        let mut r = redactor(&[]);
        let bytes = "héllo".as_bytes();
        let mut out = r.feed(&bytes[..2]);
        out.push_str(&r.feed(&bytes[2..]));
        out.push_str(&r.flush());
        assert_eq!(out, "héllo");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut r = redactor(&[]);
        let mut out = r.feed(&[b'a', 0xFF, b'b']);
        out.push_str(&r.flush());
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn truncated_trailing_sequence_flushes_lossily() {
        let mut r = redactor(&[]);
        let mut out = r.feed(&[b'a', 0xC3]);
        out.push_str(&r.flush());
        assert_eq!(out, "a\u{FFFD}");
    }

    #[test]
    fn single_char_token_emits_immediately() {
        let mut r = redactor(&["x"]);
        assert_eq!(r.feed(b"axb"), "a[REDACTED]b");
        assert_eq!(r.flush(), "");
    }

    #[test]
    fn tail_never_exceeds_longest_token_minus_one() {
        let mut r = redactor(&["sekret"]);
        let emitted = r.feed(b"0123456789");
        assert_eq!(emitted, "01234");
        assert_eq!(r.flush(), "56789");
    }

    #[test]
    fn one_shot_redaction_of_command_line() {
        let tokens = vec!["hunter2".to_string()];
        assert_eq!(
            redact_text("login --password hunter2", &tokens),
            "login --password [REDACTED]"
        );
    }
}
