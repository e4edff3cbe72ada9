//! Length limits and safe string truncation.

/// Maximum length for an IRC message body including CR LF, without tags.
pub const MAX_MESSAGE_BODY: usize = 512;

/// Maximum length of the tags section the server may send.
pub const MAX_TAGS_LENGTH: usize = 8191;

/// Maximum length of the tags section a client may send.
pub const MAX_CLIENT_TAGS_LENGTH: usize = 4096;

/// Line length limits currently in force for one session.
///
/// The body (everything after the tags section) is limited on its own; the
/// tag allowances only apply to lines that carry tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineLimits {
    /// Longest line body, terminator included.
    pub body: usize,
    /// Tags section allowed on lines from the server.
    pub inbound_tags: usize,
    /// Tags section allowed on lines written to the server.
    pub outbound_tags: usize,
}

impl Default for LineLimits {
    fn default() -> Self {
        Self {
            body: MAX_MESSAGE_BODY,
            inbound_tags: 0,
            outbound_tags: 0,
        }
    }
}

impl LineLimits {
    /// Limits once `message-tags` has been acknowledged.
    pub fn with_message_tags() -> Self {
        Self {
            body: MAX_MESSAGE_BODY,
            inbound_tags: MAX_TAGS_LENGTH,
            outbound_tags: MAX_CLIENT_TAGS_LENGTH,
        }
    }

    /// Use an advertised `LINELEN` as the body limit, keeping any tag
    /// allowance already granted.
    pub fn with_line_len(self, line_len: usize) -> Self {
        Self {
            body: line_len,
            ..self
        }
    }

    /// Longest line accepted from the server, tags and terminator included.
    pub fn inbound(&self) -> usize {
        self.body + self.inbound_tags
    }

    /// Whether `line` (without terminator) may be written to the server.
    pub fn fits_outbound(&self, line: &str) -> bool {
        let (tags, body) = match line.strip_prefix('@') {
            Some(rest) => match rest.split_once(' ') {
                // '@' and the separating space count against the tags.
                Some((tags, body)) => (tags.len() + 2, body),
                None => return false,
            },
            None => (0, line),
        };
        tags <= self.outbound_tags && body.len() + 2 <= self.body
    }
}

/// Truncates a string to at most `max_bytes` bytes without breaking
/// a multi-byte UTF-8 codepoint at the end.
///
/// # Examples
///
/// ```
/// use slirc_bot::util::truncate_utf8_safe;
///
/// assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
///
/// // Multi-byte chars are not split
/// let truncated = truncate_utf8_safe("Hello 👋 World", 8);
/// assert_eq!(truncated, "Hello ");
///
/// assert_eq!(truncate_utf8_safe("hi", 10), "hi");
/// ```
#[inline]
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_utf8_safe_ascii() {
        assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
        assert_eq!(truncate_utf8_safe("hello", 10), "hello");
        assert_eq!(truncate_utf8_safe("", 5), "");
        assert_eq!(truncate_utf8_safe("hello", 0), "");
    }

    #[test]
    fn test_truncate_utf8_safe_multibyte() {
        // é is 2 bytes
        assert_eq!(truncate_utf8_safe("café", 4), "caf");
        assert_eq!(truncate_utf8_safe("café", 5), "café");

        // 👋 is 4 bytes
        assert_eq!(truncate_utf8_safe("Hi👋", 3), "Hi");
        assert_eq!(truncate_utf8_safe("Hi👋", 6), "Hi👋");

        assert_eq!(truncate_utf8_safe("日本語", 7), "日本");
    }

    #[test]
    fn test_line_limits() {
        let plain = LineLimits::default();
        assert_eq!(plain.body, 512);
        assert_eq!(plain.inbound(), 512);

        let tagged = LineLimits::with_message_tags();
        assert_eq!(tagged.body, 512);
        assert_eq!(tagged.inbound(), 512 + 8191);

        let wide = tagged.with_line_len(1024);
        assert_eq!(wide.body, 1024);
        assert_eq!(wide.inbound(), 1024 + 8191);
        assert_eq!(wide.outbound_tags, 4096);
    }

    #[test]
    fn test_tag_allowance_only_covers_tags() {
        let tagged = LineLimits::with_message_tags();
        let body = format!("PRIVMSG #x :{}", "a".repeat(498));
        assert_eq!(body.len() + 2, 512);
        assert!(tagged.fits_outbound(&body));
        assert!(!tagged.fits_outbound(&format!("{body}a")));

        let tags = format!("@+draft/reply={}", "r".repeat(3000));
        assert!(tagged.fits_outbound(&format!("{tags} {body}")));
        assert!(!tagged.fits_outbound(&format!("{tags} {body}a")));
        assert!(!LineLimits::default().fits_outbound(&format!("{tags} TAGMSG #x")));
        assert!(!tagged.fits_outbound(&format!("@{}", "t".repeat(5000))));
    }
}
