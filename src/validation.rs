//! Validation of outbound message parts.
//!
//! A target or text containing a line break would let a caller smuggle a
//! second command onto the wire, so these checks run before any PRIVMSG or
//! NOTICE is composed.

/// Validation error for IRC protocol elements.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Input is empty.
    Empty,
    /// Input is longer than allowed.
    TooLong { max: usize, actual: usize },
    /// A character that may not appear in this element.
    InvalidChar { ch: char, position: usize },
    /// First character is invalid.
    InvalidFirstChar { ch: char },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Empty => write!(f, "input is empty"),
            ValidationError::TooLong { max, actual } => {
                write!(f, "input too long: {} > {}", actual, max)
            }
            ValidationError::InvalidChar { ch, position } => {
                write!(f, "invalid character {:?} at position {}", ch, position)
            }
            ValidationError::InvalidFirstChar { ch } => {
                write!(f, "invalid first character {:?}", ch)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check if a character is a protocol control character (NUL, CR, LF).
#[inline]
pub fn is_protocol_control_char(c: char) -> bool {
    matches!(c, '\0' | '\r' | '\n')
}

/// Validate a message target (channel or nickname).
///
/// Targets may not be empty and may not contain a space, NUL, CR or LF.
///
/// ```
/// use slirc_bot::validation::validate_target;
///
/// assert!(validate_target("#rust").is_ok());
/// assert!(validate_target("some nick").is_err());
/// assert!(validate_target("#x\r\nQUIT").is_err());
/// ```
pub fn validate_target(target: &str) -> Result<(), ValidationError> {
    if target.is_empty() {
        return Err(ValidationError::Empty);
    }
    match target
        .chars()
        .enumerate()
        .find(|(_, c)| *c == ' ' || is_protocol_control_char(*c))
    {
        Some((position, ch)) => Err(ValidationError::InvalidChar { ch, position }),
        None => Ok(()),
    }
}

/// Validate message text: no NUL, CR or LF. Formatting codes are allowed.
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    match text
        .chars()
        .enumerate()
        .find(|(_, c)| is_protocol_control_char(*c))
    {
        Some((position, ch)) => Err(ValidationError::InvalidChar { ch, position }),
        None => Ok(()),
    }
}

/// Validate a single protocol line about to be written.
pub fn validate_message_line(line: &str) -> Result<(), ValidationError> {
    for (i, c) in line.chars().enumerate() {
        if is_protocol_control_char(c) {
            return Err(ValidationError::InvalidChar { ch: c, position: i });
        }
    }
    Ok(())
}

/// Validate a nickname per RFC 2812 with a custom maximum length.
pub fn validate_nickname_with_max_len(nick: &str, max_len: usize) -> Result<(), ValidationError> {
    let mut chars = nick.chars();
    let Some(first) = chars.next() else {
        return Err(ValidationError::Empty);
    };

    let len = nick.chars().count();
    if len > max_len {
        return Err(ValidationError::TooLong {
            max: max_len,
            actual: len,
        });
    }

    if !is_valid_nick_first_char(first) {
        return Err(ValidationError::InvalidFirstChar { ch: first });
    }

    for (i, c) in chars.enumerate() {
        if !is_valid_nick_char(c) {
            return Err(ValidationError::InvalidChar {
                ch: c,
                position: i + 1,
            });
        }
    }

    Ok(())
}

/// Validate a nickname with the common 50 character ceiling.
pub fn validate_nickname(nick: &str) -> Result<(), ValidationError> {
    validate_nickname_with_max_len(nick, 50)
}

#[inline]
pub fn is_valid_nick_first_char(c: char) -> bool {
    c.is_ascii_alphabetic() || is_nick_special_char(c)
}

#[inline]
pub fn is_valid_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_nick_special_char(c) || c == '-'
}

/// Special chars per RFC 2812: `[ ] \ ` _ ^ { | }`.
#[inline]
pub fn is_nick_special_char(c: char) -> bool {
    let code = c as u32;
    (0x5B..=0x60).contains(&code) || (0x7B..=0x7D).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("#channel").is_ok());
        assert!(validate_target("nick").is_ok());
        assert_eq!(validate_target(""), Err(ValidationError::Empty));
        assert_eq!(
            validate_target("two words"),
            Err(ValidationError::InvalidChar { ch: ' ', position: 3 })
        );
        assert!(validate_target("nick\n").is_err());
        assert!(validate_target("nick\r").is_err());
        assert!(validate_target("ni\0ck").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("hello world").is_ok());
        assert!(validate_text("").is_ok());
        assert!(validate_text("\x02bold\x02").is_ok());
        assert!(validate_text("a\r\nQUIT :bye").is_err());
        assert_eq!(
            validate_text("hi\0there"),
            Err(ValidationError::InvalidChar { ch: '\0', position: 2 })
        );
    }

    #[test]
    fn test_validate_message_line() {
        assert!(validate_message_line("PRIVMSG #x :hi").is_ok());
        assert!(validate_message_line("NICK a\0b").is_err());
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("Nick").is_ok());
        assert!(validate_nickname("bot_").is_ok());
        assert!(validate_nickname("[test]").is_ok());
        assert_eq!(validate_nickname(""), Err(ValidationError::Empty));
        assert_eq!(
            validate_nickname("9bot"),
            Err(ValidationError::InvalidFirstChar { ch: '9' })
        );
        assert!(validate_nickname("bad nick").is_err());
        assert!(matches!(
            validate_nickname_with_max_len("toolongnick", 9),
            Err(ValidationError::TooLong { max: 9, actual: 11 })
        ));
    }

    #[test]
    fn test_nick_special_chars() {
        for c in ['[', ']', '\\', '`', '_', '^', '{', '|', '}'] {
            assert!(is_nick_special_char(c), "{c:?}");
        }
        assert!(!is_nick_special_char('a'));
    }
}
