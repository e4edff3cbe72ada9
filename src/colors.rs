//! IRC formatting code handling.
//!
//! Chat bodies may carry mIRC-style formatting control bytes. Commands are
//! matched against the plain text, so these are stripped before a message is
//! handed to bot modules.
//!
//! # IRC Format Codes
//! - 0x02: Bold
//! - 0x03: Color, followed by up to two foreground digits and an optional
//!   comma with up to two background digits
//! - 0x04: Hex color, followed by exactly six bytes
//! - 0x0F: Reset
//! - 0x11: Monospace
//! - 0x16: Reverse
//! - 0x19: Texticon, followed by everything up to the next space
//! - 0x1D: Italic
//! - 0x1E: Strikethrough
//! - 0x1F: Underline

use std::borrow::Cow;

pub const BOLD: u8 = 0x02;
pub const COLOR: u8 = 0x03;
pub const HEX_COLOR: u8 = 0x04;
pub const RESET: u8 = 0x0F;
pub const MONOSPACE: u8 = 0x11;
pub const REVERSE: u8 = 0x16;
pub const TEXTICON: u8 = 0x19;
pub const ITALIC: u8 = 0x1D;
pub const STRIKETHROUGH: u8 = 0x1E;
pub const UNDERLINE: u8 = 0x1F;

/// Bytes consumed after a hex color code.
const HEX_COLOR_LEN: usize = 6;

/// Extension trait for handling formatted IRC strings.
pub trait FormattedStringExt<'a> {
    /// Check if the string contains any control bytes.
    fn is_formatted(&self) -> bool;

    /// Strip all IRC formatting codes (and their parameters) from the string.
    ///
    /// Returns `Cow::Borrowed` if no control bytes were present.
    fn strip_formatting(self) -> Cow<'a, str>;
}

impl<'a> FormattedStringExt<'a> for &'a str {
    fn is_formatted(&self) -> bool {
        self.bytes().any(|b| b < 0x20)
    }

    fn strip_formatting(self) -> Cow<'a, str> {
        if !self.is_formatted() {
            return Cow::Borrowed(self);
        }
        Cow::Owned(strip_formatting(self))
    }
}

/// Remove formatting control bytes from `text`.
///
/// Bytes at or above 0x20 outside a code's parameter run are kept verbatim.
/// Control bytes that are not formatting codes are dropped as well.
pub fn strip_formatting(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        match b {
            COLOR => {
                i += count_digits(&bytes[i..]);
                if bytes.get(i) == Some(&b',') {
                    i += 1;
                    i += count_digits(&bytes[i..]);
                }
            }
            HEX_COLOR => i = (i + HEX_COLOR_LEN).min(bytes.len()),
            TEXTICON => {
                i += bytes[i..]
                    .iter()
                    .position(|&c| c == b' ')
                    .unwrap_or(bytes.len() - i);
            }
            BOLD | RESET | MONOSPACE | REVERSE | ITALIC | STRIKETHROUGH | UNDERLINE => {}
            b if b >= 0x20 => out.push(b),
            _ => {}
        }
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Number of leading ASCII digits, at most two.
fn count_digits(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take(2)
        .take_while(|b| b.is_ascii_digit())
        .count()
}
