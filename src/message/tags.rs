//! IRCv3 message tag value unescaping.

/// Decode an escaped tag value from the wire.
///
/// `\:` becomes `;`, `\s` a space, `\\` a backslash, `\r` and `\n` CR and LF.
/// Any other escaped character stands for itself and a lone trailing
/// backslash is dropped.
pub fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}
