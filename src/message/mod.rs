//! Structured IRC messages and the line parser.
//!
//! A line is split at its trailing parameter marker (`" :"`) first, then the
//! head is tokenized into tags, source, command and middle parameters. The
//! trailing parameter, or an empty string when none was present, is always
//! appended as the final parameter.

mod nom_parser;
pub mod tags;

use std::fmt;

use crate::error::MessageParseError;

use self::tags::unescape_tag_value;

/// A single IRCv3 message tag: key and optional value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub String, pub Option<String>);

impl Tag {
    /// Tag key, including any vendor prefix or client-only `+` marker.
    pub fn key(&self) -> &str {
        &self.0
    }

    /// Unescaped tag value, if one was given.
    pub fn value(&self) -> Option<&str> {
        self.1.as_deref()
    }
}

/// The source (prefix) of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    /// Source text as received, without the leading `:`.
    pub raw: String,
    /// Nickname, or the server name for server-originated messages.
    pub nick: String,
    /// Username, when the source contained `!`.
    pub user: Option<String>,
    /// Hostname, when the source contained `@` after the `!`.
    pub host: Option<String>,
}

impl Source {
    /// Split a source into nick, user and host.
    ///
    /// Accepts `nick!user@host`, `nick!user`, `nick@host` and bare names.
    pub fn parse(raw: &str) -> Self {
        let (nick, user, host) = match raw.split_once('!') {
            Some((nick, rest)) => match rest.split_once('@') {
                Some((user, host)) => (nick, Some(user.to_owned()), Some(host.to_owned())),
                None => (nick, Some(rest.to_owned()), None),
            },
            None => match raw.split_once('@') {
                Some((nick, host)) => (nick, None, Some(host.to_owned())),
                None => (raw, None, None),
            },
        };

        Self {
            raw: raw.to_owned(),
            nick: nick.to_owned(),
            user,
            host,
        }
    }
}

/// A parsed IRC line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    /// The line as received, without its terminator.
    pub raw: String,
    /// Message tags in wire order.
    pub tags: Vec<Tag>,
    /// Message source, if one was present.
    pub source: Option<Source>,
    /// Uppercased textual command or a three digit numeric.
    pub command: String,
    /// Parameters in order; the last entry is always the trailing parameter
    /// (empty when the line had none).
    pub parameters: Vec<String>,
    /// Whether the line carried an explicit trailing parameter.
    pub last_parameter_is_trailing: bool,
}

impl RawMessage {
    /// Parse a single line with its terminator already stripped.
    pub fn parse(line: &str) -> Result<Self, MessageParseError> {
        if line.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let (head, trailing) = split_trailing(line);

        let (_, parsed) =
            nom_parser::parse_head(head).map_err(|_| MessageParseError::MissingCommand)?;
        if !parsed.rest.is_empty() {
            return Err(MessageParseError::InvalidCommand(format!(
                "{}{}",
                parsed.command, parsed.rest
            )));
        }

        let command = normalize_command(parsed.command)?;

        let mut parameters: Vec<String> = parsed.params.iter().map(|p| (*p).to_owned()).collect();
        parameters.push(trailing.unwrap_or_default().to_owned());

        Ok(Self {
            raw: line.to_owned(),
            tags: parsed.tags.map(parse_tags).unwrap_or_default(),
            source: parsed.source.map(Source::parse),
            command,
            parameters,
            last_parameter_is_trailing: trailing.is_some(),
        })
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }

    /// The final (trailing) parameter. Always present.
    pub fn trailing(&self) -> &str {
        self.parameters.last().map(String::as_str).unwrap_or_default()
    }

    /// Value of the first tag named `key`.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key() == key)
            .and_then(Tag::value)
    }

    /// Nickname of the source, if any.
    pub fn source_nick(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.nick.as_str())
    }

    /// Whether the command is a three digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }
}

impl std::str::FromStr for RawMessage {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a line into head and trailing parameter at the first `" :"`.
///
/// When the line starts with tags, the search starts after the tags token so
/// that tag values cannot produce a false match.
fn split_trailing(line: &str) -> (&str, Option<&str>) {
    let search_from = if line.starts_with('@') {
        line.find(' ').map_or(line.len(), |space| space + 1)
    } else {
        0
    };

    match line[search_from..].find(" :") {
        Some(offset) => {
            let at = search_from + offset;
            (&line[..at], Some(&line[at + 2..]))
        }
        None => (line, None),
    }
}

fn normalize_command(token: &str) -> Result<String, MessageParseError> {
    if token.bytes().all(|b| b.is_ascii_digit()) {
        if token.len() == 3 {
            return Ok(token.to_owned());
        }
        return Err(MessageParseError::InvalidCommand(token.to_owned()));
    }
    Ok(token.to_ascii_uppercase())
}

fn parse_tags(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => Tag(key.to_owned(), Some(unescape_tag_value(value))),
            None => Tag(pair.to_owned(), None),
        })
        .collect()
}
