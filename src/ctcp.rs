//! CTCP (Client-to-Client Protocol) message handling.
//!
//! CTCP requests and replies travel inside PRIVMSG and NOTICE bodies,
//! delimited by the `\x01` marker byte. A PRIVMSG carries a query, a NOTICE
//! carries the response.
//!
//! ```
//! use slirc_bot::ctcp::Ctcp;
//!
//! let ctcp = Ctcp::parse("\x01PING 12345\x01").unwrap();
//! assert_eq!(ctcp.command, "PING");
//! assert_eq!(ctcp.parameters, Some("12345"));
//! assert_eq!(ctcp.to_string(), "\x01PING 12345\x01");
//! ```

use std::fmt;

/// The CTCP delimiter byte.
pub const CTCP_DELIM: char = '\x01';

/// Queries this client answers, as listed in a CLIENTINFO reply.
pub const SUPPORTED_QUERIES: &str = "ACTION CLIENTINFO PING TIME VERSION";

/// A CTCP message extracted from a chat body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The CTCP command, as sent.
    pub command: &'a str,
    /// Everything after the first space, absent when there was no space.
    pub parameters: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Extract a CTCP message from a PRIVMSG/NOTICE body.
    ///
    /// Returns `None` unless the body starts with the marker byte. A closing
    /// marker is stripped when present.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.strip_prefix(CTCP_DELIM)?;
        let text = text.strip_suffix(CTCP_DELIM).unwrap_or(text);

        let (command, parameters) = match text.split_once(' ') {
            Some((command, parameters)) => (command, Some(parameters)),
            None => (text, None),
        };

        Some(Self {
            command,
            parameters,
        })
    }

    /// Case-insensitive command comparison.
    pub fn is(&self, command: &str) -> bool {
        self.command.eq_ignore_ascii_case(command)
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CTCP_DELIM, self.command)?;
        if let Some(parameters) = self.parameters {
            write!(f, " {}", parameters)?;
        }
        write!(f, "{}", CTCP_DELIM)
    }
}
