//! Sans-IO IRC session state machine.
//!
//! [`IrcMachine`] performs no I/O. It consumes parsed messages and timer
//! expiries and produces [`Action`]s: lines to write, chat messages to hand to
//! the bot client, and lifecycle transitions. The protocol layer owns the
//! connection and the timers and carries the actions out.
//!
//! # Example
//!
//! ```
//! use slirc_bot::message::RawMessage;
//! use slirc_bot::protocol::config::IrcConfig;
//! use slirc_bot::state::{Action, IrcMachine, RegistrationState};
//!
//! let mut machine = IrcMachine::new(IrcConfig::new("testbot"));
//!
//! // Connected: probe for capabilities and extensions.
//! let actions = machine.start();
//! assert_eq!(actions[0], Action::Send("CAP LS 302".to_string()));
//!
//! // Feed server responses.
//! let ls = RawMessage::parse(":server CAP * LS :multi-prefix").unwrap();
//! let _ = machine.feed(&ls);
//! assert_eq!(machine.state(), RegistrationState::Registering);
//! ```

mod handlers;
mod machine;

pub use machine::IrcMachine;

use crate::caps::Capabilities;
use crate::chat::ChatMessage;
use crate::isupport::{ChanModes, Features};
use crate::util::LineLimits;

/// Where the session is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegistrationState {
    /// No transport connection.
    #[default]
    Disconnected,
    /// Sent `CAP LS 302` and the extension probe, awaiting a reply.
    Probing,
    /// Sent USER/NICK, awaiting end of MOTD.
    Registering,
    /// Registration complete.
    Ready,
}

/// Something the protocol layer has to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write this line (without terminator) to the server.
    Send(String),
    /// Hand this chat message to the bot client.
    Deliver(ChatMessage),
    /// Probing is over; the probe timer is no longer needed.
    Registering,
    /// Registration completed; the registration timer is no longer needed.
    Ready,
}

/// What the session has learned about the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub registration_complete: bool,
    /// RPL_WELCOME was received; the nickname is settled.
    pub welcomed: bool,
    /// The server answered the capability probe.
    pub has_capabilities: bool,
    /// The server answered the IRCX probe (numeric 800).
    pub has_extensions: bool,
    /// RPL_ISUPPORT tokens.
    pub features: Features,
    pub capabilities: Capabilities,
    /// Server name from RPL_MYINFO.
    pub host: Option<String>,
    /// Server software version from RPL_MYINFO.
    pub software: Option<String>,
    pub limits: LineLimits,
}

impl ServerInfo {
    /// Longest untagged line that may be written, terminator included.
    pub fn max_len(&self) -> usize {
        self.limits.body
    }

    /// Network name from ISUPPORT `NETWORK`.
    pub fn network(&self) -> Option<&str> {
        self.features.network()
    }

    pub fn chanmodes(&self) -> Option<ChanModes<'_>> {
        self.features.chanmodes()
    }

    pub fn is_channel(&self, target: &str) -> bool {
        self.features.is_channel(target)
    }

    /// Recompute line limits from acknowledged capabilities and `LINELEN`.
    pub(crate) fn update_limits(&mut self) {
        let mut limits = if self.capabilities.is_enabled(crate::caps::MESSAGE_TAGS) {
            LineLimits::with_message_tags()
        } else {
            LineLimits::default()
        };
        if let Some(line_len) = self.features.line_len() {
            limits = limits.with_line_len(line_len);
        }
        self.limits = limits;
    }
}
