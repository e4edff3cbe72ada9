//! IRCv3 capability negotiation, client side.
//!
//! Tracks what the server advertises through `CAP LS` (possibly spread over
//! several lines) and `CAP NEW`/`DEL`, and what it acknowledged through
//! `CAP ACK`.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::{BTreeMap, HashSet};

/// Capability whose acknowledgement raises the line length allowance.
pub const MESSAGE_TAGS: &str = "message-tags";

/// CAP subcommands a client receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapSubcommand {
    Ls,
    List,
    Ack,
    Nak,
    New,
    Del,
    Unknown(String),
}

impl From<&str> for CapSubcommand {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "LS" => Self::Ls,
            "LIST" => Self::List,
            "ACK" => Self::Ack,
            "NAK" => Self::Nak,
            "NEW" => Self::New,
            "DEL" => Self::Del,
            _ => Self::Unknown(s.to_owned()),
        }
    }
}

/// Split a capability list into names and optional values.
///
/// `"sasl=PLAIN,EXTERNAL message-tags"` yields `("sasl", Some("PLAIN,EXTERNAL"))`
/// and `("message-tags", None)`.
pub fn parse_cap_list(list: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    list.split_whitespace().map(|cap| match cap.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (cap, None),
    })
}

/// Apply capability changes to an active set.
///
/// Changes prefixed with '-' remove capabilities, others add them.
/// Returns true if any changes were made.
pub fn apply_changes<S: AsRef<str>>(capabilities: &mut HashSet<String>, changes: &[S]) -> bool {
    let mut modified = false;

    for change in changes {
        let change = change.as_ref();
        if let Some(cap_name) = change.strip_prefix('-') {
            if capabilities.remove(cap_name) {
                modified = true;
            }
        } else if capabilities.insert(change.to_owned()) {
            modified = true;
        }
    }

    modified
}

/// Capability state for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Advertised capabilities and their values.
    advertised: BTreeMap<String, Option<String>>,
    /// Capabilities the server acknowledged.
    enabled: HashSet<String>,
    /// Set while a multi-line `CAP LS` reply is in progress.
    ls_in_progress: bool,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one `CAP LS` line.
    ///
    /// `params` are the CAP message parameters after the target, starting at
    /// the subcommand. Returns `true` once the terminal line has been seen,
    /// meaning no `*` continuation marker preceded the list.
    pub fn accumulate_ls<S: AsRef<str>>(&mut self, params: &[S]) -> bool {
        if !self.ls_in_progress {
            self.advertised.clear();
        }
        let Some(list) = params.last() else {
            self.ls_in_progress = false;
            return true;
        };
        for (name, value) in parse_cap_list(list.as_ref()) {
            self.advertised
                .insert(name.to_owned(), value.map(str::to_owned));
        }

        let more = params.len() >= 2 && params[params.len() - 2].as_ref() == "*";
        self.ls_in_progress = more;
        !more
    }

    /// Record capabilities announced through `CAP NEW`.
    pub fn add_advertised(&mut self, list: &str) -> Vec<String> {
        parse_cap_list(list)
            .map(|(name, value)| {
                self.advertised
                    .insert(name.to_owned(), value.map(str::to_owned));
                name.to_owned()
            })
            .collect()
    }

    /// Drop capabilities withdrawn through `CAP DEL`.
    pub fn remove_advertised(&mut self, list: &str) {
        for (name, _) in parse_cap_list(list) {
            self.advertised.remove(name);
            self.enabled.remove(name);
        }
    }

    /// Record a `CAP ACK` list.
    pub fn acknowledge(&mut self, list: &str) -> bool {
        let changes: Vec<&str> = list.split_whitespace().collect();
        apply_changes(&mut self.enabled, &changes)
    }

    pub fn is_advertised(&self, name: &str) -> bool {
        self.advertised.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.advertised.get(name).and_then(|v| v.as_deref())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    /// Which of `wanted` the server advertised, in the order given.
    pub fn select<'a, S: AsRef<str>>(&self, wanted: &'a [S]) -> Vec<&'a str> {
        wanted
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| self.is_advertised(name) && !self.is_enabled(name))
            .collect()
    }

    pub fn advertised(&self) -> impl Iterator<Item = &str> {
        self.advertised.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_from_str() {
        assert_eq!(CapSubcommand::from("ls"), CapSubcommand::Ls);
        assert_eq!(CapSubcommand::from("ACK"), CapSubcommand::Ack);
        assert_eq!(
            CapSubcommand::from("FOO"),
            CapSubcommand::Unknown("FOO".to_string())
        );
    }

    #[test]
    fn test_parse_cap_list() {
        let caps: Vec<_> = parse_cap_list("sasl=PLAIN,EXTERNAL  message-tags").collect();
        assert_eq!(
            caps,
            vec![("sasl", Some("PLAIN,EXTERNAL")), ("message-tags", None)]
        );
    }

    #[test]
    fn test_single_line_ls() {
        let mut caps = Capabilities::new();
        assert!(caps.accumulate_ls(&["LS", "multi-prefix message-tags"]));
        assert!(caps.is_advertised("message-tags"));
        assert!(caps.is_advertised("multi-prefix"));
    }

    #[test]
    fn test_multi_line_ls_accumulates() {
        let mut caps = Capabilities::new();
        assert!(!caps.accumulate_ls(&["LS", "*", "multi-prefix sasl=PLAIN"]));
        assert!(caps.accumulate_ls(&["LS", "message-tags"]));
        assert!(caps.is_advertised("multi-prefix"));
        assert!(caps.is_advertised("message-tags"));
        assert_eq!(caps.value("sasl"), Some("PLAIN"));

        // A fresh LS replaces the previous list.
        assert!(caps.accumulate_ls(&["LS", "batch"]));
        assert!(!caps.is_advertised("sasl"));
    }

    #[test]
    fn test_ack_and_del() {
        let mut caps = Capabilities::new();
        caps.accumulate_ls(&["LS", "message-tags batch"]);
        assert!(caps.acknowledge("message-tags batch"));
        assert!(caps.is_enabled("message-tags"));

        assert!(caps.acknowledge("-batch"));
        assert!(!caps.is_enabled("batch"));

        caps.remove_advertised("message-tags");
        assert!(!caps.is_enabled("message-tags"));
        assert!(!caps.is_advertised("message-tags"));
    }

    #[test]
    fn test_select_wanted() {
        let mut caps = Capabilities::new();
        caps.accumulate_ls(&["LS", "message-tags server-time"]);
        let wanted = ["message-tags", "echo-message", "server-time"];
        assert_eq!(caps.select(&wanted), vec!["message-tags", "server-time"]);

        caps.acknowledge("message-tags");
        assert_eq!(caps.select(&wanted), vec!["server-time"]);
    }

    #[test]
    fn test_apply_changes() {
        let mut caps = HashSet::new();
        assert!(apply_changes(&mut caps, &["multi-prefix", "sasl"]));
        assert!(!apply_changes(&mut caps, &["sasl"]));
        assert!(apply_changes(&mut caps, &["-sasl"]));
        assert!(!caps.contains("sasl"));
    }
}
