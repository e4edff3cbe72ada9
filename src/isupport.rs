//! RPL_ISUPPORT (005) feature tracking.
//!
//! Servers advertise their limits and features as `KEY=VALUE` or bare `KEY`
//! tokens spread over one or more 005 replies. A token prefixed with `-`
//! withdraws a previously advertised key.

use std::collections::BTreeMap;

/// Literal final parameter that marks a 005 reply as RPL_ISUPPORT rather
/// than the RFC 2812 RPL_BOUNCE.
pub const ISUPPORT_TAIL: &str = "are supported by this server";

/// Channel prefixes assumed until the server sends `CHANTYPES`.
pub const DEFAULT_CHANTYPES: &str = "#&";

/// Features advertised by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Features {
    entries: BTreeMap<String, String>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the parameters of a 005 reply.
    ///
    /// The first parameter (our nickname) and the final descriptive parameter
    /// are skipped. Returns `false` without touching the map when the reply
    /// is not RPL_ISUPPORT.
    pub fn apply_reply<S: AsRef<str>>(&mut self, params: &[S]) -> bool {
        match params.last() {
            Some(last) if last.as_ref() == ISUPPORT_TAIL => {}
            _ => return false,
        }
        if params.len() > 2 {
            self.apply_tokens(&params[1..params.len() - 1]);
        }
        true
    }

    /// Apply raw feature tokens in order.
    pub fn apply_tokens<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens {
            let token = token.as_ref();
            if token.is_empty() {
                continue;
            }
            if let Some(key) = token.strip_prefix('-') {
                self.entries.remove(key);
                continue;
            }
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            self.entries.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Value of `key`; bare tokens map to an empty string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK").filter(|v| !v.is_empty())
    }

    pub fn chantypes(&self) -> &str {
        self.get("CHANTYPES").unwrap_or(DEFAULT_CHANTYPES)
    }

    pub fn chanmodes(&self) -> Option<ChanModes<'_>> {
        self.get("CHANMODES").and_then(ChanModes::parse)
    }

    /// `LINELEN` as a byte count.
    pub fn line_len(&self) -> Option<usize> {
        self.get("LINELEN").and_then(|v| v.parse().ok())
    }

    /// Whether `target` names a channel under the advertised `CHANTYPES`.
    pub fn is_channel(&self, target: &str) -> bool {
        target
            .chars()
            .next()
            .map_or(false, |c| self.chantypes().contains(c))
    }
}

/// The four channel mode classes from `CHANMODES`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChanModes<'a> {
    /// List modes (always take a parameter).
    pub a: &'a str,
    /// Modes that always take a parameter.
    pub b: &'a str,
    /// Modes that take a parameter only when set.
    pub c: &'a str,
    /// Modes that never take a parameter.
    pub d: &'a str,
}

impl<'a> ChanModes<'a> {
    pub fn parse(s: &'a str) -> Option<Self> {
        let mut parts = s.splitn(4, ',');
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        Some(ChanModes { a, b, c, d })
    }
}
