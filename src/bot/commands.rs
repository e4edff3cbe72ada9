//! Prefix-keyed bot command table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chat::{ChatMessage, TYPE_MESSAGE};
use crate::error::CommandError;

/// Handler invoked with the command word, its parameters and the message.
pub type CommandHandler = Arc<dyn Fn(&str, &str, &ChatMessage) + Send + Sync>;

/// Split a registration string such as `!quote` into prefix and word.
///
/// The prefix is the leading run of ASCII punctuation.
pub fn split_command(command: &str) -> Result<(&str, &str), CommandError> {
    let prefix_len = command.bytes().take_while(u8::is_ascii_punctuation).count();
    if prefix_len == 0 {
        return Err(CommandError::MissingPrefix(command.to_string()));
    }
    let (prefix, word) = command.split_at(prefix_len);
    if word.is_empty() {
        return Err(CommandError::MissingWord(command.to_string()));
    }
    if word.contains(char::is_whitespace) {
        return Err(CommandError::Whitespace(command.to_string()));
    }
    Ok((prefix, word))
}

/// A matched command ready to run.
#[derive(Clone)]
pub struct Invocation {
    pub handler: CommandHandler,
    pub command: String,
    pub parameters: String,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.command)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct CommandTable {
    prefixes: HashMap<String, HashMap<String, CommandHandler>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`, replacing any earlier handler.
    /// Returns whether one was replaced.
    pub fn register(
        &mut self,
        command: &str,
        handler: CommandHandler,
    ) -> Result<bool, CommandError> {
        let (prefix, word) = split_command(command)?;
        Ok(self
            .prefixes
            .entry(prefix.to_string())
            .or_default()
            .insert(word.to_string(), handler)
            .is_some())
    }

    pub fn contains(&self, command: &str) -> bool {
        split_command(command).map_or(false, |(prefix, word)| {
            self.prefixes
                .get(prefix)
                .map_or(false, |words| words.contains_key(word))
        })
    }

    pub fn len(&self) -> usize {
        self.prefixes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commands triggered by `message`.
    ///
    /// Only plain `message` types with non-empty text are considered. Every
    /// prefix the text starts with is tried.
    pub fn matches(&self, message: &ChatMessage) -> Vec<Invocation> {
        if message.kind() != TYPE_MESSAGE {
            return Vec::new();
        }
        let Some(text) = message.text().filter(|text| !text.is_empty()) else {
            return Vec::new();
        };
        self.prefixes
            .iter()
            .filter_map(|(prefix, words)| {
                let rest = text.strip_prefix(prefix.as_str())?;
                let (word, parameters) = rest.split_once(' ').unwrap_or((rest, ""));
                let handler = words.get(word)?;
                Some(Invocation {
                    handler: Arc::clone(handler),
                    command: word.to_string(),
                    parameters: parameters.to_string(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands: Vec<String> = self
            .prefixes
            .iter()
            .flat_map(|(prefix, words)| words.keys().map(move |word| format!("{prefix}{word}")))
            .collect();
        commands.sort_unstable();
        f.debug_struct("CommandTable").field("commands", &commands).finish()
    }
}
