use tracing::{debug, error, info, trace, warn};

use super::handlers;
use super::{Action, RegistrationState, ServerInfo};
use crate::chat::{self, ChatMessage};
use crate::ctcp::Ctcp;
use crate::message::RawMessage;
use crate::protocol::config::IrcConfig;
use crate::util::truncate_utf8_safe;
use crate::validation::{validate_target, validate_text};

/// Bytes reserved for the CR LF terminator.
const TERMINATOR_LEN: usize = 2;

/// Sans-IO state machine for one IRC session.
///
/// This drives the probe -> USER/NICK -> end of MOTD flow, answers PING and
/// CTCP queries, and turns chat traffic into [`ChatMessage`]s.
#[derive(Clone, Debug)]
pub struct IrcMachine {
    pub(super) config: IrcConfig,
    pub(super) state: RegistrationState,
    pub(super) info: ServerInfo,
    /// Nickname currently in use or being registered.
    pub(super) nickname: String,
    /// Collision-driven nickname mutations so far.
    pub(super) nick_attempts: u32,
    /// Whether `CAP END` was already sent this session.
    pub(super) cap_end_sent: bool,
}

impl IrcMachine {
    #[must_use]
    pub fn new(config: IrcConfig) -> Self {
        let nickname = config.nickname.clone();
        Self {
            config,
            state: RegistrationState::Disconnected,
            info: ServerInfo::default(),
            nickname,
            nick_attempts: 0,
            cap_end_sent: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    #[must_use]
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    #[must_use]
    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    /// Replace the configuration. The nickname only changes for the next
    /// session.
    pub fn set_config(&mut self, config: IrcConfig) {
        if self.state == RegistrationState::Disconnected {
            self.nickname = config.nickname.clone();
        }
        self.config = config;
    }

    /// The transport connected. Returns the probe lines.
    #[must_use]
    pub fn start(&mut self) -> Vec<Action> {
        self.reset();
        self.state = RegistrationState::Probing;
        vec![
            Action::Send("CAP LS 302".to_string()),
            Action::Send("ISIRCX".to_string()),
        ]
    }

    /// The transport went away. Session state is discarded.
    pub fn reset(&mut self) {
        self.state = RegistrationState::Disconnected;
        self.info = ServerInfo::default();
        self.nickname = self.config.nickname.clone();
        self.nick_attempts = 0;
        self.cap_end_sent = false;
    }

    /// Feed a parsed message to the state machine.
    ///
    /// Commands without a handler are dropped.
    #[must_use]
    pub fn feed(&mut self, msg: &RawMessage) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == RegistrationState::Disconnected {
            trace!(command = %msg.command, "message while disconnected ignored");
            return actions;
        }
        match handlers::registry().get(msg.command.as_str()) {
            Some(handler) => handler(self, msg, &mut actions),
            None => trace!(command = %msg.command, "no handler"),
        }
        actions
    }

    /// The capability probe went unanswered.
    #[must_use]
    pub fn probe_timed_out(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state == RegistrationState::Probing {
            warn!("no reply to capability probe, registering without capabilities");
            self.enter_registering(&mut actions);
        }
        actions
    }

    /// Registration did not complete in time.
    #[must_use]
    pub fn registration_timed_out(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if matches!(
            self.state,
            RegistrationState::Probing | RegistrationState::Registering
        ) {
            error!("registration timed out");
            actions.push(Action::Send("QUIT :Registration timed out".to_string()));
        }
        actions
    }

    pub(super) fn enter_registering(&mut self, actions: &mut Vec<Action>) {
        if self.state != RegistrationState::Probing {
            return;
        }
        self.state = RegistrationState::Registering;
        actions.push(Action::Registering);

        if let Some(password) = &self.config.password {
            actions.push(Action::Send(format!("PASS :{password}")));
        }
        actions.push(Action::Send(format!(
            "USER {} 0 * :{}",
            self.config.username(),
            self.config.realname()
        )));
        actions.push(Action::Send(format!("NICK {}", self.nickname)));
    }

    pub(super) fn enter_ready(&mut self, actions: &mut Vec<Action>) {
        if self.state != RegistrationState::Registering {
            if self.state == RegistrationState::Probing {
                debug!("end of MOTD before USER/NICK ignored");
            }
            return;
        }
        self.state = RegistrationState::Ready;
        self.info.registration_complete = true;
        info!(nickname = %self.nickname, "registration complete");
        actions.push(Action::Ready);

        if let Some(mode) = &self.config.mode {
            actions.push(Action::Send(format!("MODE {} {}", self.nickname, mode)));
        }
        for channel in &self.config.channels {
            actions.push(Action::Send(format!("JOIN {channel}")));
        }
    }

    /// Compose the line for an outbound chat message.
    ///
    /// Returns `None`, after logging, when the target or text is missing or
    /// invalid, or the type is unknown.
    #[must_use]
    pub fn compose(&self, msg: &ChatMessage) -> Option<String> {
        let (Some(target), Some(text)) = (msg.target(), msg.text()) else {
            debug!("outbound message without target or text dropped");
            return None;
        };
        match msg.kind() {
            chat::TYPE_MESSAGE => self.privmsg(target, text),
            chat::TYPE_NOTICE => self.notice(target, text),
            chat::TYPE_ACTION => self.ctcp("PRIVMSG", target, "ACTION", Some(text)),
            other => {
                debug!(kind = %other, "outbound message of unknown type dropped");
                None
            }
        }
    }

    #[must_use]
    pub fn privmsg(&self, target: &str, text: &str) -> Option<String> {
        self.compose_line("PRIVMSG", target, "", text, "")
    }

    #[must_use]
    pub fn notice(&self, target: &str, text: &str) -> Option<String> {
        self.compose_line("NOTICE", target, "", text, "")
    }

    /// CTCP query (`PRIVMSG`) or reply (`NOTICE`).
    #[must_use]
    pub fn ctcp(
        &self,
        command: &str,
        target: &str,
        ctcp: &str,
        parameters: Option<&str>,
    ) -> Option<String> {
        let head = match parameters {
            Some(_) => format!("\x01{ctcp} "),
            None => format!("\x01{ctcp}"),
        };
        self.compose_line(command, target, &head, parameters.unwrap_or_default(), "\x01")
    }

    fn compose_line(
        &self,
        command: &str,
        target: &str,
        head: &str,
        text: &str,
        tail: &str,
    ) -> Option<String> {
        if let Err(e) = validate_target(target) {
            debug!(to = %target.escape_debug(), error = %e, "invalid target, message dropped");
            return None;
        }
        if let Err(e) = validate_text(head).and(validate_text(text)) {
            debug!(error = %e, "invalid text, message dropped");
            return None;
        }

        let prefix = format!("{command} {target} :{head}");
        let room = self
            .info
            .max_len()
            .saturating_sub(TERMINATOR_LEN + prefix.len() + tail.len());
        let body = truncate_utf8_safe(text, room);
        if body.len() < text.len() {
            debug!(dropped = text.len() - body.len(), "outbound text truncated");
        }
        Some(format!("{prefix}{body}{tail}"))
    }

    /// Build an inbound chat message from a PRIVMSG/NOTICE.
    pub(super) fn chat_message(
        &self,
        msg: &RawMessage,
        kind: &str,
        target: &str,
        text: &str,
    ) -> Option<ChatMessage> {
        let source = msg.source.as_ref()?;
        let mut chat = ChatMessage::new()
            .with(chat::TYPE, kind)
            .with(chat::SENDER, source.nick.as_str())
            .with(chat::TARGET, target)
            .with(
                chat::TARGET_TYPE,
                if self.info.is_channel(target) {
                    chat::TARGET_CHANNEL
                } else {
                    chat::TARGET_USER
                },
            )
            .with(chat::TEXT_PLAIN, crate::colors::strip_formatting(text))
            .with(chat::TEXT_IRC, text);
        if let Some(user) = &source.user {
            chat.insert(chat::SENDER_USER, user.as_str());
        }
        if let Some(host) = &source.host {
            chat.insert(chat::SENDER_HOST, host.as_str());
        }
        for tag in &msg.tags {
            chat.insert(
                format!("{}{}", chat::TAG_PREFIX, tag.key()),
                tag.value().unwrap_or_default(),
            );
        }
        Some(chat)
    }

    /// Answer a CTCP query received in a PRIVMSG.
    pub(super) fn ctcp_query(
        &self,
        msg: &RawMessage,
        target: &str,
        ctcp: Ctcp<'_>,
        actions: &mut Vec<Action>,
    ) {
        let Some(sender) = msg.source_nick() else {
            return;
        };

        if ctcp.is("ACTION") {
            let text = ctcp.parameters.unwrap_or_default();
            if let Some(chat) = self.chat_message(msg, chat::TYPE_ACTION, target, text) {
                actions.push(Action::Deliver(chat));
            }
            return;
        }

        let time;
        let reply = match ctcp.command.to_ascii_uppercase().as_str() {
            "PING" => ctcp.parameters,
            "VERSION" => Some(self.config.version.as_str()),
            "TIME" => {
                time = chrono::Local::now().to_rfc2822();
                Some(time.as_str())
            }
            "CLIENTINFO" => Some(crate::ctcp::SUPPORTED_QUERIES),
            _ => {
                debug!(from = %sender, command = %ctcp.command, "unsupported CTCP query");
                return;
            }
        };

        debug!(from = %sender, command = %ctcp.command, "answering CTCP query");
        if let Some(line) = self.ctcp("NOTICE", sender, ctcp.command, reply) {
            actions.push(Action::Send(line));
        }
    }
}
