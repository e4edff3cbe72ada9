//! Command and numeric handlers.
//!
//! Each handler receives the machine, the parsed message and the action list
//! to append to. Lookup is by the command as parsed: uppercase words or three
//! digit numerics.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::{debug, error, info, trace, warn};

use super::{Action, IrcMachine, RegistrationState};
use crate::caps::CapSubcommand;
use crate::chat;
use crate::ctcp::Ctcp;
use crate::message::RawMessage;
use crate::response::Response;
use crate::validation::{validate_message_line, validate_target};

pub(super) type Handler = fn(&mut IrcMachine, &RawMessage, &mut Vec<Action>);

/// Registry of handlers keyed by command.
pub(super) fn registry() -> &'static HashMap<&'static str, Handler> {
    static REGISTRY: OnceLock<HashMap<&'static str, Handler>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();

        handlers.insert("CAP", handle_cap);
        handlers.insert("PING", handle_ping);
        handlers.insert("ERROR", handle_error);
        handlers.insert("NICK", handle_nick);
        handlers.insert("PRIVMSG", handle_privmsg);
        handlers.insert("NOTICE", handle_notice);

        handlers.insert(Response::RPL_WELCOME.as_str(), handle_welcome);
        handlers.insert(Response::RPL_MYINFO.as_str(), handle_myinfo);
        handlers.insert(Response::RPL_ISUPPORT.as_str(), handle_isupport);
        handlers.insert(Response::RPL_ENDOFMOTD.as_str(), handle_end_of_motd);
        handlers.insert(Response::ERR_NOMOTD.as_str(), handle_end_of_motd);
        handlers.insert(Response::ERR_UNKNOWNCOMMAND.as_str(), handle_unknown_command);
        handlers.insert(Response::ERR_NICKNAMEINUSE.as_str(), handle_nick_collision);
        handlers.insert(Response::ERR_UNAVAILRESOURCE.as_str(), handle_nick_collision);
        handlers.insert(Response::ERR_ERRONEUSNICKNAME.as_str(), handle_registration_error);
        handlers.insert(Response::ERR_PASSWDMISMATCH.as_str(), handle_registration_error);
        handlers.insert(Response::ERR_YOUREBANNEDCREEP.as_str(), handle_registration_error);
        handlers.insert(Response::RPL_IRCX.as_str(), handle_ircx);

        handlers
    })
}

fn handle_cap(machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    machine.info.has_capabilities = true;
    machine.enter_registering(actions);

    // CAP <target> <subcommand> [*] :<list>
    let Some(subcommand) = msg.param(1) else {
        return;
    };
    let list = msg.trailing();
    match CapSubcommand::from(subcommand) {
        CapSubcommand::Ls => {
            let done = machine.info.capabilities.accumulate_ls(&msg.parameters[1..]);
            if !done || machine.info.registration_complete || machine.cap_end_sent {
                return;
            }
            let wanted = machine.info.capabilities.select(&machine.config.capabilities);
            if !wanted.is_empty() {
                actions.push(Action::Send(format!("CAP REQ :{}", wanted.join(" "))));
            }
            actions.push(Action::Send("CAP END".to_string()));
            machine.cap_end_sent = true;
        }
        CapSubcommand::Ack => {
            machine.info.capabilities.acknowledge(list);
            info!(capabilities = %list, "capabilities acknowledged");
            machine.info.update_limits();
        }
        CapSubcommand::Nak => {
            warn!(capabilities = %list, "capabilities rejected");
        }
        CapSubcommand::New => {
            let added = machine.info.capabilities.add_advertised(list);
            if machine.info.registration_complete {
                let wanted: Vec<&str> = machine
                    .info
                    .capabilities
                    .select(&machine.config.capabilities)
                    .into_iter()
                    .filter(|cap| added.iter().any(|a| a.as_str() == *cap))
                    .collect();
                if !wanted.is_empty() {
                    actions.push(Action::Send(format!("CAP REQ :{}", wanted.join(" "))));
                }
            }
        }
        CapSubcommand::Del => {
            machine.info.capabilities.remove_advertised(list);
            machine.info.update_limits();
        }
        CapSubcommand::List => trace!(capabilities = %list, "enabled capabilities"),
        CapSubcommand::Unknown(other) => debug!(subcommand = %other, "unknown CAP subcommand"),
    }
}

/// Whether a server-supplied word can be echoed back on a line of its own.
fn is_echoable(word: &str) -> bool {
    validate_target(word).is_ok() && validate_message_line(word).is_ok()
}

fn handle_ping(_machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    let token = msg.param(0).unwrap_or_default();
    if validate_message_line(token).is_err() {
        debug!("PING token with control characters ignored");
        return;
    }
    actions.push(Action::Send(format!("PONG :{token}")));
}

fn handle_error(_machine: &mut IrcMachine, msg: &RawMessage, _actions: &mut Vec<Action>) {
    warn!(reason = %msg.trailing(), "server sent ERROR");
}

fn handle_nick(machine: &mut IrcMachine, msg: &RawMessage, _actions: &mut Vec<Action>) {
    let (Some(old), Some(new)) = (msg.source_nick(), msg.param(0)) else {
        return;
    };
    if old == machine.nickname && is_echoable(new) {
        info!(from = %old, to = %new, "nickname changed");
        machine.nickname = new.to_owned();
    }
}

fn handle_privmsg(machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
        return;
    };
    if let Some(ctcp) = Ctcp::parse(text) {
        machine.ctcp_query(msg, target, ctcp, actions);
        return;
    }
    if let Some(chat) = machine.chat_message(msg, chat::TYPE_MESSAGE, target, text) {
        actions.push(Action::Deliver(chat));
    }
}

fn handle_notice(machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
        return;
    };
    if let Some(ctcp) = Ctcp::parse(text) {
        debug!(
            from = %msg.source_nick().unwrap_or("*"),
            command = %ctcp.command,
            parameters = %ctcp.parameters.unwrap_or_default(),
            "CTCP reply"
        );
        return;
    }
    // Server notices before registration carry no user source.
    if msg.source.as_ref().map_or(true, |s| s.user.is_none()) {
        trace!(text = %text, "server notice");
        return;
    }
    if let Some(chat) = machine.chat_message(msg, chat::TYPE_NOTICE, target, text) {
        actions.push(Action::Deliver(chat));
    }
}

fn handle_welcome(machine: &mut IrcMachine, msg: &RawMessage, _actions: &mut Vec<Action>) {
    if let Some(nick) = msg.param(0).filter(|n| *n != "*" && is_echoable(n)) {
        machine.nickname = nick.to_owned();
    }
    machine.info.welcomed = true;
    debug!(nickname = %machine.nickname, "welcomed");
}

fn handle_myinfo(machine: &mut IrcMachine, msg: &RawMessage, _actions: &mut Vec<Action>) {
    machine.info.host = msg.param(1).map(str::to_owned);
    machine.info.software = msg.param(2).map(str::to_owned);
}

fn handle_isupport(machine: &mut IrcMachine, msg: &RawMessage, _actions: &mut Vec<Action>) {
    if machine.info.features.apply_reply(&msg.parameters) {
        machine.info.update_limits();
    } else {
        debug!("005 is not RPL_ISUPPORT, ignored");
    }
}

fn handle_end_of_motd(machine: &mut IrcMachine, _msg: &RawMessage, actions: &mut Vec<Action>) {
    machine.enter_ready(actions);
}

fn handle_unknown_command(machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    let command = msg.param(1).unwrap_or_default();
    if command.eq_ignore_ascii_case("CAP") {
        debug!("server does not support capability negotiation");
        machine.enter_registering(actions);
    } else {
        trace!(command = %command, "unknown command");
    }
}

fn handle_nick_collision(machine: &mut IrcMachine, msg: &RawMessage, actions: &mut Vec<Action>) {
    if machine.info.welcomed || machine.state != RegistrationState::Registering {
        trace!(numeric = %msg.command, "nickname collision outside registration ignored");
        return;
    }
    if machine.nick_attempts >= machine.config.nickname_retries {
        if machine.nick_attempts == machine.config.nickname_retries {
            error!(
                nickname = %machine.nickname,
                retries = machine.config.nickname_retries,
                "no usable nickname, giving up"
            );
            machine.nick_attempts += 1;
            actions.push(Action::Send("QUIT :Nickname unavailable".to_string()));
        }
        return;
    }
    machine.nick_attempts += 1;
    machine.nickname.push('_');
    warn!(
        rejected = %msg.param(1).unwrap_or_default(),
        nickname = %machine.nickname,
        "nickname unavailable, retrying"
    );
    actions.push(Action::Send(format!("NICK {}", machine.nickname)));
}

fn handle_registration_error(
    _machine: &mut IrcMachine,
    msg: &RawMessage,
    _actions: &mut Vec<Action>,
) {
    error!(numeric = %msg.command, reason = %msg.trailing(), "registration rejected");
}

fn handle_ircx(machine: &mut IrcMachine, _msg: &RawMessage, _actions: &mut Vec<Action>) {
    machine.info.has_extensions = true;
}
