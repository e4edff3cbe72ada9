//! The `irc` protocol: framing, parsing and the session state machine wired
//! to a connection.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, trace};

use super::config::IrcConfig;
use super::{MessageSink, Protocol};
use crate::chat::ChatMessage;
use crate::connection::{Connection, ConnectionHandler};
use crate::error::{ConfigError, ConnectError};
use crate::line::LineBuffer;
use crate::message::RawMessage;
use crate::state::{Action, IrcMachine, RegistrationState, ServerInfo};
use crate::timer::Timer;
use crate::validation::validate_message_line;

/// IRC client protocol.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct IrcProtocol {
    inner: Arc<Inner>,
}

struct Inner {
    this: Weak<Inner>,
    session: Mutex<Session>,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    sink: Mutex<Option<Weak<dyn MessageSink>>>,
}

struct Session {
    machine: IrcMachine,
    buffer: LineBuffer,
    probe_timer: Timer,
    registration_timer: Timer,
}

impl IrcProtocol {
    /// A protocol with a placeholder nickname; call
    /// [`Protocol::set_config`] before connecting.
    pub fn new() -> Self {
        Self::with_config(IrcConfig::new("slircbot"))
    }

    pub fn with_config(config: IrcConfig) -> Self {
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            session: Mutex::new(Session {
                machine: IrcMachine::new(config),
                buffer: LineBuffer::new(),
                probe_timer: Timer::disabled(),
                registration_timer: Timer::disabled(),
            }),
            connection: Mutex::new(None),
            sink: Mutex::new(None),
        });
        Self { inner }
    }

    pub fn state(&self) -> RegistrationState {
        self.inner.session.lock().machine.state()
    }

    /// Snapshot of what is known about the server.
    pub fn server_info(&self) -> ServerInfo {
        self.inner.session.lock().machine.info().clone()
    }

    /// Current nickname.
    pub fn nickname(&self) -> String {
        self.inner.session.lock().machine.nickname().to_string()
    }

    pub fn config(&self) -> IrcConfig {
        self.inner.session.lock().machine.config().clone()
    }

    /// Write a raw line. Lines containing CR, LF or NUL are dropped, as are
    /// lines over the negotiated outbound limit.
    pub fn send_raw(&self, line: &str) {
        if let Err(e) = validate_message_line(line) {
            debug!(error = %e, "invalid raw line dropped");
            return;
        }
        if !self.inner.session.lock().machine.info().limits.fits_outbound(line) {
            debug!(len = line.len(), "oversized raw line dropped");
            return;
        }
        self.inner.send_line(line);
    }

    pub fn send_privmsg(&self, target: &str, text: &str) {
        let line = self.inner.session.lock().machine.privmsg(target, text);
        self.inner.send_composed(line);
    }

    pub fn send_notice(&self, target: &str, text: &str) {
        let line = self.inner.session.lock().machine.notice(target, text);
        self.inner.send_composed(line);
    }

    /// Send a CTCP query.
    pub fn send_ctcp(&self, target: &str, command: &str, parameters: Option<&str>) {
        let line = self
            .inner
            .session
            .lock()
            .machine
            .ctcp("PRIVMSG", target, command, parameters);
        self.inner.send_composed(line);
    }

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.inner.connection.lock().clone()
    }
}

impl Default for IrcProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IrcProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("IrcProtocol")
            .field("state", &session.machine.state())
            .field("nickname", &session.machine.nickname())
            .finish()
    }
}

#[async_trait]
impl Protocol for IrcProtocol {
    fn set_config(&self, config: &Value) -> Result<(), ConfigError> {
        let config = IrcConfig::from_value(config)?;
        debug!(nickname = %config.nickname, "configured");
        self.inner.session.lock().machine.set_config(config);
        Ok(())
    }

    fn attach(&self, connection: Arc<dyn Connection>) {
        let handler: Weak<dyn ConnectionHandler> = self.inner.this.clone();
        connection.set_handler(handler);
        *self.inner.connection.lock() = Some(connection);
    }

    fn set_sink(&self, sink: Weak<dyn MessageSink>) {
        *self.inner.sink.lock() = Some(sink);
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        let connection = self.connection().ok_or(ConnectError::NoConnection)?;
        connection.connect().await
    }

    async fn disconnect(&self) {
        let (mut probe, mut registration) = {
            let mut session = self.inner.session.lock();
            (
                std::mem::replace(&mut session.probe_timer, Timer::disabled()),
                std::mem::replace(&mut session.registration_timer, Timer::disabled()),
            )
        };
        probe.stop().await;
        registration.stop().await;

        let Some(connection) = self.connection() else {
            return;
        };
        if connection.is_connected() {
            self.inner.send_line("QUIT :Shutting down");
        }
        connection.disconnect().await;
    }

    fn send_message(&self, message: &ChatMessage) {
        let line = self.inner.session.lock().machine.compose(message);
        self.inner.send_composed(line);
    }
}

impl Inner {
    fn send_line(&self, line: &str) {
        let Some(connection) = self.connection.lock().clone() else {
            debug!("no connection, line dropped");
            return;
        };
        trace!("-> {}", line.escape_debug());
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        connection.send(&data);
    }

    fn send_composed(&self, line: Option<String>) {
        if let Some(line) = line {
            self.send_line(&line);
        }
    }

    /// Carry out actions with the session lock released.
    fn execute(&self, actions: Vec<Action>) {
        let mut sink = None;
        for action in actions {
            match action {
                Action::Send(line) => self.send_line(&line),
                Action::Deliver(message) => {
                    let sink = sink
                        .get_or_insert_with(|| self.sink.lock().as_ref().and_then(Weak::upgrade));
                    match sink {
                        Some(sink) => sink.on_message(message),
                        None => trace!("no sink, chat message dropped"),
                    }
                }
                Action::Registering | Action::Ready => {}
            }
        }
    }

    fn timer(&self, seconds: u64, expired: fn(&Inner)) -> Timer {
        let this = self.this.clone();
        Timer::start(Duration::from_secs(seconds), move || {
            if let Some(inner) = this.upgrade() {
                expired(&inner);
            }
        })
    }

    fn on_probe_timeout(&self) {
        let actions = {
            let mut session = self.session.lock();
            let actions = session.machine.probe_timed_out();
            session.apply_lifecycle(&actions);
            actions
        };
        self.execute(actions);
    }

    fn on_registration_timeout(&self) {
        let actions = self.session.lock().machine.registration_timed_out();
        self.execute(actions);
    }
}

impl Session {
    /// Size the line buffer for the longest line the server may now send.
    fn sync_line_limit(&mut self) {
        let limit = self.machine.info().limits.inbound();
        if self.buffer.max_len() != limit {
            trace!(limit, "inbound line limit changed");
            self.buffer.set_max_len(limit);
        }
    }

    /// Stop timers made obsolete by state transitions.
    fn apply_lifecycle(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::Registering => self.probe_timer.abort(),
                Action::Ready => {
                    self.probe_timer.abort();
                    self.registration_timer.abort();
                }
                Action::Send(_) | Action::Deliver(_) => {}
            }
        }
    }
}

impl ConnectionHandler for Inner {
    fn on_connected(&self) {
        let actions = {
            let mut session = self.session.lock();
            let actions = session.machine.start();
            session.buffer = LineBuffer::with_max_len(session.machine.info().limits.inbound());
            let config = session.machine.config();
            let (probe, registration) = (config.probe_timeout, config.registration_timeout);
            session.probe_timer = self.timer(probe, Inner::on_probe_timeout);
            session.registration_timer = self.timer(registration, Inner::on_registration_timeout);
            actions
        };
        info!("connected, starting registration");
        self.execute(actions);
    }

    fn on_data(&self, data: &[u8]) {
        let actions = {
            let mut session = self.session.lock();
            let mut actions = Vec::new();
            session.buffer.extend(data);
            while let Some(line) = session.buffer.next_line() {
                trace!("<- {}", line.escape_debug());
                match RawMessage::parse(&line) {
                    Ok(msg) => {
                        let produced = session.machine.feed(&msg);
                        session.apply_lifecycle(&produced);
                        session.sync_line_limit();
                        actions.extend(produced);
                    }
                    Err(e) => debug!(error = %e, "unparsable line dropped"),
                }
            }
            actions
        };
        self.execute(actions);
    }

    fn on_disconnected(&self) {
        let mut session = self.session.lock();
        session.probe_timer.abort();
        session.registration_timer.abort();
        session.machine.reset();
        session.buffer = LineBuffer::with_max_len(session.machine.info().limits.inbound());
        info!("disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{self, TEXT_PLAIN};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<u8>>,
        handler: Mutex<Option<Weak<dyn ConnectionHandler>>>,
    }

    impl Recorder {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.sent.lock())
                .split_terminator("\r\n")
                .map(str::to_owned)
                .collect()
        }

        fn handler(&self) -> Arc<dyn ConnectionHandler> {
            self.handler.lock().as_ref().and_then(Weak::upgrade).unwrap()
        }
    }

    #[async_trait]
    impl Connection for Recorder {
        fn set_config(&self, _config: &Value) -> Result<(), ConfigError> {
            Ok(())
        }

        fn set_handler(&self, handler: Weak<dyn ConnectionHandler>) {
            *self.handler.lock() = Some(handler);
        }

        async fn connect(&self) -> Result<(), ConnectError> {
            self.handler().on_connected();
            Ok(())
        }

        fn send(&self, data: &[u8]) {
            self.sent.lock().extend_from_slice(data);
        }

        async fn disconnect(&self) {
            self.handler().on_disconnected();
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<ChatMessage>>);

    impl MessageSink for Inbox {
        fn on_message(&self, message: ChatMessage) {
            self.0.lock().push(message);
        }
    }

    fn setup() -> (IrcProtocol, Arc<Recorder>, Arc<Inbox>) {
        let protocol = IrcProtocol::new();
        protocol
            .set_config(&json!({ "nickname": "bot", "channels": ["#rust"] }))
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        protocol.attach(recorder.clone());
        let inbox = Arc::new(Inbox::default());
        let sink: Weak<dyn MessageSink> = Arc::downgrade(&inbox) as Weak<dyn MessageSink>;
        protocol.set_sink(sink);
        (protocol, recorder, inbox)
    }

    #[tokio::test]
    async fn test_registration_over_connection() {
        let (protocol, recorder, _inbox) = setup();
        protocol.connect().await.unwrap();
        assert_eq!(protocol.state(), RegistrationState::Probing);

        let handler = recorder.handler();
        handler.on_data(
            b":srv CAP * LS :multi-prefix\r\n:srv 001 bot :Welcome\r\n:srv 376 bot :End\r\n",
        );
        assert_eq!(protocol.state(), RegistrationState::Ready);

        let lines = recorder.lines();
        assert_eq!(lines[0], "CAP LS 302");
        assert!(lines.contains(&"CAP END".to_string()));
        assert!(lines.contains(&"NICK bot".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("JOIN #rust"));
    }

    #[tokio::test]
    async fn test_split_delivery_and_sink() {
        let (protocol, recorder, inbox) = setup();
        protocol.connect().await.unwrap();
        let handler = recorder.handler();
        for byte in b":alice!a@host PRIVMSG #rust :\x02hi\x02\r\n" {
            handler.on_data(std::slice::from_ref(byte));
        }
        let messages = inbox.0.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].get(TEXT_PLAIN), Some("hi"));
        assert_eq!(messages[0].sender(), Some("alice"));
    }

    #[tokio::test]
    async fn test_send_message_and_drop() {
        let (protocol, recorder, _inbox) = setup();
        protocol.send_message(&ChatMessage::to("#rust", "hello"));
        protocol.send_message(&ChatMessage::to("bad target", "dropped"));
        protocol.send_message(&ChatMessage::to("#rust", "a\r\nQUIT"));
        protocol
            .send_message(&ChatMessage::to("#rust", "waves").with(chat::TYPE, chat::TYPE_ACTION));
        assert_eq!(
            recorder.lines(),
            vec!["PRIVMSG #rust :hello", "PRIVMSG #rust :\x01ACTION waves\x01"]
        );
    }

    #[tokio::test]
    async fn test_disconnect_resets_session() {
        let (protocol, recorder, _inbox) = setup();
        protocol.connect().await.unwrap();
        recorder
            .handler()
            .on_data(b":srv CAP * LS :\r\n:srv 001 bot :Welcome\r\n:srv 422 bot :No MOTD\r\n");
        assert_eq!(protocol.state(), RegistrationState::Ready);
        protocol.disconnect().await;
        assert_eq!(protocol.state(), RegistrationState::Disconnected);
        assert!(!protocol.server_info().registration_complete);
        assert!(recorder.lines().contains(&"QUIT :Shutting down".to_string()));
    }

    #[tokio::test]
    async fn test_end_of_motd_before_registration_is_ignored() {
        let (protocol, recorder, _inbox) = setup();
        protocol.connect().await.unwrap();
        recorder.handler().on_data(b":srv 376 bot :End of MOTD\r\n");
        assert_eq!(protocol.state(), RegistrationState::Probing);
        assert!(!recorder.lines().contains(&"JOIN #rust".to_string()));
    }

    #[tokio::test]
    async fn test_inbound_limit_follows_message_tags() {
        let (protocol, recorder, inbox) = setup();
        protocol.connect().await.unwrap();
        let handler = recorder.handler();
        let limit = |p: &IrcProtocol| p.inner.session.lock().buffer.max_len();
        assert_eq!(limit(&protocol), 512);

        // The tagged line is only acceptable once the ACK has been processed,
        // even when both arrive in the same chunk.
        let tags = format!("@label={}", "x".repeat(2000));
        let mut chunk = b":srv CAP * LS :message-tags\r\n".to_vec();
        chunk.extend_from_slice(b":srv CAP bot ACK :message-tags\r\n");
        chunk.extend_from_slice(tags.as_bytes());
        handler.on_data(&chunk);
        assert_eq!(limit(&protocol), 512 + 8191);

        handler.on_data(b" :alice!a@host PRIVMSG #rust :tagged\r\n");
        let messages = inbox.0.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some("tagged"));
        drop(messages);

        protocol.disconnect().await;
        assert_eq!(limit(&protocol), 512);
    }

    #[tokio::test]
    async fn test_oversized_raw_line_is_dropped() {
        let (protocol, recorder, _inbox) = setup();
        protocol.send_raw(&format!("PRIVMSG #rust :{}", "a".repeat(600)));
        protocol.send_raw(&format!("@+draft/reply=1 PRIVMSG #rust :{}", "a".repeat(10)));
        protocol.send_raw("PRIVMSG #rust :short");
        assert_eq!(recorder.lines(), vec!["PRIVMSG #rust :short"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_stops_timers() {
        let (protocol, recorder, _inbox) = setup();
        protocol.connect().await.unwrap();
        {
            let session = protocol.inner.session.lock();
            assert!(session.probe_timer.is_pending());
            assert!(session.registration_timer.is_pending());
        }
        protocol.disconnect().await;
        let session = protocol.inner.session.lock();
        assert!(!session.probe_timer.is_pending());
        assert!(!session.registration_timer.is_pending());
        drop(session);
        assert_eq!(recorder.lines().last().map(String::as_str), Some("QUIT :Shutting down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_registers() {
        let (protocol, recorder, _inbox) = setup();
        protocol.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(protocol.state(), RegistrationState::Registering);
        assert!(recorder.lines().contains(&"NICK bot".to_string()));
    }

    #[tokio::test]
    async fn test_connect_without_connection() {
        let protocol = IrcProtocol::new();
        assert!(matches!(protocol.connect().await, Err(ConnectError::NoConnection)));
        protocol.send_raw("PING :x");
    }
}
