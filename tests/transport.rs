//! Built-in transports against local peers.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use slirc_bot::connection::{Connection, ConnectionHandler, StreamConnection, TransportKind};
use slirc_bot::error::ConnectError;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Records handler callbacks in order.
#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl Events {
    fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    fn data(&self) -> String {
        self.0
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix("data:"))
            .collect()
    }
}

impl ConnectionHandler for Events {
    fn on_connected(&self) {
        self.0.lock().push("connected".to_string());
    }

    fn on_data(&self, data: &[u8]) {
        self.0
            .lock()
            .push(format!("data:{}", String::from_utf8_lossy(data)));
    }

    fn on_disconnected(&self) {
        self.0.lock().push("disconnected".to_string());
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn connection(kind: TransportKind, port: u16) -> (StreamConnection, Arc<Events>) {
    let connection = StreamConnection::new(kind);
    connection
        .set_config(&json!({ "hostname": "127.0.0.1", "port": port }))
        .unwrap();
    let events = Arc::new(Events::default());
    let handler: Weak<Events> = Arc::downgrade(&events);
    connection.set_handler(handler);
    (connection, events)
}

#[tokio::test]
async fn test_tcp_exchange() {
    let (listener, port) = listener().await;
    let (connection, events) = connection(TransportKind::Tcp, port);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"PING :hello\r\n").await.unwrap();
        let mut lines = BufReader::new(read).lines();
        let line = lines.next_line().await.unwrap();
        (line, write)
    });

    connection.connect().await.unwrap();
    assert!(connection.is_connected());
    eventually("inbound data", || events.data() == "PING :hello\r\n").await;
    assert_eq!(events.snapshot()[0], "connected");

    connection.send(b"PONG :hello\r\n");
    let (line, _write) = server.await.unwrap();
    assert_eq!(line.as_deref(), Some("PONG :hello"));

    connection.disconnect().await;
    assert!(!connection.is_connected());
    assert_eq!(events.count("disconnected"), 1);
}

#[tokio::test]
async fn test_peer_close_notifies_once() {
    let (listener, port) = listener().await;
    let (connection, events) = connection(TransportKind::Tcp, port);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    connection.connect().await.unwrap();
    server.await.unwrap();
    eventually("disconnect", || events.count("disconnected") == 1).await;
    assert!(!connection.is_connected());

    connection.disconnect().await;
    assert_eq!(events.count("disconnected"), 1);
    connection.send(b"dropped\r\n");
}

#[tokio::test]
async fn test_disconnect_flushes_queued_data() {
    let (listener, port) = listener().await;
    let (connection, events) = connection(TransportKind::Tcp, port);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        received
    });

    connection.connect().await.unwrap();
    for n in 0..100 {
        connection.send(format!("PRIVMSG #rust :line {n}\r\n").as_bytes());
    }
    connection.disconnect().await;

    let received = String::from_utf8(server.await.unwrap()).unwrap();
    assert_eq!(received.lines().count(), 100);
    assert!(received.ends_with("PRIVMSG #rust :line 99\r\n"));
    assert_eq!(events.snapshot(), vec!["connected", "disconnected"]);
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let (listener, port) = listener().await;
    let (connection, events) = connection(TransportKind::Tcp, port);

    let server = tokio::spawn(async move {
        let mut streams = Vec::new();
        for _ in 0..2 {
            streams.push(listener.accept().await.unwrap().0);
        }
        streams
    });

    connection.connect().await.unwrap();
    assert!(matches!(connection.connect().await, Err(ConnectError::AlreadyConnected)));
    connection.disconnect().await;
    connection.connect().await.unwrap();
    let _streams = server.await.unwrap();

    assert!(connection.is_connected());
    assert_eq!(events.count("connected"), 2);
    assert_eq!(events.count("disconnected"), 1);
}

#[tokio::test]
async fn test_refused_connection() {
    let (listener, port) = listener().await;
    drop(listener);
    let (connection, events) = connection(TransportKind::Tcp, port);

    let err = connection.connect().await.unwrap_err();
    assert!(matches!(err, ConnectError::Io { .. }));
    assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    assert!(events.snapshot().is_empty());
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn test_connect_requires_handler() {
    let connection = StreamConnection::new(TransportKind::Tcp);
    connection.set_config(&json!({ "hostname": "127.0.0.1", "port": 1 })).unwrap();
    assert!(matches!(connection.connect().await, Err(ConnectError::NoHandler)));
}

#[tokio::test]
async fn test_websocket_exchange() {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::Message;

    let (listener, port) = listener().await;
    let (connection, events) = connection(TransportKind::WebSocket, port);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let offered = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&offered);
        let callback = move |request: &Request, mut response: Response| {
            *seen.lock() = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("text.ircv3.net"));
            Ok::<_, ErrorResponse>(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();
        ws.send(Message::Text("PING :ws".to_string())).await.unwrap();
        ws.send(Message::Binary(vec![0xff, 0x00])).await.unwrap();

        let mut received = Vec::new();
        while let Some(Ok(frame)) = ws.next().await {
            match frame {
                Message::Text(text) => received.push(text),
                Message::Close(_) => break,
                _ => {}
            }
        }
        let offered = offered.lock().clone();
        (offered, received)
    });

    connection.connect().await.unwrap();
    eventually("inbound frame", || events.data() == "PING :ws\r\n").await;

    connection.send(b"PONG :ws\r\nPRIVMSG #rust :one\r\n");
    tokio::time::sleep(Duration::from_millis(50)).await;
    connection.disconnect().await;

    let (offered, received) = server.await.unwrap();
    assert_eq!(offered.as_deref(), Some("text.ircv3.net"));
    assert_eq!(received, vec!["PONG :ws", "PRIVMSG #rust :one"]);
    assert_eq!(events.count("disconnected"), 1);
}
