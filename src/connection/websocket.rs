//! IRC over WebSocket: one text frame per line.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use super::ConnectionConfig;
use crate::error::ConnectError;

/// WebSocket subprotocol for text IRC.
pub const SUBPROTOCOL: &str = "text.ircv3.net";

pub(super) async fn handshake<S>(
    stream: S,
    config: &ConnectionConfig,
    port: u16,
    secure: bool,
) -> Result<WebSocketStream<S>, ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let url = endpoint(&config.hostname, port, &config.path, secure);
    let mut request = url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    let (stream, response) = tokio_tungstenite::client_async(request, stream).await?;
    debug!(%url, status = %response.status(), "websocket handshake complete");
    Ok(stream)
}

fn endpoint(host: &str, port: u16, path: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    if host.contains(':') {
        format!("{scheme}://[{host}]:{port}{path}")
    } else {
        format!("{scheme}://{host}:{port}{path}")
    }
}

pub(super) enum Inbound {
    /// One line, CR LF terminated.
    Line(String),
    Skip,
    Close,
}

pub(super) fn inbound(frame: WsMessage) -> Inbound {
    match frame {
        WsMessage::Text(mut text) => {
            if !text.ends_with("\r\n") {
                let trimmed = text.trim_end_matches(['\r', '\n']).len();
                text.truncate(trimmed);
                text.push_str("\r\n");
            }
            Inbound::Line(text)
        }
        WsMessage::Binary(_) => {
            warn!("Ignoring binary WebSocket frame (IRC is text-only)");
            Inbound::Skip
        }
        WsMessage::Close(_) => Inbound::Close,
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => Inbound::Skip,
    }
}

/// Split queued bytes into frame payloads, dropping terminators.
pub(super) fn outbound_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(endpoint("irc.example.net", 443, "/", true), "wss://irc.example.net:443/");
        assert_eq!(endpoint("::1", 8080, "/irc", false), "ws://[::1]:8080/irc");
    }

    #[test]
    fn test_inbound_appends_terminator() {
        for text in ["PING :x", "PING :x\n", "PING :x\r\n"] {
            match inbound(WsMessage::Text(text.to_string())) {
                Inbound::Line(line) => assert_eq!(line, "PING :x\r\n"),
                _ => panic!("expected a line"),
            }
        }
        assert!(matches!(inbound(WsMessage::Binary(vec![1, 2])), Inbound::Skip));
        assert!(matches!(inbound(WsMessage::Close(None)), Inbound::Close));
    }

    #[test]
    fn test_outbound_lines() {
        assert_eq!(outbound_lines(b"NICK bot\r\n"), vec!["NICK bot"]);
        assert_eq!(
            outbound_lines(b"NICK bot\r\nUSER bot 0 * :bot\r\n"),
            vec!["NICK bot", "USER bot 0 * :bot"]
        );
        assert!(outbound_lines(b"\r\n").is_empty());
    }
}
