use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::ConnectError;

/// Resolve and connect, enabling TCP keepalive on the socket.
pub(super) async fn dial(hostname: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let stream = TcpStream::connect((hostname, port))
        .await
        .map_err(|source| ConnectError::Io {
            address: format!("{hostname}:{port}"),
            source,
        })?;
    if let Err(e) = enable_keepalive(&stream) {
        warn!("failed to enable TCP keepalive: {}", e);
    }
    if let Ok(peer) = stream.peer_addr() {
        debug!(%peer, "tcp connected");
    }
    Ok(stream)
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}
