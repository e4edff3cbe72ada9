//! Receive and write tasks of an established connection.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace, warn};

use super::websocket::{self, Inbound};
use super::ConnectionHandler;

/// How long a read may block before the active flag is checked again.
pub(super) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long `close` waits for queued data to be written.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 4096;

struct Shared {
    active: AtomicBool,
    closing: AtomicBool,
    notified: AtomicBool,
    handler: Weak<dyn ConnectionHandler>,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deliver(&self, data: &[u8]) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_data(data);
        }
    }

    fn notify_disconnected(&self) {
        if !self.notified.swap(true, Ordering::AcqRel) {
            if let Some(handler) = self.handler.upgrade() {
                handler.on_disconnected();
            }
        }
    }
}

/// Tasks and queue of one live connection.
pub(super) struct Session {
    shared: Arc<Shared>,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    start: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Session {
    pub(super) fn stream<S>(stream: S, handler: Weak<dyn ConnectionHandler>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::spawn(
            handler,
            |shared| read_stream(read_half, shared),
            |shared, outbound| write_stream(write_half, outbound, shared),
        )
    }

    pub(super) fn websocket<S>(
        stream: WebSocketStream<S>,
        handler: Weak<dyn ConnectionHandler>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, frames) = stream.split();
        Self::spawn(
            handler,
            |shared| async move {
                let mut frames = frames;
                while shared.is_active() {
                    let frame = match timeout(POLL_INTERVAL, frames.next()).await {
                        Err(_) => continue,
                        Ok(None) => {
                            debug!("websocket stream ended");
                            break;
                        }
                        Ok(Some(Err(e))) => {
                            warn!(error = %e, "websocket read failed");
                            break;
                        }
                        Ok(Some(Ok(frame))) => frame,
                    };
                    match websocket::inbound(frame) {
                        Inbound::Line(line) => shared.deliver(line.as_bytes()),
                        Inbound::Skip => {}
                        Inbound::Close => {
                            debug!("websocket closed by peer");
                            break;
                        }
                    }
                }
            },
            |shared, mut outbound| async move {
                let mut sink = sink;
                while let Some(data) = outbound.recv().await {
                    for line in websocket::outbound_lines(&data) {
                        if let Err(e) = sink.send(WsMessage::Text(line)).await {
                            warn!(error = %e, "websocket write failed");
                            shared.active.store(false, Ordering::Release);
                            return;
                        }
                    }
                }
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "websocket close failed");
                }
            },
        )
    }

    fn spawn<R, RF, W, WF>(handler: Weak<dyn ConnectionHandler>, reader: R, writer: W) -> Self
    where
        R: FnOnce(Arc<Shared>) -> RF,
        RF: Future<Output = ()> + Send + 'static,
        W: FnOnce(Arc<Shared>, mpsc::UnboundedReceiver<Bytes>) -> WF,
        WF: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            notified: AtomicBool::new(false),
            handler,
        });
        let (outbound, queue) = mpsc::unbounded_channel();
        let (start, started) = oneshot::channel();

        let read = reader(Arc::clone(&shared));
        let reader_shared = Arc::clone(&shared);
        let reader = tokio::spawn(async move {
            if started.await.is_err() {
                return;
            }
            read.await;
            // The peer went away; a local close notifies after joining.
            reader_shared.active.store(false, Ordering::Release);
            if !reader_shared.closing.load(Ordering::Acquire) {
                reader_shared.notify_disconnected();
            }
        });
        let writer = tokio::spawn(writer(Arc::clone(&shared), queue));

        Self {
            shared,
            outbound: Some(outbound),
            start: Some(start),
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// Begin delivering inbound data.
    pub(super) fn start(&mut self) {
        if let Some(start) = self.start.take() {
            let _ = start.send(());
        }
    }

    pub(super) fn is_active(&self) -> bool {
        self.shared.is_active() && !self.shared.closing.load(Ordering::Acquire)
    }

    pub(super) fn send(&self, data: &[u8]) {
        if !self.is_active() {
            debug!(len = data.len(), "connection closed, dropping outbound data");
            return;
        }
        if let Some(outbound) = &self.outbound {
            if outbound.send(Bytes::copy_from_slice(data)).is_err() {
                debug!(len = data.len(), "writer gone, dropping outbound data");
            }
        }
    }

    /// Clear the active flag, flush the queue, join both tasks, then notify
    /// the handler.
    pub(super) async fn close(mut self) {
        self.shared.closing.store(true, Ordering::Release);
        self.shared.active.store(false, Ordering::Release);
        self.start.take();
        self.outbound.take();

        if let Some(mut writer) = self.writer.take() {
            match timeout(FLUSH_TIMEOUT, &mut writer).await {
                Err(_) => {
                    warn!("timed out flushing outbound data");
                    writer.abort();
                }
                Ok(Err(e)) if !e.is_cancelled() => warn!(error = %e, "writer task failed"),
                Ok(_) => {}
            }
        }
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "receive task failed");
                }
            }
        }
        self.shared.notify_disconnected();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

async fn read_stream<R>(mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    while shared.is_active() {
        buf.reserve(READ_CHUNK);
        match timeout(POLL_INTERVAL, reader.read_buf(&mut buf)).await {
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!("peer closed the connection");
                break;
            }
            Ok(Ok(n)) => {
                trace!(len = n, "received");
                let chunk = buf.split();
                shared.deliver(&chunk);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "read failed");
                break;
            }
        }
    }
}

async fn write_stream<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
)
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = outbound.recv().await {
        let result = async {
            writer.write_all(&data).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "write failed");
            shared.active.store(false, Ordering::Release);
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "shutdown failed");
    }
}
