use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};

use gambit_core::SyncError;

/// What travels over an open channel, reduced to what the engine cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Normal closure requested by us.
    Close,
}

/// An established bidirectional channel: frames in, frames out. Dropping
/// either end tears the channel down.
pub struct WireStream {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Seam between the connection supervisor and the wire. Production uses
/// WebSockets; tests script outcomes with in-memory channels.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<WireStream, SyncError>;
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<WireStream, SyncError> {
        let (ws, _) = connect_async(url).await.map_err(classify_connect_error)?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(64);
        let (in_tx, in_rx) = mpsc::channel::<Frame>(64);

        // Writer: forward frames from the supervisor onto the socket.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let msg = match frame {
                    Frame::Text(text) => Message::Text(text.into()),
                    Frame::Ping(payload) => Message::Ping(payload.into()),
                    Frame::Pong(payload) => Message::Pong(payload.into()),
                    Frame::Close => {
                        let _ = ws_tx
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client leaving".into(),
                            })))
                            .await;
                        break;
                    }
                };
                if ws_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Reader: forward socket frames to the supervisor. Channel closure
        // (sender dropped here) is how the supervisor learns the wire died.
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                let frame = match msg {
                    Message::Text(text) => Frame::Text(text.to_string()),
                    Message::Ping(payload) => Frame::Ping(payload.to_vec()),
                    Message::Pong(payload) => Frame::Pong(payload.to_vec()),
                    Message::Close(_) => break,
                    _ => continue,
                };
                if in_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(WireStream {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Handshake rejections with an auth status are fatal for the context;
/// everything else is transient connectivity.
fn classify_connect_error(e: tungstenite::Error) -> SyncError {
    match &e {
        tungstenite::Error::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                return SyncError::Auth(format!("handshake rejected with status {status}"));
            }
            SyncError::Connectivity(format!("handshake failed with status {status}"))
        }
        _ => SyncError::Connectivity(e.to_string()),
    }
}
