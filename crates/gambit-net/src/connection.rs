use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use gambit_core::{ChannelScope, PushMessage, SessionContext, SyncError};

use crate::backoff::{Backoff, MAX_ATTEMPTS};
use crate::transport::{Frame, Transport, WireStream};

/// Lifecycle of one channel, observable through `Connection::state`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
}

/// What the supervisor reports to whoever opened the connection.
#[derive(Debug)]
pub enum LinkEvent {
    /// Channel established (also after a successful reconnect).
    Opened,
    /// Raw inbound payload, in arrival order.
    Message(String),
    /// Abnormal drop; a reconnect is scheduled after `delay`.
    Lost { attempt: u32, delay: Duration },
    /// Terminal failure: auth rejection or attempt budget spent.
    Failed(SyncError),
    /// Intentional close completed; nothing follows.
    Closed,
}

/// Handle to a live channel. Cloning is cheap; closing any clone closes
/// the channel for all of them.
#[derive(Clone)]
pub struct Connection {
    scope: ChannelScope,
    tx: mpsc::Sender<String>,
    state: watch::Receiver<LinkState>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn scope(&self) -> &ChannelScope {
        &self.scope
    }

    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    /// Whether two handles belong to the same underlying channel, as opposed
    /// to a successor opened for the same scope.
    pub fn same_link(&self, other: &Connection) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Queue a message for the peer. Buffered across a reconnect window;
    /// fails only once the supervisor is gone.
    pub async fn send(&self, message: &PushMessage) -> Result<(), SyncError> {
        let text =
            serde_json::to_string(message).map_err(|e| SyncError::Protocol(e.to_string()))?;
        self.tx
            .send(text)
            .await
            .map_err(|_| SyncError::Connectivity("connection supervisor gone".into()))
    }

    /// Intentional close: normal-closure on the wire, reconnect suppressed,
    /// any pending backoff timer cancelled. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// A supervisor currently registered for a scope. The id tells a finished
/// supervisor whether the entry is still its own or a successor's.
struct LiveEntry {
    id: u64,
    cancel: CancellationToken,
}

type LiveMap = Arc<Mutex<HashMap<ChannelScope, LiveEntry>>>;

/// Owns one supervisor task per channel scope. Opening a scope that already
/// has a live connection cancels the old one first; a supervisor that ends
/// removes its own registry entry.
pub struct ConnectionManager {
    ctx: SessionContext,
    transport: Arc<dyn Transport>,
    live: LiveMap,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(ctx: SessionContext, transport: Arc<dyn Transport>) -> Self {
        Self {
            ctx,
            transport,
            live: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Open (or replace) the channel for a scope. The returned receiver
    /// yields lifecycle events and inbound messages in arrival order.
    pub fn open(&self, scope: ChannelScope) -> (Connection, mpsc::Receiver<LinkEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        {
            let mut live = self.live.lock();
            let entry = LiveEntry {
                id,
                cancel: cancel.clone(),
            };
            if let Some(prev) = live.insert(scope.clone(), entry) {
                prev.cancel.cancel();
            }
        }

        let (out_tx, out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(256);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);

        let url = self.ctx.ws_endpoint(&scope);
        tokio::spawn(supervise(
            scope.clone(),
            url,
            Arc::clone(&self.transport),
            out_rx,
            event_tx,
            state_tx,
            cancel.clone(),
            Arc::clone(&self.live),
            id,
        ));

        (
            Connection {
                scope,
                tx: out_tx,
                state: state_rx,
                cancel,
            },
            event_rx,
        )
    }

    #[cfg(test)]
    fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

/// Supervisor task for one channel scope: runs the link loop, then drops
/// its registry entry unless a successor already took the scope over.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    scope: ChannelScope,
    url: String,
    transport: Arc<dyn Transport>,
    out_rx: mpsc::Receiver<String>,
    events: mpsc::Sender<LinkEvent>,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
    live: LiveMap,
    id: u64,
) {
    run_link(&scope, &url, transport, out_rx, events, state, cancel).await;

    let mut live = live.lock();
    if live.get(&scope).is_some_and(|entry| entry.id == id) {
        live.remove(&scope);
    }
}

/// Connect/pump/backoff loop for one channel scope.
async fn run_link(
    scope: &ChannelScope,
    url: &str,
    transport: Arc<dyn Transport>,
    mut out_rx: mpsc::Receiver<String>,
    events: mpsc::Sender<LinkEvent>,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = state.send(LinkState::Closed);
                let _ = events.send(LinkEvent::Closed).await;
                return;
            }
            result = transport.connect(url) => result,
        };

        match attempt {
            Ok(mut wire) => {
                backoff.reset();
                let _ = state.send(LinkState::Open);
                let _ = events.send(LinkEvent::Opened).await;
                tracing::info!(context = %scope, "Channel open");

                if pump(&mut wire, &mut out_rx, &events, &cancel).await {
                    // Intentional: say goodbye on the wire, no reconnect.
                    let _ = wire.outbound.send(Frame::Close).await;
                    let _ = state.send(LinkState::Closed);
                    let _ = events.send(LinkEvent::Closed).await;
                    tracing::info!(context = %scope, "Channel closed intentionally");
                    return;
                }
                tracing::warn!(context = %scope, "Channel dropped unexpectedly");
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(context = %scope, error = %e, "Channel failed fatally");
                let _ = state.send(LinkState::Closed);
                let _ = events.send(LinkEvent::Failed(e)).await;
                return;
            }
            Err(e) => {
                tracing::warn!(context = %scope, error = %e, "Connect attempt failed");
            }
        }

        match backoff.next_delay() {
            Some(delay) => {
                let attempt = backoff.attempts();
                let _ = state.send(LinkState::Reconnecting { attempt });
                let _ = events.send(LinkEvent::Lost { attempt, delay }).await;
                tracing::info!(
                    context = %scope,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        // Cancellation kills the timer synchronously; no
                        // callback fires after this point.
                        let _ = state.send(LinkState::Closed);
                        let _ = events.send(LinkEvent::Closed).await;
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                let _ = state.send(LinkState::Closed);
                let _ = events
                    .send(LinkEvent::Failed(SyncError::ConnectivityExhausted {
                        attempts: MAX_ATTEMPTS,
                    }))
                    .await;
                tracing::error!(context = %scope, "Reconnect attempts exhausted");
                return;
            }
        }
    }
}

/// Shovel frames both ways until the wire dies or the handle asks to close.
/// Returns true when the close was intentional.
async fn pump(
    wire: &mut WireStream,
    out_rx: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<LinkEvent>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return true,
            outbound = out_rx.recv() => match outbound {
                Some(text) => {
                    if wire.outbound.send(Frame::Text(text)).await.is_err() {
                        return false;
                    }
                }
                // Every handle dropped: nobody can speak or close explicitly,
                // so treat it as leaving the context.
                None => return true,
            },
            inbound = wire.inbound.recv() => match inbound {
                Some(Frame::Text(text)) => {
                    let _ = events.send(LinkEvent::Message(text)).await;
                }
                Some(Frame::Ping(payload)) => {
                    let _ = wire.outbound.send(Frame::Pong(payload)).await;
                }
                Some(Frame::Pong(_)) => {}
                Some(Frame::Close) | None => return false,
            },
        }
    }
}
