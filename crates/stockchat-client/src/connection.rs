//! Connection manager: the single WebSocket to the inference backend.
//!
//! An actor task owns the socket and the map of registered frame sinks.
//! Callers talk to it over an unbounded command channel, so registration and
//! unregistration never block and can happen from `Drop`.
//!
//! State machine: `Absent → Connecting → Open → (Closing) → Absent`. Nothing
//! is opened until the first [`ConnectionManager::acquire`]; after that any
//! close or failed attempt schedules a reconnect after the configured delay,
//! forever, until [`ConnectionManager::shutdown`].

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use stockchat_core::{InboundFrame, OutboundFrame, RequestId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::errors::ConnectionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Reply<T> = oneshot::Sender<Result<T, ConnectionError>>;

/// Receives every inbound frame while registered.
pub type FrameSink = mpsc::UnboundedSender<InboundFrame>;

/// Observable connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Absent,
    /// Opening a socket.
    Connecting,
    /// Socket open. `generation` increments on every successful connect.
    Open {
        /// Connect counter.
        generation: u64,
    },
    /// Shutting down.
    Closing,
}

/// Proof that a connection was open when acquired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionHandle {
    generation: u64,
}

impl ConnectionHandle {
    /// Connect counter of the socket this handle refers to.
    pub fn generation(self) -> u64 {
        self.generation
    }
}

enum Command {
    Acquire { reply: Reply<ConnectionHandle> },
    Write { text: String, reply: Reply<()> },
    Register { id: RequestId, sink: FrameSink },
    Unregister { id: RequestId },
    Shutdown,
}

/// Process-wide owner of the backend connection.
pub struct ConnectionManager {
    url: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawn the actor. Must be called inside a Tokio runtime; no socket is
    /// opened until the first [`acquire`](Self::acquire).
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let url = url.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Absent);
        let actor = Actor {
            url: url.clone(),
            reconnect_delay,
            cmd_rx,
            state_tx,
            sinks: HashMap::new(),
            waiters: Vec::new(),
            generation: 0,
        };
        let handler = tokio::spawn(actor.run());
        Self {
            url,
            cmd_tx,
            state_rx,
            handler: Mutex::new(Some(handler)),
        }
    }

    /// Socket URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Return the open connection, connecting first if necessary.
    ///
    /// Concurrent callers share one connect attempt. A failed attempt is
    /// reported to everyone waiting on it; the actor keeps retrying in the
    /// background.
    pub async fn acquire(&self) -> Result<ConnectionHandle, ConnectionError> {
        if let ConnectionState::Open { generation } = self.state() {
            return Ok(ConnectionHandle { generation });
        }
        let (reply, rx) = oneshot::channel();
        self.command(Command::Acquire { reply })?;
        rx.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Serialize `frame` and write it to the open connection.
    pub async fn send(&self, frame: &OutboundFrame) -> Result<ConnectionHandle, ConnectionError> {
        let text = serde_json::to_string(frame)?;
        let handle = self.acquire().await?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Write { text, reply })?;
        rx.await.map_err(|_| ConnectionError::Closed)??;
        debug!(request_id = %frame.request_id, generation = handle.generation, "frame sent");
        Ok(handle)
    }

    /// Start delivering every inbound frame to `sink`.
    pub fn register(&self, id: RequestId, sink: FrameSink) -> Result<(), ConnectionError> {
        self.command(Command::Register { id, sink })
    }

    /// Stop delivering frames for `id`. Unknown ids are ignored.
    pub fn unregister(&self, id: &RequestId) {
        let _ = self.command(Command::Unregister { id: id.clone() });
    }

    /// Close the socket and stop the actor. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            if let Err(e) = handler.await {
                warn!(error = %e, "connection actor panicked");
            }
        }
    }

    fn command(&self, cmd: Command) -> Result<(), ConnectionError> {
        self.cmd_tx.send(cmd).map_err(|_| ConnectionError::Closed)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.get_mut().take() {
            handler.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

enum Flow {
    Continue,
    Stop,
}

struct Actor {
    url: String,
    reconnect_delay: Duration,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    sinks: HashMap<RequestId, FrameSink>,
    waiters: Vec<Reply<ConnectionHandle>>,
    generation: u64,
}

impl Actor {
    async fn run(mut self) {
        let mut retry_at: Option<Instant> = None;
        while let Some(ws) = self.until_connected(&mut retry_at).await {
            if let Flow::Stop = self.pump(ws).await {
                break;
            }
            retry_at = Some(Instant::now() + self.reconnect_delay);
        }
        self.set_state(ConnectionState::Absent);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(ConnectionError::Closed));
        }
        debug!("connection actor stopped");
    }

    /// Serve commands until a socket is open. `None` means shut down.
    async fn until_connected(&mut self, retry_at: &mut Option<Instant>) -> Option<WsStream> {
        loop {
            if self.waiters.is_empty() {
                match *retry_at {
                    None => {
                        let cmd = self.cmd_rx.recv().await;
                        if let Flow::Stop = self.offline_command(cmd) {
                            return None;
                        }
                        continue;
                    }
                    Some(deadline) => {
                        tokio::select! {
                            cmd = self.cmd_rx.recv() => {
                                if let Flow::Stop = self.offline_command(cmd) {
                                    return None;
                                }
                                continue;
                            }
                            () = tokio::time::sleep_until(deadline) => {}
                        }
                    }
                }
            }

            *retry_at = None;
            self.set_state(ConnectionState::Connecting);
            info!(url = %self.url, "connecting to backend");

            let connect = connect_async(self.url.clone());
            tokio::pin!(connect);
            let result = loop {
                tokio::select! {
                    res = &mut connect => break res,
                    cmd = self.cmd_rx.recv() => {
                        if let Flow::Stop = self.offline_command(cmd) {
                            return None;
                        }
                    }
                }
            };

            match result {
                Ok((ws, _)) => {
                    self.generation += 1;
                    let handle = ConnectionHandle {
                        generation: self.generation,
                    };
                    self.set_state(ConnectionState::Open {
                        generation: self.generation,
                    });
                    info!(generation = self.generation, "backend connection open");
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(Ok(handle));
                    }
                    return Some(ws);
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "backend connection failed");
                    self.set_state(ConnectionState::Absent);
                    for waiter in self.waiters.drain(..) {
                        let _ = waiter.send(Err(ConnectionError::Connect {
                            url: self.url.clone(),
                            reason: e.to_string(),
                        }));
                    }
                    *retry_at = Some(Instant::now() + self.reconnect_delay);
                }
            }
        }
    }

    /// Serve the open socket until it closes or the actor is told to stop.
    async fn pump(&mut self, ws: WsStream) -> Flow {
        let (mut ws_tx, mut ws_rx) = ws.split();
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(Command::Shutdown) => {
                        self.set_state(ConnectionState::Closing);
                        let _ = ws_tx.send(Message::Close(None)).await;
                        let _ = ws_tx.close().await;
                        return Flow::Stop;
                    }
                    Some(Command::Acquire { reply }) => {
                        let _ = reply.send(Ok(ConnectionHandle { generation: self.generation }));
                    }
                    Some(Command::Write { text, reply }) => {
                        let result = ws_tx
                            .send(Message::Text(text.into()))
                            .await
                            .map_err(|e| ConnectionError::Send(e.to_string()));
                        let failed = result.is_err();
                        let _ = reply.send(result);
                        if failed {
                            break;
                        }
                    }
                    Some(Command::Register { id, sink }) => {
                        let _ = self.sinks.insert(id, sink);
                    }
                    Some(Command::Unregister { id }) => {
                        let _ = self.sinks.remove(&id);
                    }
                },
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.broadcast(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "backend sent close");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "backend connection error");
                        break;
                    }
                    None => break,
                },
            }
        }
        info!(generation = self.generation, "backend connection closed");
        self.set_state(ConnectionState::Absent);
        Flow::Continue
    }

    fn offline_command(&mut self, cmd: Option<Command>) -> Flow {
        match cmd {
            None | Some(Command::Shutdown) => return Flow::Stop,
            Some(Command::Acquire { reply }) => self.waiters.push(reply),
            Some(Command::Write { reply, .. }) => {
                let _ = reply.send(Err(ConnectionError::NotConnected));
            }
            Some(Command::Register { id, sink }) => {
                let _ = self.sinks.insert(id, sink);
            }
            Some(Command::Unregister { id }) => {
                let _ = self.sinks.remove(&id);
            }
        }
        Flow::Continue
    }

    fn broadcast(&mut self, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        self.sinks.retain(|id, sink| {
            let alive = sink.send(frame.clone()).is_ok();
            if !alive {
                debug!(request_id = %id, "frame sink closed, removing");
            }
            alive
        });
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send_replace(state);
    }
}
