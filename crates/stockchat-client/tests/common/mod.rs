//! Scripted inference backend for integration tests.

#![allow(dead_code, unused_results)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use stockchat_core::OutboundFrame;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// What the backend does in response to one request frame.
#[derive(Clone, Debug)]
pub enum Step {
    /// Send a JSON frame.
    Frame(Value),
    /// Send raw text.
    Raw(String),
    /// Close the socket.
    Close,
}

type Script = Arc<dyn Fn(&OutboundFrame) -> Vec<Step> + Send + Sync>;

pub struct MockBackend {
    pub url: String,
    pub received: mpsc::UnboundedReceiver<OutboundFrame>,
    connections: Arc<AtomicUsize>,
    pushes: broadcast::Sender<String>,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&OutboundFrame) -> Vec<Step> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script: Script = Arc::new(script);
        let (received_tx, received) = mpsc::unbounded_channel();
        let (pushes, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let pushes = pushes.clone();
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&script),
                        received_tx.clone(),
                        pushes.subscribe(),
                    ));
                }
            })
        };

        Self {
            url: format!("ws://{addr}/ws/stock/chat"),
            received,
            connections,
            pushes,
            task,
        }
    }

    /// Number of accepted connections so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send `frame` on every open connection.
    pub fn push(&self, frame: Value) {
        let _ = self.pushes.send(frame.to_string());
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    script: Script,
    received: mpsc::UnboundedSender<OutboundFrame>,
    mut pushes: broadcast::Receiver<String>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut tx, mut rx) = ws.split();
    loop {
        tokio::select! {
            msg = rx.next() => {
                let Some(Ok(msg)) = msg else { return };
                let Message::Text(text) = msg else { continue };
                let Ok(frame) = serde_json::from_str::<OutboundFrame>(text.as_str()) else {
                    continue;
                };
                let steps = script(&frame);
                let _ = received.send(frame);
                for step in steps {
                    let out = match step {
                        Step::Frame(value) => Message::Text(value.to_string().into()),
                        Step::Raw(text) => Message::Text(text.into()),
                        Step::Close => {
                            let _ = tx.send(Message::Close(None)).await;
                            return;
                        }
                    };
                    if tx.send(out).await.is_err() {
                        return;
                    }
                }
            }
            pushed = pushes.recv() => {
                let Ok(text) = pushed else { return };
                if tx.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
        }
    }
}
