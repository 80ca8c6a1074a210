//! Shared test utilities: a single-connection STOMP server over WebSocket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use dp5_socket::stomp::{parse_frames, StompCommand, StompFrame};
use dp5_socket::SubscriberEvent;

const WAIT: Duration = Duration::from_secs(5);

/// How the mock answers the client's CONNECT frame.
#[derive(Debug, Clone)]
pub enum Handshake {
    Accept {
        session: Option<&'static str>,
        heart_beat: &'static str,
    },
    Reject(&'static str),
    Silent,
}

impl Handshake {
    pub fn accept(session: &'static str) -> Self {
        Handshake::Accept {
            session: Some(session),
            heart_beat: "0,0",
        }
    }
}

enum ServerAction {
    Send(Message),
    Drop,
}

pub struct MockStompServer {
    port: u16,
    outbound: mpsc::UnboundedSender<ServerAction>,
    inbound: mpsc::UnboundedReceiver<String>,
    message_ids: AtomicUsize,
    task: JoinHandle<()>,
}

impl MockStompServer {
    pub async fn start(handshake: Handshake) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerAction>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("websocket upgrade");

            // CONNECT
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = in_tx.send(text.as_str().to_owned());
            }
            match handshake {
                Handshake::Accept {
                    session,
                    heart_beat,
                } => {
                    let mut connected = StompFrame::new(StompCommand::Connected)
                        .header("version", "1.2")
                        .header("heart-beat", heart_beat);
                    if let Some(session) = session {
                        connected = connected.header("session", session);
                    }
                    let _ = ws.send(Message::Text(connected.encode().into())).await;
                }
                Handshake::Reject(message) => {
                    let error = StompFrame::new(StompCommand::Error)
                        .header("message", message)
                        .with_body("access denied");
                    let _ = ws.send(Message::Text(error.encode().into())).await;
                    let _ = ws.send(Message::Close(None)).await;
                }
                Handshake::Silent => {}
            }

            loop {
                tokio::select! {
                    inbound = ws.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(text.as_str().to_owned());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    action = out_rx.recv() => match action {
                        Some(ServerAction::Send(msg)) => {
                            let _ = ws.send(msg).await;
                        }
                        Some(ServerAction::Drop) | None => return,
                    },
                }
            }
        });

        Self {
            port,
            outbound: out_tx,
            inbound: in_rx,
            message_ids: AtomicUsize::new(0),
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/dp5-websocket", self.port)
    }

    pub fn send_frame(&self, frame: StompFrame) {
        self.send_raw(&frame.encode());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self
            .outbound
            .send(ServerAction::Send(Message::Text(text.to_owned().into())));
    }

    /// Push a MESSAGE on the events topic for subscription `sub-0`.
    pub fn publish(&self, body: &str) {
        let id = self.message_ids.fetch_add(1, Ordering::SeqCst);
        self.send_frame(
            StompFrame::new(StompCommand::Message)
                .header("destination", "/topic/events")
                .header("subscription", "sub-0")
                .header("message-id", format!("m-{id}"))
                .header("content-type", "application/json")
                .with_body(body),
        );
    }

    pub fn close(&self) {
        let _ = self
            .outbound
            .send(ServerAction::Send(Message::Close(None)));
    }

    /// Drop the TCP connection without a closing handshake.
    pub fn drop_connection(&self) {
        let _ = self.outbound.send(ServerAction::Drop);
    }

    /// Next raw text message from the client.
    pub async fn next_raw(&mut self) -> String {
        tokio::time::timeout(WAIT, self.inbound.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client stream ended")
    }

    /// Next STOMP frame from the client, skipping heart-beats.
    pub async fn next_frame(&mut self) -> StompFrame {
        loop {
            let raw = self.next_raw().await;
            if let Some(frame) = parse_frames(&raw).expect("client sent a valid frame").into_iter().next() {
                return frame;
            }
        }
    }
}

impl Drop for MockStompServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Next subscriber event, failing the test after a few seconds.
pub async fn next_event(rx: &mut broadcast::Receiver<SubscriberEvent>) -> SubscriberEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for subscriber event")
        .expect("dispatcher closed")
}

/// A port on localhost with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}
