//! WebSocket transport session carrying both the control channel (text
//! frames) and the media channel (binary frames) to the camera device.

use super::{Endpoint, TransportError};
use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::Message;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Connection lifecycle of the transport session.
///
/// Transitions are driven only by transport-level open/close events, never
/// inferred from payload content. Sends are legal only in `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// One inbound or outbound frame. Text carries the control channel,
/// binary carries framed media units; the frame type is what keeps the
/// two multiplexed channels distinguishable on one socket.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
}

/// Events delivered through the session's event channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Message(WireMessage),
    Error(TransportError),
}

/// Client side of the persistent device connection.
///
/// `connect`, `send` and `disconnect` never block and never return errors;
/// everything the caller needs to know arrives as a [`TransportEvent`].
/// The outbound path is a single ordered queue drained by a writer task, so
/// submission order is wire order. The receive loop re-arms after every
/// message and stops only on a receive error or an explicit disconnect.
pub struct TransportSession {
    state: Arc<Mutex<ConnectionState>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    cancel: Mutex<CancellationToken>,
}

impl TransportSession {
    /// Create a session and the receiving end of its event channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let session = Self {
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            events,
            outbound: Arc::new(Mutex::new(None)),
            cancel: Mutex::new(CancellationToken::new()),
        };
        (session, event_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Begin an asynchronous connection attempt.
    ///
    /// An unparseable endpoint is reported as `InvalidEndpoint` without any
    /// state change or I/O. Otherwise the session moves to `Connecting`, the
    /// handshake runs in the background, and success fires one `Connected`
    /// event. A handshake failure fires `ConnectionFailed` and drops back to
    /// `Disconnected`. Calling `connect` again supersedes any previous
    /// attempt or connection.
    pub fn connect(&self, endpoint: &Endpoint) {
        let url = match endpoint.url() {
            Ok(url) => url,
            Err(e) => {
                log::warn!("TransportSession: refusing connect to {endpoint}: {e}");
                self.emit(TransportEvent::Error(e));
                return;
            }
        };

        // Supersede whatever connection or attempt came before.
        let token = {
            let mut guard = self.cancel.lock().unwrap();
            guard.cancel();
            *guard = CancellationToken::new();
            guard.clone()
        };
        self.outbound.lock().unwrap().take();
        self.set_state(ConnectionState::Connecting);
        log::info!("TransportSession: connecting to {url}");

        let state = Arc::clone(&self.state);
        let outbound = Arc::clone(&self.outbound);
        let events = self.events.clone();

        tokio::spawn(async move {
            let conn = tokio::select! {
                _ = token.cancelled() => return,
                conn = connect_async(url.as_str()) => conn,
            };

            let ws = match conn {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    log::warn!("TransportSession: handshake failed: {e}");
                    *state.lock().unwrap() = ConnectionState::Disconnected;
                    let _ = events
                        .send(TransportEvent::Error(TransportError::ConnectionFailed(
                            e.to_string(),
                        )));
                    return;
                }
            };

            let (mut sink, mut stream) = ws.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
            outbound.lock().unwrap().replace(out_tx);

            // Queue first, then state: a send racing the connect event must
            // find the outbound path already in place.
            *state.lock().unwrap() = ConnectionState::Connected;
            let _ = events.send(TransportEvent::Connected);

            // Writer: drains the ordered outbound queue. A failed write is
            // reported per message and does not tear the connection down.
            let writer_events = events.clone();
            let writer_token = token.clone();
            tokio::spawn(async move {
                loop {
                    let msg = tokio::select! {
                        _ = writer_token.cancelled() => None,
                        msg = out_rx.recv() => msg,
                    };
                    let Some(msg) = msg else {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    if let Err(e) = sink.send(msg).await {
                        log::warn!("TransportSession: send failed: {e}");
                        let _ = writer_events.send(TransportEvent::Error(
                            TransportError::SendFailed(e.to_string()),
                        ));
                    }
                }
            });

            // Receive loop: deliver, re-arm, repeat. Stops on receive error
            // or cancellation and never restarts itself.
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Message(WireMessage::Text(
                            text.to_string(),
                        )));
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        let _ = events.send(TransportEvent::Message(WireMessage::Binary(
                            payload.into(),
                        )));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        log::info!("TransportSession: closed by peer");
                        outbound.lock().unwrap().take();
                        *state.lock().unwrap() = ConnectionState::Disconnected;
                        let _ = events.send(TransportEvent::Disconnected);
                        break;
                    }
                    Some(Ok(_)) => {
                        // ping/pong and raw frames are transport noise
                    }
                    Some(Err(e)) => {
                        log::warn!("TransportSession: receive failed: {e}");
                        let _ = events.send(TransportEvent::Error(
                            TransportError::ReceiveFailed(e.to_string()),
                        ));
                        break;
                    }
                }
            }
        });
    }

    /// Queue a frame for transmission.
    ///
    /// When the session is not `Connected` this performs no I/O and reports
    /// `NotConnected` through the event channel.
    pub fn send(&self, message: WireMessage) {
        if self.state() != ConnectionState::Connected {
            self.emit(TransportEvent::Error(TransportError::NotConnected));
            return;
        }
        let msg = match message {
            WireMessage::Text(text) => Message::text(text),
            WireMessage::Binary(payload) => Message::binary(payload),
        };
        let guard = self.outbound.lock().unwrap();
        match &*guard {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    self.emit(TransportEvent::Error(TransportError::SendFailed(
                        "outbound queue closed".to_string(),
                    )));
                }
            }
            None => self.emit(TransportEvent::Error(TransportError::NotConnected)),
        }
    }

    pub fn send_text(&self, text: String) {
        self.send(WireMessage::Text(text));
    }

    pub fn send_binary(&self, payload: Bytes) {
        self.send(WireMessage::Binary(payload));
    }

    /// Tear the connection down.
    ///
    /// Idempotent and callable from any task or thread without blocking.
    /// Always re-asserts `Disconnected` and fires one disconnect event, even
    /// when nothing was connected.
    pub fn disconnect(&self) {
        self.cancel.lock().unwrap().cancel();
        self.outbound.lock().unwrap().take();
        self.set_state(ConnectionState::Disconnected);
        self.emit(TransportEvent::Disconnected);
        log::info!("TransportSession: disconnected");
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<TransportEvent>,
    ) -> TransportEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    /// Accept one WebSocket client and forward every inbound message.
    async fn spawn_server() -> (u16, mpsc::UnboundedReceiver<Message>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = async_tungstenite::tokio::accept_async(stream)
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });
        (port, rx)
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_reported_without_state_change() {
        let (session, mut events) = TransportSession::new();
        session.connect(&Endpoint::new("", 8080));

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Error(TransportError::InvalidEndpoint(_))
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_reports_not_connected() {
        let (session, mut events) = TransportSession::new();
        session.send_text("{\"type\":\"panTilt\"}".to_string());

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Error(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_reports_connection_failed() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (session, mut events) = TransportSession::new();
        session.connect(&Endpoint::new("127.0.0.1", port));

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Error(TransportError::ConnectionFailed(_))
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_send_disconnect_round_trip() {
        let (port, mut server_rx) = spawn_server().await;
        let (session, mut events) = TransportSession::new();

        session.connect(&Endpoint::new("127.0.0.1", port));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Connected
        ));
        assert_eq!(session.state(), ConnectionState::Connected);

        session.send_text("hello".to_string());
        session.send_binary(Bytes::from_static(b"\x01\x02"));

        let first = timeout(Duration::from_secs(5), server_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, Message::Text(ref t) if t.as_str() == "hello"));
        let second = timeout(Duration::from_secs(5), server_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, Message::Binary(_)));

        session.disconnect();
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_always_fires() {
        let (session, mut events) = TransportSession::new();

        session.disconnect();
        session.disconnect();

        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected
        ));
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected
        ));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
