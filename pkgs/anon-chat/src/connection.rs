//! Connection lifecycle for the single relay socket
//!
//! This module owns the one live connection of a session:
//! - `open` closes any previous handle, appends the auth token to the endpoint
//!   and asks the [`Connector`] to start connecting without blocking
//! - progress comes back as [`ConnectionEvent`]s on one shared channel, tagged
//!   with the handle that produced them
//! - `on_event` applies state transitions and parses inbound text into
//!   [`Message`]s, silently dropping malformed frames and stale handles
//!
//! # States
//!
//! ```text
//! Closed --open--> Connecting --Opened--> Open --Closed--> Closed
//!                      |                    |
//!                      +------Errored-------+-----> Errored
//! ```

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config;
use crate::error::ChatError;
use crate::frame::{Frame, Message};

/// Identifier of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Handle(u64);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Opened,
    Frame(String),
    Closed,
    Errored(String),
}

/// Raw transport event, as produced by a connector task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub handle: Handle,
    pub kind: ConnectionEventKind,
}

impl ConnectionEvent {
    pub fn new(handle: Handle, kind: ConnectionEventKind) -> Self {
        Self { handle, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<ConnectionEvent>;

/// Classified result of [`ConnectionManager::on_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Opened,
    Message(Message),
    Closed,
    Errored(String),
}

/// Transport seam used by [`ConnectionManager`]
pub trait Connector: Send + Sync {
    /// Begin connecting to `url` and return immediately
    ///
    /// Implementations report `Opened`, `Frame`, `Closed` and `Errored` for
    /// `handle` on `events`, and write every string received on `outbound` to
    /// the socket. Dropping the sender side of `outbound` closes the link.
    fn connect(
        &self,
        handle: Handle,
        url: Url,
        outbound: mpsc::UnboundedReceiver<String>,
        events: EventSender,
    );
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        handle: Handle,
        url: Url,
        outbound: mpsc::UnboundedReceiver<String>,
        events: EventSender,
    ) {
        tokio::spawn(run_socket(handle, url, outbound, events));
    }
}

#[instrument(skip_all, fields(handle = %handle))]
async fn run_socket(
    handle: Handle,
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: EventSender,
) {
    let report = |kind| {
        let _ = events.send(ConnectionEvent::new(handle, kind));
    };

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("Failed to connect to relay: {}", e);
            report(ConnectionEventKind::Errored(e.to_string()));
            return;
        }
    };

    info!("Connected to relay");
    report(ConnectionEventKind::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        warn!("Failed to write frame: {}", e);
                        report(ConnectionEventKind::Errored(e.to_string()));
                        return;
                    }
                }
                None => {
                    debug!("Connection released, closing socket");
                    let _ = write.close().await;
                    return;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => report(ConnectionEventKind::Frame(text)),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => report(ConnectionEventKind::Frame(text)),
                    Err(_) => debug!("Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Relay closed the connection");
                    report(ConnectionEventKind::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket error: {}", e);
                    report(ConnectionEventKind::Errored(e.to_string()));
                    return;
                }
            },
        }
    }
}

struct Link {
    handle: Handle,
    outbound: mpsc::UnboundedSender<String>,
}

/// Owner of the session's single relay connection
pub struct ConnectionManager<C = WebSocketConnector> {
    connector: C,
    events: EventSender,
    token_param: String,
    next_handle: u64,
    link: Option<Link>,
    state: ConnectionState,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, events: EventSender) -> Self {
        Self {
            connector,
            events,
            token_param: config::DEFAULT_TOKEN_PARAM.to_string(),
            next_handle: 1,
            link: None,
            state: ConnectionState::Closed,
        }
    }

    pub fn with_token_param(mut self, param: impl Into<String>) -> Self {
        self.token_param = param.into();
        self
    }

    /// Start a new connection, closing the previous one first
    pub fn open(&mut self, endpoint: &Url, token: &str) -> Handle {
        if let Some(previous) = self.handle() {
            self.close(previous);
        }

        let handle = Handle(self.next_handle);
        self.next_handle += 1;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let url = config::with_token(endpoint, &self.token_param, token);
        debug!(handle = %handle, endpoint = %endpoint, "Opening relay connection");

        self.link = Some(Link {
            handle,
            outbound: outbound_tx,
        });
        self.state = ConnectionState::Connecting;
        self.connector
            .connect(handle, url, outbound_rx, self.events.clone());
        handle
    }

    /// Queue a frame on `handle`; rejected unless that handle is current and open
    pub fn send(&self, handle: Handle, frame: &Frame) -> Result<(), ChatError> {
        let link = match &self.link {
            Some(link) if link.handle == handle && self.state == ConnectionState::Open => link,
            _ => return Err(ChatError::NotConnected),
        };

        let text = frame.encode()?;
        debug!(handle = %handle, kind = %frame.kind, to = %frame.to, "Sending frame");
        link.outbound
            .send(text)
            .map_err(|_| ChatError::NotConnected)
    }

    /// Close `handle`; closing a stale or already-closed handle does nothing
    pub fn close(&mut self, handle: Handle) {
        if self.handle() != Some(handle) {
            return;
        }
        // Dropping the outbound sender tells the connector task to shut down
        self.link = None;
        self.state = ConnectionState::Closed;
        debug!(handle = %handle, "Closed relay connection");
    }

    /// Apply a transport event; returns `None` for stale handles and dropped frames
    pub fn on_event(&mut self, event: ConnectionEvent) -> Option<Inbound> {
        if self.handle() != Some(event.handle) {
            debug!(handle = %event.handle, "Ignoring event from stale connection");
            return None;
        }

        match event.kind {
            ConnectionEventKind::Opened => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                self.state = ConnectionState::Open;
                Some(Inbound::Opened)
            }
            ConnectionEventKind::Frame(raw) => match Message::decode(&raw) {
                Some(message) => Some(Inbound::Message(message)),
                None => {
                    debug!(handle = %event.handle, len = raw.len(), "Dropping malformed frame");
                    None
                }
            },
            ConnectionEventKind::Closed => {
                self.link = None;
                self.state = ConnectionState::Closed;
                Some(Inbound::Closed)
            }
            ConnectionEventKind::Errored(reason) => {
                self.link = None;
                self.state = ConnectionState::Errored;
                Some(Inbound::Errored(reason))
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn handle(&self) -> Option<Handle> {
        self.link.as_ref().map(|link| link.handle)
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Capture {
        urls: Arc<Mutex<Vec<(Handle, Url)>>>,
        outbound: Arc<Mutex<Vec<mpsc::UnboundedReceiver<String>>>>,
    }

    impl Connector for Capture {
        fn connect(
            &self,
            handle: Handle,
            url: Url,
            outbound: mpsc::UnboundedReceiver<String>,
            _events: EventSender,
        ) {
            self.urls.lock().push((handle, url));
            self.outbound.lock().push(outbound);
        }
    }

    fn manager() -> (ConnectionManager<Capture>, Capture) {
        let capture = Capture::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(capture.clone(), tx), capture)
    }

    fn endpoint() -> Url {
        Url::parse("ws://relay.test/ws").unwrap()
    }

    #[test]
    fn test_open_appends_token_and_connects() {
        let (mut manager, capture) = manager();
        let handle = manager.open(&endpoint(), "secret");

        assert_eq!(manager.state(), ConnectionState::Connecting);
        let urls = capture.urls.lock();
        assert_eq!(urls[0].0, handle);
        assert_eq!(urls[0].1.as_str(), "ws://relay.test/ws?token=secret");
    }

    #[test]
    fn test_send_requires_open_state() {
        let (mut manager, _capture) = manager();
        let handle = manager.open(&endpoint(), "t");
        let frame = Frame::chat("alice", "bob", "hi");

        assert!(matches!(manager.send(handle, &frame), Err(ChatError::NotConnected)));

        manager.on_event(ConnectionEvent::new(handle, ConnectionEventKind::Opened));
        assert!(manager.send(handle, &frame).is_ok());
    }

    #[test]
    fn test_reopen_closes_previous_handle() {
        let (mut manager, capture) = manager();
        let first = manager.open(&endpoint(), "t");
        let second = manager.open(&endpoint(), "t");

        assert_ne!(first, second);
        assert_eq!(manager.handle(), Some(second));
        assert!(matches!(
            capture.outbound.lock()[0].try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // Late events from the first socket are ignored
        assert_eq!(
            manager.on_event(ConnectionEvent::new(first, ConnectionEventKind::Opened)),
            None
        );
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut manager, _capture) = manager();
        let handle = manager.open(&endpoint(), "t");

        manager.close(handle);
        manager.close(handle);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.handle(), None);
    }

    #[test]
    fn test_malformed_frames_are_dropped() {
        let (mut manager, _capture) = manager();
        let handle = manager.open(&endpoint(), "t");
        manager.on_event(ConnectionEvent::new(handle, ConnectionEventKind::Opened));

        let dropped = manager.on_event(ConnectionEvent::new(
            handle,
            ConnectionEventKind::Frame("{\"type\":".to_string()),
        ));
        assert_eq!(dropped, None);
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[test]
    fn test_error_transitions_to_errored() {
        let (mut manager, _capture) = manager();
        let handle = manager.open(&endpoint(), "t");

        let inbound = manager.on_event(ConnectionEvent::new(
            handle,
            ConnectionEventKind::Errored("refused".to_string()),
        ));
        assert_eq!(inbound, Some(Inbound::Errored("refused".to_string())));
        assert_eq!(manager.state(), ConnectionState::Errored);
        assert_eq!(manager.handle(), None);
    }
}
