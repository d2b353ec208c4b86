//! Session engine: the root of a chat session
//!
//! The engine composes the connection, the active conversation's log, the
//! contact registry and the unread tracker. It is synchronous; all I/O is
//! fire-and-forget through the [`ConnectionManager`] and the storage
//! collaborator, and results come back later as [`ConnectionEvent`]s.
//!
//! # Phases
//!
//! - `NoPeer`: no conversation selected
//! - `Loading`: peer selected, log cleared, history requested or deferred
//! - `Live`: the first frame of the conversation has arrived
//! - `Closed`: terminal, after shutdown or logout
//!
//! # Routing
//!
//! Every inbound message is checked twice, independently:
//! 1. relevant to the active conversation → [`MessageLog`]
//! 2. a `chat` from someone other than the user and the active peer →
//!    [`UnreadTracker::increment`] and [`ContactRegistry::add`]

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, Inbound, WebSocketConnector,
};
use crate::contacts::ContactRegistry;
use crate::error::{ChatError, Result};
use crate::frame::{Frame, FrameKind, Message};
use crate::message_log::{Applied, LogEvent, MessageLog};
use crate::storage::{self, Storage};
use crate::unread::UnreadTracker;

/// Identity handed over by the authentication collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    /// Opaque, already validated session token
    pub token: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    NoPeer,
    Loading,
    Live,
    Closed,
}

/// Observable change, for UI collaborators that re-render incrementally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionStateChanged { state: ConnectionState },
    PhaseChanged { phase: Phase },
    LogCleared { peer: String },
    MessageAppended { message: Message },
    ContactAdded { contact: String },
    UnreadChanged { contact: String, count: u32 },
    CommandRejected { reason: String },
}

/// Input from the UI collaborator to [`SessionEngine::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    SelectPeer(String),
    SendText(String),
    AddContact(String),
    Logout,
    Shutdown,
}

/// Everything a UI needs to render the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub user_id: String,
    pub active_peer: Option<String>,
    pub phase: Phase,
    pub connection: ConnectionState,
    pub messages: Vec<Message>,
    pub contacts: Vec<String>,
    pub unread: HashMap<String, u32>,
}

/// Receivers created alongside a [`SessionEngine`]
pub struct SessionChannels {
    /// Transport events; feed them back through [`SessionEngine::handle_connection_event`]
    pub connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub session_events: mpsc::UnboundedReceiver<SessionEvent>,
}

pub struct SessionEngine<C = WebSocketConnector> {
    credentials: Credentials,
    endpoint: Url,
    active_peer: Option<String>,
    phase: Phase,
    history_pending: bool,
    log: MessageLog,
    contacts: ContactRegistry,
    unread: UnreadTracker,
    connection: ConnectionManager<C>,
    storage: Arc<dyn Storage>,
    notifier: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionEngine<WebSocketConnector> {
    /// Engine backed by a real websocket connection
    pub fn connect_with(
        credentials: Credentials,
        config: &ClientConfig,
        storage: Arc<dyn Storage>,
    ) -> (Self, SessionChannels) {
        Self::new(credentials, config, storage, WebSocketConnector)
    }
}

impl<C: Connector> SessionEngine<C> {
    pub fn new(
        credentials: Credentials,
        config: &ClientConfig,
        storage: Arc<dyn Storage>,
        connector: C,
    ) -> (Self, SessionChannels) {
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (notifier, session_rx) = mpsc::unbounded_channel();

        let connection = ConnectionManager::new(connector, connection_tx)
            .with_token_param(config.token_param.clone());
        let contacts = ContactRegistry::load(storage.clone(), &credentials.user_id);
        let unread = UnreadTracker::load(storage.clone(), &credentials.user_id);

        info!(user = %credentials.user_id, "Session created");
        let engine = Self {
            credentials,
            endpoint: config.endpoint.clone(),
            active_peer: None,
            phase: Phase::NoPeer,
            history_pending: false,
            log: MessageLog::new(),
            contacts,
            unread,
            connection,
            storage,
            notifier,
        };

        (
            engine,
            SessionChannels {
                connection_events: connection_rx,
                session_events: session_rx,
            },
        )
    }

    /// Make `peer` the active conversation
    ///
    /// Always clears the log first. The history request goes out immediately
    /// when the connection is open; otherwise a connection is opened (if none is
    /// in flight) and the request waits for it.
    pub fn select_peer(&mut self, peer: &str) -> Result<()> {
        self.ensure_running()?;
        let peer = self.validate_contact(peer)?;

        let in_flight = matches!(
            self.connection.state(),
            ConnectionState::Open | ConnectionState::Connecting
        );
        if in_flight && self.active_peer.as_deref() == Some(peer.as_str()) {
            debug!(peer = %peer, "Peer already active");
            return Ok(());
        }

        info!(peer = %peer, "Switching conversation");
        self.active_peer = Some(peer.clone());
        if self.unread.count(&peer) > 0 {
            self.emit(SessionEvent::UnreadChanged {
                contact: peer.clone(),
                count: 0,
            });
        }
        self.unread.set_active(Some(&peer));

        self.log.apply(LogEvent::Clear);
        self.emit(SessionEvent::LogCleared { peer: peer.clone() });
        self.set_phase(Phase::Loading);

        match self.connection.state() {
            ConnectionState::Open => self.request_history(),
            ConnectionState::Connecting => self.history_pending = true,
            ConnectionState::Closed | ConnectionState::Errored => {
                self.history_pending = true;
                self.connection
                    .open(&self.endpoint, &self.credentials.token);
                self.emit_connection_state();
            }
        }
        Ok(())
    }

    /// Send trimmed text to the active peer
    ///
    /// The message is not appended locally; it shows up when the relay echoes it.
    pub fn send_text(&mut self, input: &str) -> Result<()> {
        self.ensure_running()?;
        let text = input.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let peer = self.active_peer.as_deref().ok_or(ChatError::NoActivePeer)?;
        let handle = match self.connection.handle() {
            Some(handle) if self.connection.is_open() => handle,
            _ => return Err(ChatError::NotConnected),
        };

        let frame = Frame::chat(&self.credentials.user_id, peer, text);
        self.connection.send(handle, &frame)
    }

    /// Whether [`send_text`](Self::send_text) would go through for `input`
    pub fn can_send(&self, input: &str) -> bool {
        self.phase != Phase::Closed
            && !input.trim().is_empty()
            && self.active_peer.is_some()
            && self.connection.is_open()
    }

    /// Add a contact by id; returns `false` if it was already known
    pub fn add_contact(&mut self, contact: &str) -> Result<bool> {
        self.ensure_running()?;
        let contact = self.validate_contact(contact)?;

        let added = self.contacts.add(&contact);
        if added {
            self.emit(SessionEvent::ContactAdded { contact });
        }
        Ok(added)
    }

    /// Feed one transport event through the engine
    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        if self.phase == Phase::Closed {
            return;
        }

        match self.connection.on_event(event) {
            None => {}
            Some(Inbound::Opened) => {
                info!(user = %self.credentials.user_id, "Relay connection open");
                self.emit_connection_state();
                if std::mem::take(&mut self.history_pending) {
                    self.request_history();
                }
            }
            Some(Inbound::Closed) => {
                info!("Relay connection closed");
                self.history_pending = false;
                self.emit_connection_state();
            }
            Some(Inbound::Errored(reason)) => {
                warn!(reason = %reason, "Relay connection failed");
                self.history_pending = false;
                self.emit_connection_state();
            }
            Some(Inbound::Message(message)) => self.route(message),
        }
    }

    /// Close the connection; the engine accepts no further input afterwards
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        if let Some(handle) = self.connection.handle() {
            self.connection.close(handle);
            self.emit_connection_state();
        }
        self.history_pending = false;
        self.set_phase(Phase::Closed);
        info!(user = %self.credentials.user_id, "Session closed");
    }

    /// Shut down and forget everything stored for the current user
    pub fn logout(&mut self) {
        self.shutdown();
        storage::clear_user(self.storage.as_ref(), &self.credentials.user_id);
        info!(user = %self.credentials.user_id, "Logged out");
    }

    /// Rebind a running session to another user
    ///
    /// Closes the connection and reloads contacts and unread counts for the new
    /// user; nothing of the previous user's in-memory state is kept.
    pub fn switch_user(&mut self, credentials: Credentials) -> Result<()> {
        self.ensure_running()?;
        if let Some(handle) = self.connection.handle() {
            self.connection.close(handle);
            self.emit_connection_state();
        }

        self.credentials = credentials;
        self.active_peer = None;
        self.history_pending = false;
        self.log.apply(LogEvent::Clear);
        self.contacts.switch_user(&self.credentials.user_id);
        self.unread.switch_user(&self.credentials.user_id);
        self.set_phase(Phase::NoPeer);
        info!(user = %self.credentials.user_id, "Switched user");
        Ok(())
    }

    /// Apply a UI command; returns `false` once the session has ended
    pub fn execute(&mut self, command: SessionCommand) -> bool {
        let result = match command {
            SessionCommand::SelectPeer(peer) => self.select_peer(&peer),
            SessionCommand::SendText(text) => self.send_text(&text),
            SessionCommand::AddContact(contact) => self.add_contact(&contact).map(|_| ()),
            SessionCommand::Logout => {
                self.logout();
                return false;
            }
            SessionCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        };

        if let Err(e) = result {
            debug!("Command rejected: {}", e);
            self.emit(SessionEvent::CommandRejected {
                reason: e.to_string(),
            });
        }
        true
    }

    /// Dispatch loop: one task consuming UI commands and transport events in order
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.execute(command) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some(event) = connection_events.recv() => self.handle_connection_event(event),
            }
        }
        debug!("Session dispatch loop finished");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.credentials.user_id.clone(),
            active_peer: self.active_peer.clone(),
            phase: self.phase,
            connection: self.connection.state(),
            messages: self.log.entries().to_vec(),
            contacts: self.contacts.list().to_vec(),
            unread: self.unread.counts().clone(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.credentials.user_id
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.active_peer.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.entries()
    }

    pub fn contacts(&self) -> &[String] {
        self.contacts.list()
    }

    pub fn unread_count(&self, contact: &str) -> u32 {
        self.unread.count(contact)
    }

    /// Unread messages across all contacts
    pub fn unread_total(&self) -> u32 {
        self.unread.total()
    }

    fn route(&mut self, message: Message) {
        let user = self.credentials.user_id.as_str();

        if message.kind == FrameKind::Chat
            && message.from != user
            && self.active_peer.as_deref() != Some(message.from.as_str())
        {
            if let Some(count) = self.unread.increment(&message.from) {
                self.emit(SessionEvent::UnreadChanged {
                    contact: message.from.clone(),
                    count,
                });
            }
            if self.contacts.add(&message.from) {
                self.emit(SessionEvent::ContactAdded {
                    contact: message.from.clone(),
                });
            }
        }

        let relevant = match self.active_peer.as_deref() {
            Some(peer) => message.is_relevant_to(&self.credentials.user_id, peer),
            None => false,
        };
        if !relevant {
            debug!(from = %message.from, to = %message.to, kind = %message.kind, "Frame outside active conversation");
            return;
        }

        if self.log.apply(LogEvent::Received(message.clone())) == Applied::Appended {
            self.emit(SessionEvent::MessageAppended { message });
            if self.phase == Phase::Loading {
                self.set_phase(Phase::Live);
            }
        } else {
            debug!(id = %message.id, "Duplicate message absorbed");
        }
    }

    fn request_history(&self) {
        let (Some(peer), Some(handle)) = (self.active_peer.as_deref(), self.connection.handle())
        else {
            return;
        };

        let frame = Frame::history_request(&self.credentials.user_id, peer);
        if let Err(e) = self.connection.send(handle, &frame) {
            warn!(peer = %peer, "Failed to request history: {}", e);
        } else {
            debug!(peer = %peer, "Requested history");
        }
    }

    fn validate_contact(&self, raw: &str) -> Result<String> {
        let contact = raw.trim();
        if contact.is_empty() {
            return Err(ChatError::InvalidContact(raw.to_string()));
        }
        if contact == self.credentials.user_id {
            return Err(ChatError::SelfContact);
        }
        Ok(contact.to_string())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.phase == Phase::Closed {
            Err(ChatError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.emit(SessionEvent::PhaseChanged { phase });
        }
    }

    fn emit_connection_state(&self) {
        self.emit(SessionEvent::ConnectionStateChanged {
            state: self.connection.state(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.notifier.send(event);
    }
}
