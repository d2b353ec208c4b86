// Copyright 2024 Anon Chat Team.

//! Shared helpers for engine tests: a connector that records instead of dialing

#![allow(dead_code)]

use anon_chat::{
    ClientConfig, ConnectionEvent, ConnectionEventKind, Connector, Credentials, EventSender,
    Handle, MemoryStorage, SessionChannels, SessionEngine, SessionEvent, Storage,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

pub struct RecordedLink {
    pub handle: Handle,
    pub url: Url,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

#[derive(Clone, Default)]
pub struct RecordingConnector {
    links: Arc<Mutex<Vec<RecordedLink>>>,
}

impl Connector for RecordingConnector {
    fn connect(
        &self,
        handle: Handle,
        url: Url,
        outbound: mpsc::UnboundedReceiver<String>,
        _events: EventSender,
    ) {
        self.links.lock().push(RecordedLink {
            handle,
            url,
            outbound,
        });
    }
}

impl RecordingConnector {
    pub fn connect_count(&self) -> usize {
        self.links.lock().len()
    }

    pub fn last_handle(&self) -> Handle {
        self.links.lock().last().expect("no connection opened").handle
    }

    pub fn last_url(&self) -> Url {
        self.links
            .lock()
            .last()
            .expect("no connection opened")
            .url
            .clone()
    }

    /// Frames written to the most recent connection since the last call
    pub fn sent(&self) -> Vec<serde_json::Value> {
        let mut links = self.links.lock();
        let link = links.last_mut().expect("no connection opened");
        let mut frames = Vec::new();
        while let Ok(text) = link.outbound.try_recv() {
            frames.push(serde_json::from_str(&text).expect("outbound frame is JSON"));
        }
        frames
    }

    pub fn opened(&self) -> ConnectionEvent {
        ConnectionEvent::new(self.last_handle(), ConnectionEventKind::Opened)
    }

    pub fn closed(&self) -> ConnectionEvent {
        ConnectionEvent::new(self.last_handle(), ConnectionEventKind::Closed)
    }

    pub fn errored(&self, reason: &str) -> ConnectionEvent {
        ConnectionEvent::new(
            self.last_handle(),
            ConnectionEventKind::Errored(reason.to_string()),
        )
    }

    pub fn raw(&self, text: &str) -> ConnectionEvent {
        ConnectionEvent::new(self.last_handle(), ConnectionEventKind::Frame(text.to_string()))
    }

    pub fn frame(&self, kind: &str, from: &str, to: &str, body: &str, id: &str) -> ConnectionEvent {
        let json = serde_json::json!({
            "type": kind,
            "from": from,
            "to": to,
            "body": body,
            "messageid": id,
        });
        self.raw(&json.to_string())
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        endpoint: Url::parse("ws://relay.test/ws").unwrap(),
        storage_dir: PathBuf::from("/nonexistent"),
        token_param: "token".to_string(),
    }
}

pub struct Harness {
    pub engine: SessionEngine<RecordingConnector>,
    pub connector: RecordingConnector,
    pub channels: SessionChannels,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new(user: &str) -> Self {
        Self::with_storage(user, Arc::new(MemoryStorage::new()))
    }

    pub fn with_storage(user: &str, storage: Arc<MemoryStorage>) -> Self {
        let connector = RecordingConnector::default();
        let shared: Arc<dyn Storage> = storage.clone();
        let (engine, channels) = SessionEngine::new(
            Credentials::new(user, "jwt-token"),
            &test_config(),
            shared,
            connector.clone(),
        );
        Self {
            engine,
            connector,
            channels,
            storage,
        }
    }

    /// Select `peer` and complete the connection handshake
    pub fn open_with_peer(&mut self, peer: &str) {
        self.engine.select_peer(peer).unwrap();
        let opened = self.connector.opened();
        self.engine.handle_connection_event(opened);
    }

    pub fn deliver(&mut self, event: ConnectionEvent) {
        self.engine.handle_connection_event(event);
    }

    pub fn bodies(&self) -> Vec<String> {
        self.engine
            .messages()
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    pub fn events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.channels.session_events.try_recv() {
            events.push(event);
        }
        events
    }
}
