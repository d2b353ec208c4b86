//! Anon Chat - session engine for the Anonymous direct-messaging relay
//!
//! The crate drives one persistent websocket to the relay and turns its frames
//! into state a UI can render:
//!
//! - **SessionEngine**: root component; peer selection, routing, sending
//! - **ConnectionManager**: single socket lifecycle and frame classification
//! - **MessageLog**: ordered, deduplicated log of the active conversation
//! - **ContactRegistry** / **UnreadTracker**: per-user state persisted through
//!   an injected [`Storage`]
//! - **commands**: bot slash-command catalog for input suggestions
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use anon_chat::{ClientConfig, Credentials, FileStorage, SessionCommand, SessionEngine};
//!
//! # async fn example() {
//! let config = ClientConfig::default();
//! let storage = Arc::new(FileStorage::new(config.storage_dir.clone()));
//! let (engine, channels) =
//!     SessionEngine::connect_with(Credentials::new("alice", "jwt"), &config, storage);
//!
//! let (commands, command_rx) = tokio::sync::mpsc::unbounded_channel();
//! commands.send(SessionCommand::SelectPeer("bob".into())).unwrap();
//! commands.send(SessionCommand::SendText("hello".into())).unwrap();
//!
//! tokio::spawn(engine.run(command_rx, channels.connection_events));
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod frame;
pub mod markdown;
pub mod message_log;
pub mod storage;
pub mod unread;

pub use commands::{Command, COMMANDS};
pub use config::{ClientConfig, ClientConfigUpdates};
pub use connection::{
    ConnectionEvent, ConnectionEventKind, ConnectionManager, ConnectionState, Connector,
    EventSender, Handle, Inbound, WebSocketConnector,
};
pub use contacts::ContactRegistry;
pub use engine::{
    Credentials, Phase, SessionChannels, SessionCommand, SessionEngine, SessionEvent,
    SessionSnapshot,
};
pub use error::{ChatError, Result, StorageError};
pub use frame::{Frame, FrameKind, Message};
pub use message_log::{Applied, LogEvent, MessageLog};
pub use storage::{FileStorage, MemoryStorage, Namespace, Storage};
pub use unread::UnreadTracker;
