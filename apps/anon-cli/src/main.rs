use anon_chat::commands;
use anon_chat::markdown::{self, Span};
use anon_chat::{
    ClientConfig, ClientConfigUpdates, ConnectionState, Credentials, FileStorage, FrameKind,
    Message, Phase, SessionChannels, SessionEngine, SessionEvent,
};
use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

/// Anon - terminal client for the Anonymous direct-messaging relay
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Your user id, as issued by the login service
    #[arg(short, long)]
    user: String,

    /// Session token appended to the relay URL
    #[arg(short, long)]
    token: String,

    /// Relay websocket endpoint (defaults to $ANON_WEBSOCKET_URL or ws://localhost:8081/ws)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Directory for contacts and unread counts
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Query parameter name carrying the token
    #[arg(long)]
    token_param: Option<String>,

    /// Open a conversation with this peer on startup
    #[arg(short, long)]
    peer: Option<String>,
}

fn show_help() {
    println!("\n📖 Available Commands:");
    println!("  ┌─────────────────────────────────────────────────┐");
    println!("  │  help, ?, h              Show this help          │");
    println!("  │  contacts, c             List contacts + unread  │");
    println!("  │  open <peer>, o          Open a conversation     │");
    println!("  │  add <contact>, a        Add a contact           │");
    println!("  │  status                  Connection status       │");
    println!("  │  /                       List bot commands       │");
    println!("  │  /<n> [args]             Send bot command n      │");
    println!("  │  logout                  Log out and forget data │");
    println!("  │  quit, exit, q           Exit the chat           │");
    println!("  └─────────────────────────────────────────────────┘");
    println!("\n💡 Tips:");
    println!("  • Anything else is sent to the open conversation");
    println!("  • Open a conversation with 'bot' to talk to the market bot");
    println!("  • Use Ctrl+C to force quit");
}

fn show_suggestions() {
    println!("\n🤖 Bot Commands:");
    for (i, command) in commands::suggestions_for(commands::TRIGGER).iter().enumerate() {
        println!(
            "  {}. {} {:<12} {}",
            i + 1,
            command.icon,
            command.command.trim_end(),
            command.description
        );
    }
}

/// Colour is skipped when `NO_COLOR` is set
fn render_markdown(text: &str) -> String {
    if std::env::var_os("NO_COLOR").is_some() {
        return markdown::strip(text);
    }
    markdown::parse_inline(text)
        .iter()
        .map(|span| match span {
            Span::Plain(t) => t.clone(),
            Span::Bold(t) => format!("\x1b[1m{}\x1b[0m", t),
            Span::Italic(t) => format!("\x1b[3m{}\x1b[0m", t),
            Span::Code(t) => format!("\x1b[36m{}\x1b[0m", t),
        })
        .collect()
}

fn render_message(message: &Message, user: &str) {
    let who = if message.from == user {
        "You"
    } else {
        message.from.as_str()
    };
    match message.kind {
        FrameKind::Bot => println!("🤖 {}: {}", who, render_markdown(&message.body)),
        FrameKind::History => println!("📜 {}: {}", who, message.body),
        FrameKind::Chat => println!("💬 {}: {}", who, message.body),
    }
}

/// Print `event`; returns `false` when it has nothing to show
fn render_event(event: SessionEvent, user: &str) -> bool {
    match event {
        SessionEvent::ConnectionStateChanged { state } => match state {
            ConnectionState::Connecting => println!("⏳ Connecting to relay..."),
            ConnectionState::Open => println!("🟢 Connected"),
            ConnectionState::Closed => println!("🔌 Disconnected"),
            ConnectionState::Errored => {
                println!("❌ Connection failed. Use 'open <peer>' to reconnect.")
            }
        },
        SessionEvent::PhaseChanged { phase } => {
            if phase != Phase::Loading {
                return false;
            }
            println!("📥 Loading history...");
        }
        SessionEvent::LogCleared { peer } => {
            println!("━━━━━━━━━━━━ 💬 Conversation with {} ━━━━━━━━━━━━", peer);
        }
        SessionEvent::MessageAppended { message } => render_message(&message, user),
        SessionEvent::ContactAdded { contact } => println!("👤 New contact: {}", contact),
        SessionEvent::UnreadChanged { contact, count } => {
            if count == 0 {
                return false;
            }
            println!("🔔 {} unread from {}", count, contact);
        }
        SessionEvent::CommandRejected { reason } => println!("❌ {}", reason),
    }
    true
}

/// Expand `/<n> args` into the n-th bot command followed by `args`
fn expand_numbered_command(input: &str) -> Option<String> {
    let rest = input.strip_prefix(commands::TRIGGER)?;
    let (index, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let index: usize = index.parse().ok()?;
    let command = commands::select(index.checked_sub(1)?)?;
    Some(format!("{}{}", command, args.trim()).trim_end().to_string())
}

fn send(engine: &mut SessionEngine, text: &str) {
    if commands::is_command(text) {
        debug!(command = %text, "Sending bot command");
    }
    if let Err(e) = engine.send_text(text) {
        error!(error = %e, "Failed to send message");
        println!("❌ Failed to send: {}", e);
    }
}

#[instrument(skip(engine))]
fn process_command(input: &str, engine: &mut SessionEngine) -> bool {
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.is_empty() {
        return true;
    }

    match parts[0] {
        "help" | "?" | "h" if parts.len() == 1 => show_help(),
        "contacts" | "c" if parts.len() == 1 => {
            match engine.unread_total() {
                0 => println!("\n👥 Contacts:"),
                n => println!("\n👥 Contacts ({} unread):", n),
            }
            let contacts = engine.contacts();
            if contacts.is_empty() {
                println!("  No contacts yet. Use 'add <contact>' or wait for a message.");
            }
            for (i, contact) in contacts.iter().enumerate() {
                let marker = if engine.active_peer() == Some(contact.as_str()) {
                    " (open)"
                } else {
                    ""
                };
                match engine.unread_count(contact) {
                    0 => println!("  {}. {}{}", i + 1, contact, marker),
                    n => println!("  {}. {}{} 🔔 {}", i + 1, contact, marker, n),
                }
            }
        }
        "open" | "o" => {
            if parts.len() != 2 {
                println!("❌ Usage: open <peer>");
            } else if let Err(e) = engine.select_peer(parts[1]) {
                println!("❌ Cannot open conversation: {}", e);
            }
        }
        "add" | "a" => {
            if parts.len() != 2 {
                println!("❌ Usage: add <contact>");
            } else {
                match engine.add_contact(parts[1]) {
                    Ok(true) => println!("✅ Added contact: {}", parts[1]),
                    Ok(false) => println!("ℹ️ {} is already a contact", parts[1]),
                    Err(e) => println!("❌ Cannot add contact: {}", e),
                }
            }
        }
        "status" if parts.len() == 1 => {
            let snapshot = engine.snapshot();
            println!("\n📡 Status:");
            println!("  User: {}", snapshot.user_id);
            println!("  Connection: {:?}", snapshot.connection);
            println!(
                "  Conversation: {}",
                snapshot.active_peer.as_deref().unwrap_or("none")
            );
            println!("  Phase: {:?}", snapshot.phase);
            println!("  Messages: {}", snapshot.messages.len());
        }
        "logout" if parts.len() == 1 => {
            info!("Logging out");
            engine.logout();
            println!("👋 Logged out, local data cleared");
            return false;
        }
        "quit" | "exit" | "q" if parts.len() == 1 => {
            println!("👋 Goodbye!");
            info!("Initiating graceful shutdown");
            engine.shutdown();
            return false;
        }
        _ if input == commands::TRIGGER => show_suggestions(),
        _ => match expand_numbered_command(input) {
            Some(command) => send(engine, &command),
            None => send(engine, input),
        },
    }
    true
}

fn show_prompt() -> io::Result<()> {
    print!("> ");
    io::stdout().flush()
}

fn display_welcome(user: &str, config: &ClientConfig) {
    println!("🎯 Anon Chat - {}", user);
    println!("📡 Relay: {}", config.endpoint);
    println!("💾 Storage: {:?}", config.storage_dir);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("\n💬 Enter commands or messages. Use 'help' to see all options.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("anon_chat=info,anon=info")),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = ClientConfig::default();
    config
        .apply(ClientConfigUpdates {
            endpoint: args.endpoint,
            storage_dir: args.storage_dir,
            token_param: args.token_param,
        })
        .context("invalid client configuration")?;

    let storage = Arc::new(FileStorage::new(config.storage_dir.clone()));
    let (mut engine, channels) =
        SessionEngine::connect_with(Credentials::new(&args.user, args.token), &config, storage);
    let SessionChannels {
        mut connection_events,
        mut session_events,
    } = channels;

    display_welcome(&args.user, &config);
    if let Some(peer) = args.peer.as_deref() {
        if let Err(e) = engine.select_peer(peer) {
            println!("❌ Cannot open conversation: {}", e);
        }
    }

    let (stdin_sender, mut stdin_receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    let stdin_handle = tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && stdin_sender.send(line).is_err() {
                break;
            }
        }
    });

    let mut running = true;
    info!("Starting main event loop");
    show_prompt()?;
    while running {
        tokio::select! {
            Some(event) = connection_events.recv() => {
                engine.handle_connection_event(event);
            }

            Some(event) = session_events.recv() => {
                if render_event(event, engine.user_id()) {
                    show_prompt()?;
                }
            }

            input = stdin_receiver.recv() => match input {
                Some(input) => {
                    if process_command(&input, &mut engine) {
                        show_prompt()?;
                    } else {
                        running = false;
                    }
                }
                None => {
                    info!("Input closed, shutting down");
                    engine.shutdown();
                    running = false;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating shutdown");
                println!("\n👋 Goodbye!");
                engine.shutdown();
                running = false;
            }
        }
    }

    stdin_handle.abort();
    info!("Chat session finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_numbered_command() {
        assert_eq!(
            expand_numbered_command("/1 AAPL").as_deref(),
            Some("/stocks AAPL")
        );
        assert_eq!(expand_numbered_command("/2").as_deref(), Some("/top-movers"));
        assert_eq!(expand_numbered_command("/3").as_deref(), Some("/news"));
        assert_eq!(expand_numbered_command("/0"), None);
        assert_eq!(expand_numbered_command("/stocks AAPL"), None);
        assert_eq!(expand_numbered_command("hello"), None);
    }

    #[test]
    fn test_silent_events_are_not_rendered() {
        assert!(!render_event(
            SessionEvent::PhaseChanged { phase: Phase::Live },
            "alice"
        ));
        assert!(!render_event(
            SessionEvent::UnreadChanged {
                contact: "bob".to_string(),
                count: 0,
            },
            "alice"
        ));
        assert!(render_event(
            SessionEvent::ContactAdded {
                contact: "bob".to_string(),
            },
            "alice"
        ));
    }

    #[test]
    fn test_render_markdown_styles_bold() {
        assert_eq!(
            render_markdown("**AAPL** up"),
            "\x1b[1mAAPL\x1b[0m up"
        );
    }
}
