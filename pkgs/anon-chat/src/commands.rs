//! Bot slash-command catalog used for input suggestions

use serde::Serialize;

/// Input that opens the suggestion list
pub const TRIGGER: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Command {
    /// Literal text spliced into the input buffer when selected
    pub command: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// Commands the relay's bot answers, in display order
pub const COMMANDS: &[Command] = &[
    Command {
        command: "/stocks ",
        description: "Get stock price and data (e.g., /stocks AAPL)",
        icon: "📈",
    },
    Command {
        command: "/top-movers",
        description: "View today's biggest gainers and losers",
        icon: "📊",
    },
    Command {
        command: "/news ",
        description: "Latest market news, optionally for one symbol (e.g., /news TSLA)",
        icon: "📰",
    },
    Command {
        command: "/crypto",
        description: "Current crypto prices",
        icon: "₿",
    },
    Command {
        command: "/indices",
        description: "Major market indices",
        icon: "🏛",
    },
    Command {
        command: "/trending",
        description: "Trending stocks right now",
        icon: "🔥",
    },
];

/// Suggestions for the current input: the whole catalog on a bare `/`, nothing otherwise
pub fn suggestions_for(input: &str) -> &'static [Command] {
    if input == TRIGGER {
        COMMANDS
    } else {
        &[]
    }
}

/// Text to place in the input buffer for the suggestion at `index`
pub fn select(index: usize) -> Option<&'static str> {
    COMMANDS.get(index).map(|c| c.command)
}

/// Whether `input` is addressed to the bot rather than the peer
pub fn is_command(input: &str) -> bool {
    let first = input.split_whitespace().next().unwrap_or_default();
    COMMANDS.iter().any(|c| c.command.trim_end() == first)
}
