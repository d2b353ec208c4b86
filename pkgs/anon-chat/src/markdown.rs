//! Inline emphasis for bot messages
//!
//! Bot replies use a small subset of markdown: `**bold**`, `*italic*` and
//! `` `code` ``. Markers without a closing partner stay literal.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "style", content = "text", rename_all = "lowercase")]
pub enum Span {
    Plain(String),
    Bold(String),
    Italic(String),
    Code(String),
}

impl Span {
    pub fn text(&self) -> &str {
        match self {
            Span::Plain(t) | Span::Bold(t) | Span::Italic(t) | Span::Code(t) => t,
        }
    }
}

pub fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        let (marker, style): (&str, fn(String) -> Span) = if rest.starts_with("**") {
            ("**", Span::Bold)
        } else if ch == '*' {
            ("*", Span::Italic)
        } else if ch == '`' {
            ("`", Span::Code)
        } else {
            plain.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        };

        let inner = &rest[marker.len()..];
        match inner.find(marker) {
            Some(end) if end > 0 => {
                if !plain.is_empty() {
                    spans.push(Span::Plain(std::mem::take(&mut plain)));
                }
                spans.push(style(inner[..end].to_string()));
                rest = &inner[end + marker.len()..];
            }
            _ => {
                plain.push_str(marker);
                rest = inner;
            }
        }
    }

    if !plain.is_empty() {
        spans.push(Span::Plain(plain));
    }
    spans
}

/// Body with all emphasis markers removed
pub fn strip(text: &str) -> String {
    parse_inline(text).iter().map(Span::text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_line() {
        let spans = parse_inline("📈 **AAPL** $189.20 (+1.2%)");

        assert_eq!(
            spans,
            vec![
                Span::Plain("📈 ".to_string()),
                Span::Bold("AAPL".to_string()),
                Span::Plain(" $189.20 (+1.2%)".to_string()),
            ]
        );
    }

    #[test]
    fn test_mixed_emphasis() {
        let spans = parse_inline("*note*: run `/crypto`");

        assert_eq!(
            spans,
            vec![
                Span::Italic("note".to_string()),
                Span::Plain(": run ".to_string()),
                Span::Code("/crypto".to_string()),
            ]
        );
    }

    #[test]
    fn test_unclosed_markers_stay_literal() {
        assert_eq!(parse_inline("2 * 3 = 6"), vec![Span::Plain("2 * 3 = 6".to_string())]);
        assert_eq!(parse_inline("**"), vec![Span::Plain("**".to_string())]);
    }

    #[test]
    fn test_strip() {
        assert_eq!(strip("🟢 **Top Gainers:**"), "🟢 Top Gainers:");
    }
}
