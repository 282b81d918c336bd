//! HTML rendering for Network-B posts.
//!
//! Network B accepts a small HTML subset. Everything originating on
//! Network A is escaped before it is wrapped in markup, and every post is
//! cut to the platform limits without leaving a dangling tag or entity.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset};

/// Longest message body Network B accepts, ellipsis included.
pub const TEXT_LIMIT: usize = 4000;

/// Longest media caption Network B accepts, ellipsis included.
pub const CAPTION_LIMIT: usize = 1023;

/// Appended to truncated posts.
pub const ELLIPSIS: &str = "...";

/// Events newer than this are posted without a timestamp line.
pub const FRESH_EVENT_SECS: i64 = 60;

/// Escape `&`, `<`, `>` and `"`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug)]
enum Token<'a> {
    Open { raw: &'a str, name: &'a str },
    Close { raw: &'a str, name: &'a str },
    Text(&'a str),
}

impl Token<'_> {
    fn raw(&self) -> &str {
        match self {
            Self::Open { raw, .. } | Self::Close { raw, .. } | Self::Text(raw) => raw,
        }
    }
}

fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = html;
    while let Some(c) = rest.chars().next() {
        let len = match c {
            '<' => rest.find('>').map(|end| end + 1),
            '&' => rest
                .find(';')
                .filter(|&end| end <= 10 && !rest[1..end].contains(char::is_whitespace))
                .map(|end| end + 1),
            _ => None,
        }
        .unwrap_or(c.len_utf8());

        let (raw, tail) = rest.split_at(len);
        rest = tail;

        let token = if let Some(inner) = raw.strip_prefix("</").and_then(|r| r.strip_suffix('>')) {
            Token::Close { raw, name: inner.trim() }
        } else if let Some(inner) = raw.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
            let name = inner.split_whitespace().next().unwrap_or_default();
            Token::Open { raw, name }
        } else {
            Token::Text(raw)
        };
        tokens.push(token);
    }
    tokens
}

fn closing_len(stack: &[&str]) -> usize {
    stack.iter().map(|name| name.chars().count() + 3).sum()
}

/// Cut `html` to at most `limit` characters.
///
/// Tags and entities are never split, tags left open are closed, and
/// [`ELLIPSIS`] is appended iff anything was removed. Length counts Unicode
/// scalar values.
pub fn truncate_html(html: &str, limit: usize) -> String {
    if html.chars().count() <= limit {
        return html.to_string();
    }

    let budget = limit.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0;
    let mut stack: Vec<&str> = Vec::new();

    for token in tokenize(html) {
        let len = token.raw().chars().count();
        match token {
            Token::Open { raw, name } => {
                stack.push(name);
                if used + len + closing_len(&stack) > budget {
                    stack.pop();
                    break;
                }
                out.push_str(raw);
            },
            Token::Close { raw, name } => {
                // Closing an open tag never grows the final length
                if stack.last() == Some(&name) {
                    stack.pop();
                    out.push_str(raw);
                } else if used + len + closing_len(&stack) <= budget {
                    out.push_str(raw);
                } else {
                    break;
                }
            },
            Token::Text(raw) => {
                if used + len + closing_len(&stack) > budget {
                    break;
                }
                out.push_str(raw);
            },
        }
        used = out.chars().count();
    }

    out.push_str(ELLIPSIS);
    for name in stack.iter().rev() {
        let _ = write!(out, "</{name}>");
    }
    out
}

/// Truncate to [`TEXT_LIMIT`].
pub fn truncate_text(html: &str) -> String {
    truncate_html(html, TEXT_LIMIT)
}

/// Truncate to [`CAPTION_LIMIT`].
pub fn truncate_caption(html: &str) -> String {
    truncate_html(html, CAPTION_LIMIT)
}

/// Render Unix seconds in `offset` with a strftime `pattern`.
pub fn render_timestamp(secs: i64, offset: FixedOffset, pattern: &str) -> String {
    let Some(utc) = DateTime::from_timestamp(secs, 0) else {
        return secs.to_string();
    };
    let local = utc.with_timezone(&offset);
    let mut out = String::new();
    if write!(out, "{}", local.format(pattern)).is_err() {
        out = local.to_rfc3339();
    }
    out
}

/// Context lines prepended to every bridged post.
#[derive(Debug, Clone, Default)]
pub struct Header {
    /// Sender display name.
    pub sender: String,
    /// Conversation label (`(PVT)`, group name, ...), `None` to omit.
    pub chat_label: Option<String>,
    /// Message was edited.
    pub edited: bool,
    /// Message was forwarded.
    pub forwarded: bool,
    /// Rendered send time, `None` for fresh events.
    pub timestamp: Option<String>,
}

impl Header {
    /// Header lines, each `emoji: <b>value</b>\n`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "🧑: <b>{}</b>", escape_html(&self.sender));
        if let Some(label) = &self.chat_label {
            let _ = writeln!(out, "👥: <b>{}</b>", escape_html(label));
        }
        if self.edited {
            out.push_str("✏️: <b>Edited</b>\n");
        }
        if self.forwarded {
            out.push_str("⏩: <b>Forwarded</b>\n");
        }
        if let Some(timestamp) = &self.timestamp {
            let _ = writeln!(out, "🕛: <b>{}</b>", escape_html(timestamp));
        }
        out
    }

    /// Header followed by `body` (already HTML), cut to `limit`.
    pub fn with_body(&self, body: &str, limit: usize) -> String {
        let mut out = self.render();
        if !body.is_empty() {
            out.push('\n');
            out.push_str(body);
        }
        truncate_html(&out, limit)
    }
}

/// Timestamp line value for an event sent at `event_secs`, or `None` when it
/// is fresh.
pub fn stale_timestamp(
    event_secs: i64,
    now_secs: i64,
    offset: FixedOffset,
    pattern: &str,
) -> Option<String> {
    (now_secs - event_secs > FRESH_EVENT_SECS)
        .then(|| render_timestamp(event_secs, offset, pattern))
}

/// Replace `@<user>` tokens in escaped text with profile links.
///
/// `mentions` pairs the bare user portion with the display name to show.
/// Only whole tokens match, so `@1234` never rewrites part of `@12345`.
pub fn link_mentions(escaped: &str, mentions: &[(String, String)]) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let end = after.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(after.len());
        let token = &after[..end];
        match mentions.iter().find(|(user, _)| !user.is_empty() && user == token) {
            Some((user, name)) => out.push_str(&format!(
                "<a href=\"https://wa.me/{user}\">@{}</a>",
                escape_html(name.trim())
            )),
            None => {
                out.push('@');
                out.push_str(token);
            },
        }
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}

/// Public link to a message inside a supergroup.
pub fn message_link(chat_id: i64, message_id: i64) -> String {
    let internal = chat_id.to_string();
    let internal = internal.strip_prefix("-100").unwrap_or(internal.trim_start_matches('-'));
    format!("https://t.me/c/{internal}/{message_id}")
}

#[cfg(test)]
mod tests {
    use chrono::{Offset, Utc};
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_html("<b>hi</b>", 10), "<b>hi</b>");
    }

    #[test]
    fn truncation_closes_tags() {
        let html = format!("<b>{}</b>", "x".repeat(50));
        let out = truncate_html(&html, 20);
        assert!(out.chars().count() <= 20, "{out}");
        assert!(out.starts_with("<b>x"));
        assert!(out.ends_with("...</b>"));
    }

    #[test]
    fn truncation_never_splits_entities() {
        let html = "&amp;".repeat(10);
        let out = truncate_html(&html, 14);
        assert_eq!(out, "&amp;&amp;...");
    }

    #[test]
    fn header_matches_private_chat_layout() {
        let header = Header {
            sender: "Alice".into(),
            chat_label: Some("(PVT)".into()),
            ..Header::default()
        };
        assert_eq!(header.render(), "🧑: <b>Alice</b>\n👥: <b>(PVT)</b>\n");
        assert_eq!(header.with_body("hi", TEXT_LIMIT), "🧑: <b>Alice</b>\n👥: <b>(PVT)</b>\n\nhi");
    }

    #[test]
    fn header_escapes_names() {
        let header = Header { sender: "<Bob & Co>".into(), ..Header::default() };
        assert_eq!(header.render(), "🧑: <b>&lt;Bob &amp; Co&gt;</b>\n");
    }

    #[test]
    fn timestamp_only_for_stale_events() {
        let utc = Utc.fix();
        assert_eq!(stale_timestamp(1_000, 1_030, utc, "%H:%M"), None);
        assert_eq!(stale_timestamp(0, 3_600, utc, "%H:%M").as_deref(), Some("00:00"));

        let ist = FixedOffset::east_opt(19_800).unwrap();
        assert_eq!(render_timestamp(0, ist, "%H:%M"), "05:30");
    }

    #[test]
    fn mentions_become_links() {
        let out = link_mentions("hey @4477", &[("4477".into(), "Alice".into())]);
        assert_eq!(out, "hey <a href=\"https://wa.me/4477\">@Alice</a>");
    }

    #[test]
    fn mention_ids_sharing_a_prefix_link_separately() {
        let mentions = [("1234".to_string(), "Al".to_string()), ("12345".to_string(), "Bo".to_string())];
        let out = link_mentions("@12345, @1234 and @123", &mentions);
        assert_eq!(
            out,
            "<a href=\"https://wa.me/12345\">@Bo</a>, <a href=\"https://wa.me/1234\">@Al</a> and @123"
        );
    }

    #[test]
    fn names_containing_mentions_are_not_rewritten() {
        let mentions = [("1".to_string(), "x @2".to_string()), ("2".to_string(), "Bo".to_string())];
        let out = link_mentions("@1", &mentions);
        assert_eq!(out, "<a href=\"https://wa.me/1\">@x @2</a>");
    }

    #[test]
    fn supergroup_message_link() {
        assert_eq!(message_link(-1_001_234_567, 55), "https://t.me/c/1234567/55");
    }

    proptest! {
        #[test]
        fn truncated_output_respects_limit(body in "[a-z<>&\" éü👍]{0,300}", limit in 10usize..200) {
            let html = format!("<b>{}</b>", escape_html(&body));
            let out = truncate_html(&html, limit);
            let truncated = html.chars().count() > limit;
            prop_assert!(out.chars().count() <= limit);
            prop_assert_eq!(out.contains(ELLIPSIS), truncated);
        }
    }
}
