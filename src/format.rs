use crate::error::{BotError, BotResult};
use crate::models::StoredUser;
use lazy_static::lazy_static;
use regex::Regex;

pub const MAX_TOPIC_LEN: usize = 30;

lazy_static! {
    // Characters MarkdownV2 requires to be escaped outside of entities
    static ref MARKDOWN_SPECIAL: Regex = Regex::new(r"([_*\[\]()~`>#+\-=|{}.!\\])").unwrap();
}

pub fn escape_markdown(text: &str) -> String {
    MARKDOWN_SPECIAL.replace_all(text, r"\$1").into_owned()
}

/// A MarkdownV2 link that notifies the user.
pub fn mention(user: &StoredUser) -> String {
    format!("[{}](tg://user?id={})", escape_markdown(user.name()), user.id)
}

/// Keeps letters, digits and whitespace.
pub fn sanitize_username(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Everything after the command word, trimmed. Empty when there is none.
pub fn command_argument(text: &str) -> &str {
    text.trim_start()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

pub fn validate_topic(topic: &str) -> BotResult<String> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(BotError::reply("empty topic"));
    }
    if topic.chars().count() > MAX_TOPIC_LEN {
        return Err(BotError::reply("topic is too long"));
    }
    if topic.contains('\n') {
        return Err(BotError::reply("a topic must fit on one line"));
    }
    if topic.contains('#') && topic.contains(' ') {
        return Err(BotError::reply("a # topic cannot contain spaces"));
    }
    Ok(topic.to_string())
}

/// "2 days and 3 hours". Only the two largest non-zero units are shown.
pub fn relative_duration(elapsed: chrono::Duration) -> String {
    let units = [
        ("day", "days", 24 * 60 * 60),
        ("hour", "hours", 60 * 60),
        ("minute", "minutes", 60),
        ("second", "seconds", 1),
    ];

    let mut remaining = elapsed.num_seconds().max(0);
    let mut parts = Vec::new();
    for (singular, plural, seconds) in units {
        if parts.len() == 2 {
            break;
        }
        let amount = remaining / seconds;
        if amount == 0 {
            continue;
        }
        remaining -= amount * seconds;
        parts.push(format!("{} {}", amount, if amount == 1 { singular } else { plural }));
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" and ")
    }
}
