use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Platform types (Telegram Bot API subset) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativePoll {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    #[serde(default)]
    pub date: i64,
    pub text: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
    pub forward_from: Option<User>,
    pub forward_sender_name: Option<String>,
    pub voice: Option<Voice>,
    pub poll: Option<NativePoll>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|user| user.id)
    }

    pub fn is_forwarded(&self) -> bool {
        self.forward_from.is_some()
            || self
                .forward_sender_name
                .as_deref()
                .is_some_and(|name| !name.is_empty())
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.date, 0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    pub user: User,
    #[serde(default)]
    pub option_ids: Vec<i64>,
}

/// One inbound event. Exactly one kind is populated per update.
#[derive(Debug, Clone)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone)]
pub enum UpdateKind {
    Message(Message),
    CallbackQuery(CallbackQuery),
    PollAnswer(PollAnswer),
}

impl Update {
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.kind {
            UpdateKind::CallbackQuery(query) => Some(query),
            _ => None,
        }
    }

    pub fn poll_answer(&self) -> Option<&PollAnswer> {
        match &self.kind {
            UpdateKind::PollAnswer(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            UpdateKind::Message(_) => "message",
            UpdateKind::CallbackQuery(_) => "callback_query",
            UpdateKind::PollAnswer(_) => "poll_answer",
        }
    }
}

// --- Stored records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: i64,
    pub first_name: String,
    pub username: String,
}

impl StoredUser {
    pub fn name(&self) -> &str {
        if self.username.is_empty() {
            &self.first_name
        } else {
            &self.username
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTopic {
    pub chat_id: i64,
    pub user_id: i64,
    pub topic: String,
    pub subscribers: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub chat_id: i64,
    pub topic: String,
    pub result_message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteOption {
    Yes,
    No,
}

impl VoteOption {
    /// Option index as used by both the native poll widget and the stored `vote` column.
    pub fn index(self) -> i64 {
        match self {
            VoteOption::Yes => 0,
            VoteOption::No => 1,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(VoteOption::Yes),
            1 => Some(VoteOption::No),
            _ => None,
        }
    }

    /// Parses the inline-button payload, which carries the option index as text.
    pub fn from_payload(payload: &str) -> Option<Self> {
        payload.trim().parse().ok().and_then(Self::from_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollVote {
    pub poll_id: String,
    pub user_id: i64,
    pub vote: VoteOption,
}

/// What a vote submission did to the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Cast,
    Changed,
    Retracted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub chat_id: i64,
    pub msg_id: i64,
    pub time: DateTime<Utc>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedVoice {
    pub file_id: String,
    pub user_id: i64,
}
