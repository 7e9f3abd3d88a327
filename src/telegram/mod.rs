pub mod updates;

use crate::error::{BotError, BotResult};
use crate::models::{CallbackQuery, Message, PollAnswer, Update, UpdateKind, User};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

pub const MARKDOWN_V2: &str = "MarkdownV2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SendMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
    pub allow_sending_without_reply: bool,
}

impl SendMessage {
    pub fn reply(chat_id: i64, reply_to: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: Some(reply_to),
            allow_sending_without_reply: true,
            ..Default::default()
        }
    }

    pub fn markdown(mut self) -> Self {
        self.parse_mode = Some(MARKDOWN_V2.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EditMessageText {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendPoll {
    pub chat_id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendVoice {
    pub chat_id: i64,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPoll {
    pub poll_id: String,
    pub message_id: i64,
}

/// Outbound calls the handlers make against the chat platform.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, params: SendMessage) -> BotResult<SentMessage>;
    async fn edit_message_text(&self, params: EditMessageText) -> BotResult<()>;
    async fn send_poll(&self, params: SendPoll) -> BotResult<SentPoll>;
    async fn send_voice(&self, params: SendVoice) -> BotResult<()>;
    async fn answer_callback_query(&self, callback_query_id: &str) -> BotResult<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Raw `getUpdates` entry. Kinds the bot does not handle are dropped by `into_update`.
#[derive(Debug, Deserialize)]
pub struct RawUpdate {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub poll_answer: Option<PollAnswer>,
}

impl RawUpdate {
    pub fn into_update(self) -> Option<Update> {
        let kind = if let Some(message) = self.message {
            UpdateKind::Message(message)
        } else if let Some(query) = self.callback_query {
            UpdateKind::CallbackQuery(query)
        } else if let Some(answer) = self.poll_answer {
            UpdateKind::PollAnswer(answer)
        } else {
            return None;
        };
        Some(Update { id: self.update_id, kind })
    }
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 3],
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    pub fn with_base_url(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> BotResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response: ApiResponse<R> = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(BotError::Api(format!(
                "{}: {}",
                method,
                response.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        response
            .result
            .ok_or_else(|| BotError::Api(format!("{}: missing result", method)))
    }

    pub async fn get_me(&self) -> BotResult<User> {
        self.call("getMe", &serde_json::json!({}), Duration::from_secs(10)).await
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> BotResult<Vec<RawUpdate>> {
        let params = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message", "callback_query", "poll_answer"],
        };
        // The request must outlive the server-side long poll.
        self.call("getUpdates", &params, Duration::from_secs(timeout_secs + 10)).await
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
impl ChatApi for TelegramClient {
    async fn send_message(&self, params: SendMessage) -> BotResult<SentMessage> {
        let message: Message = self.call("sendMessage", &params, REQUEST_TIMEOUT).await?;
        Ok(SentMessage { message_id: message.message_id })
    }

    async fn edit_message_text(&self, params: EditMessageText) -> BotResult<()> {
        // The result is either the edited message or `true`.
        let _: serde_json::Value = self.call("editMessageText", &params, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn send_poll(&self, params: SendPoll) -> BotResult<SentPoll> {
        let message: Message = self.call("sendPoll", &params, REQUEST_TIMEOUT).await?;
        let poll = message
            .poll
            .ok_or_else(|| BotError::Api("sendPoll: response carries no poll".to_string()))?;
        Ok(SentPoll { poll_id: poll.id, message_id: message.message_id })
    }

    async fn send_voice(&self, params: SendVoice) -> BotResult<()> {
        let _: Message = self.call("sendVoice", &params, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn answer_callback_query(&self, callback_query_id: &str) -> BotResult<()> {
        let params = AnswerCallbackQuery { callback_query_id };
        let _: bool = self.call("answerCallbackQuery", &params, REQUEST_TIMEOUT).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_updates_map_to_their_kind() {
        let raw = r#"[
            {"update_id": 1, "message": {"message_id": 10, "chat": {"id": -5, "type": "group"},
                "from": {"id": 7, "is_bot": false, "first_name": "Ana"}, "date": 1700000000, "text": "/bora futebol"}},
            {"update_id": 2, "callback_query": {"id": "cq", "from": {"id": 8, "first_name": "Bia"},
                "message": {"message_id": 11, "chat": {"id": -5}}, "data": "1"}},
            {"update_id": 3, "poll_answer": {"poll_id": "P1", "user": {"id": 9, "first_name": "Caio"}, "option_ids": []}},
            {"update_id": 4, "edited_message": {"message_id": 12, "chat": {"id": -5}}}
        ]"#;
        let updates: Vec<RawUpdate> = serde_json::from_str(raw).unwrap();
        let updates: Vec<Update> = updates.into_iter().filter_map(RawUpdate::into_update).collect();

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].message().unwrap().text(), "/bora futebol");
        assert_eq!(updates[1].callback_query().unwrap().data.as_deref(), Some("1"));
        let answer = updates[2].poll_answer().unwrap();
        assert_eq!(answer.poll_id, "P1");
        assert!(answer.option_ids.is_empty());
    }

    #[test]
    fn reply_params_skip_empty_fields() {
        let params = SendMessage::reply(-5, 10, "oi");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["reply_to_message_id"], 10);
        assert!(json.get("parse_mode").is_none());
        assert!(json.get("reply_markup").is_none());

        let json = serde_json::to_value(params.markdown()).unwrap();
        assert_eq!(json["parse_mode"], MARKDOWN_V2);
    }
}
