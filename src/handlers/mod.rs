pub mod message;
pub mod vote;

use crate::config::Config;
use crate::db::Database;
use crate::dispatch::{HandlerFuture, TaskRunner};
use crate::error::{BotError, BotResult};
use crate::models::{Message, Update};
use crate::tasks::{Debouncer, MessageCounter};
use crate::telegram::{ChatApi, SendMessage};
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a handler needs, shared by every task the dispatcher runs.
pub struct BotContext {
    pub db: Database,
    pub api: Arc<dyn ChatApi>,
    pub config: Config,
    pub counter: MessageCounter,
    /// The dispatcher's runner, for work started outside a handler.
    pub runner: TaskRunner,
    calls: Mutex<HashMap<(i64, String), Debouncer<Message>>>,
}

impl BotContext {
    pub fn new(db: Database, api: Arc<dyn ChatApi>, config: Config, runner: TaskRunner) -> Self {
        let counter = MessageCounter::new(config.voice_every);
        Self {
            db,
            api,
            config,
            counter,
            runner,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_god(&self, user_id: Option<i64>) -> bool {
        self.config.god_id != 0 && user_id == Some(self.config.god_id)
    }

    pub async fn reply(&self, message: &Message, text: impl Into<String>) -> BotResult<()> {
        self.api
            .send_message(SendMessage::reply(message.chat.id, message.message_id, text))
            .await?;
        Ok(())
    }

    pub async fn reply_markdown(&self, message: &Message, text: impl Into<String>) -> BotResult<()> {
        self.api
            .send_message(SendMessage::reply(message.chat.id, message.message_id, text).markdown())
            .await?;
        Ok(())
    }

    /// Triggers the debouncer for one (chat, topic) pair, creating it on first use.
    ///
    /// The trigger happens under the map lock so `forget_call` never drops a
    /// debouncer that is about to be armed.
    fn trigger_call<F>(&self, message: Message, topic: &str, create: F)
    where
        F: FnOnce() -> Debouncer<Message>,
    {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls
            .entry((message.chat.id, topic.to_string()))
            .or_insert_with(create)
            .trigger(message);
    }

    /// Drops the debouncer for a pair once it has nothing pending.
    fn forget_call(&self, chat_id: i64, topic: &str) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (chat_id, topic.to_string());
        if calls.get(&key).is_some_and(|debouncer| !debouncer.is_armed()) {
            calls.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn pending_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Adapts a message handler to the dispatcher.
///
/// Non-message updates and forwarded messages are skipped. A `BotError::Reply`
/// from the handler is sent back to the chat as a reply to the command.
pub fn on_message<H, Fut>(ctx: Arc<BotContext>, handler: H) -> impl Fn(Update) -> HandlerFuture + Send + Sync + 'static
where
    H: Fn(Arc<BotContext>, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BotResult<()>> + Send + 'static,
{
    move |update: Update| -> HandlerFuture {
        let Some(message) = update.message().cloned() else {
            return Box::pin(async { Ok::<(), BotError>(()) });
        };
        if message.is_forwarded() {
            debug!("Ignoring forwarded command in update {}", update.id);
            return Box::pin(async { Ok::<(), BotError>(()) });
        }

        let ctx = Arc::clone(&ctx);
        let pending = handler(Arc::clone(&ctx), message.clone());
        Box::pin(async move {
            match pending.await {
                Err(BotError::Reply(text)) => ctx.reply(&message, text).await,
                other => other,
            }
        })
    }
}

/// Adapts a handler that takes the whole update, such as vote handlers.
pub fn update_handler<H, Fut>(ctx: Arc<BotContext>, handler: H) -> impl Fn(Update) -> HandlerFuture + Send + Sync + 'static
where
    H: Fn(Arc<BotContext>, Update) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BotResult<()>> + Send + 'static,
{
    move |update: Update| -> HandlerFuture { Box::pin(handler(Arc::clone(&ctx), update)) }
}
