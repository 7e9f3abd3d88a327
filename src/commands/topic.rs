use crate::error::{BotError, BotResult};
use crate::format::{command_argument, escape_markdown, sanitize_username, validate_topic};
use crate::handlers::BotContext;
use crate::models::{Message, Poll, StoredUser, UserTopic};
use crate::telegram::{SendMessage, SendPoll};
use crate::voting::{render, vote_keyboard, Tally};
use log::{debug, info};
use std::sync::Arc;

const MAX_TOPICS_PER_COMMAND: usize = 3;

/// Poll options, in `VoteOption` index order.
const POLL_OPTIONS: [&str; 2] = ["👍", "👎"];

/// `/suba`: subscribe the sender, or the author of the replied message, to up to three topics.
pub async fn handle_subscribe(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let topics = command_argument(message.text())
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(validate_topic)
        .collect::<BotResult<Vec<String>>>()?;

    if topics.is_empty() {
        return Err(BotError::reply("which topic?"));
    }
    if topics.len() > MAX_TOPICS_PER_COMMAND {
        return Err(BotError::reply(format!("at most {} topics at a time", MAX_TOPICS_PER_COMMAND)));
    }

    let target = match &message.reply_to_message {
        Some(replied) => {
            let author = replied
                .from
                .as_ref()
                .ok_or_else(|| BotError::reply("cannot tell who wrote that message"))?;
            if author.is_bot {
                return Err(BotError::reply("bots cannot subscribe"));
            }
            author
        }
        None => message
            .from
            .as_ref()
            .ok_or_else(|| BotError::reply("cannot tell who you are"))?,
    };

    let user = StoredUser {
        id: target.id,
        first_name: sanitize_username(&target.first_name),
        username: sanitize_username(target.username.as_deref().unwrap_or("")),
    };
    ctx.db.save_user(&user).await?;

    let chat_id = message.chat.id;
    let mut lines = Vec::new();
    for topic in topics {
        if !ctx.db.exists_chat_topic(chat_id, &topic).await? && !ctx.is_god(message.sender_id()) {
            lines.push(format!("'{}' does not exist yet and only the owner can create topics", topic));
            continue;
        }
        if ctx.db.save_user_topic(chat_id, user.id, &topic).await? {
            info!("User {} subscribed to '{}' in chat {}", user.id, topic, chat_id);
            lines.push(format!("{} now follows {}", user.name(), topic));
        } else {
            lines.push(format!("{} already follows {}", user.name(), topic));
        }
    }

    ctx.reply(&message, lines.join("\n")).await
}

/// `/desca`
pub async fn handle_unsubscribe(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let topic = validate_topic(command_argument(message.text()))?;
    let user_id = message
        .sender_id()
        .ok_or_else(|| BotError::reply("cannot tell who you are"))?;

    let removed = ctx.db.delete_user_topic(message.chat.id, user_id, &topic).await?;
    if removed == 0 {
        return Err(BotError::reply(format!("you do not follow {}", topic)));
    }
    ctx.reply(&message, format!("you no longer follow {}", topic)).await
}

/// `/quem`
pub async fn handle_list_subscribers(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let topic = validate_topic(command_argument(message.text()))?;
    let users = ctx.db.find_users_by_topic(message.chat.id, &topic).await?;
    if users.is_empty() {
        return Err(BotError::reply("nobody follows this topic"));
    }

    let mut text = format!("*subscribers \\({}\\)*\n", users.len());
    for user in &users {
        text.push_str(&format!("\\- {}\n", escape_markdown(user.name())));
    }
    ctx.reply_markdown(&message, text).await
}

/// `/lista`
pub async fn handle_list_user_topics(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let user_id = message
        .sender_id()
        .ok_or_else(|| BotError::reply("cannot tell who you are"))?;
    let topics = ctx.db.find_user_chat_topics(message.chat.id, user_id).await?;
    if topics.is_empty() {
        return Err(BotError::reply("you do not follow any topic"));
    }
    ctx.reply(&message, topic_list("your topics:", &topics)).await
}

/// `/listudo`
pub async fn handle_list_chat_topics(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let topics = ctx.db.find_chat_topics(message.chat.id).await?;
    if topics.is_empty() {
        return Err(BotError::reply("no topic was created in this chat"));
    }
    ctx.reply(&message, topic_list("topics:", &topics)).await
}

fn topic_list(title: &str, topics: &[UserTopic]) -> String {
    let mut text = format!("{}\n", title);
    for topic in topics {
        text.push_str(&format!("- ({:02})  {}\n", topic.subscribers, topic.topic));
    }
    text
}

/// `/bora`
pub async fn handle_call(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let topic = validate_topic(command_argument(message.text()))?;
    call_subs(&ctx, &message, &topic, false).await
}

/// Calls every subscriber of `topic`: a native poll plus a tally message that
/// mentions them all. The poll is stored so votes on either widget update the tally.
///
/// A quiet call says nothing when the topic has no subscribers.
pub async fn call_subs(ctx: &BotContext, message: &Message, topic: &str, quiet: bool) -> BotResult<()> {
    let chat_id = message.chat.id;
    let users = ctx.db.find_users_by_topic(chat_id, topic).await?;
    if users.is_empty() {
        if quiet {
            debug!("Quiet call for '{}' in chat {} has no subscribers", topic, chat_id);
            return Ok(());
        }
        return Err(BotError::reply("nobody follows this topic"));
    }

    let native = ctx
        .api
        .send_poll(SendPoll {
            chat_id,
            question: topic.to_string(),
            options: POLL_OPTIONS.iter().map(|option| option.to_string()).collect(),
            is_anonymous: false,
        })
        .await?;

    let tally = Tally::partition(&users, &[]);
    let mut params = SendMessage::reply(chat_id, message.message_id, render(topic, &tally)).markdown();
    params.reply_markup = Some(vote_keyboard(&tally));
    let sent = ctx.api.send_message(params).await?;

    ctx.db
        .save_poll(&Poll {
            id: native.poll_id,
            chat_id,
            topic: topic.to_string(),
            result_message_id: sent.message_id,
        })
        .await?;

    info!("Called {} subscriber(s) of '{}' in chat {}", users.len(), topic, chat_id);
    Ok(())
}

/// `/pollo`: an untracked yes/no poll.
pub async fn handle_poll(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let question = command_argument(message.text());
    if question.is_empty() {
        return Err(BotError::reply("a poll needs a question"));
    }

    ctx.api
        .send_poll(SendPoll {
            chat_id: message.chat.id,
            question: question.to_string(),
            options: POLL_OPTIONS.iter().map(|option| option.to_string()).collect(),
            is_anonymous: false,
        })
        .await?;
    Ok(())
}
