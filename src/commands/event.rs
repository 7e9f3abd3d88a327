use crate::error::{BotError, BotResult};
use crate::format::{command_argument, relative_duration};
use crate::handlers::BotContext;
use crate::models::{ChatEvent, Message};
use chrono::Utc;
use log::info;
use std::sync::Arc;

fn event_name(message: &Message) -> BotResult<String> {
    let name = command_argument(message.text());
    if name.is_empty() {
        return Err(BotError::reply("missing event name"));
    }
    Ok(name.to_string())
}

/// `/conta <event>`.
///
/// As a reply the owner records the replied message as one occurrence,
/// dated when that message was sent. Otherwise it reports how many times the
/// event happened and how long ago the last one was.
pub async fn handle_count(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let name = event_name(&message)?;
    let chat_id = message.chat.id;

    if let Some(replied) = &message.reply_to_message {
        if !ctx.is_god(message.sender_id()) {
            return Err(BotError::reply("only the owner can count events"));
        }
        ctx.db
            .save_chat_event(&ChatEvent {
                chat_id,
                msg_id: replied.message_id,
                time: replied.sent_at(),
                name: name.clone(),
            })
            .await?;
        info!("Counted message {} as '{}' in chat {}", replied.message_id, name, chat_id);
        return Ok(());
    }

    let events = ctx.db.find_chat_events_by_name(chat_id, &name).await?;
    let text = match events.as_slice() {
        [] => format!("{}: 0 times", name),
        [only] => format!("{}: 1 time, {} ago", name, relative_duration(Utc::now() - only.time)),
        [latest, ..] => format!(
            "{}: {} times, last one {} ago",
            name,
            events.len(),
            relative_duration(Utc::now() - latest.time)
        ),
    };
    ctx.reply(&message, text).await
}

/// `/desconta <event>`, owner only, as a reply to the counted message.
pub async fn handle_uncount(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let name = event_name(&message)?;
    let Some(replied) = &message.reply_to_message else {
        return Err(BotError::reply("reply to the message you want to uncount"));
    };
    if !ctx.is_god(message.sender_id()) {
        return Err(BotError::reply("only the owner can uncount events"));
    }

    let removed = ctx.db.delete_chat_event(message.chat.id, replied.message_id, &name).await?;
    if removed == 0 {
        return Err(BotError::reply(format!("that message was not counted as {}", name)));
    }
    ctx.reply(&message, "uncounted").await
}
