use crate::error::{BotError, BotResult};
use crate::handlers::BotContext;
use crate::models::{Message, SavedVoice};
use crate::telegram::SendVoice;
use std::sync::Arc;

/// `/salvaraudio`, as a reply to a voice message.
pub async fn handle_save_voice(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let Some(replied) = &message.reply_to_message else {
        return Err(BotError::reply("reply to the voice message you want to save"));
    };
    let Some(voice) = &replied.voice else {
        return Err(BotError::reply("that is not a voice message"));
    };

    ctx.db
        .save_voice(&SavedVoice {
            file_id: voice.file_id.clone(),
            user_id: replied.sender_id().unwrap_or_default(),
        })
        .await?;
    ctx.reply(&message, "voice saved").await
}

/// `/audio`
pub async fn handle_random_voice(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let voice = ctx
        .db
        .find_random_voice()
        .await?
        .ok_or_else(|| BotError::reply("no voice saved yet"))?;

    ctx.api
        .send_voice(SendVoice {
            chat_id: message.chat.id,
            voice: voice.file_id,
            reply_to_message_id: Some(message.message_id),
        })
        .await
}
