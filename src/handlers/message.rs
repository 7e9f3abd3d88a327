use crate::commands::topic::call_subs;
use crate::error::BotResult;
use crate::format::validate_topic;
use crate::handlers::BotContext;
use crate::models::Message;
use crate::tasks::Debouncer;
use crate::telegram::SendVoice;
use chrono::Utc;
use log::{debug, error, info};
use std::sync::{Arc, Weak};

/// Messages older than this are backlog from a restart and do not count.
const FRESH_FOR_SECS: i64 = 60;

/// Non-command messages: hashtag calls and the voice-reply counter.
pub async fn handle_message(ctx: Arc<BotContext>, message: Message) -> BotResult<()> {
    let text = message.text().trim();
    if text.starts_with('/') {
        return Ok(());
    }

    if text.starts_with('#') {
        let topic = match validate_topic(text) {
            Ok(topic) => topic,
            Err(e) => {
                debug!("Not a topic call: {}", e);
                return Ok(());
            }
        };
        if ctx.db.exists_chat_topic(message.chat.id, &topic).await? {
            schedule_call(&ctx, message.clone(), topic);
        } else {
            debug!("Nobody follows '{}' in chat {}", topic, message.chat.id);
        }
        return Ok(());
    }

    if (Utc::now() - message.sent_at()).num_seconds() > FRESH_FOR_SECS {
        return Ok(());
    }

    if !ctx.counter.tick() {
        let remaining = ctx.counter.remaining();
        if remaining % 10 == 0 {
            debug!("{} messages until the next voice", remaining);
        }
        return Ok(());
    }

    let Some(voice) = ctx.db.find_random_voice().await? else {
        info!("Message counter fired but no voice is saved");
        return Ok(());
    };
    ctx.api
        .send_voice(SendVoice {
            chat_id: message.chat.id,
            voice: voice.file_id,
            reply_to_message_id: Some(message.message_id),
        })
        .await
}

/// Coalesces repeated hashtags for the same topic into one quiet call.
///
/// The call itself goes through the handler runner, so it counts against the
/// same concurrency cap as every handler.
fn schedule_call(ctx: &Arc<BotContext>, message: Message, topic: String) {
    let delay = ctx.config.call_debounce;
    let weak: Weak<BotContext> = Arc::downgrade(ctx);
    let action_topic = topic.clone();

    ctx.trigger_call(message, &topic, move || {
        Debouncer::new(delay, move |message: Message| {
            let weak = Weak::clone(&weak);
            let topic = action_topic.clone();
            async move {
                let Some(ctx) = weak.upgrade() else {
                    return;
                };
                let chat_id = message.chat.id;
                let label = format!("quiet call for '{}' in chat {}", topic, chat_id);
                let call_ctx = Arc::clone(&ctx);
                let call_topic = topic.clone();
                let submitted = ctx
                    .runner
                    .submit(label, move || async move {
                        call_subs(&call_ctx, &message, &call_topic, true).await
                    })
                    .await;
                if let Err(e) = submitted {
                    error!("Could not submit quiet call for '{}' in chat {}: {}", topic, chat_id, e);
                }
                ctx.forget_call(chat_id, &topic);
            }
        })
    });
}
