use crate::error::BotResult;
use crate::handlers::BotContext;
use crate::models::{Poll, Update, VoteOption};
use crate::telegram::{EditMessageText, MARKDOWN_V2};
use crate::voting::{self, render, vote_keyboard};
use log::{debug, info, warn};
use std::sync::Arc;

/// What a voter asked for, once both ingestion paths are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoteRequest {
    Choose(VoteOption),
    Retract,
}

/// Inline button tap under a tally message.
pub async fn handle_callback_query(ctx: Arc<BotContext>, update: Update) -> BotResult<()> {
    let Some(query) = update.callback_query() else {
        return Ok(());
    };

    // Stop the client-side spinner whatever happens next.
    if let Err(e) = ctx.api.answer_callback_query(&query.id).await {
        warn!("Could not answer callback query {}: {}", query.id, e);
    }

    let Some(message) = &query.message else {
        debug!("Callback query {} has no message attached", query.id);
        return Ok(());
    };
    let Some(poll) = ctx.db.find_poll_by_message(message.chat.id, message.message_id).await? else {
        debug!("Callback on untracked message {} in chat {}", message.message_id, message.chat.id);
        return Ok(());
    };
    let Some(option) = query.data.as_deref().and_then(VoteOption::from_payload) else {
        debug!("Unknown callback payload {:?} on poll {}", query.data, poll.id);
        return Ok(());
    };

    apply_vote(&ctx, &poll, query.from.id, VoteRequest::Choose(option)).await
}

/// Answer on the native poll sent by `/bora`. An empty choice is a retraction.
pub async fn handle_poll_answer(ctx: Arc<BotContext>, update: Update) -> BotResult<()> {
    let Some(answer) = update.poll_answer() else {
        return Ok(());
    };
    let Some(poll) = ctx.db.find_poll(&answer.poll_id).await? else {
        debug!("Answer on untracked poll {}", answer.poll_id);
        return Ok(());
    };

    let request = match answer.option_ids.first() {
        None => VoteRequest::Retract,
        Some(&index) => match VoteOption::from_index(index) {
            Some(option) => VoteRequest::Choose(option),
            None => {
                debug!("Option {} does not exist on poll {}", index, poll.id);
                return Ok(());
            }
        },
    };

    apply_vote(&ctx, &poll, answer.user.id, request).await
}

async fn apply_vote(ctx: &BotContext, poll: &Poll, voter_id: i64, request: VoteRequest) -> BotResult<()> {
    let eligible = ctx.db.find_users_by_topic(poll.chat_id, &poll.topic).await?;
    if !eligible.iter().any(|user| user.id == voter_id) {
        info!("User {} does not follow '{}', ignoring vote on poll {}", voter_id, poll.topic, poll.id);
        return Ok(());
    }

    match request {
        VoteRequest::Choose(option) => {
            voting::record_vote(&ctx.db, &poll.id, voter_id, option).await?;
        }
        VoteRequest::Retract => {
            voting::retract_vote(&ctx.db, &poll.id, voter_id).await?;
        }
    }

    let tally = voting::compute_tally(&ctx.db, &poll.id, &eligible).await?;
    ctx.api
        .edit_message_text(EditMessageText {
            chat_id: poll.chat_id,
            message_id: poll.result_message_id,
            text: render(&poll.topic, &tally),
            parse_mode: Some(MARKDOWN_V2.to_string()),
            reply_markup: Some(vote_keyboard(&tally)),
        })
        .await
}
