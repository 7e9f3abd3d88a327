pub mod audio;
pub mod event;
pub mod topic;

use crate::dispatch::Dispatcher;
use crate::handlers::{self, message, vote, BotContext};
use crate::models::Update;
use std::sync::Arc;

fn is_callback_query(update: &Update) -> bool {
    update.callback_query().is_some()
}

fn is_poll_answer(update: &Update) -> bool {
    update.poll_answer().is_some()
}

fn is_plain_message(update: &Update) -> bool {
    update
        .message()
        .is_some_and(|message| !message.text().trim_start().starts_with('/'))
}

/// Wires every command and update handler into the dispatcher.
pub fn register_commands(dispatcher: &mut Dispatcher, ctx: Arc<BotContext>) {
    dispatcher.register_command("suba", handlers::on_message(Arc::clone(&ctx), topic::handle_subscribe));
    dispatcher.register_command("desca", handlers::on_message(Arc::clone(&ctx), topic::handle_unsubscribe));
    dispatcher.register_command("quem", handlers::on_message(Arc::clone(&ctx), topic::handle_list_subscribers));
    dispatcher.register_command("lista", handlers::on_message(Arc::clone(&ctx), topic::handle_list_user_topics));
    dispatcher.register_command("listudo", handlers::on_message(Arc::clone(&ctx), topic::handle_list_chat_topics));
    dispatcher.register_command("bora", handlers::on_message(Arc::clone(&ctx), topic::handle_call));
    dispatcher.register_command("pollo", handlers::on_message(Arc::clone(&ctx), topic::handle_poll));
    dispatcher.register_command("conta", handlers::on_message(Arc::clone(&ctx), event::handle_count));
    dispatcher.register_command("desconta", handlers::on_message(Arc::clone(&ctx), event::handle_uncount));
    dispatcher.register_command("salvaraudio", handlers::on_message(Arc::clone(&ctx), audio::handle_save_voice));
    dispatcher.register_command("audio", handlers::on_message(Arc::clone(&ctx), audio::handle_random_voice));

    dispatcher.register(
        "callback_query",
        is_callback_query,
        handlers::update_handler(Arc::clone(&ctx), vote::handle_callback_query),
    );
    dispatcher.register(
        "poll_answer",
        is_poll_answer,
        handlers::update_handler(Arc::clone(&ctx), vote::handle_poll_answer),
    );
    dispatcher.register("message", is_plain_message, handlers::on_message(ctx, message::handle_message));
}
