mod commands;
mod config;
mod db;
mod dispatch;
mod error;
mod format;
mod handlers;
mod models;
mod tasks;
mod telegram;
mod voting;

use config::Config;
use db::Database;
use dispatch::{Dispatcher, TaskRunner};
use handlers::BotContext;
use log::{error, info};
use std::sync::Arc;
use telegram::{ChatApi, TelegramClient};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return;
        }
    };

    let database = match Database::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let client = Arc::new(TelegramClient::new(&config.bot_token));
    let me = match client.get_me().await {
        Ok(me) => me,
        Err(e) => {
            error!("Failed to reach the bot api: {}", e);
            return;
        }
    };
    let bot_username = me.username.unwrap_or_default();
    info!("{} is connected!", bot_username);

    let runner = TaskRunner::new(config.max_concurrent_handlers);
    let mut dispatcher = Dispatcher::new(runner.clone(), bot_username);
    let poll_timeout = config.poll_timeout_secs;
    let api: Arc<dyn ChatApi> = client.clone();
    let ctx = Arc::new(BotContext::new(database, api, config, runner));
    commands::register_commands(&mut dispatcher, ctx);

    let updates = telegram::updates::spawn_update_source(client, poll_timeout);
    dispatcher.run(updates).await;
}
