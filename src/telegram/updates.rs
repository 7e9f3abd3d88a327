use crate::models::Update;
use crate::telegram::TelegramClient;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Starts the long-poll loop and returns the sequential feed of updates.
///
/// Updates are forwarded in receipt order. The loop ends when the receiver is dropped.
pub fn spawn_update_source(client: Arc<TelegramClient>, timeout_secs: u64) -> mpsc::UnboundedReceiver<Update> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        info!("Starting long-poll update source (timeout {}s)", timeout_secs);
        let mut offset = 0;

        loop {
            let batch = match client.get_updates(offset, timeout_secs).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("Failed to fetch updates: {}", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for raw in batch {
                offset = offset.max(raw.update_id + 1);
                let update_id = raw.update_id;
                match raw.into_update() {
                    Some(update) => {
                        if tx.send(update).is_err() {
                            info!("Update receiver dropped, stopping long-poll loop");
                            return;
                        }
                    }
                    None => debug!("Skipping unsupported update {}", update_id),
                }
            }
        }
    });

    rx
}
