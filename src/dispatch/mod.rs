pub mod runner;

use crate::error::BotResult;
use crate::models::Update;
use futures::future::BoxFuture;
use log::{debug, error, info};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use runner::{TaskOutcome, TaskRunner};

pub type HandlerFuture = BoxFuture<'static, BotResult<()>>;

type Criteria = Box<dyn Fn(&Update) -> bool + Send + Sync>;
type HandlerFn = Arc<dyn Fn(Update) -> HandlerFuture + Send + Sync>;

struct Registration {
    name: String,
    criteria: Criteria,
    handler: HandlerFn,
}

/// Matches `/name` or `/name@bot_username` as the first word of a message.
#[derive(Debug, Clone)]
pub struct CommandCriteria {
    command: String,
    bot_suffix: Option<String>,
}

impl CommandCriteria {
    pub fn new(name: &str, bot_username: &str) -> Self {
        Self {
            command: format!("/{}", name),
            bot_suffix: (!bot_username.is_empty()).then(|| format!("@{}", bot_username)),
        }
    }

    pub fn matches(&self, update: &Update) -> bool {
        let Some(message) = update.message() else {
            return false;
        };
        let Some(first) = message.text().split_whitespace().next() else {
            return false;
        };
        let first = match &self.bot_suffix {
            Some(suffix) => first.strip_suffix(suffix.as_str()).unwrap_or(first),
            None => first,
        };
        first == self.command
    }
}

/// Fans every update out to the handlers whose criteria match it.
///
/// Registration happens through `&mut self` before `run` takes ownership,
/// so the registration list is never touched once dispatching starts.
pub struct Dispatcher {
    registrations: Vec<Registration>,
    runner: TaskRunner,
    bot_username: String,
}

impl Dispatcher {
    pub fn new(runner: TaskRunner, bot_username: impl Into<String>) -> Self {
        Self {
            registrations: Vec::new(),
            runner,
            bot_username: bot_username.into(),
        }
    }

    pub fn register<C, H, Fut>(&mut self, name: impl Into<String>, criteria: C, handler: H)
    where
        C: Fn(&Update) -> bool + Send + Sync + 'static,
        H: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |update| Box::pin(handler(update)) as HandlerFuture);
        self.registrations.push(Registration {
            name: name.into(),
            criteria: Box::new(criteria),
            handler,
        });
    }

    pub fn register_command<H, Fut>(&mut self, command: &str, handler: H)
    where
        H: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        let criteria = CommandCriteria::new(command, &self.bot_username);
        self.register(format!("/{}", command), move |u: &Update| criteria.matches(u), handler);
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.registrations.len()
    }

    /// Submits one task per matching registration, in registration order.
    ///
    /// Returns as soon as every match is submitted. Submission waits only while
    /// the runner is saturated.
    pub async fn dispatch(&self, update: Update) -> Vec<JoinHandle<TaskOutcome>> {
        let mut submitted = Vec::new();

        for registration in &self.registrations {
            if !(registration.criteria)(&update) {
                continue;
            }

            let label = format!("handler {} (update {}, {})", registration.name, update.id, update.kind_name());
            let handler = Arc::clone(&registration.handler);
            let owned = update.clone();
            match self.runner.submit(label, move || handler(owned)).await {
                Ok(handle) => submitted.push(handle),
                Err(e) => error!("Could not submit {} for update {}: {}", registration.name, update.id, e),
            }
        }

        if submitted.is_empty() {
            debug!("No handler matched update {}", update.id);
        }
        submitted
    }

    pub async fn run(self, mut source: mpsc::UnboundedReceiver<Update>) {
        info!(
            "Dispatching updates to {} handler(s), at most {} at a time",
            self.registrations.len(),
            self.runner.capacity()
        );
        while let Some(update) = source.recv().await {
            self.dispatch(update).await;
        }
        info!("Update source closed, dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::models::{Chat, Message, PollAnswer, UpdateKind, User};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn explode(_update: Update) -> BotResult<()> {
        panic!("bad handler")
    }

    fn text_update(id: i64, text: &str) -> Update {
        Update {
            id,
            kind: UpdateKind::Message(Message {
                message_id: id,
                chat: Chat { id: -100, kind: "group".to_string() },
                from: Some(User { id: 7, is_bot: false, first_name: "Ana".to_string(), username: None }),
                date: 0,
                text: Some(text.to_string()),
                reply_to_message: None,
                forward_from: None,
                forward_sender_name: None,
                voice: None,
                poll: None,
            }),
        }
    }

    #[test]
    fn command_criteria_strips_own_username_only() {
        let criteria = CommandCriteria::new("suba", "BotName");
        assert!(criteria.matches(&text_update(1, "/suba")));
        assert!(criteria.matches(&text_update(1, "/suba@BotName")));
        assert!(criteria.matches(&text_update(1, "  /suba futebol\ncinema")));
        assert!(!criteria.matches(&text_update(1, "/subaXYZ")));
        assert!(!criteria.matches(&text_update(1, "/suba@OtherBot")));
        assert!(!criteria.matches(&text_update(1, "/Suba")));
        assert!(!criteria.matches(&text_update(1, "suba")));
        assert!(!criteria.matches(&text_update(1, "")));
    }

    #[test]
    fn command_criteria_ignores_other_update_kinds() {
        let criteria = CommandCriteria::new("suba", "BotName");
        let answer = Update {
            id: 1,
            kind: UpdateKind::PollAnswer(PollAnswer {
                poll_id: "p".to_string(),
                user: User { id: 1, is_bot: false, first_name: "A".to_string(), username: None },
                option_ids: vec![0],
            }),
        };
        assert!(!criteria.matches(&answer));
    }

    #[tokio::test]
    async fn every_match_is_submitted_and_others_skipped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new(TaskRunner::new(4), "BotName");

        for command in ["suba", "suba", "desca"] {
            let hits = Arc::clone(&hits);
            dispatcher.register_command(command, move |_u| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        assert_eq!(dispatcher.handler_count(), 3);

        let handles = dispatcher.dispatch(text_update(1, "/suba@BotName futebol")).await;
        assert_eq!(handles.len(), 2);
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), TaskOutcome::Completed));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn faulting_handler_does_not_stop_dispatch() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new(TaskRunner::new(2), "BotName");

        dispatcher.register("panics", |_u: &Update| true, |update: Update| async move {
            if update.id == 1 {
                panic!("handler blew up");
            }
            Ok(())
        });
        dispatcher.register("errors", |_u: &Update| true, |_update: Update| async {
            Err(BotError::Invalid("nope".to_string()))
        });
        let counter = Arc::clone(&completed);
        dispatcher.register("slow", |_u: &Update| true, move |_update: Update| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, rx) = mpsc::unbounded_channel();
        for id in 1..=3 {
            tx.send(text_update(id, "anything")).unwrap();
        }
        drop(tx);
        dispatcher.run(rx).await;

        // `run` does not wait for in-flight work.
        tokio::time::timeout(Duration::from_secs(2), async {
            while completed.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn handler_panicking_before_its_future_does_not_stop_dispatch() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new(TaskRunner::new(2), "BotName");

        dispatcher.register("eager", |_u: &Update| true, |update: Update| {
            if update.id == 1 {
                panic!("handler blew up before returning");
            }
            futures::future::ready(Ok::<(), BotError>(()))
        });
        let counter = Arc::clone(&completed);
        dispatcher.register("counts", |_u: &Update| true, move |_update: Update| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, rx) = mpsc::unbounded_channel();
        for id in 1..=3 {
            tx.send(text_update(id, "anything")).unwrap();
        }
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), dispatcher.run(rx))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while completed.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn outcomes_are_tagged_per_task() {
        let mut dispatcher = Dispatcher::new(TaskRunner::new(2), "BotName");
        dispatcher.register("panics", |_u: &Update| true, explode);
        dispatcher.register("fine", |_u: &Update| true, |_update: Update| async { Ok(()) });

        let mut outcomes = Vec::new();
        for handle in dispatcher.dispatch(text_update(9, "hello")).await {
            outcomes.push(handle.await.unwrap());
        }
        assert!(matches!(outcomes[0], TaskOutcome::Panicked(_)));
        assert!(matches!(outcomes[1], TaskOutcome::Completed));
    }
}
