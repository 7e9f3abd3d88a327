use crate::error::{BotError, BotResult};
use futures::FutureExt;
use log::{debug, error};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_CAPACITY: usize = 10;

/// How a submitted task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    Failed(BotError),
    Panicked(String),
}

/// Caps the number of tasks executing at the same time across the whole process.
#[derive(Clone)]
pub struct TaskRunner {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl TaskRunner {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Waits for a free slot, then starts the task built by `make` without
    /// waiting for it.
    ///
    /// `make` is called on the spawned task, so a panic while building the
    /// future is caught like a panic while polling it. The slot is released
    /// when the task ends, whatever the outcome. Errors and panics are logged
    /// under `label` and reported through the join handle.
    pub async fn submit<F, Fut>(&self, label: String, make: F) -> BotResult<JoinHandle<TaskOutcome>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| BotError::RunnerClosed)?;

        Ok(tokio::spawn(async move {
            let task = async move { make().await };
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!("{} completed", label);
                    TaskOutcome::Completed
                }
                Ok(Err(e)) => {
                    error!("{} failed: {}", label, e);
                    TaskOutcome::Failed(e)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("{} panicked: {}", label, message);
                    TaskOutcome::Panicked(message)
                }
            };
            drop(permit);
            outcome
        }))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn explode() -> BotResult<()> {
        panic!("boom")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_runs_more_than_capacity() {
        for capacity in [1, 3, 10] {
            let runner = TaskRunner::new(capacity);
            let running = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let mut handles = Vec::new();

            for _ in 0..40 {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                let handle = runner
                    .submit("burst".to_string(), move || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap();
                handles.push(handle);
            }

            for handle in handles {
                assert!(matches!(handle.await.unwrap(), TaskOutcome::Completed));
            }
            assert!(peak.load(Ordering::SeqCst) <= capacity);
            assert_eq!(runner.available(), capacity);
        }
    }

    #[tokio::test]
    async fn slots_come_back_after_errors_and_panics() {
        let runner = TaskRunner::new(2);

        let failed = runner
            .submit("failing".to_string(), || async { Err(BotError::Invalid("bad".to_string())) })
            .await
            .unwrap();
        let panicked = runner
            .submit("panicking".to_string(), explode)
            .await
            .unwrap();

        assert!(matches!(failed.await.unwrap(), TaskOutcome::Failed(BotError::Invalid(_))));
        match panicked.await.unwrap() {
            TaskOutcome::Panicked(message) => assert_eq!(message, "boom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(runner.available(), 2);

        // Both slots are usable again.
        let a = runner.submit("a".to_string(), || async { Ok(()) }).await.unwrap();
        let b = runner.submit("b".to_string(), || async { Ok(()) }).await.unwrap();
        assert!(matches!(a.await.unwrap(), TaskOutcome::Completed));
        assert!(matches!(b.await.unwrap(), TaskOutcome::Completed));
    }

    fn explode_before_future() -> futures::future::Ready<BotResult<()>> {
        panic!("no future for you")
    }

    #[tokio::test]
    async fn panic_while_building_the_task_is_contained() {
        let runner = TaskRunner::new(1);

        let handle = runner
            .submit("eager".to_string(), explode_before_future)
            .await
            .unwrap();
        match handle.await.unwrap() {
            TaskOutcome::Panicked(message) => assert_eq!(message, "no future for you"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(runner.available(), 1);
    }

    #[tokio::test]
    async fn submit_waits_while_saturated() {
        let runner = TaskRunner::new(1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = runner
            .submit("holder".to_string(), move || async move {
                let _ = release_rx.await;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(runner.available(), 0);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            runner.submit("waiter".to_string(), || async { Ok(()) }),
        )
        .await;
        assert!(blocked.is_err());

        release_tx.send(()).unwrap();
        first.await.unwrap();
        let second = runner.submit("waiter".to_string(), || async { Ok(()) }).await.unwrap();
        assert!(matches!(second.await.unwrap(), TaskOutcome::Completed));
    }
}
