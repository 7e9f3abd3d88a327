use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Action<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

enum State<T> {
    Idle,
    Armed {
        generation: u64,
        pending: T,
        timer: JoinHandle<()>,
    },
}

struct Inner<T> {
    delay: Duration,
    action: Action<T>,
    slot: Mutex<Slot<T>>,
}

struct Slot<T> {
    generation: u64,
    state: State<T>,
}

/// Collapses a burst of triggers into one delayed action run with the last trigger's value.
///
/// `Idle --trigger--> Armed`, `Armed --trigger--> Armed` (timer restarted),
/// `Armed --deadline--> Idle` (action runs). At most one action is pending.
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action<T> = Arc::new(move |value| Box::pin(action(value)) as BoxFuture<'static, ()>);
        Self {
            inner: Arc::new(Inner {
                delay,
                action,
                slot: Mutex::new(Slot { generation: 0, state: State::Idle }),
            }),
        }
    }

    /// Arms the timer, replacing any pending value. Never blocks on the action.
    pub fn trigger(&self, value: T) {
        let mut slot = lock(&self.inner.slot);
        slot.generation += 1;
        let generation = slot.generation;

        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.fire(generation).await;
        });

        let armed = State::Armed { generation, pending: value, timer };
        if let State::Armed { timer: previous, .. } = std::mem::replace(&mut slot.state, armed) {
            previous.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(lock(&self.inner.slot).state, State::Armed { .. })
    }
}

impl<T: Send + 'static> Inner<T> {
    async fn fire(&self, generation: u64) {
        let value = {
            let mut slot = lock(&self.slot);
            match &slot.state {
                // Superseded by a later trigger; that trigger's timer owns the pending value.
                State::Armed { generation: armed, .. } if *armed != generation => return,
                State::Idle => return,
                State::Armed { .. } => {}
            }
            match std::mem::replace(&mut slot.state, State::Idle) {
                State::Armed { pending, .. } => pending,
                State::Idle => return,
            }
        };
        (self.action)(value).await;
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
