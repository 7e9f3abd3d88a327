use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide count of chat messages that fires every `target` ticks.
///
/// The counter is shared by every chat the bot is in, so messages in one chat
/// move the threshold for all of them. The update is a compare-and-reset: a
/// tick that reaches the threshold stores zero, and any count found at or past
/// the threshold is reset the same way, so the counter never runs beyond it.
pub struct MessageCounter {
    count: AtomicU32,
    target: u32,
}

impl MessageCounter {
    pub fn new(target: u32) -> Self {
        Self {
            count: AtomicU32::new(0),
            target: target.max(1),
        }
    }

    /// Counts one message. Returns true for exactly one caller per `target` ticks.
    pub fn tick(&self) -> bool {
        let target = self.target;
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                let next = n.saturating_add(1);
                Some(if next >= target { 0 } else { next })
            })
            .unwrap_or_else(|n| n);
        previous.saturating_add(1) >= target
    }

    pub fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.count.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fires_every_target_ticks() {
        let counter = MessageCounter::new(3);
        let fired: Vec<bool> = (0..7).map(|_| counter.tick()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true, false]);
        assert_eq!(counter.remaining(), 2);
    }

    #[test]
    fn concurrent_ticks_fire_the_exact_number_of_times() {
        let counter = Arc::new(MessageCounter::new(150));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || (0..250).filter(|_| counter.tick()).count())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1500 / 150);
        assert_eq!(counter.remaining(), 150);
    }
}
