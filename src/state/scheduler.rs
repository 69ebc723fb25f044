use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::state::match_state::MatchId;

/// Deferred work run once a timer expires.
pub type TimerCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Holds at most one live deferred callback per match.
pub trait DeadlineScheduler: Send + Sync {
    /// Replace any timer armed for `match_id` with a new one firing after `after`.
    fn arm(&self, match_id: MatchId, after: Duration, callback: TimerCallback);
    /// Drop the timer armed for `match_id`, if any.
    fn cancel(&self, match_id: MatchId);
}

struct TimerSlot {
    generation: u64,
    handle: AbortHandle,
}

/// [`DeadlineScheduler`] spawning one tokio task per armed timer.
#[derive(Default)]
pub struct TokioDeadlineScheduler {
    slots: Arc<DashMap<MatchId, TimerSlot>>,
    next_generation: AtomicU64,
}

impl TokioDeadlineScheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a timer is currently pending for `match_id`.
    pub fn is_armed(&self, match_id: MatchId) -> bool {
        self.slots.contains_key(&match_id)
    }
}

impl DeadlineScheduler for TokioDeadlineScheduler {
    fn arm(&self, match_id: MatchId, after: Duration, callback: TimerCallback) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let slots = Arc::clone(&self.slots);

        // The entry stays locked until the slot is stored, so even a zero-length
        // timer finds its own generation when it wakes up.
        let entry = self.slots.entry(match_id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Claiming the slot first means a callback can never be aborted mid-flight.
            if slots
                .remove_if(&match_id, |_, slot| slot.generation == generation)
                .is_some()
            {
                callback().await;
            } else {
                debug!(match_id = %match_id, generation, "timer superseded before firing");
            }
        })
        .abort_handle();

        let slot = TimerSlot { generation, handle };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(slot);
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }
    }

    fn cancel(&self, match_id: MatchId) {
        if let Some((_, slot)) = self.slots.remove(&match_id) {
            slot.handle.abort();
        }
    }
}
