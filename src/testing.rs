//! Deterministic collaborators for driving matches in tests: a settable clock,
//! a scheduler whose timers fire on demand, and sinks that record or reject.
//!
//! Requires feature: `test-utils`

use std::{
    collections::HashMap,
    io,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::future::{self, BoxFuture};
use uuid::Uuid;

use crate::{
    dao::{
        leaderboard::LeaderboardAggregator,
        models::{LeaderEntity, QuestionPrompt, ResultKind},
        question_source::{InMemoryQuestionBank, QuestionSource},
        storage::{StorageError, StorageResult},
    },
    dto::sse::ServerEvent,
    services::notifications::{ChannelScope, NotificationSink, NotifyError},
    state::{
        clock::Clock,
        match_state::{MatchId, QuestionFilters},
        scheduler::{DeadlineScheduler, TimerCallback},
    },
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Clock`] that only moves when told to.
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: SystemTime) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *lock(&self.now)
    }
}

struct PendingTimer {
    after: Duration,
    callback: TimerCallback,
}

/// [`DeadlineScheduler`] that keeps armed callbacks until a test fires them.
///
/// Callbacks replaced by a re-arm or dropped by a cancel are kept aside so a
/// test can replay a timer that lost the race against its own cancellation.
#[derive(Default)]
pub struct ManualScheduler {
    armed: Mutex<HashMap<MatchId, PendingTimer>>,
    superseded: Mutex<Vec<(MatchId, TimerCallback)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self, match_id: MatchId) -> bool {
        lock(&self.armed).contains_key(&match_id)
    }

    /// Number of matches with a pending timer.
    pub fn armed_count(&self) -> usize {
        lock(&self.armed).len()
    }

    /// Delay the pending timer of `match_id` was armed with.
    pub fn armed_after(&self, match_id: MatchId) -> Option<Duration> {
        lock(&self.armed).get(&match_id).map(|timer| timer.after)
    }

    /// Run the pending timer of `match_id`. Returns whether one was armed.
    pub async fn fire(&self, match_id: MatchId) -> bool {
        let pending = lock(&self.armed).remove(&match_id);
        match pending {
            Some(timer) => {
                (timer.callback)().await;
                true
            }
            None => false,
        }
    }

    /// Run every replaced or cancelled timer of `match_id`, oldest first.
    pub async fn fire_superseded(&self, match_id: MatchId) -> usize {
        let callbacks: Vec<TimerCallback> = {
            let mut superseded = lock(&self.superseded);
            let (matching, rest): (Vec<_>, Vec<_>) = superseded
                .drain(..)
                .partition(|(id, _)| *id == match_id);
            *superseded = rest;
            matching.into_iter().map(|(_, callback)| callback).collect()
        };
        let fired = callbacks.len();
        for callback in callbacks {
            callback().await;
        }
        fired
    }
}

impl DeadlineScheduler for ManualScheduler {
    fn arm(&self, match_id: MatchId, after: Duration, callback: TimerCallback) {
        let previous = lock(&self.armed).insert(match_id, PendingTimer { after, callback });
        if let Some(previous) = previous {
            lock(&self.superseded).push((match_id, previous.callback));
        }
    }

    fn cancel(&self, match_id: MatchId) {
        let previous = lock(&self.armed).remove(&match_id);
        if let Some(previous) = previous {
            lock(&self.superseded).push((match_id, previous.callback));
        }
    }
}

/// [`NotificationSink`] recording every published event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(ChannelScope, ServerEvent)>>,
    closed: Mutex<Vec<MatchId>>,
    failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that records events yet reports every publish as failed.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(ChannelScope, ServerEvent)> {
        lock(&self.events).clone()
    }

    /// Event names in publish order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|(_, event)| event.event.clone())
            .collect()
    }

    /// Decoded payloads of the events called `name`, with their scope.
    pub fn named(&self, name: &str) -> Vec<(ChannelScope, serde_json::Value)> {
        lock(&self.events)
            .iter()
            .filter(|(_, event)| event.event.as_deref() == Some(name))
            .filter_map(|(scope, event)| {
                serde_json::from_str(&event.data)
                    .ok()
                    .map(|payload| (*scope, payload))
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        lock(&self.events)
            .iter()
            .filter(|(_, event)| event.event.as_deref() == Some(name))
            .count()
    }

    /// Matches whose channel was closed.
    pub fn closed_matches(&self) -> Vec<MatchId> {
        lock(&self.closed).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, scope: ChannelScope, event: ServerEvent) -> Result<(), NotifyError> {
        lock(&self.events).push((scope, event));
        if self.failing {
            return Err(NotifyError {
                scope,
                message: "sink rejected the event".into(),
            });
        }
        Ok(())
    }

    fn close_match(&self, match_id: MatchId) {
        lock(&self.closed).push(match_id);
    }
}

/// [`LeaderboardAggregator`] whose writes always fail.
#[derive(Default)]
pub struct UnavailableLeaderboard;

impl LeaderboardAggregator for UnavailableLeaderboard {
    fn record_result(
        &self,
        _user: Uuid,
        _score: u32,
        _result: ResultKind,
    ) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Err(StorageError::unavailable(
            "leaderboard offline".into(),
            io::Error::other("connection refused"),
        ))))
    }

    fn find_leader(&self, _user: Uuid) -> BoxFuture<'static, StorageResult<Option<LeaderEntity>>> {
        Box::pin(future::ready(Ok(None)))
    }
}

/// [`QuestionSource`] over an in-memory bank whose draws can be made to fail.
pub struct FlakyQuestionSource {
    bank: InMemoryQuestionBank,
    failures: AtomicUsize,
}

impl FlakyQuestionSource {
    pub fn new(bank: InMemoryQuestionBank) -> Self {
        Self {
            bank,
            failures: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` calls to `fetch_random`.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl QuestionSource for FlakyQuestionSource {
    fn fetch_random(
        &self,
        exclude: Vec<Uuid>,
        filters: QuestionFilters,
    ) -> BoxFuture<'static, StorageResult<Option<QuestionPrompt>>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Box::pin(future::ready(Err(StorageError::unavailable(
                "question bank offline".into(),
                io::Error::other("connection reset"),
            ))));
        }
        self.bank.fetch_random(exclude, filters)
    }

    fn fetch_answer_key(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<u32>>> {
        self.bank.fetch_answer_key(id)
    }
}
