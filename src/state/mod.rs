pub mod clock;
pub mod match_state;
pub mod scheduler;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    config::AppConfig,
    dao::{
        leaderboard::{InMemoryLeaderboard, LeaderboardAggregator},
        match_store::{InMemoryMatchStore, MatchStore},
        question_source::{InMemoryQuestionBank, QuestionSource},
    },
    services::notifications::NotificationSink,
    state::{
        clock::{Clock, SystemClock},
        match_state::MatchId,
        scheduler::{DeadlineScheduler, TokioDeadlineScheduler},
    },
};

pub use self::sse::{SseHub, SseHubs};

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, collaborators and per-match gates.
pub struct AppState {
    config: Arc<AppConfig>,
    match_store: Arc<dyn MatchStore>,
    questions: Arc<dyn QuestionSource>,
    leaderboard: Arc<dyn LeaderboardAggregator>,
    sse: Arc<SseHubs>,
    notifier: Arc<dyn NotificationSink>,
    scheduler: Arc<dyn DeadlineScheduler>,
    clock: Arc<dyn Clock>,
    match_gates: DashMap<MatchId, Arc<Mutex<()>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] with in-memory backends.
    ///
    /// The question bank is seeded from `config.questions`.
    pub fn new(config: AppConfig) -> SharedState {
        AppStateBuilder::new(config).build()
    }

    /// Start assembling a state with custom collaborators.
    pub fn builder(config: AppConfig) -> AppStateBuilder {
        AppStateBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn match_store(&self) -> &Arc<dyn MatchStore> {
        &self.match_store
    }

    pub fn questions(&self) -> &Arc<dyn QuestionSource> {
        &self.questions
    }

    pub fn leaderboard(&self) -> &Arc<dyn LeaderboardAggregator> {
        &self.leaderboard
    }

    /// Broadcast hubs backing the SSE endpoints.
    pub fn sse(&self) -> &SseHubs {
        &self.sse
    }

    /// Sink every lifecycle event goes through.
    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    pub fn scheduler(&self) -> &Arc<dyn DeadlineScheduler> {
        &self.scheduler
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Take the mutex serializing every mutation of match `id`.
    ///
    /// The gate only lives in the map while some caller holds or awaits it, so
    /// ids that never resolve to a live match leave nothing behind.
    pub async fn lock_match(&self, id: MatchId) -> MatchLock<'_> {
        let gate = self
            .match_gates
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = Arc::clone(&gate).lock_owned().await;
        MatchLock {
            gates: &self.match_gates,
            id,
            gate,
            guard: Some(guard),
        }
    }

    /// Number of matches whose gate is currently held or awaited.
    pub fn gate_count(&self) -> usize {
        self.match_gates.len()
    }
}

/// Exclusive hold on one match, released on drop.
pub struct MatchLock<'a> {
    gates: &'a DashMap<MatchId, Arc<Mutex<()>>>,
    id: MatchId,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MatchLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // Once unlocked, only the map and this handle reference an idle gate.
        // Clones happen under the same shard lock, so a waiter keeps it alive.
        self.gates.remove_if(&self.id, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2
        });
    }
}

/// Builder overriding the collaborators of an [`AppState`].
pub struct AppStateBuilder {
    config: AppConfig,
    match_store: Option<Arc<dyn MatchStore>>,
    questions: Option<Arc<dyn QuestionSource>>,
    leaderboard: Option<Arc<dyn LeaderboardAggregator>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    scheduler: Option<Arc<dyn DeadlineScheduler>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AppStateBuilder {
    /// Builder falling back to in-memory stores, SSE hubs, tokio timers and the system clock.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            match_store: None,
            questions: None,
            leaderboard: None,
            notifier: None,
            scheduler: None,
            clock: None,
        }
    }

    pub fn with_match_store(mut self, store: Arc<dyn MatchStore>) -> Self {
        self.match_store = Some(store);
        self
    }

    pub fn with_question_source(mut self, questions: Arc<dyn QuestionSource>) -> Self {
        self.questions = Some(questions);
        self
    }

    pub fn with_leaderboard(mut self, leaderboard: Arc<dyn LeaderboardAggregator>) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    /// Route events to `notifier` instead of the SSE hubs.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn DeadlineScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> SharedState {
        let sse = Arc::new(SseHubs::new());
        let match_store: Arc<dyn MatchStore> = match self.match_store {
            Some(store) => store,
            None => Arc::new(InMemoryMatchStore::new()),
        };
        let questions: Arc<dyn QuestionSource> = match self.questions {
            Some(questions) => questions,
            None => Arc::new(InMemoryQuestionBank::from_questions(
                self.config.questions.iter().cloned(),
            )),
        };
        let leaderboard: Arc<dyn LeaderboardAggregator> = match self.leaderboard {
            Some(leaderboard) => leaderboard,
            None => Arc::new(InMemoryLeaderboard::new()),
        };
        let notifier: Arc<dyn NotificationSink> = match self.notifier {
            Some(notifier) => notifier,
            None => sse.clone(),
        };
        let scheduler: Arc<dyn DeadlineScheduler> = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(TokioDeadlineScheduler::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Arc::new(AppState {
            config: Arc::new(self.config),
            match_store,
            questions,
            leaderboard,
            sse,
            notifier,
            scheduler,
            clock,
            match_gates: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn gates_only_live_while_held_or_awaited() {
        let state = AppState::new(AppConfig::default());
        let id = Uuid::new_v4();

        let held = state.lock_match(id).await;
        let mut waiting = Box::pin(state.lock_match(id));
        assert!(futures::poll!(&mut waiting).is_pending());

        drop(held);
        assert_eq!(state.gate_count(), 1);

        let second = waiting.await;
        assert_eq!(state.gate_count(), 1);
        drop(second);
        assert_eq!(state.gate_count(), 0);
    }
}
