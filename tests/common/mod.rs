#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use quiz_duel_back::{
    config::AppConfig,
    dao::{
        leaderboard::{InMemoryLeaderboard, LeaderboardAggregator},
        models::{LeaderEntity, QuestionEntity},
        question_source::InMemoryQuestionBank,
    },
    dto::matches::CreateMatchRequest,
    services::match_service,
    state::{
        AppState, SharedState,
        match_state::{Difficulty, Match, MatchId, QuestionId, UserId},
    },
    testing::{FlakyQuestionSource, ManualClock, ManualScheduler, RecordingSink},
};
use uuid::Uuid;

pub const MATCH_DURATION: Duration = Duration::from_secs(120);
pub const QUESTION_DURATION: Duration = Duration::from_secs(10);

/// Three-option question whose answer key is `correct_index`.
pub fn question(correct_index: u32) -> QuestionEntity {
    QuestionEntity {
        id: Uuid::new_v4(),
        prompt: format!("Which option is number {correct_index}?"),
        options: vec!["zero".into(), "one".into(), "two".into()],
        correct_index,
        difficulty: Difficulty::Easy,
        tags: vec!["general".into()],
    }
}

pub fn config(max_wrong: u32) -> AppConfig {
    AppConfig {
        match_duration: MATCH_DURATION,
        question_duration: QUESTION_DURATION,
        max_wrong,
        default_difficulty: None,
        questions: Vec::new(),
    }
}

/// Application state wired to fakes so tests drive time and timers by hand.
pub struct Harness {
    pub state: SharedState,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub sink: Arc<RecordingSink>,
    pub leaderboard: Arc<InMemoryLeaderboard>,
    pub bank: InMemoryQuestionBank,
    pub questions: Arc<FlakyQuestionSource>,
}

impl Harness {
    pub fn new(question_count: usize) -> Self {
        Self::with_config(config(3), question_count)
    }

    pub fn with_config(config: AppConfig, question_count: usize) -> Self {
        Self::build(config, question_count, Arc::new(RecordingSink::new()))
    }

    pub fn build(config: AppConfig, question_count: usize, sink: Arc<RecordingSink>) -> Self {
        let bank = InMemoryQuestionBank::from_questions(
            (0..question_count).map(|i| question((i % 3) as u32)),
        );
        let questions = Arc::new(FlakyQuestionSource::new(bank.clone()));
        let clock = Arc::new(ManualClock::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let leaderboard = Arc::new(InMemoryLeaderboard::new());
        let state = AppState::builder(config)
            .with_question_source(questions.clone())
            .with_leaderboard(leaderboard.clone())
            .with_notifier(sink.clone())
            .with_scheduler(scheduler.clone())
            .with_clock(clock.clone())
            .build();

        Self {
            state,
            clock,
            scheduler,
            sink,
            leaderboard,
            bank,
            questions,
        }
    }

    /// Waiting match owned by a fresh user.
    pub async fn waiting_match(&self) -> (MatchId, UserId) {
        let owner = Uuid::new_v4();
        let game = match_service::create_match(&self.state, owner, CreateMatchRequest::default())
            .await
            .unwrap();
        (game.id, owner)
    }

    /// Active match with its first question served.
    pub async fn active_match(&self) -> (MatchId, UserId, UserId) {
        let (id, owner) = self.waiting_match().await;
        let challenger = Uuid::new_v4();
        match_service::request_join(&self.state, id, challenger)
            .await
            .unwrap();
        match_service::accept_join(&self.state, id, owner, challenger)
            .await
            .unwrap();
        (id, owner, challenger)
    }

    pub async fn load(&self, id: MatchId) -> Match {
        match_service::get_match(&self.state, id).await.unwrap()
    }

    /// Current question and its answer key.
    pub async fn current_question(&self, id: MatchId) -> (QuestionId, u32) {
        let question_id = self
            .load(id)
            .await
            .current_question
            .expect("a question is open")
            .id;
        let key = self
            .state
            .questions()
            .fetch_answer_key(question_id)
            .await
            .unwrap()
            .unwrap();
        (question_id, key)
    }

    pub async fn answer(&self, id: MatchId, user: UserId, correct: bool) {
        let (question_id, key) = self.current_question(id).await;
        let selected = if correct { key } else { (key + 1) % 3 };
        let response = match_service::submit_answer(&self.state, id, user, question_id, selected)
            .await
            .unwrap();
        assert!(response.accepted);
        assert_eq!(response.is_correct, correct);
    }

    pub async fn leader(&self, user: UserId) -> Option<LeaderEntity> {
        self.leaderboard.find_leader(user).await.unwrap()
    }
}
