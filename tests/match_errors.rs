mod common;

use std::{sync::Arc, time::Duration};

use quiz_duel_back::{
    dto::matches::CreateMatchRequest,
    error::ServiceError,
    services::{
        match_service,
        notifications::{EVENT_JOIN_REQUESTED, EVENT_MATCH_ENDED},
    },
    state::{
        match_state::Difficulty,
        state_machine::{EndReason, MatchStatus},
    },
    testing::{RecordingSink, UnavailableLeaderboard},
};
use uuid::Uuid;

use common::{Harness, QUESTION_DURATION, config};

#[tokio::test]
async fn repeated_join_requests_are_recorded_once() {
    let h = Harness::new(5);
    let (id, owner) = h.waiting_match().await;
    let challenger = Uuid::new_v4();

    match_service::request_join(&h.state, id, challenger)
        .await
        .unwrap();
    match_service::request_join(&h.state, id, challenger)
        .await
        .unwrap();

    let game = h.load(id).await;
    assert_eq!(game.pending_join_requests.len(), 1);
    assert_eq!(h.sink.count(EVENT_JOIN_REQUESTED), 1);

    let err = match_service::request_join(&h.state, id, owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn started_or_unknown_matches_are_not_joinable() {
    let h = Harness::new(5);
    let (id, _, _) = h.active_match().await;

    let err = match_service::request_join(&h.state, id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotJoinable(_)));

    let err = match_service::request_join(&h.state, Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn only_the_owner_accepts_pending_requests() {
    let h = Harness::new(5);
    let (id, owner) = h.waiting_match().await;
    let challenger = Uuid::new_v4();

    let err = match_service::accept_join(&h.state, id, owner, challenger)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    match_service::request_join(&h.state, id, challenger)
        .await
        .unwrap();
    let err = match_service::accept_join(&h.state, id, challenger, challenger)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let game = h.load(id).await;
    assert_eq!(game.status, MatchStatus::Waiting);
    assert_eq!(game.participants.len(), 1);
}

#[tokio::test]
async fn answers_past_the_question_deadline_change_nothing() {
    let h = Harness::new(5);
    let (id, owner, _) = h.active_match().await;
    let (question_id, key) = h.current_question(id).await;
    let before = h.load(id).await;

    h.clock.advance(QUESTION_DURATION + Duration::from_millis(1));
    let err = match_service::submit_answer(&h.state, id, owner, question_id, key)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Expired(_)));

    let after = h.load(id).await;
    assert_eq!(after, before);
    let participant = after.participants.get(owner).unwrap();
    assert_eq!((participant.score, participant.wrong_count), (0, 0));
}

#[tokio::test]
async fn second_answer_to_the_same_question_is_a_duplicate() {
    let h = Harness::new(5);
    let (id, owner, _) = h.active_match().await;
    let (question_id, key) = h.current_question(id).await;

    let first = match_service::submit_answer(&h.state, id, owner, question_id, key)
        .await
        .unwrap();
    assert!(first.is_correct);

    let err = match_service::submit_answer(&h.state, id, owner, question_id, (key + 1) % 3)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Duplicate(_)));

    let game = h.load(id).await;
    let record = game.current_record().unwrap();
    assert_eq!(record.answers.len(), 1);
    assert_eq!(record.answers[0].selected_index, key);
    assert!(record.answers[0].is_correct);
    let participant = game.participants.get(owner).unwrap();
    assert_eq!((participant.score, participant.wrong_count), (1, 0));
}

#[tokio::test]
async fn outsiders_and_stale_questions_are_rejected() {
    let h = Harness::new(5);
    let (id, owner, _) = h.active_match().await;
    let (question_id, key) = h.current_question(id).await;

    let err = match_service::submit_answer(&h.state, id, Uuid::new_v4(), question_id, key)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = match_service::submit_answer(&h.state, id, owner, Uuid::new_v4(), key)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn disqualifying_miss_closes_the_match_to_answers() {
    let h = Harness::with_config(config(2), 5);
    let (id, owner, challenger) = h.active_match().await;

    h.answer(id, challenger, true).await;
    h.answer(id, owner, false).await;
    let game = h.load(id).await;
    assert_eq!(game.participants.get(owner).unwrap().wrong_count, 1);

    h.answer(id, owner, false).await;
    let game = h.load(id).await;
    assert_eq!(game.end_reason, Some(EndReason::Disqualification));

    let err = match_service::submit_answer(&h.state, id, owner, Uuid::new_v4(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn answering_a_waiting_match_is_invalid() {
    let h = Harness::new(5);
    let (id, owner) = h.waiting_match().await;

    let err = match_service::submit_answer(&h.state, id, owner, Uuid::new_v4(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let err = match_service::submit_answer(&h.state, Uuid::new_v4(), owner, Uuid::new_v4(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn force_end_requires_the_owner_and_an_active_match() {
    let h = Harness::new(5);
    let (waiting, waiting_owner) = h.waiting_match().await;
    let err = match_service::force_end(&h.state, waiting, waiting_owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let (id, owner, challenger) = h.active_match().await;
    let err = match_service::force_end(&h.state, id, challenger)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    assert_eq!(h.load(id).await.status, MatchStatus::Active);

    match_service::force_end(&h.state, id, owner).await.unwrap();
    let err = match_service::force_end(&h.state, id, owner)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(h.sink.count(EVENT_MATCH_ENDED), 1);
    assert_eq!(h.leader(owner).await.unwrap().matches, 1);
}

#[tokio::test]
async fn results_are_only_available_once_completed() {
    let h = Harness::new(5);
    let (id, _, _) = h.active_match().await;

    let err = match_service::get_results(&h.state, id).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
}

#[tokio::test]
async fn failing_notifications_never_roll_back_mutations() {
    let h = Harness::build(config(3), 5, Arc::new(RecordingSink::failing()));
    let (id, owner, challenger) = h.active_match().await;

    h.answer(id, owner, true).await;
    h.answer(id, challenger, true).await;

    let game = h.load(id).await;
    assert_eq!(game.status, MatchStatus::Active);
    assert_eq!(game.served_question_ids.len(), 2);
    assert_eq!(game.participants.get(owner).unwrap().score, 1);
}

#[tokio::test]
async fn leaderboard_outage_does_not_block_the_end_of_a_match() {
    let h = Harness::new(5);
    let state = quiz_duel_back::state::AppState::builder(config(3))
        .with_question_source(Arc::new(h.bank.clone()))
        .with_leaderboard(Arc::new(UnavailableLeaderboard))
        .with_notifier(h.sink.clone())
        .with_scheduler(h.scheduler.clone())
        .with_clock(h.clock.clone())
        .build();

    let owner = Uuid::new_v4();
    let challenger = Uuid::new_v4();
    let game = match_service::create_match(&state, owner, CreateMatchRequest::default())
        .await
        .unwrap();
    match_service::request_join(&state, game.id, challenger)
        .await
        .unwrap();
    match_service::accept_join(&state, game.id, owner, challenger)
        .await
        .unwrap();

    match_service::force_end(&state, game.id, owner).await.unwrap();
    let ended = match_service::get_match(&state, game.id).await.unwrap();
    assert_eq!(ended.status, MatchStatus::Completed);
    assert_eq!(h.sink.count(EVENT_MATCH_ENDED), 1);
}

#[tokio::test]
async fn create_applies_the_configured_difficulty_and_trims_tags() {
    let mut settings = config(3);
    settings.default_difficulty = Some(Difficulty::Hard);
    let h = Harness::with_config(settings, 0);

    let game = match_service::create_match(
        &h.state,
        Uuid::new_v4(),
        CreateMatchRequest {
            difficulty: None,
            tags: vec![" science ".into(), "science".into(), "history".into()],
        },
    )
    .await
    .unwrap();

    assert_eq!(game.filters.difficulty, Some(Difficulty::Hard));
    assert_eq!(
        game.filters.tags.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["history", "science"]
    );
}

#[tokio::test]
async fn waiting_matches_are_listed_newest_first() {
    let h = Harness::new(0);
    let (older, _) = h.waiting_match().await;
    h.clock.advance(Duration::from_secs(1));
    let (newer, _) = h.waiting_match().await;

    let listed: Vec<_> = match_service::list_waiting(&h.state)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(listed, vec![newer, older]);
}

#[tokio::test]
async fn requests_against_unknown_or_finished_matches_leave_no_gate() {
    let h = Harness::new(5);
    let user = Uuid::new_v4();

    let _ = match_service::request_join(&h.state, Uuid::new_v4(), user).await;
    let _ = match_service::accept_join(&h.state, Uuid::new_v4(), user, user).await;
    let _ = match_service::force_end(&h.state, Uuid::new_v4(), user).await;
    assert_eq!(h.state.gate_count(), 0);

    let (id, owner, _) = h.active_match().await;
    assert_eq!(h.state.gate_count(), 0);
    match_service::force_end(&h.state, id, owner).await.unwrap();

    let err = match_service::submit_answer(&h.state, id, owner, Uuid::new_v4(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    let err = match_service::request_join(&h.state, id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotJoinable(_)));
    assert_eq!(h.state.gate_count(), 0);
}
