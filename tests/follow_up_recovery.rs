mod common;

use quiz_duel_back::services::{
    match_service::{self, FOLLOW_UP_RETRY_DELAY},
    notifications::{EVENT_MATCH_ENDED, EVENT_QUESTION_DISPATCHED},
};
use quiz_duel_back::state::state_machine::{EndReason, MatchStatus};
use uuid::Uuid;

use common::{Harness, QUESTION_DURATION};

#[tokio::test]
async fn failed_first_dispatch_returns_the_stored_match_and_retries() {
    let h = Harness::new(5);
    let (id, owner) = h.waiting_match().await;
    let challenger = Uuid::new_v4();
    match_service::request_join(&h.state, id, challenger)
        .await
        .unwrap();

    h.questions.fail_next(2);
    let started = match_service::accept_join(&h.state, id, owner, challenger)
        .await
        .unwrap();
    assert_eq!(started.status, MatchStatus::Active);
    assert!(started.current_question.is_none());
    assert_eq!(started, h.load(id).await);
    assert_eq!(h.scheduler.armed_after(id), Some(FOLLOW_UP_RETRY_DELAY));

    // The first retry fails as well and arms another one.
    h.clock.advance(FOLLOW_UP_RETRY_DELAY);
    assert!(h.scheduler.fire(id).await);
    assert!(h.load(id).await.current_question.is_none());
    assert_eq!(h.scheduler.armed_after(id), Some(FOLLOW_UP_RETRY_DELAY));
    assert_eq!(h.sink.count(EVENT_QUESTION_DISPATCHED), 0);

    h.clock.advance(FOLLOW_UP_RETRY_DELAY);
    assert!(h.scheduler.fire(id).await);
    let game = h.load(id).await;
    assert!(game.current_question.is_some());
    assert_eq!(game.served_question_ids.len(), 1);
    assert_eq!(h.scheduler.armed_after(id), Some(QUESTION_DURATION));
    assert_eq!(h.sink.count(EVENT_QUESTION_DISPATCHED), 1);
}

#[tokio::test]
async fn failed_dispatch_after_a_timeout_is_retried_without_charging_misses_twice() {
    let h = Harness::new(5);
    let (id, owner, challenger) = h.active_match().await;
    let (first, _) = h.current_question(id).await;

    h.clock.advance(QUESTION_DURATION);
    h.questions.fail_next(1);
    assert!(h.scheduler.fire(id).await);

    let game = h.load(id).await;
    assert_eq!(game.status, MatchStatus::Active);
    assert_eq!(game.current_question.map(|current| current.id), Some(first));
    assert_eq!(game.participants.get(owner).unwrap().wrong_count, 1);
    assert_eq!(h.scheduler.armed_after(id), Some(FOLLOW_UP_RETRY_DELAY));

    h.clock.advance(FOLLOW_UP_RETRY_DELAY);
    assert!(h.scheduler.fire(id).await);

    let (second, _) = h.current_question(id).await;
    assert_ne!(second, first);
    let game = h.load(id).await;
    assert_eq!(game.participants.get(owner).unwrap().wrong_count, 1);
    assert_eq!(game.participants.get(challenger).unwrap().wrong_count, 1);
    assert_eq!(h.scheduler.armed_after(id), Some(QUESTION_DURATION));
}

#[tokio::test]
async fn retry_is_dropped_once_the_match_moved_on() {
    let h = Harness::new(5);
    let (id, owner) = h.waiting_match().await;
    let challenger = Uuid::new_v4();
    match_service::request_join(&h.state, id, challenger)
        .await
        .unwrap();

    h.questions.fail_next(1);
    match_service::accept_join(&h.state, id, owner, challenger)
        .await
        .unwrap();
    match_service::force_end(&h.state, id, owner).await.unwrap();
    let ended = h.load(id).await;
    assert_eq!(ended.end_reason, Some(EndReason::Owner));

    assert_eq!(h.scheduler.fire_superseded(id).await, 1);
    assert_eq!(h.load(id).await, ended);
    assert_eq!(h.sink.count(EVENT_QUESTION_DISPATCHED), 0);
    assert_eq!(h.sink.count(EVENT_MATCH_ENDED), 1);
    assert_eq!(h.state.gate_count(), 0);
}
