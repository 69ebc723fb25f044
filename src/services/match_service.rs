use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{
    dao::models::{MatchListItemEntity, MatchEntity},
    dto::matches::{AnswerResponse, CreateMatchRequest},
    error::ServiceError,
    services::{
        notifications,
        results::{self, MatchOutcome, compute_result},
    },
    state::{
        SharedState,
        clock::truncate_to_millis,
        match_state::{
            Answer, CurrentQuestion, Match, MatchId, QuestionFilters, QuestionId, UserId,
        },
        state_machine::{EndReason, MatchStatus},
    },
};

/// Delay before a failed dispatch or end of match is attempted again.
pub const FOLLOW_UP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Next step once a mutation has been committed and announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    /// Nothing to do until the next answer or timeout.
    Wait,
    /// Serve the next question.
    Advance,
    /// Close the match.
    End(EndReason),
}

enum Dispatch {
    Served,
    Exhausted,
}

/// Question a timer was armed for; a fire that no longer matches it is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedQuestion {
    pub question_id: QuestionId,
    pub deadline: SystemTime,
}

impl From<ArmedQuestion> for CurrentQuestion {
    fn from(armed: ArmedQuestion) -> Self {
        Self {
            id: armed.question_id,
            deadline: armed.deadline,
        }
    }
}

/// Open a waiting match owned by `owner`.
pub async fn create_match(
    state: &SharedState,
    owner: UserId,
    request: CreateMatchRequest,
) -> Result<Match, ServiceError> {
    let filters = QuestionFilters {
        difficulty: request
            .difficulty
            .or(state.config().default_difficulty),
        tags: request
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_owned())
            .collect::<BTreeSet<_>>(),
    };
    let game = Match::new(owner, filters, state.clock().now());
    game.check_invariants()?;

    state
        .match_store()
        .insert_match(MatchEntity::from(game.clone()))
        .await?;

    info!(match_id = %game.id, owner = %owner, "match created");
    notifications::announce_created(state, &game);
    Ok(game)
}

/// Matches waiting for a challenger, newest first.
pub async fn list_waiting(state: &SharedState) -> Result<Vec<MatchListItemEntity>, ServiceError> {
    Ok(state.match_store().list_waiting().await?)
}

/// Fetch a match by id.
pub async fn get_match(state: &SharedState, id: MatchId) -> Result<Match, ServiceError> {
    load(state, id).await
}

/// Final standings of a completed match.
pub async fn get_results(
    state: &SharedState,
    id: MatchId,
) -> Result<(Match, MatchOutcome), ServiceError> {
    let game = load(state, id).await?;
    if game.status != MatchStatus::Completed {
        return Err(ServiceError::InvalidState(format!(
            "match `{id}` is not completed"
        )));
    }
    let outcome = compute_result(&game.participants);
    Ok((game, outcome))
}

/// Ask to join a waiting match. Asking twice, or asking while already seated, is a no-op.
pub async fn request_join(
    state: &SharedState,
    id: MatchId,
    user: UserId,
) -> Result<(), ServiceError> {
    let _guard = state.lock_match(id).await;

    let mut game = load(state, id).await?;
    if game.status != MatchStatus::Waiting {
        return Err(ServiceError::NotJoinable(format!(
            "match `{id}` is not waiting for players"
        )));
    }
    if user == game.owner {
        return Err(ServiceError::InvalidInput(
            "owner cannot join their own match".into(),
        ));
    }
    if !game.add_join_request(user, state.clock().now()) {
        debug!(match_id = %id, user = %user, "join request already recorded");
        return Ok(());
    }

    commit(state, &mut game).await?;
    notifications::announce_join_requested(state, &game, user);
    Ok(())
}

/// Accept a pending join request, start the match and serve its first question.
pub async fn accept_join(
    state: &SharedState,
    id: MatchId,
    caller: UserId,
    user: UserId,
) -> Result<Match, ServiceError> {
    let guard = state.lock_match(id).await;

    let mut game = load(state, id).await?;
    if caller != game.owner {
        return Err(ServiceError::Forbidden(
            "only the owner can accept join requests".into(),
        ));
    }
    if game.status != MatchStatus::Waiting {
        return Err(ServiceError::InvalidState(format!(
            "match `{id}` is not waiting for players"
        )));
    }
    if !game.has_pending_request(user) {
        return Err(ServiceError::InvalidState(format!(
            "no join request from user `{user}`"
        )));
    }
    if !game.participants.contains(user) {
        game.participants.add(user)?;
    }
    if !game.participants.is_full() {
        return Err(ServiceError::InvalidState(
            "a match needs exactly two distinct players".into(),
        ));
    }

    let now = state.clock().now();
    game.activate(now, state.config().match_duration)?;
    commit(state, &mut game).await?;

    info!(match_id = %id, challenger = %user, "match started");
    notifications::announce_started(state, &game, user);

    let completed = run_follow_up(state, &mut game, FollowUp::Advance).await;
    drop(guard);
    settle(state, id, completed).await;
    Ok(game)
}

/// Record a participant's answer to the current question.
pub async fn submit_answer(
    state: &SharedState,
    id: MatchId,
    user: UserId,
    question_id: QuestionId,
    selected_index: u32,
) -> Result<AnswerResponse, ServiceError> {
    let guard = state.lock_match(id).await;

    let mut game = load(state, id).await?;
    if game.status != MatchStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "match `{id}` is not active"
        )));
    }

    let now = state.clock().now();
    if game.match_expired(now) {
        let completed = run_follow_up(state, &mut game, FollowUp::End(EndReason::Time)).await;
        drop(guard);
        settle(state, id, completed).await;
        return Err(ServiceError::Expired("match time is over".into()));
    }

    match game.participants.get(user) {
        None => {
            return Err(ServiceError::Forbidden(
                "not a participant of this match".into(),
            ));
        }
        Some(participant) if participant.is_disqualified() => {
            return Err(ServiceError::Forbidden("participant is disqualified".into()));
        }
        Some(_) => {}
    }

    if game.current_question.map(|current| current.id) != Some(question_id) {
        return Err(ServiceError::InvalidState(
            "not the current question".into(),
        ));
    }
    if game.question_expired(now) {
        return Err(ServiceError::Expired("question timed out".into()));
    }
    if game
        .current_record()
        .is_some_and(|record| record.has_answered(user))
    {
        return Err(ServiceError::Duplicate(
            "question already answered".into(),
        ));
    }

    let correct_index = state
        .questions()
        .fetch_answer_key(question_id)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState(format!("question `{question_id}` no longer exists"))
        })?;
    let is_correct = selected_index == correct_index;

    game.record_answer(Answer {
        user,
        selected_index,
        is_correct,
        answered_at: now,
    })?;
    let threshold = state.config().max_wrong;
    if let Some(participant) = game.participants.get_mut(user) {
        if is_correct {
            participant.score += 1;
        } else if participant.record_miss(threshold, now) {
            info!(match_id = %id, user = %user, "participant disqualified");
        }
    }

    commit(state, &mut game).await?;
    notifications::announce_scores(state, &game, Some(user));

    let follow_up = if game.participants.any_disqualified() {
        FollowUp::End(EndReason::Disqualification)
    } else if game.all_answered_current() {
        notifications::announce_reveal(state, id, question_id, correct_index);
        if game.match_expired(now) {
            FollowUp::End(EndReason::Time)
        } else {
            FollowUp::Advance
        }
    } else {
        FollowUp::Wait
    };

    let completed = run_follow_up(state, &mut game, follow_up).await;
    drop(guard);
    settle(state, id, completed).await;

    Ok(AnswerResponse {
        accepted: true,
        is_correct,
    })
}

/// Apply a question deadline. Stale fires are ignored.
pub async fn handle_question_timeout(
    state: &SharedState,
    id: MatchId,
    armed: ArmedQuestion,
) -> Result<(), ServiceError> {
    let guard = state.lock_match(id).await;

    let mut game = match load(state, id).await {
        Ok(game) => game,
        Err(ServiceError::NotFound(_)) => {
            debug!(match_id = %id, "timer fired for unknown match");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    if game.status != MatchStatus::Active || game.current_question != Some(armed.into()) {
        debug!(
            match_id = %id,
            question_id = %armed.question_id,
            status = ?game.status,
            "ignoring stale question timer"
        );
        return Ok(());
    }

    let now = state.clock().now();
    let threshold = state.config().max_wrong;
    let missing: Vec<UserId> = game
        .participants
        .iter()
        .filter(|participant| !participant.is_disqualified())
        .filter(|participant| {
            !game
                .current_record()
                .is_some_and(|record| record.has_answered(participant.user))
        })
        .map(|participant| participant.user)
        .collect();
    for user in &missing {
        if let Some(participant) = game.participants.get_mut(*user) {
            if participant.record_miss(threshold, now) {
                info!(match_id = %id, user = %user, "participant disqualified");
            }
        }
    }

    commit(state, &mut game).await?;
    debug!(match_id = %id, question_id = %armed.question_id, missed = missing.len(), "question timed out");
    notifications::announce_timed_out(state, id, armed.question_id);
    notifications::announce_scores(state, &game, None);

    let follow_up = if game.participants.any_disqualified() {
        FollowUp::End(EndReason::Disqualification)
    } else if game.match_expired(now) {
        FollowUp::End(EndReason::Time)
    } else {
        FollowUp::Advance
    };

    let completed = run_follow_up(state, &mut game, follow_up).await;
    drop(guard);
    settle(state, id, completed).await;
    Ok(())
}

/// End an active match on the owner's request.
pub async fn force_end(
    state: &SharedState,
    id: MatchId,
    caller: UserId,
) -> Result<(), ServiceError> {
    let guard = state.lock_match(id).await;

    let mut game = load(state, id).await?;
    if caller != game.owner {
        return Err(ServiceError::Forbidden(
            "only the owner can end the match".into(),
        ));
    }
    if game.status != MatchStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "match `{id}` is not active"
        )));
    }

    let outcome = end_match(state, &mut game, EndReason::Owner).await?;
    drop(guard);
    settle(state, id, Some(outcome)).await;
    Ok(())
}

async fn load(state: &SharedState, id: MatchId) -> Result<Match, ServiceError> {
    let entity = state
        .match_store()
        .find_match(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{id}`")))?;
    Ok(Match::try_from(entity)?)
}

/// Validate and persist `game`, bumping its version.
async fn commit(state: &SharedState, game: &mut Match) -> Result<(), ServiceError> {
    game.check_invariants()?;
    let expected = game.version;
    game.version += 1;
    game.touch(state.clock().now());

    if let Err(err) = state
        .match_store()
        .replace_match(MatchEntity::from(game.clone()), expected)
        .await
    {
        game.version = expected;
        return Err(err.into());
    }
    Ok(())
}

/// Drive follow-up steps until the match waits for input or ends.
///
/// Returns the outcome when the match completed. A failed step leaves `game`
/// as stored and arms a retry: the triggering mutation is already committed.
async fn run_follow_up(
    state: &SharedState,
    game: &mut Match,
    mut step: FollowUp,
) -> Option<MatchOutcome> {
    loop {
        let failure = match step {
            FollowUp::Wait => return None,
            FollowUp::End(reason) => match end_match(state, game, reason).await {
                Ok(outcome) => return Some(outcome),
                Err(err) => err,
            },
            FollowUp::Advance => match dispatch_next(state, game).await {
                Ok(Dispatch::Served) => return None,
                Ok(Dispatch::Exhausted) => {
                    step = FollowUp::End(EndReason::NoQuestions);
                    continue;
                }
                Err(err) => err,
            },
        };

        warn!(
            match_id = %game.id,
            ?step,
            error = %failure,
            retry_in = ?FOLLOW_UP_RETRY_DELAY,
            "follow-up step failed"
        );
        arm_follow_up_retry(state, game.id, game.version);
        return None;
    }
}

/// Step a match owes given its stored state, used when resuming after a failure.
fn pending_follow_up(game: &Match, now: SystemTime) -> FollowUp {
    let question_closed = game
        .current_question
        .is_none_or(|current| now >= current.deadline);
    if game.participants.any_disqualified() {
        FollowUp::End(EndReason::Disqualification)
    } else if game.match_expired(now) {
        FollowUp::End(EndReason::Time)
    } else if question_closed || game.all_answered_current() {
        FollowUp::Advance
    } else {
        FollowUp::Wait
    }
}

/// Retry the follow-up of a match, unless it was mutated since the failure.
async fn resume_follow_up(
    state: &SharedState,
    id: MatchId,
    version: u64,
) -> Result<(), ServiceError> {
    let guard = state.lock_match(id).await;

    let mut game = match load(state, id).await {
        Ok(game) => game,
        Err(ServiceError::NotFound(_)) => return Ok(()),
        Err(err) => return Err(err),
    };
    if game.status != MatchStatus::Active || game.version != version {
        debug!(match_id = %id, version, current = game.version, "ignoring stale follow-up retry");
        return Ok(());
    }

    let now = state.clock().now();
    let step = pending_follow_up(&game, now);
    if let (FollowUp::Wait, Some(current)) = (step, game.current_question) {
        let remaining = current.deadline.duration_since(now).unwrap_or_default();
        arm_question_timer(
            state,
            id,
            ArmedQuestion {
                question_id: current.id,
                deadline: current.deadline,
            },
            remaining,
        );
    }

    let completed = run_follow_up(state, &mut game, step).await;
    drop(guard);
    settle(state, id, completed).await;
    Ok(())
}

fn arm_follow_up_retry(state: &SharedState, id: MatchId, version: u64) {
    let timer_state = Arc::clone(state);
    state.scheduler().arm(
        id,
        FOLLOW_UP_RETRY_DELAY,
        Box::new(move || follow_up_retry_task(timer_state, id, version)),
    );
}

fn follow_up_retry_task(state: SharedState, id: MatchId, version: u64) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(err) = resume_follow_up(&state, id, version).await {
            warn!(match_id = %id, error = %err, "follow-up retry failed");
            arm_follow_up_retry(&state, id, version);
        }
    })
}

/// Serve a fresh question and arm its deadline. `game` is left untouched on failure.
async fn dispatch_next(state: &SharedState, game: &mut Match) -> Result<Dispatch, ServiceError> {
    let exclude: Vec<QuestionId> = game.served_question_ids.iter().copied().collect();
    let Some(question) = state
        .questions()
        .fetch_random(exclude, game.filters.clone())
        .await?
    else {
        info!(match_id = %game.id, served = game.served_question_ids.len(), "question source exhausted");
        return Ok(Dispatch::Exhausted);
    };

    let duration = state.config().question_duration;
    let deadline = truncate_to_millis(state.clock().now() + duration);
    let mut next = game.clone();
    next.serve_question(question.id, deadline)?;
    commit(state, &mut next).await?;
    *game = next;

    let armed = ArmedQuestion {
        question_id: question.id,
        deadline,
    };
    arm_question_timer(state, game.id, armed, duration);

    notifications::announce_question(state, game.id, &question, deadline);
    Ok(Dispatch::Served)
}

fn arm_question_timer(state: &SharedState, id: MatchId, armed: ArmedQuestion, after: Duration) {
    let timer_state = Arc::clone(state);
    state.scheduler().arm(
        id,
        after,
        Box::new(move || question_timeout_task(timer_state, id, armed)),
    );
}

fn question_timeout_task(
    state: SharedState,
    id: MatchId,
    armed: ArmedQuestion,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(err) = handle_question_timeout(&state, id, armed).await {
            warn!(match_id = %id, error = %err, "question timeout handling failed");
        }
    })
}

async fn end_match(
    state: &SharedState,
    game: &mut Match,
    reason: EndReason,
) -> Result<MatchOutcome, ServiceError> {
    let mut finished = game.clone();
    finished.finish(reason)?;
    commit(state, &mut finished).await?;
    *game = finished;
    state.scheduler().cancel(game.id);

    let outcome = compute_result(&game.participants);
    info!(match_id = %game.id, ?reason, winner = ?outcome.winner, "match ended");
    notifications::announce_ended(state, game, reason, &outcome);
    Ok(outcome)
}

/// Post-commit work that runs without the match lock.
async fn settle(state: &SharedState, id: MatchId, completed: Option<MatchOutcome>) {
    if let Some(outcome) = completed {
        results::record_leaderboard(state, id, &outcome).await;
    }
}
