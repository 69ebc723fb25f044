use tracing::{info, warn};

use crate::{
    dao::models::ResultKind,
    state::{
        SharedState,
        match_state::{MatchId, Participant, Roster, UserId},
    },
};

/// Final verdict of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// `None` on a draw, or when the match never had two players.
    pub winner: Option<UserId>,
    /// One `(user, score, result)` per participant, in roster order.
    pub standings: Vec<(UserId, u32, ResultKind)>,
}

/// Decide the winner of a match.
///
/// A lone disqualification hands the win to the other player whatever the scores.
/// Two disqualified players draw. Otherwise the strictly higher score wins.
pub fn compute_result(roster: &Roster) -> MatchOutcome {
    let participants: Vec<&Participant> = roster.iter().collect();
    let &[first, second] = participants.as_slice() else {
        return MatchOutcome {
            winner: None,
            standings: Vec::new(),
        };
    };

    let winner = match (first.is_disqualified(), second.is_disqualified()) {
        (true, false) => Some(second.user),
        (false, true) => Some(first.user),
        (true, true) => None,
        _ if first.score > second.score => Some(first.user),
        _ if second.score > first.score => Some(second.user),
        _ => None,
    };

    let standings = participants
        .iter()
        .map(|participant| {
            let result = match winner {
                None => ResultKind::Draw,
                Some(user) if user == participant.user => ResultKind::Win,
                Some(_) => ResultKind::Loss,
            };
            (participant.user, participant.score, result)
        })
        .collect();

    MatchOutcome { winner, standings }
}

/// Push each participant's result to the leaderboard. Failures are logged and dropped.
pub async fn record_leaderboard(state: &SharedState, match_id: MatchId, outcome: &MatchOutcome) {
    for &(user, score, result) in &outcome.standings {
        if let Err(err) = state.leaderboard().record_result(user, score, result).await {
            warn!(match_id = %match_id, user = %user, error = %err, "failed to record leaderboard result");
        }
    }
    info!(match_id = %match_id, winner = ?outcome.winner, "leaderboard updated");
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;

    fn roster(scores: (u32, u32), disqualified: (bool, bool)) -> (Roster, UserId, UserId) {
        let owner = Uuid::new_v4();
        let challenger = Uuid::new_v4();
        let mut roster = Roster::new(owner);
        roster.add(challenger).unwrap();
        let now = SystemTime::now();
        for (user, score, dq) in [
            (owner, scores.0, disqualified.0),
            (challenger, scores.1, disqualified.1),
        ] {
            let participant = roster.get_mut(user).unwrap();
            participant.score = score;
            if dq {
                participant.wrong_count = 3;
                participant.disqualified_at = Some(now);
            }
        }
        (roster, owner, challenger)
    }

    #[test]
    fn higher_score_wins() {
        let (roster, owner, challenger) = roster((4, 2), (false, false));
        let outcome = compute_result(&roster);
        assert_eq!(outcome.winner, Some(owner));
        assert_eq!(
            outcome.standings,
            vec![(owner, 4, ResultKind::Win), (challenger, 2, ResultKind::Loss)]
        );
    }

    #[test]
    fn disqualification_overrides_score() {
        let (roster, _, challenger) = roster((9, 0), (true, false));
        assert_eq!(compute_result(&roster).winner, Some(challenger));
    }

    #[test]
    fn equal_scores_draw() {
        let (roster, _, _) = roster((5, 5), (false, false));
        let outcome = compute_result(&roster);
        assert_eq!(outcome.winner, None);
        assert!(
            outcome
                .standings
                .iter()
                .all(|(_, _, result)| *result == ResultKind::Draw)
        );
    }

    #[test]
    fn both_disqualified_is_a_draw_whatever_the_scores() {
        let (roster, _, _) = roster((1, 3), (true, true));
        let outcome = compute_result(&roster);
        assert_eq!(outcome.winner, None);
        assert!(
            outcome
                .standings
                .iter()
                .all(|(_, _, result)| *result == ResultKind::Draw)
        );
    }

    #[test]
    fn result_is_deterministic_for_every_combination() {
        for owner_score in 0..4 {
            for challenger_score in 0..4 {
                for dq in [(false, false), (true, false), (false, true), (true, true)] {
                    let (roster, _, _) = roster((owner_score, challenger_score), dq);
                    assert_eq!(compute_result(&roster), compute_result(&roster));
                    let outcome = compute_result(&roster);
                    let wins = outcome
                        .standings
                        .iter()
                        .filter(|(_, _, result)| *result == ResultKind::Win)
                        .count();
                    assert_eq!(wins, usize::from(outcome.winner.is_some()));
                }
            }
        }
    }

    #[test]
    fn solo_roster_has_no_winner() {
        let roster = Roster::new(Uuid::new_v4());
        let outcome = compute_result(&roster);
        assert_eq!(outcome.winner, None);
        assert!(outcome.standings.is_empty());
    }
}
