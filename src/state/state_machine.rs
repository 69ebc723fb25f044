use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Created by its owner, waiting for a challenger to be accepted.
    Waiting,
    /// Both players are in; questions are being dispatched.
    Active,
    /// Terminal: the match ended and its result is final.
    Completed,
    /// Terminal: the match was cancelled administratively.
    Cancelled,
}

impl MatchStatus {
    /// Whether no further mutation may be applied.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

/// Why an active match reached its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    /// The match-level deadline passed.
    Time,
    /// A participant reached the miss threshold.
    Disqualification,
    /// The owner ended the match early.
    Owner,
    /// The question source ran out of unserved questions.
    NoQuestions,
}

/// Events that can be applied to a match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// The owner accepted a challenger and the roster is complete.
    Accept,
    /// The active match reached a terminal condition.
    End(EndReason),
    /// Administrative cancellation.
    Cancel,
}

/// Error returned when attempting to apply an event absent from the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the match was in when the event was received.
    pub from: MatchStatus,
    /// The rejected event.
    pub event: MatchEvent,
}

/// Compute the status reached by applying `event` from `from`.
///
/// Anything not listed here is rejected, so terminal statuses can never regress.
pub fn transition(from: MatchStatus, event: MatchEvent) -> Result<MatchStatus, InvalidTransition> {
    let next = match (from, event) {
        (MatchStatus::Waiting, MatchEvent::Accept) => MatchStatus::Active,
        (MatchStatus::Active, MatchEvent::End(_)) => MatchStatus::Completed,
        (MatchStatus::Waiting | MatchStatus::Active, MatchEvent::Cancel) => MatchStatus::Cancelled,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let active = transition(MatchStatus::Waiting, MatchEvent::Accept).unwrap();
        assert_eq!(active, MatchStatus::Active);
        assert_eq!(
            transition(active, MatchEvent::End(EndReason::Time)).unwrap(),
            MatchStatus::Completed
        );
    }

    #[test]
    fn every_end_reason_completes_an_active_match() {
        for reason in [
            EndReason::Time,
            EndReason::Disqualification,
            EndReason::Owner,
            EndReason::NoQuestions,
        ] {
            assert_eq!(
                transition(MatchStatus::Active, MatchEvent::End(reason)).unwrap(),
                MatchStatus::Completed
            );
        }
    }

    #[test]
    fn waiting_match_cannot_end() {
        let err = transition(MatchStatus::Waiting, MatchEvent::End(EndReason::Owner)).unwrap_err();
        assert_eq!(err.from, MatchStatus::Waiting);
        assert_eq!(err.event, MatchEvent::End(EndReason::Owner));
    }

    #[test]
    fn accept_is_rejected_once_active() {
        let err = transition(MatchStatus::Active, MatchEvent::Accept).unwrap_err();
        assert_eq!(err.from, MatchStatus::Active);
    }

    #[test]
    fn terminal_statuses_never_regress() {
        for from in [MatchStatus::Completed, MatchStatus::Cancelled] {
            assert!(from.is_terminal());
            for event in [
                MatchEvent::Accept,
                MatchEvent::End(EndReason::Time),
                MatchEvent::Cancel,
            ] {
                assert!(transition(from, event).is_err(), "{from:?} accepted {event:?}");
            }
        }
    }
}
