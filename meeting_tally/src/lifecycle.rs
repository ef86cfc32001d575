use std::fmt::Display;

use chrono::NaiveDateTime;
use log::debug;
use serde::Serialize;
use snafu::prelude::*;

use crate::config::Meeting;
use crate::errors::*;

/// The state of a meeting.
///
/// `Draft -> Active` and `Active -> Closed` follow the vote window.
/// `Closed -> Completed` happens when the organizer publishes the results.
/// No state can be skipped and no state is ever left backwards.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingState {
    Draft,
    Active,
    Closed,
    Completed,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The vote window opened.
    Open,
    /// The vote window elapsed.
    Close,
    /// The organizer published the results.
    Finalize,
}

impl Display for MeetingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MeetingState::Draft => "draft",
            MeetingState::Active => "active",
            MeetingState::Closed => "closed",
            MeetingState::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

impl Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleEvent::Open => "open",
            LifecycleEvent::Close => "close",
            LifecycleEvent::Finalize => "finalize",
        };
        write!(f, "{}", s)
    }
}

impl MeetingState {
    /// The state of `meeting` at `now`. `finalized` tells if the organizer has
    /// already published the results; it only matters once voting is closed.
    pub fn at(meeting: &Meeting, now: NaiveDateTime, finalized: bool) -> MeetingState {
        let res = if now < meeting.vote_start {
            MeetingState::Draft
        } else if meeting.window_contains(now) {
            MeetingState::Active
        } else if finalized {
            MeetingState::Completed
        } else {
            MeetingState::Closed
        };
        debug!("MeetingState::at: meeting {} at {}: {}", meeting.id, now, res);
        res
    }

    pub fn transition(self, event: LifecycleEvent) -> Result<MeetingState, LifecycleError> {
        match (self, event) {
            (MeetingState::Draft, LifecycleEvent::Open) => Ok(MeetingState::Active),
            (MeetingState::Active, LifecycleEvent::Close) => Ok(MeetingState::Closed),
            (MeetingState::Closed, LifecycleEvent::Finalize) => Ok(MeetingState::Completed),
            (from, event) => InvalidTransitionSnafu { from, event }.fail(),
        }
    }

    pub fn accepts_ballots(self) -> bool {
        self == MeetingState::Active
    }

    /// Roster and agendas can be freely edited only before voting starts.
    pub fn is_editable(self) -> bool {
        self == MeetingState::Draft
    }
}

/// Ballots are only accepted while the meeting is active.
pub fn ensure_accepting(state: MeetingState) -> Result<(), AcceptanceError> {
    ensure!(state.accepts_ballots(), WindowViolationSnafu { state });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use chrono::NaiveDate;

    fn meeting() -> Meeting {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        Meeting {
            id: 1,
            title: "Annual meeting".to_string(),
            meeting_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            vote_start: day.and_hms_opt(9, 0, 0).unwrap(),
            vote_end: day.and_hms_opt(18, 0, 0).unwrap(),
            vote_mode: VoteMode::ElectronicAndPaper,
            member_base_date: day,
            quorum_threshold: Percentage::whole(50).ok(),
            max_revote_count: 1,
            default_pass_threshold: Percentage::whole(50).ok(),
        }
    }

    #[test]
    fn state_follows_the_vote_window() {
        let m = meeting();
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let at = |h: u32| day.and_hms_opt(h, 0, 0).unwrap();
        assert_eq!(MeetingState::at(&m, at(8), false), MeetingState::Draft);
        assert_eq!(MeetingState::at(&m, at(9), false), MeetingState::Active);
        assert_eq!(MeetingState::at(&m, at(17), true), MeetingState::Active);
        assert_eq!(MeetingState::at(&m, at(18), false), MeetingState::Closed);
        assert_eq!(MeetingState::at(&m, at(19), true), MeetingState::Completed);
    }

    #[test]
    fn transitions_cannot_skip() {
        let s = MeetingState::Draft;
        assert_eq!(
            s.transition(LifecycleEvent::Finalize),
            Err(LifecycleError::InvalidTransition {
                from: MeetingState::Draft,
                event: LifecycleEvent::Finalize
            })
        );
        assert!(s.transition(LifecycleEvent::Close).is_err());
        let s = s.transition(LifecycleEvent::Open).unwrap();
        let s = s.transition(LifecycleEvent::Close).unwrap();
        assert!(s.transition(LifecycleEvent::Open).is_err());
        let s = s.transition(LifecycleEvent::Finalize).unwrap();
        assert_eq!(s, MeetingState::Completed);
        assert!(s.transition(LifecycleEvent::Finalize).is_err());
    }

    #[test]
    fn closed_meeting_rejects_ballots() {
        assert!(ensure_accepting(MeetingState::Active).is_ok());
        let err = ensure_accepting(MeetingState::Closed).unwrap_err();
        assert_eq!(err.to_string(), "voting window closed: the meeting is closed");
        assert!(ensure_accepting(MeetingState::Draft).is_err());
    }
}
