// ********* Error types ***********

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use snafu::Snafu;

use crate::config::{AgendaId, Channel, Choice, MemberId};
use crate::lifecycle::{LifecycleEvent, MeetingState};

/// Problems with how a meeting or one of its agendas is set up.
///
/// These are fatal for the computation they affect (the quorum of the meeting,
/// or the result of one agenda) and are reported to the organizer instead of
/// being replaced with defaults. They never stop the other agendas from being
/// computed.
#[derive(Eq, PartialEq, Debug, Clone, Snafu, Serialize)]
#[snafu(visibility(pub(crate)))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationError {
    #[snafu(display("the roster has no eligible member as of {base_date}"))]
    EmptyRoster { base_date: NaiveDate },

    #[snafu(display("no quorum percentage is configured for the meeting"))]
    MissingQuorumThreshold {},

    #[snafu(display("agenda {agenda_id}: no pass threshold on the agenda or the meeting"))]
    MissingPassThreshold { agenda_id: AgendaId },

    #[snafu(display("agenda {agenda_id}: a selection agenda needs at least one option"))]
    NoOptions { agenda_id: AgendaId },

    #[snafu(display("agenda {agenda_id}: option {label:?} is declared more than once"))]
    DuplicateOption { agenda_id: AgendaId, label: String },

    #[snafu(display("cannot read an option list from {input:?}"))]
    InvalidOptionList { input: String },

    #[snafu(display("agenda {agenda_id} is declared more than once"))]
    DuplicateAgenda { agenda_id: AgendaId },

    #[snafu(display("two agendas share the display order {order}"))]
    DuplicateAgendaOrder { order: u32 },

    #[snafu(display("percentage {value} is outside 0-100"))]
    PercentageOutOfRange { value: String },

    #[snafu(display("the vote window ends ({end}) before it starts ({start})"))]
    InvalidVoteWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[snafu(display("member {member_id} is declared more than once"))]
    DuplicateMember { member_id: MemberId },

    #[snafu(display("member {member_id} reuses voter {voter} of an earlier member"))]
    DuplicateVoter { member_id: MemberId, voter: String },
}

/// Rejections at the ballot acceptance boundary.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AcceptanceError {
    #[snafu(display("voting window closed: the meeting is {state}"))]
    WindowViolation { state: MeetingState },

    #[snafu(display("member {member_id} already voted through the {existing} channel"))]
    ChannelConflict {
        member_id: MemberId,
        existing: Channel,
    },

    #[snafu(display(
        "member {member_id} has used all the allowed submissions ({max_revote_count} revotes)"
    ))]
    RevoteLimitReached {
        member_id: MemberId,
        max_revote_count: u32,
    },

    #[snafu(display("member {member_id} submitted at {submitted_at}, before their last submission"))]
    StaleSubmission {
        member_id: MemberId,
        submitted_at: NaiveDateTime,
    },

    #[snafu(display("paper ballots are not accepted for this meeting"))]
    PaperNotAllowed {},

    #[snafu(display("member {member_id} is not on the roster"))]
    UnknownMember { member_id: MemberId },

    #[snafu(display("agenda {agenda_id} does not belong to the meeting"))]
    UnknownAgenda { agenda_id: AgendaId },

    #[snafu(display("agenda {agenda_id} does not accept the choice {choice}"))]
    InvalidChoice { agenda_id: AgendaId, choice: Choice },

    #[snafu(display("agenda {agenda_id} appears twice in the same submission"))]
    RepeatedAgenda { agenda_id: AgendaId },

    #[snafu(display("member {member_id} submitted no choice"))]
    EmptySubmission { member_id: MemberId },
}

#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LifecycleError {
    #[snafu(display("a {from} meeting cannot go through {event}"))]
    InvalidTransition {
        from: MeetingState,
        event: LifecycleEvent,
    },
}

#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RosterError {
    #[snafu(display("member {member_id} has voted {vote_count} time(s) and is locked"))]
    MemberLocked { member_id: MemberId, vote_count: u32 },

    #[snafu(display("member {member_id} is not on the roster"))]
    MissingMember { member_id: MemberId },

    #[snafu(display("invalid roster entry: {source}"))]
    InvalidEntry { source: ConfigurationError },
}
