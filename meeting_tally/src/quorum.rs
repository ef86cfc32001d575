use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::info;
use snafu::prelude::*;

use crate::config::*;
use crate::errors::*;
use crate::roster::Roster;

/// The date a quorum status refers to: today for a meeting still to come,
/// the meeting date once it has passed.
pub fn reference_date(today: NaiveDate, meeting_date: NaiveDate) -> NaiveDate {
    today.min(meeting_date)
}

/// Attendees who are part of the quorum roster. Voting on a single agenda
/// is enough to be present, and a member is counted once.
pub fn count_attendees(roster: &Roster, attendees: &BTreeSet<MemberId>) -> u64 {
    attendees
        .iter()
        .filter(|member_id| roster.is_eligible(**member_id))
        .count() as u64
}

impl MeetingQuorumStatus {
    /// The status reported when the quorum cannot be computed.
    pub fn not_met(
        as_of: NaiveDate,
        attendee_count: u64,
        roster_size: u64,
        threshold: Option<Percentage>,
    ) -> MeetingQuorumStatus {
        MeetingQuorumStatus {
            as_of,
            attendee_count,
            roster_size,
            percentage: 0.0,
            threshold,
            quorum_met: false,
        }
    }
}

/// Computes the quorum of a meeting.
///
/// There is no caching and no freezing: the status always reflects the
/// attendance it is given.
pub fn compute_quorum(
    meeting: &Meeting,
    roster_size: u64,
    attendee_count: u64,
    today: NaiveDate,
) -> Result<MeetingQuorumStatus, ConfigurationError> {
    ensure!(
        roster_size > 0,
        EmptyRosterSnafu {
            base_date: meeting.member_base_date
        }
    );
    let threshold = meeting
        .quorum_threshold
        .context(MissingQuorumThresholdSnafu)?;
    let as_of = reference_date(today, meeting.meeting_date);
    let percentage = attendee_count as f64 * 100.0 / roster_size as f64;
    let quorum_met = threshold.is_reached_by(attendee_count, roster_size);
    info!(
        "compute_quorum: meeting {} as of {}: {}/{} = {:.2}% (threshold {}): met: {}",
        meeting.id, as_of, attendee_count, roster_size, percentage, threshold, quorum_met
    );
    Ok(MeetingQuorumStatus {
        as_of,
        attendee_count,
        roster_size,
        percentage,
        threshold: Some(threshold),
        quorum_met,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn meeting(quorum: Option<u32>) -> Meeting {
        Meeting {
            id: 3,
            title: "Extraordinary meeting".to_string(),
            meeting_date: date(9, 30),
            vote_start: date(9, 1).and_hms_opt(0, 0, 0).unwrap(),
            vote_end: date(9, 29).and_hms_opt(0, 0, 0).unwrap(),
            vote_mode: VoteMode::ElectronicAndPaper,
            member_base_date: date(8, 31),
            quorum_threshold: quorum.map(|q| Percentage::whole(q).unwrap()),
            max_revote_count: 0,
            default_pass_threshold: None,
        }
    }

    #[test]
    fn quorum_reached() {
        let status = compute_quorum(&meeting(Some(50)), 100, 55, date(9, 10)).unwrap();
        assert!(status.quorum_met);
        assert_eq!(status.percentage, 55.0);
        assert_eq!(status.as_of, date(9, 10));
    }

    #[test]
    fn quorum_boundary_and_miss() {
        assert!(compute_quorum(&meeting(Some(50)), 100, 50, date(9, 10)).unwrap().quorum_met);
        let status = compute_quorum(&meeting(Some(50)), 100, 49, date(9, 10)).unwrap();
        assert!(!status.quorum_met);
        assert_eq!(status.percentage, 49.0);
    }

    #[test]
    fn past_meeting_reports_its_date() {
        let status = compute_quorum(&meeting(Some(50)), 10, 6, date(12, 1)).unwrap();
        assert_eq!(status.as_of, date(9, 30));
        assert_eq!(reference_date(date(9, 1), date(9, 30)), date(9, 1));
    }

    #[test]
    fn empty_roster_is_a_configuration_error() {
        assert_eq!(
            compute_quorum(&meeting(Some(50)), 0, 0, date(9, 10)).unwrap_err(),
            ConfigurationError::EmptyRoster {
                base_date: date(8, 31)
            }
        );
        assert_eq!(
            compute_quorum(&meeting(None), 10, 3, date(9, 10)).unwrap_err(),
            ConfigurationError::MissingQuorumThreshold {}
        );
        let fallback = MeetingQuorumStatus::not_met(date(9, 10), 0, 0, None);
        assert!(!fallback.quorum_met);
    }

    #[test]
    fn attendees_count_once_and_only_from_the_roster() {
        let members: Vec<VoteMember> = (1..=4)
            .map(|id| VoteMember {
                id,
                voter_id: VoterId::MembershipNumber(id.to_string()),
                name: format!("member {}", id),
                phone: None,
                birthdate: None,
                unit_type: None,
                intention: VoteIntention::Other,
                registered_on: if id == 4 { Some(date(9, 2)) } else { None },
            })
            .collect();
        let roster = Roster::new(date(8, 31), &members).unwrap();
        let attendees: BTreeSet<MemberId> = [1, 2, 4, 7].into_iter().collect();
        assert_eq!(count_attendees(&roster, &attendees), 2);
    }
}
