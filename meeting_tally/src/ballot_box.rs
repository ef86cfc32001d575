use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;
use crate::errors::*;
use crate::lifecycle::{ensure_accepting, MeetingState};
use crate::roster::{Roster, VoteCountSource};

/// A paper ballot sheet, as registered by the organizer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PaperSheet {
    pub member_id: MemberId,
    pub paper_vote_date: NaiveDate,
    pub attachments: Vec<String>,
    pub registered_at: NaiveDateTime,
    pub choices: Vec<(AgendaId, Choice)>,
}

/// Accepts ballots for one meeting.
///
/// Each call does the whole check and the write at once, so the channel
/// exclusivity and revote rules hold for everything the box contains. The
/// box is not shared by itself: concurrent callers put it behind a lock.
///
/// ```
/// # use chrono::NaiveDate;
/// # use meeting_tally::*;
/// # use meeting_tally::ballot_box::BallotBox;
/// # use meeting_tally::roster::Roster;
/// let day = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
/// let meeting = Meeting {
///     id: 1,
///     title: "Annual meeting".to_string(),
///     meeting_date: day,
///     vote_start: day.and_hms_opt(9, 0, 0).unwrap(),
///     vote_end: day.and_hms_opt(18, 0, 0).unwrap(),
///     vote_mode: VoteMode::ElectronicOnly,
///     member_base_date: day,
///     quorum_threshold: Percentage::whole(50).ok(),
///     max_revote_count: 0,
///     default_pass_threshold: Percentage::whole(50).ok(),
/// };
/// let agenda = Agenda {
///     id: 7,
///     order: 1,
///     title: "Approve the budget".to_string(),
///     kind: AgendaKind::Approval,
///     pass_threshold: None,
/// };
/// let member = VoteMember {
///     id: 1,
///     voter_id: VoterId::MembershipNumber("A-001".to_string()),
///     name: "Kim".to_string(),
///     phone: None,
///     birthdate: None,
///     unit_type: None,
///     intention: VoteIntention::Planned,
///     registered_on: None,
/// };
/// let roster = Roster::new(day, &[member])?;
/// let mut ballot_box = BallotBox::new(&meeting, &[agenda], &roster);
/// let at = day.and_hms_opt(10, 0, 0).unwrap();
/// ballot_box.submit_electronic(1, at, &[(7, Choice::Agree)], MeetingState::Active)?;
/// assert_eq!(ballot_box.vote_count(1), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct BallotBox {
    meeting: Meeting,
    agendas: BTreeMap<AgendaId, Agenda>,
    roster: Roster,
    electronic: Vec<Ballot>,
    // Distinct submission timestamps per member, in acceptance order.
    submissions: BTreeMap<MemberId, Vec<NaiveDateTime>>,
    paper: BTreeMap<MemberId, PaperSheet>,
}

impl BallotBox {
    pub fn new(meeting: &Meeting, agendas: &[Agenda], roster: &Roster) -> BallotBox {
        BallotBox {
            meeting: meeting.clone(),
            agendas: agendas.iter().map(|a| (a.id, a.clone())).collect(),
            roster: roster.clone(),
            electronic: Vec::new(),
            submissions: BTreeMap::new(),
            paper: BTreeMap::new(),
        }
    }

    /// Accepts one electronic submission: a choice for one or more agendas.
    pub fn submit_electronic(
        &mut self,
        member_id: MemberId,
        at: NaiveDateTime,
        choices: &[(AgendaId, Choice)],
        state: MeetingState,
    ) -> Result<(), AcceptanceError> {
        ensure_accepting(state)?;
        ensure!(
            self.meeting.window_contains(at),
            WindowViolationSnafu {
                state: MeetingState::at(&self.meeting, at, false)
            }
        );
        self.check_choices(member_id, choices)?;
        ensure!(
            !self.paper.contains_key(&member_id),
            ChannelConflictSnafu {
                member_id,
                existing: Channel::Paper
            }
        );
        let previous = self.submissions.get(&member_id);
        let used = previous.map(|p| p.len()).unwrap_or(0);
        let max_revote_count = self.meeting.max_revote_count;
        ensure!(
            used <= max_revote_count as usize,
            RevoteLimitReachedSnafu {
                member_id,
                max_revote_count
            }
        );
        if let Some(last) = previous.and_then(|p| p.last()) {
            ensure!(
                at > *last,
                StaleSubmissionSnafu {
                    member_id,
                    submitted_at: at
                }
            );
        }

        for (agenda_id, choice) in choices.iter() {
            self.electronic.push(Ballot {
                member_id,
                agenda_id: *agenda_id,
                channel: Channel::Electronic,
                submitted_at: at,
                choice: *choice,
            });
        }
        self.submissions.entry(member_id).or_default().push(at);
        debug!(
            "submit_electronic: member {} at {}: {} choice(s), submission {}/{}",
            member_id,
            at,
            choices.len(),
            used + 1,
            max_revote_count + 1
        );
        Ok(())
    }

    /// Registers the paper sheet of a member. A later sheet replaces the
    /// earlier one entirely. Like an electronic submission, the registration
    /// time must fall inside the vote window.
    pub fn register_paper(
        &mut self,
        sheet: PaperSheet,
        state: MeetingState,
    ) -> Result<(), AcceptanceError> {
        ensure_accepting(state)?;
        ensure!(
            self.meeting.window_contains(sheet.registered_at),
            WindowViolationSnafu {
                state: MeetingState::at(&self.meeting, sheet.registered_at, false)
            }
        );
        ensure!(self.meeting.vote_mode.allows_paper(), PaperNotAllowedSnafu);
        let member_id = sheet.member_id;
        self.check_choices(member_id, &sheet.choices)?;
        ensure!(
            !self.submissions.contains_key(&member_id),
            ChannelConflictSnafu {
                member_id,
                existing: Channel::Electronic
            }
        );
        if let Some(previous) = self.paper.get(&member_id) {
            ensure!(
                sheet.registered_at > previous.registered_at,
                StaleSubmissionSnafu {
                    member_id,
                    submitted_at: sheet.registered_at
                }
            );
            info!(
                "register_paper: member {}: replacing the sheet registered at {}",
                member_id, previous.registered_at
            );
        }
        debug!(
            "register_paper: member {} at {}: {} choice(s), {} attachment(s)",
            member_id,
            sheet.registered_at,
            sheet.choices.len(),
            sheet.attachments.len()
        );
        self.paper.insert(member_id, sheet);
        Ok(())
    }

    /// The number of accepted submissions of a member, in both channels.
    pub fn vote_count(&self, member_id: MemberId) -> u32 {
        let electronic = self
            .submissions
            .get(&member_id)
            .map(|s| s.len() as u32)
            .unwrap_or(0);
        let paper = if self.paper.contains_key(&member_id) { 1 } else { 0 };
        electronic + paper
    }

    /// What the tally engine reads.
    pub fn snapshot(&self) -> BallotSnapshot {
        let mut ballots = self.electronic.clone();
        let mut paper_records = Vec::new();
        for sheet in self.paper.values() {
            for (agenda_id, choice) in sheet.choices.iter() {
                ballots.push(Ballot {
                    member_id: sheet.member_id,
                    agenda_id: *agenda_id,
                    channel: Channel::Paper,
                    submitted_at: sheet.registered_at,
                    choice: *choice,
                });
            }
            paper_records.push(PaperRecord {
                member_id: sheet.member_id,
                paper_vote_date: sheet.paper_vote_date,
                attachments: sheet.attachments.clone(),
                registered_at: sheet.registered_at,
            });
        }
        BallotSnapshot {
            ballots,
            paper_records,
        }
    }

    fn check_choices(
        &self,
        member_id: MemberId,
        choices: &[(AgendaId, Choice)],
    ) -> Result<(), AcceptanceError> {
        ensure!(
            self.roster.is_eligible(member_id),
            UnknownMemberSnafu { member_id }
        );
        ensure!(!choices.is_empty(), EmptySubmissionSnafu { member_id });
        let mut seen: HashSet<AgendaId> = HashSet::new();
        for (agenda_id, choice) in choices.iter() {
            let agenda = self
                .agendas
                .get(agenda_id)
                .context(UnknownAgendaSnafu {
                    agenda_id: *agenda_id,
                })?;
            ensure!(
                seen.insert(*agenda_id),
                RepeatedAgendaSnafu {
                    agenda_id: *agenda_id
                }
            );
            ensure!(
                agenda.accepts(choice),
                InvalidChoiceSnafu {
                    agenda_id: *agenda_id,
                    choice: *choice
                }
            );
        }
        Ok(())
    }
}

impl VoteCountSource for BallotBox {
    fn vote_count(&self, member_id: MemberId) -> u32 {
        BallotBox::vote_count(self, member_id)
    }
}
