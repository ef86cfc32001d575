// ********* Input data structures ***********

use std::collections::HashSet;
use std::fmt::Display;
use std::ops::{Add, AddAssign};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::errors::*;

pub type MeetingId = u64;
pub type AgendaId = u64;
pub type MemberId = u64;
pub type OptionId = u32;

/// A percentage between 0 and 100, with two decimal places.
///
/// It is stored in hundredths of a percent so that checking a ratio against a
/// threshold is an exact integer comparison (a 2/3 majority is `66.67`).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Percentage(u32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const HUNDRED: Percentage = Percentage(10_000);

    pub fn from_hundredths(hundredths: u32) -> Result<Percentage, ConfigurationError> {
        ensure!(
            hundredths <= Percentage::HUNDRED.0,
            PercentageOutOfRangeSnafu {
                value: format!("{}.{:02}", hundredths / 100, hundredths % 100)
            }
        );
        Ok(Percentage(hundredths))
    }

    pub fn whole(percent: u32) -> Result<Percentage, ConfigurationError> {
        ensure!(
            percent <= 100,
            PercentageOutOfRangeSnafu {
                value: percent.to_string()
            }
        );
        Ok(Percentage(percent * 100))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    /// True when `numerator / denominator` reaches this percentage (`>=`).
    /// An empty denominator never reaches anything.
    pub fn is_reached_by(self, numerator: u64, denominator: u64) -> bool {
        if denominator == 0 {
            return false;
        }
        (numerator as u128) * 10_000 >= (self.0 as u128) * (denominator as u128)
    }
}

impl TryFrom<f64> for Percentage {
    type Error = ConfigurationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        ensure!(
            value.is_finite() && (0.0..=100.0).contains(&value),
            PercentageOutOfRangeSnafu {
                value: value.to_string()
            }
        );
        Ok(Percentage((value * 100.0).round() as u32))
    }
}

impl From<Percentage> for f64 {
    fn from(p: Percentage) -> f64 {
        p.0 as f64 / 100.0
    }
}

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}%", self.0 / 100)
        } else {
            write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteMode {
    ElectronicOnly,
    ElectronicAndPaper,
}

impl VoteMode {
    pub fn allows_paper(self) -> bool {
        self == VoteMode::ElectronicAndPaper
    }
}

/// A general meeting and its voting rules.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: MeetingId,
    pub title: String,
    pub meeting_date: NaiveDate,
    pub vote_start: NaiveDateTime,
    pub vote_end: NaiveDateTime,
    pub vote_mode: VoteMode,
    /// Members registered after this date are not part of the quorum roster.
    pub member_base_date: NaiveDate,
    pub quorum_threshold: Option<Percentage>,
    /// 0 means a single electronic submission per member.
    #[serde(default)]
    pub max_revote_count: u32,
    pub default_pass_threshold: Option<Percentage>,
}

impl Meeting {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure!(
            self.vote_start < self.vote_end,
            InvalidVoteWindowSnafu {
                start: self.vote_start,
                end: self.vote_end,
            }
        );
        Ok(())
    }

    /// The vote window is half-open: it closes exactly at `vote_end`.
    pub fn window_contains(&self, at: NaiveDateTime) -> bool {
        self.vote_start <= at && at < self.vote_end
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct SelectionOption {
    pub id: OptionId,
    pub label: String,
}

/// How an agenda is voted on.
///
/// Approval agendas have the fixed choices agree, disagree and abstain.
/// Selection agendas have an ordered list of options declared by the organizer,
/// plus an implicit abstain.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum AgendaKind {
    Approval,
    Selection(Vec<SelectionOption>),
}

impl AgendaKind {
    /// Reads the legacy `"A/B/C"` form of a selection option list.
    /// Options get 1-based ids in the order they appear.
    pub fn from_delimited(input: &str) -> Result<AgendaKind, ConfigurationError> {
        let labels: Vec<&str> = input.split('/').map(|s| s.trim()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        for label in labels.iter().copied() {
            ensure!(
                !label.is_empty() && seen.insert(label),
                InvalidOptionListSnafu { input }
            );
        }
        Ok(AgendaKind::Selection(
            labels
                .iter()
                .enumerate()
                .map(|(idx, label)| SelectionOption {
                    id: (idx + 1) as OptionId,
                    label: label.to_string(),
                })
                .collect(),
        ))
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agenda {
    pub id: AgendaId,
    /// 1-based display order.
    pub order: u32,
    pub title: String,
    pub kind: AgendaKind,
    /// Overrides the default threshold of the meeting.
    pub pass_threshold: Option<Percentage>,
}

impl Agenda {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let AgendaKind::Selection(options) = &self.kind {
            ensure!(
                !options.is_empty(),
                NoOptionsSnafu {
                    agenda_id: self.id
                }
            );
            let mut ids: HashSet<OptionId> = HashSet::new();
            let mut labels: HashSet<&str> = HashSet::new();
            for o in options.iter() {
                ensure!(
                    ids.insert(o.id) && labels.insert(o.label.as_str()),
                    DuplicateOptionSnafu {
                        agenda_id: self.id,
                        label: o.label.clone(),
                    }
                );
            }
        }
        Ok(())
    }

    pub fn accepts(&self, choice: &Choice) -> bool {
        match (&self.kind, choice) {
            (_, Choice::Abstain) => true,
            (AgendaKind::Approval, Choice::Agree | Choice::Disagree) => true,
            (AgendaKind::Selection(options), Choice::Option(oid)) => {
                options.iter().any(|o| o.id == *oid)
            }
            _ => false,
        }
    }

    pub fn option_by_label(&self, label: &str) -> Option<&SelectionOption> {
        match &self.kind {
            AgendaKind::Selection(options) => options.iter().find(|o| o.label == label),
            AgendaKind::Approval => None,
        }
    }
}

/// The identifier under which a member votes.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterId {
    MembershipNumber(String),
    Unit { dong: String, ho: String },
}

impl Display for VoterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoterId::MembershipNumber(n) => write!(f, "membership {}", n),
            VoterId::Unit { dong, ho } => write!(f, "unit {}-{}", dong, ho),
        }
    }
}

/// What a member declared before the vote. Advisory only, never a ballot.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteIntention {
    Planned,
    #[default]
    Undecided,
    Impossible,
    Other,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteMember {
    pub id: MemberId,
    pub voter_id: VoterId,
    pub name: String,
    pub phone: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub unit_type: Option<String>,
    #[serde(default)]
    pub intention: VoteIntention,
    /// When the member joined the roster. Unknown means since the beginning.
    pub registered_on: Option<NaiveDate>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Electronic,
    Paper,
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Electronic => write!(f, "electronic"),
            Channel::Paper => write!(f, "paper"),
        }
    }
}

/// The content of one ballot for one agenda.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    Agree,
    Disagree,
    Abstain,
    /// An option of a selection agenda.
    Option(OptionId),
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Agree => write!(f, "agree"),
            Choice::Disagree => write!(f, "disagree"),
            Choice::Abstain => write!(f, "abstain"),
            Choice::Option(oid) => write!(f, "option #{}", oid),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub member_id: MemberId,
    pub agenda_id: AgendaId,
    pub channel: Channel,
    pub submitted_at: NaiveDateTime,
    pub choice: Choice,
}

/// The paper-vote registration of a member. There is at most one per member
/// and meeting: registering again replaces it.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperRecord {
    pub member_id: MemberId,
    pub paper_vote_date: NaiveDate,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub registered_at: NaiveDateTime,
}

/// All the ballots of a meeting at one point in time.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotSnapshot {
    pub ballots: Vec<Ballot>,
    #[serde(default)]
    pub paper_records: Vec<PaperRecord>,
}

impl BallotSnapshot {
    /// Keeps only what was submitted or registered at or before `at`.
    ///
    /// The engine never freezes a meeting by itself: callers who want the
    /// official record as of a date tabulate the cut-off snapshot.
    pub fn cut_off(&self, at: NaiveDateTime) -> BallotSnapshot {
        BallotSnapshot {
            ballots: self
                .ballots
                .iter()
                .filter(|b| b.submitted_at <= at)
                .cloned()
                .collect(),
            paper_records: self
                .paper_records
                .iter()
                .filter(|r| r.registered_at <= at)
                .cloned()
                .collect(),
        }
    }
}

/// Everything needed to tabulate one meeting.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub meeting: Meeting,
    pub agendas: Vec<Agenda>,
    pub members: Vec<VoteMember>,
    pub ballots: BallotSnapshot,
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct ApprovalCounts {
    pub agree: u64,
    pub disagree: u64,
    pub abstain: u64,
}

impl ApprovalCounts {
    pub const EMPTY: ApprovalCounts = ApprovalCounts {
        agree: 0,
        disagree: 0,
        abstain: 0,
    };

    /// Ballots that take a side. Abstentions are left out.
    pub fn decisive(&self) -> u64 {
        self.agree + self.disagree
    }

    pub fn total(&self) -> u64 {
        self.decisive() + self.abstain
    }

    fn record(&mut self, choice: Choice) -> bool {
        match choice {
            Choice::Agree => self.agree += 1,
            Choice::Disagree => self.disagree += 1,
            Choice::Abstain => self.abstain += 1,
            Choice::Option(_) => return false,
        }
        true
    }
}

impl AddAssign for ApprovalCounts {
    fn add_assign(&mut self, rhs: ApprovalCounts) {
        self.agree += rhs.agree;
        self.disagree += rhs.disagree;
        self.abstain += rhs.abstain;
    }
}

impl Add for ApprovalCounts {
    type Output = ApprovalCounts;
    fn add(self: ApprovalCounts, rhs: ApprovalCounts) -> ApprovalCounts {
        let mut res = self;
        res += rhs;
        res
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCount {
    pub option_id: OptionId,
    pub label: String,
    pub votes: u64,
}

/// Counts for a selection agenda, one entry per option in declaration order.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct SelectionCounts {
    pub options: Vec<OptionCount>,
    pub abstain: u64,
}

impl SelectionCounts {
    pub fn empty(options: &[SelectionOption]) -> SelectionCounts {
        SelectionCounts {
            options: options
                .iter()
                .map(|o| OptionCount {
                    option_id: o.id,
                    label: o.label.clone(),
                    votes: 0,
                })
                .collect(),
            abstain: 0,
        }
    }

    pub fn decisive(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }

    pub fn total(&self) -> u64 {
        self.decisive() + self.abstain
    }

    fn record(&mut self, choice: Choice) -> bool {
        match choice {
            Choice::Abstain => {
                self.abstain += 1;
                true
            }
            Choice::Option(oid) => {
                if let Some(oc) = self.options.iter_mut().find(|oc| oc.option_id == oid) {
                    oc.votes += 1;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Adds the counts of `other` option by option.
    fn combined_with(&self, other: &SelectionCounts) -> SelectionCounts {
        let mut res = self.clone();
        for oc in res.options.iter_mut() {
            oc.votes += other
                .options
                .iter()
                .filter(|o| o.option_id == oc.option_id)
                .map(|o| o.votes)
                .sum::<u64>();
        }
        res.abstain += other.abstain;
        res
    }
}

/// The counts of one agenda, kept apart for each channel.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelCounts {
    Approval {
        electronic: ApprovalCounts,
        paper: ApprovalCounts,
    },
    Selection {
        electronic: SelectionCounts,
        paper: SelectionCounts,
    },
}

impl ChannelCounts {
    pub fn empty(kind: &AgendaKind) -> ChannelCounts {
        match kind {
            AgendaKind::Approval => ChannelCounts::Approval {
                electronic: ApprovalCounts::EMPTY,
                paper: ApprovalCounts::EMPTY,
            },
            AgendaKind::Selection(options) => ChannelCounts::Selection {
                electronic: SelectionCounts::empty(options),
                paper: SelectionCounts::empty(options),
            },
        }
    }

    /// Records one live ballot. Returns false if the choice does not fit the
    /// kind of agenda, in which case nothing is counted.
    pub fn record(&mut self, channel: Channel, choice: Choice) -> bool {
        match (self, channel) {
            (ChannelCounts::Approval { electronic, .. }, Channel::Electronic) => {
                electronic.record(choice)
            }
            (ChannelCounts::Approval { paper, .. }, Channel::Paper) => paper.record(choice),
            (ChannelCounts::Selection { electronic, .. }, Channel::Electronic) => {
                electronic.record(choice)
            }
            (ChannelCounts::Selection { paper, .. }, Channel::Paper) => paper.record(choice),
        }
    }

    pub fn combined(&self) -> TallyCounts {
        match self {
            ChannelCounts::Approval { electronic, paper } => {
                TallyCounts::Approval(*electronic + *paper)
            }
            ChannelCounts::Selection { electronic, paper } => {
                TallyCounts::Selection(electronic.combined_with(paper))
            }
        }
    }
}

/// The counts of one agenda with both channels added together.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TallyCounts {
    Approval(ApprovalCounts),
    Selection(SelectionCounts),
}

impl TallyCounts {
    /// Every live ballot, abstentions included.
    pub fn attendance(&self) -> u64 {
        match self {
            TallyCounts::Approval(c) => c.total(),
            TallyCounts::Selection(c) => c.total(),
        }
    }

    pub fn decisive(&self) -> u64 {
        match self {
            TallyCounts::Approval(c) => c.decisive(),
            TallyCounts::Selection(c) => c.decisive(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaTally {
    pub agenda_id: AgendaId,
    pub order: u32,
    pub counts: ChannelCounts,
    /// Members whose ballots could not be counted for this agenda.
    pub excluded_members: Vec<MemberId>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Rejected,
    /// No ballot took a side, or the selection ended in a tie.
    Undetermined,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaResult {
    pub agenda_id: AgendaId,
    pub order: u32,
    pub title: String,
    pub by_channel: ChannelCounts,
    pub combined: TallyCounts,
    pub attendance: u64,
    pub threshold: Option<Percentage>,
    /// Share of the agree votes, or of the leading option, among the ballots
    /// that take a side. In percent, for display only.
    pub ratio: Option<f64>,
    pub winner: Option<SelectionOption>,
    pub verdict: Verdict,
    pub excluded_members: Vec<MemberId>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingQuorumStatus {
    pub as_of: NaiveDate,
    pub attendee_count: u64,
    pub roster_size: u64,
    pub percentage: f64,
    pub threshold: Option<Percentage>,
    pub quorum_met: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityKind {
    /// Live ballots in both channels.
    ChannelConflict,
    /// More electronic submissions than the revote policy allows. The excess
    /// ones were dropped.
    RevoteLimitExceeded,
    /// Two different ballots with the same timestamp for the same agenda.
    DuplicateSubmission,
    OutsideVoteWindow,
    PaperNotAllowed,
    UnknownMember,
    /// On the roster, but registered after the member base date.
    IneligibleMember,
    UnknownAgenda,
    InvalidChoice,
}

/// A data-integrity problem found while tallying. It concerns one member and
/// possibly one agenda; everything else is tallied normally.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub member_id: MemberId,
    pub agenda_id: Option<AgendaId>,
    pub kind: IntegrityKind,
}

impl Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.agenda_id {
            Some(aid) => write!(f, "member {} agenda {}: {:?}", self.member_id, aid, self.kind),
            None => write!(f, "member {}: {:?}", self.member_id, self.kind),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct IntentionSummary {
    pub planned: u64,
    pub undecided: u64,
    pub impossible: u64,
    pub other: u64,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingReport {
    pub meeting_id: MeetingId,
    pub title: String,
    pub quorum: MeetingQuorumStatus,
    pub agendas: Vec<AgendaResult>,
    pub electronic_voters: u64,
    pub paper_voters: u64,
    pub intentions: IntentionSummary,
    pub issues: Vec<IntegrityIssue>,
    pub configuration_errors: Vec<ConfigurationError>,
}
