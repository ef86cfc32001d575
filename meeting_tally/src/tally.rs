use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::config::*;
use crate::roster::Roster;

// The ballot of a member that counts for an agenda, in one channel.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum LiveChoice {
    Choice(Choice),
    // Several different ballots share the latest timestamp.
    Ambiguous,
}

type LiveBallots = BTreeMap<AgendaId, LiveChoice>;

/// What the tally engine produces for one meeting.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyOutcome {
    /// One tally per agenda, in display order.
    pub tallies: Vec<AgendaTally>,
    /// Sorted and without duplicates.
    pub issues: Vec<IntegrityIssue>,
    /// Members with at least one counted ballot, plus the members left out
    /// for voting in both channels.
    pub attendees: BTreeSet<MemberId>,
    pub electronic_voters: BTreeSet<MemberId>,
    pub paper_voters: BTreeSet<MemberId>,
}

/// Reduces the ballots of a meeting to one tally per agenda and channel.
///
/// Only the live ballot of each member counts for an agenda:
/// - electronic: the member's distinct submission timestamps are ordered and
///   only the first `max_revote_count + 1` submissions are kept. Among them,
///   the latest ballot for the agenda is live.
/// - paper: the latest paper submission of the member replaces every earlier
///   one, for all agendas.
///
/// A member with live ballots in both channels is flagged and left out of
/// every agenda. Problems with one member never prevent the others from being
/// counted. The function is pure: the same input always gives the same output.
pub fn tally_ballots(
    meeting: &Meeting,
    agendas: &[Agenda],
    roster: &Roster,
    snapshot: &BallotSnapshot,
) -> TallyOutcome {
    info!(
        "tally_ballots: meeting {}: {} ballots, {} paper records, {} agendas, {} members",
        meeting.id,
        snapshot.ballots.len(),
        snapshot.paper_records.len(),
        agendas.len(),
        roster.members().len()
    );
    let agendas_by_id: HashMap<AgendaId, &Agenda> = agendas.iter().map(|a| (a.id, a)).collect();
    let mut issues: BTreeSet<IntegrityIssue> = BTreeSet::new();

    // Sort the ballots by member and channel, dropping the ones that cannot be
    // attributed to a valid member, agenda and channel.
    let mut electronic: BTreeMap<MemberId, Vec<&Ballot>> = BTreeMap::new();
    let mut paper: BTreeMap<MemberId, Vec<&Ballot>> = BTreeMap::new();
    for b in snapshot.ballots.iter() {
        if let Some(kind) = check_member(roster, b.member_id) {
            issues.insert(issue(b.member_id, None, kind));
            continue;
        }
        if !agendas_by_id.contains_key(&b.agenda_id) {
            issues.insert(issue(
                b.member_id,
                Some(b.agenda_id),
                IntegrityKind::UnknownAgenda,
            ));
            continue;
        }
        match b.channel {
            Channel::Electronic if !meeting.window_contains(b.submitted_at) => {
                issues.insert(issue(
                    b.member_id,
                    Some(b.agenda_id),
                    IntegrityKind::OutsideVoteWindow,
                ));
            }
            Channel::Electronic => electronic.entry(b.member_id).or_default().push(b),
            Channel::Paper if !meeting.vote_mode.allows_paper() => {
                issues.insert(issue(b.member_id, None, IntegrityKind::PaperNotAllowed));
            }
            Channel::Paper => paper.entry(b.member_id).or_default().push(b),
        }
    }

    let mut paper_registered: BTreeSet<MemberId> = BTreeSet::new();
    for r in snapshot.paper_records.iter() {
        if let Some(kind) = check_member(roster, r.member_id) {
            issues.insert(issue(r.member_id, None, kind));
        } else if !meeting.vote_mode.allows_paper() {
            issues.insert(issue(r.member_id, None, IntegrityKind::PaperNotAllowed));
        } else {
            paper_registered.insert(r.member_id);
        }
    }

    let mut live_electronic: BTreeMap<MemberId, LiveBallots> = BTreeMap::new();
    for (member_id, ballots) in electronic.iter() {
        let (allowed, exceeded) = allowed_submissions(ballots, meeting.max_revote_count);
        if exceeded {
            warn!(
                "tally_ballots: member {} went over {} revote(s), dropping the later submissions",
                member_id, meeting.max_revote_count
            );
            issues.insert(issue(*member_id, None, IntegrityKind::RevoteLimitExceeded));
        }
        let live = latest_per_agenda(&allowed, *member_id, &mut issues);
        live_electronic.insert(*member_id, live);
    }

    let mut live_paper: BTreeMap<MemberId, LiveBallots> = BTreeMap::new();
    for (member_id, ballots) in paper.iter() {
        let latest = ballots.iter().map(|b| b.submitted_at).max();
        let sheet: Vec<&Ballot> = ballots
            .iter()
            .filter(|b| Some(b.submitted_at) == latest)
            .cloned()
            .collect();
        let live = latest_per_agenda(&sheet, *member_id, &mut issues);
        live_paper.insert(*member_id, live);
    }

    // Channel exclusivity.
    let mut conflicted: BTreeSet<MemberId> = BTreeSet::new();
    for member_id in live_electronic.keys() {
        if live_paper.contains_key(member_id) || paper_registered.contains(member_id) {
            warn!(
                "tally_ballots: member {} has live ballots in both channels",
                member_id
            );
            issues.insert(issue(*member_id, None, IntegrityKind::ChannelConflict));
            conflicted.insert(*member_id);
        }
    }

    let mut sorted_agendas: Vec<&Agenda> = agendas.iter().collect();
    sorted_agendas.sort_by_key(|a| (a.order, a.id));

    let mut tallies: Vec<AgendaTally> = Vec::new();
    let mut electronic_voters: BTreeSet<MemberId> = BTreeSet::new();
    let mut paper_voters: BTreeSet<MemberId> = BTreeSet::new();
    for agenda in sorted_agendas {
        let mut counts = ChannelCounts::empty(&agenda.kind);
        let mut excluded: BTreeSet<MemberId> = BTreeSet::new();
        for (channel, live_ballots) in [
            (Channel::Electronic, &live_electronic),
            (Channel::Paper, &live_paper),
        ] {
            for (member_id, live) in live_ballots.iter() {
                let choice = match live.get(&agenda.id) {
                    None => continue,
                    Some(_) if conflicted.contains(member_id) => {
                        excluded.insert(*member_id);
                        continue;
                    }
                    Some(LiveChoice::Ambiguous) => {
                        excluded.insert(*member_id);
                        continue;
                    }
                    Some(LiveChoice::Choice(c)) => *c,
                };
                if counts.record(channel, choice) {
                    match channel {
                        Channel::Electronic => electronic_voters.insert(*member_id),
                        Channel::Paper => paper_voters.insert(*member_id),
                    };
                } else {
                    issues.insert(issue(
                        *member_id,
                        Some(agenda.id),
                        IntegrityKind::InvalidChoice,
                    ));
                    excluded.insert(*member_id);
                }
            }
        }
        debug!(
            "tally_ballots: agenda {} (#{}) counts: {:?}, excluded: {:?}",
            agenda.id, agenda.order, counts, excluded
        );
        tallies.push(AgendaTally {
            agenda_id: agenda.id,
            order: agenda.order,
            counts,
            excluded_members: excluded.into_iter().collect(),
        });
    }

    let attendees: BTreeSet<MemberId> = electronic_voters
        .iter()
        .chain(paper_voters.iter())
        .chain(conflicted.iter())
        .cloned()
        .collect();

    for i in issues.iter() {
        warn!("tally_ballots: integrity issue: {}", i);
    }
    info!(
        "tally_ballots: {} attendees ({} electronic, {} paper), {} integrity issues",
        attendees.len(),
        electronic_voters.len(),
        paper_voters.len(),
        issues.len()
    );

    TallyOutcome {
        tallies,
        issues: issues.into_iter().collect(),
        attendees,
        electronic_voters,
        paper_voters,
    }
}

fn issue(member_id: MemberId, agenda_id: Option<AgendaId>, kind: IntegrityKind) -> IntegrityIssue {
    IntegrityIssue {
        member_id,
        agenda_id,
        kind,
    }
}

fn check_member(roster: &Roster, member_id: MemberId) -> Option<IntegrityKind> {
    if !roster.contains(member_id) {
        Some(IntegrityKind::UnknownMember)
    } else if !roster.is_eligible(member_id) {
        Some(IntegrityKind::IneligibleMember)
    } else {
        None
    }
}

/// Keeps the ballots of the first `max_revote_count + 1` electronic submissions
/// of a member. Also tells if some submissions had to be dropped.
fn allowed_submissions<'a>(
    ballots: &[&'a Ballot],
    max_revote_count: u32,
) -> (Vec<&'a Ballot>, bool) {
    let timestamps: BTreeSet<NaiveDateTime> = ballots.iter().map(|b| b.submitted_at).collect();
    let max_submissions = max_revote_count as usize + 1;
    if timestamps.len() <= max_submissions {
        return (ballots.to_vec(), false);
    }
    // Invariant: there is at least one timestamp here.
    let last_allowed: Option<&NaiveDateTime> = timestamps.iter().nth(max_submissions - 1);
    let allowed = ballots
        .iter()
        .filter(|b| Some(&b.submitted_at) <= last_allowed)
        .cloned()
        .collect();
    (allowed, true)
}

/// The latest ballot for each agenda. Different ballots sharing the latest
/// timestamp cannot be told apart and make the agenda ambiguous for the member.
fn latest_per_agenda(
    ballots: &[&Ballot],
    member_id: MemberId,
    issues: &mut BTreeSet<IntegrityIssue>,
) -> LiveBallots {
    let mut latest: BTreeMap<AgendaId, (NaiveDateTime, LiveChoice)> = BTreeMap::new();
    for b in ballots.iter() {
        let e = latest
            .entry(b.agenda_id)
            .or_insert((b.submitted_at, LiveChoice::Choice(b.choice)));
        if b.submitted_at > e.0 {
            *e = (b.submitted_at, LiveChoice::Choice(b.choice));
        } else if b.submitted_at == e.0 && e.1 != LiveChoice::Choice(b.choice) {
            e.1 = LiveChoice::Ambiguous;
        }
    }
    latest
        .into_iter()
        .map(|(agenda_id, (_, live))| {
            if live == LiveChoice::Ambiguous {
                issues.insert(issue(
                    member_id,
                    Some(agenda_id),
                    IntegrityKind::DuplicateSubmission,
                ));
            }
            (agenda_id, live)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn at(minutes: i64) -> NaiveDateTime {
        start() + Duration::minutes(minutes)
    }

    fn meeting(max_revote_count: u32, vote_mode: VoteMode) -> Meeting {
        Meeting {
            id: 1,
            title: "Regular general meeting".to_string(),
            meeting_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            vote_start: start(),
            vote_end: start() + Duration::days(10),
            vote_mode,
            member_base_date: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            quorum_threshold: Percentage::whole(50).ok(),
            max_revote_count,
            default_pass_threshold: Percentage::whole(50).ok(),
        }
    }

    fn agendas() -> Vec<Agenda> {
        vec![
            Agenda {
                id: 20,
                order: 2,
                title: "Select the contractor".to_string(),
                kind: AgendaKind::from_delimited("A/B/C").unwrap(),
                pass_threshold: None,
            },
            Agenda {
                id: 10,
                order: 1,
                title: "Approve the budget".to_string(),
                kind: AgendaKind::Approval,
                pass_threshold: None,
            },
        ]
    }

    fn roster(n: u64) -> Roster {
        let members: Vec<VoteMember> = (1..=n)
            .map(|id| VoteMember {
                id,
                voter_id: VoterId::MembershipNumber(format!("M-{:04}", id)),
                name: format!("member {}", id),
                phone: None,
                birthdate: None,
                unit_type: None,
                intention: VoteIntention::Undecided,
                registered_on: None,
            })
            .collect();
        Roster::new(NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(), &members).unwrap()
    }

    fn ballot(
        member_id: MemberId,
        agenda_id: AgendaId,
        channel: Channel,
        minutes: i64,
        choice: Choice,
    ) -> Ballot {
        Ballot {
            member_id,
            agenda_id,
            channel,
            submitted_at: at(minutes),
            choice,
        }
    }

    fn approval(outcome: &TallyOutcome) -> (ApprovalCounts, ApprovalCounts) {
        match &outcome.tallies[0].counts {
            ChannelCounts::Approval { electronic, paper } => (*electronic, *paper),
            x => panic!("unexpected counts {:?}", x),
        }
    }

    #[test]
    fn tallies_follow_agenda_order_and_zero_fill() {
        init();
        let snapshot = BallotSnapshot::default();
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        assert_eq!(outcome.tallies.len(), 2);
        assert_eq!(outcome.tallies[0].agenda_id, 10);
        assert_eq!(outcome.tallies[1].agenda_id, 20);
        assert_eq!(approval(&outcome), (ApprovalCounts::EMPTY, ApprovalCounts::EMPTY));
        assert!(outcome.attendees.is_empty());
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn only_the_latest_revote_counts() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(1, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(1, 10, Channel::Electronic, 5, Choice::Disagree),
                ballot(1, 10, Channel::Electronic, 10, Choice::Abstain),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(2, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let (electronic, _) = approval(&outcome);
        assert_eq!(electronic.total(), 1);
        assert_eq!(electronic.abstain, 1);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn submissions_over_the_revote_limit_are_dropped() {
        init();
        // Three submissions with one revote allowed: the second one is live.
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(1, 10, Channel::Electronic, 10, Choice::Abstain),
                ballot(1, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(1, 20, Channel::Electronic, 0, Choice::Option(1)),
                ballot(1, 10, Channel::Electronic, 5, Choice::Disagree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(1, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let (electronic, _) = approval(&outcome);
        assert_eq!(electronic.total(), 1);
        assert_eq!(electronic.disagree, 1);
        assert_eq!(
            outcome.issues,
            vec![IntegrityIssue {
                member_id: 1,
                agenda_id: None,
                kind: IntegrityKind::RevoteLimitExceeded
            }]
        );
        assert!(outcome.attendees.contains(&1));
        assert_eq!(outcome.tallies[0].excluded_members, Vec::<MemberId>::new());
    }

    #[test]
    fn channel_conflict_is_isolated() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(1, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(1, 10, Channel::Paper, 3, Choice::Disagree),
                ballot(2, 10, Channel::Electronic, 1, Choice::Agree),
                ballot(3, 10, Channel::Paper, 2, Choice::Disagree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let (electronic, paper) = approval(&outcome);
        assert_eq!(electronic.agree, 1);
        assert_eq!(paper.disagree, 1);
        assert_eq!(outcome.tallies[0].excluded_members, vec![1]);
        assert_eq!(
            outcome.issues,
            vec![IntegrityIssue {
                member_id: 1,
                agenda_id: None,
                kind: IntegrityKind::ChannelConflict
            }]
        );
        // The member did vote, so they are present.
        assert_eq!(outcome.attendees.len(), 3);
        assert_eq!(outcome.electronic_voters.len(), 1);
        assert_eq!(outcome.paper_voters.len(), 1);
    }

    #[test]
    fn paper_record_conflicts_with_electronic_ballots() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![ballot(1, 10, Channel::Electronic, 0, Choice::Agree)],
            paper_records: vec![PaperRecord {
                member_id: 1,
                paper_vote_date: NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
                attachments: vec!["scan-0001.pdf".to_string()],
                registered_at: at(60),
            }],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        assert_eq!(approval(&outcome).0.total(), 0);
        assert_eq!(outcome.issues[0].kind, IntegrityKind::ChannelConflict);
    }

    #[test]
    fn paper_resubmission_overwrites_the_sheet() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(2, 10, Channel::Paper, 0, Choice::Disagree),
                ballot(2, 20, Channel::Paper, 0, Choice::Option(3)),
                ballot(2, 10, Channel::Paper, 30, Choice::Agree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let (_, paper) = approval(&outcome);
        assert_eq!(paper, ApprovalCounts { agree: 1, disagree: 0, abstain: 0 });
        // The second sheet has nothing for the selection agenda.
        match &outcome.tallies[1].counts {
            ChannelCounts::Selection { paper, .. } => assert_eq!(paper.total(), 0),
            x => panic!("unexpected counts {:?}", x),
        }
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn invalid_ballots_are_flagged() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                // Unknown member and agenda.
                ballot(9, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(1, 99, Channel::Electronic, 0, Choice::Agree),
                // Wrong kind of choice.
                ballot(2, 20, Channel::Electronic, 0, Choice::Agree),
                // After the window closed.
                ballot(3, 10, Channel::Electronic, 60 * 24 * 11, Choice::Agree),
                // Same timestamp, different choices.
                ballot(1, 10, Channel::Electronic, 1, Choice::Agree),
                ballot(1, 10, Channel::Electronic, 1, Choice::Disagree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let kinds: Vec<(MemberId, IntegrityKind)> =
            outcome.issues.iter().map(|i| (i.member_id, i.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (1, IntegrityKind::DuplicateSubmission),
                (1, IntegrityKind::UnknownAgenda),
                (2, IntegrityKind::InvalidChoice),
                (3, IntegrityKind::OutsideVoteWindow),
                (9, IntegrityKind::UnknownMember),
            ]
        );
        assert_eq!(approval(&outcome).0.total(), 0);
        assert_eq!(outcome.tallies[0].excluded_members, vec![1]);
        assert_eq!(outcome.tallies[1].excluded_members, vec![2]);
    }

    #[test]
    fn members_without_a_counted_ballot_are_absent() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                // Approval choices on the selection agenda only.
                ballot(1, 20, Channel::Electronic, 0, Choice::Agree),
                ballot(2, 20, Channel::Paper, 0, Choice::Disagree),
                // Two different answers in one submission.
                ballot(3, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(3, 10, Channel::Electronic, 0, Choice::Disagree),
                // One bad ballot next to a good one is enough to be present.
                ballot(4, 20, Channel::Electronic, 0, Choice::Agree),
                ballot(4, 10, Channel::Electronic, 0, Choice::Agree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicAndPaper),
            &agendas(),
            &roster(4),
            &snapshot,
        );
        assert_eq!(outcome.attendees, BTreeSet::from([4]));
        assert_eq!(outcome.electronic_voters, BTreeSet::from([4]));
        assert!(outcome.paper_voters.is_empty());
        assert_eq!(approval(&outcome).0.agree, 1);
        assert_eq!(outcome.tallies[1].excluded_members, vec![1, 2, 4]);
    }

    #[test]
    fn paper_is_refused_in_electronic_only_meetings() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(1, 10, Channel::Paper, 0, Choice::Agree),
                ballot(2, 10, Channel::Electronic, 0, Choice::Agree),
            ],
            paper_records: vec![],
        };
        let outcome = tally_ballots(
            &meeting(0, VoteMode::ElectronicOnly),
            &agendas(),
            &roster(3),
            &snapshot,
        );
        assert_eq!(approval(&outcome).0.agree, 1);
        assert_eq!(approval(&outcome).1.total(), 0);
        assert_eq!(outcome.issues[0].kind, IntegrityKind::PaperNotAllowed);
        assert_eq!(outcome.attendees.len(), 1);
    }

    #[test]
    fn recomputing_gives_the_same_outcome() {
        init();
        let snapshot = BallotSnapshot {
            ballots: vec![
                ballot(1, 10, Channel::Electronic, 0, Choice::Agree),
                ballot(2, 20, Channel::Paper, 0, Choice::Option(2)),
                ballot(3, 10, Channel::Electronic, 4, Choice::Disagree),
                ballot(3, 20, Channel::Electronic, 4, Choice::Option(2)),
            ],
            paper_records: vec![],
        };
        let m = meeting(0, VoteMode::ElectronicAndPaper);
        let first = tally_ballots(
            &m,
            &agendas(),
            &roster(3),
            &snapshot,
        );
        let mut reversed = snapshot.clone();
        reversed.ballots.reverse();
        let second = tally_ballots(
            &m,
            &agendas(),
            &roster(3),
            &reversed,
        );
        assert_eq!(first, second);
    }
}
