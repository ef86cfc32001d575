use std::collections::HashSet;

use chrono::NaiveDate;
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::config::*;
use crate::errors::*;

/// Something that knows how many times a member has voted.
///
/// The ballot store owns this count. The roster only reads it to decide
/// whether a member can still be changed.
pub trait VoteCountSource {
    fn vote_count(&self, member_id: MemberId) -> u32;
}

/// The members of one meeting.
///
/// Members are kept sorted by id. Every member id and every voter
/// identifier appears once.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Roster {
    base_date: NaiveDate,
    members: Vec<VoteMember>,
}

impl Roster {
    pub fn new(base_date: NaiveDate, members: &[VoteMember]) -> Result<Roster, ConfigurationError> {
        let (roster, rejected) = Roster::keeping_first(base_date, members);
        match rejected.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(roster),
        }
    }

    /// Builds a roster out of the valid entries only.
    ///
    /// The first entry for a member id or a voter identifier is kept. Every
    /// later entry reusing one of them is left out and reported.
    pub fn keeping_first(
        base_date: NaiveDate,
        members: &[VoteMember],
    ) -> (Roster, Vec<ConfigurationError>) {
        let mut ids: HashSet<MemberId> = HashSet::new();
        let mut voters: HashSet<&VoterId> = HashSet::new();
        let mut kept: Vec<VoteMember> = Vec::new();
        let mut rejected: Vec<ConfigurationError> = Vec::new();
        for m in members.iter() {
            if ids.contains(&m.id) {
                warn!("Roster: member {} is declared more than once", m.id);
                rejected.push(ConfigurationError::DuplicateMember { member_id: m.id });
            } else if voters.contains(&m.voter_id) {
                warn!("Roster: member {} reuses voter {}", m.id, m.voter_id);
                rejected.push(ConfigurationError::DuplicateVoter {
                    member_id: m.id,
                    voter: m.voter_id.to_string(),
                });
            } else {
                ids.insert(m.id);
                voters.insert(&m.voter_id);
                kept.push(m.clone());
            }
        }
        kept.sort_by_key(|m| m.id);
        debug!(
            "Roster::keeping_first: {} members, {} rejected, base date {}",
            kept.len(),
            rejected.len(),
            base_date
        );
        (
            Roster {
                base_date,
                members: kept,
            },
            rejected,
        )
    }

    pub fn base_date(&self) -> NaiveDate {
        self.base_date
    }

    pub fn members(&self) -> &[VoteMember] {
        &self.members
    }

    pub fn get(&self, member_id: MemberId) -> Option<&VoteMember> {
        self.members
            .binary_search_by_key(&member_id, |m| m.id)
            .ok()
            .map(|idx| &self.members[idx])
    }

    pub fn contains(&self, member_id: MemberId) -> bool {
        self.get(member_id).is_some()
    }

    /// On the roster as of the member base date.
    pub fn is_eligible(&self, member_id: MemberId) -> bool {
        self.get(member_id)
            .map(|m| self.counts_on_base_date(m))
            .unwrap_or(false)
    }

    pub fn eligible(&self) -> impl Iterator<Item = &VoteMember> {
        self.members
            .iter()
            .filter(move |m| self.counts_on_base_date(m))
    }

    /// The quorum denominator.
    pub fn size(&self) -> u64 {
        self.eligible().count() as u64
    }

    pub fn intention_summary(&self) -> IntentionSummary {
        let mut res = IntentionSummary::default();
        for m in self.eligible() {
            match m.intention {
                VoteIntention::Planned => res.planned += 1,
                VoteIntention::Undecided => res.undecided += 1,
                VoteIntention::Impossible => res.impossible += 1,
                VoteIntention::Other => res.other += 1,
            }
        }
        res
    }

    pub fn add_member(&mut self, member: VoteMember) -> Result<(), RosterError> {
        let mut candidate = self.members.clone();
        candidate.push(member);
        *self = Roster::new(self.base_date, &candidate).context(InvalidEntrySnafu)?;
        Ok(())
    }

    /// Replaces a member, unless they have already voted.
    pub fn update_member(
        &mut self,
        member: VoteMember,
        votes: &dyn VoteCountSource,
    ) -> Result<(), RosterError> {
        let member_id = member.id;
        self.ensure_unlocked(member_id, votes)?;
        let mut candidate: Vec<VoteMember> = self
            .members
            .iter()
            .filter(|m| m.id != member_id)
            .cloned()
            .collect();
        candidate.push(member);
        *self = Roster::new(self.base_date, &candidate).context(InvalidEntrySnafu)?;
        info!("Roster: updated member {}", member_id);
        Ok(())
    }

    /// Removes a member, unless they have already voted. Ballots are never
    /// cascaded away: a member who voted stays on the roster.
    pub fn remove_member(
        &mut self,
        member_id: MemberId,
        votes: &dyn VoteCountSource,
    ) -> Result<VoteMember, RosterError> {
        self.ensure_unlocked(member_id, votes)?;
        let idx = self
            .members
            .binary_search_by_key(&member_id, |m| m.id)
            .ok()
            .context(MissingMemberSnafu { member_id })?;
        info!("Roster: removed member {}", member_id);
        Ok(self.members.remove(idx))
    }

    fn ensure_unlocked(
        &self,
        member_id: MemberId,
        votes: &dyn VoteCountSource,
    ) -> Result<(), RosterError> {
        ensure!(self.contains(member_id), MissingMemberSnafu { member_id });
        let vote_count = votes.vote_count(member_id);
        ensure!(
            vote_count == 0,
            MemberLockedSnafu {
                member_id,
                vote_count
            }
        );
        Ok(())
    }

    fn counts_on_base_date(&self, m: &VoteMember) -> bool {
        m.registered_on.map(|d| d <= self.base_date).unwrap_or(true)
    }
}
