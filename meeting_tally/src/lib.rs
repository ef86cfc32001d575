mod config;
mod errors;
mod lifecycle;

pub mod ballot_box;
pub mod manual;
pub mod quorum;
pub mod resolver;
pub mod roster;
pub mod tally;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use log::{info, warn};

pub use crate::config::*;
pub use crate::errors::*;
pub use crate::lifecycle::*;

use crate::quorum::{compute_quorum, count_attendees, reference_date};
use crate::resolver::resolve_agenda;
use crate::roster::Roster;
use crate::tally::tally_ballots;

/// Tabulates a meeting: the result of every agenda and the quorum.
///
/// Nothing here aborts the whole report. A configuration problem is reported
/// next to the results it prevented, and every other agenda is still
/// resolved. The function only reads its input, so the report can be
/// recomputed at any time, from any number of threads, and is always the same
/// for the same snapshot and date.
pub fn tabulate_meeting(snapshot: &MeetingSnapshot, today: NaiveDate) -> MeetingReport {
    let meeting = &snapshot.meeting;
    info!(
        "tabulate_meeting: meeting {} ({:?}) on {}, today is {}",
        meeting.id, meeting.title, meeting.meeting_date, today
    );
    let mut configuration_errors: Vec<ConfigurationError> = Vec::new();
    if let Err(e) = meeting.validate() {
        warn!("tabulate_meeting: meeting {}: {}", meeting.id, e);
        configuration_errors.push(e);
    }
    let agendas = checked_agendas(&snapshot.agendas, &mut configuration_errors);

    let (roster, rejected_members) =
        Roster::keeping_first(meeting.member_base_date, &snapshot.members);
    for e in rejected_members.into_iter() {
        warn!("tabulate_meeting: meeting {}: roster: {}", meeting.id, e);
        configuration_errors.push(e);
    }

    let outcome = tally_ballots(meeting, &agendas, &roster, &snapshot.ballots);

    let agendas_by_id: HashMap<AgendaId, &Agenda> = agendas.iter().map(|a| (a.id, a)).collect();
    let mut results: Vec<AgendaResult> = Vec::new();
    for t in outcome.tallies.iter() {
        let agenda = match agendas_by_id.get(&t.agenda_id) {
            Some(a) => a,
            None => continue,
        };
        match resolve_agenda(agenda, t, meeting.default_pass_threshold) {
            Ok(res) => results.push(res),
            Err(e) => {
                warn!("tabulate_meeting: agenda {}: {}", agenda.id, e);
                configuration_errors.push(e);
            }
        }
    }

    let roster_size = roster.size();
    let attendee_count = count_attendees(&roster, &outcome.attendees);
    let quorum = match compute_quorum(meeting, roster_size, attendee_count, today) {
        Ok(q) => q,
        Err(e) => {
            warn!("tabulate_meeting: meeting {}: quorum: {}", meeting.id, e);
            configuration_errors.push(e);
            MeetingQuorumStatus::not_met(
                reference_date(today, meeting.meeting_date),
                attendee_count,
                roster_size,
                meeting.quorum_threshold,
            )
        }
    };

    info!(
        "tabulate_meeting: meeting {}: {} agenda results, {} configuration errors, {} integrity issues",
        meeting.id,
        results.len(),
        configuration_errors.len(),
        outcome.issues.len()
    );
    MeetingReport {
        meeting_id: meeting.id,
        title: meeting.title.clone(),
        quorum,
        agendas: results,
        electronic_voters: outcome.electronic_voters.len() as u64,
        paper_voters: outcome.paper_voters.len() as u64,
        intentions: roster.intention_summary(),
        issues: outcome.issues,
        configuration_errors,
    }
}

// Agendas sharing an id or a display order with an earlier one are dropped.
fn checked_agendas(agendas: &[Agenda], errors: &mut Vec<ConfigurationError>) -> Vec<Agenda> {
    let mut ids: HashSet<AgendaId> = HashSet::new();
    let mut orders: HashSet<u32> = HashSet::new();
    let mut res: Vec<Agenda> = Vec::new();
    for a in agendas.iter() {
        if !ids.insert(a.id) {
            errors.push(ConfigurationError::DuplicateAgenda { agenda_id: a.id });
        } else if !orders.insert(a.order) {
            errors.push(ConfigurationError::DuplicateAgendaOrder { order: a.order });
        } else {
            res.push(a.clone());
        }
    }
    res
}
