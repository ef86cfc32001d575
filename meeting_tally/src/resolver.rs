use log::{debug, info};
use snafu::prelude::*;

use crate::config::*;
use crate::errors::*;

/// Turns the tally of one agenda into its verdict.
///
/// The channels are added option by option. Abstentions count toward the
/// attendance of the agenda but not toward the ratio that decides it.
///
/// - approval: `agree / (agree + disagree)` must reach the threshold (`>=`).
///   With no agree or disagree ballot, the agenda is undetermined.
/// - selection: the option with strictly the most votes wins. A tie for the
///   first place, or no vote at all, is undetermined. If a threshold applies,
///   the winner's share of the votes must reach it or the agenda is rejected.
///
/// The agenda threshold overrides `default_threshold`. Approval agendas need
/// one of the two.
pub fn resolve_agenda(
    agenda: &Agenda,
    tally: &AgendaTally,
    default_threshold: Option<Percentage>,
) -> Result<AgendaResult, ConfigurationError> {
    agenda.validate()?;
    let threshold = agenda.pass_threshold.or(default_threshold);
    let combined = tally.counts.combined();

    let (verdict, ratio, winner) = match &combined {
        TallyCounts::Approval(counts) => {
            let th = threshold.context(MissingPassThresholdSnafu {
                agenda_id: agenda.id,
            })?;
            let (verdict, ratio) = approval_verdict(counts, th);
            (verdict, ratio, None)
        }
        TallyCounts::Selection(counts) => selection_verdict(agenda, counts, threshold),
    };

    info!(
        "resolve_agenda: agenda {} (#{}) {:?}: ratio {:?}, threshold {:?}",
        agenda.id, agenda.order, verdict, ratio, threshold
    );
    Ok(AgendaResult {
        agenda_id: agenda.id,
        order: agenda.order,
        title: agenda.title.clone(),
        by_channel: tally.counts.clone(),
        attendance: combined.attendance(),
        combined,
        threshold,
        ratio,
        winner,
        verdict,
        excluded_members: tally.excluded_members.clone(),
    })
}

fn ratio_percent(numerator: u64, denominator: u64) -> f64 {
    numerator as f64 * 100.0 / denominator as f64
}

fn approval_verdict(counts: &ApprovalCounts, threshold: Percentage) -> (Verdict, Option<f64>) {
    let decisive = counts.decisive();
    if decisive == 0 {
        return (Verdict::Undetermined, None);
    }
    let verdict = if threshold.is_reached_by(counts.agree, decisive) {
        Verdict::Passed
    } else {
        Verdict::Rejected
    };
    (verdict, Some(ratio_percent(counts.agree, decisive)))
}

fn selection_verdict(
    agenda: &Agenda,
    counts: &SelectionCounts,
    threshold: Option<Percentage>,
) -> (Verdict, Option<f64>, Option<SelectionOption>) {
    let decisive = counts.decisive();
    let top = counts.options.iter().map(|o| o.votes).max().unwrap_or(0);
    if decisive == 0 || top == 0 {
        return (Verdict::Undetermined, None, None);
    }
    let leaders: Vec<&OptionCount> = counts.options.iter().filter(|o| o.votes == top).collect();
    let ratio = Some(ratio_percent(top, decisive));
    if leaders.len() > 1 {
        debug!(
            "selection_verdict: agenda {}: tie between {:?}",
            agenda.id,
            leaders.iter().map(|o| o.option_id).collect::<Vec<_>>()
        );
        return (Verdict::Undetermined, ratio, None);
    }
    let winner: Option<SelectionOption> = leaders.first().and_then(|oc| match &agenda.kind {
        AgendaKind::Selection(options) => options.iter().find(|o| o.id == oc.option_id).cloned(),
        AgendaKind::Approval => None,
    });
    let verdict = match threshold {
        Some(th) if !th.is_reached_by(top, decisive) => Verdict::Rejected,
        _ => Verdict::Passed,
    };
    (verdict, ratio, winner)
}
