use chrono::{NaiveDate, NaiveDateTime};

use crate::meeting::*;

pub const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIMESTAMP_FORMATS: [&str; 4] = [
    TIMESTAMP_OUTPUT_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// One row of a ballot file, with every cell turned into text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RawRow {
    /// 1-based, as shown by spreadsheets.
    pub lineno: usize,
    pub cells: Vec<String>,
}

/// The ballots read from one file source.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ParsedSource {
    pub ballots: Vec<Ballot>,
    pub paper_records: Vec<PaperRecord>,
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Reads a ballot cell. An empty cell is no ballot.
pub fn parse_choice(agenda: &Agenda, cell: &str) -> Option<Option<Choice>> {
    let s = cell.trim();
    let keyword = match s.to_lowercase().as_str() {
        "" => return Some(None),
        "agree" | "찬성" => Some(Choice::Agree),
        "disagree" | "반대" => Some(Choice::Disagree),
        "abstain" | "기권" => Some(Choice::Abstain),
        _ => None,
    };
    keyword
        .or_else(|| agenda.option_by_label(s).map(|o| Choice::Option(o.id)))
        .map(Some)
}

/// Turns the rows of a file into ballots: one submission per row, one cell per
/// agenda in display order.
pub fn rows_to_ballots(
    path: &str,
    rows: &[RawRow],
    cfs: &FileSource,
    agendas: &[Agenda],
) -> CliResult<ParsedSource> {
    let member_col = cfs.member_column_index()?;
    let submitted_at_col = cfs.submitted_at_column_index()?;
    let first_agenda_col = cfs.first_agenda_column_index()?;
    let paper_date_col = cfs.paper_date_column_index()?;
    let attachments_col = cfs.attachments_column_index()?;

    let mut sorted_agendas: Vec<&Agenda> = agendas.iter().collect();
    sorted_agendas.sort_by_key(|a| a.order);

    let mut res = ParsedSource::default();
    for row in rows.iter() {
        let lineno = row.lineno;
        let cell = |idx: usize| row.cells.get(idx).map(|s| s.trim()).unwrap_or("");
        if row.cells.iter().all(|c| c.trim().is_empty()) {
            debug!("rows_to_ballots: {}:{}: empty row", path, lineno);
            continue;
        }

        let member_id: MemberId = cell(member_col)
            .parse::<MemberId>()
            .ok()
            .context(InvalidCellSnafu {
                path,
                lineno,
                content: cell(member_col),
            })?;
        let submitted_at = parse_timestamp(cell(submitted_at_col)).context(InvalidCellSnafu {
            path,
            lineno,
            content: cell(submitted_at_col),
        })?;

        let mut count = 0;
        for (idx, agenda) in sorted_agendas.iter().enumerate() {
            let content = cell(first_agenda_col + idx);
            let choice = parse_choice(agenda, content).context(UnknownChoiceSnafu {
                path,
                lineno,
                agenda_id: agenda.id,
                content,
            })?;
            if let Some(choice) = choice {
                res.ballots.push(Ballot {
                    member_id,
                    agenda_id: agenda.id,
                    channel: cfs.channel,
                    submitted_at,
                    choice,
                });
                count += 1;
            }
        }
        debug!(
            "rows_to_ballots: {}:{}: member {} at {}: {} ballot(s)",
            path, lineno, member_id, submitted_at, count
        );

        if cfs.channel == Channel::Paper {
            let paper_vote_date = match paper_date_col.map(cell) {
                Some(s) if !s.is_empty() => parse_date(s).context(InvalidCellSnafu {
                    path,
                    lineno,
                    content: s,
                })?,
                _ => submitted_at.date(),
            };
            let attachments: Vec<String> = attachments_col
                .map(cell)
                .unwrap_or("")
                .split(';')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            res.paper_records.push(PaperRecord {
                member_id,
                paper_vote_date,
                attachments,
                registered_at: submitted_at,
            });
        }
    }
    info!(
        "rows_to_ballots: {}: {} ballots, {} paper records",
        path,
        res.ballots.len(),
        res.paper_records.len()
    );
    Ok(res)
}
