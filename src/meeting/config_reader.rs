use crate::meeting::*;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSettings {
    pub id: MeetingId,
    pub title: String,
    #[serde(rename = "meetingDate")]
    pub meeting_date: NaiveDate,
    #[serde(rename = "voteStart")]
    pub vote_start: NaiveDateTime,
    #[serde(rename = "voteEnd")]
    pub vote_end: NaiveDateTime,
    #[serde(rename = "voteMode")]
    pub vote_mode: VoteMode,
    #[serde(rename = "memberBaseDate")]
    pub member_base_date: NaiveDate,
    #[serde(rename = "quorumPercentage")]
    pub quorum_percentage: Option<f64>,
    #[serde(rename = "maxRevoteCount")]
    pub max_revote_count: Option<u32>,
    #[serde(rename = "passThreshold")]
    pub pass_threshold: Option<f64>,
}

/// Selection options, either as a list or as the legacy `"A/B/C"` string.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionList {
    List(Vec<String>),
    Delimited(String),
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AgendaConfig {
    pub id: AgendaId,
    pub order: u32,
    pub title: String,
    #[serde(rename = "voteType")]
    pub vote_type: String,
    pub options: Option<OptionList>,
    #[serde(rename = "passThreshold")]
    pub pass_threshold: Option<f64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub channel: Channel,
    #[serde(rename = "firstVoteRowIndex")]
    _first_vote_row_index: Option<JSValue>,
    #[serde(rename = "memberColumnIndex")]
    _member_column_index: Option<JSValue>,
    #[serde(rename = "submittedAtColumnIndex")]
    _submitted_at_column_index: Option<JSValue>,
    #[serde(rename = "firstAgendaColumnIndex")]
    _first_agenda_column_index: Option<JSValue>,
    #[serde(rename = "paperDateColumnIndex")]
    _paper_date_column_index: Option<JSValue>,
    #[serde(rename = "attachmentsColumnIndex")]
    _attachments_column_index: Option<JSValue>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

// All the indices below are 0-based, the configuration file is 1-based.
impl FileSource {
    /// The first row holding a submission. The default skips one header row.
    pub fn first_vote_row_index(&self) -> CliResult<usize> {
        read_index(&self._first_vote_row_index, "firstVoteRowIndex", 2)
    }

    pub fn member_column_index(&self) -> CliResult<usize> {
        read_index(&self._member_column_index, "memberColumnIndex", 1)
    }

    pub fn submitted_at_column_index(&self) -> CliResult<usize> {
        read_index(
            &self._submitted_at_column_index,
            "submittedAtColumnIndex",
            2,
        )
    }

    pub fn first_agenda_column_index(&self) -> CliResult<usize> {
        read_index(
            &self._first_agenda_column_index,
            "firstAgendaColumnIndex",
            3,
        )
    }

    pub fn paper_date_column_index(&self) -> CliResult<Option<usize>> {
        read_optional_index(&self._paper_date_column_index, "paperDateColumnIndex")
    }

    pub fn attachments_column_index(&self) -> CliResult<Option<usize>> {
        read_optional_index(&self._attachments_column_index, "attachmentsColumnIndex")
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    pub meeting: MeetingSettings,
    pub agendas: Vec<AgendaConfig>,
    /// The roster CSV file.
    pub roster: String,
    #[serde(default)]
    pub sources: Vec<FileSource>,
}

fn percentage(value: Option<f64>) -> CliResult<Option<Percentage>> {
    value
        .map(Percentage::try_from)
        .transpose()
        .context(InvalidConfigurationSnafu {})
}

impl MeetingSettings {
    pub fn to_meeting(&self) -> CliResult<Meeting> {
        Ok(Meeting {
            id: self.id,
            title: self.title.clone(),
            meeting_date: self.meeting_date,
            vote_start: self.vote_start,
            vote_end: self.vote_end,
            vote_mode: self.vote_mode,
            member_base_date: self.member_base_date,
            quorum_threshold: percentage(self.quorum_percentage)?,
            max_revote_count: self.max_revote_count.unwrap_or(0),
            default_pass_threshold: percentage(self.pass_threshold)?,
        })
    }
}

impl AgendaConfig {
    pub fn to_agenda(&self) -> CliResult<Agenda> {
        let kind = match (self.vote_type.as_str(), &self.options) {
            ("approval", None) => AgendaKind::Approval,
            ("approval", Some(_)) => {
                whatever!("agenda {}: approval agendas take no options", self.id)
            }
            ("selection", Some(OptionList::Delimited(s))) => {
                AgendaKind::from_delimited(s).context(InvalidConfigurationSnafu {})?
            }
            ("selection", Some(OptionList::List(labels))) => AgendaKind::Selection(
                labels
                    .iter()
                    .enumerate()
                    .map(|(idx, label)| SelectionOption {
                        id: (idx + 1) as OptionId,
                        label: label.trim().to_string(),
                    })
                    .collect(),
            ),
            // Reported by the tally as an agenda without options.
            ("selection", None) => AgendaKind::Selection(vec![]),
            (x, _) => whatever!("agenda {}: unknown vote type {:?}", self.id, x),
        };
        Ok(Agenda {
            id: self.id,
            order: self.order,
            title: self.title.clone(),
            kind,
            pass_threshold: percentage(self.pass_threshold)?,
        })
    }
}

fn read_index(x: &Option<JSValue>, field: &str, default: usize) -> CliResult<usize> {
    Ok(read_optional_index(x, field)?.unwrap_or(default - 1))
}

fn read_optional_index(x: &Option<JSValue>, field: &str) -> CliResult<Option<usize>> {
    let one_based: Option<usize> = match x {
        None | Some(JSValue::Null) => return Ok(None),
        Some(JSValue::Number(n)) => n.as_u64().map(|n| n as usize),
        // Excel-style columns: A, B, ..., Z, AA, ...
        Some(JSValue::String(s)) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic()) => {
            Some(s.to_ascii_uppercase().chars().fold(0, |acc, c| {
                acc * 26 + (c as usize - 'A' as usize + 1)
            }))
        }
        Some(JSValue::String(s)) => s.parse::<usize>().ok(),
        Some(_) => None,
    };
    match one_based {
        Some(idx) if idx >= 1 => Ok(Some(idx - 1)),
        _ => InvalidIndexSnafu { field }.fail(),
    }
}
