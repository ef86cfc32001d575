use log::{debug, info, warn};

use meeting_tally::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::meeting::config_reader::*;
use crate::meeting::io_common::rows_to_ballots;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_roster;
mod io_xlsx;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("The configuration file {path} has no parent directory"))]
    MissingParentDir { path: String },
    #[snafu(display("Invalid meeting configuration: {source}"))]
    InvalidConfiguration { source: ConfigurationError },
    #[snafu(display("Invalid value for {field}: expected a 1-based row or column index"))]
    InvalidIndex { field: String },
    #[snafu(display("Unknown provider {provider:?}"))]
    UnknownProvider { provider: String },

    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Excel file {path} has no worksheet {name}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("{path}:{lineno}: cannot read cell {content}"))]
    ExcelWrongCellType {
        path: String,
        lineno: usize,
        content: String,
    },

    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading a line of {path}"))]
    CsvLineParse { source: csv::Error, path: String },

    #[snafu(display("{path}:{lineno}: invalid value {content:?}"))]
    InvalidCell {
        path: String,
        lineno: usize,
        content: String,
    },
    #[snafu(display("{path}:{lineno}: agenda {agenda_id} has no choice {content:?}"))]
    UnknownChoice {
        path: String,
        lineno: usize,
        agenda_id: AgendaId,
        content: String,
    },
    #[snafu(display("member {member_id} has neither a membership number nor a dong and ho"))]
    MissingVoterId { member_id: MemberId },

    #[snafu(display("Difference detected between the calculated summary and the reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CliResult<T> = Result<T, CliError>;

fn read_json(path: &str) -> CliResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

fn read_ballot_data(
    root_path: &Path,
    cfs: &FileSource,
    agendas: &[Agenda],
) -> CliResult<io_common::ParsedSource> {
    let p: PathBuf = root_path.join(&cfs.file_path);
    let path = p.as_path().display().to_string();
    info!(
        "Attempting to read {} ballot file {:?}",
        cfs.channel, path
    );
    let rows = match cfs.provider.as_str() {
        "csv" => io_csv::read_csv_rows(&path, cfs)?,
        "xlsx" => io_xlsx::read_excel_rows(&path, cfs)?,
        x => {
            return UnknownProviderSnafu { provider: x }.fail();
        }
    };
    rows_to_ballots(&path, &rows, cfs, agendas)
}

/// Loads everything the meeting file points to.
pub fn read_meeting_snapshot(config_path: &str) -> CliResult<MeetingSnapshot> {
    let config_js = read_json(config_path)?;
    let config: MeetingConfig =
        serde_json::from_value(config_js).context(ParsingJsonSnafu { path: config_path })?;
    debug!("read_meeting_snapshot: config: {:?}", config);

    let meeting = config.meeting.to_meeting()?;
    let agendas: Vec<Agenda> = config
        .agendas
        .iter()
        .map(|a| a.to_agenda())
        .collect::<CliResult<Vec<Agenda>>>()?;

    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu { path: config_path })?;
    let roster_path = root_p.join(&config.roster).display().to_string();
    let members = io_roster::read_roster(&roster_path)?;

    if config.sources.is_empty() {
        warn!("No ballot file in {}: tabulating an empty meeting", config_path);
    }
    let mut ballots = BallotSnapshot::default();
    for cfs in config.sources.iter() {
        let mut parsed = read_ballot_data(root_p, cfs, &agendas)?;
        ballots.ballots.append(&mut parsed.ballots);
        ballots.paper_records.append(&mut parsed.paper_records);
    }

    Ok(MeetingSnapshot {
        meeting,
        agendas,
        members,
        ballots,
    })
}

/// Tabulates the meeting described in `config_path`, writes the summary and
/// checks it against the reference summary if one is given.
pub fn run_meeting(
    config_path: &str,
    out: Option<&str>,
    reference_path: Option<&str>,
    today: NaiveDate,
) -> CliResult<MeetingReport> {
    let snapshot = read_meeting_snapshot(config_path)?;
    let report = tabulate_meeting(&snapshot, today);

    // Going through a JSON value gives the same key order as the reference.
    let result_js = serde_json::to_value(&report).context(SerializingJsonSnafu {})?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;

    match out {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(out_path) => {
            fs::write(out_path, &pretty_js_stats).context(WritingFileSnafu { path: out_path })?;
            info!("Summary written to {}", out_path);
        }
    }

    if let Some(summary_p) = reference_path {
        let summary_ref = read_json(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary {}", summary_p);
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_str(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
        info!("The summary matches the reference {}", summary_p);
    }

    Ok(report)
}
