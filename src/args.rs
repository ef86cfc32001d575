use clap::Parser;

/// Tabulates the electronic and paper votes of a general meeting.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the meeting, its agendas, the roster file and the
    /// ballot files. See the manual of the meeting_tally library for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference summary in JSON format. If provided, gmtally checks that the
    /// tabulated summary matches it and fails otherwise.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the summary of the meeting in JSON format.
    /// Defaults to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (YYYY-MM-DD) The date the quorum is computed for. Defaults to the local date.
    #[clap(long, value_parser)]
    pub today: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
