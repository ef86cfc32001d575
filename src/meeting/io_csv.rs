// Primitives for reading CSV files.

use std::fs::File;

use crate::meeting::io_common::RawRow;
use crate::meeting::*;

pub fn read_csv_rows(path: &str, cfs: &FileSource) -> CliResult<Vec<RawRow>> {
    let (records, first_row) = get_records(path, cfs)?;
    let mut res: Vec<RawRow> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + first_row + 1;
        let line = line_r.context(CsvLineParseSnafu { path })?;
        debug!("read_csv_rows: {}:{}: {:?}", path, lineno, line);
        res.push(RawRow {
            lineno,
            cells: line.iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(res)
}

fn get_records(path: &str, cfs: &FileSource) -> CliResult<(csv::StringRecordsIntoIter<File>, usize)> {
    let first_row = cfs.first_vote_row_index()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();
    for _ in 0..first_row {
        _ = records.next();
    }
    Ok((records, first_row))
}
