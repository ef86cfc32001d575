use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::meeting::io_common::{RawRow, TIMESTAMP_OUTPUT_FORMAT};
use crate::meeting::*;

/// Reads the rows of the first worksheet, or of `excelWorksheetName`.
pub fn read_excel_rows(path: &str, cfs: &FileSource) -> CliResult<Vec<RawRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match &cfs.excel_worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path })?,
        None => workbook
            .worksheet_range_at(0)
            .context(MissingWorksheetSnafu {
                path,
                name: "#1".to_string(),
            })?
            .context(OpeningExcelSnafu { path })?,
    };

    // The range starts at the first non-empty cell, not at A1.
    let (start_row, start_col) = wrange
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let first_row = cfs.first_vote_row_index()?;

    let mut res: Vec<RawRow> = Vec::new();
    for (idx, row) in wrange.rows().enumerate() {
        let row_idx = start_row + idx;
        if row_idx < first_row {
            continue;
        }
        let lineno = row_idx + 1;
        let mut cells: Vec<String> = vec![String::new(); start_col];
        for cell in row.iter() {
            cells.push(read_cell(path, lineno, cell)?);
        }
        debug!("read_excel_rows: {}:{}: {:?}", path, lineno, cells);
        res.push(RawRow { lineno, cells });
    }
    Ok(res)
}

fn read_cell(path: &str, lineno: usize, cell: &DataType) -> CliResult<String> {
    match cell {
        DataType::String(s) => Ok(s.clone()),
        DataType::Empty => Ok(String::new()),
        // Member ids typed as numbers.
        DataType::Int(i) => Ok(i.to_string()),
        DataType::Float(f) if f.fract() == 0.0 => Ok(format!("{}", *f as i64)),
        DataType::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format(TIMESTAMP_OUTPUT_FORMAT).to_string())
            .context(ExcelWrongCellTypeSnafu {
                path,
                lineno,
                content: format!("{:?}", cell),
            }),
        _ => ExcelWrongCellTypeSnafu {
            path,
            lineno,
            content: format!("{:?}", cell),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        format!(
            "{}/tests/data/xlsx_ballots/electronic.xlsx",
            env!("CARGO_MANIFEST_DIR")
        )
    }

    fn source(worksheet: Option<&str>) -> FileSource {
        let mut js = serde_json::json!({
            "provider": "xlsx",
            "filePath": "electronic.xlsx",
            "channel": "electronic",
            "firstVoteRowIndex": 3,
            "memberColumnIndex": "B",
            "submittedAtColumnIndex": "C",
            "firstAgendaColumnIndex": "D"
        });
        if let Some(name) = worksheet {
            js["excelWorksheetName"] = serde_json::json!(name);
        }
        serde_json::from_value(js).unwrap()
    }

    #[test]
    fn rows_are_aligned_on_the_sheet_columns() {
        let path = fixture();
        let rows = read_excel_rows(&path, &source(None)).unwrap();
        let linenos: Vec<usize> = rows.iter().map(|r| r.lineno).collect();
        assert_eq!(linenos, vec![3, 4, 5]);
        // The data starts in column B, so column A reads as empty.
        assert_eq!(
            rows[0].cells,
            vec!["", "2", "2024-10-02 10:30:00", "agree", "Alpha", "찬성"]
        );
        assert_eq!(
            rows[1].cells,
            vec!["", "4", "2024-10-03 14:15:00", "disagree", "Beta", ""]
        );
        assert_eq!(rows[2].cells[1], "6");
        assert_eq!(rows[2].cells[4], "");
        assert_eq!(rows[2].cells[5], "반대");
    }

    #[test]
    fn worksheets_are_found_by_name() {
        let path = fixture();
        let rows = read_excel_rows(&path, &source(Some("Ballots"))).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(matches!(
            read_excel_rows(&path, &source(Some("Paper"))),
            Err(CliError::MissingWorksheet { .. })
        ));
    }

    #[test]
    fn fractional_numbers_are_refused() {
        assert_eq!(read_cell("f.xlsx", 3, &DataType::Float(12.0)).unwrap(), "12");
        assert_eq!(read_cell("f.xlsx", 3, &DataType::Int(7)).unwrap(), "7");
        assert!(matches!(
            read_cell("f.xlsx", 3, &DataType::Float(1.5)),
            Err(CliError::ExcelWrongCellType { lineno: 3, .. })
        ));
        assert!(matches!(
            read_cell("f.xlsx", 3, &DataType::Bool(true)),
            Err(CliError::ExcelWrongCellType { .. })
        ));
    }
}
