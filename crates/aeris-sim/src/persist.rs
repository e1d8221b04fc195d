//! CSV checkpoints of measure records.
//!
//! One column per measure, one row per record, cells rendered in
//! scientific notation at three decimal places. Scalar cells hold a
//! bare number; series and
//! matrix cells hold a bracketed list and are quoted so their commas
//! survive the CSV framing. Measures fill at different rates, so short
//! columns are padded with empty cells and skipped again on load.

use std::fs;
use std::path::Path;

use crate::error::SimulationError;
use crate::measure::{Measure, Record};

/// Write every measure's records to `path`, creating parent directories
/// as needed.
pub fn save_csv(path: &Path, measures: &[Measure]) -> Result<(), SimulationError> {
    let io_err = |source| SimulationError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let mut out = String::new();
    let header: Vec<String> = measures.iter().map(|m| quote_cell(m.name())).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    let rows = measures.iter().map(Measure::len).max().unwrap_or(0);
    for row in 0..rows {
        let cells: Vec<String> = measures
            .iter()
            .map(|m| match m.records().get(row) {
                Some(record) => quote_cell(&render(record)),
                None => String::new(),
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    fs::write(path, out).map_err(io_err)
}

/// Read a checkpoint back as named record columns.
pub fn load_csv(path: &Path) -> Result<Vec<(String, Vec<Record>)>, SimulationError> {
    let text = fs::read_to_string(path).map_err(|source| SimulationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |reason: String| SimulationError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| parse_err("missing header line".into()))?;
    let names = split_csv_line(header);
    let mut columns: Vec<(String, Vec<Record>)> =
        names.into_iter().map(|name| (name, Vec::new())).collect();
    for (number, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let cells = split_csv_line(line);
        if cells.len() > columns.len() {
            return Err(parse_err(format!(
                "line {}: {} cells for {} columns",
                number + 2,
                cells.len(),
                columns.len()
            )));
        }
        for (cell, (name, records)) in cells.iter().zip(columns.iter_mut()) {
            if cell.is_empty() {
                continue;
            }
            let record = serde_json::from_str::<Record>(cell).map_err(|e| {
                parse_err(format!("line {}, column {:?}: {e}", number + 2, name))
            })?;
            records.push(record);
        }
    }
    Ok(columns)
}

/// Hand loaded columns back to their measures, matched by name. Columns
/// with no matching measure are dropped.
pub fn restore(measures: &mut [Measure], columns: &[(String, Vec<Record>)]) {
    for measure in measures {
        if let Some((_, records)) = columns.iter().find(|(name, _)| name == measure.name()) {
            measure.set_records(records.clone());
        }
    }
}

fn render(record: &Record) -> String {
    match record {
        Record::Scalar(v) => format!("{v:.3e}"),
        Record::Series(values) => format!("[{}]", join(values)),
        Record::Matrix(rows) => {
            let rows: Vec<String> = rows.iter().map(|row| format!("[{}]", join(row))).collect();
            format!("[{}]", rows.join(", "))
        }
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.3e}"))
        .collect::<Vec<String>>()
        .join(", ")
}

fn quote_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' => quoted = true,
            ',' if !quoted => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_render_at_three_decimals() {
        assert_eq!(render(&Record::Scalar(0.0123)), "1.230e-2");
        assert_eq!(render(&Record::Scalar(-2.0)), "-2.000e0");
        assert_eq!(
            render(&Record::Series(vec![1.0, 0.5])),
            "[1.000e0, 5.000e-1]"
        );
        assert_eq!(
            render(&Record::Matrix(vec![vec![1.0], vec![2.0]])),
            "[[1.000e0], [2.000e0]]"
        );
    }

    #[test]
    fn quoting_protects_embedded_commas_and_quotes() {
        assert_eq!(quote_cell("plain"), "plain");
        assert_eq!(quote_cell("[1, 2]"), "\"[1, 2]\"");
        assert_eq!(quote_cell("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn split_undoes_quoting() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a,,c"), vec!["a", "", "c"]);
        assert_eq!(
            split_csv_line("\"[1, 2]\",3"),
            vec!["[1, 2]".to_string(), "3".to_string()]
        );
        assert_eq!(
            split_csv_line("\"a\"\"b\",x"),
            vec!["a\"b".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn rendered_cells_parse_back_to_their_record() {
        let records = [
            Record::Scalar(0.5),
            Record::Series(vec![1.0, -2.5]),
            Record::Matrix(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
        ];
        for record in &records {
            let line = quote_cell(&render(record));
            let cells = split_csv_line(&line);
            assert_eq!(cells.len(), 1);
            let parsed: Record = serde_json::from_str(&cells[0]).unwrap();
            assert_eq!(&parsed, record);
        }
    }
}
