//! Spreadsheet tables: first worksheet, header row, one record per row

use super::TableError;
use crate::extraction::{output_columns, InputRecord, OutputRecord, RecordId};
use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::io::{Read, Seek};
use std::path::Path;

/// Largest integer an Excel number cell holds exactly
const MAX_EXACT_NUMBER: f64 = 9_007_199_254_740_992.0;

pub(super) fn read_records<RS: Read + Seek>(reader: RS) -> Result<Vec<InputRecord>, String> {
    let mut workbook = Xlsx::new(reader).map_err(|e| e.to_string())?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| e.to_string())?,
        None => return Err("workbook has no worksheets".to_string()),
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|cell| cell.to_string().trim() == name)
            .ok_or_else(|| format!("missing column `{}`", name))
    };
    let id_col = column("id")?;
    let report_col = column("report")?;

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        // Spreadsheet row number, counting the header as row 1
        let row_number = i + 2;

        let id = row
            .get(id_col)
            .and_then(record_id)
            .ok_or_else(|| format!("row {}: missing id", row_number))?;
        let text = match row.get(report_col) {
            Some(Data::String(s)) => s.clone(),
            Some(Data::Empty) | None => String::new(),
            Some(other) => other.to_string(),
        };

        records.push(InputRecord { id, text });
    }
    Ok(records)
}

fn record_id(cell: &Data) -> Option<RecordId> {
    match cell {
        Data::Empty => None,
        Data::Int(n) => Some(RecordId::Integer(*n)),
        // Excel stores every number as a double; whole values are integer ids.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_NUMBER => {
            Some(RecordId::Integer(*f as i64))
        }
        Data::Float(f) => Some(
            serde_json::Number::from_f64(*f)
                .map(RecordId::Number)
                .unwrap_or_else(|| RecordId::Text(f.to_string())),
        ),
        Data::Bool(b) => Some(RecordId::Bool(*b)),
        Data::String(s) => Some(RecordId::Text(s.clone())),
        other => Some(RecordId::Text(other.to_string())),
    }
}

pub(super) fn write_records(path: &Path, records: &[OutputRecord]) -> Result<(), TableError> {
    let mut workbook = Workbook::new();
    fill_worksheet(workbook.add_worksheet(), records).map_err(|e| TableError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    workbook.save(path).map_err(|e| TableError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })
}

fn fill_worksheet(worksheet: &mut Worksheet, records: &[OutputRecord]) -> Result<(), XlsxError> {
    let bold = Format::new().set_bold();
    for (col, name) in output_columns().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &bold)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = u32::try_from(i + 1).map_err(|_| XlsxError::RowColumnLimitError)?;

        write_id(worksheet, row, &record.id)?;
        worksheet.write_string(row, 1, record.report.as_str())?;
        let mut col: u16 = 2;
        for (_, value) in record.result.iter() {
            worksheet.write_string(row, col, value)?;
            col += 1;
        }
        worksheet.write_string(row, col, record.final_category.as_str())?;
    }
    Ok(())
}

fn write_id(worksheet: &mut Worksheet, row: u32, id: &RecordId) -> Result<(), XlsxError> {
    match id {
        RecordId::Integer(n) if (*n as f64).abs() < MAX_EXACT_NUMBER => {
            worksheet.write_number(row, 0, *n as f64)?;
        }
        RecordId::Number(n) if n.is_f64() => {
            worksheet.write_number(row, 0, n.as_f64().unwrap_or_default())?;
        }
        RecordId::Bool(b) => {
            worksheet.write_boolean(row, 0, *b)?;
        }
        RecordId::Text(s) => {
            worksheet.write_string(row, 0, s.as_str())?;
        }
        other => {
            worksheet.write_string(row, 0, other.to_string().as_str())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_from_cells() {
        assert_eq!(record_id(&Data::Float(1001.0)), Some(RecordId::Integer(1001)));
        assert_eq!(record_id(&Data::Int(7)), Some(RecordId::Integer(7)));
        assert_eq!(
            record_id(&Data::String("CT-9".to_string())),
            Some(RecordId::Text("CT-9".to_string()))
        );
        assert_eq!(record_id(&Data::Bool(false)), Some(RecordId::Bool(false)));
        assert_eq!(record_id(&Data::Empty), None);

        let fractional = record_id(&Data::Float(12.5)).unwrap();
        assert!(matches!(fractional, RecordId::Number(_)));
        assert_eq!(fractional.to_string(), "12.5");
    }
}
