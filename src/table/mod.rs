//! Reading report tables and writing result tables
//!
//! The format follows the file extension: `.json` holds an array of row
//! objects, `.jsonl`/`.ndjson` one object per line, `.yaml`/`.yml` a sequence
//! of mappings, `.xlsx` the first worksheet with a header row. Input rows need
//! `id` and `report`; other columns are ignored.

mod xlsx;

use crate::extraction::{InputRecord, OutputRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode rows for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("Unsupported table format for {0}. Use .xlsx, .json, .jsonl, .ndjson, .yaml or .yml")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Json,
    JsonLines,
    Yaml,
    Xlsx,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("json") => Ok(TableFormat::Json),
            Some("jsonl") | Some("ndjson") => Ok(TableFormat::JsonLines),
            Some("yaml") | Some("yml") => Ok(TableFormat::Yaml),
            Some("xlsx") => Ok(TableFormat::Xlsx),
            _ => Err(TableError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Json => write!(f, "json"),
            TableFormat::JsonLines => write!(f, "jsonl"),
            TableFormat::Yaml => write!(f, "yaml"),
            TableFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Load input rows in file order
pub fn read_input(path: &Path) -> Result<Vec<InputRecord>, TableError> {
    let format = TableFormat::from_path(path)?;
    let read_err = |source| TableError::Read {
        path: path.to_path_buf(),
        source,
    };

    let decoded = match format {
        TableFormat::Xlsx => {
            let file = fs::File::open(path).map_err(read_err)?;
            xlsx::read_records(BufReader::new(file))
        }
        _ => {
            let content = fs::read_to_string(path).map_err(read_err)?;
            decode_rows(&content, format)
        }
    };
    let records: Vec<InputRecord> = decoded.map_err(|message| TableError::Decode {
        path: path.to_path_buf(),
        message,
    })?;

    info!(
        path = %path.display(),
        format = %format,
        rows = records.len(),
        "Loaded input table"
    );
    Ok(records)
}

fn decode_rows<T: DeserializeOwned>(content: &str, format: TableFormat) -> Result<Vec<T>, String> {
    match format {
        TableFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        TableFormat::Xlsx => Err("xlsx is not a text format".to_string()),
        TableFormat::Yaml => {
            if content.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_yaml::from_str(content).map_err(|e| e.to_string())
        }
        TableFormat::JsonLines => content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| format!("line {}: {}", i + 1, e))
            })
            .collect(),
    }
}

/// Write the output table, creating parent directories as needed
pub fn write_output(path: &Path, records: &[OutputRecord]) -> Result<(), TableError> {
    let format = TableFormat::from_path(path)?;

    let write_err = |source| TableError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    if format == TableFormat::Xlsx {
        xlsx::write_records(path, records)?;
        debug!(path = %path.display(), rows = records.len(), "Wrote output table");
        return Ok(());
    }

    let encoded = encode_rows(records, format).map_err(|message| TableError::Encode {
        path: path.to_path_buf(),
        message,
    })?;

    let file = fs::File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(encoded.as_bytes()).map_err(write_err)?;
    writer.flush().map_err(write_err)?;

    debug!(path = %path.display(), rows = records.len(), "Wrote output table");
    Ok(())
}

fn encode_rows<T: Serialize>(rows: &[T], format: TableFormat) -> Result<String, String> {
    match format {
        TableFormat::Json => serde_json::to_string_pretty(rows)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        TableFormat::Yaml => serde_yaml::to_string(rows).map_err(|e| e.to_string()),
        TableFormat::Xlsx => Err("xlsx is not a text format".to_string()),
        TableFormat::JsonLines => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&serde_json::to_string(row).map_err(|e| e.to_string())?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Classification, ClassificationResult, ExtractionStatus, RecordId};
    use tempfile::TempDir;

    fn output(id: i64, values: [&str; 7]) -> OutputRecord {
        OutputRecord::new(
            InputRecord::new(id, format!("report {}", id)),
            Classification {
                result: ClassificationResult::from(values),
                attempts: 1,
                status: ExtractionStatus::Extracted,
            },
        )
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            TableFormat::from_path(Path::new("a.JSON")).unwrap(),
            TableFormat::Json
        );
        assert_eq!(
            TableFormat::from_path(Path::new("a.ndjson")).unwrap(),
            TableFormat::JsonLines
        );
        assert_eq!(
            TableFormat::from_path(Path::new("a.yml")).unwrap(),
            TableFormat::Yaml
        );
        assert_eq!(
            TableFormat::from_path(Path::new("reports.XLSX")).unwrap(),
            TableFormat::Xlsx
        );
        assert!(matches!(
            TableFormat::from_path(Path::new("reports.csv")),
            Err(TableError::UnsupportedFormat(_))
        ));
        assert!(TableFormat::from_path(Path::new("reports")).is_err());
    }

    #[test]
    fn test_read_json_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.json");
        fs::write(
            &path,
            r#"[{"id": 2, "report": "second"}, {"id": "A1", "report": "first", "site": "x"}]"#,
        )
        .unwrap();

        let records = read_input(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, RecordId::Integer(2));
        assert_eq!(records[1].text, "first");
    }

    #[test]
    fn test_read_jsonl_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        fs::write(
            &path,
            "{\"id\": 1, \"report\": \"a\"}\n\n{\"id\": 2, \"report\": \"b\"}\n",
        )
        .unwrap();

        let records = read_input(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, RecordId::Integer(2));
    }

    #[test]
    fn test_read_jsonl_reports_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        fs::write(&path, "{\"id\": 1, \"report\": \"a\"}\n{broken\n").unwrap();

        let err = read_input(&path).unwrap_err();
        assert!(matches!(err, TableError::Decode { .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_read_yaml_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.yaml");
        fs::write(&path, "- id: 10\n  report: |\n    LAD 30%\n- id: x7\n  report: RCA ok\n")
            .unwrap();

        let records = read_input(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "LAD 30%\n");
        assert_eq!(records[1].id, RecordId::Text("x7".to_string()));
    }

    #[test]
    fn test_missing_report_column_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.json");
        fs::write(&path, r#"[{"id": 1, "text": "wrong column"}]"#).unwrap();
        assert!(matches!(
            read_input(&path),
            Err(TableError::Decode { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_input(&dir.path().join("nope.json")),
            Err(TableError::Read { .. })
        ));
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/results.json");
        let rows = vec![output(1, ["3", "P2", "No", "HRP", "No", "No", "No"])];

        write_output(&path, &rows).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["Final category"], "3/P2/HRP");
        assert_eq!(value[0]["Modifier HRP"], "HRP");
        assert_eq!(value[0]["id"], 1);
    }

    #[test]
    fn test_write_jsonl_and_yaml() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            output(1, ["0", "No", "No", "No", "No", "No", "No"]),
            output(2, ["N", "P1", "No", "No", "S", "No", "No"]),
        ];

        let jsonl = dir.path().join("out.jsonl");
        write_output(&jsonl, &rows).unwrap();
        let text = fs::read_to_string(&jsonl).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().contains("\"Final category\":\"N/P1/S\""));

        let yaml = dir.path().join("out.yaml");
        write_output(&yaml, &rows).unwrap();
        let text = fs::read_to_string(&yaml).unwrap();
        assert!(text.contains("Final category: '0'") || text.contains("Final category: \"0\""));
    }

    #[test]
    fn test_write_unwritable_path_is_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let err = write_output(&blocker.join("out.json"), &[]).unwrap_err();
        assert!(matches!(err, TableError::Write { .. }));
    }
}
