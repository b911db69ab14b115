//! Metadata report: one JSON line per classified book
//!
//! The report is written under a temporary name and renamed into place, so
//! a reader never sees a half-written file.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ScanError;

/// Classification result for one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReportRecord {
    /// Directory name as found on disk
    pub book_title: String,
    pub cleaned_title: String,
    #[serde(rename = "audio_files_found")]
    pub audio_file_count: usize,
    pub cover_art_found: bool,
    pub is_problematic: bool,
}

/// Serialize records as newline-delimited JSON
pub fn to_jsonl(records: &[MetadataReportRecord]) -> String {
    let mut out = String::new();
    for record in records {
        // Plain strings, bools and integers always serialize
        if let Ok(line) = serde_json::to_string(record) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Atomically replace the report at `path` with `records`
pub fn write_report(path: &Path, records: &[MetadataReportRecord]) -> Result<(), ScanError> {
    let report_err = |source| ScanError::Report {
        path: path.to_path_buf(),
        source,
    };

    let temp_path = temp_path_for(path);
    {
        let file = File::create(&temp_path).map_err(report_err)?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(to_jsonl(records).as_bytes())
            .map_err(report_err)?;
        writer
            .into_inner()
            .map_err(|e| report_err(e.into_error()))?
            .sync_all()
            .map_err(report_err)?;
    }

    fs::rename(&temp_path, path).map_err(report_err)?;
    Ok(())
}

#[cfg(test)]
pub fn read_report(path: &Path) -> Result<Vec<MetadataReportRecord>, String> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read report: {}", e))?;
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| format!("Failed to parse report line: {}", e)))
        .collect()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
