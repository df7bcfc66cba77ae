use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::task::FuzzResult;
use crate::errors::StorageError;

/// One fuzz result as it appears in the report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub payload: String,
    pub status: Option<u16>,
    pub text_excerpt: String,
    pub error_detected: bool,
    pub error_pattern: Option<String>,
}

impl From<&FuzzResult> for ReportEntry {
    fn from(result: &FuzzResult) -> Self {
        Self {
            payload: result.payload.clone(),
            status: result.status_code,
            text_excerpt: result.body_excerpt.clone(),
            error_detected: result.error_detected(),
            error_pattern: result.error_pattern.clone(),
        }
    }
}

/// The artifact of one run: results grouped by originating endpoint, in
/// endpoint order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub base_url: String,
    pub timestamp: u64,
    pub results: Vec<Vec<ReportEntry>>,
}

impl Report {
    pub fn from_groups(base_url: &str, timestamp: u64, groups: &[Vec<FuzzResult>]) -> Self {
        Self {
            base_url: base_url.to_string(),
            timestamp,
            results: groups
                .iter()
                .map(|group| group.iter().map(ReportEntry::from).collect())
                .collect(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.results.iter().map(Vec::len).sum()
    }

    pub fn findings(&self) -> impl Iterator<Item = &ReportEntry> {
        self.results.iter().flatten().filter(|e| e.error_detected)
    }
}

/// Writes reports into a directory as `report_<timestamp>.json`.
///
/// Reports are write-once. The JSON goes to a temporary file in the target
/// directory first and is then linked into place without clobbering; a
/// second report in the same second gets a `_<n>` suffix.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, report: &Report) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec_pretty(report)?;
        let write_err = |source| StorageError::Write {
            path: self.dir.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        let mut suffix = 0u32;
        loop {
            let path = self.dir.join(report_file_name(report.timestamp, suffix));
            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    info!("Report written to {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    tmp = e.file;
                    suffix += 1;
                }
                Err(e) => {
                    return Err(StorageError::Persist {
                        path,
                        source: e.error,
                    })
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Report, StorageError> {
        let data = fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn report_file_name(timestamp: u64, suffix: u32) -> String {
    if suffix == 0 {
        format!("report_{}.json", timestamp)
    } else {
        format!("report_{}_{}.json", timestamp, suffix)
    }
}
