//! Persisted send state
//!
//! The only persistence strategy is replaying the append-only logs on
//! startup: the sent log yields the set of recipients already delivered to,
//! the failed log yields the permanently excluded set. Both logs are
//! single-writer and never compacted.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::info;

use crate::{Error, Result};

/// Phone numbers embedded in log lines: optional `+`, 10-15 digits.
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\d{10,15}").expect("valid identifier regex"));

/// Marker for delivered recipients in the sent log.
pub const SUCCESS_MARKER: &str = "SUCCESS";

/// Extract recipient identifiers from log text.
///
/// Only lines containing `marker` are considered; an empty marker keeps
/// every line. The first identifier-shaped token per line wins.
pub fn parse_identifiers(log_text: &str, marker: &str) -> HashSet<String> {
    log_text
        .lines()
        .filter(|line| line.contains(marker))
        .filter_map(|line| IDENTIFIER_RE.find(line))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// In-memory send state backed by the two append-only logs.
#[derive(Debug)]
pub struct SendState {
    sent_log: PathBuf,
    failed_log: PathBuf,
    sent: HashSet<String>,
    excluded: HashSet<String>,
}

impl SendState {
    /// Load state by replaying both logs, creating them if missing.
    pub fn load(sent_log: impl Into<PathBuf>, failed_log: impl Into<PathBuf>) -> Result<Self> {
        let sent_log = sent_log.into();
        let failed_log = failed_log.into();

        let sent = parse_identifiers(&read_or_create(&sent_log)?, SUCCESS_MARKER);
        let excluded = parse_identifiers(&read_or_create(&failed_log)?, "");

        info!(
            sent = sent.len(),
            excluded = excluded.len(),
            "Loaded send state from logs"
        );

        Ok(Self {
            sent_log,
            failed_log,
            sent,
            excluded,
        })
    }

    /// Recompute the pending queue from the recipient file, preserving
    /// file order and skipping blank lines and known identifiers.
    pub fn pending(&self, numbers_file: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(numbers_file)
            .map_err(|_| Error::NumbersFileMissing(numbers_file.display().to_string()))?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !self.sent.contains(*line))
            .filter(|line| !self.excluded.contains(*line))
            .map(str::to_string)
            .collect())
    }

    /// Record a delivered recipient: append to the sent log and remember it.
    pub fn record_success(&mut self, number: &str) -> Result<()> {
        self.append(&self.sent_log, &format!("SUCCESS: {}", number))?;
        self.sent.insert(number.to_string());
        Ok(())
    }

    /// Record a send failure. Failed recipients are permanently excluded.
    pub fn record_failure(&mut self, number: &str, reason: &str) -> Result<()> {
        self.append(&self.failed_log, &format!("FAILED: {} - {}", number, reason))?;
        self.excluded.insert(number.to_string());
        Ok(())
    }

    /// Record an invalid recipient (validation said no, or validation broke).
    pub fn record_invalid(&mut self, number: &str, reason: &str) -> Result<()> {
        self.append(&self.failed_log, &format!("INVALID: {} - {}", number, reason))?;
        self.excluded.insert(number.to_string());
        Ok(())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_sent(&self, number: &str) -> bool {
        self.sent.contains(number)
    }

    pub fn is_excluded(&self, number: &str) -> bool {
        self.excluded.contains(number)
    }

    fn append(&self, path: &Path, entry: &str) -> Result<()> {
        let line = format!("[{}] {}\n", Utc::now().to_rfc3339(), entry);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

fn read_or_create(path: &Path) -> Result<String> {
    if path.exists() {
        Ok(fs::read_to_string(path)?)
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, "")?;
        Ok(String::new())
    }
}
