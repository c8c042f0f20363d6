//! Persisted failure evidence.
//!
//! One failure per line, prefixed with a local `YYYY/MM/DD HH:MM:SS` timestamp. The
//! file is shared with external writers (the stderr tap), so replay keeps a line cursor
//! and only hands back lines it has not seen. Lines this process appended are never
//! handed back.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::MonitorError;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

/// One parsed evidence line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Render one evidence line (without the newline).
pub fn format_line(at: DateTime<Utc>, text: &str) -> String {
    let text = text.replace(['\r', '\n'], " ");
    format!("{} {}", at.with_timezone(&Local).format(TIMESTAMP_FORMAT), text.trim())
}

/// Parse one evidence line.
pub fn parse_line(line: &str) -> Result<EvidenceEntry, MonitorError> {
    let stamp = line
        .get(..TIMESTAMP_LEN)
        .ok_or_else(|| MonitorError::SignalParse(format!("evidence line too short: {:?}", line)))?;
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|e| MonitorError::SignalParse(format!("bad evidence timestamp {:?}: {}", stamp, e)))?;
    let at = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| MonitorError::SignalParse(format!("nonexistent local time {:?}", stamp)))?;

    Ok(EvidenceEntry {
        at: at.with_timezone(&Utc),
        text: line[TIMESTAMP_LEN..].trim().to_string(),
    })
}

#[derive(Debug, Default)]
struct ReplayCursor {
    /// Lines before this index have been handed out or skipped.
    consumed: usize,
    /// Line indices at or past `consumed` that this log wrote itself.
    own: BTreeSet<usize>,
}

/// Append-only evidence file with bounded replay.
pub struct EvidenceLog {
    path: PathBuf,
    max_lines: usize,
    window: TimeDelta,
    cursor: Mutex<ReplayCursor>,
}

impl EvidenceLog {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize, window: Duration) -> Self {
        Self {
            path: path.into(),
            max_lines,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            cursor: Mutex::new(ReplayCursor::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a failure line. Lines written here are never replayed by this log.
    pub async fn append(&self, text: &str, at: DateTime<Utc>) -> Result<(), MonitorError> {
        let mut cursor = self.cursor.lock().await;
        let before = self.line_count().await?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", format_line(at, text)).as_bytes())
            .await?;
        file.flush().await?;

        if cursor.consumed >= before {
            cursor.consumed = before + 1;
        } else {
            cursor.own.insert(before);
        }
        Ok(())
    }

    /// Unseen lines from the last `max_lines`, limited to the replay window at `now`.
    pub async fn replay(&self, now: DateTime<Utc>) -> Result<Vec<EvidenceEntry>, MonitorError> {
        let mut cursor = self.cursor.lock().await;
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() < cursor.consumed {
            debug!("Evidence file {} shrank, rescanning", self.path.display());
            *cursor = ReplayCursor::default();
        }

        let unseen: Vec<&str> = lines
            .iter()
            .enumerate()
            .skip(cursor.consumed)
            .filter(|(index, _)| !cursor.own.contains(index))
            .map(|(_, line)| *line)
            .collect();
        let tail = &unseen[unseen.len().saturating_sub(self.max_lines)..];
        cursor.consumed = lines.len();
        let consumed = cursor.consumed;
        cursor.own.retain(|index| *index >= consumed);

        let entries = tail
            .iter()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match parse_line(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping evidence line: {}", e);
                    None
                }
            })
            .filter(|entry| now.signed_duration_since(entry.at) <= self.window)
            .collect();

        Ok(entries)
    }

    async fn line_count(&self) -> Result<usize, MonitorError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
