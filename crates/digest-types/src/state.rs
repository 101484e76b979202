//! Pipeline state and its JSON state file.
//!
//! The state records every chunk summary of a run, in chunk order, plus a
//! cursor and the time of the last save. The whole state is the unit of
//! persistence: saving overwrites the file, loading replaces the state.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::DigestError;

/// Accumulated chunk summaries of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    summaries: Vec<String>,
    /// Position marker kept for resumable runs; never advanced by a run
    cursor: usize,
    last_updated: DateTime<Utc>,
}

/// On-disk form of [`PipelineState`].
///
/// `last_summary` duplicates the final entry of `summaries` for humans
/// reading the file and is ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub summaries: Vec<String>,
    pub current_position: usize,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub last_summary: Option<String>,
}

/// What a loaded state file said about the previous session.
#[derive(Debug, Clone, Default)]
pub struct RestoredSession {
    /// Parsed `last_updated`, if present and readable
    pub last_updated: Option<DateTime<Utc>>,
    /// `last_updated` exactly as written in the file
    pub raw_last_updated: Option<String>,
    /// `last_summary` as written in the file
    pub last_summary: Option<String>,
}

impl PipelineState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            summaries: Vec::new(),
            cursor: 0,
            last_updated: Utc::now(),
        }
    }

    /// Append the summary of the next chunk.
    pub fn push_summary(&mut self, summary: String) {
        self.summaries.push(summary);
    }

    pub fn summaries(&self) -> &[String] {
        &self.summaries
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Most recent summary, if any.
    pub fn last_summary(&self) -> Option<&str> {
        self.summaries.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Snapshot the state in its on-disk form.
    pub fn to_state_file(&self) -> StateFile {
        StateFile {
            summaries: self.summaries.clone(),
            current_position: self.cursor,
            last_updated: Some(self.last_updated.to_rfc3339()),
            last_summary: self.last_summary().map(str::to_string),
        }
    }

    /// Rebuild a state from its on-disk form.
    pub fn from_state_file(file: StateFile) -> (Self, RestoredSession) {
        let parsed = file.last_updated.as_deref().and_then(parse_timestamp);
        let session = RestoredSession {
            last_updated: parsed,
            raw_last_updated: file.last_updated,
            last_summary: file.last_summary,
        };
        let state = Self {
            summaries: file.summaries,
            cursor: file.current_position,
            last_updated: parsed.unwrap_or_else(Utc::now),
        };
        (state, session)
    }

    /// Stamp the state with the current time and overwrite `path` with it.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), DigestError> {
        let path = path.as_ref();
        self.last_updated = Utc::now();

        let json = serde_json::to_string_pretty(&self.to_state_file())?;
        std::fs::write(path, json)
            .map_err(|e| DigestError::Persistence(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            summaries = self.summaries.len(),
            "State saved"
        );
        Ok(())
    }

    /// Read a state file.
    ///
    /// `summaries` and `current_position` are required; a file missing
    /// either is rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, RestoredSession), DigestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DigestError::Persistence(format!("{}: {}", path.display(), e)))?;

        let file: StateFile = serde_json::from_str(&contents).map_err(|e| {
            DigestError::Persistence(format!("{}: invalid state file: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            summaries = file.summaries.len(),
            current_position = file.current_position,
            "State file parsed"
        );

        Ok(Self::from_state_file(file))
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn state_with(summaries: &[&str]) -> PipelineState {
        let mut state = PipelineState::new();
        for s in summaries {
            state.push_summary(s.to_string());
        }
        state
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = PipelineState::new();
        assert!(state.is_empty());
        assert_eq!(state.cursor(), 0);
        assert!(state.last_summary().is_none());
    }

    #[test]
    fn test_push_keeps_order() {
        let state = state_with(&["first", "second", "first"]);
        assert_eq!(state.summaries(), &["first", "second", "first"]);
        assert_eq!(state.last_summary(), Some("first"));
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = state_with(&["S1", "S2"]);
        let before = state.last_updated();
        state.save(&path).unwrap();
        assert!(state.last_updated() >= before);

        let (loaded, session) = PipelineState::load(&path).unwrap();
        assert_eq!(loaded.summaries(), state.summaries());
        assert_eq!(loaded.cursor(), state.cursor());
        assert_eq!(session.last_summary.as_deref(), Some("S2"));
        assert!(session.last_updated.is_some());
    }

    #[test]
    fn test_saved_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = PipelineState::new();
        state.save(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summaries"], serde_json::json!([]));
        assert_eq!(value["current_position"], 0);
        assert!(value["last_updated"].is_string());
        assert!(value["last_summary"].is_null());
    }

    #[test]
    fn test_load_without_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"summaries": ["a"], "current_position": 4}"#).unwrap();

        let (state, session) = PipelineState::load(&path).unwrap();
        assert_eq!(state.summaries(), &["a"]);
        assert_eq!(state.cursor(), 4);
        assert!(session.raw_last_updated.is_none());
        assert!(session.last_summary.is_none());
    }

    #[test]
    fn test_load_missing_required_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        std::fs::write(&path, r#"{"current_position": 0}"#).unwrap();
        let err = PipelineState::load(&path).unwrap_err();
        assert!(matches!(err, DigestError::Persistence(_)));
        assert!(err.to_string().contains("summaries"));

        std::fs::write(&path, r#"{"summaries": []}"#).unwrap();
        let err = PipelineState::load(&path).unwrap_err();
        assert!(err.to_string().contains("current_position"));
    }

    #[test]
    fn test_load_malformed_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PipelineState::load(&path),
            Err(DigestError::Persistence(_))
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            PipelineState::load(&missing),
            Err(DigestError::Persistence(_))
        ));
    }

    #[test]
    fn test_save_to_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("state.json");

        let mut state = state_with(&["kept"]);
        assert!(matches!(state.save(&path), Err(DigestError::Persistence(_))));
        assert_eq!(state.summaries(), &["kept"]);
    }

    #[test]
    fn test_parse_naive_timestamp() {
        let ts = parse_timestamp("2024-03-05T14:30:15.123456").unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.day(), 5);
        assert_eq!(ts.hour(), 14);

        assert!(parse_timestamp("2024-03-05T14:30:15+02:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
