//! Durable form of the audit ledger and the trace link set.
//!
//! Audit events are journalled as JSON lines, one event per line,
//! appended in commit order and never rewritten. Trace links are
//! snapshotted whole to a JSON document, since links are few and can be
//! hard-deleted.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::domain::{AuditEvent, TraceLink};

/// Errors that can occur when reading journalled state.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// An I/O error occurred.
    #[error("failed to read journal")]
    Io(#[from] io::Error),
    /// A journal line or snapshot could not be parsed.
    #[error("failed to parse journal entry")]
    Json(#[from] serde_json::Error),
}

/// Appends events to the journal file, one JSON line per event.
///
/// Creates the file if it does not exist. Events already in the file are
/// never touched.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written to.
pub fn append_events(path: &Path, events: &[AuditEvent]) -> Result<(), JournalError> {
    if events.is_empty() {
        return Ok(());
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the whole journal back, in insertion order.
///
/// A missing file is an empty journal.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line cannot be
/// parsed.
pub fn load_events(path: &Path) -> Result<Vec<AuditEvent>, JournalError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

/// Snapshots the full trace link set to a JSON document.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_links(path: &Path, links: &[&TraceLink]) -> Result<(), JournalError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &links)?;
    writer.flush()?;
    Ok(())
}

/// Reads the trace link snapshot back.
///
/// A missing file is an empty link set.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_links(path: &Path) -> Result<Vec<TraceLink>, JournalError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{Actor, AuditLog, AuditPayload, RecordType};

    fn actor() -> Actor {
        Actor::new("a", "a@example.com", "A")
    }

    fn events(n: usize) -> Vec<AuditEvent> {
        let mut log = AuditLog::new();
        for i in 0..n {
            log.append(
                Utc::now(),
                actor(),
                RecordType::UserRequirement,
                format!("UR-{}", i + 1).parse().unwrap(),
                AuditPayload::Created {
                    title: format!("Requirement {i}"),
                },
            );
        }
        log.iter().cloned().collect()
    }

    #[test]
    fn append_is_cumulative_across_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit.jsonl");

        let all = events(3);
        append_events(&path, &all[..2]).unwrap();
        append_events(&path, &all[2..]).unwrap();

        assert_eq!(load_events(&path).unwrap(), all);
    }

    #[test]
    fn missing_journal_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_events(&tmp.path().join("missing.jsonl"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_line_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("audit.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        assert!(matches!(
            load_events(&path).unwrap_err(),
            JournalError::Json(_)
        ));
    }
}
