//! Structured JSONL logging for mediator lifecycle events.
//!
//! A session occupies the controlling terminal, so stderr is not available
//! for diagnostics once the editor is armed; every lifecycle event instead
//! goes to a log file next to the history file, one JSON object per line,
//! in the same shape the teacher crate's own file logger uses.

use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Serialize)]
struct LogEntry<'a> {
    ts: String,
    level: &'a str,
    event: &'a str,
    message: &'a str,
}

fn write_entry(path: &Path, level: &str, event: &str, message: &str) {
    let entry = LogEntry {
        ts: Utc::now().to_rfc3339(),
        level,
        event,
        message,
    };
    let Ok(line) = serde_json::to_string(&entry) else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{line}");
    }
}

pub fn info(path: &Path, event: &str, message: &str) {
    write_entry(path, "info", event, message);
}

pub fn warn(path: &Path, event: &str, message: &str) {
    write_entry(path, "warn", event, message);
}

pub fn error(path: &Path, event: &str, message: &str) {
    write_entry(path, "error", event, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    #[test]
    fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        info(&path, "startup", "pty allocated");
        warn(&path, "history", "append failed");

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<_> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["level"], "info");
        assert_eq!(first["event"], "startup");
        assert_eq!(first["message"], "pty allocated");
    }
}
