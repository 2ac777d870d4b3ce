//! Persistent line history: load, cap, append, and rewrite.
//!
//! Mirrors the GNU Readline history calls spec.md §4.6 names
//! (`read_history`/`stifle_history`/`add_history`/`append_history`/
//! `write_history`) as plain file operations, since this crate embeds its
//! own line editor rather than linking Readline.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct History {
    path: PathBuf,
    limit: usize,
    lines: VecDeque<String>,
}

impl History {
    /// Load `path` if it exists (a missing file is not an error), trim to
    /// `limit` most-recent entries, then write the trimmed form back
    /// immediately so a single-record append always has a file to append
    /// to (spec.md §4.6: "Pre-write after load ensures the file exists").
    pub fn load(path: &Path, limit: usize) -> Result<History> {
        let mut lines: VecDeque<String> = match fs::read_to_string(path) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => return Err(e).context("reading history file"),
        };
        while lines.len() > limit {
            lines.pop_front();
        }
        let mut history = History {
            path: path.to_path_buf(),
            limit,
            lines,
        };
        history.rewrite()?;
        Ok(history)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Fetch entry `idx` (0 = oldest), for the editor's recall cursor.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    /// Record `line` in memory and append it to the on-disk file. A failure
    /// here is returned to the caller, which (per spec.md §4.6) logs and
    /// swallows it rather than treating it as fatal.
    pub fn add(&mut self, line: &str) -> Result<()> {
        self.lines.push_back(line.to_string());
        if self.lines.len() > self.limit {
            self.lines.pop_front();
            return self.rewrite().context("rewriting history file after trim");
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("opening history file for append")?;
        writeln!(file, "{line}").context("appending to history file")?;
        Ok(())
    }

    fn rewrite(&self) -> Result<()> {
        let mut contents = String::new();
        for line in &self.lines {
            contents.push_str(line);
            contents.push('\n');
        }
        fs::write(&self.path, contents).context("writing history file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_missing_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".app_history");
        let history = History::load(&path, 500).unwrap();
        assert!(history.is_empty());
        assert!(path.exists(), "pre-write should create the file");
    }

    #[test]
    fn add_appends_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".app_history");
        let mut history = History::load(&path, 500).unwrap();
        history.add("one").unwrap();
        history.add("two").unwrap();
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["one", "two"]);

        let reloaded = History::load(&path, 500).unwrap();
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn caps_to_most_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".app_history");
        let mut history = History::load(&path, 3).unwrap();
        for line in ["a", "b", "c", "d"] {
            history.add(line).unwrap();
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);

        let reloaded = History::load(&path, 3).unwrap();
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["b", "c", "d"]);
    }

    #[test]
    fn load_trims_an_oversized_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".app_history");
        fs::write(&path, "a\nb\nc\nd\ne\n").unwrap();
        let history = History::load(&path, 2).unwrap();
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["d", "e"]);
    }
}
