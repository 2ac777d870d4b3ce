//! The byte-driven line editor.
//!
//! spec.md §9 licenses inverting GNU Readline's synchronous `getc`-callback
//! model into a byte-driven one: the mediator hands bytes to
//! [`Editor::feed_byte`] as they arrive from stdin, instead of `readline()`
//! nesting back into the event loop. Editing surface, history recall and
//! echo behavior are otherwise the same readline offers.

use anyhow::Result;
use std::io::Write;

use crate::history::History;

/// The result of feeding one byte to the editor.
pub enum Feed {
    /// The line is still being edited.
    Continue,
    /// Enter was pressed; the completed line (history not yet recorded).
    Line(String),
    /// Ctrl-D on an empty line.
    Eof,
}

enum EscState {
    None,
    Esc,
    Bracket,
}

/// A single-line editor with cursor motion, kill commands and history
/// recall, echoing every change to `echo` (the controlling terminal,
/// opened separately since the slave's local echo is deliberately
/// disabled — see the child supervisor's termios setup).
pub struct Editor<W: Write> {
    echo: W,
    prompt: Vec<u8>,
    buf: Vec<u8>,
    cursor: usize,
    history: History,
    hist_index: Option<usize>,
    saved_line: Vec<u8>,
    esc_state: EscState,
}

impl<W: Write> Editor<W> {
    pub fn new(echo: W, history: History) -> Self {
        Editor {
            echo,
            prompt: Vec::new(),
            buf: Vec::new(),
            cursor: 0,
            history,
            hist_index: None,
            saved_line: Vec::new(),
            esc_state: EscState::None,
        }
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Arm the editor with `prompt`: clear the line buffer, forget any
    /// in-progress history recall, and echo the prompt. Equivalent to
    /// `replace_line("", 1)` + `set_already_prompted(true)` +
    /// `readline(prompt)` in the synchronous model.
    pub fn arm(&mut self, prompt: &[u8]) -> Result<()> {
        self.prompt = prompt.to_vec();
        self.buf.clear();
        self.cursor = 0;
        self.hist_index = None;
        self.esc_state = EscState::None;
        self.echo.write_all(&self.prompt)?;
        self.echo.flush()?;
        Ok(())
    }

    /// Redraw the current prompt and line, for a terminal resize.
    pub fn resize(&mut self) -> Result<()> {
        self.redraw()
    }

    /// Feed one raw byte from stdin into the editor.
    pub fn feed_byte(&mut self, b: u8) -> Result<Feed> {
        match self.esc_state {
            EscState::None => {}
            EscState::Esc => {
                self.esc_state = if b == b'[' {
                    EscState::Bracket
                } else {
                    EscState::None
                };
                return Ok(Feed::Continue);
            }
            EscState::Bracket => {
                self.esc_state = EscState::None;
                match b {
                    b'A' => self.recall_up()?,
                    b'B' => self.recall_down()?,
                    b'C' => {
                        if self.cursor < self.buf.len() {
                            self.cursor += 1;
                            self.redraw()?;
                        }
                    }
                    b'D' => {
                        if self.cursor > 0 {
                            self.cursor -= 1;
                            self.redraw()?;
                        }
                    }
                    _ => {}
                }
                return Ok(Feed::Continue);
            }
        }

        match b {
            b'\r' | b'\n' => {
                let line = String::from_utf8_lossy(&self.buf).into_owned();
                self.echo.write_all(b"\r\n")?;
                self.echo.flush()?;
                self.buf.clear();
                self.cursor = 0;
                self.hist_index = None;
                return Ok(Feed::Line(line));
            }
            0x04 => {
                // Ctrl-D: EOF on an empty line, delete-forward otherwise.
                if self.buf.is_empty() {
                    return Ok(Feed::Eof);
                }
                if self.cursor < self.buf.len() {
                    self.buf.remove(self.cursor);
                    self.redraw()?;
                }
            }
            0x7f | 0x08 => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.buf.remove(self.cursor);
                    self.redraw()?;
                }
            }
            0x01 => {
                self.cursor = 0;
                self.redraw()?;
            }
            0x05 => {
                self.cursor = self.buf.len();
                self.redraw()?;
            }
            0x02 => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.redraw()?;
                }
            }
            0x06 => {
                if self.cursor < self.buf.len() {
                    self.cursor += 1;
                    self.redraw()?;
                }
            }
            0x15 => {
                self.buf.drain(0..self.cursor);
                self.cursor = 0;
                self.redraw()?;
            }
            0x0b => {
                self.buf.truncate(self.cursor);
                self.redraw()?;
            }
            0x17 => {
                self.kill_prev_word()?;
            }
            0x1b => {
                self.esc_state = EscState::Esc;
            }
            _ if b >= 0x20 && b != 0x7f => {
                self.buf.insert(self.cursor, b);
                self.cursor += 1;
                self.redraw()?;
            }
            _ => {}
        }
        Ok(Feed::Continue)
    }

    fn kill_prev_word(&mut self) -> Result<()> {
        let mut i = self.cursor;
        while i > 0 && self.buf[i - 1] == b' ' {
            i -= 1;
        }
        while i > 0 && self.buf[i - 1] != b' ' {
            i -= 1;
        }
        self.buf.drain(i..self.cursor);
        self.cursor = i;
        self.redraw()
    }

    fn recall_up(&mut self) -> Result<()> {
        if self.history.is_empty() {
            return Ok(());
        }
        let idx = match self.hist_index {
            None => {
                self.saved_line = self.buf.clone();
                self.history.len() - 1
            }
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.hist_index = Some(idx);
        self.load_history_entry(idx);
        self.redraw()
    }

    fn recall_down(&mut self) -> Result<()> {
        match self.hist_index {
            None => return Ok(()),
            Some(i) if i + 1 < self.history.len() => {
                self.hist_index = Some(i + 1);
                self.load_history_entry(i + 1);
            }
            Some(_) => {
                self.hist_index = None;
                self.buf = std::mem::take(&mut self.saved_line);
                self.cursor = self.buf.len();
            }
        }
        self.redraw()
    }

    fn load_history_entry(&mut self, idx: usize) {
        if let Some(line) = self.history.get(idx) {
            self.buf = line.as_bytes().to_vec();
            self.cursor = self.buf.len();
        }
    }

    /// Rewrite the current line in place: return to column 0, reprint
    /// prompt + buffer, erase to end of line, then back the cursor up to
    /// its logical position.
    fn redraw(&mut self) -> Result<()> {
        let mut out = Vec::with_capacity(self.prompt.len() + self.buf.len() + 8);
        out.push(b'\r');
        out.extend_from_slice(&self.prompt);
        out.extend_from_slice(&self.buf);
        out.extend_from_slice(b"\x1b[K");
        for _ in 0..(self.buf.len() - self.cursor) {
            out.push(0x08);
        }
        self.echo.write_all(&out)?;
        self.echo.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_with_history(lines: &[&str]) -> (Editor<Vec<u8>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::load(&dir.path().join(".app_history"), 500).unwrap();
        for line in lines {
            history.add(line).unwrap();
        }
        (Editor::new(Vec::new(), history), dir)
    }

    fn feed_str(editor: &mut Editor<Vec<u8>>, s: &str) -> Feed {
        let mut last = Feed::Continue;
        for b in s.bytes() {
            last = editor.feed_byte(b).unwrap();
        }
        last
    }

    #[test]
    fn typing_then_enter_yields_line() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"> ").unwrap();
        let feed = feed_str(&mut editor, "hello\r");
        assert!(matches!(feed, Feed::Line(ref s) if s == "hello"));
    }

    #[test]
    fn ctrl_d_on_empty_line_is_eof() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"> ").unwrap();
        assert!(matches!(editor.feed_byte(0x04).unwrap(), Feed::Eof));
    }

    #[test]
    fn ctrl_d_on_nonempty_line_deletes_forward_not_eof() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"> ").unwrap();
        feed_str(&mut editor, "ab");
        editor.feed_byte(0x01).unwrap(); // Ctrl-A, cursor to start
        assert!(matches!(editor.feed_byte(0x04).unwrap(), Feed::Continue));
        let feed = feed_str(&mut editor, "\r");
        assert!(matches!(feed, Feed::Line(ref s) if s == "b"));
    }

    #[test]
    fn backspace_removes_preceding_byte() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"> ").unwrap();
        feed_str(&mut editor, "abc");
        editor.feed_byte(0x7f).unwrap();
        let feed = feed_str(&mut editor, "\r");
        assert!(matches!(feed, Feed::Line(ref s) if s == "ab"));
    }

    #[test]
    fn ctrl_u_kills_to_start_of_line() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"> ").unwrap();
        feed_str(&mut editor, "abcdef");
        editor.feed_byte(0x15).unwrap();
        let feed = feed_str(&mut editor, "\r");
        assert!(matches!(feed, Feed::Line(ref s) if s.is_empty()));
    }

    #[test]
    fn up_arrow_recalls_most_recent_history_entry() {
        let (mut editor, _dir) = editor_with_history(&["first", "second"]);
        editor.arm(b"> ").unwrap();
        for b in [0x1b, b'[', b'A'] {
            editor.feed_byte(b).unwrap();
        }
        let feed = feed_str(&mut editor, "\r");
        assert!(matches!(feed, Feed::Line(ref s) if s == "second"));
    }

    #[test]
    fn down_arrow_past_newest_restores_in_progress_line() {
        let (mut editor, _dir) = editor_with_history(&["first"]);
        editor.arm(b"> ").unwrap();
        feed_str(&mut editor, "typing");
        for b in [0x1b, b'[', b'A'] {
            editor.feed_byte(b).unwrap();
        }
        for b in [0x1b, b'[', b'B'] {
            editor.feed_byte(b).unwrap();
        }
        let feed = feed_str(&mut editor, "\r");
        assert!(matches!(feed, Feed::Line(ref s) if s == "typing"));
    }

    #[test]
    fn arm_echoes_prompt() {
        let (mut editor, _dir) = editor_with_history(&[]);
        editor.arm(b"app> ").unwrap();
        assert_eq!(editor.echo, b"app> ");
    }
}
