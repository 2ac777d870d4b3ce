//! The mediator event loop: the single-threaded, poll-driven coordinator
//! that ties every other component together.
//!
//! Startup sequence, per-source dispatch rules, and ordering guarantees
//! follow spec.md §4.5 exactly; `poll` realizes the conceptual `select`
//! loop (SPEC_FULL.md §4.5), and the line editor is the byte-driven
//! adapter from `editor.rs` rather than a synchronous `readline` callback.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::pty::PtyMaster;
use nix::sys::termios::{SpecialCharacterIndices, Termios};
use nix::unistd::{read, write};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::Path;

use crate::buffer::Buffer;
use crate::child::{Child, ExitKind};
use crate::editor::{Editor, Feed};
use crate::history::History;
use crate::log;
use crate::pty;
use crate::signalpipe::{self, SignalPipe};
use crate::terminal;

struct Stdin;
impl AsFd for Stdin {
    fn as_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(0) }
    }
}
struct Stdout;
impl AsFd for Stdout {
    fn as_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(1) }
    }
}

pub struct Mediator {
    master: Option<PtyMaster>,
    sigpipe: SignalPipe,
    editor: Editor<File>,
    child: Child,
    relay: Buffer,
    line: Buffer,
    editor_armed: bool,
    original_termios: Termios,
    argv0: String,
    log_path: std::path::PathBuf,
}

impl Mediator {
    /// Run spec.md §4.5's startup sequence (steps 1-6) and return a
    /// `Mediator` ready for `run()` to drive the main loop.
    pub fn start(
        command: &str,
        args: &[String],
        maxhistory: u64,
        history_path: &Path,
        log_path: &Path,
        original_termios: Termios,
    ) -> Result<Mediator> {
        log::info(log_path, "startup", "allocating pty");
        let pty = pty::allocate()?;

        let history = History::load(history_path, maxhistory as usize)
            .with_context(|| format!("loading history from {}", history_path.display()))?;

        let sigpipe = SignalPipe::install().context("installing signal self-pipe")?;

        let winsize = terminal::window_size(&Stdin)?;

        let child = Child::spawn(
            command,
            args,
            &pty.slave_path,
            pty.master.as_raw_fd(),
            sigpipe.fd().as_raw_fd(),
            &original_termios,
            &winsize,
        )
        .context("spawning child")?;
        log::info(log_path, "startup", &format!("child pid {} forked", child.pid()));

        let echo_out = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .context("opening /dev/tty for prompt echo")?;

        let reading = terminal::reading_termios(&original_termios);
        terminal::restore(&Stdin, &reading).context("applying reading termios to stdin")?;

        let editor = Editor::new(echo_out, history);

        Ok(Mediator {
            master: Some(pty.master),
            sigpipe,
            editor,
            child,
            relay: Buffer::new(),
            line: Buffer::new(),
            editor_armed: false,
            original_termios,
            argv0: command.to_string(),
            log_path: log_path.to_path_buf(),
        })
    }

    /// Drive the event loop until the master closes, then restore termios,
    /// wait for the child, and return the process exit code (spec.md §6).
    pub fn run(mut self) -> Result<i32> {
        while self.master.is_some() {
            self.step()?;
        }

        terminal::restore(&Stdin, &self.original_termios).context("restoring original termios")?;

        let code = match self.child.wait().context("waiting for child")? {
            ExitKind::Exited(code) => code,
            ExitKind::Signaled { signal, core_dumped } => {
                let desc = signal_description(signal);
                let suffix = if core_dumped { " (core dumped)" } else { "" };
                eprintln!("{}: {desc}{suffix}", self.argv0);
                128 + signal
            }
        };
        log::info(&self.log_path, "shutdown", &format!("exit code {code}"));
        Ok(code)
    }

    /// The master's raw descriptor, read out as a plain integer so callers
    /// never hold a borrow of `self` across the `&mut self` calls that
    /// follow (a `BorrowedFd` built from this value borrows nothing).
    fn master_raw_fd(&self) -> Result<i32> {
        Ok(self
            .master
            .as_ref()
            .context("pty master already closed")?
            .as_raw_fd())
    }

    fn step(&mut self) -> Result<()> {
        let stdin_fd = unsafe { BorrowedFd::borrow_raw(0) };
        let master_fd = unsafe { BorrowedFd::borrow_raw(self.master_raw_fd()?) };
        let sigpipe_fd = unsafe { BorrowedFd::borrow_raw(self.sigpipe.fd().as_raw_fd()) };
        let mut fds = [
            PollFd::new(stdin_fd, PollFlags::POLLIN),
            PollFd::new(master_fd, PollFlags::POLLIN),
            PollFd::new(sigpipe_fd, PollFlags::POLLIN),
        ];

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(()),
            Err(e) => return Err(e).context("poll failed"),
        }

        let stdin_ready = fds[0]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP));
        let master_ready = fds[1]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP));
        let sigpipe_ready = fds[2].revents().is_some_and(|r| r.contains(PollFlags::POLLIN));

        if stdin_ready {
            self.handle_stdin()?;
        }
        if self.master.is_some() && master_ready {
            self.handle_master()?;
        }
        if self.master.is_some() && sigpipe_ready {
            self.handle_signal()?;
        }
        Ok(())
    }

    fn handle_stdin(&mut self) -> Result<()> {
        let mut buf = [0u8; 1];
        match read(&Stdin, &mut buf) {
            Ok(0) => {
                self.master = None;
                return Ok(());
            }
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(()),
            Err(e) => return Err(e).context("reading stdin"),
        }
        let byte = buf[0];

        let intr = self.original_termios.control_chars[SpecialCharacterIndices::VINTR as usize];
        let quit = self.original_termios.control_chars[SpecialCharacterIndices::VQUIT as usize];
        if byte == intr || byte == quit {
            self.write_master(&[byte])?;
            return Ok(());
        }

        if !self.editor_armed {
            let prompt = self.line.take();
            self.editor.arm(&prompt)?;
            self.editor_armed = true;
        }

        match self.editor.feed_byte(byte)? {
            Feed::Continue => {}
            Feed::Eof => {
                let veof = self.original_termios.control_chars[SpecialCharacterIndices::VEOF as usize];
                self.write_master(&[veof])?;
                self.editor_armed = false;
            }
            Feed::Line(line) => {
                if !line.is_empty() {
                    if let Err(e) = self.editor.history_mut().add(&line) {
                        log::warn(&self.log_path, "history", &format!("append failed: {e:#}"));
                    }
                }
                self.write_master(line.as_bytes())?;
                self.write_master(b"\r")?;
                self.editor_armed = false;
            }
        }
        Ok(())
    }

    fn handle_master(&mut self) -> Result<()> {
        let master_fd = unsafe { BorrowedFd::borrow_raw(self.master_raw_fd()?) };
        let mut buf = [0u8; 4096];
        match read(master_fd, &mut buf) {
            Ok(0) => {
                self.master = None;
                return Ok(());
            }
            Ok(n) => {
                self.relay.append(&buf[..n])?;
                self.relay.drain_to_fd(&Stdout)?;
                match buf[..n].iter().rposition(|&b| b == b'\n') {
                    Some(pos) => {
                        self.line.clear();
                        self.line.append(&buf[n.min(pos + 1)..n])?;
                    }
                    None => self.line.append(&buf[..n])?,
                }
                Ok(())
            }
            Err(Errno::EIO) => {
                self.master = None;
                Ok(())
            }
            Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(e).context("reading pty master"),
        }
    }

    fn handle_signal(&mut self) -> Result<()> {
        let Some(sig) = self.sigpipe.read_one()? else {
            return Ok(());
        };
        let Ok(signal) = nix::sys::signal::Signal::try_from(sig) else {
            return Ok(());
        };

        match signal {
            nix::sys::signal::Signal::SIGWINCH => self.resize()?,
            nix::sys::signal::Signal::SIGCONT => {
                let reading = terminal::reading_termios(&self.original_termios);
                terminal::restore(&Stdin, &reading).context("reapplying reading termios after SIGCONT")?;
                self.resize()?;
            }
            other => {
                terminal::restore(&Stdin, &self.original_termios)
                    .context("restoring termios before fatal signal")?;
                signalpipe::restore_default_and_raise(other)?;
            }
        }
        Ok(())
    }

    fn resize(&mut self) -> Result<()> {
        let ws = terminal::window_size(&Stdin)?;
        let master_fd = unsafe { BorrowedFd::borrow_raw(self.master_raw_fd()?) };
        terminal::set_window_size(&master_fd, &ws)?;
        self.editor.resize()?;
        Ok(())
    }

    fn write_master(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let master_fd = unsafe { BorrowedFd::borrow_raw(self.master_raw_fd()?) };
        match write(master_fd, bytes) {
            Ok(_) => Ok(()),
            Err(Errno::EINTR) => self.write_master(bytes),
            Err(e) => Err(e).context("error writing to pty master"),
        }
    }
}

fn signal_description(sig: i32) -> String {
    let ptr = unsafe { libc::strsignal(sig) };
    if ptr.is_null() {
        return format!("Signal {sig}");
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_description_names_common_signals() {
        assert_eq!(signal_description(libc::SIGSEGV), "Segmentation fault");
    }
}
