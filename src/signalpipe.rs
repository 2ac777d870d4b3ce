//! The signal self-pipe.
//!
//! Converts asynchronous signal delivery into a byte stream the event loop
//! can poll alongside stdin and the pty master, following
//! `original_source/with-readline.c`'s `sighandler`/`catch_signal`: the
//! handler does nothing but write the truncated signal number to a pipe,
//! preserving `errno` across the call.

use anyhow::{Context, Result, bail};
use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::unistd::{Pid, pipe, read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

static WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn handler(sig: libc::c_int) {
    let saved_errno = unsafe { *libc::__errno_location() };
    let fd = WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = sig as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
    unsafe {
        *libc::__errno_location() = saved_errno;
    }
}

/// Signals caught unconditionally.
const ALWAYS: &[Signal] = &[Signal::SIGWINCH, Signal::SIGCONT];

/// Signals caught only if not already `SIG_IGN`, so a parent's inherited
/// ignore disposition is respected.
const IF_NOT_IGNORED: &[Signal] = &[
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGIO,
    Signal::SIGPROF,
    Signal::SIGVTALRM,
];

/// Install the handler for `sig`. When `always` is false, first queries the
/// current disposition and leaves `SIG_IGN` alone.
fn catch_signal(sig: Signal, always: bool) -> Result<()> {
    if !always {
        let mut old: libc::sigaction = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::sigaction(sig as libc::c_int, std::ptr::null(), &mut old) };
        if ret != 0 {
            return Err(Errno::last()).context(format!("sigaction query failed for {sig:?}"));
        }
        if old.sa_sigaction == libc::SIG_IGN {
            return Ok(());
        }
    }
    let action = SigAction::new(SigHandler::Handler(handler), SaFlags::SA_RESTART, SigSet::empty());
    unsafe { sigaction(sig, &action) }.with_context(|| format!("sigaction install failed for {sig:?}"))?;
    Ok(())
}

/// The read end of the self-pipe, readable from the event loop.
pub struct SignalPipe {
    read: OwnedFd,
}

impl SignalPipe {
    /// Create the pipe and install every handler spec.md §4.3 requires.
    pub fn install() -> Result<SignalPipe> {
        let (read, write) = pipe().context("creating signal self-pipe")?;
        WRITE_FD.store(write.as_raw_fd(), Ordering::SeqCst);
        // The write end must outlive this function; it is never closed
        // except implicitly at process exit, matching the original's
        // process-lifetime pipe.
        std::mem::forget(write);

        let mut unblock = SigSet::empty();
        for &sig in ALWAYS.iter().chain(IF_NOT_IGNORED) {
            unblock.add(sig);
        }
        unblock.thread_unblock().context("unblocking signals before installing handlers")?;

        for &sig in ALWAYS {
            catch_signal(sig, true)?;
        }
        for &sig in IF_NOT_IGNORED {
            catch_signal(sig, false)?;
        }
        Ok(SignalPipe { read })
    }

    pub fn fd(&self) -> &OwnedFd {
        &self.read
    }

    /// Read one pending signal number, if any byte is available.
    pub fn read_one(&self) -> Result<Option<i32>> {
        let mut buf = [0u8; 1];
        match read(&self.read, &mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0] as i32)),
            Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(e).context("reading signal self-pipe"),
        }
    }
}

/// Restore `sig` to its default disposition, unblock it for this process,
/// and re-raise it at itself — the "fatal-signal restoration dance"
/// (spec.md §9) that lets a shell see the correct `128+signum` exit status
/// while leaving termios already restored by the caller.
pub fn restore_default_and_raise(sig: Signal) -> Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(sig, &default) }.context("resetting signal to default disposition")?;
    let mut set = SigSet::empty();
    set.add(sig);
    set.thread_unblock().context("unblocking signal")?;
    kill(Pid::this(), sig).context("re-raising signal")?;
    bail!("process survived re-raising {sig:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_creates_a_readable_pipe_with_nothing_pending() {
        let sp = SignalPipe::install().unwrap();
        assert!(sp.fd().as_raw_fd() >= 0);
    }

    #[test]
    fn sigwinch_self_raise_is_observed_on_the_pipe() {
        let sp = SignalPipe::install().unwrap();
        kill(Pid::this(), Signal::SIGWINCH).unwrap();
        // the handler runs asynchronously but synchronously enough on the
        // same thread before kill() returns for a self-directed signal.
        let got = sp.read_one().unwrap();
        assert_eq!(got, Some(Signal::SIGWINCH as i32));
    }
}
