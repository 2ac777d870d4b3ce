//! Termios capture/restore and window-size queries.
//!
//! The mediator needs two termios records on stdin (spec.md §3): the
//! settings exactly as found at startup (`original_termios`, restored on
//! exit), and a reading variant with `VINTR`/`VQUIT` disabled so those
//! bytes reach the event loop as ordinary input instead of being consumed
//! by the host terminal driver as signal generators (invariant 5's
//! forwarding only works if the driver never turns them into signals).

use anyhow::{Context, Result};
use nix::pty::Winsize;
use nix::sys::termios::{
    InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios, tcgetattr, tcsetattr,
};
use std::os::fd::{AsFd, AsRawFd};

pub fn capture<F: AsFd>(fd: &F) -> Result<Termios> {
    tcgetattr(fd).context("tcgetattr failed")
}

pub fn restore<F: AsFd>(fd: &F, termios: &Termios) -> Result<()> {
    tcsetattr(fd, SetArg::TCSANOW, termios).context("tcsetattr (restore) failed")
}

/// Derive the reading termios from `original`: canonical mode and local
/// echo off (the editor echoes and redraws the line itself), `VINTR`/
/// `VQUIT` disabled so Ctrl-C/Ctrl-\ arrive as plain bytes.
pub fn reading_termios(original: &Termios) -> Termios {
    let mut t = original.clone();
    t.local_flags
        .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ECHOK);
    t.input_flags.remove(InputFlags::ICRNL);
    t.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    t.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    t.control_chars[SpecialCharacterIndices::VINTR as usize] = libc::_POSIX_VDISABLE;
    t.control_chars[SpecialCharacterIndices::VQUIT as usize] = libc::_POSIX_VDISABLE;
    t
}

/// A copy of `original` with local echo cleared and nothing else touched,
/// applied to the slave so the child's own terminal driver never
/// double-echoes what the editor already echoed (spec.md §4.7 step 7).
pub fn no_echo_termios(original: &Termios) -> Termios {
    let mut t = original.clone();
    t.local_flags.remove(LocalFlags::ECHO);
    t
}

pub fn window_size<F: AsFd>(fd: &F) -> Result<Winsize> {
    let mut ws: Winsize = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCGWINSZ as libc::c_ulong, &mut ws) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error()).context("TIOCGWINSZ failed");
    }
    if ws.ws_row == 0 || ws.ws_col == 0 {
        ws.ws_row = 24;
        ws.ws_col = 80;
    }
    Ok(ws)
}

pub fn set_window_size<F: AsFd>(fd: &F, ws: &Winsize) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCSWINSZ as libc::c_ulong, ws) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error()).context("TIOCSWINSZ failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::pty::openpty;

    #[test]
    fn reading_termios_disables_intr_and_quit() {
        let pty = openpty(None, None).unwrap();
        let original = capture(&pty.master).unwrap();
        let reading = reading_termios(&original);
        assert_eq!(
            reading.control_chars[SpecialCharacterIndices::VINTR as usize],
            libc::_POSIX_VDISABLE
        );
        assert_eq!(
            reading.control_chars[SpecialCharacterIndices::VQUIT as usize],
            libc::_POSIX_VDISABLE
        );
        assert!(!reading.local_flags.contains(LocalFlags::ICANON));
        assert!(!reading.local_flags.contains(LocalFlags::ECHO));
    }

    #[test]
    fn no_echo_termios_only_clears_echo() {
        let pty = openpty(None, None).unwrap();
        let original = capture(&pty.master).unwrap();
        let quiet = no_echo_termios(&original);
        assert!(!quiet.local_flags.contains(LocalFlags::ECHO));
        assert_eq!(quiet.local_flags.contains(LocalFlags::ICANON), original.local_flags.contains(LocalFlags::ICANON));
    }

    #[test]
    fn window_size_falls_back_when_unset() {
        let pty = openpty(None, None).unwrap();
        let ws = window_size(&pty.master).unwrap();
        assert!(ws.ws_row > 0 && ws.ws_col > 0);
    }
}
