//! The child supervisor: fork, session setup, controlling-terminal
//! assignment, the slave-permission audit, and exit-status mapping.
//!
//! Uses `std::process::Command::pre_exec` the way the teacher crate's own
//! `pty::Proxy::spawn` sets up `setsid`/`TIOCSCTTY`/`dup2`, extended with
//! the rendezvous pipe and slave-permission audit spec.md §4.7 adds.

use anyhow::{Context, Result, bail};
use nix::pty::Winsize;
use nix::sys::termios::Termios;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{Pid, pipe, read};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use crate::terminal;

/// How the child process ended.
pub enum ExitKind {
    Exited(i32),
    Signaled { signal: i32, core_dumped: bool },
}

pub struct Child {
    inner: std::process::Child,
}

impl Child {
    /// Fork `command`/`args` attached to the pty slave at `slave_path`.
    /// Blocks until the child has opened its slave and passed the
    /// security audit, or returns an error if the child died before then.
    pub fn spawn(
        command: &str,
        args: &[String],
        slave_path: &Path,
        master_fd: RawFd,
        sigpipe_fd: RawFd,
        original_termios: &Termios,
        winsize: &Winsize,
    ) -> Result<Child> {
        let (rendezvous_read, rendezvous_write) =
            pipe().context("creating slave-opened rendezvous pipe")?;
        let rendezvous_write_raw = rendezvous_write.as_raw_fd();
        let rendezvous_read_raw = rendezvous_read.as_raw_fd();

        let slave_path = slave_path.to_path_buf();
        let quiet_termios: libc::termios = terminal::no_echo_termios(original_termios).into();
        let winsize = *winsize;

        let mut cmd = Command::new(command);
        cmd.args(args);
        // SAFETY: the closure only calls functions documented safe to use
        // between fork and exec in a single-threaded process (setsid, open,
        // ioctl, fstat, dup2, close, tcsetattr); the one caveat is
        // `getgrnam` inside the security check, which the original C
        // implementation also calls at this point under the same
        // single-threaded assumption.
        unsafe {
            cmd.pre_exec(move || {
                child_setup(
                    &slave_path,
                    master_fd,
                    sigpipe_fd,
                    rendezvous_read_raw,
                    rendezvous_write_raw,
                    &Termios::from(quiet_termios),
                    &winsize,
                )
            });
        }

        let inner = cmd.spawn().context("spawning child process")?;

        // Parent no longer needs the write end; once the child's copy is
        // also closed (inside child_setup), this read reaches EOF.
        drop(rendezvous_write);
        let mut buf = [0u8; 1];
        loop {
            match read(&rendezvous_read, &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e).context("reading slave-opened rendezvous pipe"),
            }
        }

        Ok(Child { inner })
    }

    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.inner.id() as i32)
    }

    /// Block until the child exits, mapping its status per spec.md §6:
    /// `WIFEXITED` -> that code, `WIFSIGNALED` -> `128 + signum`.
    pub fn wait(self) -> Result<ExitKind> {
        loop {
            match waitpid(self.pid(), None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitKind::Exited(code)),
                Ok(WaitStatus::Signaled(_, sig, core_dumped)) => {
                    return Ok(ExitKind::Signaled {
                        signal: sig as i32,
                        core_dumped,
                    });
                }
                Ok(other) => bail!("unexpected wait status: {other:?}"),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e).context("waitpid failed"),
            }
        }
    }
}

fn child_setup(
    slave_path: &Path,
    master_fd: RawFd,
    sigpipe_fd: RawFd,
    rendezvous_read: RawFd,
    rendezvous_write: RawFd,
    quiet_termios: &Termios,
    winsize: &Winsize,
) -> io::Result<()> {
    unsafe {
        libc::close(master_fd);
        libc::close(sigpipe_fd);
    }

    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }

    let slave_fd = open_slave(slave_path)?;

    assign_controlling_terminal(slave_fd)?;
    check_slave_security(slave_fd)?;

    // Release the parent's rendezvous read() now that the slave is open
    // and audited (spec.md §9: the audit happens here, post-open, so
    // TOCTOU cannot widen the window between allocation and use).
    unsafe {
        libc::close(rendezvous_read);
        libc::close(rendezvous_write);
    }

    for fd in 0..3 {
        if unsafe { libc::dup2(slave_fd, fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    if slave_fd > 2 {
        unsafe {
            libc::close(slave_fd);
        }
    }

    terminal::restore(&OwnedStdin, quiet_termios).map_err(to_io_error)?;
    terminal::set_window_size(&OwnedStdin, winsize).map_err(to_io_error)?;

    Ok(())
}

/// A zero-sized handle for fd 0, used only to satisfy `AsFd` bounds for the
/// termios calls made on the freshly-dup2'd stdin inside the child.
struct OwnedStdin;
impl std::os::fd::AsFd for OwnedStdin {
    fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        unsafe { std::os::fd::BorrowedFd::borrow_raw(0) }
    }
}

fn to_io_error(e: anyhow::Error) -> io::Error {
    io::Error::other(e.to_string())
}

fn open_slave(path: &Path) -> io::Result<RawFd> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

fn assign_controlling_terminal(slave_fd: RawFd) -> io::Result<()> {
    let ret = unsafe { libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// The slave-permission audit (spec.md §4.7 step 4): accept group-write
/// only when the group is `tty`, reject any other group or world access,
/// and require the owner to be the real uid.
fn check_slave_security(slave_fd: RawFd) -> io::Result<()> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(slave_fd, &mut st) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let tty_gid = unsafe {
        let name = std::ffi::CString::new("tty").unwrap();
        let grp = libc::getgrnam(name.as_ptr());
        if grp.is_null() {
            None
        } else {
            Some((*grp).gr_gid)
        }
    };
    let is_tty_group = tty_gid == Some(st.st_gid);
    let modemask: u32 = if is_tty_group { 0o057 } else { 0o077 };
    if (st.st_mode as u32 & modemask) != 0 {
        return Err(io::Error::other("slave terminal has unsafe permissions"));
    }

    let real_uid = unsafe { libc::getuid() };
    if st.st_uid != real_uid {
        return Err(io::Error::other("slave terminal has unexpected owner"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    #[test]
    fn rejects_world_writable_slave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slave");
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        assert!(check_slave_security(file.as_raw_fd()).is_err());
    }

    #[test]
    fn accepts_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slave");
        std::fs::write(&path, b"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let meta = file.metadata().unwrap();
        assert_eq!(meta.uid(), unsafe { libc::getuid() });
        assert!(check_slave_security(file.as_raw_fd()).is_ok());
    }
}
