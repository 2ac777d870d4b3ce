//! Privilege surrender: the one-shot downgrade of effective uid/gid to the
//! real ones, run before any untrusted input (including argv) is
//! processed.
//!
//! Mirrors `original_source/with-readline.c`'s `surrender_privilege`
//! exactly: drop the group id first, then the user id, and treat a
//! successful re-acquisition of the effective id as a sign the drop did
//! not actually take (fatal).

use anyhow::{Result, bail};
use nix::errno::Errno;
use nix::unistd::{Gid, Uid, getegid, geteuid, getgid, getuid, setgid, setuid};

fn setregid(rgid: Gid, egid: Gid) -> nix::Result<()> {
    Errno::result(unsafe { libc::setregid(rgid.into(), egid.into()) }).map(drop)
}

fn setreuid(ruid: Uid, euid: Uid) -> nix::Result<()> {
    Errno::result(unsafe { libc::setreuid(ruid.into(), euid.into()) }).map(drop)
}

pub fn surrender() -> Result<()> {
    let real_gid = getgid();
    let effective_gid = getegid();
    if real_gid != effective_gid {
        setregid(real_gid, real_gid).map_err(|e| anyhow::anyhow!("setregid failed: {e}"))?;
        if setgid(effective_gid).is_ok() {
            bail!("setgid({effective_gid}) unexpectedly succeeded after dropping privilege");
        }
    }

    let real_uid = getuid();
    let effective_uid = geteuid();
    if real_uid != effective_uid {
        setreuid(real_uid, real_uid).map_err(|e| anyhow::anyhow!("setreuid failed: {e}"))?;
        if setuid(effective_uid).is_ok() {
            bail!("setuid({effective_uid}) unexpectedly succeeded after dropping privilege");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_when_real_and_effective_ids_already_match() {
        // Test processes are never set-uid/set-gid, so real == effective
        // and surrender() should be a clean no-op.
        assert_eq!(getuid(), geteuid());
        assert_eq!(getgid(), getegid());
        assert!(surrender().is_ok());
    }

    #[test]
    fn ids_unchanged_by_a_no_op_surrender() {
        let uid_before: Uid = getuid();
        let gid_before: Gid = getgid();
        surrender().unwrap();
        assert_eq!(getuid(), uid_before);
        assert_eq!(getgid(), gid_before);
    }
}
