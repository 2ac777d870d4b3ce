//! Pseudo-terminal allocation.
//!
//! Implements the Unix98 path spec.md §4.2 describes directly:
//! `posix_openpt`, then the grant/unlock rituals, then `ptsname` for the
//! slave's path. The BSD pty-pair variant `original_source/pty-bsd.c`
//! implements is noted in DESIGN.md as a historical alternative this crate
//! does not target.

use anyhow::{Context, Result};
use nix::fcntl::OFlag;
use nix::pty::{PtyMaster, grantpt, posix_openpt, ptsname_r, unlockpt};
use std::path::PathBuf;

pub struct Pty {
    pub master: PtyMaster,
    pub slave_path: PathBuf,
}

/// Allocate a pty pair, returning the master descriptor and the slave's
/// path. No slave fd is held here; the child opens it by path after
/// `setsid()` so that opening the slave is what grants it a controlling
/// terminal (spec.md §4.7 step 3).
pub fn allocate() -> Result<Pty> {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).context("posix_openpt failed")?;
    grantpt(&master).context("grantpt failed")?;
    unlockpt(&master).context("unlockpt failed")?;
    let slave_path = ptsname_r(&master).context("ptsname failed")?;
    Ok(Pty {
        master,
        slave_path: PathBuf::from(slave_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_yields_a_usable_master_and_slave_path() {
        let pty = allocate().unwrap();
        assert!(pty.slave_path.to_string_lossy().starts_with("/dev/"));
    }
}
