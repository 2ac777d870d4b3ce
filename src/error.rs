//! The fatal-error funnel.
//!
//! Mirrors `original_source/util.c`'s `fatal()`: render `FATAL: <msg>`,
//! optionally append `: <strerror> (<errno>)`, then terminate through an
//! injected exit function. The exit function differs between parent and
//! child so that cleanup paths set up by one side (editor state, history)
//! never re-run in the other.

use nix::errno::Errno;

/// How a fatal error should terminate the process.
#[derive(Clone, Copy)]
pub enum ExitStyle {
    /// Parent process: run through the normal `exit(2)` path.
    Parent,
    /// Forked child, pre-exec: `_exit(2)` directly, skipping anything the
    /// parent registered (atexit handlers, the editor's cleanup, etc).
    Child,
}

/// Print `FATAL: <msg>` (with an optional `: <strerror> (<errno>)` suffix)
/// to stderr and terminate the process. Never returns.
pub fn fatal(style: ExitStyle, errno: Option<Errno>, msg: &str) -> ! {
    match errno {
        Some(e) => eprintln!("FATAL: {msg}: {e} ({})", e as i32),
        None => eprintln!("FATAL: {msg}"),
    }
    match style {
        ExitStyle::Parent => std::process::exit(1),
        ExitStyle::Child => {
            // SAFETY: _exit is async-signal-safe; no other thread runs here.
            unsafe { libc::_exit(1) }
        }
    }
}

/// Convert a bubbled-up [`anyhow::Error`] into the same `FATAL: ...`
/// wording used by [`fatal`], so every fatal exit renders identically
/// regardless of which layer detected the problem.
pub fn fatal_from_anyhow(err: anyhow::Error) -> ! {
    eprintln!("FATAL: {err:#}");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    // `fatal` terminates the process, so it cannot be exercised directly in
    // a unit test; the formatting it shares with `fatal_from_anyhow` is
    // covered indirectly by integration-level CLI behavior (spec.md §7).
}
