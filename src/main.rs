//! with-readline: wraps a child command in a pty, mediating keyboard input
//! through a line editor with history, so the child gets readline-style
//! editing even if it never linked a line-editing library itself.

mod buffer;
mod child;
mod config;
mod editor;
mod error;
mod history;
mod log;
mod mediator;
mod privilege;
mod pty;
mod signalpipe;
mod terminal;

use anyhow::{Context, Result, bail};
use nix::sys::termios::Termios;
use nix::unistd::isatty;
use std::os::unix::process::CommandExt;
use std::panic;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use error::{ExitStyle, fatal_from_anyhow};

static ORIGINAL_TERMIOS: Mutex<Option<Termios>> = Mutex::new(None);
static PANIC_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

fn main() {
    panic::set_hook(Box::new(|info| {
        if let Some(termios) = ORIGINAL_TERMIOS.lock().ok().and_then(|g| g.clone()) {
            struct Stdin;
            impl std::os::fd::AsFd for Stdin {
                fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
                    unsafe { std::os::fd::BorrowedFd::borrow_raw(0) }
                }
            }
            let _ = terminal::restore(&Stdin, &termios);
        }
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        if let Some(path) = PANIC_LOG_PATH.get() {
            log::error(path, "panic", &format!("{message} at {location}"));
        }
        eprintln!("FATAL: internal error at {location}: {message}");
    }));

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => fatal_from_anyhow(e),
    }
}

fn run() -> Result<i32> {
    if let Err(e) = privilege::surrender() {
        error::fatal(ExitStyle::Parent, None, &format!("{e:#}"));
    }

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let action = config::parse(&argv)?;

    let run_args = match action {
        config::Action::Help => {
            println!("{}", config::USAGE);
            return Ok(0);
        }
        config::Action::Version => {
            println!("with-readline {}", env!("CARGO_PKG_VERSION"));
            println!("editor: embedded byte-driven line editor");
            return Ok(0);
        }
        config::Action::Run(run_args) => run_args,
    };

    if !isatty(std::io::stdin()).unwrap_or(false) {
        return run_noninteractive(run_args);
    }

    let home = std::env::var("HOME").context("HOME must be set for an interactive session")?;
    let cfg = config::Config::resolve(run_args, Some(&home))?;

    if let Some(parent) = cfg.history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    PANIC_LOG_PATH.set(cfg.log_path.clone()).ok();

    struct Stdin;
    impl std::os::fd::AsFd for Stdin {
        fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
            unsafe { std::os::fd::BorrowedFd::borrow_raw(0) }
        }
    }
    let original_termios = terminal::capture(&Stdin)?;
    *ORIGINAL_TERMIOS.lock().unwrap() = Some(original_termios.clone());

    let mediator = mediator::Mediator::start(
        &cfg.command,
        &cfg.args,
        cfg.maxhistory,
        &cfg.history_path,
        &cfg.log_path,
        original_termios,
    )?;

    mediator.run()
}

/// spec.md §4.9: when stdin is not a terminal, skip all mediation entirely
/// and exec the target directly, preserving transparent pipeline
/// composition.
fn run_noninteractive(run_args: config::RunArgs) -> Result<i32> {
    let err = std::process::Command::new(&run_args.command)
        .args(&run_args.args)
        .exec();
    bail!("exec {} failed: {err}", run_args.command)
}
