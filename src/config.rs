//! Command-line parsing and the resolved run configuration.
//!
//! Parsed by hand, the way `original_source/with-readline.c` uses
//! `getopt_long` and the teacher crate carries no CLI-parsing dependency of
//! its own: option parsing stops at `--` or the first non-option argument,
//! whichever comes first (the original's leading `+` to `getopt_long`).

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage:
  with-readline [OPTIONS] -- COMMAND ARGS...
Options:
  -a, --application NAME   Set editor application name
  -H, --history N          Maximum history entries to retain
  -h, --help                Display this message
  -V, --version             Display version number";

/// What `main` should do, decided purely from argv.
pub enum Action {
    Help,
    Version,
    Run(RunArgs),
}

/// The raw, unresolved command-line request: a command to run, plus the
/// options that override environment-derived defaults.
pub struct RunArgs {
    pub application: Option<String>,
    pub history: Option<u64>,
    pub command: String,
    pub args: Vec<String>,
}

/// Parse `argv` (excluding argv[0]). Unknown options are fatal (returned as
/// an `Err`, per spec.md §6: "Unknown option -> fatal, exit non-zero").
pub fn parse(argv: &[String]) -> Result<Action> {
    let mut i = 0;
    let mut application = None;
    let mut history = None;

    while i < argv.len() {
        let arg = argv[i].as_str();
        if arg == "--" {
            i += 1;
            break;
        }
        if !arg.starts_with('-') || arg == "-" {
            break;
        }
        match arg {
            "-h" | "--help" => return Ok(Action::Help),
            "-V" | "--version" => return Ok(Action::Version),
            "-a" | "--application" => {
                i += 1;
                let v = argv.get(i).context("--application requires a value")?;
                application = Some(v.clone());
            }
            "-H" | "--history" => {
                i += 1;
                let v = argv.get(i).context("--history requires a value")?;
                history = Some(
                    v.parse::<u64>()
                        .with_context(|| format!("not a valid integer '{v}'"))?,
                );
            }
            other => bail!("invalid option '{other}'"),
        }
        i += 1;
    }

    if i >= argv.len() {
        bail!("no command specified");
    }
    let command = argv[i].clone();
    let args = argv[i + 1..].to_vec();

    Ok(Action::Run(RunArgs {
        application,
        history,
        command,
        args,
    }))
}

/// The fully-resolved configuration for a run: CLI overrides merged with
/// environment defaults, as SPEC_FULL.md §4.10 describes.
pub struct Config {
    pub app: String,
    pub command: String,
    pub args: Vec<String>,
    pub maxhistory: u64,
    pub history_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    /// Resolve a [`RunArgs`] against the environment. `home` is passed in
    /// (rather than read directly) so the fatal-if-unset check on the
    /// interactive path, and the tests below, can both control it precisely.
    pub fn resolve(run: RunArgs, home: Option<&str>) -> Result<Config> {
        let app = run.application.unwrap_or_else(|| basename(&run.command));

        let maxhistory = match run.history {
            Some(n) => n,
            None => match std::env::var("HISTFILESIZE") {
                Ok(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("not a valid integer '{v}'"))?,
                Err(_) => 500,
            },
        };

        let (history_path, log_path) = match home {
            Some(home) => (
                PathBuf::from(home).join(format!(".{app}_history")),
                PathBuf::from(home).join(format!(".{app}_history.log")),
            ),
            None => (
                PathBuf::from(format!(".{app}_history")),
                PathBuf::from(format!(".{app}_history.log")),
            ),
        };

        Ok(Config {
            app,
            command: run.command,
            args: run.args,
            maxhistory,
            history_path,
            log_path,
        })
    }
}

/// The basename of a path-like string: `/usr/bin/foo` -> `foo`.
fn basename(s: &str) -> String {
    s.rsplit('/').next().unwrap_or(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_double_dash() {
        let argv = vec!["-a".into(), "x".into(), "--".into(), "cat".into(), "-n".into()];
        match parse(&argv).unwrap() {
            Action::Run(r) => {
                assert_eq!(r.application.as_deref(), Some("x"));
                assert_eq!(r.command, "cat");
                assert_eq!(r.args, vec!["-n".to_string()]);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn stops_at_first_non_option() {
        let argv = vec!["cat".into(), "-a".into(), "ignored".into()];
        match parse(&argv).unwrap() {
            Action::Run(r) => {
                assert_eq!(r.command, "cat");
                assert_eq!(r.args, vec!["-a".to_string(), "ignored".to_string()]);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert!(matches!(parse(&["-h".into()]).unwrap(), Action::Help));
        assert!(matches!(parse(&["--version".into()]).unwrap(), Action::Version));
    }

    #[test]
    fn unknown_option_is_an_error() {
        assert!(parse(&["--bogus".into()]).is_err());
    }

    #[test]
    fn no_command_is_an_error() {
        assert!(parse(&["-a".into(), "foo".into()]).is_err());
    }

    #[test]
    fn history_override_beats_environment() {
        let run = RunArgs {
            application: Some("myapp".into()),
            history: Some(7),
            command: "/bin/cat".into(),
            args: vec![],
        };
        let cfg = Config::resolve(run, Some("/home/x")).unwrap();
        assert_eq!(cfg.maxhistory, 7);
        assert_eq!(cfg.app, "myapp");
        assert_eq!(cfg.history_path, PathBuf::from("/home/x/.myapp_history"));
    }

    #[test]
    fn app_name_defaults_to_basename_of_command() {
        let run = RunArgs {
            application: None,
            history: None,
            command: "/usr/local/bin/bash".into(),
            args: vec![],
        };
        let cfg = Config::resolve(run, Some("/home/x")).unwrap();
        assert_eq!(cfg.app, "bash");
    }
}
