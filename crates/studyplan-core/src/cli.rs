use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "studyplan",
    version,
    about = "Study planner: task calendar and focus timer",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    /// More log output; repeat for debug and trace.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output.
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Override an rc setting for this run.
    #[arg(long = "rc", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub rc_overrides: Vec<(String, String)>,

    #[arg(long = "rc-file", value_name = "PATH")]
    pub rc_file: Option<PathBuf>,

    /// Directory holding tasks.data.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

impl GlobalCli {
    /// Default filter when `RUST_LOG` is unset; `-v` and `-q` cancel out.
    pub fn log_level(&self) -> &'static str {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=-2 => "error",
            -1 | 0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already installed");
    }
    Ok(())
}

/// Separates positional `rc.key=value` / `rc.key:value` words from the
/// arguments clap should see. The program name is never treated as one.
pub fn split_rc_args(raw: Vec<OsString>) -> (Vec<OsString>, Vec<(String, String)>) {
    let mut args = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    for (idx, arg) in raw.into_iter().enumerate() {
        match rc_assignment(&arg) {
            Some(pair) if idx > 0 => overrides.push(pair),
            _ => args.push(arg),
        }
    }

    (args, overrides)
}

fn rc_assignment(arg: &OsString) -> Option<(String, String)> {
    let body = arg.to_str()?.strip_prefix("rc.")?;
    let split = body.find(['=', ':'])?;
    let (key, value) = (&body[..split], &body[split + 1..]);
    (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// The first word names the command when it is a unique prefix of one;
    /// otherwise every word goes to `default_command`, so `studyplan -1`
    /// shows last month.
    pub fn parse(default_command: &str, rest: Vec<OsString>) -> Self {
        let mut words: Vec<String> = rest
            .into_iter()
            .map(|word| word.to_string_lossy().into_owned())
            .collect();

        let known = known_command_names();
        let named = words
            .first()
            .and_then(|first| expand_command_abbrev(first, &known))
            .map(str::to_string);

        let command = match named {
            Some(command) => {
                words.remove(0);
                command
            }
            None => default_command.to_string(),
        };

        debug!(%command, args = ?words, "resolved invocation");
        Self {
            command,
            args: words,
        }
    }
}
