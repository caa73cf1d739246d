pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod datastore;
pub mod datetime;
pub mod locale;
pub mod render;
pub mod task;
pub mod timer;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use crate::context::AppContext;

/// Entry point for the `studyplan`
/// binary.
///
/// Settings are layered rc file, then
/// `--rc`, then positional `rc.` words.
/// Timezone and locale are fixed here
/// for the whole run.
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let (args, positional_rc) =
    cli::split_rc_args(raw_args);
  let cli = cli::GlobalCli::parse_from(args);
  cli::init_tracing(cli.log_level())?;

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .chain(positional_rc)
  );

  let ctx = AppContext::new(
    cfg,
    datetime::resolve_project_timezone(),
    Utc::now()
  )
  .context("invalid settings")?;
  info!(
    timezone = %ctx.timezone,
    locale = ?ctx.locale,
    today = %ctx.today(),
    "studyplan run context"
  );

  let data_dir =
    config::resolve_data_dir(
      &ctx.config,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let inv = cli::Invocation::parse(
    &ctx.default_command(),
    cli.rest
  );
  let mut renderer = render::Renderer::new(
    ctx.color,
    ctx.locale
  );

  commands::dispatch(
    &ctx,
    &data_dir,
    &mut renderer,
    inv
  )
}
