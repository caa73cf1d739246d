use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::context::AppContext;
use crate::datastore::DataStore;
use crate::datetime::{DUE_DATE_FORMAT, parse_due_date, parse_due_expr};
use crate::render::Renderer;
use crate::task::{Task, TaskPatch};
use crate::timer::{FocusTimer, TimerRunner};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "done", "undone", "modify", "delete", "calendar", "timer", "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Runs one command. The task file under `data_dir` is only opened by
/// commands that read or write tasks.
#[instrument(skip(ctx, data_dir, renderer, inv), fields(command = %inv.command))]
pub fn dispatch(
    ctx: &AppContext,
    data_dir: &Path,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(args = ?inv.args, "dispatching command");
    let open_store = || DataStore::open(data_dir);
    let args = inv.args.as_slice();

    match inv.command.as_str() {
        "add" => cmd_add(ctx, &open_store()?, args),
        "list" => cmd_list(ctx, &open_store()?, renderer),
        "done" => cmd_set_done(ctx, &open_store()?, args, true),
        "undone" => cmd_set_done(ctx, &open_store()?, args, false),
        "modify" => cmd_modify(ctx, &open_store()?, args),
        "delete" => cmd_delete(&open_store()?, args),
        "calendar" => cmd_calendar(ctx, &open_store()?, renderer, args),
        "timer" => cmd_timer(ctx, renderer, args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Reads title words and `due:`/`course:` modifiers. An empty modifier
/// value (`due:`) clears the field; words after `--` are always title.
fn parse_task_words(args: &[String], now: DateTime<Utc>, tz: &Tz) -> anyhow::Result<TaskPatch> {
    let mut patch = TaskPatch::default();
    let mut title_parts = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" && !literal {
            literal = true;
            continue;
        }

        if !literal {
            if let Some(raw) = arg.strip_prefix("due:") {
                patch.due = Some(if raw.trim().is_empty() {
                    None
                } else {
                    let date = parse_due_expr(raw, now, tz)?;
                    Some(date.format(DUE_DATE_FORMAT).to_string())
                });
                continue;
            }
            if let Some(raw) = arg.strip_prefix("course:") {
                let raw = raw.trim();
                patch.course = Some((!raw.is_empty()).then(|| raw.to_string()));
                continue;
            }
        }

        title_parts.push(arg.as_str());
    }

    if !title_parts.is_empty() {
        patch.title = Some(title_parts.join(" "));
    }
    Ok(patch)
}

fn parse_task_id<'a>(command: &str, args: &'a [String]) -> anyhow::Result<(u64, &'a [String])> {
    let (raw, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("{command}: task id is required"))?;
    let id = raw
        .parse::<u64>()
        .with_context(|| format!("{command}: invalid task id: {raw}"))?;
    Ok((id, rest))
}

#[instrument(skip_all)]
fn cmd_add(ctx: &AppContext, store: &DataStore, args: &[String]) -> anyhow::Result<()> {
    let mut patch = parse_task_words(args, ctx.now, &ctx.timezone)?;
    let title = patch
        .title
        .take()
        .ok_or_else(|| anyhow!("add: title is required"))?;

    let tasks = store.load_tasks()?;
    let id = store.next_id(&tasks)?;
    let mut task = Task::new(title, ctx.now, id);
    patch.apply(&mut task, ctx.now);

    info!(id, due = ?task.due, "adding task");
    store.add_task(tasks, task)?;
    println!("Created task {id}.");
    Ok(())
}

#[instrument(skip_all)]
fn cmd_list(ctx: &AppContext, store: &DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    let tasks = store.load_tasks()?;
    let mut open: Vec<&Task> = tasks.iter().filter(|task| !task.done).collect();
    open.sort_by_key(|task| {
        let due = task
            .due
            .as_deref()
            .and_then(|raw| parse_due_date(raw, &ctx.timezone));
        (due.is_none(), due, task.id.unwrap_or(u64::MAX))
    });

    info!(total = tasks.len(), open = open.len(), "listing tasks");
    renderer.print_task_table(&open, ctx.today(), &ctx.timezone)
}

#[instrument(skip(ctx, store, args))]
fn cmd_set_done(
    ctx: &AppContext,
    store: &DataStore,
    args: &[String],
    done: bool,
) -> anyhow::Result<()> {
    let command = if done { "done" } else { "undone" };
    let (id, _) = parse_task_id(command, args)?;

    let task = store.set_done(id, done, ctx.now)?;
    if done {
        println!("Completed task {id} '{}'.", task.title);
    } else {
        println!("Reopened task {id} '{}'.", task.title);
    }
    Ok(())
}

#[instrument(skip_all)]
fn cmd_modify(ctx: &AppContext, store: &DataStore, args: &[String]) -> anyhow::Result<()> {
    let (id, rest) = parse_task_id("modify", args)?;
    let patch = parse_task_words(rest, ctx.now, &ctx.timezone)?;

    let task = store.update_task(id, patch, ctx.now)?;
    println!("Modified task {id} '{}'.", task.title);
    Ok(())
}

#[instrument(skip_all)]
fn cmd_delete(store: &DataStore, args: &[String]) -> anyhow::Result<()> {
    let (id, _) = parse_task_id("delete", args)?;
    let task = store.delete_task(id)?;
    println!("Deleted task {id} '{}'.", task.title);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct CalendarArgs {
    offset: i32,
    select: Option<u32>,
    json: bool,
}

fn parse_calendar_args(args: &[String]) -> anyhow::Result<CalendarArgs> {
    let mut parsed = CalendarArgs::default();
    for arg in args {
        if arg == "--json" {
            parsed.json = true;
        } else if let Some(raw) = arg.strip_prefix("select:") {
            let day = raw
                .parse::<u32>()
                .with_context(|| format!("calendar: invalid day: {raw}"))?;
            parsed.select = Some(day);
        } else if let Ok(offset) = arg.trim_start_matches('+').parse::<i32>() {
            parsed.offset = offset;
        } else {
            return Err(anyhow!("calendar: unexpected argument: {arg}"));
        }
    }
    Ok(parsed)
}

#[instrument(skip_all)]
fn cmd_calendar(
    ctx: &AppContext,
    store: &DataStore,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let args = parse_calendar_args(args)?;
    let tasks = store.load_tasks()?;
    let builder = ctx.calendar();
    let month = builder.build(args.offset, &tasks, ctx.now);

    let selected = args.select.and_then(|day| {
        let valid = month.select(day);
        if valid.is_none() {
            warn!(day, month = month.month, "selected day is not in this month");
        }
        valid
    });

    if args.json {
        let json = serde_json::to_string_pretty(&month)?;
        println!("{json}");
        return Ok(());
    }

    renderer.print_calendar(&month, selected)?;
    if let Some(day) = selected {
        let due = builder.items_due_on(&month, day, &tasks);
        renderer.print_day_tasks(&month, day, &due, ctx.today(), &ctx.timezone)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerArgs {
    focus_minutes: Option<u32>,
    segments: u32,
}

fn parse_timer_args(args: &[String]) -> anyhow::Result<TimerArgs> {
    let mut parsed = TimerArgs {
        focus_minutes: None,
        segments: 1,
    };
    for arg in args {
        if let Some(raw) = arg.strip_prefix("focus:") {
            parsed.focus_minutes = Some(
                raw.parse()
                    .with_context(|| format!("timer: invalid focus length: {raw}"))?,
            );
        } else if let Some(raw) = arg.strip_prefix("segments:") {
            parsed.segments = raw
                .parse()
                .with_context(|| format!("timer: invalid segment count: {raw}"))?;
        } else {
            return Err(anyhow!("timer: unexpected argument: {arg}"));
        }
    }
    Ok(parsed)
}

#[instrument(skip_all)]
fn cmd_timer(ctx: &AppContext, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let args = parse_timer_args(args)?;
    let settings = ctx.timer_settings()?;
    let tick_interval = settings.tick_interval;

    let mut timer = FocusTimer::new(settings);
    if let Some(minutes) = args.focus_minutes {
        timer.select_focus_minutes(minutes)?;
    }

    let mut runner = TimerRunner::system(tick_interval);
    runner.run(&mut timer, args.segments, |snapshot, transition| {
        renderer.print_timer_line(snapshot)?;
        if transition.is_some() {
            let mut out = io::stdout().lock();
            writeln!(out)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: studyplan [-v|-q] [--rc KEY=VALUE] [--rc-file PATH] [--data DIR] <command> [args]\n\n\
         commands:\n  \
         add <title...> [due:DATE] [course:NAME]            add a task\n  \
         list                                               open tasks by due date\n  \
         done <id> | undone <id>                            mark a task done or open again\n  \
         modify <id> [title...] [due:DATE] [course:NAME]    change a task; `due:` alone clears\n  \
         delete <id>                                        remove a task\n  \
         calendar [OFFSET] [select:DAY] [--json]            month grid with due markers\n  \
         timer [focus:MIN] [segments:N]                     run the focus timer\n  \
         help | version"
    );
    Ok(())
}
