use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::calendar::MonthCalendar;
use crate::datetime::parse_due_date;
use crate::locale::Locale;
use crate::task::Task;
use crate::timer::{TimerSnapshot, format_clock};

const PROGRESS_BAR_WIDTH: usize = 24;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    locale: Locale,
}

impl Renderer {
    pub fn new(color: bool, locale: Locale) -> Self {
        Self { color, locale }
    }

    #[tracing::instrument(skip(self, tasks, tz))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        today: NaiveDate,
        tz: &Tz,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Course".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = task
                .id
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());

            let due_text = task.due.clone().unwrap_or_default();
            let overdue = !task.done
                && task
                    .due
                    .as_deref()
                    .and_then(|raw| parse_due_date(raw, tz))
                    .is_some_and(|date| date < today);
            let due = if overdue {
                self.paint(&due_text, "31")
            } else {
                due_text
            };

            let id = self.paint(&id, "33");
            let course = task.course.clone().unwrap_or_default();

            rows.push(vec![id, due, course, task.title.clone()]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, month))]
    pub fn print_calendar(
        &mut self,
        month: &MonthCalendar,
        selected: Option<u32>,
    ) -> anyhow::Result<()> {
        let text = self.calendar_text(month, selected);
        let mut out = io::stdout().lock();
        write!(out, "{text}")?;
        Ok(())
    }

    /// Month grid as text: label, weekday header, then one line per week.
    /// Today is bracketed, the selected day is painted, and days with due
    /// tasks carry a `•`.
    pub fn calendar_text(&self, month: &MonthCalendar, selected: Option<u32>) -> String {
        let mut text = String::new();
        text.push_str(&format!("{:^35}\n", month.month_label));

        for initial in self.locale.weekday_initials() {
            text.push_str(&format!(" {initial:^3} "));
        }
        text.push('\n');

        for week in month.weeks() {
            for cell in week {
                let Some(day) = cell.day else {
                    text.push_str("     ");
                    continue;
                };
                let marker = if cell.has_marker { "•" } else { " " };
                let (open, close) = if month.today == Some(day) {
                    ("[", "]")
                } else {
                    (" ", " ")
                };
                let body = format!("{open}{day:>2}{marker}{close}");
                if selected == Some(day) {
                    text.push_str(&self.paint(&body, "7"));
                } else {
                    text.push_str(&body);
                }
            }
            text.push('\n');
        }

        text
    }

    #[tracing::instrument(skip(self, month, tasks, tz))]
    pub fn print_day_tasks(
        &mut self,
        month: &MonthCalendar,
        day: u32,
        tasks: &[&Task],
        today: NaiveDate,
        tz: &Tz,
    ) -> anyhow::Result<()> {
        {
            let mut out = io::stdout().lock();
            writeln!(out)?;
            writeln!(
                out,
                "{}. {}",
                day,
                self.locale.month_name(month.month)
            )?;
            if tasks.is_empty() {
                writeln!(out, "{}", self.locale.no_tasks_on_day())?;
                return Ok(());
            }
        }
        self.print_task_table(tasks, today, tz)
    }

    /// Single progress line for the foreground timer.
    pub fn timer_line(&self, snapshot: &TimerSnapshot) -> String {
        let filled = (snapshot.fraction_complete * PROGRESS_BAR_WIDTH as f64).round() as usize;
        let filled = filled.min(PROGRESS_BAR_WIDTH);
        format!(
            "{:<12} [{}{}] {}  {}: {}",
            self.locale.timer_title(snapshot.mode),
            "#".repeat(filled),
            "-".repeat(PROGRESS_BAR_WIDTH - filled),
            format_clock(snapshot.seconds_remaining),
            self.locale.completed_sessions(),
            snapshot.completed_focus_cycles
        )
    }

    pub fn print_timer_line(&mut self, snapshot: &TimerSnapshot) -> anyhow::Result<()> {
        let line = self.timer_line(snapshot);
        let mut out = io::stdout().lock();
        if out.is_terminal() {
            write!(out, "\r{line}")?;
        } else {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
