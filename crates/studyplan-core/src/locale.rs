use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::timer::TimerMode;

/// Display language for month labels, weekday headers and timer titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Norwegian,
    English,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nb" | "no" | "nn" | "nb-no" | "no-no" | "nb_no" | "norwegian" => Ok(Self::Norwegian),
            "en" | "en-us" | "en-gb" | "en_us" | "en_gb" | "english" => Ok(Self::English),
            other => Err(anyhow!("unsupported locale: {other}")),
        }
    }
}

impl Locale {
    /// Lowercase month name as a long-form date formatter would print it.
    pub fn month_name(self, month: u32) -> &'static str {
        let names = match self {
            Locale::Norwegian => [
                "januar",
                "februar",
                "mars",
                "april",
                "mai",
                "juni",
                "juli",
                "august",
                "september",
                "oktober",
                "november",
                "desember",
            ],
            Locale::English => [
                "January",
                "February",
                "March",
                "April",
                "May",
                "June",
                "July",
                "August",
                "September",
                "October",
                "November",
                "December",
            ],
        };
        names[(month as usize).saturating_sub(1) % 12]
    }

    /// "Month Year" with the first letter upper-cased.
    pub fn month_label(self, year: i32, month: u32) -> String {
        capitalize_first(&format!("{} {year}", self.month_name(month)))
    }

    /// One-letter weekday headers, Monday first.
    pub fn weekday_initials(self) -> [&'static str; 7] {
        match self {
            Locale::Norwegian => ["M", "T", "O", "T", "F", "L", "S"],
            Locale::English => ["M", "T", "W", "T", "F", "S", "S"],
        }
    }

    pub fn timer_title(self, mode: TimerMode) -> &'static str {
        match (self, mode) {
            (Locale::Norwegian, TimerMode::Focus) => "FOKUSMODUS",
            (Locale::Norwegian, TimerMode::ShortBreak) => "KORT PAUSE",
            (Locale::Norwegian, TimerMode::LongBreak) => "LANG PAUSE",
            (Locale::English, TimerMode::Focus) => "FOCUS",
            (Locale::English, TimerMode::ShortBreak) => "SHORT BREAK",
            (Locale::English, TimerMode::LongBreak) => "LONG BREAK",
        }
    }

    pub fn no_tasks_on_day(self) -> &'static str {
        match self {
            Locale::Norwegian => "Ingen oppgaver denne dagen",
            Locale::English => "No tasks on this day",
        }
    }

    pub fn completed_sessions(self) -> &'static str {
        match self {
            Locale::Norwegian => "Fullførte fokusøkter",
            Locale::English => "Completed focus sessions",
        }
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
