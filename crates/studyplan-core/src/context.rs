use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::calendar::CalendarBuilder;
use crate::config::Config;
use crate::datetime::local_date;
use crate::locale::Locale;
use crate::timer::TimerSettings;

/// Per-run settings, resolved once and handed to every command.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub timezone: Tz,
    pub locale: Locale,
    pub color: bool,
    pub now: DateTime<Utc>,
}

impl AppContext {
    pub fn new(config: Config, timezone: Tz, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let locale = config.locale()?;
        let color = config.get_bool("color")?.unwrap_or(true);

        Ok(Self {
            config,
            timezone,
            locale,
            color,
            now,
        })
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.now, &self.timezone)
    }

    pub fn calendar(&self) -> CalendarBuilder {
        CalendarBuilder::new(self.timezone, self.locale)
    }

    pub fn timer_settings(&self) -> anyhow::Result<TimerSettings> {
        TimerSettings::from_config(&self.config)
    }

    pub fn default_command(&self) -> String {
        self.config
            .get("default.command")
            .unwrap_or_else(|| "calendar".to_string())
    }
}
