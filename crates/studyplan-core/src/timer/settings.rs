use std::time::Duration;

use anyhow::{anyhow, ensure};

use crate::config::Config;

const MIN_TICK_MS: u32 = 50;
const MAX_TICK_MS: u32 = 1_000;

/// Lengths and cadence of the focus cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    pub focus_presets: Vec<u32>,
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles_before_long_break: u32,
    pub tick_interval: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus_presets: vec![25, 30, 45],
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles_before_long_break: 4,
            tick_interval: Duration::from_millis(300),
        }
    }
}

impl TimerSettings {
    #[tracing::instrument(skip(cfg))]
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let focus_presets = cfg
            .get_u32_list("timer.focus.presets")?
            .unwrap_or(defaults.focus_presets);
        let focus_minutes = cfg
            .get_u32("timer.focus.minutes")?
            .unwrap_or(defaults.focus_minutes);
        let short_break_minutes = cfg
            .get_u32("timer.short_break.minutes")?
            .unwrap_or(defaults.short_break_minutes);
        let long_break_minutes = cfg
            .get_u32("timer.long_break.minutes")?
            .unwrap_or(defaults.long_break_minutes);
        let cycles_before_long_break = cfg
            .get_u32("timer.cycles_before_long_break")?
            .unwrap_or(defaults.cycles_before_long_break);
        let tick_ms = cfg.get_u32("timer.tick_ms")?.unwrap_or(300);

        let settings = Self {
            focus_presets,
            focus_minutes,
            short_break_minutes,
            long_break_minutes,
            cycles_before_long_break,
            tick_interval: Duration::from_millis(u64::from(tick_ms)),
        };
        settings.validate()?;

        tracing::debug!(?settings, "resolved timer settings");
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.focus_presets.is_empty(),
            "timer.focus.presets must list at least one duration"
        );
        ensure!(
            self.focus_presets.iter().all(|&m| m > 0),
            "timer.focus.presets entries must be positive"
        );
        self.check_preset(self.focus_minutes)?;
        ensure!(
            self.short_break_minutes > 0 && self.long_break_minutes > 0,
            "break lengths must be positive"
        );
        ensure!(
            self.cycles_before_long_break > 0,
            "timer.cycles_before_long_break must be at least 1"
        );

        let tick_ms = self.tick_interval.as_millis();
        ensure!(
            (u128::from(MIN_TICK_MS)..=u128::from(MAX_TICK_MS)).contains(&tick_ms),
            "timer.tick_ms must be between {MIN_TICK_MS} and {MAX_TICK_MS}, got {tick_ms}"
        );
        Ok(())
    }

    pub fn check_preset(&self, minutes: u32) -> anyhow::Result<()> {
        if self.focus_presets.contains(&minutes) {
            Ok(())
        } else {
            Err(anyhow!(
                "focus length {minutes} min is not one of the presets {:?}",
                self.focus_presets
            ))
        }
    }
}
