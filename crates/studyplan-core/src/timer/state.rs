use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::TimerSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerProgress {
    pub fraction_complete: f64,
    pub seconds_remaining: u64,
}

/// Read-only view handed to whatever draws the timer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub is_running: bool,
    pub seconds_remaining: u64,
    pub fraction_complete: f64,
    pub completed_focus_cycles: u32,
    pub focus_minutes: u32,
}

/// A completed segment and the one that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: TimerMode,
    pub to: TimerMode,
    pub completed_focus_cycles: u32,
}

/// Focus/break countdown driven by wall-clock deadlines.
///
/// Remaining time is always `ends_at - now`, so a host that stops calling
/// [`FocusTimer::tick`] for a while (suspended app, sleeping laptop) sees the
/// correct state on the next call. A deadline missed by more than one
/// segment still produces a single transition; the following segment starts
/// at the time of that `tick`.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    settings: TimerSettings,
    mode: TimerMode,
    is_running: bool,
    started_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    /// Remaining time captured by `pause`, consumed by `resume`.
    paused_remaining_ms: Option<i64>,
    completed_focus_cycles: u32,
    focus_minutes: u32,
}

impl FocusTimer {
    pub fn new(settings: TimerSettings) -> Self {
        let focus_minutes = settings.focus_minutes;
        Self {
            settings,
            mode: TimerMode::Focus,
            is_running: false,
            started_at: None,
            ends_at: None,
            paused_remaining_ms: None,
            completed_focus_cycles: 0,
            focus_minutes,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.ends_at
    }

    pub fn completed_focus_cycles(&self) -> u32 {
        self.completed_focus_cycles
    }

    pub fn focus_minutes(&self) -> u32 {
        self.focus_minutes
    }

    pub fn duration_ms(&self, mode: TimerMode) -> i64 {
        let minutes = match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.settings.short_break_minutes,
            TimerMode::LongBreak => self.settings.long_break_minutes,
        };
        i64::from(minutes) * 60_000
    }

    pub fn start_session(&mut self, mode: TimerMode, now: DateTime<Utc>) {
        let ends_at = now + TimeDelta::milliseconds(self.duration_ms(mode));
        self.mode = mode;
        self.started_at = Some(now);
        self.ends_at = Some(ends_at);
        self.paused_remaining_ms = None;
        self.is_running = true;
        debug!(?mode, %now, %ends_at, "started timer segment");
    }

    /// Starts a fresh focus segment without touching the cycle count.
    pub fn start_new_focus(&mut self, now: DateTime<Utc>) {
        self.start_session(TimerMode::Focus, now);
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if !self.is_running {
            return;
        }
        let remaining = self.remaining_ms_at(now);
        self.paused_remaining_ms = Some(remaining);
        self.is_running = false;
        debug!(remaining_ms = remaining, "paused timer");
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.is_running {
            return;
        }

        let (Some(started_at), Some(ends_at)) = (self.started_at, self.ends_at) else {
            self.start_session(self.mode, now);
            return;
        };

        let segment_ms = (ends_at - started_at).num_milliseconds();
        let remaining = self
            .paused_remaining_ms
            .take()
            .unwrap_or_else(|| (ends_at - now).num_milliseconds().max(0));
        let new_ends_at = now + TimeDelta::milliseconds(remaining);

        // Keep the segment length intact so progress does not jump after a pause.
        self.started_at = Some(new_ends_at - TimeDelta::milliseconds(segment_ms));
        self.ends_at = Some(new_ends_at);
        self.is_running = true;
        debug!(remaining_ms = remaining, %new_ends_at, "resumed timer");
    }

    /// Start/pause button: pauses a running timer, otherwise resumes it.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        if self.is_running {
            self.pause(now);
        } else {
            self.resume(now);
        }
    }

    /// Completes the running segment if its deadline has passed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        if !self.is_running {
            return None;
        }
        let ends_at = self.ends_at?;
        if now < ends_at {
            return None;
        }

        let from = self.mode;
        let to = self.advance_mode();
        self.start_session(to, now);

        let transition = Transition {
            from,
            to,
            completed_focus_cycles: self.completed_focus_cycles,
        };
        info!(
            ?from,
            ?to,
            completed = self.completed_focus_cycles,
            overdue_ms = (now - ends_at).num_milliseconds(),
            "timer segment completed"
        );
        Some(transition)
    }

    pub fn reset(&mut self) {
        self.mode = TimerMode::Focus;
        self.is_running = false;
        self.started_at = None;
        self.ends_at = None;
        self.paused_remaining_ms = None;
        self.completed_focus_cycles = 0;
        debug!("reset timer");
    }

    /// Changes the focus length used by the next focus segment.
    pub fn select_focus_minutes(&mut self, minutes: u32) -> anyhow::Result<()> {
        self.settings.check_preset(minutes)?;
        self.focus_minutes = minutes;
        debug!(minutes, "selected focus length");
        Ok(())
    }

    pub fn progress(&self, now: DateTime<Utc>) -> TimerProgress {
        let (Some(started_at), Some(ends_at)) = (self.started_at, self.ends_at) else {
            return TimerProgress {
                fraction_complete: 0.0,
                seconds_remaining: round_ms_to_secs(self.duration_ms(self.mode)),
            };
        };

        let total_ms = (ends_at - started_at).num_milliseconds();
        let remaining_ms = if self.is_running {
            self.remaining_ms_at(now)
        } else {
            self.paused_remaining_ms
                .unwrap_or_else(|| self.remaining_ms_at(now))
        };

        let fraction_complete = if total_ms <= 0 {
            1.0
        } else {
            ((total_ms - remaining_ms) as f64 / total_ms as f64).clamp(0.0, 1.0)
        };

        TimerProgress {
            fraction_complete,
            seconds_remaining: round_ms_to_secs(remaining_ms),
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let progress = self.progress(now);
        TimerSnapshot {
            mode: self.mode,
            is_running: self.is_running,
            seconds_remaining: progress.seconds_remaining,
            fraction_complete: progress.fraction_complete,
            completed_focus_cycles: self.completed_focus_cycles,
            focus_minutes: self.focus_minutes,
        }
    }

    fn remaining_ms_at(&self, now: DateTime<Utc>) -> i64 {
        self.ends_at
            .map(|ends_at| (ends_at - now).num_milliseconds().max(0))
            .unwrap_or(0)
    }

    fn advance_mode(&mut self) -> TimerMode {
        match self.mode {
            TimerMode::Focus => {
                self.completed_focus_cycles = self.completed_focus_cycles.saturating_add(1);
                if self.completed_focus_cycles % self.settings.cycles_before_long_break.max(1) == 0
                {
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                }
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Focus,
        }
    }
}

fn round_ms_to_secs(ms: i64) -> u64 {
    u64::try_from(ms.max(0)).unwrap_or(0).saturating_add(500) / 1_000
}

/// `MM:SS`; minutes keep growing past 59.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::{FocusTimer, TimerMode, format_clock};
    use crate::timer::TimerSettings;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn secs(n: i64) -> TimeDelta {
        TimeDelta::seconds(n)
    }

    fn timer() -> FocusTimer {
        FocusTimer::new(TimerSettings::default())
    }

    /// Runs the current segment to its deadline and ticks once.
    fn complete_segment(timer: &mut FocusTimer) -> DateTime<Utc> {
        let ends_at = timer.ends_at().expect("running segment");
        timer.tick(ends_at).expect("segment completes");
        ends_at
    }

    #[test]
    fn starts_idle_in_focus() {
        let timer = timer();
        assert_eq!(timer.mode(), TimerMode::Focus);
        assert!(!timer.is_running());
        assert_eq!(timer.completed_focus_cycles(), 0);
        let progress = timer.progress(t0());
        assert_eq!(progress.seconds_remaining, 25 * 60);
        assert_eq!(progress.fraction_complete, 0.0);
    }

    #[test]
    fn fresh_focus_session_reports_full_duration() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let progress = timer.progress(t0());
        assert!(progress.fraction_complete.abs() < 1e-9);
        assert_eq!(progress.seconds_remaining, 25 * 60);
        assert_eq!(timer.ends_at(), Some(t0() + secs(25 * 60)));
    }

    #[test]
    fn progress_is_stable_without_elapsed_time() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let now = t0() + secs(123);
        assert_eq!(timer.progress(now), timer.progress(now));
        assert_eq!(timer.progress(now).seconds_remaining, 25 * 60 - 123);
    }

    #[test]
    fn paused_time_does_not_count_down() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        timer.pause(t0() + secs(10));
        assert!(!timer.is_running());
        assert_eq!(
            timer.progress(t0() + secs(40)).seconds_remaining,
            25 * 60 - 10
        );

        let resumed_at = t0() + secs(60);
        timer.resume(resumed_at);
        assert!(timer.is_running());
        let progress = timer.progress(resumed_at);
        assert_eq!(progress.seconds_remaining, 25 * 60 - 10);
        assert!((progress.fraction_complete - 10.0 / 1500.0).abs() < 1e-9);
        assert!(timer.ends_at() >= timer.started_at());
    }

    #[test]
    fn pause_keeps_timestamps() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let (started, ends) = (timer.started_at(), timer.ends_at());
        timer.pause(t0() + secs(5));
        assert_eq!((timer.started_at(), timer.ends_at()), (started, ends));
    }

    #[test]
    fn resume_without_session_starts_one() {
        let mut timer = timer();
        timer.resume(t0());
        assert!(timer.is_running());
        assert_eq!(timer.mode(), TimerMode::Focus);
        assert_eq!(timer.started_at(), Some(t0()));
    }

    #[test]
    fn toggle_alternates_pause_and_resume() {
        let mut timer = timer();
        timer.toggle(t0());
        assert!(timer.is_running());
        timer.toggle(t0() + secs(30));
        assert!(!timer.is_running());
        timer.toggle(t0() + secs(90));
        assert_eq!(
            timer.progress(t0() + secs(90)).seconds_remaining,
            25 * 60 - 30
        );
    }

    #[test]
    fn tick_before_deadline_is_a_no_op() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        assert_eq!(timer.tick(t0() + secs(25 * 60 - 1)), None);
        assert_eq!(timer.mode(), TimerMode::Focus);
    }

    #[test]
    fn first_focus_completion_goes_to_short_break() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let transition = timer
            .tick(t0() + secs(25 * 60))
            .expect("deadline reached");
        assert_eq!(transition.from, TimerMode::Focus);
        assert_eq!(transition.to, TimerMode::ShortBreak);
        assert_eq!(timer.completed_focus_cycles(), 1);
        assert!(timer.is_running());
        assert_eq!(timer.progress(t0() + secs(25 * 60)).seconds_remaining, 5 * 60);
    }

    #[test]
    fn every_fourth_focus_earns_a_long_break() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        for _ in 0..3 {
            complete_segment(&mut timer);
            assert_eq!(timer.mode(), TimerMode::ShortBreak);
            complete_segment(&mut timer);
            assert_eq!(timer.mode(), TimerMode::Focus);
        }
        assert_eq!(timer.completed_focus_cycles(), 3);

        complete_segment(&mut timer);
        assert_eq!(timer.mode(), TimerMode::LongBreak);
        assert_eq!(timer.completed_focus_cycles(), 4);
        assert_eq!(timer.duration_ms(TimerMode::LongBreak), 15 * 60_000);

        complete_segment(&mut timer);
        assert_eq!(timer.mode(), TimerMode::Focus);
    }

    #[test]
    fn long_suspension_fires_a_single_transition() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let woke_at = t0() + TimeDelta::hours(5);
        let transition = timer.tick(woke_at).expect("overdue");
        assert_eq!(transition.to, TimerMode::ShortBreak);
        assert_eq!(timer.completed_focus_cycles(), 1);
        assert_eq!(timer.started_at(), Some(woke_at));
        assert_eq!(timer.tick(woke_at), None);
    }

    #[test]
    fn paused_timer_never_transitions() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        timer.pause(t0() + secs(1));
        assert_eq!(timer.tick(t0() + TimeDelta::hours(1)), None);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        complete_segment(&mut timer);
        timer.pause(t0() + secs(25 * 60 + 20));
        timer.reset();
        assert_eq!(timer.mode(), TimerMode::Focus);
        assert!(!timer.is_running());
        assert_eq!(timer.completed_focus_cycles(), 0);
        assert_eq!(timer.started_at(), None);
        assert_eq!(timer.ends_at(), None);
    }

    #[test]
    fn selecting_focus_length_applies_to_next_session() {
        let mut timer = timer();
        timer.select_focus_minutes(45).expect("preset");
        assert_eq!(timer.progress(t0()).seconds_remaining, 45 * 60);
        timer.start_new_focus(t0());
        assert_eq!(timer.ends_at(), Some(t0() + secs(45 * 60)));

        assert!(timer.select_focus_minutes(50).is_err());
        assert_eq!(timer.focus_minutes(), 45);
    }

    #[test]
    fn new_focus_keeps_cycle_count() {
        let mut timer = timer();
        timer.start_session(TimerMode::Focus, t0());
        let done_at = complete_segment(&mut timer);
        timer.start_new_focus(done_at + secs(1));
        assert_eq!(timer.mode(), TimerMode::Focus);
        assert_eq!(timer.completed_focus_cycles(), 1);
    }

    #[test]
    fn progress_is_clamped_past_deadline() {
        let mut timer = timer();
        timer.start_session(TimerMode::ShortBreak, t0());
        let progress = timer.progress(t0() + TimeDelta::hours(2));
        assert_eq!(progress.seconds_remaining, 0);
        assert_eq!(progress.fraction_complete, 1.0);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let mut timer = timer();
        timer.start_session(TimerMode::ShortBreak, t0());
        let json = serde_json::to_value(timer.snapshot(t0())).expect("serialize");
        assert_eq!(json["mode"], "shortBreak");
        assert_eq!(json["isRunning"], true);
        assert_eq!(json["secondsRemaining"], 300);
        assert_eq!(json["completedFocusCycles"], 0);
    }

    #[test]
    fn formats_clock() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(25 * 60), "25:00");
        assert_eq!(format_clock(61), "01:01");
    }
}
