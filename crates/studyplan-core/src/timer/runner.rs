use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{FocusTimer, TimerSnapshot, Transition};

/// Foreground driver: sleeps between ticks and reports every snapshot.
///
/// Time and sleeping are injected so the loop can be driven by a simulated
/// clock.
pub struct TimerRunner<C, S> {
    clock: C,
    sleep: S,
    tick_interval: Duration,
}

impl TimerRunner<fn() -> DateTime<Utc>, fn(Duration)> {
    pub fn system(tick_interval: Duration) -> Self {
        TimerRunner {
            clock: Utc::now,
            sleep: std::thread::sleep,
            tick_interval,
        }
    }
}

impl<C, S> TimerRunner<C, S>
where
    C: FnMut() -> DateTime<Utc>,
    S: FnMut(Duration),
{
    pub fn new(clock: C, sleep: S, tick_interval: Duration) -> Self {
        Self {
            clock,
            sleep,
            tick_interval,
        }
    }

    /// Runs until `segments` segments have completed.
    ///
    /// Starts the timer first if it is idle or paused.
    #[tracing::instrument(skip(self, timer, on_tick))]
    pub fn run<F>(
        &mut self,
        timer: &mut FocusTimer,
        segments: u32,
        mut on_tick: F,
    ) -> anyhow::Result<Vec<Transition>>
    where
        F: FnMut(&TimerSnapshot, Option<&Transition>) -> anyhow::Result<()>,
    {
        let mut transitions = Vec::new();
        if segments == 0 {
            return Ok(transitions);
        }

        let started = (self.clock)();
        if !timer.is_running() {
            timer.resume(started);
        }
        on_tick(&timer.snapshot(started), None)?;
        info!(mode = ?timer.mode(), segments, "timer loop started");

        loop {
            (self.sleep)(self.tick_interval);
            let now = (self.clock)();
            let transition = timer.tick(now);
            on_tick(&timer.snapshot(now), transition.as_ref())?;

            if let Some(transition) = transition {
                transitions.push(transition);
                debug!(done = transitions.len(), segments, "segment finished");
                if transitions.len() >= segments as usize {
                    break;
                }
            }
        }

        info!(completed = transitions.len(), "timer loop finished");
        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::TimerRunner;
    use crate::timer::{FocusTimer, TimerMode, TimerSettings};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn runs_focus_then_break_on_simulated_clock() {
        let now = Rc::new(Cell::new(t0()));
        let clock_now = Rc::clone(&now);
        let sleep_now = Rc::clone(&now);
        let mut runner = TimerRunner::new(
            move || clock_now.get(),
            move |step: Duration| {
                let step = TimeDelta::from_std(step).expect("small step");
                sleep_now.set(sleep_now.get() + step * 1000);
            },
            Duration::from_millis(300),
        );

        let mut timer = FocusTimer::new(TimerSettings::default());
        let mut ticks = 0_u32;
        let transitions = runner
            .run(&mut timer, 2, |snapshot, _| {
                ticks += 1;
                assert!(snapshot.fraction_complete <= 1.0);
                Ok(())
            })
            .expect("run");

        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].to, TimerMode::ShortBreak);
        assert_eq!(transitions[1].to, TimerMode::Focus);
        assert_eq!(timer.completed_focus_cycles(), 1);
        assert!(ticks > 2);
    }

    #[test]
    fn zero_segments_does_nothing() {
        let mut runner = TimerRunner::new(t0, |_: Duration| {}, Duration::from_millis(300));
        let mut timer = FocusTimer::new(TimerSettings::default());
        let transitions = runner.run(&mut timer, 0, |_, _| Ok(())).expect("run");
        assert!(transitions.is_empty());
        assert!(!timer.is_running());
    }

    #[test]
    fn callback_errors_stop_the_loop() {
        let mut runner = TimerRunner::new(t0, |_: Duration| {}, Duration::from_millis(300));
        let mut timer = FocusTimer::new(TimerSettings::default());
        let result = runner.run(&mut timer, 1, |_, _| Err(anyhow::anyhow!("closed")));
        assert!(result.is_err());
    }
}
