pub mod runner;
pub mod settings;
pub mod state;

pub use runner::TimerRunner;
pub use settings::TimerSettings;
pub use state::{FocusTimer, TimerMode, TimerProgress, TimerSnapshot, Transition, format_clock};
