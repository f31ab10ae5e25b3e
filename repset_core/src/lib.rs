#![forbid(unsafe_code)]

//! Core domain model and workout-session engine for Repset.
//!
//! This crate provides:
//! - Domain types (plans, exercises, sessions, sets, check-ins)
//! - Persistence (data store with in-memory and JSON file backends)
//! - Session lifecycle, set recording and rest timer state machines
//! - Derived analytics (streaks, personal records, summaries)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod store;
pub mod capabilities;
pub mod plans;
pub mod streak;
pub mod set_recorder;
pub mod rest_timer;
pub mod session;
pub mod checkin;
pub mod history;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::{DataStore, JsonFileBackend, MemoryBackend, Query, SortOrder, Store, Transaction};
pub use capabilities::{
    BackgroundKeepAlive, CompletionCue, LoggingNotifier, NoopCue, NoopKeepAlive, NoopNotifier,
    Notifier,
};
pub use streak::{current_streak, longest_streak, StreakSummary};
pub use set_recorder::{LastPerformance, SetRecorder, SetTarget};
pub use rest_timer::{RestTimer, ThreadTicker, TickOutcome, TickScheduler, TimerState};
pub use session::{ExerciseStatus, SessionManager};
pub use history::{ExerciseStats, PersonalRecord, SessionSummary};
