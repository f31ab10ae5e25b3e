//! Rest timer countdown between sets.
//!
//! [`RestTimer`] is a single-writer state machine:
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |           |
//!            v           v
//!        Completed <--- skip
//! ```
//!
//! It never sleeps itself. A [`TickScheduler`] delivers one tick per second to
//! the thread that owns the timer, which calls [`RestTimer::tick_from`].
//! Every (re)start bumps a generation number, so a tick that was already in
//! flight when the timer was paused or restarted is ignored.

use crate::capabilities::{
    BackgroundKeepAlive, CompletionCue, NoopCue, NoopKeepAlive, NoopNotifier, Notifier,
};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const REST_NOTIFICATION_ID: &str = "rest-timer-complete";
const NOTIFICATION_DELAY_SECONDS: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
}

/// Result of delivering one tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Timer was not running, or the tick belonged to an older run
    Ignored,
    Ticking { remaining: u32 },
    Completed,
}

/// Source of periodic ticks for one timer
pub trait TickScheduler {
    /// Start ticking, tagging every tick with `generation`
    fn schedule(&mut self, generation: u64);
    fn cancel(&mut self);
}

pub struct RestTimer {
    state: TimerState,
    total_seconds: u32,
    remaining_seconds: u32,
    generation: u64,
    foreground: bool,
    keep_alive_held: bool,
    completions: u32,
    scheduler: Box<dyn TickScheduler>,
    notifier: Box<dyn Notifier>,
    keep_alive: Box<dyn BackgroundKeepAlive>,
    cue: Box<dyn CompletionCue>,
}

impl RestTimer {
    /// A timer with no-op notifier, keep-alive and cue
    pub fn new(scheduler: impl TickScheduler + 'static) -> Self {
        Self {
            state: TimerState::Idle,
            total_seconds: 0,
            remaining_seconds: 0,
            generation: 0,
            foreground: true,
            keep_alive_held: false,
            completions: 0,
            scheduler: Box::new(scheduler),
            notifier: Box::new(NoopNotifier),
            keep_alive: Box::new(NoopKeepAlive),
            cue: Box::new(NoopCue),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: impl BackgroundKeepAlive + 'static) -> Self {
        self.keep_alive = Box::new(keep_alive);
        self
    }

    pub fn with_cue(mut self, cue: impl CompletionCue + 'static) -> Self {
        self.cue = Box::new(cue);
        self
    }

    /// Whether the host is visible; background completion also notifies
    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// How many times a countdown has run out
    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Fraction of the rest period elapsed, in [0, 1]
    pub fn progress(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        let elapsed = f64::from(self.total_seconds - self.remaining_seconds.min(self.total_seconds));
        (elapsed / f64::from(self.total_seconds)).clamp(0.0, 1.0)
    }

    /// Remaining time as `MM:SS`
    pub fn formatted_time(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    /// Begin a countdown of `seconds`. Zero is ignored.
    ///
    /// A timer that is already running or paused is stopped first.
    pub fn start(&mut self, seconds: u32) {
        if seconds == 0 {
            tracing::debug!("Ignoring rest timer start with zero duration");
            return;
        }
        if matches!(self.state, TimerState::Running | TimerState::Paused) {
            tracing::debug!("Restarting rest timer; stopping previous countdown");
            self.stop();
        }

        self.total_seconds = seconds;
        self.remaining_seconds = seconds;
        self.state = TimerState::Running;

        match self.keep_alive.acquire() {
            Ok(()) => self.keep_alive_held = true,
            Err(e) => tracing::warn!("Background keep-alive unavailable: {}", e),
        }

        self.schedule_ticks();
        tracing::info!("Rest timer started for {}s", seconds);
    }

    pub fn pause(&mut self) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        self.scheduler.cancel();
        self.state = TimerState::Paused;
        tracing::debug!("Rest timer paused at {}s", self.remaining_seconds);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != TimerState::Paused {
            return false;
        }
        self.state = TimerState::Running;
        self.schedule_ticks();
        tracing::debug!("Rest timer resumed at {}s", self.remaining_seconds);
        true
    }

    /// Jump straight to Completed without the completion cue
    pub fn skip(&mut self) {
        if !matches!(self.state, TimerState::Running | TimerState::Paused) {
            return;
        }
        self.tear_down();
        self.remaining_seconds = 0;
        self.state = TimerState::Completed;
        tracing::info!("Rest timer skipped");
    }

    /// Abort and return to Idle
    pub fn stop(&mut self) {
        if self.state == TimerState::Idle {
            return;
        }
        self.tear_down();
        self.remaining_seconds = 0;
        self.state = TimerState::Idle;
        tracing::debug!("Rest timer stopped");
    }

    /// Deliver a tick from the current run; stale generations are ignored
    pub fn tick_from(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation {
            return TickOutcome::Ignored;
        }
        self.tick()
    }

    /// Advance one second
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Ticking {
                remaining: self.remaining_seconds,
            };
        }

        self.complete();
        TickOutcome::Completed
    }

    fn schedule_ticks(&mut self) {
        self.generation += 1;
        self.scheduler.schedule(self.generation);
    }

    fn complete(&mut self) {
        self.scheduler.cancel();
        self.state = TimerState::Completed;
        self.completions += 1;

        self.cue.play();
        if !self.foreground {
            if let Err(e) = self.notifier.schedule_one_shot(
                "Rest complete",
                "Time for your next set",
                NOTIFICATION_DELAY_SECONDS,
                REST_NOTIFICATION_ID,
            ) {
                tracing::warn!("Failed to schedule rest notification: {}", e);
            }
        }
        self.release_keep_alive();
        tracing::info!("Rest timer completed");
    }

    fn tear_down(&mut self) {
        self.scheduler.cancel();
        self.release_keep_alive();
        if let Err(e) = self.notifier.cancel_all() {
            tracing::warn!("Failed to cancel pending notifications: {}", e);
        }
    }

    fn release_keep_alive(&mut self) {
        if self.keep_alive_held {
            self.keep_alive.release();
            self.keep_alive_held = false;
        }
    }
}

impl Drop for RestTimer {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.release_keep_alive();
    }
}

/// `MM:SS` for a number of seconds
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

// ============================================================================
// Thread-backed tick source
// ============================================================================

/// Sends one event per interval into a channel from a helper thread.
///
/// The owning thread receives the events and feeds them to the timer, so the
/// timer itself is only ever touched by one thread.
pub struct ThreadTicker<E> {
    sender: Sender<E>,
    make_event: Arc<dyn Fn(u64) -> E + Send + Sync>,
    interval: Duration,
    cancel: Option<Sender<()>>,
}

impl<E: Send + 'static> ThreadTicker<E> {
    pub fn new(sender: Sender<E>, make_event: impl Fn(u64) -> E + Send + Sync + 'static) -> Self {
        Self {
            sender,
            make_event: Arc::new(make_event),
            interval: Duration::from_secs(1),
            cancel: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl<E: Send + 'static> TickScheduler for ThreadTicker<E> {
    fn schedule(&mut self, generation: u64) {
        self.cancel();

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
        let sender = self.sender.clone();
        let make_event = Arc::clone(&self.make_event);
        let interval = self.interval;

        thread::spawn(move || loop {
            match cancel_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if sender.send(make_event(generation)).is_err() {
                        break;
                    }
                }
                // Cancelled, or the ticker itself was dropped
                _ => break,
            }
        });

        self.cancel = Some(cancel_tx);
    }

    fn cancel(&mut self) {
        // Dropping the sender disconnects the helper thread's receiver
        self.cancel = None;
    }
}
