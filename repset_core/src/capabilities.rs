//! Platform capabilities used by the rest timer.
//!
//! Hosts that can keep running in the background, post notifications or play
//! a completion cue provide implementations; everything else gets the no-op
//! versions. Failures are returned to the caller, which logs them and carries
//! on.

use crate::Result;

/// Schedules and cancels local notifications
pub trait Notifier {
    fn schedule_one_shot(&mut self, title: &str, body: &str, delay_seconds: u64, id: &str)
        -> Result<()>;
    fn cancel_all(&mut self) -> Result<()>;
}

/// Keeps the host process ticking while it is not in the foreground
pub trait BackgroundKeepAlive {
    fn acquire(&mut self) -> Result<()>;
    fn release(&mut self);
}

/// Haptic or audio feedback when a rest period ends
pub trait CompletionCue {
    fn play(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn schedule_one_shot(&mut self, _: &str, _: &str, _: u64, _: &str) -> Result<()> {
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeepAlive;

impl BackgroundKeepAlive for NoopKeepAlive {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCue;

impl CompletionCue for NoopCue {
    fn play(&mut self) {}
}

/// Notifier that only records what it would have shown in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn schedule_one_shot(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: u64,
        id: &str,
    ) -> Result<()> {
        tracing::info!(
            "Notification {} in {}s: {} - {}",
            id,
            delay_seconds,
            title,
            body
        );
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        tracing::debug!("Cancelled pending notifications");
        Ok(())
    }
}
