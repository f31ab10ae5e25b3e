//! Desktop integrations for the rest timer: notifications and a sound cue.

use notify_rust::{Notification, Urgency};
use repset_core::{CompletionCue, Notifier, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Shows rest notifications through the desktop notification service.
///
/// Each notification waits out its delay on a helper thread. `cancel_all`
/// bumps a generation counter so anything still waiting is dropped. Clones
/// share both, so a handle kept outside the timer can wait for delivery.
#[derive(Clone, Default)]
pub struct DesktopNotifier {
    generation: Arc<AtomicU64>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every scheduled notification has been shown or dropped
    pub fn wait_pending(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Notification thread panicked");
            }
        }
    }
}

impl Notifier for DesktopNotifier {
    fn schedule_one_shot(
        &mut self,
        title: &str,
        body: &str,
        delay_seconds: u64,
        id: &str,
    ) -> Result<()> {
        let scheduled = self.generation.load(Ordering::SeqCst);
        let generation = Arc::clone(&self.generation);
        let (title, body, id) = (title.to_string(), body.to_string(), id.to_string());

        let handle = thread::Builder::new()
            .name("repset-notify".into())
            .spawn(move || {
                thread::sleep(Duration::from_secs(delay_seconds));
                if generation.load(Ordering::SeqCst) != scheduled {
                    tracing::debug!("Notification {} cancelled before delivery", id);
                    return;
                }
                if let Err(e) = Notification::new()
                    .summary(&title)
                    .body(&body)
                    .appname("repset")
                    .icon("alarm-clock")
                    .urgency(Urgency::Normal)
                    .show()
                {
                    tracing::warn!("Failed to show notification {}: {}", id, e);
                }
            })?;

        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
        Ok(())
    }

    fn cancel_all(&mut self) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Plays a system sound, falling back to the terminal bell
pub struct SoundCue {
    enabled: bool,
}

impl SoundCue {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl CompletionCue for SoundCue {
    fn play(&mut self) {
        if !self.enabled {
            return;
        }

        for (cmd, file) in [
            ("paplay", "/usr/share/sounds/freedesktop/stereo/complete.oga"),
            ("aplay", "/usr/share/sounds/sound-icons/guitar-11.wav"),
        ] {
            if Path::new(file).exists() {
                let spawned = Command::new(cmd)
                    .arg(file)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn();
                match spawned {
                    Ok(child) => {
                        reap(child);
                        return;
                    }
                    Err(e) => tracing::debug!("{} unavailable: {}", cmd, e),
                }
            }
        }

        print!("\x07");
        let _ = std::io::stdout().flush();
    }
}

/// Wait for a player process off the main thread so it does not linger as a zombie
fn reap(mut child: Child) {
    let spawned = thread::Builder::new()
        .name("repset-sound".into())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                tracing::debug!("Sound player exited with {}", status)
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Failed to wait for sound player: {}", e),
        });
    if let Err(e) = spawned {
        tracing::warn!("Could not start sound reaper thread: {}", e);
    }
}
