//! Interactive terminal flows: the guided workout and the rest countdown.
//!
//! Keyboard input and timer ticks arrive on one channel, so the rest timer and
//! the prompts are driven from the main thread only.

use crate::format_local;
use repset_core::checkin::{register_check_in, CheckInDetails};
use repset_core::*;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use uuid::Uuid;

pub enum Event {
    Tick(u64),
    Line(String),
    InputClosed,
}

/// Stdin lines and timer ticks, in arrival order
pub struct Console {
    events: Receiver<Event>,
    sender: Sender<Event>,
    input_open: bool,
}

impl Console {
    pub fn spawn() -> Self {
        let (sender, events) = mpsc::channel();
        let input = sender.clone();
        thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if input.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            let _ = input.send(Event::InputClosed);
        });

        Self {
            events,
            sender,
            input_open: true,
        }
    }

    /// Sender for the rest timer's tick source
    pub fn sender(&self) -> Sender<Event> {
        self.sender.clone()
    }

    fn next_event(&mut self) -> Option<Event> {
        let event = self.events.recv().ok()?;
        if matches!(event, Event::InputClosed) {
            self.input_open = false;
        }
        Some(event)
    }

    /// Print `text` and wait for a line. `None` once input is closed.
    pub fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        print!("{}> ", text);
        io::stdout().flush()?;

        while self.input_open {
            match self.next_event() {
                Some(Event::Line(line)) => return Ok(Some(line.trim().to_string())),
                // Left over from a timer that has since stopped
                Some(Event::Tick(_)) => continue,
                Some(Event::InputClosed) | None => break,
            }
        }
        println!();
        Ok(None)
    }
}

/// Count down a rest period, reacting to p/r/s/q on stdin
pub fn run_rest(console: &mut Console, timer: &mut RestTimer, seconds: u32) -> Result<()> {
    if seconds == 0 {
        return Ok(());
    }

    timer.start(seconds);
    println!("Rest {}  (p pause, r resume, s skip, q stop)", timer.formatted_time());

    while matches!(timer.state(), TimerState::Running | TimerState::Paused) {
        let Some(event) = console.next_event() else {
            timer.stop();
            break;
        };

        match event {
            Event::Tick(generation) => match timer.tick_from(generation) {
                TickOutcome::Ticking { .. } => {
                    print!("\r  {}  ", timer.formatted_time());
                    io::stdout().flush()?;
                }
                TickOutcome::Completed => println!("\r✓ Rest complete"),
                TickOutcome::Ignored => {}
            },
            Event::Line(line) => match line.trim() {
                "p" => {
                    if timer.pause() {
                        println!("\r  Paused at {}", timer.formatted_time());
                    }
                }
                "r" => {
                    if timer.resume() {
                        println!("  Resumed");
                    }
                }
                "s" => {
                    timer.skip();
                    println!("\r  Rest skipped");
                }
                "q" => {
                    timer.stop();
                    println!("\r  Rest stopped");
                }
                _ => {}
            },
            // No more commands; the countdown simply runs out
            Event::InputClosed => {}
        }
    }
    Ok(())
}

/// What to do when the plan already has an unfinished session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictChoice {
    Ask,
    Resume,
    Abandon,
}

/// Guided execution of one plan, from start (or resume) to summary
pub fn run_workout<S: DataStore>(
    store: &mut S,
    console: &mut Console,
    timer: &mut RestTimer,
    plan_id: Uuid,
    on_conflict: ConflictChoice,
) -> Result<()> {
    let mut manager = SessionManager::load(store, plan_id)?;
    if manager.exercises().is_empty() {
        return Err(Error::InvalidInput(format!(
            "Plan '{}' has no exercises",
            manager.plan().name
        )));
    }

    if !open_session(store, console, &mut manager, on_conflict)? {
        println!("Cancelled.");
        return Ok(());
    }

    loop {
        print_overview(store, &manager)?;
        let Some(choice) = console.prompt("Exercise number, f to finish, q to quit")? else {
            leave_open(&manager);
            return Ok(());
        };

        match choice.as_str() {
            "f" => break,
            "q" => {
                leave_open(&manager);
                return Ok(());
            }
            other => match other.parse::<usize>() {
                Ok(n) if (1..=manager.exercises().len()).contains(&n) => {
                    let exercise_id = manager.exercises()[n - 1].id;
                    let recorder = manager.open_exercise(store, exercise_id)?;
                    if run_exercise(store, console, timer, recorder)? {
                        manager.mark_exercise_complete(exercise_id);
                    }
                }
                _ => println!("Unknown choice: {}", other),
            },
        }
    }

    let session = manager.finalize_session(store)?;
    let summary = history::SessionSummary::load(store, session.id)?;
    println!();
    println!("✓ Workout complete: {}", summary.plan_name);
    println!("  Duration:  {}", summary.formatted_duration());
    println!("  Exercises: {}", summary.completed_exercises);
    println!("  Sets:      {}", summary.total_sets);
    println!("  Reps:      {}", summary.total_reps);
    println!("  Volume:    {:.1} kg", summary.total_volume);

    let now = chrono::Local::now();
    if checkin::today_check_in(store, &now)?.is_none() {
        if let Some(answer) = console.prompt("c to check in for today, Enter to skip")? {
            if answer == "c" {
                let details = CheckInDetails {
                    session_id: Some(session.id),
                    title: Some(summary.plan_name.clone()),
                    ..Default::default()
                };
                let now_utc = chrono::Utc::now();
                register_check_in(store, now_utc, now_utc, details)?;
                println!("✓ Checked in");
            }
        }
    }
    Ok(())
}

/// Returns false if the user cancelled
fn open_session<S: DataStore>(
    store: &mut S,
    console: &mut Console,
    manager: &mut SessionManager,
    on_conflict: ConflictChoice,
) -> Result<bool> {
    let existing = match manager.start_session(store) {
        Ok(session) => {
            let started = session.start_date;
            println!("Started {} at {}", manager.plan().name, format_local(started));
            return Ok(true);
        }
        Err(Error::SessionConflict(existing)) => *existing,
        Err(e) => return Err(e),
    };

    println!(
        "An unfinished session of {} from {} exists.",
        manager.plan().name,
        format_local(existing.start_date)
    );
    let choice = match on_conflict {
        ConflictChoice::Ask => {
            let answer =
                console.prompt("r to resume, a to abandon and start fresh, Enter to cancel")?;
            match answer.as_deref() {
                Some("r") => ConflictChoice::Resume,
                Some("a") => ConflictChoice::Abandon,
                _ => return Ok(false),
            }
        }
        other => other,
    };

    if choice == ConflictChoice::Resume {
        manager.resume_session(store, existing)?;
        println!("Resumed. {}", manager.progress_text());
    } else {
        manager.abandon_session(store, &existing)?;
        let session = manager.start_session(store)?;
        println!(
            "Abandoned the old session; started a new one at {}",
            format_local(session.start_date)
        );
    }
    Ok(true)
}

fn leave_open(manager: &SessionManager) {
    println!(
        "Session left open. Continue with `repset workout \"{}\" --resume`.",
        manager.plan().name
    );
}

fn print_overview<S: DataStore>(store: &S, manager: &SessionManager) -> Result<()> {
    println!();
    println!("── {} ── {}", manager.plan().name, manager.progress_text());
    for (i, exercise) in manager.exercises().iter().enumerate() {
        let status = manager.exercise_status(store, exercise.id)?;
        let marker = match status {
            ExerciseStatus::Completed => "✓",
            ExerciseStatus::InProgress => "…",
            ExerciseStatus::Pending => " ",
        };
        println!("  {} {}. {} ({})", marker, i + 1, exercise.name, status);
    }
    Ok(())
}

/// Log sets for one exercise. Returns true when the user marked it done.
fn run_exercise<S: DataStore>(
    store: &mut S,
    console: &mut Console,
    timer: &mut RestTimer,
    mut recorder: SetRecorder,
) -> Result<bool> {
    let target = recorder.target();
    println!();
    println!(
        "{}: {} sets × {} reps @ {}",
        recorder.exercise().name,
        target.sets,
        target.reps,
        format_weight(target.load)
    );
    if let Some(last) = recorder.fetch_last_performance(store) {
        println!("  {}", last.formatted_text());
    }

    loop {
        let prompt = format!(
            "{} - enter reps [weight|bw], d when done, b to go back",
            recorder.progress_text()
        );
        let Some(input) = console.prompt(&prompt)? else {
            return Ok(false);
        };

        match input.as_str() {
            "d" => return Ok(true),
            "b" => return Ok(false),
            _ => {}
        }

        let (reps, load) = match parse_set(&input, target.load) {
            Ok(parsed) => parsed,
            Err(e) => {
                println!("  {}", e);
                continue;
            }
        };

        match recorder.record_set(store, load, reps) {
            Ok(set) => {
                println!(
                    "✓ Set {} logged: {} × {}",
                    set.set_number,
                    set.formatted_weight(),
                    set.reps
                );
                if recorder.has_reached_default_sets() {
                    println!("  All planned sets done. Enter d to finish this exercise.");
                } else {
                    run_rest(console, timer, recorder.rest_seconds())?;
                }
            }
            Err(e) if e.is_recoverable() => println!("  {}", e),
            Err(e) => return Err(e),
        }
    }
}

/// `"10"` uses the planned load, `"10 62.5"` an explicit one, `"10 bw"` none
pub fn parse_set(input: &str, planned: Option<f64>) -> Result<(u32, Option<f64>)> {
    let mut parts = input.split_whitespace();
    let reps = parts
        .next()
        .and_then(|r| r.parse::<u32>().ok())
        .ok_or_else(|| Error::InvalidInput(format!("Expected a rep count, got '{}'", input)))?;

    let load = match parts.next() {
        None => planned,
        Some(w) if w.eq_ignore_ascii_case("bw") => None,
        Some(w) => Some(
            w.trim_end_matches("kg")
                .parse::<f64>()
                .map_err(|_| Error::InvalidInput(format!("Invalid weight: {}", w)))?,
        ),
    };
    Ok((reps, load))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        assert_eq!(parse_set("10", Some(60.0)).unwrap(), (10, Some(60.0)));
        assert_eq!(parse_set("8 62.5", Some(60.0)).unwrap(), (8, Some(62.5)));
        assert_eq!(parse_set("8 70kg", None).unwrap(), (8, Some(70.0)));
        assert_eq!(parse_set("12 bw", Some(60.0)).unwrap(), (12, None));
        assert!(parse_set("ten", None).is_err());
        assert!(parse_set("5 heavy", None).is_err());
    }
}
