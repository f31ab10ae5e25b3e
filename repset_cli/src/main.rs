mod desktop;
mod interactive;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use interactive::{ConflictChoice, Console};
use repset_core::checkin::{self as checkins, CheckInDetails};
use repset_core::config::store_path_in;
use repset_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "repset")]
#[command(about = "Workout plans, guided sessions and check-in streaks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage workout plans and their exercises
    #[command(subcommand)]
    Plan(PlanCommand),

    /// Scripted session control (one step per invocation)
    #[command(subcommand)]
    Session(SessionCommand),

    /// Run a plan interactively with rest timers between sets
    Workout {
        /// Plan name or id
        plan: String,

        #[command(flatten)]
        conflict: ConflictArgs,
    },

    /// Standalone rest countdown (p pause, r resume, s skip, q stop)
    Rest {
        /// Seconds to rest (defaults to the configured rest time)
        seconds: Option<u32>,
    },

    /// Check in for today, or register a past check-in
    Checkin {
        /// When it happened, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM" local time
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Kind of exercise, e.g. "Running"
        #[arg(long = "type")]
        exercise_type: Option<String>,

        #[arg(long)]
        calories: Option<u32>,

        #[arg(long)]
        location: Option<String>,
    },

    /// Current and best check-in streaks (default)
    Streak,

    /// Check-in calendar grouped by month
    Calendar,

    /// Completed workouts, newest first
    History {
        /// Maximum number of sessions (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Personal records and statistics per exercise
    Records,

    /// Append recorded sets of completed sessions to a CSV file
    Export {
        path: PathBuf,

        /// Only sessions finished on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Create a plan
    New {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List plans, favorites first
    List {
        /// Only plans whose name contains this text
        #[arg(long)]
        search: Option<String>,
    },

    /// Show a plan and its exercises
    Show { plan: String },

    /// Rename a plan or change its description
    Edit {
        plan: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Append an exercise to a plan
    AddExercise {
        plan: String,
        name: String,

        /// chest, back, legs, shoulders, arms, abs or cardio
        #[arg(long)]
        group: MuscleGroup,

        #[arg(long, default_value_t = DEFAULT_SETS)]
        sets: u32,

        #[arg(long, default_value_t = DEFAULT_REPS)]
        reps: u32,

        /// Rest between sets in seconds (defaults to the configured rest time)
        #[arg(long)]
        rest: Option<u32>,

        /// Load in kg; omit for bodyweight
        #[arg(long)]
        load: Option<f64>,
    },

    /// Remove an exercise (by position or name)
    RemoveExercise { plan: String, exercise: String },

    /// Move an exercise to another position (1-based)
    MoveExercise { plan: String, from: usize, to: usize },

    /// Toggle the favorite flag
    Favorite { plan: String },

    /// Delete a plan with all its sessions
    Delete { plan: String },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Start a session for a plan
    Start {
        plan: String,

        #[command(flatten)]
        conflict: ConflictArgs,
    },

    /// Show the active session and exercise progress
    Status { plan: String },

    /// Record one set in the active session
    Log {
        plan: String,

        /// Exercise position or name
        exercise: String,

        #[arg(long)]
        reps: u32,

        /// Load in kg (defaults to the planned load)
        #[arg(long, conflicts_with = "bodyweight")]
        weight: Option<f64>,

        /// Record a bodyweight set
        #[arg(long)]
        bodyweight: bool,
    },

    /// Finish the active session and print its summary
    Finish { plan: String },

    /// Close the active session without finishing it
    Abandon { plan: String },
}

#[derive(Args)]
struct ConflictArgs {
    /// Resume an unfinished session instead of starting a new one
    #[arg(long, conflicts_with = "abandon")]
    resume: bool,

    /// Close an unfinished session and start a new one
    #[arg(long)]
    abandon: bool,
}

impl ConflictArgs {
    fn choice(&self) -> ConflictChoice {
        if self.resume {
            ConflictChoice::Resume
        } else if self.abandon {
            ConflictChoice::Abandon
        } else {
            ConflictChoice::Ask
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for_verbosity(cli.verbose));

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let mut store = Store::open_file(store_path_in(&data_dir))?;

    match cli.command {
        Some(Commands::Plan(cmd)) => cmd_plan(&mut store, cmd, &config),
        Some(Commands::Session(cmd)) => cmd_session(&mut store, cmd),
        Some(Commands::Workout { plan, conflict }) => {
            cmd_workout(&mut store, &plan, conflict.choice(), &config)
        }
        Some(Commands::Rest { seconds }) => {
            cmd_rest(seconds.unwrap_or(config.timer.default_rest_seconds), &config)
        }
        Some(Commands::Checkin {
            at,
            title,
            exercise_type,
            calories,
            location,
        }) => {
            let details = CheckInDetails {
                title,
                exercise_type,
                calories,
                location,
                ..Default::default()
            };
            cmd_checkin(&mut store, at, details)
        }
        Some(Commands::Calendar) => cmd_calendar(&store),
        Some(Commands::History { limit }) => {
            cmd_history(&store, limit.unwrap_or(config.history.limit))
        }
        Some(Commands::Records) => cmd_records(&store),
        Some(Commands::Export { path, since }) => cmd_export(&store, &path, since),
        Some(Commands::Streak) | None => cmd_streak(&store, &config),
    }
}

// ============================================================================
// Plans
// ============================================================================

fn cmd_plan<S: DataStore>(store: &mut S, cmd: PlanCommand, config: &Config) -> Result<()> {
    match cmd {
        PlanCommand::New { name, description } => {
            let plan = plans::create_plan(store, &name, &description)?;
            println!("✓ Created plan {} ({})", plan.name, plan.id);
        }
        PlanCommand::List { search } => {
            let found = plans::search_plans(store, search.as_deref().unwrap_or(""))?;
            if found.is_empty() {
                println!("No plans yet. Create one with `repset plan new <name>`.");
            }
            for plan in found {
                let count = plans::plan_exercises(store, plan.id)?.len();
                let star = if plan.is_favorite { "★" } else { " " };
                println!("{} {}  ({} exercises)", star, plan.name, count);
            }
        }
        PlanCommand::Show { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            print_plan(store, &plan)?;
        }
        PlanCommand::Edit {
            plan,
            name,
            description,
        } => {
            let plan = plans::find_plan(store, &plan)?;
            let updated =
                plans::update_plan(store, plan.id, name.as_deref(), description.as_deref())?;
            println!("✓ Updated plan {}", updated.name);
        }
        PlanCommand::AddExercise {
            plan,
            name,
            group,
            sets,
            reps,
            rest,
            load,
        } => {
            let plan = plans::find_plan(store, &plan)?;
            let mut exercise = Exercise::new(plan.id, name, group);
            exercise.default_sets = sets;
            exercise.default_reps = reps;
            exercise.default_rest_seconds = rest.unwrap_or(config.timer.default_rest_seconds);
            exercise.load = load;
            let added = plans::add_exercise(store, exercise)?;
            println!(
                "✓ Added {} to {} as #{}",
                added.name,
                plan.name,
                added.order + 1
            );
        }
        PlanCommand::RemoveExercise { plan, exercise } => {
            let plan = plans::find_plan(store, &plan)?;
            let exercises = plans::plan_exercises(store, plan.id)?;
            let target = resolve_exercise(&exercises, &exercise)?;
            plans::remove_exercise(store, target.id)?;
            println!("✓ Removed {} from {}", target.name, plan.name);
        }
        PlanCommand::MoveExercise { plan, from, to } => {
            let plan = plans::find_plan(store, &plan)?;
            if from == 0 || to == 0 {
                return Err(Error::InvalidInput("Positions start at 1".into()));
            }
            plans::move_exercise(store, plan.id, from - 1, to - 1)?;
            print_plan(store, &plan)?;
        }
        PlanCommand::Favorite { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            if plans::toggle_favorite(store, plan.id)? {
                println!("★ {} is now a favorite", plan.name);
            } else {
                println!("{} is no longer a favorite", plan.name);
            }
        }
        PlanCommand::Delete { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            plans::delete_plan(store, plan.id)?;
            println!("✓ Deleted plan {}", plan.name);
        }
    }
    Ok(())
}

fn print_plan<S: DataStore>(store: &S, plan: &WorkoutPlan) -> Result<()> {
    println!("{}{}", plan.name, if plan.is_favorite { " ★" } else { "" });
    if !plan.description.is_empty() {
        println!("  {}", plan.description);
    }
    println!("  id: {}", plan.id);
    for (i, e) in plans::plan_exercises(store, plan.id)?.iter().enumerate() {
        println!(
            "  {}. {} [{}] {}×{} @ {}, rest {}s",
            i + 1,
            e.name,
            e.muscle_group,
            e.default_sets,
            e.default_reps,
            format_weight(e.load),
            e.default_rest_seconds
        );
    }
    Ok(())
}

/// Match a 1-based position or a case-insensitive name
fn resolve_exercise<'a>(exercises: &'a [Exercise], key: &str) -> Result<&'a Exercise> {
    if let Ok(position) = key.trim().parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|i| exercises.get(i))
            .ok_or_else(|| Error::NotFound(format!("exercise #{}", position)));
    }
    exercises
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(key.trim()))
        .ok_or_else(|| Error::NotFound(format!("exercise '{}'", key.trim())))
}

// ============================================================================
// Sessions
// ============================================================================

fn cmd_session<S: DataStore>(store: &mut S, cmd: SessionCommand) -> Result<()> {
    match cmd {
        SessionCommand::Start { plan, conflict } => {
            let plan = plans::find_plan(store, &plan)?;
            let mut manager = SessionManager::load(store, plan.id)?;
            let started = match manager.start_session(store) {
                Ok(session) => session.clone(),
                Err(Error::SessionConflict(existing)) => match conflict.choice() {
                    ConflictChoice::Resume => {
                        manager.resume_session(store, *existing)?;
                        println!("Resumed session. {}", manager.progress_text());
                        return Ok(());
                    }
                    ConflictChoice::Abandon => {
                        manager.abandon_session(store, &existing)?;
                        manager.start_session(store)?.clone()
                    }
                    ConflictChoice::Ask => {
                        eprintln!(
                            "An unfinished session of {} from {} exists. Use --resume or --abandon.",
                            plan.name,
                            format_local(existing.start_date)
                        );
                        return Err(Error::SessionConflict(existing));
                    }
                },
                Err(e) => return Err(e),
            };
            println!(
                "✓ Started {} at {}",
                plan.name,
                format_local(started.start_date)
            );
        }
        SessionCommand::Status { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            let Some(manager) = resume_active(store, &plan)? else {
                println!("No active session for {}.", plan.name);
                return Ok(());
            };
            if let Some(session) = manager.current_session() {
                println!(
                    "{} since {}: {}",
                    plan.name,
                    format_local(session.start_date),
                    manager.progress_text()
                );
            }
            for (i, exercise) in manager.exercises().iter().enumerate() {
                let status = manager.exercise_status(store, exercise.id)?;
                println!("  {}. {} ({})", i + 1, exercise.name, status);
            }
        }
        SessionCommand::Log {
            plan,
            exercise,
            reps,
            weight,
            bodyweight,
        } => {
            let plan = plans::find_plan(store, &plan)?;
            let manager = resume_active(store, &plan)?.ok_or(Error::MissingSession)?;
            let exercise_id = resolve_exercise(manager.exercises(), &exercise)?.id;
            let mut recorder = manager.open_exercise(store, exercise_id)?;
            let load = if bodyweight {
                None
            } else {
                weight.or(recorder.target().load)
            };

            let set = recorder.record_set(store, load, reps)?;
            println!(
                "✓ {} set {}: {} × {}",
                recorder.exercise().name,
                set.set_number,
                set.formatted_weight(),
                set.reps
            );
            if let Some(last) = recorder.fetch_last_performance(store) {
                println!("  {}", last.formatted_text());
            }
            if recorder.has_reached_default_sets() {
                println!("  All {} planned sets done.", recorder.target().sets);
            } else {
                println!("  Next: {}", recorder.progress_text());
            }
        }
        SessionCommand::Finish { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            let mut manager = resume_active(store, &plan)?.ok_or(Error::MissingSession)?;
            let session = manager.finalize_session(store)?;
            let summary = SessionSummary::load(store, session.id)?;
            println!("✓ Finished {}", plan.name);
            println!(
                "  {} · {} exercises · {} sets · {} reps · {:.1} kg",
                summary.formatted_duration(),
                summary.completed_exercises,
                summary.total_sets,
                summary.total_reps,
                summary.total_volume
            );
        }
        SessionCommand::Abandon { plan } => {
            let plan = plans::find_plan(store, &plan)?;
            let existing =
                SessionManager::find_active(store, plan.id)?.ok_or(Error::MissingSession)?;
            let mut manager = SessionManager::load(store, plan.id)?;
            manager.abandon_session(store, &existing)?;
            println!("✓ Abandoned the session started {}", format_local(existing.start_date));
        }
    }
    Ok(())
}

/// Manager with the plan's unfinished session resumed, if there is one
fn resume_active<S: DataStore>(store: &S, plan: &WorkoutPlan) -> Result<Option<SessionManager>> {
    let Some(existing) = SessionManager::find_active(store, plan.id)? else {
        return Ok(None);
    };
    let mut manager = SessionManager::load(store, plan.id)?;
    manager.resume_session(store, existing)?;
    Ok(Some(manager))
}

// ============================================================================
// Interactive
// ============================================================================

fn cmd_workout<S: DataStore>(
    store: &mut S,
    plan: &str,
    on_conflict: ConflictChoice,
    config: &Config,
) -> Result<()> {
    let plan = plans::find_plan(store, plan)?;
    let mut console = Console::spawn();
    let notifier = desktop::DesktopNotifier::new();
    let mut timer = build_timer(&console, notifier.clone(), config);
    interactive::run_workout(store, &mut console, &mut timer, plan.id, on_conflict)?;
    notifier.wait_pending();
    Ok(())
}

fn cmd_rest(seconds: u32, config: &Config) -> Result<()> {
    if seconds == 0 {
        return Err(Error::InvalidInput(
            "Rest time must be greater than zero".into(),
        ));
    }
    let mut console = Console::spawn();
    let notifier = desktop::DesktopNotifier::new();
    let mut timer = build_timer(&console, notifier.clone(), config);
    interactive::run_rest(&mut console, &mut timer, seconds)?;
    notifier.wait_pending();
    Ok(())
}

fn build_timer(
    console: &Console,
    notifier: desktop::DesktopNotifier,
    config: &Config,
) -> RestTimer {
    let ticker = ThreadTicker::new(console.sender(), interactive::Event::Tick);
    let mut timer = RestTimer::new(ticker).with_cue(desktop::SoundCue::new(config.timer.sound));
    timer = if config.timer.notifications {
        timer.with_notifier(notifier)
    } else {
        timer.with_notifier(LoggingNotifier)
    };
    // A terminal cannot tell whether it has focus
    timer.set_foreground(false);
    timer
}

// ============================================================================
// Check-ins and history
// ============================================================================

fn cmd_checkin<S: DataStore>(
    store: &mut S,
    at: Option<String>,
    details: CheckInDetails,
) -> Result<()> {
    let explicit = at.is_some()
        || details.title.is_some()
        || details.exercise_type.is_some()
        || details.calories.is_some()
        || details.location.is_some();

    if !explicit {
        let now = Local::now();
        match checkins::check_in_today(store, &now)? {
            Some(check_in) => println!("✓ Checked in at {}", format_local(check_in.timestamp)),
            None => println!("Already checked in today."),
        }
        return Ok(());
    }

    let now = Utc::now();
    let when = match at {
        Some(text) => parse_local_time(&text)?,
        None => now,
    };
    let check_in = checkins::register_check_in(store, when, now, details)?;
    println!("✓ Check-in registered for {}", format_local(check_in.timestamp));
    Ok(())
}

fn cmd_streak<S: DataStore>(store: &S, config: &Config) -> Result<()> {
    let now = Local::now();
    let summary = checkins::streak_summary(store, &now, config.checkin.streak_window)?;
    let month = checkins::monthly_stats(store, &now)?;

    println!("Current streak: {} days", summary.current);
    println!("Longest streak: {} days", summary.longest);
    println!(
        "This month:     {}/{} days ({})",
        month.days_checked_in,
        month.days_in_month,
        month.formatted_percentage()
    );
    match checkins::today_check_in(store, &now)? {
        Some(c) => println!("Checked in today at {}", format_local(c.timestamp)),
        None => println!("Not checked in today. Run `repset checkin`."),
    }
    Ok(())
}

fn cmd_calendar<S: DataStore>(store: &S) -> Result<()> {
    let months = checkins::calendar_months(store, &Local)?;
    if months.is_empty() {
        println!("No check-ins yet.");
    }
    for month in months {
        let days: Vec<String> = month.days.keys().map(|d| d.format("%-d").to_string()).collect();
        println!(
            "{}: {} days ({})",
            month.month.format("%B %Y"),
            days.len(),
            days.join(", ")
        );
    }
    Ok(())
}

fn cmd_history<S: DataStore>(store: &S, limit: usize) -> Result<()> {
    let sessions = history::completed_sessions(store, limit)?;
    if sessions.is_empty() {
        println!("No completed workouts yet.");
    }
    for session in sessions {
        let summary = SessionSummary::load(store, session.id)?;
        println!(
            "{}  {}  {} · {} sets · {:.1} kg",
            format_local(summary.started_at),
            summary.plan_name,
            summary.formatted_duration(),
            summary.total_sets,
            summary.total_volume
        );
    }
    Ok(())
}

fn cmd_records<S: DataStore>(store: &S) -> Result<()> {
    let stats = history::exercise_stats(store)?;
    if stats.is_empty() {
        println!("No sets recorded yet.");
    }
    for s in stats {
        let record = s
            .personal_record
            .as_ref()
            .map(|pr| format!("PR {}", pr.formatted()))
            .unwrap_or_else(|| "bodyweight".into());
        let one_rep = s
            .estimated_one_rep_max
            .map(|v| format!(", est. 1RM {:.1} kg", v))
            .unwrap_or_default();
        println!(
            "{}: {} sets, {}{}, last {}",
            s.name,
            s.total_sets,
            record,
            one_rep,
            format_local(s.last_execution)
        );
    }
    Ok(())
}

fn cmd_export<S: DataStore>(store: &S, path: &Path, since: Option<String>) -> Result<()> {
    let since = since.as_deref().map(parse_local_time).transpose()?;
    let count = export::export_sets(store, path, since)?;
    println!("✓ Exported {} sets", count);
    println!("  CSV: {}", path.display());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Parse "YYYY-MM-DD HH:MM" or "YYYY-MM-DD" as local time
fn parse_local_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| Error::InvalidInput(format!("Invalid date: {}", text)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidInput(format!("Nonexistent local time: {}", text)))
}
