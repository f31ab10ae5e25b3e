//! CSV export of recorded sets.
//!
//! Rows are appended to the target file. The header is written only when the
//! file is empty, and the file is synced to disk before returning.

use crate::store::{DataStore, Query, SortOrder};
use crate::{Exercise, ExerciseSet, Result, WorkoutPlan, WorkoutSession};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use uuid::Uuid;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    session_id: String,
    plan: String,
    session_started_at: String,
    exercise: String,
    muscle_group: String,
    set_number: u32,
    weight_kg: Option<f64>,
    reps: u32,
    volume_kg: f64,
    completed_at: String,
}

/// Append every set of completed sessions to `csv_path`.
///
/// With `since`, only sessions that ended at or after it are included.
/// Returns the number of rows written.
pub fn export_sets<S: DataStore>(
    store: &S,
    csv_path: &Path,
    since: Option<DateTime<Utc>>,
) -> Result<usize> {
    let sessions: HashMap<Uuid, WorkoutSession> = store
        .fetch(&Query::filter(move |s: &WorkoutSession| {
            s.is_completed && since.map_or(true, |t| s.end_date.is_some_and(|end| end >= t))
        }))?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let sets = store.fetch(
        &Query::filter(|s: &ExerciseSet| sessions.contains_key(&s.session_id))
            .sort_by_key(|s| (s.completed_at, s.set_number), SortOrder::Ascending),
    )?;

    if sets.is_empty() {
        tracing::info!("No completed sets to export");
        return Ok(0);
    }

    let plans: HashMap<Uuid, String> = store
        .fetch(&Query::<WorkoutPlan>::all())?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let exercises: HashMap<Uuid, Exercise> = store
        .fetch(&Query::<Exercise>::all())?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for set in &sets {
        let Some(session) = sessions.get(&set.session_id) else {
            continue;
        };
        let exercise = set.exercise_id.and_then(|id| exercises.get(&id));
        writer.serialize(CsvRow {
            session_id: session.id.to_string(),
            plan: plans.get(&session.plan_id).cloned().unwrap_or_default(),
            session_started_at: session.start_date.to_rfc3339(),
            exercise: exercise.map(|e| e.name.clone()).unwrap_or_default(),
            muscle_group: exercise
                .map(|e| e.muscle_group.label().to_string())
                .unwrap_or_default(),
            set_number: set.set_number,
            weight_kg: set.weight,
            reps: set.reps,
            volume_kg: set.volume(),
            completed_at: set.completed_at.to_rfc3339(),
        })?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} sets to {:?}", sets.len(), csv_path);
    Ok(sets.len())
}
