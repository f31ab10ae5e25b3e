//! Workout history and per-exercise statistics.
//!
//! Everything here is a read-only projection over the store.

use crate::store::{DataStore, Query, SortOrder};
use crate::{Exercise, ExerciseSet, Result, WorkoutPlan, WorkoutSession};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Heaviest set for an exercise, tie-broken by most reps at that weight
#[derive(Clone, Debug, PartialEq)]
pub struct PersonalRecord {
    pub weight: f64,
    pub reps: u32,
    pub date: DateTime<Utc>,
}

impl PersonalRecord {
    pub fn formatted(&self) -> String {
        format!("{:.1} kg × {}", self.weight, self.reps)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseStats {
    pub name: String,
    pub last_execution: DateTime<Utc>,
    pub total_sets: usize,
    pub personal_record: Option<PersonalRecord>,
    /// Best Brzycki estimate over all weighted sets
    pub estimated_one_rep_max: Option<f64>,
}

/// What a finished session amounted to
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub plan_name: String,
    pub started_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    /// Distinct exercises with at least one recorded set
    pub completed_exercises: usize,
    pub total_sets: usize,
    pub total_reps: u32,
    /// Sum of weight × reps, in kg
    pub total_volume: f64,
}

impl SessionSummary {
    pub fn load<S: DataStore>(store: &S, session_id: Uuid) -> Result<Self> {
        let session: WorkoutSession = store.require(session_id)?;
        let plan_name = store
            .get::<WorkoutPlan>(session.plan_id)?
            .map(|p| p.name)
            .unwrap_or_default();
        let sets = store.fetch(&Query::filter(move |s: &ExerciseSet| {
            s.session_id == session_id
        }))?;

        let completed_exercises = sets
            .iter()
            .filter_map(|s| s.exercise_id)
            .collect::<HashSet<_>>()
            .len();

        Ok(Self {
            session_id,
            plan_name,
            started_at: session.start_date,
            duration: session.duration(),
            completed_exercises,
            total_sets: sets.len(),
            total_reps: sets.iter().map(|s| s.reps).sum(),
            total_volume: sets.iter().map(ExerciseSet::volume).sum(),
        })
    }

    pub fn formatted_duration(&self) -> String {
        self.duration
            .map(format_duration)
            .unwrap_or_else(|| "in progress".into())
    }
}

/// `"1h 5min"`, `"12min"` or `"45s"`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {}min", hours, minutes)
    } else if minutes > 0 {
        format!("{}min", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Completed sessions, newest first
pub fn completed_sessions<S: DataStore>(store: &S, limit: usize) -> Result<Vec<WorkoutSession>> {
    store.fetch(
        &Query::filter(|s: &WorkoutSession| s.is_completed)
            .sort_by_key(|s| s.start_date, SortOrder::Descending)
            .limit(limit),
    )
}

/// Personal record over `sets`; `None` when none of them carries a weight.
///
/// A full tie keeps the earliest set, when the record was first reached.
pub fn personal_record<'a, I>(sets: I) -> Option<PersonalRecord>
where
    I: IntoIterator<Item = &'a ExerciseSet>,
{
    let mut best: Option<PersonalRecord> = None;
    for set in sets {
        let Some(weight) = set.weight else {
            continue;
        };
        let better = match &best {
            None => true,
            Some(pr) => {
                weight > pr.weight
                    || (weight == pr.weight && set.reps > pr.reps)
                    || (weight == pr.weight && set.reps == pr.reps && set.completed_at < pr.date)
            }
        };
        if better {
            best = Some(PersonalRecord {
                weight,
                reps: set.reps,
                date: set.completed_at,
            });
        }
    }
    best
}

/// Statistics for every exercise that has recorded sets, most recently
/// trained first.
///
/// Exercises are grouped by name so the same movement in different plans
/// shares one record. Sets whose exercise was deleted are skipped.
pub fn exercise_stats<S: DataStore>(store: &S) -> Result<Vec<ExerciseStats>> {
    let names: HashMap<Uuid, String> = store
        .fetch(&Query::<Exercise>::all())?
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect();

    let mut grouped: HashMap<String, Vec<ExerciseSet>> = HashMap::new();
    for set in store.fetch(&Query::<ExerciseSet>::all())? {
        let Some(name) = set.exercise_id.and_then(|id| names.get(&id)) else {
            continue;
        };
        grouped.entry(name.clone()).or_default().push(set);
    }

    let mut stats: Vec<ExerciseStats> = grouped
        .into_iter()
        .filter_map(|(name, sets)| {
            let last_execution = sets.iter().map(|s| s.completed_at).max()?;
            Some(ExerciseStats {
                personal_record: personal_record(&sets),
                estimated_one_rep_max: sets
                    .iter()
                    .filter_map(ExerciseSet::one_rep_max)
                    .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v)))),
                total_sets: sets.len(),
                last_execution,
                name,
            })
        })
        .collect();

    stats.sort_by(|a, b| {
        b.last_execution
            .cmp(&a.last_execution)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::MuscleGroup;

    fn set_at(
        session: &WorkoutSession,
        exercise: Option<Uuid>,
        weight: Option<f64>,
        reps: u32,
        minutes: i64,
    ) -> ExerciseSet {
        ExerciseSet {
            id: Uuid::new_v4(),
            session_id: session.id,
            exercise_id: exercise,
            set_number: 1,
            weight,
            reps,
            completed_at: session.start_date + Duration::minutes(minutes),
            notes: String::new(),
        }
    }

    #[test]
    fn test_personal_record_tie_breaks_on_reps() {
        let session = WorkoutSession::start(Uuid::new_v4(), Utc::now());
        let sets = vec![
            set_at(&session, None, Some(80.0), 5, 1),
            set_at(&session, None, Some(100.0), 3, 2),
            set_at(&session, None, Some(100.0), 5, 3),
            set_at(&session, None, Some(100.0), 5, 4),
            set_at(&session, None, None, 20, 5),
        ];
        let pr = personal_record(&sets).unwrap();
        assert_eq!(pr.weight, 100.0);
        assert_eq!(pr.reps, 5);
        assert_eq!(pr.date, sets[2].completed_at);
        assert_eq!(pr.formatted(), "100.0 kg × 5");
    }

    #[test]
    fn test_personal_record_absent_for_bodyweight() {
        let session = WorkoutSession::start(Uuid::new_v4(), Utc::now());
        let sets = vec![set_at(&session, None, None, 15, 1)];
        assert!(personal_record(&sets).is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::minutes(12)), "12min");
        assert_eq!(format_duration(Duration::minutes(65)), "1h 5min");
    }

    #[test]
    fn test_summary_and_stats() {
        let mut store = Store::in_memory();
        let plan = WorkoutPlan::new("Push", "");
        let bench = Exercise::new(plan.id, "Bench", MuscleGroup::Chest);
        let mut dips = Exercise::new(plan.id, "Dips", MuscleGroup::Chest);
        dips.order = 1;

        let start = Utc::now() - Duration::hours(2);
        let mut session = WorkoutSession::start(plan.id, start);
        session.close(start + Duration::minutes(50));

        let sets = vec![
            set_at(&session, Some(bench.id), Some(60.0), 10, 5),
            set_at(&session, Some(bench.id), Some(70.0), 8, 10),
            set_at(&session, Some(dips.id), None, 12, 20),
        ];
        let session_id = session.id;
        store
            .transaction(|tx| {
                tx.insert(plan)?;
                tx.insert(bench)?;
                tx.insert(dips)?;
                tx.insert(session)?;
                for s in sets {
                    tx.insert(s)?;
                }
                Ok(())
            })
            .unwrap();

        let summary = SessionSummary::load(&store, session_id).unwrap();
        assert_eq!(summary.plan_name, "Push");
        assert_eq!(summary.completed_exercises, 2);
        assert_eq!(summary.total_sets, 3);
        assert_eq!(summary.total_reps, 30);
        assert!((summary.total_volume - 1160.0).abs() < 1e-9);
        assert_eq!(summary.formatted_duration(), "50min");

        let stats = exercise_stats(&store).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "Dips");
        assert!(stats[0].personal_record.is_none());
        assert_eq!(stats[1].name, "Bench");
        assert_eq!(stats[1].total_sets, 2);
        assert_eq!(stats[1].personal_record.as_ref().unwrap().weight, 70.0);
        assert!(stats[1].estimated_one_rep_max.unwrap() > 70.0);

        assert_eq!(completed_sessions(&store, 50).unwrap().len(), 1);
    }

    #[test]
    fn test_completed_sessions_newest_first_and_limited() {
        let mut store = Store::in_memory();
        let plan = WorkoutPlan::new("Legs", "");
        let plan_id = plan.id;
        let now = Utc::now();
        store
            .transaction(|tx| {
                tx.insert(plan)?;
                for days in 1..=5 {
                    let mut s = WorkoutSession::start(plan_id, now - Duration::days(days));
                    s.close(now - Duration::days(days) + Duration::hours(1));
                    tx.insert(s)?;
                }
                tx.insert(WorkoutSession::start(plan_id, now))
            })
            .unwrap();

        let sessions = completed_sessions(&store, 3).unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|s| s.is_completed));
        assert!(sessions[0].start_date > sessions[1].start_date);
        assert_eq!(sessions[0].start_date, now - Duration::days(1));
    }
}
