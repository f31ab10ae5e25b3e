//! Set sequencing for one exercise within one session.
//!
//! A recorder is rebuilt from the store whenever an exercise is opened, so set
//! numbering survives restarts: the next set number follows the highest one
//! already recorded for this exercise in this session.

use crate::store::{DataStore, Query, SortOrder};
use crate::types::{format_weight, validate_load, validate_reps};
use crate::{Error, Exercise, ExerciseSet, Result, WorkoutSession};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// What the plan asks for on each set
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetTarget {
    pub sets: u32,
    pub reps: u32,
    pub load: Option<f64>,
}

/// Most recent set of the same exercise in an earlier session
#[derive(Clone, Debug, PartialEq)]
pub struct LastPerformance {
    pub weight: Option<f64>,
    pub reps: u32,
    pub date: DateTime<Utc>,
}

impl LastPerformance {
    pub fn formatted_text(&self) -> String {
        format!("Last time: {} × {} reps", format_weight(self.weight), self.reps)
    }
}

pub struct SetRecorder {
    exercise: Exercise,
    session_id: Uuid,
    plan_id: Uuid,
    completed: Vec<ExerciseSet>,
    current_set_number: u32,
}

impl SetRecorder {
    /// Open the recorder, resuming from sets already in the store
    pub fn load<S: DataStore>(
        store: &S,
        exercise: Exercise,
        session: &WorkoutSession,
    ) -> Result<Self> {
        let session_id = session.id;
        let exercise_id = exercise.id;
        let completed = store.fetch(
            &Query::filter(move |s: &ExerciseSet| {
                s.session_id == session_id && s.exercise_id == Some(exercise_id)
            })
            .sort_by_key(|s| s.set_number, SortOrder::Ascending),
        )?;

        let current_set_number = completed.last().map_or(1, |s| s.set_number + 1);
        tracing::debug!(
            "Opened {} in session {} at set {}",
            exercise.name,
            session_id,
            current_set_number
        );

        Ok(Self {
            exercise,
            session_id,
            plan_id: session.plan_id,
            completed,
            current_set_number,
        })
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn completed_sets(&self) -> &[ExerciseSet] {
        &self.completed
    }

    pub fn current_set_number(&self) -> u32 {
        self.current_set_number
    }

    pub fn target(&self) -> SetTarget {
        SetTarget {
            sets: self.exercise.default_sets,
            reps: self.exercise.default_reps,
            load: self.exercise.load,
        }
    }

    pub fn rest_seconds(&self) -> u32 {
        self.exercise.default_rest_seconds
    }

    /// True once the set counter has moved past the planned number of sets
    pub fn is_last_set(&self) -> bool {
        self.current_set_number > self.exercise.default_sets
    }

    pub fn sets_remaining(&self) -> u32 {
        self.exercise
            .default_sets
            .saturating_sub(self.current_set_number - 1)
    }

    pub fn has_reached_default_sets(&self) -> bool {
        self.completed.len() as u32 >= self.exercise.default_sets
    }

    /// e.g. `"Set 2 of 3"`
    pub fn progress_text(&self) -> String {
        format!(
            "Set {} of {}",
            self.current_set_number, self.exercise.default_sets
        )
    }

    /// Validate and persist the next set.
    ///
    /// `load` of `None` records a bodyweight set. Nothing changes in memory
    /// unless the store commit succeeds.
    pub fn record_set<S: DataStore>(
        &mut self,
        store: &mut S,
        load: Option<f64>,
        reps: u32,
    ) -> Result<ExerciseSet> {
        validate_reps(reps)?;
        validate_load(load)?;

        let set = ExerciseSet {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            exercise_id: Some(self.exercise.id),
            set_number: self.current_set_number,
            weight: load,
            reps,
            completed_at: Utc::now(),
            notes: String::new(),
        };

        let session_id = self.session_id;
        let to_insert = set.clone();
        store.transaction(move |tx| {
            let session = tx
                .get::<WorkoutSession>(session_id)
                .ok_or(Error::MissingSession)?;
            if session.is_completed {
                return Err(Error::InvalidInput(
                    "Cannot record sets on a completed session".into(),
                ));
            }
            tx.insert(to_insert)
        })?;

        tracing::info!(
            "Recorded set {} of {}: {} × {}",
            set.set_number,
            self.exercise.name,
            set.formatted_weight(),
            set.reps
        );
        self.completed.push(set.clone());
        self.current_set_number += 1;
        Ok(set)
    }

    /// Best-effort lookup of what was done last time; never fails
    pub fn fetch_last_performance<S: DataStore>(&self, store: &S) -> Option<LastPerformance> {
        match self.query_last_performance(store) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    "Could not look up last performance for {}: {}",
                    self.exercise.name,
                    e
                );
                None
            }
        }
    }

    fn query_last_performance<S: DataStore>(&self, store: &S) -> Result<Option<LastPerformance>> {
        let plan_id = self.plan_id;
        let current = self.session_id;
        let past_sessions: HashSet<Uuid> = store
            .fetch(&Query::filter(move |s: &WorkoutSession| {
                s.plan_id == plan_id && s.is_completed && s.id != current
            }))?
            .into_iter()
            .map(|s| s.id)
            .collect();

        if past_sessions.is_empty() {
            return Ok(None);
        }

        let exercise_id = self.exercise.id;
        let latest = store
            .fetch(
                &Query::filter(|s: &ExerciseSet| {
                    s.exercise_id == Some(exercise_id) && past_sessions.contains(&s.session_id)
                })
                .sort_by_key(|s| s.completed_at, SortOrder::Descending)
                .limit(1),
            )?
            .into_iter()
            .next();

        Ok(latest.map(|s| LastPerformance {
            weight: s.weight,
            reps: s.reps,
            date: s.completed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreBackend, StoreData};
    use crate::{MuscleGroup, WorkoutPlan};
    use chrono::Duration;

    struct Fixture {
        store: Store<crate::MemoryBackend>,
        plan: WorkoutPlan,
        exercise: Exercise,
        session: WorkoutSession,
    }

    fn fixture() -> Fixture {
        let mut store = Store::in_memory();
        let plan = WorkoutPlan::new("Upper", "");
        let mut exercise = Exercise::new(plan.id, "Bench Press", MuscleGroup::Chest);
        exercise.default_sets = 3;
        exercise.load = Some(60.0);
        let session = WorkoutSession::start(plan.id, Utc::now());

        let (p, e, s) = (plan.clone(), exercise.clone(), session.clone());
        store
            .transaction(|tx| {
                tx.insert(p)?;
                tx.insert(e)?;
                tx.insert(s)
            })
            .unwrap();

        Fixture {
            store,
            plan,
            exercise,
            session,
        }
    }

    #[test]
    fn test_sets_are_numbered_sequentially() {
        let mut f = fixture();
        let mut recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        assert_eq!(recorder.current_set_number(), 1);
        assert_eq!(recorder.progress_text(), "Set 1 of 3");

        let first = recorder.record_set(&mut f.store, Some(60.0), 10).unwrap();
        let second = recorder.record_set(&mut f.store, None, 8).unwrap();

        assert_eq!(first.set_number, 1);
        assert_eq!(second.set_number, 2);
        assert_eq!(second.weight, None);
        assert_eq!(recorder.current_set_number(), 3);
        assert_eq!(recorder.sets_remaining(), 1);
        assert!(!recorder.is_last_set());
        assert_eq!(f.store.data().sets.len(), 2);
    }

    #[test]
    fn test_zero_reps_rejected_without_increment() {
        let mut f = fixture();
        let mut recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();

        let result = recorder.record_set(&mut f.store, Some(60.0), 0);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(recorder.current_set_number(), 1);
        assert_eq!(f.store.commit_count(), 1); // only the fixture
    }

    #[test]
    fn test_non_positive_load_rejected() {
        let mut f = fixture();
        let mut recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();

        assert!(recorder.record_set(&mut f.store, Some(0.0), 5).is_err());
        assert!(recorder.record_set(&mut f.store, Some(-2.5), 5).is_err());
        assert!(recorder.completed_sets().is_empty());
    }

    #[test]
    fn test_resume_continues_numbering() {
        let mut f = fixture();
        {
            let mut recorder =
                SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
            recorder.record_set(&mut f.store, Some(60.0), 10).unwrap();
            recorder.record_set(&mut f.store, Some(60.0), 9).unwrap();
        }

        let recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        assert_eq!(recorder.completed_sets().len(), 2);
        assert_eq!(recorder.current_set_number(), 3);
    }

    #[test]
    fn test_last_set_and_default_sets_reached() {
        let mut f = fixture();
        let mut recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        for _ in 0..3 {
            recorder.record_set(&mut f.store, Some(60.0), 10).unwrap();
        }
        assert!(recorder.is_last_set());
        assert!(recorder.has_reached_default_sets());
        assert_eq!(recorder.sets_remaining(), 0);

        // Extra sets beyond the plan are still allowed
        let extra = recorder.record_set(&mut f.store, Some(60.0), 6).unwrap();
        assert_eq!(extra.set_number, 4);
    }

    #[test]
    fn test_persistence_failure_keeps_set_number() {
        #[derive(Default)]
        struct ToggleBackend {
            snapshot: StoreData,
            fail: bool,
        }
        impl StoreBackend for ToggleBackend {
            fn load(&self) -> Result<StoreData> {
                Ok(self.snapshot.clone())
            }
            fn persist(&mut self, data: &StoreData) -> Result<()> {
                if self.fail {
                    return Err(Error::Other("write failed".into()));
                }
                self.snapshot = data.clone();
                Ok(())
            }
        }

        let f = fixture();
        let mut store = Store::open(ToggleBackend::default()).unwrap();
        let seeded = f.store.data().clone();
        store
            .transaction(|tx| {
                for p in seeded.plans {
                    tx.insert(p)?;
                }
                for e in seeded.exercises {
                    tx.insert(e)?;
                }
                for s in seeded.sessions {
                    tx.insert(s)?;
                }
                Ok(())
            })
            .unwrap();
        store.backend_mut().fail = true;

        let mut recorder = SetRecorder::load(&store, f.exercise.clone(), &f.session).unwrap();
        let result = recorder.record_set(&mut store, Some(60.0), 10);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(recorder.current_set_number(), 1);
        assert!(recorder.completed_sets().is_empty());
        assert!(store.data().sets.is_empty());
    }

    #[test]
    fn test_completed_session_rejects_sets() {
        let mut f = fixture();
        let mut closed = f.session.clone();
        closed.close(Utc::now());
        f.store.transaction(|tx| tx.update(closed)).unwrap();

        let mut recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        let result = recorder.record_set(&mut f.store, Some(60.0), 10);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_last_performance_uses_latest_prior_set() {
        let mut f = fixture();
        let now = Utc::now();

        let mut old = WorkoutSession::start(f.plan.id, now - Duration::days(7));
        old.close(now - Duration::days(7) + Duration::hours(1));
        let mut recent = WorkoutSession::start(f.plan.id, now - Duration::days(2));
        recent.close(now - Duration::days(2) + Duration::hours(1));
        let unfinished = WorkoutSession::start(f.plan.id, now - Duration::days(1));

        let make_set = |session: &WorkoutSession, n: u32, weight: f64, offset: i64| ExerciseSet {
            id: Uuid::new_v4(),
            session_id: session.id,
            exercise_id: Some(f.exercise.id),
            set_number: n,
            weight: Some(weight),
            reps: 8,
            completed_at: session.start_date + Duration::minutes(offset),
            notes: String::new(),
        };
        let sets = vec![
            make_set(&old, 1, 50.0, 5),
            make_set(&recent, 1, 55.0, 5),
            make_set(&recent, 2, 57.5, 10),
            make_set(&unfinished, 1, 70.0, 5),
        ];

        f.store
            .transaction(|tx| {
                tx.insert(old)?;
                tx.insert(recent)?;
                tx.insert(unfinished)?;
                for set in sets {
                    tx.insert(set)?;
                }
                Ok(())
            })
            .unwrap();

        let recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        let last = recorder.fetch_last_performance(&f.store).unwrap();
        assert_eq!(last.weight, Some(57.5));
        assert_eq!(last.formatted_text(), "Last time: 57.5 kg × 8 reps");
    }

    #[test]
    fn test_last_performance_absent_without_history() {
        let f = fixture();
        let recorder = SetRecorder::load(&f.store, f.exercise.clone(), &f.session).unwrap();
        assert!(recorder.fetch_last_performance(&f.store).is_none());
    }
}
