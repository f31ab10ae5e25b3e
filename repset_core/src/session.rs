//! Workout session lifecycle.
//!
//! A [`SessionManager`] is bound to one plan and tracks at most one current
//! session for it:
//!
//! ```text
//! NoSession --start--> Active --finalize--> Completed
//!     |                  ^
//!     +-----resume-------+
//! ```
//!
//! Starting a session while another unfinished one exists for the same plan is
//! reported as [`Error::SessionConflict`]; the caller decides whether to resume
//! or abandon it. The check and the insert run in a single store transaction.

use crate::set_recorder::SetRecorder;
use crate::store::{DataStore, Query, SortOrder};
use crate::{Error, Exercise, ExerciseSet, Result, WorkoutPlan, WorkoutSession};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Derived state of one exercise within the current session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExerciseStatus {
    Pending,
    InProgress,
    Completed,
}

impl fmt::Display for ExerciseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExerciseStatus::Pending => "pending",
            ExerciseStatus::InProgress => "in progress",
            ExerciseStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

pub struct SessionManager {
    plan: WorkoutPlan,
    exercises: Vec<Exercise>,
    current: Option<WorkoutSession>,
    completed: HashSet<Uuid>,
}

impl SessionManager {
    /// Bind a manager to `plan_id`, with its exercises in plan order
    pub fn load<S: DataStore>(store: &S, plan_id: Uuid) -> Result<Self> {
        let plan: WorkoutPlan = store.require(plan_id)?;
        let exercises = store.fetch(
            &Query::filter(move |e: &Exercise| e.plan_id == plan_id)
                .sort_by_key(|e| e.order, SortOrder::Ascending),
        )?;

        Ok(Self {
            plan,
            exercises,
            current: None,
            completed: HashSet::new(),
        })
    }

    pub fn plan(&self) -> &WorkoutPlan {
        &self.plan
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn current_session(&self) -> Option<&WorkoutSession> {
        self.current.as_ref()
    }

    pub fn is_session_active(&self) -> bool {
        self.current.as_ref().is_some_and(|s| !s.is_completed)
    }

    /// The newest unfinished session of `plan_id`, if any
    pub fn find_active<S: DataStore>(store: &S, plan_id: Uuid) -> Result<Option<WorkoutSession>> {
        Ok(store
            .fetch(&active_sessions(plan_id).limit(1))?
            .into_iter()
            .next())
    }

    /// Create and persist a new session for the plan.
    ///
    /// Fails with [`Error::SessionConflict`] carrying the existing session when
    /// one is still unfinished.
    pub fn start_session<S: DataStore>(&mut self, store: &mut S) -> Result<&WorkoutSession> {
        let plan_id = self.plan.id;
        let session = WorkoutSession::start(plan_id, Utc::now());
        let to_insert = session.clone();

        store.transaction(move |tx| {
            if let Some(existing) = tx.fetch(&active_sessions(plan_id).limit(1)).pop() {
                return Err(Error::SessionConflict(Box::new(existing)));
            }
            tx.insert(to_insert)
        })?;

        tracing::info!("Started session {} for plan '{}'", session.id, self.plan.name);
        self.completed.clear();
        Ok(self.current.insert(session))
    }

    /// Adopt an unfinished session of this plan as the current one.
    ///
    /// Every exercise that already has recorded sets counts as completed.
    pub fn resume_session<S: DataStore>(
        &mut self,
        store: &S,
        existing: WorkoutSession,
    ) -> Result<&WorkoutSession> {
        if existing.plan_id != self.plan.id {
            return Err(Error::InvalidInput(
                "Session belongs to a different plan".into(),
            ));
        }
        if existing.is_completed {
            return Err(Error::InvalidInput(
                "Cannot resume a completed session".into(),
            ));
        }

        let session_id = existing.id;
        let completed: HashSet<Uuid> = store
            .fetch(&Query::filter(move |s: &ExerciseSet| s.session_id == session_id))?
            .into_iter()
            .filter_map(|s| s.exercise_id)
            .collect();

        tracing::info!(
            "Resumed session {} with {} exercises done",
            session_id,
            completed.len()
        );
        self.completed = completed;
        Ok(self.current.insert(existing))
    }

    /// Force-close an unfinished session without finishing its exercises
    pub fn abandon_session<S: DataStore>(
        &mut self,
        store: &mut S,
        existing: &WorkoutSession,
    ) -> Result<WorkoutSession> {
        let session_id = existing.id;
        let closed = store.transaction(move |tx| {
            let mut session = tx
                .get::<WorkoutSession>(session_id)
                .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
            if session.is_completed {
                return Ok(session);
            }
            session.close(Utc::now());
            tx.update(session.clone())?;
            Ok(session)
        })?;

        if self.current.as_ref().is_some_and(|s| s.id == session_id) {
            self.current = None;
            self.completed.clear();
        }
        tracing::info!("Abandoned session {}", session_id);
        Ok(closed)
    }

    /// Close the current session. This is the only way a session completes.
    pub fn finalize_session<S: DataStore>(&mut self, store: &mut S) -> Result<WorkoutSession> {
        let mut session = self.current.clone().ok_or(Error::MissingSession)?;
        if session.is_completed {
            return Err(Error::InvalidInput("Session is already completed".into()));
        }

        session.close(Utc::now());
        session.validate()?;
        let to_update = session.clone();
        store.transaction(move |tx| tx.update(to_update))?;

        tracing::info!(
            "Finished session {} ({}/{} exercises)",
            session.id,
            self.completed_count(),
            self.exercises.len()
        );
        self.current = None;
        Ok(session)
    }

    /// Open the set recorder for one of the plan's exercises
    pub fn open_exercise<S: DataStore>(&self, store: &S, exercise_id: Uuid) -> Result<SetRecorder> {
        let session = self.current.as_ref().ok_or(Error::MissingSession)?;
        let exercise = self
            .exercise(exercise_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
        SetRecorder::load(store, exercise, session)
    }

    pub fn exercise(&self, exercise_id: Uuid) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }

    /// Returns false if the exercise was already marked or is not in the plan
    pub fn mark_exercise_complete(&mut self, exercise_id: Uuid) -> bool {
        if self.exercise(exercise_id).is_none() {
            return false;
        }
        self.completed.insert(exercise_id)
    }

    pub fn is_exercise_complete(&self, exercise_id: Uuid) -> bool {
        self.completed.contains(&exercise_id)
    }

    /// Completed if marked, in progress once it has a set, else pending
    pub fn exercise_status<S: DataStore>(
        &self,
        store: &S,
        exercise_id: Uuid,
    ) -> Result<ExerciseStatus> {
        if self.is_exercise_complete(exercise_id) {
            return Ok(ExerciseStatus::Completed);
        }
        let Some(session_id) = self.current.as_ref().map(|s| s.id) else {
            return Ok(ExerciseStatus::Pending);
        };

        let has_sets = !store
            .fetch(
                &Query::filter(move |s: &ExerciseSet| {
                    s.session_id == session_id && s.exercise_id == Some(exercise_id)
                })
                .limit(1),
            )?
            .is_empty();

        Ok(if has_sets {
            ExerciseStatus::InProgress
        } else {
            ExerciseStatus::Pending
        })
    }

    pub fn completed_count(&self) -> usize {
        self.exercises
            .iter()
            .filter(|e| self.completed.contains(&e.id))
            .count()
    }

    /// e.g. `"2/5 exercises complete"`
    pub fn progress_text(&self) -> String {
        format!(
            "{}/{} exercises complete",
            self.completed_count(),
            self.exercises.len()
        )
    }

    pub fn progress_fraction(&self) -> f64 {
        if self.exercises.is_empty() {
            return 0.0;
        }
        self.completed_count() as f64 / self.exercises.len() as f64
    }
}

/// Unfinished sessions of a plan, newest first
fn active_sessions<'a>(plan_id: Uuid) -> Query<'a, WorkoutSession> {
    Query::filter(move |s: &WorkoutSession| s.plan_id == plan_id && !s.is_completed)
        .sort_by_key(|s| s.start_date, SortOrder::Descending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreBackend, StoreData};
    use crate::{MemoryBackend, MuscleGroup};
    use chrono::Duration;

    /// Backend seeded with data whose commits can be made to fail
    struct SeededBackend {
        seed: StoreData,
        fail: bool,
    }

    impl StoreBackend for SeededBackend {
        fn load(&self) -> Result<StoreData> {
            Ok(self.seed.clone())
        }

        fn persist(&mut self, data: &StoreData) -> Result<()> {
            if self.fail {
                return Err(Error::Other("disk full".into()));
            }
            self.seed = data.clone();
            Ok(())
        }
    }

    fn seed() -> (StoreData, Uuid, Vec<Uuid>) {
        let plan = WorkoutPlan::new("Full Body", "");
        let mut data = StoreData::default();
        let mut ids = Vec::new();
        for (order, (name, group)) in [
            ("Squat", MuscleGroup::Legs),
            ("Row", MuscleGroup::Back),
            ("Press", MuscleGroup::Shoulders),
        ]
        .into_iter()
        .enumerate()
        {
            let mut exercise = Exercise::new(plan.id, name, group);
            // Stored out of order to check plan ordering on load
            exercise.order = 2 - order as u32;
            ids.push(exercise.id);
            data.exercises.push(exercise);
        }
        let plan_id = plan.id;
        data.plans.push(plan);
        (data, plan_id, ids)
    }

    fn memory_store() -> (Store<MemoryBackend>, Uuid, Vec<Uuid>) {
        let (data, plan_id, ids) = seed();
        let mut store = Store::in_memory();
        store
            .transaction(|tx| {
                for p in data.plans {
                    tx.insert(p)?;
                }
                for e in data.exercises {
                    tx.insert(e)?;
                }
                Ok(())
            })
            .unwrap();
        (store, plan_id, ids)
    }

    #[test]
    fn test_exercises_load_in_plan_order() {
        let (store, plan_id, _) = memory_store();
        let manager = SessionManager::load(&store, plan_id).unwrap();
        let names: Vec<_> = manager.exercises().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Press", "Row", "Squat"]);
        assert_eq!(manager.progress_text(), "0/3 exercises complete");
    }

    #[test]
    fn test_second_start_conflicts_with_first() {
        let (mut store, plan_id, _) = memory_store();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        let first = manager.start_session(&mut store).unwrap().clone();

        let mut other = SessionManager::load(&store, plan_id).unwrap();
        match other.start_session(&mut store) {
            Err(Error::SessionConflict(existing)) => assert_eq!(existing.id, first.id),
            result => panic!("expected conflict, got {:?}", result.map(|s| s.id)),
        }
        assert!(!other.is_session_active());
        assert_eq!(store.data().sessions.len(), 1);
    }

    #[test]
    fn test_conflict_reports_newest_unfinished() {
        let (mut store, plan_id, _) = memory_store();
        let now = Utc::now();
        let older = WorkoutSession::start(plan_id, now - Duration::days(3));
        let newer = WorkoutSession::start(plan_id, now - Duration::days(1));
        let newer_id = newer.id;
        store
            .transaction(|tx| {
                tx.insert(newer)?;
                tx.insert(older)
            })
            .unwrap();

        let found = SessionManager::find_active(&store, plan_id).unwrap().unwrap();
        assert_eq!(found.id, newer_id);
    }

    #[test]
    fn test_finalize_without_session_writes_nothing() {
        let (mut store, plan_id, _) = memory_store();
        let commits = store.commit_count();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();

        let result = manager.finalize_session(&mut store);
        assert!(matches!(result, Err(Error::MissingSession)));
        assert_eq!(store.commit_count(), commits);
    }

    #[test]
    fn test_finalize_closes_session() {
        let (mut store, plan_id, _) = memory_store();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        manager.start_session(&mut store).unwrap();

        let closed = manager.finalize_session(&mut store).unwrap();
        assert!(closed.is_completed);
        assert!(closed.end_date.unwrap() >= closed.start_date);
        assert!(!manager.is_session_active());
        assert!(store.data().sessions[0].is_completed);

        // A new session may now start
        assert!(manager.start_session(&mut store).is_ok());
    }

    #[test]
    fn test_abandon_then_start() {
        let (mut store, plan_id, _) = memory_store();
        let mut first = SessionManager::load(&store, plan_id).unwrap();
        let stale = first.start_session(&mut store).unwrap().clone();

        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        let closed = manager.abandon_session(&mut store, &stale).unwrap();
        assert!(closed.is_completed);
        assert!(closed.end_date.is_some());

        let fresh = manager.start_session(&mut store).unwrap();
        assert_ne!(fresh.id, stale.id);
    }

    #[test]
    fn test_start_persistence_failure_keeps_state() {
        let (seed, plan_id, _) = seed();
        let mut store = Store::open(SeededBackend { seed, fail: true }).unwrap();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();

        let result = manager.start_session(&mut store);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(manager.current_session().is_none());
        assert!(store.data().sessions.is_empty());
    }

    #[test]
    fn test_start_from_two_handles_conflicts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("store.json");
        let (data, plan_id, _) = seed();
        {
            let mut store = Store::open_file(&path).unwrap();
            store
                .transaction(|tx| {
                    for p in data.plans {
                        tx.insert(p)?;
                    }
                    for e in data.exercises {
                        tx.insert(e)?;
                    }
                    Ok(())
                })
                .unwrap();
        }

        let mut first = Store::open_file(&path).unwrap();
        let mut second = Store::open_file(&path).unwrap();
        let mut a = SessionManager::load(&first, plan_id).unwrap();
        let mut b = SessionManager::load(&second, plan_id).unwrap();

        let started = a.start_session(&mut first).unwrap().id;
        match b.start_session(&mut second) {
            Err(Error::SessionConflict(existing)) => assert_eq!(existing.id, started),
            result => panic!("expected a conflict, got {:?}", result.map(|s| s.id)),
        }
        assert!(!b.is_session_active());

        let reopened = Store::open_file(&path).unwrap();
        assert_eq!(reopened.data().sessions.len(), 1);
    }

    #[test]
    fn test_finalize_persistence_failure_keeps_session_active() {
        let (seed, plan_id, _) = seed();
        let mut store = Store::open(SeededBackend { seed, fail: false }).unwrap();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        manager.start_session(&mut store).unwrap();

        store.backend_mut().fail = true;
        let result = manager.finalize_session(&mut store);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(manager.is_session_active());
        assert!(!store.data().sessions[0].is_completed);
    }

    #[test]
    fn test_exercise_status_is_derived() {
        let (mut store, plan_id, ids) = memory_store();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        assert_eq!(
            manager.exercise_status(&store, ids[0]).unwrap(),
            ExerciseStatus::Pending
        );

        manager.start_session(&mut store).unwrap();
        let mut recorder = manager.open_exercise(&store, ids[0]).unwrap();
        for _ in 0..recorder.target().sets {
            recorder.record_set(&mut store, Some(80.0), 5).unwrap();
        }

        // Reaching the planned sets does not complete the exercise on its own
        assert_eq!(
            manager.exercise_status(&store, ids[0]).unwrap(),
            ExerciseStatus::InProgress
        );
        assert_eq!(
            manager.exercise_status(&store, ids[1]).unwrap(),
            ExerciseStatus::Pending
        );

        assert!(manager.mark_exercise_complete(ids[0]));
        assert!(!manager.mark_exercise_complete(ids[0]));
        assert!(!manager.mark_exercise_complete(Uuid::new_v4()));
        assert_eq!(
            manager.exercise_status(&store, ids[0]).unwrap(),
            ExerciseStatus::Completed
        );
        assert_eq!(manager.progress_text(), "1/3 exercises complete");
        assert!((manager.progress_fraction() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_resume_recomputes_completed_from_sets() {
        let (mut store, plan_id, ids) = memory_store();
        let session = {
            let mut manager = SessionManager::load(&store, plan_id).unwrap();
            let session = manager.start_session(&mut store).unwrap().clone();
            let mut recorder = manager.open_exercise(&store, ids[1]).unwrap();
            recorder.record_set(&mut store, None, 12).unwrap();
            session
        };

        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        let existing = SessionManager::find_active(&store, plan_id).unwrap().unwrap();
        assert_eq!(existing.id, session.id);
        manager.resume_session(&store, existing).unwrap();

        assert!(manager.is_session_active());
        assert!(manager.is_exercise_complete(ids[1]));
        assert!(!manager.is_exercise_complete(ids[0]));
        assert_eq!(manager.progress_text(), "1/3 exercises complete");
    }

    #[test]
    fn test_resume_rejects_completed_or_foreign_session() {
        let (mut store, plan_id, _) = memory_store();
        let mut manager = SessionManager::load(&store, plan_id).unwrap();
        manager.start_session(&mut store).unwrap();
        let closed = manager.finalize_session(&mut store).unwrap();

        assert!(matches!(
            manager.resume_session(&store, closed),
            Err(Error::InvalidInput(_))
        ));

        let foreign = WorkoutSession::start(Uuid::new_v4(), Utc::now());
        assert!(matches!(
            manager.resume_session(&store, foreign),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_open_exercise_requires_session() {
        let (store, plan_id, ids) = memory_store();
        let manager = SessionManager::load(&store, plan_id).unwrap();
        assert!(matches!(
            manager.open_exercise(&store, ids[0]),
            Err(Error::MissingSession)
        ));
    }
}
