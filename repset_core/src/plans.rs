//! Plan and exercise management.
//!
//! Plans are listed favorites first, then newest first. Exercise `order`
//! values stay dense (0, 1, 2, ...) within a plan: new exercises go to the end
//! and removals close the gap.

use crate::store::{DataStore, Query, SortOrder};
use crate::{Error, Exercise, Result, WorkoutPlan};
use std::cmp::Reverse;
use uuid::Uuid;

/// Create a plan with a trimmed name
pub fn create_plan<S: DataStore>(
    store: &mut S,
    name: &str,
    description: &str,
) -> Result<WorkoutPlan> {
    let plan = WorkoutPlan::new(name.trim(), description.trim());
    plan.validate()?;

    let to_insert = plan.clone();
    store.transaction(move |tx| tx.insert(to_insert))?;
    tracing::info!("Created plan '{}' ({})", plan.name, plan.id);
    Ok(plan)
}

/// Change name and/or description. `None` leaves a field as is.
pub fn update_plan<S: DataStore>(
    store: &mut S,
    plan_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<WorkoutPlan> {
    let mut plan: WorkoutPlan = store.require(plan_id)?;
    if let Some(name) = name {
        plan.name = name.trim().to_string();
    }
    if let Some(description) = description {
        plan.description = description.trim().to_string();
    }
    plan.validate()?;

    let to_update = plan.clone();
    store.transaction(move |tx| tx.update(to_update))?;
    Ok(plan)
}

/// Delete a plan with its exercises, sessions and sets
pub fn delete_plan<S: DataStore>(store: &mut S, plan_id: Uuid) -> Result<()> {
    let deleted = store.transaction(move |tx| Ok(tx.delete::<WorkoutPlan>(plan_id)))?;
    if !deleted {
        return Err(Error::NotFound(format!("plan {}", plan_id)));
    }
    tracing::info!("Deleted plan {}", plan_id);
    Ok(())
}

/// Flip the favorite flag and return the new value
pub fn toggle_favorite<S: DataStore>(store: &mut S, plan_id: Uuid) -> Result<bool> {
    let mut plan: WorkoutPlan = store.require(plan_id)?;
    plan.is_favorite = !plan.is_favorite;
    let favorite = plan.is_favorite;
    store.transaction(move |tx| tx.update(plan))?;
    Ok(favorite)
}

pub fn list_plans<S: DataStore>(store: &S) -> Result<Vec<WorkoutPlan>> {
    store.fetch(&Query::<WorkoutPlan>::all().sort_by_key(
        |p| (!p.is_favorite, Reverse(p.created_at)),
        SortOrder::Ascending,
    ))
}

/// Plans whose name contains `text`, ignoring case. Blank text matches all.
pub fn search_plans<S: DataStore>(store: &S, text: &str) -> Result<Vec<WorkoutPlan>> {
    let needle = text.trim().to_lowercase();
    let plans = list_plans(store)?;
    if needle.is_empty() {
        return Ok(plans);
    }
    Ok(plans
        .into_iter()
        .filter(|p| p.name.to_lowercase().contains(&needle))
        .collect())
}

/// Look a plan up by id or by exact (case-insensitive) name
pub fn find_plan<S: DataStore>(store: &S, key: &str) -> Result<WorkoutPlan> {
    if let Ok(id) = Uuid::parse_str(key.trim()) {
        return store.require(id);
    }

    let wanted = key.trim().to_lowercase();
    let mut matches = store.fetch(&Query::filter(move |p: &WorkoutPlan| {
        p.name.to_lowercase() == wanted
    }))?;
    match matches.len() {
        0 => Err(Error::NotFound(format!("plan '{}'", key.trim()))),
        1 => Ok(matches.remove(0)),
        n => Err(Error::InvalidInput(format!(
            "{} plans are named '{}'; use the plan id",
            n,
            key.trim()
        ))),
    }
}

/// Exercises of a plan in display order
pub fn plan_exercises<S: DataStore>(store: &S, plan_id: Uuid) -> Result<Vec<Exercise>> {
    store.fetch(
        &Query::filter(move |e: &Exercise| e.plan_id == plan_id)
            .sort_by_key(|e| e.order, SortOrder::Ascending),
    )
}

/// Append an exercise to the end of its plan
pub fn add_exercise<S: DataStore>(store: &mut S, mut exercise: Exercise) -> Result<Exercise> {
    exercise.name = exercise.name.trim().to_string();
    exercise.validate()?;

    let added = store.transaction(move |tx| {
        let plan_id = exercise.plan_id;
        if tx.get::<WorkoutPlan>(plan_id).is_none() {
            return Err(Error::NotFound(format!("plan {}", plan_id)));
        }
        exercise.order = tx
            .fetch(&Query::filter(move |e: &Exercise| e.plan_id == plan_id))
            .iter()
            .map(|e| e.order + 1)
            .max()
            .unwrap_or(0);
        tx.insert(exercise.clone())?;
        Ok(exercise)
    })?;

    tracing::info!(
        "Added '{}' to plan {} at position {}",
        added.name,
        added.plan_id,
        added.order
    );
    Ok(added)
}

/// Replace an exercise's settings, keeping its position
pub fn update_exercise<S: DataStore>(store: &mut S, exercise: Exercise) -> Result<()> {
    exercise.validate()?;
    store.transaction(move |tx| {
        let existing = tx
            .get::<Exercise>(exercise.id)
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise.id)))?;
        if existing.plan_id != exercise.plan_id {
            return Err(Error::InvalidInput(
                "An exercise cannot move to another plan".into(),
            ));
        }
        tx.update(Exercise {
            order: existing.order,
            ..exercise
        })
    })
}

/// Remove an exercise and close the gap in its plan's ordering.
///
/// Sets already recorded for it are kept with their exercise reference cleared.
pub fn remove_exercise<S: DataStore>(store: &mut S, exercise_id: Uuid) -> Result<()> {
    store.transaction(move |tx| {
        let exercise = tx
            .get::<Exercise>(exercise_id)
            .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
        tx.delete::<Exercise>(exercise_id);

        let plan_id = exercise.plan_id;
        let remaining = tx.fetch(
            &Query::filter(move |e: &Exercise| e.plan_id == plan_id)
                .sort_by_key(|e| e.order, SortOrder::Ascending),
        );
        // Ascending reassignment never collides with a later, higher order
        for (index, mut e) in remaining.into_iter().enumerate() {
            if e.order != index as u32 {
                e.order = index as u32;
                tx.update(e)?;
            }
        }
        Ok(())
    })
}

/// Move the exercise at position `from` to position `to` within its plan
pub fn move_exercise<S: DataStore>(
    store: &mut S,
    plan_id: Uuid,
    from: usize,
    to: usize,
) -> Result<()> {
    store.transaction(move |tx| {
        let mut ordered = tx.fetch(
            &Query::filter(move |e: &Exercise| e.plan_id == plan_id)
                .sort_by_key(|e| e.order, SortOrder::Ascending),
        );
        if from >= ordered.len() || to >= ordered.len() {
            return Err(Error::InvalidInput(format!(
                "Position out of range (plan has {} exercises)",
                ordered.len()
            )));
        }
        if from == to {
            return Ok(());
        }

        let moved = ordered.remove(from);
        ordered.insert(to, moved);

        // Park everything above the current range first so no two exercises
        // share an order while renumbering.
        let base = ordered.len() as u32;
        for (index, e) in ordered.iter_mut().enumerate() {
            e.order = base + index as u32;
            tx.update(e.clone())?;
        }
        for (index, e) in ordered.into_iter().enumerate() {
            tx.update(Exercise {
                order: index as u32,
                ..e
            })?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::{ExerciseSet, MuscleGroup, WorkoutSession};
    use chrono::Utc;

    fn names(exercises: &[Exercise]) -> Vec<&str> {
        exercises.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_create_trims_and_validates() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "  Leg Day ", "").unwrap();
        assert_eq!(plan.name, "Leg Day");

        assert!(matches!(
            create_plan(&mut store, "   ", ""),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(store.data().plans.len(), 1);
    }

    #[test]
    fn test_list_favorites_first() {
        let mut store = Store::in_memory();
        let a = create_plan(&mut store, "A", "").unwrap();
        let b = create_plan(&mut store, "B", "").unwrap();
        assert!(toggle_favorite(&mut store, a.id).unwrap());

        let listed = list_plans(&store).unwrap();
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);

        assert!(!toggle_favorite(&mut store, a.id).unwrap());
    }

    #[test]
    fn test_search_and_find() {
        let mut store = Store::in_memory();
        let push = create_plan(&mut store, "Push Day", "").unwrap();
        create_plan(&mut store, "Pull Day", "").unwrap();

        assert_eq!(search_plans(&store, "PUSH").unwrap().len(), 1);
        assert_eq!(search_plans(&store, "day").unwrap().len(), 2);
        assert_eq!(search_plans(&store, " ").unwrap().len(), 2);

        assert_eq!(find_plan(&store, "push day").unwrap().id, push.id);
        assert_eq!(find_plan(&store, &push.id.to_string()).unwrap().id, push.id);
        assert!(matches!(find_plan(&store, "Legs"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_update_plan_fields() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "Old", "desc").unwrap();
        let updated = update_plan(&mut store, plan.id, Some("New"), None).unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.description, "desc");
        assert!(update_plan(&mut store, plan.id, Some(""), None).is_err());
        assert_eq!(store.data().plans[0].name, "New");
    }

    #[test]
    fn test_exercises_append_and_reorder() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "Upper", "").unwrap();
        for name in ["Bench", "Row", "Press", "Curl"] {
            add_exercise(&mut store, Exercise::new(plan.id, name, MuscleGroup::Chest)).unwrap();
        }
        assert_eq!(
            names(&plan_exercises(&store, plan.id).unwrap()),
            vec!["Bench", "Row", "Press", "Curl"]
        );

        move_exercise(&mut store, plan.id, 3, 0).unwrap();
        let ordered = plan_exercises(&store, plan.id).unwrap();
        assert_eq!(names(&ordered), vec!["Curl", "Bench", "Row", "Press"]);
        assert_eq!(
            ordered.iter().map(|e| e.order).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        assert!(move_exercise(&mut store, plan.id, 0, 9).is_err());
    }

    #[test]
    fn test_remove_exercise_closes_gap_and_keeps_sets() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "Upper", "").unwrap();
        let bench = add_exercise(&mut store, Exercise::new(plan.id, "Bench", MuscleGroup::Chest)).unwrap();
        add_exercise(&mut store, Exercise::new(plan.id, "Row", MuscleGroup::Back)).unwrap();
        add_exercise(&mut store, Exercise::new(plan.id, "Press", MuscleGroup::Shoulders)).unwrap();

        let session = WorkoutSession::start(plan.id, Utc::now());
        let set = ExerciseSet {
            id: Uuid::new_v4(),
            session_id: session.id,
            exercise_id: Some(bench.id),
            set_number: 1,
            weight: Some(70.0),
            reps: 5,
            completed_at: Utc::now(),
            notes: String::new(),
        };
        store
            .transaction(|tx| {
                tx.insert(session)?;
                tx.insert(set)
            })
            .unwrap();

        remove_exercise(&mut store, bench.id).unwrap();
        let ordered = plan_exercises(&store, plan.id).unwrap();
        assert_eq!(names(&ordered), vec!["Row", "Press"]);
        assert_eq!(ordered[0].order, 0);
        assert_eq!(ordered[1].order, 1);
        assert_eq!(store.data().sets.len(), 1);
        assert_eq!(store.data().sets[0].exercise_id, None);
    }

    #[test]
    fn test_update_exercise_keeps_position() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "Legs", "").unwrap();
        add_exercise(&mut store, Exercise::new(plan.id, "Squat", MuscleGroup::Legs)).unwrap();
        let mut lunge =
            add_exercise(&mut store, Exercise::new(plan.id, "Lunge", MuscleGroup::Legs)).unwrap();

        lunge.default_reps = 10;
        lunge.order = 0;
        update_exercise(&mut store, lunge.clone()).unwrap();
        let stored: Exercise = store.require(lunge.id).unwrap();
        assert_eq!(stored.default_reps, 10);
        assert_eq!(stored.order, 1);

        lunge.default_sets = 11;
        assert!(matches!(
            update_exercise(&mut store, lunge),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_delete_plan_cascades() {
        let mut store = Store::in_memory();
        let plan = create_plan(&mut store, "Gone", "").unwrap();
        add_exercise(&mut store, Exercise::new(plan.id, "Plank", MuscleGroup::Abs)).unwrap();

        delete_plan(&mut store, plan.id).unwrap();
        assert!(store.data().plans.is_empty());
        assert!(store.data().exercises.is_empty());
        assert!(matches!(
            delete_plan(&mut store, plan.id),
            Err(Error::NotFound(_))
        ));
    }
}
