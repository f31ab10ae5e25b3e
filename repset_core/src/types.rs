//! Core domain types for Repset.
//!
//! This module defines the fundamental types used throughout the system:
//! - Workout plans and their exercises
//! - Workout sessions and the sets recorded in them
//! - Daily check-ins

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Plan and Exercise Types
// ============================================================================

/// Muscle group targeted by an exercise
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MuscleGroup {
    Chest,
    Back,
    Legs,
    Shoulders,
    Arms,
    Abs,
    Cardio,
}

impl MuscleGroup {
    pub const ALL: [MuscleGroup; 7] = [
        MuscleGroup::Chest,
        MuscleGroup::Back,
        MuscleGroup::Legs,
        MuscleGroup::Shoulders,
        MuscleGroup::Arms,
        MuscleGroup::Abs,
        MuscleGroup::Cardio,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "Chest",
            MuscleGroup::Back => "Back",
            MuscleGroup::Legs => "Legs",
            MuscleGroup::Shoulders => "Shoulders",
            MuscleGroup::Arms => "Arms",
            MuscleGroup::Abs => "Abs",
            MuscleGroup::Cardio => "Cardio",
        }
    }
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MuscleGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MuscleGroup::ALL
            .iter()
            .find(|g| g.label().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("Unknown muscle group: {}", s)))
    }
}

/// A named, reusable template of exercises
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlan {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl WorkoutPlan {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
            is_favorite: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Plan name must not be empty".into()));
        }
        Ok(())
    }
}

pub const DEFAULT_SETS: u32 = 3;
pub const DEFAULT_REPS: u32 = 12;
pub const DEFAULT_REST_SECONDS: u32 = 60;

/// An exercise within a plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub muscle_group: MuscleGroup,
    pub default_sets: u32,
    pub default_reps: u32,
    pub default_rest_seconds: u32,
    pub order: u32,
    /// Load in kg; `None` means bodyweight
    pub load: Option<f64>,
}

impl Exercise {
    pub fn new(plan_id: Uuid, name: impl Into<String>, muscle_group: MuscleGroup) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            name: name.into(),
            muscle_group,
            default_sets: DEFAULT_SETS,
            default_reps: DEFAULT_REPS,
            default_rest_seconds: DEFAULT_REST_SECONDS,
            order: 0,
            load: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Exercise name must not be empty".into()));
        }
        if !(1..=10).contains(&self.default_sets) {
            return Err(Error::InvalidInput(
                "Default sets must be between 1 and 10".into(),
            ));
        }
        if !(1..=50).contains(&self.default_reps) {
            return Err(Error::InvalidInput(
                "Default reps must be between 1 and 50".into(),
            ));
        }
        if self.default_rest_seconds > 300 {
            return Err(Error::InvalidInput(
                "Rest time must be between 0 and 300 seconds".into(),
            ));
        }
        validate_load(self.load)
    }
}

// ============================================================================
// Session and Set Types
// ============================================================================

/// One timed execution of a plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_completed: bool,
    #[serde(default)]
    pub notes: String,
}

impl WorkoutSession {
    pub fn start(plan_id: Uuid, start_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plan_id,
            start_date,
            end_date: None,
            is_completed: false,
            notes: String::new(),
        }
    }

    /// Close the session at `at`. Never moves the end before the start.
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.end_date = Some(at.max(self.start_date));
        self.is_completed = true;
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_completed && self.end_date.is_none() {
            return Err(Error::InvalidInput(
                "Completed session must have an end date".into(),
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(Error::InvalidInput(
                    "End date cannot be before start date".into(),
                ));
            }
        }
        Ok(())
    }

    /// Elapsed time, only once the session has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_date.map(|end| end - self.start_date)
    }
}

/// One recorded unit of work for one exercise within a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSet {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Cleared when the exercise is deleted
    pub exercise_id: Option<Uuid>,
    pub set_number: u32,
    /// Weight in kg; `None` means bodyweight
    pub weight: Option<f64>,
    pub reps: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

impl ExerciseSet {
    pub fn validate(&self) -> Result<()> {
        validate_reps(self.reps)?;
        validate_load(self.weight)
    }

    /// Load × reps; bodyweight sets contribute nothing
    pub fn volume(&self) -> f64 {
        self.weight.unwrap_or(0.0) * f64::from(self.reps)
    }

    /// Brzycki estimate of the one-rep max.
    ///
    /// `None` for bodyweight sets and for rep counts where the formula's
    /// denominator is no longer positive.
    pub fn one_rep_max(&self) -> Option<f64> {
        if self.reps == 0 || self.reps > BRZYCKI_MAX_REPS {
            return None;
        }
        self.weight
            .map(|w| w / (1.0278 - 0.0278 * f64::from(self.reps)))
    }

    pub fn formatted_weight(&self) -> String {
        format_weight(self.weight)
    }
}

/// Highest rep count the Brzycki formula gives a positive estimate for
const BRZYCKI_MAX_REPS: u32 = 36;

pub(crate) fn validate_reps(reps: u32) -> Result<()> {
    if reps == 0 {
        return Err(Error::InvalidInput("Reps must be greater than zero".into()));
    }
    Ok(())
}

pub(crate) fn validate_load(load: Option<f64>) -> Result<()> {
    match load {
        Some(w) if w <= 0.0 || !w.is_finite() => Err(Error::InvalidInput(
            "Weight must be greater than zero".into(),
        )),
        _ => Ok(()),
    }
}

/// Human-readable load, e.g. `"42.5 kg"` or `"Bodyweight"`
pub fn format_weight(weight: Option<f64>) -> String {
    match weight {
        Some(w) => format!("{:.1} kg", w),
        None => "Bodyweight".into(),
    }
}

// ============================================================================
// Check-in Types
// ============================================================================

/// A daily check-in, optionally linked to the session performed after it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckIn {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Cleared when the session is deleted
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub exercise_type: Option<String>,
    #[serde(default)]
    pub calories: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
}

impl CheckIn {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            session_id: None,
            notes: String::new(),
            title: None,
            exercise_type: None,
            calories: None,
            location: None,
        }
    }
}
