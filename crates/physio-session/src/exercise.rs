//! Exercise definitions and the built-in exercise library.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use physio_core::{Error, Result};
use physio_pose::{requires_motion, StepRequirements};

/// One scripted step of an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,

    #[serde(default)]
    pub instructions: String,

    /// Continuous hold needed to complete the step (seconds)
    pub duration_seconds: f64,

    #[serde(flatten)]
    pub requirements: StepRequirements,

    /// Gate the hold on frame-to-frame foot motion
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_jump: bool,
}

/// Ordered sequence of steps, read-only during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub exercise_name: String,
    pub steps: Vec<Step>,
}

impl ExerciseDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| match e {
            Error::Serialization(msg) => {
                Error::Serialization(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Structural checks; pose and angle names are resolved at evaluation time
    pub fn validate(&self) -> Result<()> {
        if self.exercise_name.trim().is_empty() {
            return Err(Error::ExerciseDefinition("exercise name is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(Error::ExerciseDefinition(format!(
                "{} has no steps",
                self.exercise_name
            )));
        }

        for (i, step) in self.steps.iter().enumerate() {
            let invalid = |what: &str| {
                Error::ExerciseDefinition(format!(
                    "{} step {} ({}): {}",
                    self.exercise_name,
                    i + 1,
                    step.name,
                    what
                ))
            };

            if !step.duration_seconds.is_finite() || step.duration_seconds < 0.0 {
                return Err(invalid("duration must be a non-negative number of seconds"));
            }
            let tolerance = &step.requirements.tolerance;
            if !tolerance.angle_tolerance.is_finite() || tolerance.angle_tolerance < 0.0 {
                return Err(invalid("angle tolerance must be non-negative"));
            }
            if !tolerance.distance_tolerance.is_finite() || tolerance.distance_tolerance < 0.0 {
                return Err(invalid("distance tolerance must be non-negative"));
            }
            if step.requirements.target_angles.values().any(|t| !t.is_finite()) {
                return Err(invalid("target angles must be finite"));
            }
        }

        Ok(())
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all hold durations (seconds)
    pub fn total_duration(&self) -> f64 {
        self.steps.iter().map(|s| s.duration_seconds).sum()
    }

    /// Whether `step` is gated on jump motion
    pub fn step_requires_motion(&self, step: &Step) -> bool {
        requires_motion(&self.exercise_name, step.requires_jump)
    }
}

const BUILTIN_EXERCISES: [(&str, &str); 7] = [
    ("chin_tucks.json", include_str!("../data/exercises/chin_tucks.json")),
    ("neck_side_tilts.json", include_str!("../data/exercises/neck_side_tilts.json")),
    (
        "shoulder_blade_squeezes.json",
        include_str!("../data/exercises/shoulder_blade_squeezes.json"),
    ),
    ("wall_angels.json", include_str!("../data/exercises/wall_angels.json")),
    ("standing_t_stretch.json", include_str!("../data/exercises/standing_t_stretch.json")),
    (
        "standing_pelvic_tilts.json",
        include_str!("../data/exercises/standing_pelvic_tilts.json"),
    ),
    (
        "standing_lumbar_extensions.json",
        include_str!("../data/exercises/standing_lumbar_extensions.json"),
    ),
];

/// Named collection of exercise definitions
#[derive(Debug, Clone, Default)]
pub struct ExerciseLibrary {
    exercises: Vec<ExerciseDefinition>,
}

impl ExerciseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The exercises shipped with the application
    pub fn builtin() -> Result<Self> {
        let mut library = Self::new();
        for (file, json) in BUILTIN_EXERCISES {
            let definition = ExerciseDefinition::from_json(json).map_err(|e| {
                Error::ExerciseDefinition(format!("built-in {file}: {e}"))
            })?;
            library.insert(definition);
        }
        Ok(library)
    }

    /// Every `*.json` file in `dir`, in file-name order
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            debug!("Loading exercise from {}", path.display());
            library.insert(ExerciseDefinition::from_file(&path)?);
        }
        info!(
            "Loaded {} exercises from {}",
            library.len(),
            dir.as_ref().display()
        );
        Ok(library)
    }

    /// Add a definition, replacing any with the same name
    pub fn insert(&mut self, definition: ExerciseDefinition) {
        match self
            .exercises
            .iter_mut()
            .find(|e| e.exercise_name.eq_ignore_ascii_case(&definition.exercise_name))
        {
            Some(existing) => *existing = definition,
            None => self.exercises.push(definition),
        }
    }

    /// Merge `other` into this library; its definitions win on name clashes
    pub fn extend(&mut self, other: ExerciseLibrary) {
        for definition in other.exercises {
            self.insert(definition);
        }
    }

    /// Case-insensitive lookup by exercise name
    pub fn get(&self, name: &str) -> Option<&ExerciseDefinition> {
        let name = name.trim();
        self.exercises
            .iter()
            .find(|e| e.exercise_name.eq_ignore_ascii_case(name))
    }

    /// Like [`get`](Self::get), failing with [`Error::UnknownExercise`]
    pub fn require(&self, name: &str) -> Result<&ExerciseDefinition> {
        self.get(name)
            .ok_or_else(|| Error::UnknownExercise(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exercises.iter().map(|e| e.exercise_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseDefinition> {
        self.exercises.iter()
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}
