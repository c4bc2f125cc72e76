//! Set resolution - turns extracted entities plus context into a loggable set

use crate::core::types::Unit;
use crate::memory::profile::UserPreferenceProfile;
use crate::nlp::catalog::{canonical_key, ExerciseCatalog};
use crate::nlp::extractor::Extraction;

/// Where the exercise of a set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseSource {
    /// Named in this turn
    Utterance,
    /// Inherited from the host's session context
    Context,
    /// Collected earlier in an open flow
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    Utterance,
    /// Reused from the last set logged for the exercise
    LastLogged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseMatch {
    pub id: String,
    pub name: String,
    pub bodyweight: bool,
    pub source: ExerciseSource,
}

/// A set ready to log
#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    pub exercise_id: String,
    pub exercise_name: String,
    pub reps: u32,
    pub weight: Option<f64>,
    pub unit: Option<Unit>,
    pub exercise_source: ExerciseSource,
    pub weight_source: Option<WeightSource>,
}

/// What could be resolved for a set, complete or not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetResolution {
    pub exercise: Option<ExerciseMatch>,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub unit: Option<Unit>,
    pub weight_source: Option<WeightSource>,
    /// Anything guessed or inherited, for logging
    pub notes: Vec<String>,
}

impl SetResolution {
    /// Exercise and reps known, and weight known unless the exercise is bodyweight
    pub fn is_complete(&self) -> bool {
        match &self.exercise {
            Some(exercise) => self.reps.is_some() && (self.weight.is_some() || exercise.bodyweight),
            None => false,
        }
    }

    /// Build a request if exercise and reps are known; weight stays optional
    pub fn into_request(self) -> Option<SetRequest> {
        let exercise = self.exercise?;
        let reps = self.reps?;
        Some(SetRequest {
            exercise_id: exercise.id,
            exercise_name: exercise.name,
            reps,
            weight: self.weight,
            unit: self.unit,
            exercise_source: exercise.source,
            weight_source: self.weight_source,
        })
    }
}

/// Resolves a set against the catalog and the user's profile
pub struct SetResolver<'a> {
    catalog: &'a ExerciseCatalog,
    profile: &'a UserPreferenceProfile,
    fuzzy_threshold: f64,
}

impl<'a> SetResolver<'a> {
    pub fn new(catalog: &'a ExerciseCatalog, profile: &'a UserPreferenceProfile, fuzzy_threshold: f64) -> Self {
        Self {
            catalog,
            profile,
            fuzzy_threshold,
        }
    }

    /// Resolve a logging utterance; the context exercise is used only when
    /// the utterance names none
    pub fn resolve(&self, extraction: &Extraction, context_exercise: Option<&str>) -> SetResolution {
        let mut resolution = SetResolution::default();

        if let Some(id) = extraction.exercise_id() {
            resolution.exercise = Some(self.by_id(id, ExerciseSource::Utterance));
        } else if let Some(name) = context_exercise {
            resolution.notes.push(format!("exercise inherited from context: {}", name));
            resolution.exercise = Some(self.context_exercise(name));
        }

        resolution.reps = extraction.reps();
        if let Some(weight) = extraction.weight() {
            resolution.weight = Some(weight);
            resolution.weight_source = Some(WeightSource::Utterance);
            resolution.unit = self.unit_for(weight, extraction.weight_unit());
        }
        resolution
    }

    /// Like [`resolve`](Self::resolve), then reuse the last logged weight
    /// when the utterance gave none
    pub fn resolve_quick(&self, extraction: &Extraction, context_exercise: Option<&str>) -> SetResolution {
        let mut resolution = self.resolve(extraction, context_exercise);
        if resolution.weight.is_some() {
            return resolution;
        }
        let Some(exercise) = &resolution.exercise else {
            return resolution;
        };
        if exercise.bodyweight {
            return resolution;
        }
        if let Some((weight, unit)) = self.profile.last_weight(&exercise.id) {
            resolution.notes.push(format!("weight {} reused from last set", weight));
            resolution.weight = Some(weight);
            resolution.unit = unit.or_else(|| Some(self.profile.preferred_unit()));
            resolution.weight_source = Some(WeightSource::LastLogged);
        }
        resolution
    }

    /// Match a catalog id
    pub fn by_id(&self, id: &str, source: ExerciseSource) -> ExerciseMatch {
        ExerciseMatch {
            id: id.to_string(),
            name: self.catalog.display_name(id).to_string(),
            bodyweight: self.catalog.is_bodyweight(id),
            source,
        }
    }

    /// Resolve the host's exercise name; unknown names are kept as given
    pub fn context_exercise(&self, name: &str) -> ExerciseMatch {
        match self.catalog.resolve_name(name, self.fuzzy_threshold) {
            Some(def) => ExerciseMatch {
                id: def.id.clone(),
                name: def.name.clone(),
                bodyweight: def.bodyweight,
                source: ExerciseSource::Context,
            },
            None => ExerciseMatch {
                id: canonical_key(name).replace(' ', "_"),
                name: name.trim().to_string(),
                bodyweight: false,
                source: ExerciseSource::Context,
            },
        }
    }

    /// Spoken unit, else the user's usual unit; zero weight has no unit
    pub fn unit_for(&self, weight: f64, spoken: Option<Unit>) -> Option<Unit> {
        if weight <= 0.0 {
            return None;
        }
        spoken.or_else(|| Some(self.profile.preferred_unit()))
    }
}
