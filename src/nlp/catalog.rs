//! Exercise catalog: canonical IDs, spoken aliases and fuzzy lookup
//!
//! Built once at startup and shared read-only between sessions.

use crate::core::types::MuscleGroup;
use crate::nlp::fuzzy::similarity;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A canonical exercise and the ways people say it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    /// Stable identifier used in actions and the preference profile
    pub id: String,
    /// Display name, also what the normalizer substitutes aliases with
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub muscle_group: MuscleGroup,
    /// Logged without an external load
    #[serde(default)]
    pub bodyweight: bool,
}

type BuiltinExercise = (&'static str, &'static str, &'static [&'static str], MuscleGroup, bool);

const BUILTIN_EXERCISES: &[BuiltinExercise] = &[
    ("bench_press", "bench press", &["bench", "flat bench", "barbell bench", "benchpress", "bench presses"], MuscleGroup::Chest, false),
    ("incline_bench_press", "incline bench press", &["incline bench", "incline press"], MuscleGroup::Chest, false),
    ("dumbbell_press", "dumbbell press", &["db press", "dumbbell bench", "dumbbell bench press"], MuscleGroup::Chest, false),
    ("push_up", "push up", &["push ups", "pushups", "pushup", "press ups"], MuscleGroup::Chest, true),
    ("squat", "squat", &["squats", "back squat", "back squats", "barbell squat"], MuscleGroup::Legs, false),
    ("front_squat", "front squat", &["front squats"], MuscleGroup::Legs, false),
    ("deadlift", "deadlift", &["deadlifts", "dead lift", "dead lifts", "deads"], MuscleGroup::Back, false),
    ("romanian_deadlift", "romanian deadlift", &["rdl", "rdls", "romanian deadlifts"], MuscleGroup::Legs, false),
    ("overhead_press", "overhead press", &["ohp", "military press", "shoulder press", "overhead presses"], MuscleGroup::Shoulders, false),
    ("pull_up", "pull up", &["pull ups", "pullups", "pullup"], MuscleGroup::Back, true),
    ("chin_up", "chin up", &["chin ups", "chinups", "chinup"], MuscleGroup::Back, true),
    ("barbell_row", "barbell row", &["row", "rows", "bent over row", "bent over rows", "barbell rows"], MuscleGroup::Back, false),
    ("lat_pulldown", "lat pulldown", &["pulldown", "pulldowns", "lat pulldowns", "pull down"], MuscleGroup::Back, false),
    ("bicep_curl", "bicep curl", &["curl", "curls", "biceps curl", "bicep curls", "dumbbell curls"], MuscleGroup::Arms, false),
    ("tricep_extension", "tricep extension", &["tricep extensions", "skull crushers", "skullcrushers"], MuscleGroup::Arms, false),
    ("dip", "dip", &["dips", "tricep dips"], MuscleGroup::Arms, true),
    ("lunge", "lunge", &["lunges", "walking lunges"], MuscleGroup::Legs, false),
    ("leg_press", "leg press", &["leg presses"], MuscleGroup::Legs, false),
    ("leg_curl", "leg curl", &["leg curls", "hamstring curl", "hamstring curls"], MuscleGroup::Legs, false),
    ("calf_raise", "calf raise", &["calf raises"], MuscleGroup::Legs, false),
    ("hip_thrust", "hip thrust", &["hip thrusts", "glute bridge", "glute bridges"], MuscleGroup::Glutes, false),
    ("lateral_raise", "lateral raise", &["lateral raises", "side raises", "lat raises"], MuscleGroup::Shoulders, false),
    ("plank", "plank", &["planks"], MuscleGroup::Core, true),
    ("sit_up", "sit up", &["sit ups", "situps", "crunches", "crunch"], MuscleGroup::Core, true),
    ("kettlebell_swing", "kettlebell swing", &["kettlebell swings", "kb swings", "swings"], MuscleGroup::FullBody, false),
];

/// Read-only exercise lookup tables
#[derive(Debug, Clone)]
pub struct ExerciseCatalog {
    exercises: Vec<ExerciseDefinition>,
    /// Canonical key of every name/alias -> index into `exercises`
    alias_index: AHashMap<String, usize>,
    /// Word count of the longest alias, bounds the window scan
    max_alias_words: usize,
}

impl ExerciseCatalog {
    /// Catalog with the built-in exercise list
    pub fn builtin() -> Self {
        let definitions = BUILTIN_EXERCISES
            .iter()
            .map(|(id, name, aliases, group, bodyweight)| ExerciseDefinition {
                id: (*id).to_string(),
                name: (*name).to_string(),
                aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
                muscle_group: *group,
                bodyweight: *bodyweight,
            })
            .collect();
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<ExerciseDefinition>) -> Self {
        let mut catalog = Self {
            exercises: Vec::with_capacity(definitions.len()),
            alias_index: AHashMap::new(),
            max_alias_words: 1,
        };
        for definition in definitions {
            catalog.insert(definition);
        }
        catalog
    }

    /// Add exercises on top of the current set; an existing ID is replaced
    pub fn extended(mut self, extra: &[ExerciseDefinition]) -> Self {
        for definition in extra {
            self.insert(definition.clone());
        }
        self
    }

    fn insert(&mut self, definition: ExerciseDefinition) {
        let index = match self.exercises.iter().position(|e| e.id == definition.id) {
            Some(existing) => {
                self.alias_index.retain(|_, idx| *idx != existing);
                self.exercises[existing] = definition;
                existing
            }
            None => {
                self.exercises.push(definition);
                self.exercises.len() - 1
            }
        };

        let definition = &self.exercises[index];
        let keys: Vec<String> = std::iter::once(definition.name.as_str())
            .chain(std::iter::once(definition.id.as_str()))
            .chain(definition.aliases.iter().map(String::as_str))
            .map(canonical_key)
            .filter(|k| !k.is_empty())
            .collect();

        for key in keys {
            self.max_alias_words = self.max_alias_words.max(key.split(' ').count());
            self.alias_index.entry(key).or_insert(index);
        }
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn max_alias_words(&self) -> usize {
        self.max_alias_words
    }

    pub fn get(&self, id: &str) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|e| e.id == id)
    }

    /// Exact lookup, insensitive to case, punctuation and spacing
    pub fn lookup_alias(&self, phrase: &str) -> Option<&ExerciseDefinition> {
        self.alias_index
            .get(&canonical_key(phrase))
            .map(|&idx| &self.exercises[idx])
    }

    /// Best edit-distance match over all names and aliases, if its score is
    /// strictly above `threshold`
    pub fn fuzzy_lookup(&self, phrase: &str, threshold: f64) -> Option<(&ExerciseDefinition, f64)> {
        let key = canonical_key(phrase);
        if key.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (alias, &idx) in &self.alias_index {
            let score = similarity(&key, alias);
            let better = match best {
                Some((best_idx, best_score)) => {
                    score > best_score || (score == best_score && idx < best_idx)
                }
                None => true,
            };
            if better {
                best = Some((idx, score));
            }
        }

        best.filter(|(_, score)| *score > threshold)
            .map(|(idx, score)| (&self.exercises[idx], score))
    }

    /// Resolve a free-form exercise name (e.g. from session context)
    pub fn resolve_name(&self, name: &str, threshold: f64) -> Option<&ExerciseDefinition> {
        self.lookup_alias(name)
            .or_else(|| self.fuzzy_lookup(name, threshold).map(|(def, _)| def))
    }

    /// Display name for an exercise ID, falling back to the ID itself
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|e| e.name.as_str()).unwrap_or(id)
    }

    pub fn is_bodyweight(&self, id: &str) -> bool {
        self.get(id).map(|e| e.bodyweight).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseDefinition> {
        self.exercises.iter()
    }
}

impl Default for ExerciseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lower-case, drop punctuation, treat `_`/`-` as spaces, collapse whitespace
pub fn canonical_key(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || c == '_' || c == '-' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
