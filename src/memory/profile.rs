//! Long-term user preference profile
//!
//! Read by the extractor (rep/weight ranges) and the response layer (units,
//! style, mood). Only the learning engine writes to it.

use crate::core::types::Unit;
use crate::memory::signals::{Mood, WorkoutPhase};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed inclusive range of a numeric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn point(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Membership with fractional slack on both ends
    pub fn contains(&self, value: f64, tolerance: f64) -> bool {
        let low = self.min * (1.0 - tolerance);
        let high = self.max * (1.0 + tolerance);
        value >= low && value <= high
    }
}

fn widen(range: &mut Option<ValueRange>, value: f64) {
    match range {
        Some(r) => r.include(value),
        None => *range = Some(ValueRange::point(value)),
    }
}

/// What the user typically does on one exercise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseStats {
    pub reps: Option<ValueRange>,
    pub weight: Option<ValueRange>,
    /// Successful logged sets observed in conversation
    pub completions: u32,
    pub last_weight: Option<f64>,
    pub last_unit: Option<Unit>,
    pub last_logged_at: Option<DateTime<Utc>>,
}

impl ExerciseStats {
    pub(crate) fn observe(&mut self, reps: Option<u32>, weight: Option<f64>, unit: Option<Unit>) {
        if let Some(reps) = reps {
            widen(&mut self.reps, f64::from(reps));
        }
        if let Some(weight) = weight.filter(|w| *w > 0.0) {
            widen(&mut self.weight, weight);
            self.last_weight = Some(weight);
            if unit.is_some() {
                self.last_unit = unit;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    /// Short commands: "bench ten at one thirty five"
    Concise,
    #[default]
    Balanced,
    /// Full sentences, asks follow-up questions
    Detailed,
}

/// A set from the workout data store, used to seed ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedSet {
    pub exercise_id: String,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub unit: Option<Unit>,
}

/// Per-user preferences and habits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferenceProfile {
    pub exercises: AHashMap<String, ExerciseStats>,
    pub lbs_mentions: u32,
    pub kg_mentions: u32,
    pub communication_style: CommunicationStyle,
    pub utterances_observed: u32,
    pub mean_utterance_words: f64,
    /// "previous_id>next_id" -> count of consecutive logs
    pub pairings: AHashMap<String, u32>,
    /// First two words of logging utterances -> count
    pub phrasings: AHashMap<String, u32>,
    pub last_exercise: Option<String>,
    pub mood: Mood,
    pub phase: WorkoutPhase,
    pub cancelled_flows: u32,
    pub expired_flows: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserPreferenceProfile {
    pub fn stats(&self, exercise_id: &str) -> Option<&ExerciseStats> {
        self.exercises.get(exercise_id)
    }

    pub fn last_weight(&self, exercise_id: &str) -> Option<(f64, Option<Unit>)> {
        let stats = self.stats(exercise_id)?;
        stats.last_weight.map(|w| (w, stats.last_unit))
    }

    /// Unit the user says most; pounds on a tie
    pub fn preferred_unit(&self) -> Unit {
        if self.kg_mentions > self.lbs_mentions {
            Unit::Kg
        } else {
            Unit::Lbs
        }
    }

    /// Most frequent exercise logged right after `exercise_id`
    pub fn likely_next(&self, exercise_id: &str) -> Option<&str> {
        let prefix = format!("{exercise_id}>");
        self.pairings
            .iter()
            .filter_map(|(key, count)| key.strip_prefix(&prefix).map(|next| (next, *count)))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(next, _)| next)
    }

    /// Widen ranges from existing workout history
    ///
    /// Seeded sets shape the ranges but do not count as completions.
    pub fn seed_from_history(&mut self, history: &[LoggedSet]) {
        for set in history {
            let stats = self.exercises.entry(set.exercise_id.clone()).or_default();
            let completions = stats.completions;
            stats.observe(set.reps, set.weight, set.unit);
            stats.completions = completions;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_range_tolerance() {
        let range = ValueRange { min: 135.0, max: 185.0 };
        assert!(range.contains(135.0, 0.0));
        assert!(!range.contains(120.0, 0.0));
        assert!(range.contains(120.0, 0.2));
        assert!(!range.contains(230.0, 0.2));
    }

    #[test]
    fn test_seed_from_history() {
        let mut profile = UserPreferenceProfile::default();
        profile.seed_from_history(&[
            LoggedSet {
                exercise_id: "squat".into(),
                reps: Some(5),
                weight: Some(225.0),
                unit: Some(Unit::Lbs),
            },
            LoggedSet {
                exercise_id: "squat".into(),
                reps: Some(8),
                weight: Some(185.0),
                unit: Some(Unit::Lbs),
            },
        ]);

        let stats = profile.stats("squat").unwrap();
        assert_eq!(stats.reps, Some(ValueRange { min: 5.0, max: 8.0 }));
        assert_eq!(stats.weight, Some(ValueRange { min: 185.0, max: 225.0 }));
        assert_eq!(stats.completions, 0);
        assert_eq!(profile.last_weight("squat"), Some((185.0, Some(Unit::Lbs))));
    }

    #[test]
    fn test_zero_weight_does_not_widen() {
        let mut stats = ExerciseStats::default();
        stats.observe(Some(12), Some(0.0), None);
        assert!(stats.weight.is_none());
        assert!(stats.reps.is_some());
    }

    #[test]
    fn test_likely_next() {
        let mut profile = UserPreferenceProfile::default();
        profile.pairings.insert("bench_press>dip".into(), 2);
        profile.pairings.insert("bench_press>overhead_press".into(), 5);
        profile.pairings.insert("squat>lunge".into(), 9);
        assert_eq!(profile.likely_next("bench_press"), Some("overhead_press"));
        assert_eq!(profile.likely_next("deadlift"), None);
    }

    #[test]
    fn test_profile_serde_roundtrip_with_defaults() {
        let profile: UserPreferenceProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile, UserPreferenceProfile::default());
        assert_eq!(profile.preferred_unit(), Unit::Lbs);
    }
}
