//! Engine configuration with documented constants
//!
//! Every threshold and timeout the pipeline uses is collected here, with a
//! note on what it controls. Values can be overridden from a TOML file;
//! missing keys keep their defaults.

use crate::core::error::{Result, VoiceError};
use crate::nlp::catalog::ExerciseDefinition;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration for the voice command pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === INPUT GATE ===
    /// Recognizer confidence below which a transcript is rejected outright
    ///
    /// Speech-to-text engines report a per-utterance confidence. Guessing at a
    /// transcript the recognizer itself doubts produces wrong sets in the log,
    /// so such turns are answered with "say that again" instead.
    pub min_recognizer_confidence: f32,

    // === ENTITY EXTRACTION ===
    /// Minimum normalized edit-distance score for a fuzzy exercise match
    ///
    /// Score is `1 - lev(a, b) / max(len a, len b)`. A match must be strictly
    /// greater than this value. At 0.7, "squatt" matches "squat" but "sat" does not.
    pub fuzzy_match_threshold: f64,

    /// Fractional slack applied to learned rep/weight ranges
    ///
    /// A learned bench range of 135..=185 lbs with 0.2 slack accepts 108..=222.
    /// Larger slack makes the profile override the positional rules more often.
    pub range_tolerance: f64,

    // === INTENT CLASSIFICATION ===
    /// Upper bound on the reasoning backend round trip (milliseconds)
    ///
    /// When the bound elapses the call is abandoned and local keyword rules
    /// classify the turn. Keep this well under the time a user waits before
    /// repeating themselves.
    pub classifier_timeout_ms: u64,

    // === CONVERSATION FLOWS ===
    /// Step timeout for slot-filling flows (set logging, workout setup)
    pub slot_step_timeout_ms: u64,

    /// Step timeout for conversational flows (form, nutrition, motivation)
    ///
    /// Longer than slot steps: people think before describing how a lift felt.
    pub conversational_step_timeout_ms: u64,

    /// Default rest period when "start rest timer" names no duration
    pub default_rest_seconds: u32,

    // === MEMORY ===
    /// Turns kept in the in-memory short-term history
    pub history_limit: usize,

    /// Turns written to persistent storage
    pub persisted_history_limit: usize,

    /// Maximum distinct phrasings tracked per profile
    ///
    /// When full, the least frequent phrasing is evicted.
    pub phrasing_limit: usize,

    /// Additional exercises merged into the built-in catalog
    pub exercises: Vec<ExerciseDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_recognizer_confidence: 0.4,
            fuzzy_match_threshold: 0.7,
            range_tolerance: 0.2,
            classifier_timeout_ms: 3_000,
            slot_step_timeout_ms: 30_000,
            conversational_step_timeout_ms: 45_000,
            default_rest_seconds: 90,
            history_limit: 20,
            persisted_history_limit: 50,
            phrasing_limit: 50,
            exercises: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that thresholds are in range and timeouts are non-zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_recognizer_confidence) {
            return Err(VoiceError::Config(format!(
                "min_recognizer_confidence must be within [0, 1], got {}",
                self.min_recognizer_confidence
            )));
        }
        if !(0.0..1.0).contains(&self.fuzzy_match_threshold) {
            return Err(VoiceError::Config(format!(
                "fuzzy_match_threshold must be within [0, 1), got {}",
                self.fuzzy_match_threshold
            )));
        }
        if self.range_tolerance < 0.0 {
            return Err(VoiceError::Config("range_tolerance must not be negative".into()));
        }
        if self.classifier_timeout_ms == 0
            || self.slot_step_timeout_ms == 0
            || self.conversational_step_timeout_ms == 0
        {
            return Err(VoiceError::Config("timeouts must be greater than zero".into()));
        }
        if self.history_limit == 0 {
            return Err(VoiceError::Config("history_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }
}
