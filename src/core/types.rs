//! Shared value types passed between pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clamp a confidence score into `[0, 1]`, mapping NaN to zero
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Byte range into the normalized transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// What an extracted value means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Exercise,
    Reps,
    Weight,
    Sets,
    Duration,
    Rest,
    MuscleGroup,
}

/// How an entity was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Exact hit in an alias or keyword table
    Alias,
    /// Edit-distance match against the exercise catalog
    Fuzzy,
    /// Digit characters
    Digit,
    /// Spelled-out number words
    WordNumber,
}

/// Unit attached to a weight or time value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Lbs,
    Kg,
    Seconds,
    Minutes,
}

impl Unit {
    /// Parse a normalized unit token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "lbs" => Some(Unit::Lbs),
            "kg" => Some(Unit::Kg),
            "sec" => Some(Unit::Seconds),
            "min" => Some(Unit::Minutes),
            _ => None,
        }
    }

    pub fn is_weight(&self) -> bool {
        matches!(self, Unit::Lbs | Unit::Kg)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Lbs => "lbs",
            Unit::Kg => "kg",
            Unit::Seconds => "sec",
            Unit::Minutes => "min",
        }
    }
}

/// Coarse body region a workout or exercise targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuscleGroup {
    Chest,
    Back,
    Legs,
    Shoulders,
    Arms,
    Core,
    Glutes,
    FullBody,
}

impl MuscleGroup {
    /// Map a spoken keyword onto a muscle group
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "chest" | "pecs" => Some(MuscleGroup::Chest),
            "back" | "lats" => Some(MuscleGroup::Back),
            "legs" | "leg" | "quads" | "hamstrings" => Some(MuscleGroup::Legs),
            "shoulders" | "shoulder" | "delts" => Some(MuscleGroup::Shoulders),
            "arms" | "arm" | "biceps" | "triceps" => Some(MuscleGroup::Arms),
            "core" | "abs" => Some(MuscleGroup::Core),
            "glutes" => Some(MuscleGroup::Glutes),
            "full" => Some(MuscleGroup::FullBody),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "chest",
            MuscleGroup::Back => "back",
            MuscleGroup::Legs => "legs",
            MuscleGroup::Shoulders => "shoulders",
            MuscleGroup::Arms => "arms",
            MuscleGroup::Core => "core",
            MuscleGroup::Glutes => "glutes",
            MuscleGroup::FullBody => "full_body",
        }
    }
}

/// Payload of an extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Number(f64),
    Text(String),
}

/// A structured value found in an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: EntityValue,
    /// Normalized text the entity was read from
    pub matched_text: String,
    /// `None` when the value was supplied by the reasoning backend without
    /// a location in the transcript
    pub span: Option<Span>,
    pub confidence: f32,
    pub provenance: Provenance,
    pub unit: Option<Unit>,
}

impl Entity {
    pub fn text(
        kind: EntityKind,
        value: impl Into<String>,
        matched_text: impl Into<String>,
        span: Option<Span>,
        confidence: f32,
        provenance: Provenance,
    ) -> Self {
        Self {
            kind,
            value: EntityValue::Text(value.into()),
            matched_text: matched_text.into(),
            span,
            confidence: clamp_confidence(confidence),
            provenance,
            unit: None,
        }
    }

    pub fn number(
        kind: EntityKind,
        value: f64,
        matched_text: impl Into<String>,
        span: Option<Span>,
        confidence: f32,
        provenance: Provenance,
    ) -> Self {
        Self {
            kind,
            value: EntityValue::Number(value),
            matched_text: matched_text.into(),
            span,
            confidence: clamp_confidence(confidence),
            provenance,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<Unit>) -> Self {
        self.unit = unit;
        self
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            EntityValue::Number(n) => Some(n),
            EntityValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            EntityValue::Text(s) => Some(s),
            EntityValue::Number(_) => None,
        }
    }
}

/// One recognized utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub raw: String,
    pub normalized: String,
    pub captured_at: DateTime<Utc>,
    pub recognizer_confidence: Option<f32>,
}

impl Transcript {
    /// Raw recognizer text; `normalized` is filled in once the gate passes
    pub fn captured(raw: impl Into<String>, recognizer_confidence: Option<f32>) -> Self {
        Self {
            raw: raw.into(),
            normalized: String::new(),
            captured_at: Utc::now(),
            recognizer_confidence,
        }
    }
}
