//! Entity extraction and reps/weight disambiguation
//!
//! Works on normalized text. Every entity records the byte span it was read
//! from; token consumption guarantees spans never overlap within a turn.
//!
//! Numbers are resolved in this order:
//! - explicit unit labels ("10 reps", "225 lbs", "3 sets", "90 sec")
//! - the kind a flow step is waiting for, when only one number is unlabelled
//! - complement of labelled numbers ("10 reps 135" makes 135 the weight)
//! - a single number with an active exercise is reps
//! - the number right after "at"/"with"/"using"/"@" is weight, others reps
//! - first number reps, second weight
//! - learned rep/weight ranges for the exercise override the three rules above

use crate::core::types::{Entity, EntityKind, MuscleGroup, Provenance, Span, Unit};
use crate::memory::profile::UserPreferenceProfile;
use crate::nlp::catalog::ExerciseCatalog;
use crate::nlp::numbers::{is_number_word, parse_digits, parse_word_window, MAX_WORD_WINDOW};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const WEIGHT_MARKERS: &[&str] = &["at", "with", "using", "@"];

/// Words that may sit between a marker and its number ("at a 135")
const MARKER_GAP_WORDS: &[&str] = &["a", "the", "about", "around"];

const REP_LABELS: &[&str] = &["reps", "times"];

/// Tokens never considered as fuzzy exercise candidates
const FUZZY_STOP_WORDS: &[&str] = &[
    "and", "the", "with", "that", "this", "then", "just", "some", "more", "reps", "sets",
    "times", "start", "stop", "next", "rest", "timer", "cancel", "what", "how", "help",
    "about", "today", "lunch", "dinner", "breakfast", "workout", "weight", "done", "did",
    "finished", "completed", "another", "again", "should", "could", "would", "really",
];

/// Single words shorter than this must score `FUZZY_SHORT_WORD_MIN_SCORE`
/// ("dead" is one edit from "deads")
const FUZZY_SHORT_WORD_LEN: usize = 5;
const FUZZY_SHORT_WORD_MIN_SCORE: f64 = 0.85;

/// Values outside these bounds are not read as a set
const MAX_PLAUSIBLE_REPS: f64 = 1000.0;
const MAX_PLAUSIBLE_SETS: f64 = 100.0;
const MAX_PLAUSIBLE_WEIGHT: f64 = 2000.0;

const BASE_CONFIDENCE_ALIAS: f32 = 0.95;
const BASE_CONFIDENCE_DIGIT: f32 = 0.95;
const BASE_CONFIDENCE_WORD: f32 = 0.85;
const BASE_CONFIDENCE_WORDS: f32 = 0.8;

/// Context that shapes how ambiguous numbers are read
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionHints<'a> {
    /// Exercise already established by the flow or session context
    pub active_exercise: Option<&'a str>,
    /// Kind the current flow step is asking for
    pub expected: Option<EntityKind>,
    pub profile: Option<&'a UserPreferenceProfile>,
}

/// Entities found in one utterance, ordered by position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<Entity>,
}

impl Extraction {
    pub fn first(&self, kind: EntityKind) -> Option<&Entity> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    pub fn has(&self, kind: EntityKind) -> bool {
        self.first(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn exercise_id(&self) -> Option<&str> {
        self.first(EntityKind::Exercise).and_then(Entity::as_text)
    }

    pub fn reps(&self) -> Option<u32> {
        self.bounded(EntityKind::Reps, MAX_PLAUSIBLE_REPS).map(|v| v.round() as u32)
    }

    pub fn weight(&self) -> Option<f64> {
        self.bounded(EntityKind::Weight, MAX_PLAUSIBLE_WEIGHT)
    }

    pub fn weight_unit(&self) -> Option<Unit> {
        self.first(EntityKind::Weight).and_then(|e| e.unit)
    }

    pub fn sets(&self) -> Option<u32> {
        self.bounded(EntityKind::Sets, MAX_PLAUSIBLE_SETS).map(|v| v.round() as u32)
    }

    /// Duration normalized to seconds; bare numbers are taken as minutes
    pub fn duration_seconds(&self) -> Option<u32> {
        self.seconds(EntityKind::Duration, Unit::Minutes)
    }

    /// Rest normalized to seconds; bare numbers are taken as seconds
    pub fn rest_seconds(&self) -> Option<u32> {
        self.seconds(EntityKind::Rest, Unit::Seconds)
    }

    pub fn muscle_group(&self) -> Option<MuscleGroup> {
        let text = self.first(EntityKind::MuscleGroup)?.as_text()?;
        serde_json::from_value(serde_json::Value::String(text.to_string())).ok()
    }

    /// Count of numeric entities of any kind
    pub fn number_count(&self) -> usize {
        self.entities.iter().filter(|e| e.as_number().is_some()).count()
    }

    fn number(&self, kind: EntityKind) -> Option<f64> {
        self.first(kind).and_then(Entity::as_number)
    }

    fn bounded(&self, kind: EntityKind, max: f64) -> Option<f64> {
        let value = self.number(kind)?;
        if (0.0..=max).contains(&value) {
            Some(value)
        } else {
            tracing::debug!("Ignoring implausible {:?} value {}", kind, value);
            None
        }
    }

    fn seconds(&self, kind: EntityKind, default_unit: Unit) -> Option<u32> {
        let entity = self.first(kind)?;
        let value = entity.as_number()?;
        let seconds = match entity.unit.unwrap_or(default_unit) {
            Unit::Minutes => value * 60.0,
            _ => value,
        };
        Some(seconds.round() as u32)
    }

    pub(crate) fn spans_disjoint(&self) -> bool {
        let spans: Vec<Span> = self.entities.iter().filter_map(|e| e.span).collect();
        spans
            .iter()
            .enumerate()
            .all(|(i, a)| spans[i + 1..].iter().all(|b| !a.overlaps(b)))
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(Token { text: &text[s..i], start: s, end: i });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token { text: &text[s..], start: s, end: text.len() });
    }
    tokens
}

/// How a number's kind was decided, which scales its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    Prior,
    Positional,
    Marker,
    ActiveExercise,
    Profile,
    Scoped,
    Labelled,
}

impl Decision {
    fn certainty(self) -> f32 {
        match self {
            Decision::Prior => 0.6,
            Decision::Positional => 0.75,
            Decision::Marker | Decision::Profile | Decision::ActiveExercise => 0.9,
            Decision::Scoped | Decision::Labelled => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct NumberCandidate {
    value: f64,
    first_token: usize,
    last_token: usize,
    provenance: Provenance,
    multi_word: bool,
    kind: EntityKind,
    unit: Option<Unit>,
    decision: Decision,
}

impl NumberCandidate {
    fn labelled(&self) -> bool {
        self.decision == Decision::Labelled
    }

    fn base_confidence(&self) -> f32 {
        match (self.provenance, self.multi_word) {
            (Provenance::Digit, _) => BASE_CONFIDENCE_DIGIT,
            (_, true) => BASE_CONFIDENCE_WORDS,
            _ => BASE_CONFIDENCE_WORD,
        }
    }

    fn set(&mut self, kind: EntityKind, decision: Decision) {
        self.kind = kind;
        self.decision = decision;
    }
}

/// Extracts exercises, muscle groups and numbers from normalized text
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    catalog: Arc<ExerciseCatalog>,
    fuzzy_threshold: f64,
    range_tolerance: f64,
}

impl EntityExtractor {
    pub fn new(catalog: Arc<ExerciseCatalog>, fuzzy_threshold: f64, range_tolerance: f64) -> Self {
        Self {
            catalog,
            fuzzy_threshold,
            range_tolerance,
        }
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    pub fn extract(&self, normalized: &str, hints: &ExtractionHints<'_>) -> Extraction {
        let tokens = tokenize(normalized);
        let mut consumed = vec![false; tokens.len()];
        let mut entities = Vec::new();

        let exercise = self
            .find_exercise_alias(&tokens, &mut consumed)
            .or_else(|| self.find_exercise_fuzzy(&tokens, &mut consumed));
        let exercise_id = exercise.as_ref().and_then(|e| e.as_text()).map(str::to_string);
        entities.extend(exercise);

        entities.extend(find_muscle_groups(&tokens, &mut consumed));
        let bodyweight = find_bodyweight(&tokens, &mut consumed);

        let mut numbers = find_numbers(&tokens, &mut consumed);
        let mentions_rest = tokens.iter().any(|t| matches!(t.text, "rest" | "break"))
            || hints.expected == Some(EntityKind::Rest);
        label_by_unit(&tokens, &mut numbers, mentions_rest);

        let active_exercise = exercise_id.as_deref().or(hints.active_exercise);
        self.disambiguate(&tokens, &mut numbers, hints, active_exercise);

        entities.extend(numbers.iter().map(|n| number_entity(&tokens, n)));
        if let Some(entity) = bodyweight {
            if !entities.iter().any(|e| e.kind == EntityKind::Weight) {
                entities.push(entity);
            }
        }

        entities.sort_by_key(|e| e.span.map(|s| s.start).unwrap_or(usize::MAX));
        let extraction = Extraction { entities };
        debug_assert!(extraction.spans_disjoint());
        tracing::debug!(
            "Extracted {} entities from {:?}",
            extraction.entities.len(),
            normalized
        );
        extraction
    }

    fn find_exercise_alias(&self, tokens: &[Token<'_>], consumed: &mut [bool]) -> Option<Entity> {
        let max_window = self.catalog.max_alias_words();
        for start in 0..tokens.len() {
            let longest = max_window.min(tokens.len() - start);
            for len in (1..=longest).rev() {
                let window = &tokens[start..start + len];
                let phrase = join(window);
                if let Some(def) = self.catalog.lookup_alias(&phrase) {
                    mark(consumed, start, len);
                    return Some(Entity::text(
                        EntityKind::Exercise,
                        def.id.clone(),
                        phrase,
                        Some(window_span(window)),
                        BASE_CONFIDENCE_ALIAS,
                        Provenance::Alias,
                    ));
                }
            }
        }
        None
    }

    fn find_exercise_fuzzy(&self, tokens: &[Token<'_>], consumed: &mut [bool]) -> Option<Entity> {
        let mut best: Option<(usize, usize, String, f64)> = None;

        for start in 0..tokens.len() {
            for len in 1..=3.min(tokens.len() - start) {
                let window = &tokens[start..start + len];
                if consumed[start..start + len].iter().any(|c| *c)
                    || window.iter().any(|t| !is_fuzzy_candidate(t.text))
                {
                    break;
                }
                let phrase = join(window);
                if phrase.len() < 4 {
                    continue;
                }
                if let Some((def, score)) = self.catalog.fuzzy_lookup(&phrase, self.fuzzy_threshold) {
                    if len == 1 && phrase.len() < FUZZY_SHORT_WORD_LEN && score < FUZZY_SHORT_WORD_MIN_SCORE {
                        continue;
                    }
                    if best.as_ref().map_or(true, |b| score > b.3) {
                        best = Some((start, len, def.id.clone(), score));
                    }
                }
            }
        }

        let (start, len, id, score) = best?;
        let window = &tokens[start..start + len];
        mark(consumed, start, len);
        Some(Entity::text(
            EntityKind::Exercise,
            id,
            join(window),
            Some(window_span(window)),
            score as f32,
            Provenance::Fuzzy,
        ))
    }

    fn disambiguate(
        &self,
        tokens: &[Token<'_>],
        numbers: &mut [NumberCandidate],
        hints: &ExtractionHints<'_>,
        active_exercise: Option<&str>,
    ) {
        let pool: Vec<usize> = (0..numbers.len()).filter(|&i| !numbers[i].labelled()).collect();
        if pool.is_empty() {
            return;
        }

        // A flow step asking for one specific value owns a lone number
        if let (Some(expected), [only]) = (hints.expected, pool.as_slice()) {
            if expected != EntityKind::Exercise && expected != EntityKind::MuscleGroup {
                numbers[*only].set(expected, Decision::Scoped);
                return;
            }
        }

        let labelled_weight = numbers.iter().any(|n| n.labelled() && n.kind == EntityKind::Weight);
        let labelled_reps = numbers.iter().any(|n| n.labelled() && n.kind == EntityKind::Reps);

        if labelled_weight && !labelled_reps {
            for &i in &pool {
                numbers[i].set(EntityKind::Reps, Decision::Labelled);
            }
        } else if labelled_reps && !labelled_weight {
            for &i in &pool {
                numbers[i].set(EntityKind::Weight, Decision::Labelled);
            }
        } else if pool.len() == 1 && hints.active_exercise.is_some() {
            numbers[pool[0]].set(EntityKind::Reps, Decision::ActiveExercise);
        } else if let Some(marked) = marker_adjacent(tokens, numbers) {
            for &i in &pool {
                if i == marked {
                    numbers[i].set(EntityKind::Weight, Decision::Marker);
                } else {
                    numbers[i].set(EntityKind::Reps, Decision::Marker);
                }
            }
        } else if pool.len() >= 2 {
            numbers[pool[0]].set(EntityKind::Reps, Decision::Positional);
            numbers[pool[1]].set(EntityKind::Weight, Decision::Positional);
        }

        let Some(profile) = hints.profile else { return };
        let Some(stats) = active_exercise.and_then(|id| profile.stats(id)) else {
            return;
        };
        let (Some(reps_range), Some(weight_range)) = (stats.reps, stats.weight) else {
            return;
        };

        for &i in &pool {
            let candidate = &mut numbers[i];
            if candidate.decision == Decision::Scoped {
                continue;
            }
            let value = candidate.value;
            let in_reps = reps_range.contains(value, self.range_tolerance);
            let in_weight = weight_range.contains(value, self.range_tolerance);
            let learned = match (in_reps, in_weight) {
                (true, false) => EntityKind::Reps,
                (false, true) => EntityKind::Weight,
                _ => continue,
            };
            if learned != candidate.kind {
                tracing::debug!(
                    "Profile range reclassified {} from {:?} to {:?}",
                    value,
                    candidate.kind,
                    learned
                );
            }
            candidate.set(learned, Decision::Profile);
        }
    }
}

fn join(window: &[Token<'_>]) -> String {
    window.iter().map(|t| t.text).collect::<Vec<_>>().join(" ")
}

fn window_span(window: &[Token<'_>]) -> Span {
    Span::new(window[0].start, window[window.len() - 1].end)
}

fn mark(consumed: &mut [bool], start: usize, len: usize) {
    consumed[start..start + len].iter_mut().for_each(|c| *c = true);
}

fn is_fuzzy_candidate(word: &str) -> bool {
    word.chars().all(char::is_alphabetic)
        && !is_number_word(word)
        && Unit::from_token(word).is_none()
        && !FUZZY_STOP_WORDS.contains(&word)
        && MuscleGroup::from_keyword(word).is_none()
}

fn find_muscle_groups(tokens: &[Token<'_>], consumed: &mut [bool]) -> Vec<Entity> {
    let mut found = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if consumed[i] {
            i += 1;
            continue;
        }
        let full_body = tokens[i].text == "full"
            && tokens.get(i + 1).is_some_and(|t| t.text == "body")
            && !consumed[i + 1];
        let (group, len) = if full_body {
            (Some(MuscleGroup::FullBody), 2)
        } else if tokens[i].text == "full" {
            (None, 1)
        } else {
            (MuscleGroup::from_keyword(tokens[i].text), 1)
        };

        if let Some(group) = group {
            let window = &tokens[i..i + len];
            mark(consumed, i, len);
            found.push(Entity::text(
                EntityKind::MuscleGroup,
                group.as_str(),
                join(window),
                Some(window_span(window)),
                0.9,
                Provenance::Alias,
            ));
        }
        i += len;
    }
    found
}

/// "bodyweight", "body weight" or "no weight" answer the weight question with 0
fn find_bodyweight(tokens: &[Token<'_>], consumed: &mut [bool]) -> Option<Entity> {
    for (i, token) in tokens.iter().enumerate() {
        if consumed[i] {
            continue;
        }
        let len = match token.text {
            "bodyweight" => 1,
            "body" | "no" if tokens.get(i + 1).is_some_and(|t| t.text == "weight") => 2,
            _ => continue,
        };
        if consumed[i..i + len].iter().any(|c| *c) {
            continue;
        }
        let window = &tokens[i..i + len];
        mark(consumed, i, len);
        return Some(Entity::number(
            EntityKind::Weight,
            0.0,
            join(window),
            Some(window_span(window)),
            0.9,
            Provenance::Alias,
        ));
    }
    None
}

fn find_numbers(tokens: &[Token<'_>], consumed: &mut [bool]) -> Vec<NumberCandidate> {
    let mut numbers = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if consumed[i] {
            i += 1;
            continue;
        }

        if let Some(value) = parse_digits(tokens[i].text) {
            consumed[i] = true;
            numbers.push(NumberCandidate {
                value,
                first_token: i,
                last_token: i,
                provenance: Provenance::Digit,
                multi_word: false,
                kind: EntityKind::Reps,
                unit: None,
                decision: Decision::Prior,
            });
            i += 1;
            continue;
        }

        let longest = MAX_WORD_WINDOW.min(tokens.len() - i);
        let hit = (1..=longest).rev().find_map(|len| {
            if consumed[i..i + len].iter().any(|c| *c) {
                return None;
            }
            let words: Vec<&str> = tokens[i..i + len].iter().map(|t| t.text).collect();
            parse_word_window(&words).map(|v| (len, v))
        });

        match hit {
            Some((len, value)) => {
                mark(consumed, i, len);
                let multi_word = len > 1;
                numbers.push(NumberCandidate {
                    value: f64::from(value),
                    first_token: i,
                    last_token: i + len - 1,
                    provenance: Provenance::WordNumber,
                    multi_word,
                    // Compounds are usually plate math, single words usually counts
                    kind: if multi_word { EntityKind::Weight } else { EntityKind::Reps },
                    unit: None,
                    decision: Decision::Prior,
                });
                i += len;
            }
            None => i += 1,
        }
    }

    numbers
}

fn label_by_unit(tokens: &[Token<'_>], numbers: &mut [NumberCandidate], mentions_rest: bool) {
    for candidate in numbers.iter_mut() {
        let Some(next) = tokens.get(candidate.last_token + 1) else {
            continue;
        };
        if REP_LABELS.contains(&next.text) {
            candidate.set(EntityKind::Reps, Decision::Labelled);
        } else if next.text == "sets" {
            candidate.set(EntityKind::Sets, Decision::Labelled);
        } else if let Some(unit) = Unit::from_token(next.text) {
            let kind = if unit.is_weight() {
                EntityKind::Weight
            } else if mentions_rest {
                EntityKind::Rest
            } else {
                EntityKind::Duration
            };
            candidate.set(kind, Decision::Labelled);
            candidate.unit = Some(unit);
        }
    }
}

/// Index of the number directly following a weight marker, if any
fn marker_adjacent(tokens: &[Token<'_>], numbers: &[NumberCandidate]) -> Option<usize> {
    for (m, token) in tokens.iter().enumerate() {
        if !WEIGHT_MARKERS.contains(&token.text) {
            continue;
        }
        let mut next = m + 1;
        if tokens.get(next).is_some_and(|t| MARKER_GAP_WORDS.contains(&t.text)) {
            next += 1;
        }
        if let Some(idx) = numbers.iter().position(|n| n.first_token == next) {
            return Some(idx);
        }
    }
    None
}

fn number_entity(tokens: &[Token<'_>], candidate: &NumberCandidate) -> Entity {
    let window = &tokens[candidate.first_token..=candidate.last_token];
    let confidence = candidate.base_confidence() * candidate.decision.certainty();
    Entity::number(
        candidate.kind,
        candidate.value,
        join(window),
        Some(window_span(window)),
        confidence,
        candidate.provenance,
    )
    .with_unit(candidate.unit)
}
