//! Intent classification with a guaranteed local fallback
//!
//! The backend call is raced against a timeout and the turn's cancellation
//! token. Any of those finishing first, or an unusable reply, sends the turn
//! through the keyword rules in [`crate::llm::fallback`].

use crate::core::error::Result;
use crate::core::types::{clamp_confidence, Entity, EntityKind, Provenance, Unit};
use crate::llm::client::{complete_within, ReasoningBackend};
use crate::llm::context::ClassifierContext;
use crate::llm::fallback;
use crate::llm::intent::{ClassificationSource, IntentAlternative, IntentLabel, IntentResult};
use crate::llm::parser::{build_user_prompt, parse_reply, system_prompt, ParsedReply};
use crate::nlp::catalog::ExerciseCatalog;
use crate::nlp::extractor::Extraction;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Confidence used when the backend omits one
const DEFAULT_BACKEND_CONFIDENCE: f32 = 0.7;

/// Confidence for entities the backend inferred without a text anchor
const BACKEND_ENTITY_CONFIDENCE: f32 = 0.6;

pub struct IntentClassifier {
    backend: Option<Arc<dyn ReasoningBackend>>,
    timeout: Duration,
    catalog: Arc<ExerciseCatalog>,
    fuzzy_threshold: f64,
    system_prompt: String,
}

impl IntentClassifier {
    pub fn new(
        backend: Option<Arc<dyn ReasoningBackend>>,
        timeout: Duration,
        catalog: Arc<ExerciseCatalog>,
        fuzzy_threshold: f64,
    ) -> Self {
        Self {
            backend,
            timeout,
            catalog,
            fuzzy_threshold,
            system_prompt: system_prompt(),
        }
    }

    /// Local rules only
    pub fn offline(catalog: Arc<ExerciseCatalog>) -> Self {
        Self::new(None, Duration::from_secs(1), catalog, 0.7)
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Classify a normalized utterance; never fails
    pub async fn classify(
        &self,
        normalized: &str,
        extraction: &Extraction,
        context: &ClassifierContext,
        cancel: &CancellationToken,
    ) -> IntentResult {
        let Some(backend) = &self.backend else {
            return fallback::classify(normalized, extraction, context);
        };

        match self.ask_backend(backend.as_ref(), normalized, context, cancel).await {
            Ok(parsed) => {
                tracing::debug!("Backend classified {:?} as {}", normalized, parsed.label.as_str());
                self.merge(parsed, extraction)
            }
            Err(e) => {
                tracing::warn!("Intent backend unavailable, using local rules: {}", e);
                let mut result = fallback::classify(normalized, extraction, context);
                result.interpretation_note = format!("{} (backend: {})", result.interpretation_note, e);
                result
            }
        }
    }

    async fn ask_backend(
        &self,
        backend: &dyn ReasoningBackend,
        normalized: &str,
        context: &ClassifierContext,
        cancel: &CancellationToken,
    ) -> Result<ParsedReply> {
        let user_prompt = build_user_prompt(normalized, context);
        let response =
            complete_within(backend, &self.system_prompt, &user_prompt, self.timeout, cancel).await?;
        parse_reply(&response)
    }

    /// Local entities win; backend guesses fill only the kinds we missed
    fn merge(&self, parsed: ParsedReply, extraction: &Extraction) -> IntentResult {
        let ParsedReply { label, reply } = parsed;
        let mut entities = extraction.entities.clone();

        if !extraction.has(EntityKind::Exercise) {
            if let Some(name) = reply.exercise.as_deref() {
                if let Some(entity) = self.backend_exercise(name) {
                    entities.push(entity);
                }
            }
        }

        let unit = reply.unit.as_deref().and_then(Unit::from_token).filter(Unit::is_weight);
        let numbers = [(EntityKind::Reps, reply.reps), (EntityKind::Weight, reply.weight)];
        for (kind, value) in numbers {
            let Some(value) = value.filter(|v| v.is_finite() && *v >= 0.0) else {
                continue;
            };
            if extraction.has(kind) {
                continue;
            }
            let entity = Entity::number(
                kind,
                value,
                value.to_string(),
                None,
                BACKEND_ENTITY_CONFIDENCE,
                Provenance::Digit,
            );
            let entity = if kind == EntityKind::Weight {
                entity.with_unit(unit)
            } else {
                entity
            };
            entities.push(entity);
        }

        let alternatives = reply
            .alternatives
            .iter()
            .filter_map(|alt| {
                let alt_label = IntentLabel::parse(&alt.intent)?;
                Some(IntentAlternative::new(
                    alt_label,
                    alt.confidence.unwrap_or(0.0),
                    alt.reason.clone().unwrap_or_default(),
                ))
            })
            .collect();

        let confidence = clamp_confidence(reply.confidence.unwrap_or(DEFAULT_BACKEND_CONFIDENCE));
        let note = reply
            .note
            .clone()
            .unwrap_or_else(|| "classified by reasoning backend".to_string());

        IntentResult::new(label, confidence, entities, ClassificationSource::Backend, note)
            .with_alternatives(alternatives)
    }

    fn backend_exercise(&self, name: &str) -> Option<Entity> {
        if let Some(def) = self.catalog.lookup_alias(name) {
            return Some(Entity::text(
                EntityKind::Exercise,
                def.id.clone(),
                name,
                None,
                BACKEND_ENTITY_CONFIDENCE,
                Provenance::Alias,
            ));
        }
        let (def, score) = self.catalog.fuzzy_lookup(name, self.fuzzy_threshold)?;
        Some(Entity::text(
            EntityKind::Exercise,
            def.id.clone(),
            name,
            None,
            BACKEND_ENTITY_CONFIDENCE.min(score as f32),
            Provenance::Fuzzy,
        ))
    }
}
