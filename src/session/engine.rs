//! Shared, read-only pipeline components
//!
//! One engine serves any number of sessions. Nothing in it is mutated after
//! construction.

use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::llm::classifier::IntentClassifier;
use crate::llm::client::ReasoningBackend;
use crate::llm::reply::ReplyGenerator;
use crate::nlp::catalog::ExerciseCatalog;
use crate::nlp::extractor::EntityExtractor;
use crate::nlp::normalizer::TranscriptNormalizer;
use std::sync::Arc;
use std::time::Duration;

pub struct Engine {
    pub config: EngineConfig,
    pub catalog: Arc<ExerciseCatalog>,
    pub normalizer: TranscriptNormalizer,
    pub extractor: EntityExtractor,
    pub classifier: IntentClassifier,
    pub replies: ReplyGenerator,
}

impl Engine {
    /// Build the pipeline; `backend` is optional, local rules cover its absence
    pub fn new(config: EngineConfig, backend: Option<Arc<dyn ReasoningBackend>>) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(ExerciseCatalog::builtin().extended(&config.exercises));
        tracing::info!(
            "Engine ready: {} exercises, reasoning backend {}",
            catalog.len(),
            if backend.is_some() { "configured" } else { "off" }
        );

        Ok(Self {
            normalizer: TranscriptNormalizer::new(catalog.clone()),
            extractor: EntityExtractor::new(catalog.clone(), config.fuzzy_match_threshold, config.range_tolerance),
            classifier: IntentClassifier::new(
                backend.clone(),
                config.classifier_timeout(),
                catalog.clone(),
                config.fuzzy_match_threshold,
            ),
            replies: ReplyGenerator::new(backend, config.classifier_timeout()),
            catalog,
            config,
        })
    }

    /// Local rules and canned replies only
    pub fn offline(config: EngineConfig) -> Result<Self> {
        Self::new(config, None)
    }

    pub fn slot_step_timeout(&self) -> Duration {
        Duration::from_millis(self.config.slot_step_timeout_ms)
    }

    pub fn conversational_step_timeout(&self) -> Duration {
        Duration::from_millis(self.config.conversational_step_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::catalog::ExerciseDefinition;
    use crate::core::types::MuscleGroup;

    #[test]
    fn test_offline_engine() {
        let engine = Engine::offline(EngineConfig::default()).unwrap();
        assert!(!engine.classifier.has_backend());
        assert_eq!(engine.slot_step_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_exercises_reach_normalizer() {
        let config = EngineConfig {
            exercises: vec![ExerciseDefinition {
                id: "landmine_press".into(),
                name: "landmine press".into(),
                aliases: vec!["landmine".into()],
                muscle_group: MuscleGroup::Shoulders,
                bodyweight: false,
            }],
            ..Default::default()
        };
        let engine = Engine::offline(config).unwrap();
        assert_eq!(engine.normalizer.normalize("Landmine 8 reps"), "landmine press 8 reps");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert!(Engine::offline(config).is_err());
    }
}
