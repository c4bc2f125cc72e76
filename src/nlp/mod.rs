//! Local language understanding
//!
//! Normalizer -> Extractor, both pure over the shared exercise catalog.

pub mod catalog;
pub mod extractor;
pub mod fuzzy;
pub mod normalizer;
pub mod numbers;

pub use catalog::{ExerciseCatalog, ExerciseDefinition};
pub use extractor::{EntityExtractor, Extraction, ExtractionHints};
pub use normalizer::TranscriptNormalizer;
