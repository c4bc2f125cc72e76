//! Intent classification and reply generation
//!
//! The remote reasoning backend is optional. Every path through this module
//! has a local answer when the backend is missing, slow or wrong.

pub mod classifier;
pub mod client;
pub mod context;
pub mod fallback;
pub mod intent;
pub mod parser;
pub mod reply;

pub use classifier::IntentClassifier;
pub use client::{LlmClient, ReasoningBackend};
pub use context::ClassifierContext;
pub use intent::{ClassificationSource, IntentAlternative, IntentLabel, IntentResult};
pub use reply::{ReplyGenerator, ReplyRequest, Topic};
