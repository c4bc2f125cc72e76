//! Context, memory and adaptive learning
//!
//! Short-term turn history, keyword signals, the long-term preference profile
//! and the background task that updates it.

pub mod history;
pub mod learning;
pub mod profile;
pub mod signals;
pub mod store;

pub use history::{ConversationTurn, HistoryWriter, HistoryWriterHandle, TurnHistory};
pub use learning::{LearningEngine, LearningEvent, LearningHandle};
pub use profile::{CommunicationStyle, LoggedSet, UserPreferenceProfile};
pub use signals::{Mood, Signals, WorkoutPhase};
pub use store::{FileStore, KeyValueStore, MemoryStore};
