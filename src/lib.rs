//! fitvoice - voice command understanding and conversation flows for fitness tracking

pub mod command;
pub mod conversation;
pub mod core;
pub mod llm;
pub mod memory;
pub mod nlp;
pub mod session;

pub use conversation::{TurnInput, TurnOutcome, TurnOutput};
pub use core::{EngineConfig, Result, VoiceError};
pub use session::{Engine, VoiceSession};
