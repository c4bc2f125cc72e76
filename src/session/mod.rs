//! Engine (shared) and voice sessions (per user)

pub mod engine;
pub mod voice;

pub use engine::Engine;
pub use voice::VoiceSession;
