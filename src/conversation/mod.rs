//! Conversation flow management
//!
//! At most one flow is active per session. The manager decides per turn
//! whether the utterance answers the flow or starts something new.

pub mod flow;
pub mod manager;
pub mod responses;
pub mod timer;
pub mod turn;

pub use flow::{ConversationFlow, FlowData, FlowKind, FlowStep};
pub use manager::{FlowManager, FlowTurn, TurnContext};
pub use turn::{EmotionTag, FlowState, RejectReason, SessionContext, TurnInput, TurnOutcome, TurnOutput};
