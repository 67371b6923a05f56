//! State machine module root.

pub mod machine;

pub use machine::{
    Guards, OrchestratorEvent, OrchestratorState, OrchestratorStateMachine, TransitionResult,
    next_event,
};
