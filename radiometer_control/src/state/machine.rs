//! Orchestrator lifecycle: AwaitingReady → Cycling → Stopping → Closed.
//!
//! The transition table is pure: guards are sampled from the controllers
//! once per loop iteration and turned into at most one event by
//! [`next_event`].

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrchestratorState {
    /// Waiting for every controller to be initialized, running and fault-free.
    AwaitingReady,
    /// Executing measurement cycles.
    Cycling,
    /// Closing every controller.
    Stopping,
    /// Terminal.
    Closed,
}

impl OrchestratorState {
    /// Stable label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            OrchestratorState::AwaitingReady => "AwaitingReady",
            OrchestratorState::Cycling => "Cycling",
            OrchestratorState::Stopping => "Stopping",
            OrchestratorState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded: new state.
    Ok(OrchestratorState),
    /// Transition rejected: reason.
    Rejected(&'static str),
}

/// Event that can trigger a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// Every controller is initialized, running and fault-free.
    Ready,
    /// A controller lost `init` or `run` while cycling.
    Paused,
    /// A controller reported a device fault.
    Fault,
    /// A controller raised `quit`.
    Quit,
    /// Every controller has been asked to close.
    CloseComplete,
}

/// Guard values sampled from the controllers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    /// `init` on every controller.
    pub all_init: bool,
    /// `run` on every controller.
    pub all_run: bool,
    /// `has_error()` on any controller.
    pub any_error: bool,
    /// `quit` on any controller.
    pub any_quit: bool,
}

impl Guards {
    /// Ready to cycle.
    pub const fn ready(&self) -> bool {
        self.all_init && self.all_run && !self.any_error
    }
}

/// Orchestrator state holder.
#[derive(Debug, Clone)]
pub struct OrchestratorStateMachine {
    state: OrchestratorState,
}

impl Default for OrchestratorStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorStateMachine {
    /// Start in AwaitingReady.
    pub const fn new() -> Self {
        Self {
            state: OrchestratorState::AwaitingReady,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Attempt a transition given an event.
    pub fn handle_event(&mut self, event: OrchestratorEvent) -> TransitionResult {
        use OrchestratorEvent::*;
        use OrchestratorState::*;

        let next = match (self.state, event) {
            (AwaitingReady, Ready) => Cycling,

            // Faults and lost permission pause, they never stop.
            (Cycling, Fault) | (Cycling, Paused) => AwaitingReady,

            // quit wins from any live state; repeated quit is harmless
            (AwaitingReady, Quit) | (Cycling, Quit) | (Stopping, Quit) => Stopping,

            (Stopping, CloseComplete) => Closed,

            _ => {
                return TransitionResult::Rejected(invalid_transition_reason(self.state, event));
            }
        };

        self.state = next;
        TransitionResult::Ok(next)
    }

    /// Orchestrator loop should keep running.
    #[inline]
    pub const fn is_live(&self) -> bool {
        !matches!(self.state, OrchestratorState::Closed)
    }
}

/// Event implied by `guards` in `state`, if any.
///
/// `quit` takes precedence over everything else. Stopping and Closed are
/// driven by the shutdown sequence, not by guards.
pub fn next_event(state: OrchestratorState, guards: &Guards) -> Option<OrchestratorEvent> {
    use OrchestratorState::*;
    if guards.any_quit && matches!(state, AwaitingReady | Cycling) {
        return Some(OrchestratorEvent::Quit);
    }
    match state {
        AwaitingReady if guards.ready() => Some(OrchestratorEvent::Ready),
        Cycling if guards.any_error => Some(OrchestratorEvent::Fault),
        Cycling if !(guards.all_init && guards.all_run) => Some(OrchestratorEvent::Paused),
        _ => None,
    }
}

fn invalid_transition_reason(state: OrchestratorState, event: OrchestratorEvent) -> &'static str {
    use OrchestratorState::*;
    match (state, event) {
        (Closed, _) => "Closed: terminal state",
        (AwaitingReady, OrchestratorEvent::CloseComplete) => "AwaitingReady: nothing to close",
        (AwaitingReady, _) => "AwaitingReady: only Ready or Quit allowed",
        (Cycling, _) => "Cycling: only Fault, Paused or Quit allowed",
        (Stopping, _) => "Stopping: only CloseComplete allowed",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
