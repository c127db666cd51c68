//! The LIFO stack of in-flight phases.

use crate::context::PhaseContext;
use crate::diagnostics::{FrameSummary, StackDiagnostics};
use crate::state::PhaseState;

/// One in-flight phase. The frame owns its context exclusively.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) state: PhaseState,
    pub(crate) context: PhaseContext,
}

/// Ordered `(state, context)` frames. The state of an empty stack is
/// [`PhaseState::Idle`].
#[derive(Debug, Default)]
pub struct PhaseStack {
    frames: Vec<Frame>,
}

impl PhaseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, context: PhaseContext) {
        self.frames.push(Frame {
            state: context.state(),
            context,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// State of the top frame, or `Idle` when empty.
    pub fn current_state(&self) -> PhaseState {
        self.frames.last().map_or(PhaseState::Idle, |f| f.state)
    }

    pub fn current_context(&self) -> Option<&PhaseContext> {
        self.frames.last().map(|f| &f.context)
    }

    pub(crate) fn current_context_mut(&mut self) -> Option<&mut PhaseContext> {
        self.frames.last_mut().map(|f| &mut f.context)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, state: PhaseState) -> bool {
        self.frames.iter().any(|f| f.state == state)
    }

    /// States from bottom to top.
    pub fn states(&self) -> Vec<PhaseState> {
        self.frames.iter().map(|f| f.state).collect()
    }

    pub fn diagnostics(&self) -> StackDiagnostics {
        StackDiagnostics {
            frames: self
                .frames
                .iter()
                .map(|f| FrameSummary {
                    state: f.state,
                    group: f.state.group(),
                    cause_keys: f
                        .context
                        .causes()
                        .iter()
                        .map(|c| c.name.as_str().to_owned())
                        .collect(),
                    buffers: f.context.counts(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::SOURCE;
    use causeway_world::identity::UserId;

    #[test]
    fn empty_stack_is_idle() {
        let stack = PhaseStack::new();
        assert_eq!(stack.current_state(), PhaseState::Idle);
        assert!(stack.current_context().is_none());
        assert!(stack.diagnostics().is_empty());
    }

    #[test]
    fn lifo_order_and_diagnostics() {
        let mut stack = PhaseStack::new();
        stack.push(PhaseContext::new(PhaseState::PlayerInteraction).with_cause(SOURCE, UserId(1)));
        stack.push(PhaseContext::new(PhaseState::Command));
        assert_eq!(stack.current_state(), PhaseState::Command);
        assert!(stack.contains(PhaseState::PlayerInteraction));

        let diag = stack.diagnostics();
        assert_eq!(diag.frames[0].cause_keys, vec!["source".to_owned()]);
        assert_eq!(diag.states(), stack.states());

        assert_eq!(stack.pop().map(|f| f.state), Some(PhaseState::Command));
        assert_eq!(stack.pop().map(|f| f.state), Some(PhaseState::PlayerInteraction));
        assert!(stack.pop().is_none());
    }
}
