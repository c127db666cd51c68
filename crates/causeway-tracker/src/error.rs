//! Error types for the tracking engine.
//!
//! [`TrackerError`] covers integration errors only: the surrounding system
//! broke the tracker's contract. Cancelled events and invalidated
//! transactions are domain outcomes, reconciled by rollback, and never show
//! up here.

use crate::cause::{CauseKey, CauseKind};
use crate::context::BufferCounts;
use crate::diagnostics::StackDiagnostics;
use crate::state::PhaseState;

/// Errors raised by the phase tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// A state was unwound without a cause slot it requires.
    #[error("phase {phase} requires cause slot `{key}` holding a {expected}; stack:{stack}")]
    MissingCause {
        phase: PhaseState,
        key: CauseKey,
        expected: CauseKind,
        stack: StackDiagnostics,
    },

    /// The state on top of the stack does not allow the requested push.
    #[error("cannot push {requested} while {current} is active; stack:{stack}")]
    IncompatiblePush {
        current: PhaseState,
        requested: PhaseState,
        stack: StackDiagnostics,
    },

    /// An unwind finished with captures still buffered.
    #[error("phase {phase} unwound with leftover captures ({remaining}); stack:{stack}")]
    LeftoverCaptures {
        phase: PhaseState,
        remaining: BufferCounts,
        stack: StackDiagnostics,
    },

    /// The stack was not empty at a step boundary.
    #[error("phase stack not empty at step boundary; stack:{stack}")]
    StackNotEmpty { stack: StackDiagnostics },

    #[error("pop_and_unwind called on an empty phase stack")]
    PopOnEmptyStack,

    /// Fixed-point drain kept producing captures past the configured bound.
    #[error("phase {phase} did not converge after {passes} drain passes ({remaining} captures pending); stack:{stack}")]
    DrainDidNotConverge {
        phase: PhaseState,
        passes: u32,
        remaining: usize,
        stack: StackDiagnostics,
    },

    /// Immediate-mode neighbor reactions kept cascading past the bound.
    #[error("direct block cascade exceeded {limit} updates under {phase}; stack:{stack}")]
    CascadeLimitExceeded {
        phase: PhaseState,
        limit: usize,
        stack: StackDiagnostics,
    },

    /// A listener left the stack at a different depth than it found it.
    #[error("listener for {event} left stack at depth {actual}, expected {expected}; stack:{stack}")]
    UnbalancedListener {
        event: &'static str,
        expected: usize,
        actual: usize,
        stack: StackDiagnostics,
    },

    /// Pushing would exceed the configured maximum stack depth.
    #[error("pushing {requested} would exceed max stack depth {max_depth}; stack:{stack}")]
    StackOverflow {
        requested: PhaseState,
        max_depth: usize,
        stack: StackDiagnostics,
    },
}

impl TrackerError {
    /// The stack snapshot carried by this error, if any.
    pub fn stack(&self) -> Option<&StackDiagnostics> {
        match self {
            TrackerError::MissingCause { stack, .. }
            | TrackerError::IncompatiblePush { stack, .. }
            | TrackerError::LeftoverCaptures { stack, .. }
            | TrackerError::StackNotEmpty { stack }
            | TrackerError::DrainDidNotConverge { stack, .. }
            | TrackerError::CascadeLimitExceeded { stack, .. }
            | TrackerError::UnbalancedListener { stack, .. }
            | TrackerError::StackOverflow { stack, .. } => Some(stack),
            TrackerError::PopOnEmptyStack => None,
        }
    }
}

/// A cause enricher could not add its entries.
///
/// Only ever logged and discarded by
/// [`PhaseTracker::enrich_cause`](crate::tracker::PhaseTracker::enrich_cause).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cause enrichment failed: {reason}")]
pub struct EnrichmentError {
    pub reason: String,
}

impl EnrichmentError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Invalid tracker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse tracker config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid tracker config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}
