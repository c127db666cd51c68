//! Stack snapshots for integration errors, and running tracker counters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::BufferCounts;
use crate::group::PhaseGroup;
use crate::state::PhaseState;

/// One stack frame, summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub state: PhaseState,
    pub group: PhaseGroup,
    /// Cause slot names in insertion order.
    pub cause_keys: Vec<String>,
    pub buffers: BufferCounts,
}

/// Bottom-to-top summary of the phase stack at the moment an error was
/// raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDiagnostics {
    pub frames: Vec<FrameSummary>,
}

impl StackDiagnostics {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// States from bottom to top.
    pub fn states(&self) -> Vec<PhaseState> {
        self.frames.iter().map(|f| f.state).collect()
    }
}

impl fmt::Display for StackDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return f.write_str("<empty stack>");
        }
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            write!(
                f,
                "\n  #{depth} {} ({}) causes=[{}] {}",
                frame.state,
                frame.group,
                frame.cause_keys.join(", "),
                frame.buffers
            )?;
        }
        Ok(())
    }
}

/// Counters accumulated across unwinds. Reset by
/// [`PhaseTracker::take_stats`](crate::tracker::PhaseTracker::take_stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub phases_unwound: u64,
    pub pipeline_passes: u64,
    pub events_posted: u64,
    pub applied: u64,
    pub rolled_back: u64,
    pub entities_spawned: u64,
    pub spawns_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_top_frame_first() {
        let diag = StackDiagnostics {
            frames: vec![
                FrameSummary {
                    state: PhaseState::Command,
                    group: PhaseGroup::General,
                    cause_keys: vec!["source".into(), "command".into()],
                    buffers: BufferCounts::default(),
                },
                FrameSummary {
                    state: PhaseState::BlockTick,
                    group: PhaseGroup::Tick,
                    cause_keys: vec!["source".into()],
                    buffers: BufferCounts {
                        blocks: 2,
                        ..BufferCounts::default()
                    },
                },
            ],
        };
        let text = diag.to_string();
        let tick_at = text.find("block_tick").unwrap();
        let cmd_at = text.find("command (general)").unwrap();
        assert!(tick_at < cmd_at);
        assert!(text.contains("blocks=2"));
        assert_eq!(diag.states(), vec![PhaseState::Command, PhaseState::BlockTick]);
    }

    #[test]
    fn empty_stack_renders_marker() {
        assert_eq!(StackDiagnostics::default().to_string(), "<empty stack>");
    }
}
