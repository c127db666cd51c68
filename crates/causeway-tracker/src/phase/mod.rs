//! Per-group unwind handlers.
//!
//! Every state dispatches to its group's handler through
//! [`PhaseGroup::unwind_handler`](crate::group::PhaseGroup::unwind_handler).
//! Handlers are plain functions with the [`UnwindFn`](crate::state::UnwindFn)
//! signature; most pick a cause root and hand off to the shared unwind.

pub mod block;
pub mod entity;
pub mod general;
pub mod generation;
pub mod packet;
pub mod plugin;
pub mod tick;
