//! Causeway Journal - a queryable record of what the cause tracker did.
//!
//! Every block transaction the tracker applies or rolls back, and every spawn
//! request it materializes or rejects, is written to the journal along with
//! the phase that captured it and the root cause of the event it was posted
//! under. Tests and debugging tools use it to answer "who changed this block,
//! and was it kept?".
//!
//! # Modules
//!
//! - [`journal`]: the [`CauseJournal`](journal::CauseJournal) with block and
//!   spawn records and query methods.

#![deny(unsafe_code)]

pub mod journal;
