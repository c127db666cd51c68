//! Original/proposed state pairs with a validity flag.
//!
//! A [`Transaction`] is created when a mutation site is observed during
//! capture and consumed once the pipeline applies or rolls it back. Its
//! `original` and `proposed` values never change after construction; only the
//! validity flag and the optional custom replacement are mutable, and only
//! event listeners are expected to touch them.

use causeway_world::block::{BlockChange, BlockSnapshot};
use causeway_world::position::BlockPos;
use serde::{Deserialize, Serialize};

/// One captured mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction<T> {
    original: T,
    proposed: T,
    custom: Option<T>,
    valid: bool,
}

/// A block mutation: snapshot before and after the write.
pub type BlockTransaction = Transaction<BlockSnapshot>;

impl<T> Transaction<T> {
    /// A valid transaction with no custom replacement.
    pub fn new(original: T, proposed: T) -> Self {
        Self {
            original,
            proposed,
            custom: None,
            valid: true,
        }
    }

    pub fn original(&self) -> &T {
        &self.original
    }

    pub fn proposed(&self) -> &T {
        &self.proposed
    }

    pub fn custom(&self) -> Option<&T> {
        self.custom.as_ref()
    }

    /// Replace the value that will be applied. The proposed value is kept for
    /// inspection.
    pub fn set_custom(&mut self, custom: T) {
        self.custom = Some(custom);
    }

    pub fn clear_custom(&mut self) {
        self.custom = None;
    }

    /// The value application will write: the custom replacement if one was
    /// set, otherwise the proposed value.
    pub fn final_value(&self) -> &T {
        self.custom.as_ref().unwrap_or(&self.proposed)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl Transaction<BlockSnapshot> {
    /// Position of the mutated block.
    pub fn pos(&self) -> BlockPos {
        self.original.pos
    }

    /// Change kind inferred from the endpoint states.
    pub fn inferred_change(&self) -> BlockChange {
        BlockChange::infer(&self.original.state, &self.proposed.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_world::block::BlockState;

    fn snap(block: &str) -> BlockSnapshot {
        BlockSnapshot::new(BlockPos::new(0, 1, 0), BlockState::new(block))
    }

    #[test]
    fn new_transaction_is_valid_without_custom() {
        let tx = Transaction::new(snap("air"), snap("stone"));
        assert!(tx.is_valid());
        assert!(tx.custom().is_none());
        assert_eq!(tx.final_value(), &snap("stone"));
        assert_eq!(tx.inferred_change(), BlockChange::Place);
        assert_eq!(tx.pos(), BlockPos::new(0, 1, 0));
    }

    #[test]
    fn custom_overrides_final_value_only() {
        let mut tx = Transaction::new(snap("air"), snap("stone"));
        tx.set_custom(snap("glass"));
        assert_eq!(tx.final_value(), &snap("glass"));
        assert_eq!(tx.proposed(), &snap("stone"));
        tx.clear_custom();
        assert_eq!(tx.final_value(), &snap("stone"));
    }

    #[test]
    fn validity_toggles() {
        let mut tx = Transaction::new(1u8, 2u8);
        tx.invalidate();
        assert!(!tx.is_valid());
        tx.set_valid(true);
        assert!(tx.is_valid());
        assert_eq!(*tx.original(), 1);
    }
}
