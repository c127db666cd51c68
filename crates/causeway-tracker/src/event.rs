//! Events posted by unwinds, and the synchronous listener bus.
//!
//! Two event families exist:
//!
//! - [`ChangeBlockEvent`]: one per [`BlockChange`] kind present in a pipeline
//!   pass, plus one aggregate [`ChangeBlockKind::Post`] event carrying every
//!   transaction of the pass.
//! - [`SpawnEntityEvent`]: one per spawn partition (plain spawns, item drops,
//!   experience, population).
//!
//! Listeners run synchronously, ordered by [`EventOrder`] and then by
//! registration. A listener receives the tracker itself and may push and pop
//! phases while it runs, as long as it leaves the stack as deep as it found
//! it.

use std::fmt;
use std::rc::Rc;

use causeway_world::block::BlockChange;
use causeway_world::entity::PendingEntity;

use crate::cause::{Cause, CauseBuilder};
use crate::context::PhaseContext;
use crate::error::EnrichmentError;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;
use crate::transaction::BlockTransaction;

// ---------------------------------------------------------------------------
// ChangeBlockEvent
// ---------------------------------------------------------------------------

/// Which bucket a block event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeBlockKind {
    Change(BlockChange),
    /// Every transaction of the pass.
    Post,
}

impl fmt::Display for ChangeBlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeBlockKind::Change(change) => write!(f, "change_block.{change}"),
            ChangeBlockKind::Post => f.write_str("change_block.post"),
        }
    }
}

/// A batch of block transactions offered to listeners.
///
/// Listeners may invalidate individual transactions, set custom replacement
/// states, or cancel the whole event. The transaction list has no add or
/// remove API; if a listener swaps in an event whose list has a different
/// length, its edits are ignored with a warning and only cancellation is
/// honored.
#[derive(Debug, Clone)]
pub struct ChangeBlockEvent {
    kind: ChangeBlockKind,
    cause: Cause,
    transactions: Vec<BlockTransaction>,
    cancelled: bool,
}

impl ChangeBlockEvent {
    pub fn new(kind: ChangeBlockKind, cause: Cause, transactions: Vec<BlockTransaction>) -> Self {
        Self {
            kind,
            cause,
            transactions,
            cancelled: false,
        }
    }

    pub fn kind(&self) -> ChangeBlockKind {
        self.kind
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn transactions(&self) -> &[BlockTransaction] {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut [BlockTransaction] {
        &mut self.transactions
    }

    /// Invalidate every transaction for which `keep` returns false.
    pub fn filter(&mut self, mut keep: impl FnMut(&BlockTransaction) -> bool) {
        for tx in &mut self.transactions {
            if !keep(tx) {
                tx.invalidate();
            }
        }
    }

    pub(crate) fn into_transactions(self) -> Vec<BlockTransaction> {
        self.transactions
    }
}

// ---------------------------------------------------------------------------
// SpawnEntityEvent
// ---------------------------------------------------------------------------

/// Why entities are being spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpawnKind {
    Spawn,
    DropItem,
    Experience,
    Populate,
}

impl SpawnKind {
    pub fn name(self) -> &'static str {
        match self {
            SpawnKind::Spawn => "spawn",
            SpawnKind::DropItem => "drop_item",
            SpawnKind::Experience => "experience",
            SpawnKind::Populate => "populate",
        }
    }
}

impl fmt::Display for SpawnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pending entities offered to listeners before they exist.
///
/// Listeners may remove entries, edit them, or cancel the event.
#[derive(Debug, Clone)]
pub struct SpawnEntityEvent {
    kind: SpawnKind,
    cause: Cause,
    entities: Vec<PendingEntity>,
    cancelled: bool,
}

impl SpawnEntityEvent {
    pub fn new(kind: SpawnKind, cause: Cause, entities: Vec<PendingEntity>) -> Self {
        Self {
            kind,
            cause,
            entities,
            cancelled: false,
        }
    }

    pub fn kind(&self) -> SpawnKind {
        self.kind
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    pub fn entities(&self) -> &[PendingEntity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut Vec<PendingEntity> {
        &mut self.entities
    }

    /// Remove every entity for which `keep` returns false.
    pub fn filter_entities(&mut self, keep: impl FnMut(&PendingEntity) -> bool) {
        self.entities.retain(keep);
    }

    pub(crate) fn into_entities(self) -> Vec<PendingEntity> {
        self.entities
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Anything posted on the bus.
#[derive(Debug, Clone)]
pub enum Event {
    ChangeBlock(ChangeBlockEvent),
    SpawnEntity(SpawnEntityEvent),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ChangeBlock(e) => match e.kind {
                ChangeBlockKind::Change(BlockChange::Place) => "change_block.place",
                ChangeBlockKind::Change(BlockChange::Break) => "change_block.break",
                ChangeBlockKind::Change(BlockChange::Modify) => "change_block.modify",
                ChangeBlockKind::Change(BlockChange::Decay) => "change_block.decay",
                ChangeBlockKind::Post => "change_block.post",
            },
            Event::SpawnEntity(e) => match e.kind {
                SpawnKind::Spawn => "spawn_entity.spawn",
                SpawnKind::DropItem => "spawn_entity.drop_item",
                SpawnKind::Experience => "spawn_entity.experience",
                SpawnKind::Populate => "spawn_entity.populate",
            },
        }
    }

    pub fn cause(&self) -> &Cause {
        match self {
            Event::ChangeBlock(e) => &e.cause,
            Event::SpawnEntity(e) => &e.cause,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            Event::ChangeBlock(e) => e.cancelled,
            Event::SpawnEntity(e) => e.cancelled,
        }
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        match self {
            Event::ChangeBlock(e) => e.cancelled = cancelled,
            Event::SpawnEntity(e) => e.cancelled = cancelled,
        }
    }

    pub fn as_change_block(&self) -> Option<&ChangeBlockEvent> {
        match self {
            Event::ChangeBlock(e) => Some(e),
            Event::SpawnEntity(_) => None,
        }
    }

    pub fn as_change_block_mut(&mut self) -> Option<&mut ChangeBlockEvent> {
        match self {
            Event::ChangeBlock(e) => Some(e),
            Event::SpawnEntity(_) => None,
        }
    }

    pub fn as_spawn_entity(&self) -> Option<&SpawnEntityEvent> {
        match self {
            Event::SpawnEntity(e) => Some(e),
            Event::ChangeBlock(_) => None,
        }
    }

    pub fn as_spawn_entity_mut(&mut self) -> Option<&mut SpawnEntityEvent> {
        match self {
            Event::SpawnEntity(e) => Some(e),
            Event::ChangeBlock(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Listeners and enrichers
// ---------------------------------------------------------------------------

/// Listener priority. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum EventOrder {
    Pre,
    Early,
    #[default]
    Default,
    Late,
    Last,
}

pub type Listener = Rc<dyn Fn(&mut Event, &mut PhaseTracker)>;

/// Adds entries to the cause chain built for a state's events. Failures are
/// logged and the partial entries discarded.
pub type CauseEnricher =
    Rc<dyn Fn(PhaseState, &PhaseContext, &mut CauseBuilder) -> Result<(), EnrichmentError>>;

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct RegisteredListener {
    id: ListenerId,
    name: String,
    order: EventOrder,
    func: Listener,
}

/// Ordered listener registry.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<RegisteredListener>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners with equal order run in registration
    /// order.
    pub fn register(&mut self, name: &str, order: EventOrder, func: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        // Stable position: after every listener with order <= this one.
        let at = self
            .listeners
            .iter()
            .position(|l| l.order > order)
            .unwrap_or(self.listeners.len());
        self.listeners.insert(
            at,
            RegisteredListener {
                id,
                name: name.to_owned(),
                order,
                func,
            },
        );
        id
    }

    /// Returns whether a listener was removed.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Listeners in invocation order, cloned so posting can hand the tracker
    /// to each of them.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|l| Rc::clone(&l.func)).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use causeway_world::block::{BlockSnapshot, BlockState};
    use causeway_world::position::BlockPos;

    fn noop() -> Listener {
        Rc::new(|_, _| {})
    }

    #[test]
    fn listeners_sorted_by_order_then_registration() {
        let mut bus = EventBus::new();
        bus.register("late", EventOrder::Late, noop());
        bus.register("default_a", EventOrder::Default, noop());
        bus.register("pre", EventOrder::Pre, noop());
        bus.register("default_b", EventOrder::Default, noop());
        bus.register("last", EventOrder::Last, noop());
        assert_eq!(bus.names(), vec!["pre", "default_a", "default_b", "late", "last"]);
    }

    #[test]
    fn unregister_removes_only_target() {
        let mut bus = EventBus::new();
        let a = bus.register("a", EventOrder::Default, noop());
        bus.register("b", EventOrder::Default, noop());
        assert!(bus.unregister(a));
        assert!(!bus.unregister(a));
        assert_eq!(bus.names(), vec!["b"]);
    }

    #[test]
    fn filter_invalidates_rejected_transactions() {
        let tx = |x: i32| {
            let pos = BlockPos::new(x, 0, 0);
            Transaction::new(
                BlockSnapshot::new(pos, BlockState::air()),
                BlockSnapshot::new(pos, BlockState::new("stone")),
            )
        };
        let mut event = ChangeBlockEvent::new(
            ChangeBlockKind::Change(BlockChange::Place),
            Cause::default(),
            vec![tx(0), tx(1), tx(2)],
        );
        event.filter(|t| t.pos().x != 1);
        let valid: Vec<bool> = event.transactions().iter().map(|t| t.is_valid()).collect();
        assert_eq!(valid, vec![true, false, true]);
    }

    #[test]
    fn event_cancel_and_names() {
        let mut event = Event::SpawnEntity(SpawnEntityEvent::new(
            SpawnKind::Experience,
            Cause::default(),
            vec![PendingEntity::experience(3, BlockPos::ORIGIN)],
        ));
        assert_eq!(event.name(), "spawn_entity.experience");
        assert!(!event.is_cancelled());
        event.set_cancelled(true);
        assert!(event.is_cancelled());
        assert!(event.as_change_block().is_none());
        assert_eq!(ChangeBlockKind::Post.to_string(), "change_block.post");
    }
}
