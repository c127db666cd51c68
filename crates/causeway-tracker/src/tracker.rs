//! The phase tracker: stack, world, event bus, and journal under one owner.
//!
//! [`PhaseTracker`] is the only legal way to enter and leave tracked work.
//! Simulation code never touches capture buffers directly: it calls
//! [`set_block`](PhaseTracker::set_block),
//! [`spawn_entity`](PhaseTracker::spawn_entity),
//! [`drop_item_at`](PhaseTracker::drop_item_at) and
//! [`drop_item_from`](PhaseTracker::drop_item_from), and the tracker decides
//! from the active state's policy whether the mutation is buffered, applied
//! now, or rejected.
//!
//! The tracker is single-threaded. Listeners receive `&mut PhaseTracker` and
//! may re-enter it recursively; nothing else shares it.

use std::collections::VecDeque;
use std::rc::Rc;

use causeway_journal::journal::{CauseJournal, SpawnOutcome, SpawnRecord};
use causeway_world::block::{BlockFlags, BlockSnapshot, BlockState};
use causeway_world::entity::{EntityId, ItemStack, PendingEntity};
use causeway_world::identity::Attribution;
use causeway_world::position::BlockPos;
use causeway_world::world::BlockWorld;
use tracing::{error, trace, warn};

use crate::cause::{Cause, CauseBuilder, CauseKey, CauseKind, PHASE};
use crate::config::TrackerConfig;
use crate::context::{CompletedPhase, ItemDrop, PhaseContext};
use crate::diagnostics::{StackDiagnostics, TrackerStats};
use crate::error::{EnrichmentError, TrackerError};
use crate::event::{CauseEnricher, Event, EventBus, EventOrder, ListenerId, SpawnKind};
use crate::policy::Policy;
use crate::stack::{Frame, PhaseStack};
use crate::state::PhaseState;
use crate::transaction::Transaction;

/// What the tracker did with a spawn or drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnDisposition {
    /// Buffered in the active context until it unwinds.
    Captured,
    /// Materialized immediately.
    Spawned(EntityId),
    /// Refused by the active state's policy.
    Rejected,
}

/// Owner of the phase stack and everything the pipeline touches.
pub struct PhaseTracker {
    stack: PhaseStack,
    world: BlockWorld,
    bus: EventBus,
    enrichers: Vec<(String, CauseEnricher)>,
    journal: CauseJournal,
    config: TrackerConfig,
    tick: u64,
    stats: TrackerStats,
}

impl PhaseTracker {
    /// Create a tracker owning `world`, with an empty stack, no listeners,
    /// and an empty journal.
    pub fn new(world: BlockWorld, config: TrackerConfig) -> Self {
        Self {
            stack: PhaseStack::new(),
            world,
            bus: EventBus::new(),
            enrichers: Vec::new(),
            journal: CauseJournal::new(),
            config,
            tick: 0,
            stats: TrackerStats::default(),
        }
    }

    // -- stack --------------------------------------------------------------

    /// Push a completed phase.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::IncompatiblePush`] if the current state does not
    ///   allow switching to the requested one. Nothing is modified.
    /// - [`TrackerError::StackOverflow`] past `max_stack_depth`.
    pub fn push(&mut self, phase: CompletedPhase) -> Result<(), TrackerError> {
        let requested = phase.state();
        let current = self.stack.current_state();
        if !current.can_switch_to(requested) {
            let stack = self.stack.diagnostics();
            error!(%current, %requested, %stack, "incompatible phase push");
            return Err(TrackerError::IncompatiblePush {
                current,
                requested,
                stack,
            });
        }
        self.push_context(phase.into_context())
    }

    fn push_context(&mut self, context: PhaseContext) -> Result<(), TrackerError> {
        let requested = context.state();
        if self.stack.depth() >= self.config.max_stack_depth {
            let stack = self.stack.diagnostics();
            error!(%requested, max_depth = self.config.max_stack_depth, %stack, "phase stack overflow");
            return Err(TrackerError::StackOverflow {
                requested,
                max_depth: self.config.max_stack_depth,
                stack,
            });
        }
        trace!(phase = %requested, depth = self.stack.depth() + 1, "push");
        self.stack.push(context);
        Ok(())
    }

    /// Push a frame the tracker opens for its own bookkeeping (post-unwind,
    /// rollback restoration). These frames only exist while a frame already
    /// counted against `max_stack_depth` is being drained, so they skip both
    /// the transition and the depth check.
    pub(crate) fn push_internal(&mut self, context: PhaseContext) {
        trace!(phase = %context.state(), depth = self.stack.depth() + 1, "push internal");
        self.stack.push(context);
    }

    /// Pop the top frame and drain its captures.
    ///
    /// When the state tracks post-unwind work, a post-unwind frame sits on
    /// the stack while the unwind runs and is itself popped and drained
    /// afterwards.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::PopOnEmptyStack`].
    /// - [`TrackerError::MissingCause`] if a required slot is absent. The
    ///   frame stays on the stack.
    /// - [`TrackerError::LeftoverCaptures`] if a buffer survived the unwind.
    /// - Any error from the unwind itself. Provisional writes still buffered
    ///   in the frame are restored before it is returned.
    pub fn pop_and_unwind(&mut self) -> Result<(), TrackerError> {
        let Some(top) = self.stack.current_context() else {
            error!("pop_and_unwind on empty phase stack");
            return Err(TrackerError::PopOnEmptyStack);
        };
        let state = top.state();
        self.require_causes(state, top)?;

        let Some(Frame { state, mut context }) = self.stack.pop() else {
            return Err(TrackerError::PopOnEmptyStack);
        };
        trace!(phase = %state, depth = self.stack.depth(), "pop");

        if !context.has_captures() {
            self.stats.phases_unwound += 1;
            return Ok(());
        }

        let tracks_post = state.tracks_post_unwind();
        if tracks_post {
            self.push_internal(PhaseContext::post_unwind(state, &context));
        }
        let post_depth = self.stack.depth();

        let unwound = (state.unwind_fn())(self, state, &mut context);

        let post_unwound = if tracks_post {
            if self.stack.depth() != post_depth
                || self.stack.current_state() != PhaseState::PostUnwind
            {
                let stack = self.stack.diagnostics();
                error!(phase = %state, %stack, "post-unwind frame displaced during unwind");
                Err(TrackerError::UnbalancedListener {
                    event: "unwind",
                    expected: post_depth,
                    actual: self.stack.depth(),
                    stack,
                })
            } else {
                self.pop_and_unwind()
            }
        } else {
            Ok(())
        };
        if unwound.is_err() || post_unwound.is_err() {
            self.restore_provisional(&mut context);
        }
        unwound?;
        post_unwound?;

        if context.has_captures() {
            let remaining = context.counts();
            let stack = self.stack.diagnostics();
            error!(phase = %state, %remaining, %stack, "leftover captures after unwind");
            return Err(TrackerError::LeftoverCaptures {
                phase: state,
                remaining,
                stack,
            });
        }
        self.stats.phases_unwound += 1;
        Ok(())
    }

    /// Push `phase`, run `body` inside it, then pop and unwind.
    ///
    /// If `body` or the unwind fails, every frame above the starting depth
    /// is still popped; the first error is returned and cleanup failures are
    /// logged.
    pub fn run_in<R>(
        &mut self,
        phase: CompletedPhase,
        body: impl FnOnce(&mut PhaseTracker) -> Result<R, TrackerError>,
    ) -> Result<R, TrackerError> {
        let depth = self.stack.depth();
        self.push(phase)?;
        let outcome = body(self).and_then(|value| self.pop_and_unwind().map(|()| value));
        if outcome.is_err() {
            self.unwind_to(depth);
        }
        outcome
    }

    /// Pop frames until the stack is `depth` deep.
    fn unwind_to(&mut self, depth: usize) {
        while self.stack.depth() > depth {
            let before = self.stack.depth();
            if let Err(cleanup) = self.pop_and_unwind() {
                error!(error = %cleanup, "unwind during cleanup failed");
            }
            if self.stack.depth() == before {
                self.discard_top();
            }
        }
    }

    /// Drop the top frame unprocessed, restoring its provisional writes.
    fn discard_top(&mut self) {
        let Some(Frame { state, mut context }) = self.stack.pop() else {
            return;
        };
        let dropped = context.counts();
        self.restore_provisional(&mut context);
        warn!(phase = %state, %dropped, "discarding frame that could not unwind");
    }

    /// Undo the provisional writes still buffered in `context`, newest first.
    fn restore_provisional(&mut self, context: &mut PhaseContext) {
        for entry in context.take_blocks().iter().rev() {
            self.world.restore(entry.transaction.original());
        }
    }

    /// Check the stack is empty at a step boundary.
    ///
    /// # Errors
    ///
    /// [`TrackerError::StackNotEmpty`] with every frame's diagnostics.
    pub fn ensure_empty(&self) -> Result<(), TrackerError> {
        if self.stack.is_empty() {
            return Ok(());
        }
        let stack = self.stack.diagnostics();
        error!(%stack, "phase stack not empty at step boundary");
        Err(TrackerError::StackNotEmpty { stack })
    }

    /// State of the top frame, or [`PhaseState::Idle`] when the stack is
    /// empty.
    pub fn current_state(&self) -> PhaseState {
        self.stack.current_state()
    }

    /// Context of the top frame.
    pub fn current_context(&self) -> Option<&PhaseContext> {
        self.stack.current_context()
    }

    /// Resolved policy of the active state.
    pub fn current_policy(&self) -> Policy {
        self.stack.current_state().policy()
    }

    /// Whether a block write made now would be buffered instead of applied.
    pub fn requires_block_capturing(&self) -> bool {
        self.current_policy().captures_blocks
    }

    /// Whether the active state lets entities spawn at all.
    pub fn allows_entity_spawns(&self) -> bool {
        self.current_policy().allows_entity_spawns
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// Read-only view of the stack.
    pub fn stack(&self) -> &PhaseStack {
        &self.stack
    }

    /// Summary of every frame, bottom first, as carried by integration
    /// errors.
    pub fn diagnostics(&self) -> StackDiagnostics {
        self.stack.diagnostics()
    }

    fn current_attribution(&self) -> Attribution {
        self.stack
            .current_context()
            .map(PhaseContext::attribution)
            .unwrap_or_default()
    }

    // -- simulation API -----------------------------------------------------

    /// Write a block.
    ///
    /// Under a capturing state the write becomes a transaction in the top
    /// context and the proposed state is written provisionally, without
    /// notifications. Otherwise it is applied now, and neighbor reactions
    /// cascade immediately unless the state ignores block physics.
    ///
    /// Writing the state already present is a no-op.
    ///
    /// # Errors
    ///
    /// [`TrackerError::CascadeLimitExceeded`] if an immediate cascade runs
    /// past `max_cascade_updates`.
    pub fn set_block(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        flags: BlockFlags,
    ) -> Result<(), TrackerError> {
        let original = self.world.snapshot(pos);
        if original.state == state {
            return Ok(());
        }
        let phase = self.stack.current_state();
        if phase.requires_block_capturing() {
            if let Some(ctx) = self.stack.current_context_mut() {
                trace!(%phase, %pos, from = %original.state, to = %state, "capture block");
                let proposed = original.with_state(state.clone());
                ctx.capture_block(Transaction::new(original, proposed), flags);
                self.world.set_raw(pos, state);
                return Ok(());
            }
        }
        self.apply_direct(BlockSnapshot::new(pos, state), flags)
    }

    fn apply_direct(&mut self, snapshot: BlockSnapshot, flags: BlockFlags) -> Result<(), TrackerError> {
        let phase = self.stack.current_state();
        let flags = if phase.ignores_block_physics() {
            flags.without_physics()
        } else {
            flags
        };
        let attribution = self.current_attribution();
        let limit = self.config.max_cascade_updates;

        let mut queue: VecDeque<(BlockSnapshot, Vec<ItemStack>)> = VecDeque::new();
        queue.push_back((snapshot, Vec::new()));
        let mut updates = 0usize;
        while let Some((snap, drops)) = queue.pop_front() {
            updates += 1;
            if updates > limit {
                let stack = self.stack.diagnostics();
                error!(%phase, limit, %stack, "direct block cascade did not settle");
                return Err(TrackerError::CascadeLimitExceeded { phase, limit, stack });
            }
            trace!(%phase, at = %snap, "apply block");
            let reactions = self.world.apply(&snap, flags);
            if flags.track_ownership {
                self.world.stamp_ownership(snap.pos, attribution);
            }
            for stack in drops {
                self.drop_item_at(snap.pos, stack);
            }
            for (npos, reaction) in reactions {
                queue.push_back((BlockSnapshot::new(npos, reaction.state), reaction.drops));
            }
        }
        Ok(())
    }

    /// Request an entity spawn.
    pub fn spawn_entity(&mut self, pending: PendingEntity) -> SpawnDisposition {
        let phase = self.stack.current_state();
        if !phase.allows_entity_spawns() {
            return self.reject_spawn(phase, SpawnKind::Spawn, pending);
        }
        if phase.captures_entities() {
            if let Some(ctx) = self.stack.current_context_mut() {
                trace!(%phase, entity = pending.kind.type_name(), pos = %pending.pos, "capture entity");
                ctx.capture_entity(pending);
                return SpawnDisposition::Captured;
            }
        }
        self.spawn_now(SpawnKind::Spawn, pending)
    }

    /// Drop an item produced by the block at `pos`.
    pub fn drop_item_at(&mut self, pos: BlockPos, stack: ItemStack) -> SpawnDisposition {
        let phase = self.stack.current_state();
        if !phase.allows_entity_spawns() {
            return self.reject_spawn(phase, SpawnKind::DropItem, PendingEntity::item(stack, pos));
        }
        if let Some(ctx) = self.stack.current_context_mut() {
            if phase.tracks_block_specific_drops() {
                trace!(%phase, %pos, item = %stack, "capture block drop");
                ctx.capture_block_drop(pos, stack);
                return SpawnDisposition::Captured;
            }
            if phase.captures_entities() {
                trace!(%phase, %pos, item = %stack, "capture item");
                ctx.capture_item(ItemDrop::new(stack, pos));
                return SpawnDisposition::Captured;
            }
        }
        self.spawn_now(SpawnKind::DropItem, PendingEntity::item(stack, pos))
    }

    /// Drop an item produced by the entity `owner`, landing at `pos`.
    pub fn drop_item_from(&mut self, owner: EntityId, stack: ItemStack, pos: BlockPos) -> SpawnDisposition {
        let phase = self.stack.current_state();
        if !phase.allows_entity_spawns() {
            return self.reject_spawn(phase, SpawnKind::DropItem, PendingEntity::item(stack, pos));
        }
        if let Some(ctx) = self.stack.current_context_mut() {
            if phase.tracks_entity_drops() {
                trace!(%phase, %owner, item = %stack, "capture entity drop");
                ctx.capture_entity_drop(owner, ItemDrop::new(stack, pos));
                return SpawnDisposition::Captured;
            }
            if phase.captures_entities() {
                ctx.capture_item(ItemDrop::new(stack, pos));
                return SpawnDisposition::Captured;
            }
        }
        self.spawn_now(SpawnKind::DropItem, PendingEntity::item(stack, pos))
    }

    fn spawn_now(&mut self, kind: SpawnKind, mut pending: PendingEntity) -> SpawnDisposition {
        let phase = self.stack.current_state();
        pending.attribution = self.current_attribution().or(pending.attribution);
        let entity_type = pending.kind.type_name().to_owned();
        let pos = pending.pos;
        let id = self.world.spawn_entity(pending);
        trace!(%phase, %id, entity = %entity_type, "spawn entity");
        self.stats.entities_spawned += 1;
        let root_cause = self.current_root_label();
        self.record_spawn(SpawnRecord {
            tick: self.tick,
            entity_type,
            spawn_kind: kind.name().to_owned(),
            pos,
            outcome: SpawnOutcome::Spawned(id),
            phase: phase.name().to_owned(),
            root_cause,
        });
        SpawnDisposition::Spawned(id)
    }

    fn reject_spawn(&mut self, phase: PhaseState, kind: SpawnKind, pending: PendingEntity) -> SpawnDisposition {
        warn!(%phase, entity = pending.kind.type_name(), pos = %pending.pos, "spawn rejected: phase disallows entity spawns");
        self.stats.spawns_rejected += 1;
        let root_cause = self.current_root_label();
        self.record_spawn(SpawnRecord {
            tick: self.tick,
            entity_type: pending.kind.type_name().to_owned(),
            spawn_kind: kind.name().to_owned(),
            pos: pending.pos,
            outcome: SpawnOutcome::Rejected,
            phase: phase.name().to_owned(),
            root_cause,
        });
        SpawnDisposition::Rejected
    }

    fn current_root_label(&self) -> String {
        self.stack
            .current_context()
            .and_then(|ctx| ctx.causes().first())
            .map(|c| c.value.to_string())
            .unwrap_or_else(|| "none".to_owned())
    }

    // -- events -------------------------------------------------------------

    /// Register `listener` for every event.
    ///
    /// Listeners run by `order`, then in registration order. They receive
    /// the tracker and may push and pop phases, but must leave the stack at
    /// the depth they found it.
    pub fn register_listener(
        &mut self,
        name: &str,
        order: EventOrder,
        listener: impl Fn(&mut Event, &mut PhaseTracker) + 'static,
    ) -> ListenerId {
        self.bus.register(name, order, Rc::new(listener))
    }

    /// Remove a listener. Returns `false` if `id` was not registered.
    ///
    /// An event already being posted still reaches it.
    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.bus.unregister(id)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.bus.len()
    }

    /// Register a cause enricher. Enrichers run in registration order each
    /// time a cause chain is built; a failing one is logged and skipped.
    pub fn register_enricher(
        &mut self,
        name: &str,
        enricher: impl Fn(PhaseState, &PhaseContext, &mut CauseBuilder) -> Result<(), EnrichmentError>
            + 'static,
    ) {
        self.enrichers.push((name.to_owned(), Rc::new(enricher)));
    }

    /// Post `event` to every listener, synchronously. Returns whether the
    /// event ended up cancelled.
    ///
    /// # Errors
    ///
    /// [`TrackerError::UnbalancedListener`] if depth verification is on and
    /// a listener left the stack at a different depth.
    pub fn post_event(&mut self, event: &mut Event) -> Result<bool, TrackerError> {
        let listeners = self.bus.snapshot();
        let depth = self.stack.depth();
        trace!(event = event.name(), listeners = listeners.len(), "post");
        for listener in listeners {
            listener(event, self);
        }
        self.stats.events_posted += 1;
        if self.config.verify_listener_depth && self.stack.depth() != depth {
            let stack = self.stack.diagnostics();
            error!(event = event.name(), expected = depth, actual = self.stack.depth(), %stack, "unbalanced listener");
            return Err(TrackerError::UnbalancedListener {
                event: event.name(),
                expected: depth,
                actual: self.stack.depth(),
                stack,
            });
        }
        Ok(event.is_cancelled())
    }

    /// Build the cause chain for events of `ctx`: the `root` slot first (if
    /// present), the remaining slots in insertion order, the phase, then
    /// whatever enrichers add.
    pub(crate) fn build_cause(&self, state: PhaseState, ctx: &PhaseContext, root: Option<CauseKey>) -> Cause {
        let mut builder = CauseBuilder::new();
        if let Some(key) = root {
            if let Some(value) = ctx.cause(key) {
                builder.named(key, value.clone());
            }
        }
        for entry in ctx.causes() {
            if Some(entry.name) != root {
                builder.named(entry.name, entry.value.clone());
            }
        }
        builder.named(PHASE, ctx.state());
        self.enrich_cause(state, ctx, &mut builder);
        builder.build()
    }

    /// Run every registered enricher over `builder`.
    ///
    /// This is the one place enrichment errors are swallowed: a failing
    /// enricher is logged, its partial entries are dropped, and the chain is
    /// built without them.
    pub fn enrich_cause(&self, state: PhaseState, ctx: &PhaseContext, builder: &mut CauseBuilder) {
        for (name, enricher) in &self.enrichers {
            let mark = builder.len();
            if let Err(err) = enricher(state, ctx, builder) {
                builder.truncate(mark);
                warn!(enricher = %name, phase = %state, error = %err, "cause enrichment failed; continuing without it");
            }
        }
    }

    /// Fail if `ctx` lacks a slot `state` requires.
    pub(crate) fn require_causes(&self, state: PhaseState, ctx: &PhaseContext) -> Result<(), TrackerError> {
        for required in state.required_causes() {
            let present = ctx
                .cause(required.key)
                .is_some_and(|value| value.kind() == required.kind);
            if !present {
                return Err(self.missing_cause(state, required.key, required.kind));
            }
        }
        Ok(())
    }

    pub(crate) fn missing_cause(&self, phase: PhaseState, key: CauseKey, expected: CauseKind) -> TrackerError {
        let stack = self.stack.diagnostics();
        error!(%phase, %key, %expected, %stack, "missing required cause slot");
        TrackerError::MissingCause {
            phase,
            key,
            expected,
            stack,
        }
    }

    // -- journal and stats --------------------------------------------------

    pub(crate) fn record_block(&mut self, record: causeway_journal::journal::BlockRecord) {
        if self.config.journal_enabled {
            self.journal.record_block(record);
        }
    }

    pub(crate) fn record_spawn(&mut self, record: SpawnRecord) {
        if self.config.journal_enabled {
            self.journal.record_spawn(record);
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TrackerStats {
        &mut self.stats
    }

    /// Counters accumulated since the last [`take_stats`](Self::take_stats).
    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Return the counters and reset them.
    pub fn take_stats(&mut self) -> TrackerStats {
        std::mem::take(&mut self.stats)
    }

    /// Advance the step counter and clear the journal.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick += 1;
        self.journal.clear();
        self.tick
    }

    /// Current step number, as stamped onto journal records.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // -- accessors ----------------------------------------------------------

    /// The world, including provisional writes of frames still on the stack.
    pub fn world(&self) -> &BlockWorld {
        &self.world
    }

    /// Direct world access, bypassing capture. For setup and tests.
    pub fn world_mut(&mut self) -> &mut BlockWorld {
        &mut self.world
    }

    /// Records of the current step.
    pub fn journal(&self) -> &CauseJournal {
        &self.journal
    }

    /// The configuration the tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl std::fmt::Debug for PhaseTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseTracker")
            .field("stack", &self.stack.states())
            .field("listeners", &self.bus)
            .field("enrichers", &self.enrichers.len())
            .field("tick", &self.tick)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
