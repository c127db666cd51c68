//! Entity drain: post a spawn event, materialize the survivors.

use causeway_journal::journal::{SpawnOutcome, SpawnRecord};
use causeway_world::entity::{EntityId, PendingEntity};
use causeway_world::identity::Attribution;
use tracing::{debug, trace};

use crate::cause::Cause;
use crate::error::TrackerError;
use crate::event::{Event, SpawnEntityEvent, SpawnKind};
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;

/// Post one [`SpawnEntityEvent`] for `entities` and spawn what survives.
///
/// A cancelled event spawns nothing. Entities a listener removed are
/// journaled as rejected. Survivors inherit `attribution` for any field they
/// do not already carry.
pub(crate) fn drain_spawns(
    tracker: &mut PhaseTracker,
    phase: PhaseState,
    attribution: Attribution,
    cause: &Cause,
    kind: SpawnKind,
    entities: Vec<PendingEntity>,
) -> Result<Vec<EntityId>, TrackerError> {
    if entities.is_empty() {
        return Ok(Vec::new());
    }
    let requested = entities.clone();
    let mut event = Event::SpawnEntity(SpawnEntityEvent::new(kind, cause.clone(), entities));
    let cancelled = tracker.post_event(&mut event)?;
    let mut survivors = match event {
        Event::SpawnEntity(event) if !cancelled => event.into_entities(),
        _ => Vec::new(),
    };

    let root_cause = cause.root_label();
    let tick = tracker.tick();

    let mut unmatched = survivors.clone();
    let mut rejected = 0u64;
    for pending in &requested {
        match unmatched.iter().position(|s| s == pending) {
            Some(found) => {
                unmatched.swap_remove(found);
            }
            None => {
                rejected += 1;
                tracker.record_spawn(SpawnRecord {
                    tick,
                    entity_type: pending.kind.type_name().to_owned(),
                    spawn_kind: kind.name().to_owned(),
                    pos: pending.pos,
                    outcome: SpawnOutcome::Rejected,
                    phase: phase.name().to_owned(),
                    root_cause: root_cause.clone(),
                });
            }
        }
    }

    let mut ids = Vec::with_capacity(survivors.len());
    for mut pending in survivors.drain(..) {
        pending.attribution = attribution.or(pending.attribution);
        let entity_type = pending.kind.type_name().to_owned();
        let pos = pending.pos;
        let id = tracker.world_mut().spawn_entity(pending);
        trace!(%phase, %id, entity = %entity_type, kind = kind.name(), "spawn captured entity");
        tracker.record_spawn(SpawnRecord {
            tick,
            entity_type,
            spawn_kind: kind.name().to_owned(),
            pos,
            outcome: SpawnOutcome::Spawned(id),
            phase: phase.name().to_owned(),
            root_cause: root_cause.clone(),
        });
        ids.push(id);
    }

    if cancelled || rejected > 0 {
        debug!(%phase, kind = kind.name(), requested = requested.len(), spawned = ids.len(), rejected, cancelled, "spawn event filtered");
    }
    let stats = tracker.stats_mut();
    stats.entities_spawned += ids.len() as u64;
    stats.spawns_rejected += rejected;
    Ok(ids)
}

/// Entities to split off into their own spawn event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Partition {
    pub(crate) matches: fn(&PendingEntity) -> bool,
    pub(crate) kind: SpawnKind,
}

/// Split `entities` by `partition` and drain each side under its own kind,
/// matched side first.
pub(crate) fn drain_partitioned(
    tracker: &mut PhaseTracker,
    phase: PhaseState,
    attribution: Attribution,
    cause: &Cause,
    entities: Vec<PendingEntity>,
    partition: Partition,
    rest_kind: SpawnKind,
) -> Result<Vec<EntityId>, TrackerError> {
    let (matched, rest): (Vec<_>, Vec<_>) =
        entities.into_iter().partition(|e| (partition.matches)(e));
    let mut ids = drain_spawns(tracker, phase, attribution, cause, partition.kind, matched)?;
    ids.extend(drain_spawns(tracker, phase, attribution, cause, rest_kind, rest)?);
    Ok(ids)
}
