//! Fixed-timestep tick loop driving a [`PhaseTracker`].
//!
//! Each tick:
//!
//! 1. The tracker's step counter advances and the cause journal is cleared.
//! 2. All registered systems run in declaration order. Each system enters
//!    and leaves its own phases through the tracker.
//! 3. Plugin-scheduled tasks queued before the tick run, each inside its
//!    own `ScheduledTask` phase.
//! 4. The phase stack must be empty. Anything left on it is an integration
//!    error.
//!
//! # Example
//!
//! ```
//! use causeway_tracker::prelude::*;
//! use causeway_world::prelude::*;
//!
//! let tracker = PhaseTracker::new(BlockWorld::new(), TrackerConfig::default());
//! let mut tick_loop = TickLoop::new(tracker, TickConfig::default());
//!
//! tick_loop.add_system("noop", |_tracker| Ok(()));
//! tick_loop.run_ticks(10)?;
//!
//! assert_eq!(tick_loop.tick_count(), 10);
//! # Ok::<(), TrackerError>(())
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{bail, Context as _};
use causeway_world::identity::PluginId;
use causeway_world::snapshot::WorldSnapshot;
use causeway_world::WorldError;
use tracing::{debug, info};

use crate::cause::{PLUGIN, TASK};
use crate::context::PhaseContext;
use crate::error::TrackerError;
use crate::state::PhaseState;
use crate::tracker::PhaseTracker;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Headless mode: no rendering, tick as fast as possible.
    pub headless: bool,
}

impl Default for TickConfig {
    /// Defaults to 20 Hz, headless.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 20.0,
            headless: true,
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and pipeline counters for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system (in order of execution).
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick.
    pub total_time: Duration,
    pub pipeline_passes: u64,
    pub applied: u64,
    pub rolled_back: u64,
    pub scheduled_tasks_run: usize,
}

// ---------------------------------------------------------------------------
// Systems and tasks
// ---------------------------------------------------------------------------

/// A system run once per tick. It enters whatever phases its work needs.
pub type SystemFn = fn(&mut PhaseTracker) -> Result<(), TrackerError>;

#[derive(Debug)]
struct RegisteredSystem {
    name: String,
    func: SystemFn,
    /// Names of systems that must execute before this one.
    after: Vec<String>,
}

/// One-shot work queued by a plugin for the next tick.
struct ScheduledTask {
    plugin: PluginId,
    name: String,
    run: Box<dyn FnOnce(&mut PhaseTracker) -> Result<(), TrackerError>>,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// The deterministic fixed-timestep tick loop.
///
/// Given the same initial world, the same systems in the same order, and the
/// same scheduled tasks, two loops produce identical state hashes.
pub struct TickLoop {
    tracker: PhaseTracker,
    systems: Vec<RegisteredSystem>,
    scheduled: VecDeque<ScheduledTask>,
    fixed_dt: f64,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    /// # Panics
    ///
    /// If `config.fixed_dt` is not positive and finite.
    pub fn new(tracker: PhaseTracker, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            tracker,
            systems: Vec::new(),
            scheduled: VecDeque::new(),
            fixed_dt: config.fixed_dt,
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a system to be run each tick, after those already registered.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, name: &str, func: SystemFn) {
        self.add_system_after(name, &[], func);
    }

    /// Register a system with explicit execution dependencies.
    ///
    /// # Panics
    ///
    /// - If any system in `after` is not already registered.
    /// - If a system with this name already exists.
    /// - If adding this system would create a dependency cycle.
    pub fn add_system_after(&mut self, name: &str, after: &[&str], func: SystemFn) {
        for dep in after {
            assert!(
                self.systems.iter().any(|s| s.name == *dep),
                "system '{name}' declares dependency on '{dep}', but '{dep}' is not registered"
            );
        }
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );
        self.systems.push(RegisteredSystem {
            name: name.to_owned(),
            func,
            after: after.iter().map(|s| s.to_string()).collect(),
        });
        self.validate_system_order();
    }

    /// Depth-first search for back edges in the `after` graph.
    fn validate_system_order(&self) {
        let mut visited = vec![false; self.systems.len()];
        let mut in_stack = vec![false; self.systems.len()];

        fn dfs(
            systems: &[RegisteredSystem],
            idx: usize,
            visited: &mut [bool],
            in_stack: &mut [bool],
        ) -> bool {
            if in_stack[idx] {
                return false;
            }
            if visited[idx] {
                return true;
            }
            visited[idx] = true;
            in_stack[idx] = true;
            for dep_name in &systems[idx].after {
                if let Some(dep_idx) = systems.iter().position(|s| s.name == *dep_name) {
                    if !dfs(systems, dep_idx, visited, in_stack) {
                        return false;
                    }
                }
            }
            in_stack[idx] = false;
            true
        }

        for i in 0..self.systems.len() {
            assert!(
                dfs(&self.systems, i, &mut visited, &mut in_stack),
                "cycle detected in system dependencies"
            );
        }
    }

    /// Queue `task` to run during the next tick, inside a `ScheduledTask`
    /// phase attributed to `plugin`.
    pub fn schedule(
        &mut self,
        plugin: PluginId,
        name: &str,
        task: impl FnOnce(&mut PhaseTracker) -> Result<(), TrackerError> + 'static,
    ) {
        self.scheduled.push_back(ScheduledTask {
            plugin,
            name: name.to_owned(),
            run: Box::new(task),
        });
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduled.len()
    }

    /// Execute one tick.
    ///
    /// # Errors
    ///
    /// The first integration error raised by a system or task, or
    /// [`TrackerError::StackNotEmpty`] if the step ended with frames on the
    /// stack. Tasks not yet run when an error occurs stay queued.
    pub fn tick(&mut self) -> Result<(), TrackerError> {
        let tick_start = Instant::now();
        let tick = self.tracker.begin_tick();
        self.tracker.take_stats();
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &self.systems {
            let sys_start = Instant::now();
            (system.func)(&mut self.tracker)?;
            system_times.push((system.name.clone(), sys_start.elapsed()));
        }

        let mut scheduled_tasks_run = 0;
        let due = self.scheduled.len();
        for _ in 0..due {
            let Some(task) = self.scheduled.pop_front() else {
                break;
            };
            let phase = PhaseContext::new(PhaseState::ScheduledTask)
                .with_cause(PLUGIN, task.plugin)
                .with_cause(TASK, task.name)
                .complete();
            self.tracker.run_in(phase, task.run)?;
            scheduled_tasks_run += 1;
        }

        self.tracker.ensure_empty()?;

        let stats = self.tracker.stats();
        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            pipeline_passes: stats.pipeline_passes,
            applied: stats.applied,
            rolled_back: stats.rolled_back,
            scheduled_tasks_run,
        };
        debug!(
            tick,
            passes = stats.pipeline_passes,
            applied = stats.applied,
            rolled_back = stats.rolled_back,
            tasks = scheduled_tasks_run,
            "tick complete"
        );
        Ok(())
    }

    /// Run `count` ticks, stopping at the first error.
    pub fn run_ticks(&mut self, count: u64) -> Result<(), TrackerError> {
        for _ in 0..count {
            self.tick()?;
        }
        Ok(())
    }

    // -- snapshots ----------------------------------------------------------

    pub fn capture_snapshot(&self) -> WorldSnapshot {
        self.tracker.world().capture_snapshot()
    }

    /// BLAKE3 hex digest of the current world state.
    pub fn state_hash(&self) -> Result<String, WorldError> {
        self.tracker.world().state_hash()
    }

    /// Restore the world from `snapshot`. Only legal between ticks.
    pub fn restore_world(&mut self, snapshot: &WorldSnapshot) -> anyhow::Result<()> {
        if self.tracker.depth() != 0 {
            bail!(
                "cannot restore world with {} phase(s) in flight",
                self.tracker.depth()
            );
        }
        self.tracker
            .world_mut()
            .restore_snapshot(snapshot)
            .context("restoring world snapshot")?;
        info!(tick = self.tracker.tick(), "world restored from snapshot");
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tracker.tick()
    }

    /// Computed as `tick_count * fixed_dt` to avoid drift from repeated
    /// addition.
    pub fn sim_time(&self) -> f64 {
        self.tracker.tick() as f64 * self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    /// Mutable access to the tracker, for setup and listener registration.
    pub fn tracker_mut(&mut self) -> &mut PhaseTracker {
        &mut self.tracker
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }
}

impl std::fmt::Debug for TickLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickLoop")
            .field("tracker", &self.tracker)
            .field("systems", &self.system_names())
            .field("scheduled", &self.scheduled.len())
            .field("fixed_dt", &self.fixed_dt)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::{COMMAND, SOURCE};
    use crate::config::TrackerConfig;
    use causeway_world::block::{BlockFlags, BlockState};
    use causeway_world::identity::UserId;
    use causeway_world::position::BlockPos;
    use causeway_world::world::BlockWorld;

    fn new_loop() -> TickLoop {
        TickLoop::new(
            PhaseTracker::new(BlockWorld::new(), TrackerConfig::default()),
            TickConfig::default(),
        )
    }

    fn place_stone(tracker: &mut PhaseTracker) -> Result<(), TrackerError> {
        let phase = PhaseContext::new(PhaseState::Command)
            .with_cause(SOURCE, UserId(1))
            .with_cause(COMMAND, "setblock")
            .complete();
        tracker.run_in(phase, |t| {
            t.set_block(BlockPos::new(0, 64, 0), BlockState::new("stone"), BlockFlags::ALL)
        })
    }

    fn leave_frame(tracker: &mut PhaseTracker) -> Result<(), TrackerError> {
        tracker.push(PhaseContext::new(PhaseState::TerrainGeneration).complete())
    }

    fn noop(_: &mut PhaseTracker) -> Result<(), TrackerError> {
        Ok(())
    }

    // -- 1. Construction ----------------------------------------------------

    #[test]
    fn new_loop_starts_at_zero() {
        let tl = new_loop();
        assert_eq!(tl.tick_count(), 0);
        assert_eq!(tl.sim_time(), 0.0);
        assert!(tl.is_headless());
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        TickLoop::new(
            PhaseTracker::new(BlockWorld::new(), TrackerConfig::default()),
            TickConfig {
                fixed_dt: 0.0,
                headless: true,
            },
        );
    }

    // -- 2. System ordering -------------------------------------------------

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_system_panics() {
        let mut tl = new_loop();
        tl.add_system("a", noop);
        tl.add_system("a", noop);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unknown_dependency_panics() {
        let mut tl = new_loop();
        tl.add_system_after("b", &["a"], noop);
    }

    #[test]
    fn systems_run_and_record_diagnostics() {
        let mut tl = new_loop();
        tl.add_system("place", place_stone);
        tl.add_system_after("idle", &["place"], noop);
        tl.tick().unwrap();

        let diag = tl.last_diagnostics();
        assert_eq!(diag.system_times.len(), 2);
        assert_eq!(diag.applied, 1);
        assert_eq!(diag.pipeline_passes, 1);
        assert_eq!(tl.tracker().journal().applied().count(), 1);
    }

    // -- 3. Step boundary ---------------------------------------------------

    #[test]
    fn frame_left_on_stack_fails_the_tick() {
        let mut tl = new_loop();
        tl.add_system("leak", leave_frame);
        let err = tl.tick().unwrap_err();
        assert!(matches!(err, TrackerError::StackNotEmpty { .. }));
    }

    #[test]
    fn journal_is_cleared_each_tick() {
        let mut tl = new_loop();
        tl.add_system("place", place_stone);
        tl.tick().unwrap();
        assert_eq!(tl.tracker().journal().len(), 1);
        tl.tick().unwrap();
        assert!(tl.tracker().journal().is_empty(), "second write is a no-op");
    }

    // -- 4. Scheduled tasks -------------------------------------------------

    #[test]
    fn scheduled_task_runs_under_plugin_phase() {
        let mut tl = new_loop();
        tl.schedule(PluginId::new("worldedit"), "paste", |t| {
            assert_eq!(t.current_state(), PhaseState::ScheduledTask);
            t.set_block(BlockPos::new(1, 64, 0), BlockState::new("glass"), BlockFlags::ALL)
        });
        assert_eq!(tl.pending_tasks(), 1);
        tl.tick().unwrap();
        assert_eq!(tl.pending_tasks(), 0);
        assert_eq!(tl.last_diagnostics().scheduled_tasks_run, 1);

        let record = &tl.tracker().journal().block_records()[0];
        assert_eq!(record.phase, "scheduled_task");
        assert_eq!(record.root_cause, "plugin:worldedit");
    }

    // -- 5. Snapshots -------------------------------------------------------

    #[test]
    fn restore_returns_to_captured_hash() {
        let mut tl = new_loop();
        let snapshot = tl.capture_snapshot();
        let before = tl.state_hash().unwrap();
        tl.add_system("place", place_stone);
        tl.tick().unwrap();
        assert_ne!(tl.state_hash().unwrap(), before);
        tl.restore_world(&snapshot).unwrap();
        assert_eq!(tl.state_hash().unwrap(), before);
    }
}
