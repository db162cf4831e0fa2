//! The central scheduler.
//!
//! [`Scheduler`] owns every top-level [`Node`] and the [`ResourceTable`].
//! Each call to [`Scheduler::tick`] advances every active node exactly once,
//! in start order, and never sleeps; pacing between ticks belongs to the
//! driver (see [`crate::driver::run_periodic`]).
//!
//! A failing command is reported in the [`TickReport`] and removed from the
//! active set.  It never stops the others.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cogwheel_kernel::{InterruptSignal, ResourceTable};
use cogwheel_types::{CommandId, CommandState, ResourceId, SchedError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::command::TickContext;
use crate::group::Node;
use crate::pacing::CycleStats;

/// Timing knobs of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Control period in milliseconds.
    pub period_ms: u64,
    /// How early a tick may arrive and still count as due, in milliseconds.
    pub jitter_tolerance_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            jitter_tolerance_ms: 1,
        }
    }
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn jitter_tolerance(&self) -> Duration {
        Duration::from_millis(self.jitter_tolerance_ms)
    }
}

/// What happened during one [`Scheduler::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    /// Nodes that terminated this tick and are idle again.
    pub completed: Vec<CommandId>,
    /// Nodes currently parked waiting for their resources.
    pub suspended: Vec<CommandId>,
    /// Nodes whose hooks failed, with the error.
    pub failed: Vec<(CommandId, SchedError)>,
    /// Wall time the tick took.
    pub elapsed: Duration,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty()
    }
}

/// Owns commands, resources and the tick loop.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    resources: ResourceTable,
    nodes: BTreeMap<CommandId, Node>,
    active: Vec<CommandId>,
    stats: CycleStats,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a scheduler reading time from `clock`.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        if config.period_ms == 0 {
            warn!("zero control period: execute steps will run every tick");
        }
        Self {
            config,
            clock,
            resources: ResourceTable::new(),
            nodes: BTreeMap::new(),
            active: Vec::new(),
            stats: CycleStats::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    /// Register (or look up) the resource called `name`.
    pub fn register_resource(&mut self, name: impl Into<String>) -> ResourceId {
        self.resources.register(name)
    }

    // ── command registry ──────────────────────────────────────────────────────

    /// Hand an idle command or group to the scheduler without starting it.
    pub fn add(&mut self, node: impl Into<Node>) -> CommandId {
        let node = node.into();
        let id = node.id();
        debug!(command = %id, name = %node.name(), "registered");
        self.nodes.insert(id, node);
        id
    }

    /// Register and start in one call.
    ///
    /// If the start fails the node is dropped again and the error returned.
    pub fn schedule(&mut self, node: impl Into<Node>) -> Result<CommandId, SchedError> {
        let id = self.add(node);
        if let Err(e) = self.start(id) {
            self.nodes.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Start an idle node: clear its interrupt, acquire, run `initialize`.
    ///
    /// A resource conflict leaves the node `Idle` and the current holder
    /// untouched.
    pub fn start(&mut self, id: CommandId) -> Result<(), SchedError> {
        if self.active.contains(&id) {
            let err = SchedError::Misuse(format!("{id} started twice"));
            warn!(error = %err, "start rejected");
            return Err(err);
        }
        let node = self.nodes.get_mut(&id).ok_or(SchedError::UnknownCommand(id))?;
        if node.state() != CommandState::Idle {
            let err = SchedError::Misuse(format!("{id} started while {}", node.state()));
            warn!(error = %err, "start rejected");
            return Err(err);
        }

        node.interrupt_signal().clear();
        let mut ctx = TickContext {
            resources: &mut self.resources,
            clock: self.clock.as_ref(),
            period: self.config.period(),
            tolerance: self.config.jitter_tolerance(),
        };
        node.acquire(&mut ctx)?;
        node.launch(&mut ctx)?;

        if node.state() == CommandState::Terminated {
            node.reset();
            info!(command = %id, "completed on start");
            return Ok(());
        }
        self.active.push(id);
        Ok(())
    }

    /// Raise the interrupt of an active node.  Calling it again is a no-op.
    pub fn cancel(&mut self, id: CommandId) -> Result<(), SchedError> {
        let node = self.nodes.get(&id).ok_or(SchedError::UnknownCommand(id))?;
        if !self.active.contains(&id) {
            let err = SchedError::Misuse(format!("{id} cancelled before start"));
            warn!(error = %err, "cancel ignored");
            return Err(err);
        }
        if !node.interrupt_signal().is_set() {
            info!(command = %id, name = %node.name(), "cancel requested");
        }
        node.interrupt_signal().set();
        Ok(())
    }

    /// Stop an active node right now, suspended or not, and return it to
    /// `Idle`.
    pub fn stop(&mut self, id: CommandId) -> Result<(), SchedError> {
        let node = self.nodes.get_mut(&id).ok_or(SchedError::UnknownCommand(id))?;
        let Some(pos) = self.active.iter().position(|a| *a == id) else {
            return Ok(());
        };
        self.active.remove(pos);
        node.interrupt_signal().set();
        let mut ctx = TickContext {
            resources: &mut self.resources,
            clock: self.clock.as_ref(),
            period: self.config.period(),
            tolerance: self.config.jitter_tolerance(),
        };
        node.abort(&mut ctx);
        node.reset();
        info!(command = %id, name = %node.name(), "stopped");
        Ok(())
    }

    /// Stop every active node.
    pub fn stop_all(&mut self) {
        for id in self.active.clone() {
            if let Err(e) = self.stop(id) {
                warn!(command = %id, error = %e, "stop failed");
            }
        }
    }

    /// Remove an idle node from the scheduler and hand it back.
    pub fn remove(&mut self, id: CommandId) -> Result<Node, SchedError> {
        if self.active.contains(&id) {
            return Err(SchedError::Misuse(format!("{id} removed while active")));
        }
        self.nodes.remove(&id).ok_or(SchedError::UnknownCommand(id))
    }

    /// Declare another requirement on a registered, never-started command.
    pub fn add_requirement(&mut self, id: CommandId, resource: ResourceId) -> Result<(), SchedError> {
        if self.resources.get(resource).is_none() {
            return Err(SchedError::UnknownResource(resource));
        }
        match self.nodes.get_mut(&id) {
            None => Err(SchedError::UnknownCommand(id)),
            Some(Node::Group(_)) => Err(SchedError::Misuse(format!(
                "{id} is a group; declare requirements on its members"
            ))),
            Some(Node::Command(cmd)) => cmd.declare_requirement(resource).inspect_err(|e| {
                warn!(error = %e, "requirement rejected");
            }),
        }
    }

    // ── queries ───────────────────────────────────────────────────────────────

    /// A handle to the node's interrupt signal, usable from any thread.
    pub fn interrupt_handle(&self, id: CommandId) -> Result<InterruptSignal, SchedError> {
        self.nodes
            .get(&id)
            .map(|n| n.interrupt_signal().clone())
            .ok_or(SchedError::UnknownCommand(id))
    }

    pub fn state(&self, id: CommandId) -> Option<CommandState> {
        self.nodes.get(&id).map(Node::state)
    }

    pub fn node(&self, id: CommandId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn is_active(&self, id: CommandId) -> bool {
        self.active.contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active node ids in start order.
    pub fn active_ids(&self) -> &[CommandId] {
        &self.active
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    // ── loop ──────────────────────────────────────────────────────────────────

    /// Advance every active node once.
    #[instrument(skip(self), fields(active = self.active.len()))]
    pub fn tick(&mut self) -> TickReport {
        let started = self.clock.now();
        let period = self.config.period();
        let mut report = TickReport::default();
        let mut still_active = Vec::with_capacity(self.active.len());

        for id in std::mem::take(&mut self.active) {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let mut ctx = TickContext {
                resources: &mut self.resources,
                clock: self.clock.as_ref(),
                period,
                tolerance: self.config.jitter_tolerance(),
            };
            match node.tick(&mut ctx) {
                Err(e) => {
                    error!(command = %id, name = %node.name(), error = %e, "command failed");
                    node.abort(&mut ctx);
                    node.reset();
                    report.failed.push((id, e));
                }
                Ok(()) => match node.state() {
                    CommandState::Terminated => {
                        node.reset();
                        report.completed.push(id);
                    }
                    CommandState::Suspended => {
                        report.suspended.push(id);
                        still_active.push(id);
                    }
                    _ => still_active.push(id),
                },
            }
        }
        self.active = still_active;

        let elapsed = self.clock.now().saturating_duration_since(started);
        self.stats.record(elapsed, period);
        if elapsed > period {
            debug!(elapsed_us = elapsed.as_micros() as u64, "tick overran the period");
        }
        report.elapsed = elapsed;
        report
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("resources", &self.resources.len())
            .field("nodes", &self.nodes.len())
            .field("active", &self.active)
            .finish()
    }
}
