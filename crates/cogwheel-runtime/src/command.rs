//! [`Command`] – the extension point – and [`ScheduledCommand`], the state
//! machine the scheduler drives for each one.
//!
//! A concrete command implements whichever hooks it needs; every hook has a
//! safe default (no-op, or "never finished").  The scheduler wraps it in a
//! [`ScheduledCommand`] that carries the declared requirements, the
//! persistence policy, the interrupt signal and the cadence snapshot.
//!
//! # Lifecycle
//!
//! | State | Per tick |
//! |---|---|
//! | `Idle` | nothing; `start` moves to `Acquiring` |
//! | `Acquiring` | all requirements taken at once or none; then `initialize` once |
//! | `Running` | finished → release + `end`; interrupted → `interrupted` + release + suspend/terminate; otherwise one `execute` if the period is due |
//! | `Suspended` | on a release notification, or once a sibling cleared the shared interrupt, if *all* requirements are free: clear the interrupt and re-acquire, skipping `initialize` |
//! | `Terminated` | nothing; the owner resets it to `Idle` |
//!
//! A hook error never leaks resources: the command releases everything it
//! holds before the error is surfaced.
//!
//! # Example
//!
//! ```
//! use cogwheel_runtime::{Command, HookError, ScheduledCommand, Scheduler, SchedulerConfig};
//!
//! struct Spin { turns: u32 }
//!
//! impl Command for Spin {
//!     fn execute(&mut self) -> Result<(), HookError> {
//!         self.turns += 1;
//!         Ok(())
//!     }
//!     fn is_finished(&mut self) -> Result<bool, HookError> {
//!         Ok(self.turns >= 3)
//!     }
//! }
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let wheel = scheduler.register_resource("wheel");
//! let id = scheduler
//!     .schedule(ScheduledCommand::new(Spin { turns: 0 }).requires(wheel))
//!     .unwrap();
//! assert!(scheduler.is_active(id));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cogwheel_kernel::{InterruptSignal, ResourceTable};
use cogwheel_types::{CommandId, CommandState, Hook, HookError, ResourceId, SchedError};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::pacing::Cadence;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique command id.
pub(crate) fn next_command_id() -> CommandId {
    CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
}

// ─────────────────────────────────────────────────────────────────────────────
// Command
// ─────────────────────────────────────────────────────────────────────────────

/// Capability set of a concrete command.
///
/// Override the hooks the behaviour needs.  Hooks run on the scheduler's
/// thread and must not block; long work is split across `execute` steps.
pub trait Command: Send {
    /// Human-readable name used in logs.  Defaults to the type name.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Runs once after all requirements are acquired.  Not re-run on resume.
    fn initialize(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// One step of periodic work, at most once per control period.
    fn execute(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Polled every tick before `execute`.
    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(false)
    }

    /// Runs once after the command finished normally.
    fn end(&mut self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs when the interrupt signal is observed, before resources are released.
    fn interrupted(&mut self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a node needs from the scheduler while it is advanced.
pub(crate) struct TickContext<'a> {
    pub resources: &'a mut ResourceTable,
    pub clock: &'a dyn Clock,
    pub period: Duration,
    pub tolerance: Duration,
}

// ─────────────────────────────────────────────────────────────────────────────
// ScheduledCommand
// ─────────────────────────────────────────────────────────────────────────────

/// A [`Command`] plus everything the scheduler tracks about it.
pub struct ScheduledCommand {
    id: CommandId,
    name: String,
    inner: Box<dyn Command>,
    requirements: Vec<ResourceId>,
    persistent: bool,
    state: CommandState,
    interrupt: InterruptSignal,
    initialized: bool,
    ever_started: bool,
    cadence: Cadence,
}

impl ScheduledCommand {
    /// Wrap `command` with no requirements, non-persistent, with a private
    /// cleared interrupt signal.
    pub fn new<C: Command + 'static>(command: C) -> Self {
        Self::from_boxed(Box::new(command))
    }

    pub fn from_boxed(command: Box<dyn Command>) -> Self {
        let name = command.name().to_string();
        Self {
            id: next_command_id(),
            name,
            inner: command,
            requirements: Vec::new(),
            persistent: false,
            state: CommandState::Idle,
            interrupt: InterruptSignal::new(),
            initialized: false,
            ever_started: false,
            cadence: Cadence::new(),
        }
    }

    /// Declare a required resource.  Order of declaration is acquisition order.
    pub fn requires(mut self, resource: ResourceId) -> Self {
        if let Err(e) = self.declare_requirement(resource) {
            warn!(command = %self.id, error = %e, "requirement ignored");
        }
        self
    }

    /// Declare several required resources.
    pub fn requiring(mut self, resources: impl IntoIterator<Item = ResourceId>) -> Self {
        for res in resources {
            self = self.requires(res);
        }
        self
    }

    /// Suspend instead of terminating when interrupted.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Add a requirement in place.
    ///
    /// Requirements are frozen once the command has been started; a late
    /// declaration is rejected with [`SchedError::Misuse`].
    pub fn declare_requirement(&mut self, resource: ResourceId) -> Result<(), SchedError> {
        if self.ever_started {
            return Err(SchedError::Misuse(format!(
                "{} ({}) declared {} after start",
                self.id, self.name, resource
            )));
        }
        if !self.requirements.contains(&resource) {
            self.requirements.push(resource);
        }
        Ok(())
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    /// The signal this command currently observes.
    pub fn interrupt_signal(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Cadence snapshot of the current cycle.
    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    // ── scheduler-facing transitions ──────────────────────────────────────────

    /// Observe `signal` instead of the current one (group membership).
    pub(crate) fn bind_interrupt(&mut self, signal: &InterruptSignal) {
        self.interrupt = signal.clone();
    }

    /// `Idle → Acquiring`, taking every requirement or none.
    ///
    /// On conflict the command is back in `Idle` and holds nothing.
    pub(crate) fn acquire(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        if self.state != CommandState::Idle {
            return Err(SchedError::Misuse(format!(
                "{} ({}) started while {}",
                self.id, self.name, self.state
            )));
        }
        self.ever_started = true;
        self.transition(CommandState::Acquiring);
        if let Err(e) = ctx.resources.try_acquire_all(self.id, &self.requirements) {
            warn!(command = %self.id, name = %self.name, error = %e, "acquisition aborted");
            self.transition(CommandState::Idle);
            return Err(e);
        }
        Ok(())
    }

    /// `Acquiring → Running`, running `initialize` unless already done.
    pub(crate) fn launch(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        if self.state != CommandState::Acquiring {
            return Err(SchedError::Misuse(format!(
                "{} ({}) launched while {}",
                self.id, self.name, self.state
            )));
        }
        if !self.initialized {
            if let Err(source) = self.inner.initialize() {
                self.release(ctx);
                self.transition(CommandState::Idle);
                return Err(self.failure(Hook::Initialize, source));
            }
            self.initialized = true;
        }
        self.cadence.reset();
        self.transition(CommandState::Running);
        info!(command = %self.id, name = %self.name, "command running");
        self.check_invariant(ctx);
        Ok(())
    }

    /// Advance by one tick.
    pub(crate) fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        let result = match self.state {
            CommandState::Running => self.step_running(ctx),
            CommandState::Suspended => {
                self.step_suspended(ctx);
                Ok(())
            }
            _ => Ok(()),
        };
        self.check_invariant(ctx);
        result
    }

    /// Stop immediately, releasing whatever is held.
    pub(crate) fn abort(&mut self, ctx: &mut TickContext<'_>) {
        match self.state {
            CommandState::Running | CommandState::Ending => {
                self.inner.interrupted();
                self.release(ctx);
                self.transition(CommandState::Terminated);
            }
            CommandState::Acquiring => {
                self.release(ctx);
                self.transition(CommandState::Idle);
            }
            CommandState::Suspended => self.transition(CommandState::Terminated),
            CommandState::Idle | CommandState::Terminated => {}
        }
        ctx.resources.unwait(self.id, &self.requirements);
    }

    /// Terminal reset back to `Idle` so the command can be started again.
    pub(crate) fn reset(&mut self) {
        if self.state.may_hold_resources() {
            warn!(command = %self.id, state = %self.state, "reset skipped: command still holds resources");
            return;
        }
        if self.state != CommandState::Idle {
            self.transition(CommandState::Idle);
        }
        self.initialized = false;
        self.cadence.reset();
    }

    // ── internals ─────────────────────────────────────────────────────────────

    fn step_running(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        let finished = match self.inner.is_finished() {
            Ok(finished) => finished,
            Err(source) => return Err(self.fail(ctx, Hook::IsFinished, source)),
        };

        if finished {
            self.transition(CommandState::Ending);
            self.release(ctx);
            let ended = self.inner.end();
            self.transition(CommandState::Terminated);
            info!(command = %self.id, name = %self.name, "command finished");
            return ended.map_err(|source| {
                let err = self.failure(Hook::End, source);
                error!(error = %err, "hook failed");
                err
            });
        }

        if self.interrupt.is_set() {
            self.inner.interrupted();
            self.release(ctx);
            if self.persistent {
                // Our own release must not count as a wake-up.
                ctx.resources.unwait(self.id, &self.requirements);
                ctx.resources.wait_any(self.id, &self.requirements);
                self.transition(CommandState::Suspended);
                info!(command = %self.id, name = %self.name, "command suspended");
            } else {
                self.transition(CommandState::Terminated);
                info!(command = %self.id, name = %self.name, "command cancelled");
            }
            return Ok(());
        }

        let now = ctx.clock.now();
        if !self.cadence.is_due(now, ctx.tolerance) {
            return Ok(());
        }
        self.cadence.begin(now);
        let stepped = self.inner.execute();
        self.cadence.finish(ctx.clock.now(), ctx.period);
        if self.cadence.last_elapsed() > ctx.period {
            debug!(
                command = %self.id,
                elapsed_us = self.cadence.last_elapsed().as_micros() as u64,
                "execute overran the period"
            );
        }
        stepped.map_err(|source| self.fail(ctx, Hook::Execute, source))
    }

    fn step_suspended(&mut self, ctx: &mut TickContext<'_>) {
        // A sibling resuming clears the shared signal; that is a wake-up too.
        let notified = self.requirements.is_empty()
            || ctx.resources.take_notification(self.id)
            || !self.interrupt.is_set();
        if !notified {
            return;
        }
        // Woken by one release; resume only when the whole set is free.
        if !ctx.resources.all_free(&self.requirements) {
            ctx.resources.wait_any(self.id, &self.requirements);
            return;
        }

        self.interrupt.clear();
        self.transition(CommandState::Acquiring);
        match ctx.resources.try_acquire_all(self.id, &self.requirements) {
            Ok(()) => {
                ctx.resources.unwait(self.id, &self.requirements);
                self.cadence.reset();
                self.transition(CommandState::Running);
                info!(command = %self.id, name = %self.name, "command resumed");
            }
            Err(e) => {
                debug!(command = %self.id, error = %e, "resume deferred");
                ctx.resources.wait_any(self.id, &self.requirements);
                self.transition(CommandState::Suspended);
            }
        }
    }

    /// Release everything, terminate and build the error for `hook`.
    fn fail(&mut self, ctx: &mut TickContext<'_>, hook: Hook, source: HookError) -> SchedError {
        self.release(ctx);
        self.transition(CommandState::Terminated);
        let err = self.failure(hook, source);
        error!(error = %err, "hook failed");
        err
    }

    fn failure(&self, hook: Hook, source: HookError) -> SchedError {
        SchedError::UserCodeFailure {
            command: self.id,
            hook,
            source,
        }
    }

    fn release(&mut self, ctx: &mut TickContext<'_>) {
        ctx.resources.release_all(self.id, &self.requirements);
    }

    fn transition(&mut self, to: CommandState) {
        debug!(command = %self.id, name = %self.name, from = %self.state, %to, "transition");
        self.state = to;
    }

    fn check_invariant(&self, ctx: &TickContext<'_>) {
        debug_assert!(
            ctx.resources.holds_all_or_none(self.id, &self.requirements),
            "{} holds a partial resource set",
            self.id
        );
    }
}

impl std::fmt::Debug for ScheduledCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledCommand")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("requirements", &self.requirements)
            .field("persistent", &self.persistent)
            .finish()
    }
}
