//! Command groups.
//!
//! A [`CommandGroup`] is an ordered list of *stages*; each stage is a set of
//! [`Node`]s that run together.  Groups nest: a node is either a single
//! [`ScheduledCommand`] or another group.
//!
//! | Call | Effect |
//! |------|--------|
//! | [`add_sequential`][CommandGroup::add_sequential] | new stage with one node |
//! | [`add_parallel`][CommandGroup::add_parallel] | new stage with all given nodes |
//!
//! # Running
//!
//! Stages run strictly in append order.  A stage is complete only when every
//! node in it has terminated; then the next stage acquires and starts.  Every
//! member of a stage attempts acquisition before any member runs
//! `initialize`, and if one member conflicts the whole stage backs out.
//!
//! All descendants observe the group's interrupt signal.  Once it is raised
//! the group stops advancing; each child follows its own persistence policy
//! and the group is done when every child of the current stage has either
//! terminated or suspended.  A persistent group with suspended children
//! reports `Suspended` and returns to `Running` when one of them resumes.
//! The resuming child clears the shared signal, which wakes its suspended
//! siblings as well; each resumes once its own requirements are free.
//!
//! # Example
//!
//! ```
//! use cogwheel_runtime::{CommandGroup, InstantCommand, ScheduledCommand};
//!
//! let open = ScheduledCommand::new(InstantCommand::new("open", || Ok(())));
//! let left = ScheduledCommand::new(InstantCommand::new("left", || Ok(())));
//! let right = ScheduledCommand::new(InstantCommand::new("right", || Ok(())));
//!
//! let mut group = CommandGroup::new("intake");
//! group.add_sequential(open).add_parallel([left, right]);
//! assert_eq!(group.stage_count(), 2);
//! ```

use cogwheel_kernel::InterruptSignal;
use cogwheel_types::{CommandId, CommandState, SchedError};
use tracing::{debug, info, warn};

use crate::command::{ScheduledCommand, TickContext, next_command_id};

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// Anything the scheduler can run: a single command or a group.
#[derive(Debug)]
pub enum Node {
    Command(ScheduledCommand),
    Group(CommandGroup),
}

impl From<ScheduledCommand> for Node {
    fn from(cmd: ScheduledCommand) -> Self {
        Node::Command(cmd)
    }
}

impl From<CommandGroup> for Node {
    fn from(group: CommandGroup) -> Self {
        Node::Group(group)
    }
}

impl Node {
    pub fn id(&self) -> CommandId {
        match self {
            Node::Command(c) => c.id(),
            Node::Group(g) => g.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Command(c) => c.name(),
            Node::Group(g) => g.name(),
        }
    }

    pub fn state(&self) -> CommandState {
        match self {
            Node::Command(c) => c.state(),
            Node::Group(g) => g.state(),
        }
    }

    pub fn interrupt_signal(&self) -> &InterruptSignal {
        match self {
            Node::Command(c) => c.interrupt_signal(),
            Node::Group(g) => g.interrupt_signal(),
        }
    }

    /// Find a node with `id` in this subtree.
    pub fn find(&self, id: CommandId) -> Option<&Node> {
        if self.id() == id {
            return Some(self);
        }
        match self {
            Node::Command(_) => None,
            Node::Group(g) => g.stages.iter().flatten().find_map(|n| n.find(id)),
        }
    }

    pub(crate) fn bind_interrupt(&mut self, signal: &InterruptSignal) {
        match self {
            Node::Command(c) => c.bind_interrupt(signal),
            Node::Group(g) => g.bind_interrupt(signal),
        }
    }

    pub(crate) fn acquire(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        match self {
            Node::Command(c) => c.acquire(ctx),
            Node::Group(g) => g.acquire(ctx),
        }
    }

    pub(crate) fn launch(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        match self {
            Node::Command(c) => c.launch(ctx),
            Node::Group(g) => g.launch(ctx),
        }
    }

    pub(crate) fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        match self {
            Node::Command(c) => c.tick(ctx),
            Node::Group(g) => g.tick(ctx),
        }
    }

    pub(crate) fn abort(&mut self, ctx: &mut TickContext<'_>) {
        match self {
            Node::Command(c) => c.abort(ctx),
            Node::Group(g) => g.abort(ctx),
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            Node::Command(c) => c.reset(),
            Node::Group(g) => g.reset(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandGroup
// ─────────────────────────────────────────────────────────────────────────────

/// A composite command made of sequential and parallel stages.
#[derive(Debug)]
pub struct CommandGroup {
    id: CommandId,
    name: String,
    stages: Vec<Vec<Node>>,
    current: usize,
    persistent: bool,
    state: CommandState,
    interrupt: InterruptSignal,
}

impl CommandGroup {
    /// Create an empty, non-persistent group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: next_command_id(),
            name: name.into(),
            stages: Vec::new(),
            current: 0,
            persistent: false,
            state: CommandState::Idle,
            interrupt: InterruptSignal::new(),
        }
    }

    /// Report `Suspended` upward instead of completing when interrupted
    /// children suspend.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Append a stage holding exactly `node`.
    pub fn add_sequential(&mut self, node: impl Into<Node>) -> &mut Self {
        self.stages.push(vec![node.into()]);
        self
    }

    /// Append a stage holding every node in `nodes`, started together.
    pub fn add_parallel<N: Into<Node>>(&mut self, nodes: impl IntoIterator<Item = N>) -> &mut Self {
        let stage: Vec<Node> = nodes.into_iter().map(Into::into).collect();
        if stage.is_empty() {
            warn!(group = %self.id, "empty parallel stage ignored");
            return self;
        }
        self.stages.push(stage);
        self
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

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Index of the stage currently running.
    pub fn current_stage(&self) -> usize {
        self.current
    }

    /// The signal every descendant observes.
    pub fn interrupt_signal(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Nodes of stage `index`.
    pub fn stage(&self, index: usize) -> Option<&[Node]> {
        self.stages.get(index).map(Vec::as_slice)
    }

    // ── scheduler-facing transitions ──────────────────────────────────────────

    pub(crate) fn bind_interrupt(&mut self, signal: &InterruptSignal) {
        self.interrupt = signal.clone();
        self.bind_children();
    }

    fn bind_children(&mut self) {
        let signal = self.interrupt.clone();
        for node in self.stages.iter_mut().flatten() {
            node.bind_interrupt(&signal);
        }
    }

    pub(crate) fn acquire(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        if self.state != CommandState::Idle {
            return Err(SchedError::Misuse(format!(
                "group {} ({}) started while {}",
                self.id, self.name, self.state
            )));
        }
        self.bind_children();
        self.current = 0;
        self.transition(CommandState::Acquiring);
        if self.stages.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.acquire_stage(ctx) {
            self.transition(CommandState::Idle);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn launch(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        if self.stages.is_empty() {
            self.transition(CommandState::Terminated);
            info!(group = %self.id, name = %self.name, "empty group complete");
            return Ok(());
        }
        if let Err(e) = self.launch_stage(ctx) {
            self.reset();
            return Err(e);
        }
        self.transition(CommandState::Running);
        info!(group = %self.id, name = %self.name, stages = self.stages.len(), "group running");
        Ok(())
    }

    pub(crate) fn tick(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        if !matches!(self.state, CommandState::Running | CommandState::Suspended) {
            return Ok(());
        }

        let mut failure = None;
        for node in &mut self.stages[self.current] {
            if !matches!(node.state(), CommandState::Running | CommandState::Suspended) {
                continue;
            }
            if let Err(e) = node.tick(ctx) {
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            warn!(group = %self.id, name = %self.name, error = %e, "child failed; aborting group");
            self.abort(ctx);
            return Err(e);
        }

        let stage = &self.stages[self.current];
        let all_terminated = stage.iter().all(|n| n.state() == CommandState::Terminated);
        let all_exited = stage.iter().all(|n| n.state().has_exited());
        let interrupted = self.interrupt.is_set();

        if all_terminated {
            if interrupted {
                self.transition(CommandState::Terminated);
                info!(group = %self.id, name = %self.name, "group cancelled");
                return Ok(());
            }
            return self.advance(ctx);
        }

        if all_exited && interrupted {
            if self.persistent {
                if self.state != CommandState::Suspended {
                    self.transition(CommandState::Suspended);
                    info!(group = %self.id, name = %self.name, "group suspended");
                }
            } else {
                for node in &mut self.stages[self.current] {
                    if node.state() == CommandState::Suspended {
                        node.abort(ctx);
                        node.reset();
                    }
                }
                self.transition(CommandState::Terminated);
                info!(group = %self.id, name = %self.name, "group cancelled");
            }
            return Ok(());
        }

        if self.state == CommandState::Suspended {
            self.transition(CommandState::Running);
            info!(group = %self.id, name = %self.name, "group resumed");
        }
        Ok(())
    }

    pub(crate) fn abort(&mut self, ctx: &mut TickContext<'_>) {
        if let Some(stage) = self.stages.get_mut(self.current) {
            for node in stage {
                node.abort(ctx);
            }
        }
        match self.state {
            CommandState::Idle => {}
            CommandState::Acquiring => self.transition(CommandState::Idle),
            _ => self.transition(CommandState::Terminated),
        }
    }

    pub(crate) fn reset(&mut self) {
        for node in self.stages.iter_mut().flatten() {
            node.reset();
        }
        self.current = 0;
        if self.state != CommandState::Idle {
            self.transition(CommandState::Idle);
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    /// Move to the next stage, or complete.
    fn advance(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        self.current += 1;
        if self.current >= self.stages.len() {
            self.current = self.stages.len() - 1;
            self.transition(CommandState::Terminated);
            info!(group = %self.id, name = %self.name, "group complete");
            return Ok(());
        }
        debug!(group = %self.id, stage = self.current, "advancing");
        let started = self.acquire_stage(ctx).and_then(|()| self.launch_stage(ctx));
        if let Err(e) = started {
            warn!(group = %self.id, name = %self.name, error = %e, "stage start failed");
            self.transition(CommandState::Terminated);
            return Err(e);
        }
        Ok(())
    }

    /// Every member of the current stage acquires, or none keeps anything.
    fn acquire_stage(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        let group = self.id;
        let stage = &mut self.stages[self.current];
        for i in 0..stage.len() {
            if let Err(e) = stage[i].acquire(ctx) {
                for node in &mut stage[..i] {
                    node.abort(ctx);
                }
                return Err(match e {
                    SchedError::ResourceConflict { resource, holder, .. } => {
                        SchedError::ResourceConflict {
                            command: group,
                            resource,
                            holder,
                        }
                    }
                    other => other,
                });
            }
        }
        Ok(())
    }

    /// Run `initialize` for every acquired member of the current stage.
    fn launch_stage(&mut self, ctx: &mut TickContext<'_>) -> Result<(), SchedError> {
        let stage = &mut self.stages[self.current];
        for i in 0..stage.len() {
            if let Err(e) = stage[i].launch(ctx) {
                for node in stage.iter_mut() {
                    node.abort(ctx);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn transition(&mut self, to: CommandState) {
        debug!(group = %self.id, name = %self.name, from = %self.state, %to, "transition");
        self.state = to;
    }
}
