//! Ready-made commands built from closures.
//!
//! | Type | Behaviour |
//! |------|-----------|
//! | [`InstantCommand`] | runs a closure in `initialize`, finished on the first tick |
//! | [`FnCommand`] | runs a closure every `execute`, until a predicate holds |
//! | [`WaitCommand`] | does nothing until a duration has elapsed |

use std::sync::Arc;
use std::time::{Duration, Instant};

use cogwheel_types::HookError;

use crate::clock::Clock;
use crate::command::Command;

type Action = Box<dyn FnMut() -> Result<(), HookError> + Send>;
type Predicate = Box<dyn FnMut() -> bool + Send>;

/// One-shot action.
///
/// ```
/// use cogwheel_runtime::{InstantCommand, ScheduledCommand};
///
/// let cmd = ScheduledCommand::new(InstantCommand::new("spread", || Ok(())));
/// assert_eq!(cmd.name(), "spread");
/// ```
pub struct InstantCommand {
    name: String,
    action: Action,
    done: bool,
}

impl InstantCommand {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
            done: false,
        }
    }
}

impl Command for InstantCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), HookError> {
        self.done = false;
        (self.action)()?;
        self.done = true;
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(self.done)
    }
}

/// Periodic action with an optional stop condition.  Without one it runs
/// until interrupted.
pub struct FnCommand {
    name: String,
    step: Action,
    until: Option<Predicate>,
}

impl FnCommand {
    pub fn new<F>(name: impl Into<String>, step: F) -> Self
    where
        F: FnMut() -> Result<(), HookError> + Send + 'static,
    {
        Self {
            name: name.into(),
            step: Box::new(step),
            until: None,
        }
    }

    /// Finish once `done` returns `true`; polled before every step.
    pub fn until<P>(mut self, done: P) -> Self
    where
        P: FnMut() -> bool + Send + 'static,
    {
        self.until = Some(Box::new(done));
        self
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> Result<(), HookError> {
        (self.step)()
    }

    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(self.until.as_mut().is_some_and(|done| done()))
    }
}

/// Finishes `duration` after it was initialized.
pub struct WaitCommand {
    duration: Duration,
    clock: Arc<dyn Clock>,
    started: Option<Instant>,
}

impl WaitCommand {
    pub fn new(duration: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            duration,
            clock,
            started: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Command for WaitCommand {
    fn name(&self) -> &str {
        "wait"
    }

    fn initialize(&mut self) -> Result<(), HookError> {
        self.started = Some(self.clock.now());
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(self
            .started
            .is_some_and(|t| self.clock.now().saturating_duration_since(t) >= self.duration))
    }
}
