//! Scheduler commands that drive the gripper.
//!
//! Every command built here requires the gripper resource, so the scheduler
//! never lets two of them touch the wheels at the same time.
//!
//! ```rust
//! use cogwheel_hal::{Gripper, GripperCommands};
//! use cogwheel_runtime::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default());
//! let res = scheduler.register_resource("gripper");
//! let gripper = GripperCommands::new(Gripper::simulated().shared(), res, scheduler.clock());
//!
//! scheduler.schedule(gripper.spread()).unwrap();
//! ```

use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use cogwheel_runtime::{Clock, Command, HookError, InstantCommand, ResourceId, ScheduledCommand};
use tracing::{info, warn};

use crate::gripper::{Gripper, SharedGripper};

/// How long [`GripperCommands::suck_fast`] runs the wheels.
pub const SUCK_FAST_DURATION: Duration = Duration::from_millis(400);
/// How long [`GripperCommands::spit_fast`] runs the wheels.
pub const SPIT_FAST_DURATION: Duration = Duration::from_secs(1);

fn lock(gripper: &SharedGripper) -> Result<MutexGuard<'_, Gripper>, HookError> {
    gripper.lock().map_err(|_| "gripper lock poisoned".into())
}

/// Factory for gripper commands bound to one gripper and its resource.
#[derive(Clone)]
pub struct GripperCommands {
    gripper: SharedGripper,
    resource: ResourceId,
    clock: Arc<dyn Clock>,
}

impl GripperCommands {
    pub fn new(gripper: SharedGripper, resource: ResourceId, clock: Arc<dyn Clock>) -> Self {
        Self {
            gripper,
            resource,
            clock,
        }
    }

    pub fn gripper(&self) -> &SharedGripper {
        &self.gripper
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    fn instant<F>(&self, name: &str, mut f: F) -> ScheduledCommand
    where
        F: FnMut(&mut Gripper) -> Result<(), crate::HalError> + Send + 'static,
    {
        let gripper = Arc::clone(&self.gripper);
        ScheduledCommand::new(InstantCommand::new(name, move || {
            f(&mut *lock(&gripper)?)?;
            Ok(())
        }))
        .requires(self.resource)
    }

    /// Both wheels at `speed`.
    pub fn move_left_right(&self, speed: f32) -> ScheduledCommand {
        self.instant("move_left_right", move |g| g.set_motor_speeds(speed, speed))
    }

    pub fn suck(&self) -> ScheduledCommand {
        self.instant("suck", |g| g.set_motor_speeds(1.0, 1.0))
    }

    pub fn spit(&self) -> ScheduledCommand {
        self.instant("spit", |g| g.set_motor_speeds(-1.0, -1.0))
    }

    pub fn stop(&self) -> ScheduledCommand {
        self.instant("stop", Gripper::stop)
    }

    pub fn spread(&self) -> ScheduledCommand {
        self.instant("spread", |g| g.set_spread(true))
    }

    pub fn close(&self) -> ScheduledCommand {
        self.instant("close", |g| g.set_spread(false))
    }

    pub fn toggle_spread(&self) -> ScheduledCommand {
        self.instant("toggle_spread", Gripper::toggle_spread)
    }

    /// Full intake for [`SUCK_FAST_DURATION`].
    pub fn suck_fast(&self) -> ScheduledCommand {
        let timed = TimedIntake::new(
            "suck_fast",
            Arc::clone(&self.gripper),
            Arc::clone(&self.clock),
            1.0,
            SUCK_FAST_DURATION,
        );
        ScheduledCommand::new(timed).requires(self.resource)
    }

    /// Outtake at `speed` for [`SPIT_FAST_DURATION`].
    pub fn spit_fast(&self, speed: f32) -> ScheduledCommand {
        let timed = TimedIntake::new(
            "spit_fast",
            Arc::clone(&self.gripper),
            Arc::clone(&self.clock),
            -speed,
            SPIT_FAST_DURATION,
        );
        ScheduledCommand::new(timed).requires(self.resource)
    }
}

/// Runs both wheels at a fixed speed, then stops them once `duration` has
/// passed.
struct TimedIntake {
    name: &'static str,
    gripper: SharedGripper,
    clock: Arc<dyn Clock>,
    speed: f32,
    duration: Duration,
    started: Option<Instant>,
    done: bool,
}

impl TimedIntake {
    fn new(
        name: &'static str,
        gripper: SharedGripper,
        clock: Arc<dyn Clock>,
        speed: f32,
        duration: Duration,
    ) -> Self {
        Self {
            name,
            gripper,
            clock,
            speed,
            duration,
            started: None,
            done: false,
        }
    }
}

impl Command for TimedIntake {
    fn name(&self) -> &str {
        self.name
    }

    fn initialize(&mut self) -> Result<(), HookError> {
        self.started = Some(self.clock.now());
        self.done = false;
        info!(command = self.name, speed = self.speed, "started");
        Ok(())
    }

    fn execute(&mut self) -> Result<(), HookError> {
        let mut gripper = lock(&self.gripper)?;
        gripper.set_motor_speeds(self.speed, self.speed)?;
        let elapsed = self
            .started
            .map_or(Duration::ZERO, |t| self.clock.now().saturating_duration_since(t));
        if elapsed >= self.duration {
            gripper.stop()?;
            self.done = true;
        }
        Ok(())
    }

    fn is_finished(&mut self) -> Result<bool, HookError> {
        Ok(self.done)
    }

    fn end(&mut self) -> Result<(), HookError> {
        info!(command = self.name, "ended");
        Ok(())
    }

    fn interrupted(&mut self) {
        match lock(&self.gripper) {
            Ok(mut g) => {
                if let Err(e) = g.stop() {
                    warn!(command = self.name, error = %e, "could not stop wheels");
                }
            }
            Err(e) => warn!(command = self.name, error = %e, "could not stop wheels"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogwheel_runtime::{CommandState, ManualClock, Scheduler, SchedulerConfig};

    fn rig() -> (Scheduler, ManualClock, GripperCommands) {
        let clock = ManualClock::new();
        let mut s = Scheduler::with_clock(SchedulerConfig::default(), Arc::new(clock.clone()));
        let res = s.register_resource("gripper");
        let cmds = GripperCommands::new(Gripper::simulated().shared(), res, s.clock());
        (s, clock, cmds)
    }

    fn outputs(cmds: &GripperCommands) -> (f32, f32) {
        cmds.gripper().lock().unwrap().motor_outputs()
    }

    #[test]
    fn instant_commands_apply_on_start() {
        let (mut s, _, cmds) = rig();
        s.schedule(cmds.suck()).unwrap();
        assert_eq!(outputs(&cmds), (1.0, -1.0));
        s.tick();
        assert_eq!(s.active_count(), 0);

        s.schedule(cmds.spread()).unwrap();
        assert_eq!(cmds.gripper().lock().unwrap().is_spread(), Some(true));
        s.tick();
        s.schedule(cmds.toggle_spread()).unwrap();
        assert_eq!(cmds.gripper().lock().unwrap().is_spread(), Some(false));
    }

    #[test]
    fn suck_fast_stops_after_duration() {
        let (mut s, clock, cmds) = rig();
        let id = s.schedule(cmds.suck_fast()).unwrap();

        s.tick();
        assert_eq!(outputs(&cmds), (1.0, -1.0));
        clock.advance(Duration::from_millis(200));
        s.tick();
        assert_eq!(outputs(&cmds), (1.0, -1.0));

        clock.advance(Duration::from_millis(200));
        s.tick();
        assert_eq!(outputs(&cmds), (0.0, -0.0));
        let report = s.tick();
        assert_eq!(report.completed, vec![id]);
        assert_eq!(s.state(id), Some(CommandState::Idle));
    }

    #[test]
    fn spit_fast_runs_reversed() {
        let (mut s, _, cmds) = rig();
        s.schedule(cmds.spit_fast(0.5)).unwrap();
        s.tick();
        assert_eq!(outputs(&cmds), (-0.5, 0.5));
    }

    #[test]
    fn cancel_stops_wheels() {
        let (mut s, _, cmds) = rig();
        let id = s.schedule(cmds.spit_fast(1.0)).unwrap();
        s.tick();
        s.cancel(id).unwrap();
        s.tick();
        assert_eq!(outputs(&cmds), (0.0, -0.0));
        assert!(!s.is_active(id));
    }

    #[test]
    fn two_gripper_commands_conflict() {
        let (mut s, _, cmds) = rig();
        s.schedule(cmds.suck_fast()).unwrap();
        let err = s.schedule(cmds.spit()).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(outputs(&cmds), (0.0, 0.0));
    }

    #[test]
    fn invalid_speed_fails_the_command() {
        let (mut s, _, cmds) = rig();
        let id = s.schedule(cmds.spit_fast(2.0)).unwrap();
        let report = s.tick();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, id);
        assert!(!s.resources().get(cmds.resource()).unwrap().is_locked());
    }
}
