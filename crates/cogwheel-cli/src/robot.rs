//! The demo robot: a simulated gripper and its autonomous routine.

use std::sync::Arc;
use std::time::Duration;

use cogwheel_hal::{Gripper, GripperCommands};
use cogwheel_runtime::{
    Clock, CommandGroup, CommandId, FnCommand, SchedError, ScheduledCommand, Scheduler,
    SchedulerConfig, SystemClock, WaitCommand,
};
use tracing::{debug, info, warn};

/// Subsystem resource names.
pub const GRIPPER: &str = "gripper";

pub struct Robot {
    pub scheduler: Scheduler,
    gripper: GripperCommands,
    autonomous: CommandId,
    status: CommandId,
}

impl Robot {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let mut scheduler = Scheduler::with_clock(config, clock);
        let res = scheduler.register_resource(GRIPPER);
        let gripper = GripperCommands::new(Gripper::simulated().shared(), res, scheduler.clock());

        let autonomous = scheduler.add(autonomous_routine(&gripper, scheduler.clock()));
        let status = scheduler.add(status_reporter(&gripper));

        Self {
            scheduler,
            gripper,
            autonomous,
            status,
        }
    }

    /// Start the status reporter and the autonomous routine.
    pub fn autonomous_init(&mut self) -> Result<(), SchedError> {
        self.scheduler.start(self.status)?;
        self.scheduler.start(self.autonomous)?;
        info!(autonomous = %self.autonomous, "autonomous started");
        Ok(())
    }

    /// Stop every command and leave the gripper wheels and lift off.
    pub fn shutdown(&mut self) {
        self.scheduler.stop_all();
        match self.gripper.gripper().lock() {
            Ok(mut g) => {
                if let Err(e) = g.stop() {
                    warn!(error = %e, "gripper wheels stop failed");
                }
                if let Err(e) = g.set_lift_motor(0.0) {
                    warn!(error = %e, "gripper lift stop failed");
                }
            }
            Err(_) => warn!("gripper lock poisoned at shutdown"),
        }
        info!("robot disabled");
    }
}

/// Open, intake while waiting for the piece to settle, close, then eject.
fn autonomous_routine(gripper: &GripperCommands, clock: Arc<dyn Clock>) -> CommandGroup {
    let mut group = CommandGroup::new("autonomous");
    group
        .add_sequential(gripper.spread())
        .add_parallel([
            gripper.suck_fast(),
            ScheduledCommand::new(WaitCommand::new(Duration::from_millis(400), clock)),
        ])
        .add_sequential(gripper.close())
        .add_sequential(gripper.spit_fast(0.5));
    group
}

/// Logs gripper state every period.  Requires nothing, so it never blocks
/// the routine.
fn status_reporter(gripper: &GripperCommands) -> ScheduledCommand {
    let shared = Arc::clone(gripper.gripper());
    ScheduledCommand::new(FnCommand::new("status", move || {
        let g = shared.lock().map_err(|_| "gripper lock poisoned")?;
        let (left, right) = g.motor_outputs();
        debug!(left, right, spread = ?g.is_spread(), lift = ?g.lift_state(), "gripper status");
        Ok(())
    }))
}
