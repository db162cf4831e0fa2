//! The gripper subsystem: two intake wheels, a spread solenoid and a lift
//! motor with potentiometer feedback.
//!
//! The right wheel is mounted mirrored, so [`Gripper::set_motor_speeds`]
//! inverts it; callers always think in "positive = suck in".

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::HalError;
use crate::potentiometer::Potentiometer;
use crate::sim::{SimPotentiometer, SimSolenoid, SimSpeedController};
use crate::solenoid::Solenoid;
use crate::speed_controller::{SpeedController, check_speed};

/// A gripper shared between the commands that drive it.
pub type SharedGripper = Arc<Mutex<Gripper>>;

/// Named lift positions, by potentiometer reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftPosition {
    Up,
    Down,
}

impl LiftPosition {
    pub const ALL: [LiftPosition; 2] = [LiftPosition::Up, LiftPosition::Down];

    /// Potentiometer reading at this position.
    pub fn setpoint(self) -> f32 {
        match self {
            LiftPosition::Up => 0.2,
            LiftPosition::Down => 0.595,
        }
    }

    /// The position whose setpoint is closest to `reading`.  Ties go up.
    pub fn nearest(reading: f32) -> LiftPosition {
        let mut best = LiftPosition::Up;
        for pos in LiftPosition::ALL {
            if (reading - pos.setpoint()).abs() < (reading - best.setpoint()).abs() {
                best = pos;
            }
        }
        best
    }
}

/// Motors and sensors the gripper is wired to.
pub struct GripperHardware {
    pub left: Box<dyn SpeedController>,
    pub right: Box<dyn SpeedController>,
    pub spread: Box<dyn Solenoid>,
    pub lift: Box<dyn SpeedController>,
    pub lift_sensor: Box<dyn Potentiometer>,
}

pub struct Gripper {
    left: Box<dyn SpeedController>,
    right: Box<dyn SpeedController>,
    spread: Box<dyn Solenoid>,
    lift: Box<dyn SpeedController>,
    lift_sensor: Box<dyn Potentiometer>,
}

impl Gripper {
    pub fn new(hw: GripperHardware) -> Self {
        Self {
            left: hw.left,
            right: hw.right,
            spread: hw.spread,
            lift: hw.lift,
            lift_sensor: hw.lift_sensor,
        }
    }

    /// A gripper wired to simulated drivers, lift resting up.
    pub fn simulated() -> Self {
        let pot = SimPotentiometer::new("gripper_lift_pot");
        pot.set(LiftPosition::Up.setpoint());
        Self::simulated_with_sensor(pot)
    }

    /// Simulated drivers with a caller-held potentiometer.
    pub fn simulated_with_sensor(lift_sensor: SimPotentiometer) -> Self {
        Self::new(GripperHardware {
            left: Box::new(SimSpeedController::new("gripper_left")),
            right: Box::new(SimSpeedController::new("gripper_right")),
            spread: Box::new(SimSolenoid::new("gripper_spread")),
            lift: Box::new(SimSpeedController::new("gripper_lift")),
            lift_sensor: Box::new(lift_sensor),
        })
    }

    pub fn shared(self) -> SharedGripper {
        Arc::new(Mutex::new(self))
    }

    /// Drive both wheels.  Nothing is applied unless both speeds are valid.
    pub fn set_motor_speeds(&mut self, left: f32, right: f32) -> Result<(), HalError> {
        check_speed(self.left.id(), left)?;
        check_speed(self.right.id(), right)?;
        self.left.set_speed(left)?;
        self.right.set_speed(-right)?;
        debug!(left, right, "gripper wheels");
        Ok(())
    }

    pub fn set_spread(&mut self, spread: bool) -> Result<(), HalError> {
        self.spread.set_extended(spread)?;
        debug!(spread, "gripper spread");
        Ok(())
    }

    /// Flip the spread state.  An unknown state closes the gripper.
    pub fn toggle_spread(&mut self) -> Result<(), HalError> {
        let next = match self.spread.is_extended() {
            Some(extended) => !extended,
            None => false,
        };
        self.set_spread(next)
    }

    pub fn stop(&mut self) -> Result<(), HalError> {
        self.set_motor_speeds(0.0, 0.0)
    }

    /// Raw outputs as sent to the drivers: `(left, right)`.
    pub fn motor_outputs(&self) -> (f32, f32) {
        (self.left.speed(), self.right.speed())
    }

    pub fn is_spread(&self) -> Option<bool> {
        self.spread.is_extended()
    }

    /// Drive the lift; positive raises.
    pub fn set_lift_motor(&mut self, speed: f32) -> Result<(), HalError> {
        self.lift.set_speed(speed)?;
        debug!(speed, "gripper lift");
        Ok(())
    }

    pub fn lift_output(&self) -> f32 {
        self.lift.speed()
    }

    /// Named position nearest the current sensor reading.
    pub fn lift_state(&self) -> LiftPosition {
        LiftPosition::nearest(self.lift_sensor.get())
    }
}

impl std::fmt::Debug for Gripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gripper")
            .field("left", &self.left.speed())
            .field("right", &self.right.speed())
            .field("spread", &self.spread.is_extended())
            .field("lift", &self.lift.speed())
            .field("lift_sensor", &self.lift_sensor.get())
            .finish()
    }
}
