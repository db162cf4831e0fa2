//! `cogwheel-hal` – hardware collaborators for robot commands.
//!
//! Drivers sit behind small traits ([`SpeedController`], [`Solenoid`],
//! [`Potentiometer`]) so a subsystem such as the [`Gripper`] runs the same on
//! simulated and real hardware.  [`GripperCommands`] turns gripper operations into scheduler
//! commands that require the gripper resource.
//!
//! | Module | Contents |
//! |---|---|
//! | [`speed_controller`] | motor trait, `[-1, 1]` range check |
//! | [`solenoid`] | two-position valve trait |
//! | [`potentiometer`] | analog position sensor trait |
//! | [`sim`] | in-memory drivers |
//! | [`gripper`] | wheels, spread solenoid and lift subsystem |
//! | [`commands`] | instant and timed gripper commands |

pub mod commands;
pub mod error;
pub mod gripper;
pub mod potentiometer;
pub mod sim;
pub mod solenoid;
pub mod speed_controller;

pub use commands::{GripperCommands, SPIT_FAST_DURATION, SUCK_FAST_DURATION};
pub use error::HalError;
pub use gripper::{Gripper, GripperHardware, LiftPosition, SharedGripper};
pub use potentiometer::Potentiometer;
pub use sim::{SimPotentiometer, SimSolenoid, SimSpeedController};
pub use solenoid::Solenoid;
pub use speed_controller::SpeedController;
