//! In-memory drivers for running robot code without hardware.
//!
//! The actuators record the last command; the potentiometer reports
//! whatever reading it was last given.  A driver built with
//! `faulty(true)` rejects every command with [`HalError::Fault`], which is
//! handy for exercising failure paths.
//!
//! ```rust
//! use cogwheel_hal::sim::SimSpeedController;
//! use cogwheel_hal::SpeedController;
//!
//! let mut motor = SimSpeedController::new("intake");
//! motor.set_speed(0.5).unwrap();
//! assert_eq!(motor.speed(), 0.5);
//! assert!(motor.set_speed(2.0).is_err());
//! ```

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::HalError;
use crate::potentiometer::Potentiometer;
use crate::solenoid::Solenoid;
use crate::speed_controller::{SpeedController, check_speed};

/// Simulated motor controller.
#[derive(Debug, Clone)]
pub struct SimSpeedController {
    id: String,
    speed: f32,
    faulty: bool,
}

impl SimSpeedController {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            speed: 0.0,
            faulty: false,
        }
    }

    pub fn faulty(mut self, faulty: bool) -> Self {
        self.faulty = faulty;
        self
    }
}

impl SpeedController for SimSpeedController {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_speed(&mut self, speed: f32) -> Result<(), HalError> {
        let speed = check_speed(&self.id, speed)?;
        if self.faulty {
            return Err(HalError::Fault {
                device: self.id.clone(),
                reason: "simulated fault".to_string(),
            });
        }
        trace!(device = %self.id, speed, "speed set");
        self.speed = speed;
        Ok(())
    }

    fn speed(&self) -> f32 {
        self.speed
    }
}

/// Simulated double solenoid.
#[derive(Debug, Clone)]
pub struct SimSolenoid {
    id: String,
    extended: Option<bool>,
    faulty: bool,
}

impl SimSolenoid {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extended: None,
            faulty: false,
        }
    }

    pub fn faulty(mut self, faulty: bool) -> Self {
        self.faulty = faulty;
        self
    }
}

impl Solenoid for SimSolenoid {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_extended(&mut self, extended: bool) -> Result<(), HalError> {
        if self.faulty {
            return Err(HalError::Fault {
                device: self.id.clone(),
                reason: "simulated fault".to_string(),
            });
        }
        trace!(device = %self.id, extended, "solenoid set");
        self.extended = Some(extended);
        Ok(())
    }

    fn is_extended(&self) -> Option<bool> {
        self.extended
    }
}

/// Simulated potentiometer.  Clones share one reading, so a test can keep a
/// handle and move the sensor after handing a clone to a subsystem.
#[derive(Debug, Clone)]
pub struct SimPotentiometer {
    id: String,
    reading: Arc<Mutex<f32>>,
}

impl SimPotentiometer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reading: Arc::new(Mutex::new(0.0)),
        }
    }

    pub fn set(&self, reading: f32) {
        *self.reading.lock().unwrap_or_else(|e| e.into_inner()) = reading;
    }
}

impl Potentiometer for SimPotentiometer {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self) -> f32 {
        *self.reading.lock().unwrap_or_else(|e| e.into_inner())
    }
}
