//! `SpeedController` trait for open-loop motor outputs (intake wheels,
//! winches, lift motors).

use crate::error::HalError;

/// A motor driven by a normalised output in `[-1, 1]`.
///
/// `1.0` is full forward, `-1.0` full reverse and `0.0` stopped.
pub trait SpeedController: Send {
    /// Stable identifier, e.g. `"gripper_left"`.
    fn id(&self) -> &str;

    /// Drive the motor at `speed`.
    ///
    /// # Errors
    ///
    /// [`HalError::OutOfRange`] when `speed` is outside `[-1, 1]` or not a
    /// number; the previous output is kept.  [`HalError::Fault`] when the
    /// driver cannot apply the command.
    fn set_speed(&mut self, speed: f32) -> Result<(), HalError>;

    /// Last applied output.
    fn speed(&self) -> f32;
}

/// Reject speeds outside `[-1, 1]`.
pub fn check_speed(device: &str, speed: f32) -> Result<f32, HalError> {
    if (-1.0..=1.0).contains(&speed) {
        Ok(speed)
    } else {
        Err(HalError::OutOfRange {
            device: device.to_string(),
            value: speed,
        })
    }
}
