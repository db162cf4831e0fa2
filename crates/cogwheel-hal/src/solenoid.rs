//! `Solenoid` trait for two-position pneumatic actuators.

use crate::error::HalError;

/// A double-acting solenoid: extended (forward) or retracted (reverse).
pub trait Solenoid: Send {
    /// Stable identifier, e.g. `"gripper_spread"`.
    fn id(&self) -> &str;

    /// Drive the valve to extended (`true`) or retracted (`false`).
    ///
    /// # Errors
    ///
    /// [`HalError::Fault`] if the valve cannot be driven.
    fn set_extended(&mut self, extended: bool) -> Result<(), HalError>;

    /// Last commanded position, `None` before the first command.
    fn is_extended(&self) -> Option<bool>;
}
