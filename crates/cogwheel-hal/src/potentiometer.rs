//! `Potentiometer` trait for analog position feedback.

/// An analog position sensor scaled to a unitless reading, typically `[0, 1]`.
pub trait Potentiometer: Send {
    /// Stable identifier, e.g. `"lift_pot"`.
    fn id(&self) -> &str;

    /// Current reading.
    fn get(&self) -> f32;
}
