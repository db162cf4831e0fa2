use thiserror::Error;

/// Failures reported by hardware drivers.
#[derive(Debug, Error, PartialEq)]
pub enum HalError {
    #[error("{device}: value {value} outside [-1, 1]")]
    OutOfRange { device: String, value: f32 },

    #[error("{device}: hardware fault: {reason}")]
    Fault { device: String, reason: String },
}
