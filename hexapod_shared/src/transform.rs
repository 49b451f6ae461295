//! Logical to physical angle mapping.

use crate::calibration::{MAX_ANGLE, ServoSpec};

/// Map a commanded (logical) angle to the angle written to the servo.
///
/// Inversion is applied before the offset, then the result is clamped to
/// `0..=180`. Out-of-range input is clamped rather than rejected.
pub fn transform(logical: i32, spec: &ServoSpec) -> u8 {
    let angle = if spec.inverted {
        MAX_ANGLE.saturating_sub(logical)
    } else {
        logical
    };
    // Clamped into 0..=180, always fits a u8.
    angle.saturating_add(spec.offset).clamp(0, MAX_ANGLE) as u8
}
