//! Clipped ReLU and the narrowing cast to `u8`.

use crate::tensor::Tensor;

/// Upper clip of the activation unit
pub const ACTIVATION_MAX: i32 = u8::MAX as i32;

/// `clamp(x, 0, 255)`
#[inline]
pub const fn clipped_relu(x: i32) -> i32 {
    if x < 0 {
        0
    } else if x > ACTIVATION_MAX {
        ACTIVATION_MAX
    } else {
        x
    }
}

/// Narrow an accumulator to the `u8` node the next layer consumes.
///
/// Values outside `[0, 255]` are clipped first, so the cast never wraps.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub const fn narrow(x: i32) -> u8 {
    clipped_relu(x) as u8
}

/// Clipped ReLU + narrow over a whole accumulator tensor
pub fn activate(acc: &Tensor<i32>) -> Tensor<u8> {
    acc.map(narrow)
}
