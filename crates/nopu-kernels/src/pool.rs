//! Max-pooling.
//!
//! The pooling unit only supports non-overlapping windows (window == stride).
//! Rows or columns that do not fill a whole window are dropped, which is how
//! a 13×13 map pools to 6×6.

use crate::error::{KernelError, Result};
use crate::tensor::{Dims, Tensor};

/// Output dims of pooling `input` with a square `window` / `stride`.
///
/// # Errors
///
/// Returns error if the window is zero, differs from the stride, or does not
/// fit inside the input.
pub fn pooled_dims(input: Dims, window: usize, stride: usize) -> Result<Dims> {
    if window == 0 {
        return Err(KernelError::invalid_pool("window must be non-zero"));
    }
    if window != stride {
        return Err(KernelError::invalid_pool(format!(
            "window {window} must equal stride {stride} (non-overlapping only)"
        )));
    }
    if input.height < window || input.width < window {
        return Err(KernelError::invalid_pool(format!(
            "window {window}×{window} larger than input {input}"
        )));
    }
    Ok(Dims::new(
        (input.height - window) / stride + 1,
        (input.width - window) / stride + 1,
        input.channels,
    ))
}

/// Per-channel max over non-overlapping `window × window` blocks.
///
/// # Errors
///
/// See [`pooled_dims`].
pub fn max_pool(input: &Tensor<u8>, window: usize, stride: usize) -> Result<Tensor<u8>> {
    let out_dims = pooled_dims(input.dims(), window, stride)?;
    let mut out = Tensor::<u8>::zeros(out_dims);
    let nodes = out.as_mut_slice();

    for x in 0..out_dims.height {
        for y in 0..out_dims.width {
            for c in 0..out_dims.channels {
                let mut max = u8::MIN;
                for wx in 0..window {
                    for wy in 0..window {
                        max = max.max(input.at(x * stride + wx, y * stride + wy, c));
                    }
                }
                nodes[out_dims.index(x, y, c)] = max;
            }
        }
    }

    Ok(out)
}
