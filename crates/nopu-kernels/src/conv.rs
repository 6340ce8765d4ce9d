//! Valid-mode correlation.
//!
//! The accelerator computes convolution without flipping the kernel
//! (cross-correlation) and only at positions where the window lies entirely
//! inside the input, so an `H × W` input and a `k × k` kernel yield
//! `(H − k + 1) × (W − k + 1)` outputs per filter.

use crate::error::{KernelError, Result};
use crate::tensor::{Dims, Tensor};

/// Kernel edge lengths the convolution engine supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelSize {
    /// 3×3 window
    K3,
    /// 5×5 window
    K5,
}

impl KernelSize {
    /// Edge length in nodes
    pub const fn edge(self) -> usize {
        match self {
            Self::K3 => 3,
            Self::K5 => 5,
        }
    }
}

impl TryFrom<usize> for KernelSize {
    type Error = KernelError;

    fn try_from(size: usize) -> Result<Self> {
        match size {
            3 => Ok(Self::K3),
            5 => Ok(Self::K5),
            _ => Err(KernelError::UnsupportedKernel { size }),
        }
    }
}

/// Convolution filter bank, `out_channels × k × k × in_channels`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    out_channels: usize,
    kernel: usize,
    in_channels: usize,
    data: Vec<i8>,
}

impl Filter {
    /// Wrap `data` in export order (`[c_out][kx][ky][c_in]`).
    ///
    /// Any square kernel is accepted here; the supported-size check belongs
    /// to layer construction (see [`KernelSize`]).
    ///
    /// # Errors
    ///
    /// Returns error if the buffer length does not match the shape.
    pub fn new(out_channels: usize, kernel: usize, in_channels: usize, data: Vec<i8>) -> Result<Self> {
        let expected = out_channels * kernel * kernel * in_channels;
        if data.len() != expected {
            return Err(KernelError::LengthMismatch {
                context: "filter",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            out_channels,
            kernel,
            in_channels,
            data,
        })
    }

    /// Number of output channels
    pub const fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Kernel edge length
    pub const fn kernel(&self) -> usize {
        self.kernel
    }

    /// Number of input channels
    pub const fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Multiply-accumulates per output node
    pub const fn fan_in(&self) -> usize {
        self.kernel * self.kernel * self.in_channels
    }

    /// Raw weights in export order
    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    #[inline]
    fn weight(&self, c: usize, kx: usize, ky: usize, ci: usize) -> i8 {
        self.data[((c * self.kernel + kx) * self.kernel + ky) * self.in_channels + ci]
    }

    /// Output dims for an input of `input` dims
    ///
    /// # Errors
    ///
    /// Returns error if the channel counts differ or the kernel does not fit.
    pub fn output_dims(&self, input: Dims) -> Result<Dims> {
        if input.channels != self.in_channels
            || input.height < self.kernel
            || input.width < self.kernel
        {
            return Err(KernelError::ShapeMismatch {
                context: "correlate",
                expected: Dims::new(
                    input.height.max(self.kernel),
                    input.width.max(self.kernel),
                    self.in_channels,
                ),
                actual: input,
            });
        }
        Ok(Dims::new(
            input.height - self.kernel + 1,
            input.width - self.kernel + 1,
            self.out_channels,
        ))
    }
}

/// Correlate `input` with every filter of the bank.
///
/// `out[x, y, c] = Σ_{kx, ky, ci} input[x+kx, y+ky, ci] · filter[c, kx, ky, ci]`
///
/// # Errors
///
/// Returns error if the input channel count differs from the filter's
/// in-channels or the input is smaller than the kernel.
pub fn correlate(input: &Tensor<u8>, filter: &Filter) -> Result<Tensor<i32>> {
    let in_dims = input.dims();
    let out_dims = filter.output_dims(in_dims)?;
    let k = filter.kernel();
    let mut out = Tensor::<i32>::zeros(out_dims);
    let acc = out.as_mut_slice();

    for x in 0..out_dims.height {
        for y in 0..out_dims.width {
            for c in 0..out_dims.channels {
                let mut sum = 0i32;
                for kx in 0..k {
                    for ky in 0..k {
                        for ci in 0..in_dims.channels {
                            let node = i32::from(input.at(x + kx, y + ky, ci));
                            sum += node * i32::from(filter.weight(c, kx, ky, ci));
                        }
                    }
                }
                acc[out_dims.index(x, y, c)] = sum;
            }
        }
    }

    Ok(out)
}
