//! Fully connected layers.

use crate::error::{KernelError, Result};

/// Weight matrix stored `inputs × outputs` (row per input node).
///
/// Parameter exports store dense kernels `outputs × inputs`; the hardware
/// walks the input vector once and fans each node out to every output, so
/// the matrix is kept transposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseMatrix {
    inputs: usize,
    outputs: usize,
    data: Vec<i8>,
}

impl DenseMatrix {
    /// Wrap a buffer already in `inputs × outputs` order
    ///
    /// # Errors
    ///
    /// Returns error if the buffer length does not match.
    pub fn new(inputs: usize, outputs: usize, data: Vec<i8>) -> Result<Self> {
        if data.len() != inputs * outputs {
            return Err(KernelError::LengthMismatch {
                context: "dense matrix",
                expected: inputs * outputs,
                actual: data.len(),
            });
        }
        Ok(Self {
            inputs,
            outputs,
            data,
        })
    }

    /// Build from the export layout (`outputs × inputs`), transposing
    ///
    /// # Errors
    ///
    /// Returns error if the buffer length does not match.
    pub fn from_export(outputs: usize, inputs: usize, exported: &[i8]) -> Result<Self> {
        if exported.len() != inputs * outputs {
            return Err(KernelError::LengthMismatch {
                context: "dense export",
                expected: inputs * outputs,
                actual: exported.len(),
            });
        }
        let mut data = vec![0i8; exported.len()];
        for o in 0..outputs {
            for i in 0..inputs {
                data[i * outputs + o] = exported[o * inputs + i];
            }
        }
        Ok(Self {
            inputs,
            outputs,
            data,
        })
    }

    /// Input node count
    pub const fn inputs(&self) -> usize {
        self.inputs
    }

    /// Output node count
    pub const fn outputs(&self) -> usize {
        self.outputs
    }

    /// Weight connecting input `i` to output `o`
    #[inline]
    pub fn weight(&self, i: usize, o: usize) -> i8 {
        self.data[i * self.outputs + o]
    }

    /// `out[o] = Σ_i input[i] · w[i, o]`
    ///
    /// # Errors
    ///
    /// Returns error if `input.len()` differs from the matrix inputs.
    pub fn matvec(&self, input: &[u8]) -> Result<Vec<i32>> {
        if input.len() != self.inputs {
            return Err(KernelError::LengthMismatch {
                context: "dense input",
                expected: self.inputs,
                actual: input.len(),
            });
        }

        let mut acc = vec![0i32; self.outputs];
        for (node, row) in input.iter().zip(self.data.chunks_exact(self.outputs)) {
            let node = i32::from(*node);
            if node == 0 {
                continue;
            }
            for (sum, &w) in acc.iter_mut().zip(row) {
                *sum += node * i32::from(w);
            }
        }
        Ok(acc)
    }
}
