//! HWC tensors.
//!
//! All activations are laid out row-major as height × width × channels, the
//! order the accelerator streams nodes in and the order the Keras `Flatten`
//! layer uses. The flat index of `(x, y, c)` is `(x * width + y) * channels + c`.

use crate::error::{KernelError, Result};

/// Spatial and channel extent of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims {
    /// Rows
    pub height: usize,
    /// Columns
    pub width: usize,
    /// Channels per position
    pub channels: usize,
}

impl Dims {
    /// Create new dims
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// A flat vector of `len` nodes, as produced by flatten and dense layers
    pub const fn vector(len: usize) -> Self {
        Self::new(1, 1, len)
    }

    /// Total number of elements
    pub const fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// True if any extent is zero
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of `(x, y, c)`
    #[inline]
    pub const fn index(&self, x: usize, y: usize, c: usize) -> usize {
        (x * self.width + y) * self.channels + c
    }
}

impl std::fmt::Display for Dims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.height, self.width, self.channels)
    }
}

/// Dense HWC tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor<T> {
    dims: Dims,
    data: Vec<T>,
}

impl<T: Copy + Default> Tensor<T> {
    /// Tensor of `dims` filled with `T::default()`
    pub fn zeros(dims: Dims) -> Self {
        Self {
            dims,
            data: vec![T::default(); dims.len()],
        }
    }
}

impl<T: Copy> Tensor<T> {
    /// Wrap an existing HWC buffer
    ///
    /// # Errors
    ///
    /// Returns error if `data.len()` differs from `dims.len()`.
    pub fn from_vec(dims: Dims, data: Vec<T>) -> Result<Self> {
        if data.len() != dims.len() {
            return Err(KernelError::LengthMismatch {
                context: "tensor",
                expected: dims.len(),
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Tensor of `dims` filled with `value`
    pub fn filled(dims: Dims, value: T) -> Self {
        Self {
            dims,
            data: vec![value; dims.len()],
        }
    }

    /// Dimensions
    pub const fn dims(&self) -> Dims {
        self.dims
    }

    /// Flat element slice in HWC order
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable flat element slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume into the flat buffer
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Element at `(x, y, c)`
    #[inline]
    pub fn at(&self, x: usize, y: usize, c: usize) -> T {
        self.data[self.dims.index(x, y, c)]
    }

    /// Reinterpret with new dims of the same element count
    ///
    /// # Errors
    ///
    /// Returns error if the element counts differ.
    pub fn reshape(self, dims: Dims) -> Result<Self> {
        if dims.len() != self.data.len() {
            return Err(KernelError::ShapeMismatch {
                context: "reshape",
                expected: dims,
                actual: self.dims,
            });
        }
        Ok(Self {
            dims,
            data: self.data,
        })
    }

    /// Map every element, keeping the dims
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor {
            dims: self.dims,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }
}
