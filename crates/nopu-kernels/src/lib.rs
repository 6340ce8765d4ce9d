//! Integer arithmetic model of the NOPU inference accelerator.
//!
//! This crate has **no I/O** and no knowledge of network topologies. It is a
//! pure model of the arithmetic the co-processor performs for one layer, bit
//! for bit. Every kernel accumulates in `i32`, exactly like the hardware MAC
//! array, and nothing on this path touches floating point.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`tensor`] | HWC tensors and their [`Dims`] |
//! | [`conv`] | Valid-mode correlation over `i8` filters |
//! | [`pool`] | Non-overlapping max-pooling |
//! | [`dense`] | Matrix-vector product over transposed `i8` weights |
//! | [`requant`] | Bias add and fixed-point requantization |
//! | [`activation`] | Clipped ReLU and the `u8` narrowing cast |
//!
//! # Layer pipeline
//!
//! ```text
//! u8 input ─► correlate / matvec ─► add_bias ─► requantize ─► clipped_relu ─► narrow ─► u8 output
//!              (i32 accumulator)     (checked)    (i64 product, >> shift)      [0, 255]
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod activation;
pub mod conv;
pub mod dense;
mod error;
pub mod pool;
pub mod requant;
pub mod tensor;

pub use activation::{activate, clipped_relu, narrow};
pub use conv::{correlate, Filter, KernelSize};
pub use dense::DenseMatrix;
pub use error::{KernelError, Result};
pub use pool::max_pool;
pub use requant::{add_bias, ensure_accumulator_headroom, FixedPointMultiplier, Requantization};
pub use tensor::{Dims, Tensor};
