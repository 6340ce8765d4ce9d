//! Bit-exact simulator for the NOPU inference accelerator
//!
//! Runs a catalog network on one image with exactly the integer arithmetic
//! the co-processor performs, keeps every layer's output, and diffs those
//! outputs against traces captured from the hardware emulator.
//!
//! ```text
//! Architecture + ParameterStore ──► InferenceEngine ──► (class, ActivationBuffer)
//!                                                              │ write_layer_dump
//!                                                              ▼
//!                            emulator trace ──► TraceComparator ──► ComparisonReport
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nopu_models::{Architecture, InputSet, ParameterStore};
//! use nopu_sim::InferenceEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let arch = Architecture::Cifar;
//! let store = ParameterStore::from_json_file("cifar_params.json")?;
//! let engine = InferenceEngine::new(arch, &store)?;
//!
//! let inputs = InputSet::from_file("cifar_inputs.bin", arch.input_dims())?;
//! let sample = inputs.get(0)?;
//! let result = engine.infer(&sample.image)?;
//! println!("EXPECTED {}, RETURNED {}", sample.label, result.predicted);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod batch;
mod buffer;
mod engine;
mod error;
pub mod trace;

pub use batch::{evaluate, BatchReport, Prediction};
pub use buffer::{
    dump_file_name, ActivationBuffer, LayerOutput, LayerValues, DUMP_HEADER_LINES,
};
pub use engine::{argmax, infer, EngineOptions, InferenceEngine, InferenceResult};
pub use error::{Result, SimError};
pub use trace::{ComparisonReport, Mismatch, ParseWarning, TraceComparator, TraceSide};
