#![deny(unsafe_code)]

//! Network catalog and quantized parameters for the NOPU simulator
//!
//! This crate knows *which* networks the accelerator runs and *with what*
//! parameters; the arithmetic lives in `nopu-kernels` and execution in
//! `nopu-sim`.
//!
//! - [`catalog`]: the fixed set of supported architectures, each with a
//!   fully declared layer plan
//! - [`ParameterStore`]: trained tensors keyed by logical layer index,
//!   loaded from a JSON artifact
//! - [`ArchitectureGraph`]: a plan resolved against a store, with every
//!   configuration error raised up front
//! - [`InputSet`]: canonical labelled images shared with the hardware bench
//!
//! # Example
//!
//! ```no_run
//! use nopu_models::{Architecture, ArchitectureGraph, ParameterStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let arch: Architecture = "cifar".parse()?;
//! let store = ParameterStore::from_json_file("cifar_params.json")?;
//! let graph = ArchitectureGraph::build(arch, &store)?;
//!
//! println!("{arch}: {} layers", graph.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod artifact;
pub mod catalog;
mod error;
mod graph;
mod inputs;
mod params;
pub mod synthetic;

pub use artifact::FORMAT_VERSION;
pub use catalog::{Architecture, LayerPlan, OutputStage};
pub use error::{ModelError, Result};
pub use graph::{
    ArchitectureGraph, ConvolutionLayer, DenseLayer, DenseStage, LayerDescriptor, LayerKind,
    PoolLayer,
};
pub use inputs::{InputSet, Sample};
pub use params::{LayerParams, ParameterStore, RequantSource};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{Architecture, ArchitectureGraph, InputSet, ParameterStore, Result, Sample};
}
