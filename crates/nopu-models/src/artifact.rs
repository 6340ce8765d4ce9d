//! Parameter artifact (JSON)
//!
//! The export step writes one document per trained network:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "architecture": "basic_fc",
//!   "layers": [
//!     {
//!       "index": 0,
//!       "weight_shape": [100, 784],
//!       "weights": [3, -1, ...],
//!       "bias": [12, -4, ...],
//!       "requant": { "scales": { "bias": [0.0021], "activation": 0.047 } }
//!     },
//!     {
//!       "index": 1,
//!       "weight_shape": [12, 100],
//!       "weights": [...],
//!       "bias": [...],
//!       "requant": { "fixed_point": [{ "mantissa": 1518500250, "shift": 36 }] }
//!     }
//!   ]
//! }
//! ```
//!
//! `architecture` and `requant` are optional. Weight shapes are in export
//! order: `[out, k, k, in]` for convolutions and `[out, in]` for dense layers.

use crate::catalog::Architecture;
use crate::error::{ModelError, Result};
use crate::params::{LayerParams, ParameterStore, RequantSource};
use nopu_kernels::FixedPointMultiplier;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Artifact version this crate reads and writes
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactDoc {
    format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    architecture: Option<String>,
    layers: Vec<LayerDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerDoc {
    index: usize,
    weight_shape: Vec<usize>,
    weights: Vec<i8>,
    bias: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requant: Option<RequantDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RequantDoc {
    Scales { bias: Vec<f32>, activation: f32 },
    FixedPoint(Vec<MultiplierDoc>),
}

#[derive(Debug, Serialize, Deserialize)]
struct MultiplierDoc {
    mantissa: i32,
    shift: u32,
}

impl LayerDoc {
    fn into_params(self) -> Result<LayerParams> {
        let index = self.index;
        let requant = self
            .requant
            .map(|doc| match doc {
                RequantDoc::Scales { bias, activation } => Ok(RequantSource::Scales { bias, activation }),
                RequantDoc::FixedPoint(ms) => ms
                    .into_iter()
                    .map(|m| {
                        FixedPointMultiplier::new(m.mantissa, m.shift)
                            .map_err(|e| ModelError::kernel(index, e))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(RequantSource::FixedPoint),
            })
            .transpose()?;
        let params = LayerParams::from_i8(index, self.weight_shape, &self.weights, self.bias)?;
        Ok(match requant {
            Some(r) => params.with_requant(r),
            None => params,
        })
    }

    fn from_params(params: &LayerParams) -> Self {
        let requant = params.requant().map(|r| match r {
            RequantSource::Scales { bias, activation } => RequantDoc::Scales {
                bias: bias.clone(),
                activation: *activation,
            },
            RequantSource::FixedPoint(ms) => RequantDoc::FixedPoint(
                ms.iter()
                    .map(|m| MultiplierDoc {
                        mantissa: m.mantissa(),
                        shift: m.shift(),
                    })
                    .collect(),
            ),
        });
        Self {
            index: params.index(),
            weight_shape: params.weight_shape().to_vec(),
            weights: params.weights(),
            bias: params.bias().to_vec(),
            requant,
        }
    }
}

impl ParameterStore {
    /// Parse a parameter artifact
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed, the format version is unknown,
    /// the architecture is not in the catalog, or a layer is inconsistent.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: ArtifactDoc = serde_json::from_str(json)?;
        if doc.format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedFormat {
                version: doc.format_version,
                expected: FORMAT_VERSION,
            });
        }
        let architecture = doc
            .architecture
            .as_deref()
            .map(str::parse::<Architecture>)
            .transpose()?;
        let layers = doc
            .layers
            .into_iter()
            .map(LayerDoc::into_params)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            "Parsed artifact: {} layers, architecture {:?}",
            layers.len(),
            architecture.map(|a| a.name())
        );
        Self::from_layers(architecture, layers)
    }

    /// Load a parameter artifact from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or cannot be parsed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        tracing::info!("Loading parameters from: {}", path.display());

        if !path.exists() {
            return Err(ModelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to the artifact format
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json_string(&self) -> Result<String> {
        let doc = ArtifactDoc {
            format_version: FORMAT_VERSION,
            architecture: self.architecture().map(|a| a.name().to_string()),
            layers: self.iter().map(LayerDoc::from_params).collect(),
        };
        Ok(serde_json::to_string(&doc)?)
    }

    /// Write the artifact to disk
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn write_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json_string()?)?;
        tracing::info!("Wrote {} parameter layers to {}", self.len(), path.display());
        Ok(())
    }
}
