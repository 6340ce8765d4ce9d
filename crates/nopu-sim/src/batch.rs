//! Batch evaluation over a canonical input set

use crate::engine::InferenceEngine;
use crate::error::{Result, SimError};
use nopu_models::InputSet;
use tracing::{debug, info};

/// Outcome for one input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prediction {
    /// Record index in the input set
    pub index: usize,
    /// Ground-truth label
    pub label: u8,
    /// Class the network returned
    pub predicted: usize,
}

impl Prediction {
    /// True if the prediction matches the label
    pub fn is_correct(&self) -> bool {
        usize::from(self.label) == self.predicted
    }
}

/// Results of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Per-input outcomes in input order
    pub predictions: Vec<Prediction>,
}

impl BatchReport {
    /// Number of inputs evaluated
    pub fn total(&self) -> usize {
        self.predictions.len()
    }

    /// Number of correct predictions
    pub fn correct(&self) -> usize {
        self.predictions.iter().filter(|p| p.is_correct()).count()
    }

    /// Percentage of correct predictions (0 for an empty batch)
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.predictions.is_empty() {
            return 0.0;
        }
        self.correct() as f64 * 100.0 / self.total() as f64
    }

    /// Predicted classes in input order
    pub fn sequence(&self) -> Vec<usize> {
        self.predictions.iter().map(|p| p.predicted).collect()
    }
}

/// Run the first `limit` inputs (all of them if `None`) through `engine`
///
/// # Errors
///
/// Returns error if the input set's image dims differ from the engine's or
/// an inference fails.
pub fn evaluate(engine: &InferenceEngine, inputs: &InputSet, limit: Option<usize>) -> Result<BatchReport> {
    if inputs.dims() != engine.input_dims() {
        return Err(SimError::InputShape {
            expected: engine.input_dims(),
            actual: inputs.dims(),
        });
    }

    let count = limit.map_or(inputs.len(), |n| n.min(inputs.len()));
    let mut predictions = Vec::with_capacity(count);
    for index in 0..count {
        let sample = inputs.get(index)?;
        let result = engine.infer(&sample.image)?;
        let prediction = Prediction {
            index,
            label: sample.label,
            predicted: result.predicted,
        };
        debug!(
            "input {index}: expected {}, returned {}",
            prediction.label, prediction.predicted
        );
        predictions.push(prediction);
    }

    let report = BatchReport { predictions };
    info!(
        "{}: {}/{} correct ({:.1}%)",
        engine.architecture(),
        report.correct(),
        report.total(),
        report.accuracy()
    );
    Ok(report)
}
