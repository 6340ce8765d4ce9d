//! Activation buffer
//!
//! Every layer's output from one inference call, kept for inspection and for
//! dumping in the trace format the hardware emulator prints.

use crate::error::{Result, SimError};
use nopu_kernels::Dims;
use nopu_models::{Architecture, LayerKind};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header lines written before the `<index> <value>` records of a dump
pub const DUMP_HEADER_LINES: usize = 3;

/// File name of the simulator dump for layer position `layer`
pub fn dump_file_name(layer: usize) -> String {
    format!("simulator_layer_{layer}.txt")
}

/// Values a layer produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerValues {
    /// Clipped `u8` nodes fed to the next layer
    Activations(Vec<u8>),
    /// Raw `i32` logits of the final layer
    Logits(Vec<i32>),
}

/// Output of one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerOutput {
    /// Layer kind
    pub kind: LayerKind,
    /// Output dims (HWC; vectors are `1 × 1 × n`)
    pub dims: Dims,
    /// Output values in HWC order
    pub values: LayerValues,
    /// Requantized accumulators before the clamp, when captured
    pub accumulators: Option<Vec<i32>>,
}

impl LayerOutput {
    /// Number of output nodes
    pub fn len(&self) -> usize {
        match &self.values {
            LayerValues::Activations(v) => v.len(),
            LayerValues::Logits(v) => v.len(),
        }
    }

    /// True if the layer has no outputs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at flat index `i`, widened
    pub fn value(&self, i: usize) -> Option<i32> {
        match &self.values {
            LayerValues::Activations(v) => v.get(i).map(|x| i32::from(*x)),
            LayerValues::Logits(v) => v.get(i).copied(),
        }
    }

    /// All values, widened
    pub fn values(&self) -> Vec<i32> {
        (0..self.len()).filter_map(|i| self.value(i)).collect()
    }

    /// `count` values starting at `offset`, clipped to the layer
    pub fn window(&self, offset: usize, count: usize) -> Vec<(usize, i32)> {
        let end = offset.saturating_add(count).min(self.len());
        (offset.min(end)..end)
            .filter_map(|i| self.value(i).map(|v| (i, v)))
            .collect()
    }
}

/// Per-layer outputs of one inference call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationBuffer {
    layers: Vec<LayerOutput>,
}

impl ActivationBuffer {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, output: LayerOutput) {
        self.layers.push(output);
    }

    /// Number of recorded layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Output of layer position `layer`
    ///
    /// # Errors
    ///
    /// Returns [`SimError::LayerIndex`] if out of range.
    pub fn layer(&self, layer: usize) -> Result<&LayerOutput> {
        self.layers.get(layer).ok_or(SimError::LayerIndex {
            layer,
            count: self.layers.len(),
        })
    }

    /// Outputs in execution order
    pub fn iter(&self) -> impl Iterator<Item = &LayerOutput> {
        self.layers.iter()
    }

    /// Final-layer logits, if the network produced any
    pub fn logits(&self) -> Option<&[i32]> {
        match self.layers.last().map(|l| &l.values) {
            Some(LayerValues::Logits(v)) => Some(v),
            _ => None,
        }
    }

    /// Write one layer as a trace dump: a fixed header of
    /// [`DUMP_HEADER_LINES`] lines, then one `<index> <value>` line per node.
    ///
    /// # Errors
    ///
    /// Returns error if the layer is out of range or the write fails.
    pub fn write_layer_dump<W: Write>(
        &self,
        arch: Architecture,
        layer: usize,
        writer: &mut W,
    ) -> Result<()> {
        let output = self.layer(layer)?;
        writeln!(writer, "# nopu simulator dump")?;
        writeln!(writer, "# {arch} layer {layer} ({})", output.kind)?;
        writeln!(writer, "# dims {} ({} values)", output.dims, output.len())?;
        for (i, v) in output.values().iter().enumerate() {
            writeln!(writer, "{i} {v}")?;
        }
        Ok(())
    }

    /// Write every layer to `dir/simulator_layer_<i>.txt`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or a write fails.
    pub fn dump_to_dir<P: AsRef<Path>>(&self, arch: Architecture, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut paths = Vec::with_capacity(self.layers.len());
        for layer in 0..self.layers.len() {
            let path = dir.join(dump_file_name(layer));
            let mut writer = BufWriter::new(fs::File::create(&path)?);
            self.write_layer_dump(arch, layer, &mut writer)?;
            writer.flush()?;
            paths.push(path);
        }
        tracing::info!("Dumped {} layers to {}", paths.len(), dir.display());
        Ok(paths)
    }
}
