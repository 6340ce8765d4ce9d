//! Canonical input sets
//!
//! The hardware test bench and the simulator read the same decoded images
//! from one flat file of fixed-size records:
//!
//! ```text
//! ┌───────┬──────────────────────────────┐
//! │ label │ H × W × C pixels (HWC order) │   repeated
//! │  u8   │ u8 ...                       │
//! └───────┴──────────────────────────────┘
//! ```
//!
//! The record size follows from the architecture's input dims. Images are
//! sliced out of one shared buffer without copying.

use crate::error::{ModelError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use nopu_kernels::{Dims, Tensor};
use std::fs;
use std::path::Path;

/// One labelled image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Ground-truth class
    pub label: u8,
    /// Decoded image
    pub image: Tensor<u8>,
}

/// Fixed-size labelled images backed by a single buffer
#[derive(Debug, Clone)]
pub struct InputSet {
    dims: Dims,
    data: Bytes,
}

impl InputSet {
    /// Interpret `data` as records of `dims`-sized images
    ///
    /// # Errors
    ///
    /// Returns error if `dims` is empty or the buffer ends in a partial record.
    pub fn from_bytes(dims: Dims, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if dims.is_empty() {
            return Err(ModelError::invalid_inputs(format!("empty image dims {dims}")));
        }
        let record = dims.len() + 1;
        if data.len() % record != 0 {
            return Err(ModelError::invalid_inputs(format!(
                "{} bytes is not a whole number of {record}-byte records ({dims} + label)",
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Read an input set file
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or malformed.
    pub fn from_file<P: AsRef<Path>>(path: P, dims: Dims) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let set = Self::from_bytes(dims, fs::read(path)?)?;
        tracing::info!("Loaded {} inputs ({dims}) from {}", set.len(), path.display());
        Ok(set)
    }

    /// Encode samples into the record format
    ///
    /// # Errors
    ///
    /// Returns error if a sample's dims differ from `dims`.
    pub fn from_samples(dims: Dims, samples: &[Sample]) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(samples.len() * (dims.len() + 1));
        for (i, sample) in samples.iter().enumerate() {
            if sample.image.dims() != dims {
                return Err(ModelError::invalid_inputs(format!(
                    "sample {i} is {}, expected {dims}",
                    sample.image.dims()
                )));
            }
            buf.put_u8(sample.label);
            buf.put_slice(sample.image.as_slice());
        }
        Self::from_bytes(dims, buf.freeze())
    }

    /// Image dims
    pub const fn dims(&self) -> Dims {
        self.dims
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.data.len() / (self.dims.len() + 1)
    }

    /// True if there are no records
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the record buffer to disk
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, &self.data)?;
        Ok(())
    }

    /// Label of record `index`
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InputIndex`] if out of range.
    pub fn label(&self, index: usize) -> Result<u8> {
        Ok(self.record(index)?[0])
    }

    /// Decode record `index`
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InputIndex`] if out of range.
    pub fn get(&self, index: usize) -> Result<Sample> {
        let record = self.record(index)?;
        let image = Tensor::from_vec(self.dims, record.slice(1..).to_vec())
            .map_err(|e| ModelError::invalid_inputs(e.to_string()))?;
        Ok(Sample {
            label: record[0],
            image,
        })
    }

    /// Iterate over all samples in file order
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.len()).filter_map(|i| self.get(i).ok())
    }

    fn record(&self, index: usize) -> Result<Bytes> {
        let count = self.len();
        if index >= count {
            return Err(ModelError::InputIndex { index, count });
        }
        let size = self.dims.len() + 1;
        Ok(self.data.slice(index * size..(index + 1) * size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Dims {
        Dims::new(2, 2, 1)
    }

    #[test]
    fn test_records_are_sliced_in_order() {
        let raw = vec![7u8, 1, 2, 3, 4, 9, 5, 6, 7, 8];
        let set = InputSet::from_bytes(tiny(), raw).unwrap();
        assert_eq!(set.len(), 2);

        let second = set.get(1).unwrap();
        assert_eq!(second.label, 9);
        assert_eq!(second.image.as_slice(), &[5, 6, 7, 8]);
        assert_eq!(second.image.at(1, 0, 0), 7);
        assert_eq!(set.label(0).unwrap(), 7);
    }

    #[test]
    fn test_partial_record_rejected() {
        let err = InputSet::from_bytes(tiny(), vec![0u8; 7]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInputSet { .. }));
    }

    #[test]
    fn test_index_out_of_range() {
        let set = InputSet::from_bytes(tiny(), vec![0u8; 5]).unwrap();
        assert!(matches!(
            set.get(1),
            Err(ModelError::InputIndex { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_samples_round_trip_through_file() {
        let samples: Vec<Sample> = (0..3u8)
            .map(|k| Sample {
                label: k,
                image: Tensor::filled(tiny(), k * 10),
            })
            .collect();
        let set = InputSet::from_samples(tiny(), &samples).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs.bin");
        set.write_file(&path).unwrap();

        let reloaded = InputSet::from_file(&path, tiny()).unwrap();
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), samples);
    }

    #[test]
    fn test_sample_dims_checked() {
        let wrong = Sample {
            label: 0,
            image: Tensor::filled(Dims::new(3, 3, 1), 0),
        };
        assert!(InputSet::from_samples(tiny(), &[wrong]).is_err());
    }
}
