//! Bias addition and fixed-point requantization.
//!
//! ## Arithmetic
//!
//! The requantization unit has no floating point. A real multiplier `m`
//! (`bias_scale / activation_scale`) is programmed as an integer mantissa
//! and a right shift, and each accumulator is rescaled as
//!
//! ```text
//! r = (acc as i64 * mantissa) >> shift        // arithmetic shift, floors toward −∞
//! ```
//!
//! with the 64-bit product saturated back to `i32`. There is no rounding
//! term, so `−1 · 0.5` gives `−1` and `3 · 0.5` gives `1`. Converting scales
//! to `(mantissa, shift)` happens once when parameters are loaded; the
//! inference path itself is integer only.

use crate::error::{KernelError, Result};

/// Largest shift the multiplier unit accepts
pub const MAX_SHIFT: u32 = 62;

/// Exclusive upper bound for the mantissa (it must fit a positive `i32`)
const MANTISSA_LIMIT: f64 = 2_147_483_648.0;

/// Integer multiplier with an implied right shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPointMultiplier {
    mantissa: i32,
    shift: u32,
}

impl FixedPointMultiplier {
    /// Multiply by one
    pub const IDENTITY: Self = Self {
        mantissa: 1,
        shift: 0,
    };

    /// Multiplier from a raw hardware configuration value
    ///
    /// # Errors
    ///
    /// Returns error if the mantissa is not positive or the shift exceeds [`MAX_SHIFT`].
    pub fn new(mantissa: i32, shift: u32) -> Result<Self> {
        if mantissa <= 0 {
            return Err(KernelError::invalid_multiplier(format!(
                "mantissa must be positive, got {mantissa}"
            )));
        }
        if shift > MAX_SHIFT {
            return Err(KernelError::invalid_multiplier(format!(
                "shift {shift} exceeds {MAX_SHIFT}"
            )));
        }
        Ok(Self { mantissa, shift })
    }

    /// Multiply by one
    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Closest fixed-point representation of `real`.
    ///
    /// Picks the largest shift for which the rounded mantissa still fits in
    /// 31 bits, which keeps the most significant bits of the scale.
    ///
    /// # Errors
    ///
    /// Returns error if `real` is not finite and positive, is too large for a
    /// 31-bit mantissa, or is too small to be represented at [`MAX_SHIFT`].
    pub fn from_real(real: f64) -> Result<Self> {
        if !real.is_finite() || real <= 0.0 {
            return Err(KernelError::invalid_multiplier(format!(
                "scale ratio must be finite and positive, got {real}"
            )));
        }

        let mut best = None;
        let mut power = 1.0f64;
        for shift in 0..=MAX_SHIFT {
            let scaled = (real * power).round();
            if scaled >= MANTISSA_LIMIT {
                break;
            }
            best = Some((scaled, shift));
            power *= 2.0;
        }

        match best {
            Some((scaled, shift)) if scaled >= 1.0 => Ok(Self {
                mantissa: mantissa_from_f64(scaled),
                shift,
            }),
            Some(_) => Err(KernelError::invalid_multiplier(format!(
                "scale ratio {real} underflows at shift {MAX_SHIFT}"
            ))),
            None => Err(KernelError::invalid_multiplier(format!(
                "scale ratio {real} does not fit a 31-bit mantissa"
            ))),
        }
    }

    /// Derive from quantization scales (`bias_scale / activation_scale`)
    ///
    /// # Errors
    ///
    /// See [`FixedPointMultiplier::from_real`].
    pub fn from_scales(bias_scale: f32, activation_scale: f32) -> Result<Self> {
        Self::from_real(f64::from(bias_scale) / f64::from(activation_scale))
    }

    /// Integer mantissa
    pub const fn mantissa(&self) -> i32 {
        self.mantissa
    }

    /// Right shift applied after the multiply
    pub const fn shift(&self) -> u32 {
        self.shift
    }

    /// The real value this multiplier represents
    #[allow(clippy::cast_precision_loss)]
    pub fn as_real(&self) -> f64 {
        f64::from(self.mantissa) / (1u64 << self.shift) as f64
    }

    /// Rescale one accumulator
    #[inline]
    pub fn apply(&self, acc: i32) -> i32 {
        let product = i64::from(acc) * i64::from(self.mantissa);
        saturate(product >> self.shift)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

// Caller guarantees 1.0 <= value < 2^31.
#[allow(clippy::cast_possible_truncation)]
fn mantissa_from_f64(value: f64) -> i32 {
    value as i32
}

impl Default for FixedPointMultiplier {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Multipliers for one layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requantization {
    /// One multiplier for every node (dense layers)
    PerTensor(FixedPointMultiplier),
    /// One multiplier per output channel (convolution layers)
    PerChannel(Vec<FixedPointMultiplier>),
}

impl Requantization {
    /// Dense layers take exactly one multiplier
    ///
    /// # Errors
    ///
    /// Returns error if `multipliers.len() != 1`.
    pub fn for_dense(multipliers: &[FixedPointMultiplier]) -> Result<Self> {
        match multipliers {
            [m] => Ok(Self::PerTensor(*m)),
            _ => Err(KernelError::MultiplierCount {
                expected: 1,
                actual: multipliers.len(),
            }),
        }
    }

    /// Convolution layers take one multiplier per output channel
    ///
    /// # Errors
    ///
    /// Returns error if `multipliers.len() != out_channels`.
    pub fn for_convolution(multipliers: &[FixedPointMultiplier], out_channels: usize) -> Result<Self> {
        if multipliers.len() != out_channels {
            return Err(KernelError::MultiplierCount {
                expected: out_channels,
                actual: multipliers.len(),
            });
        }
        Ok(Self::PerChannel(multipliers.to_vec()))
    }

    /// Number of multipliers
    pub fn len(&self) -> usize {
        match self {
            Self::PerTensor(_) => 1,
            Self::PerChannel(ms) => ms.len(),
        }
    }

    /// True if there are no multipliers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rescale a whole HWC accumulator buffer in place.
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is not a whole number of channel groups.
    pub fn apply(&self, acc: &mut [i32]) -> Result<()> {
        match self {
            Self::PerTensor(m) => {
                for v in acc.iter_mut() {
                    *v = m.apply(*v);
                }
            }
            Self::PerChannel(ms) => {
                if ms.is_empty() || acc.len() % ms.len() != 0 {
                    return Err(KernelError::LengthMismatch {
                        context: "per-channel requantization",
                        expected: acc.len().next_multiple_of(ms.len().max(1)),
                        actual: acc.len(),
                    });
                }
                for group in acc.chunks_exact_mut(ms.len()) {
                    for (v, m) in group.iter_mut().zip(ms) {
                        *v = m.apply(*v);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Add one bias per output node (dense) or per channel (HWC convolution
/// output, where the bias index is `flat_index % bias.len()`).
///
/// # Errors
///
/// Returns error if the buffer is not a whole number of bias groups or an
/// addition would wrap.
pub fn add_bias(acc: &mut [i32], bias: &[i32]) -> Result<()> {
    if bias.is_empty() || acc.len() % bias.len() != 0 {
        return Err(KernelError::LengthMismatch {
            context: "bias",
            expected: acc.len().next_multiple_of(bias.len().max(1)),
            actual: acc.len(),
        });
    }
    for group in acc.chunks_exact_mut(bias.len()) {
        for (v, b) in group.iter_mut().zip(bias) {
            let acc = *v;
            *v = acc
                .checked_add(*b)
                .ok_or_else(|| KernelError::overflow(format!("{acc} + bias {b}")))?;
        }
    }
    Ok(())
}

/// Check that `fan_in` products of `u8 × i8` plus the largest bias cannot
/// leave the `i32` range.
///
/// # Errors
///
/// Returns error if the worst case exceeds `i32::MAX`.
pub fn ensure_accumulator_headroom(fan_in: usize, bias: &[i32]) -> Result<()> {
    let per_product = i128::from(u8::MAX) * 128;
    let max_bias = bias.iter().map(|b| i128::from(*b).abs()).max().unwrap_or(0);
    let worst = per_product * i128::try_from(fan_in).unwrap_or(i128::MAX / per_product) + max_bias;
    if worst > i128::from(i32::MAX) {
        return Err(KernelError::overflow(format!(
            "fan-in {fan_in} with max |bias| {max_bias} reaches {worst}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = FixedPointMultiplier::identity();
        for v in [-5, 0, 7, 255, i32::MAX, i32::MIN] {
            assert_eq!(m.apply(v), v);
        }
        assert_eq!(FixedPointMultiplier::from_real(1.0).unwrap().apply(12345), 12345);
    }

    #[test]
    fn test_from_real_keeps_precision() {
        let m = FixedPointMultiplier::from_real(0.5).unwrap();
        assert_eq!(m.shift(), 31);
        assert_eq!(m.mantissa(), 1 << 30);
        assert!((m.as_real() - 0.5).abs() < 1e-12);

        let m = FixedPointMultiplier::from_real(0.003_921_568_6).unwrap();
        assert!(m.mantissa() >= 1 << 30);
        assert!((m.as_real() - 0.003_921_568_6).abs() < 1e-9);
    }

    #[test]
    fn test_shift_floors() {
        let half = FixedPointMultiplier::new(1, 1).unwrap();
        assert_eq!(half.apply(3), 1);
        assert_eq!(half.apply(-1), -1);
        assert_eq!(half.apply(-3), -2);
    }

    #[test]
    fn test_from_real_rejects_unrepresentable() {
        assert!(FixedPointMultiplier::from_real(0.0).is_err());
        assert!(FixedPointMultiplier::from_real(-1.0).is_err());
        assert!(FixedPointMultiplier::from_real(f64::NAN).is_err());
        assert!(FixedPointMultiplier::from_real(4.0e9).is_err());
        assert!(FixedPointMultiplier::from_real(1.0e-30).is_err());
        assert!(FixedPointMultiplier::new(0, 3).is_err());
        assert!(FixedPointMultiplier::new(1, 63).is_err());
    }

    #[test]
    fn test_from_scales() {
        let m = FixedPointMultiplier::from_scales(0.02, 0.08).unwrap();
        assert_eq!(m.apply(400), 100);
    }

    #[test]
    fn test_multiplier_counts() {
        let m = FixedPointMultiplier::IDENTITY;
        assert!(Requantization::for_dense(&[m]).is_ok());
        assert_eq!(
            Requantization::for_dense(&[m, m]).unwrap_err(),
            KernelError::MultiplierCount { expected: 1, actual: 2 }
        );
        assert!(Requantization::for_convolution(&[m; 16], 16).is_ok());
        assert_eq!(
            Requantization::for_convolution(&[m; 3], 16).unwrap_err(),
            KernelError::MultiplierCount { expected: 16, actual: 3 }
        );
    }

    #[test]
    fn test_per_channel_apply() {
        let halve = FixedPointMultiplier::new(1, 1).unwrap();
        let keep = FixedPointMultiplier::IDENTITY;
        let rq = Requantization::for_convolution(&[keep, halve], 2).unwrap();
        let mut acc = vec![10, 10, 20, 20, 30, 30];
        rq.apply(&mut acc).unwrap();
        assert_eq!(acc, vec![10, 5, 20, 10, 30, 15]);
    }

    #[test]
    fn test_bias_per_channel() {
        let mut acc = vec![0, 0, 0, 0, 0, 0];
        add_bias(&mut acc, &[1, -2, 3]).unwrap();
        assert_eq!(acc, vec![1, -2, 3, 1, -2, 3]);
        assert!(add_bias(&mut acc, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_bias_overflow_is_reported() {
        let mut acc = vec![i32::MAX];
        assert!(matches!(
            add_bias(&mut acc, &[1]),
            Err(KernelError::AccumulatorOverflow { .. })
        ));
    }

    #[test]
    fn test_headroom() {
        assert!(ensure_accumulator_headroom(10_816, &[1_000_000]).is_ok());
        assert!(ensure_accumulator_headroom(70_000, &[]).is_err());
    }
}
