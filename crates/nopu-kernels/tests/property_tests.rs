//! Property-based tests for the accelerator arithmetic.
//!
//! Covers the activation clamp, fixed-point requantization and the
//! correlation/pooling kernels against adversarial integer inputs.

use nopu_kernels::{
    activate, clipped_relu, correlate, max_pool, narrow, Dims, Filter, FixedPointMultiplier,
    Tensor,
};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────────

/// A small HWC activation tensor with arbitrary node values.
fn arb_activation(max_edge: usize, max_channels: usize) -> impl Strategy<Value = Tensor<u8>> {
    (3..=max_edge, 3..=max_edge, 1..=max_channels).prop_flat_map(|(h, w, c)| {
        proptest::collection::vec(any::<u8>(), h * w * c)
            .prop_map(move |data| Tensor::from_vec(Dims::new(h, w, c), data).unwrap())
    })
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    /// The clamp always lands in the u8 range.
    #[test]
    fn clamp_stays_in_range(x in any::<i32>()) {
        let y = clipped_relu(x);
        prop_assert!((0..=255).contains(&y), "clipped_relu({x}) = {y}");
        prop_assert_eq!(i32::from(narrow(x)), y);
    }

    /// The clamp is monotonically non-decreasing.
    #[test]
    fn clamp_is_monotone(a in any::<i32>(), b in any::<i32>()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(clipped_relu(lo) <= clipped_relu(hi));
    }

    /// Inside [0, 255] the clamp is the identity.
    #[test]
    fn clamp_is_identity_in_range(x in 0i32..=255) {
        prop_assert_eq!(clipped_relu(x), x);
    }

    /// A power-of-two multiplier is exactly an arithmetic shift.
    #[test]
    fn power_of_two_multiplier_is_shift(acc in any::<i32>(), shift in 0u32..=30) {
        let m = FixedPointMultiplier::new(1, shift).unwrap();
        prop_assert_eq!(m.apply(acc), acc >> shift);
    }

    /// Requantization by a ratio ≤ 1 never increases magnitude.
    #[test]
    fn shrinking_multiplier_never_grows(acc in -100_000_000i32..100_000_000, ratio in 0.0001f64..1.0) {
        let m = FixedPointMultiplier::from_real(ratio).unwrap();
        let r = m.apply(acc);
        prop_assert!(r.unsigned_abs() <= acc.unsigned_abs() + 1);
    }

    /// Correlating with a single centre tap returns the cropped input.
    #[test]
    fn centre_tap_crops(input in arb_activation(8, 3)) {
        let c = input.dims().channels;
        let mut taps = vec![0i8; 9 * c * c];
        for ch in 0..c {
            // filter ch, kx = 1, ky = 1, ci = ch
            taps[((ch * 3 + 1) * 3 + 1) * c + ch] = 1;
        }
        let filter = Filter::new(c, 3, c, taps).unwrap();
        let out = correlate(&input, &filter).unwrap();
        let d = out.dims();
        for x in 0..d.height {
            for y in 0..d.width {
                for ch in 0..c {
                    prop_assert_eq!(out.at(x, y, ch), i32::from(input.at(x + 1, y + 1, ch)));
                }
            }
        }
    }

    /// Every pooled node is the max of its window and appears in it.
    #[test]
    fn pool_takes_window_max(input in arb_activation(9, 2)) {
        let out = max_pool(&input, 2, 2).unwrap();
        let d = out.dims();
        for x in 0..d.height {
            for y in 0..d.width {
                for c in 0..d.channels {
                    let window = [
                        input.at(2 * x, 2 * y, c),
                        input.at(2 * x, 2 * y + 1, c),
                        input.at(2 * x + 1, 2 * y, c),
                        input.at(2 * x + 1, 2 * y + 1, c),
                    ];
                    prop_assert_eq!(out.at(x, y, c), *window.iter().max().unwrap());
                }
            }
        }
    }

    /// Activating an accumulator tensor matches the scalar clamp node by node.
    #[test]
    fn activate_matches_scalar(values in proptest::collection::vec(any::<i32>(), 1..64)) {
        let n = values.len();
        let acc = Tensor::from_vec(Dims::vector(n), values.clone()).unwrap();
        let out = activate(&acc);
        for (node, v) in out.as_slice().iter().zip(values) {
            prop_assert_eq!(i32::from(*node), clipped_relu(v));
        }
    }
}
