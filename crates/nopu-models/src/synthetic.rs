//! Synthetic parameter stores
//!
//! Stand-ins for trained parameters: an all-zero store whose every stage
//! must produce zeros, and a seeded pseudo-random store for smoke vectors
//! on the hardware bench when no trained export is at hand.

use crate::catalog::{Architecture, LayerPlan, OutputStage};
use crate::params::{LayerParams, ParameterStore, RequantSource};
use nopu_kernels::FixedPointMultiplier;

/// Zero weights and biases, identity multipliers
pub fn zeroed(arch: Architecture) -> ParameterStore {
    generate(
        arch,
        |len, outputs| (vec![0; len], vec![0; outputs]),
        |_, count| RequantSource::FixedPoint(vec![FixedPointMultiplier::identity(); count]),
    )
}

/// Deterministic pseudo-random parameters.
///
/// Weights are drawn from `[-16, 15]` and biases from `[-64, 63]`. Each layer's
/// multiplier is `0.15 / sqrt(fan_in)`, exported as float scales so the
/// conversion path is exercised too.
pub fn seeded(arch: Architecture, seed: u64) -> ParameterStore {
    let mut rng = Xoshiro::new(seed);
    generate(
        arch,
        |len, outputs| {
            let weights = (0..len).map(|_| rng.weight()).collect();
            let bias = (0..outputs).map(|_| rng.bias()).collect();
            (weights, bias)
        },
        |fan_in, count| {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let ratio = (0.15 / (fan_in as f64).sqrt()) as f32;
            RequantSource::Scales {
                bias: vec![ratio; count],
                activation: 1.0,
            }
        },
    )
}

/// Walk `arch`'s parameter layers in order, drawing tensors from
/// `tensors(weight_len, outputs)`. `requant(fan_in, count)` is only consulted
/// for requantizing layers.
fn generate(
    arch: Architecture,
    mut tensors: impl FnMut(usize, usize) -> (Vec<i8>, Vec<i32>),
    requant: impl Fn(usize, usize) -> RequantSource,
) -> ParameterStore {
    let mut layers = Vec::with_capacity(arch.parameter_layers());
    for plan in arch.layers() {
        let (shape, fan_in, outputs, count) = match *plan {
            LayerPlan::Convolution {
                input,
                kernel,
                out_channels,
            } => (
                vec![out_channels, kernel, kernel, input.channels],
                kernel * kernel * input.channels,
                out_channels,
                Some(out_channels),
            ),
            LayerPlan::Dense {
                inputs,
                outputs,
                stage,
            } => (
                vec![outputs, inputs],
                inputs,
                outputs,
                (stage == OutputStage::Requantized).then_some(1),
            ),
            LayerPlan::MaxPool { .. } | LayerPlan::Flatten { .. } => continue,
        };
        let (weights, bias) = tensors(shape.iter().product(), outputs);
        layers.push(LayerParams::generated(
            layers.len(),
            shape,
            weights,
            bias,
            count.map(|count| requant(fan_in, count)),
        ));
    }
    ParameterStore::generated(arch, layers)
}

/// xoshiro256** with splitmix64 seeding
struct Xoshiro {
    s: [u64; 4],
}

impl Xoshiro {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        for slot in &mut s {
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            *slot = z ^ (z >> 31);
            z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
        }
        Self { s }
    }

    fn next_u64(&mut self) -> u64 {
        let r = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        r
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn weight(&mut self) -> i8 {
        ((self.next_u64() >> 59) as i8) - 16
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bias(&mut self) -> i32 {
        ((self.next_u64() >> 57) as i32) - 64
    }
}
