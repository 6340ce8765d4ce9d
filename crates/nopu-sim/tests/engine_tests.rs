//! End-to-end tests for the inference engine
//!
//! Runs every catalog network through the simulator with synthetic
//! parameters and checks the properties the hardware bench relies on.

use nopu_kernels::{Dims, FixedPointMultiplier, KernelError, Tensor};
use nopu_models::{
    synthetic, Architecture, InputSet, LayerParams, ModelError, ParameterStore, RequantSource,
    Sample,
};
use nopu_sim::{
    evaluate, infer, EngineOptions, InferenceEngine, LayerValues, SimError, TraceComparator, DUMP_HEADER_LINES,
};

fn identity(count: usize) -> RequantSource {
    RequantSource::FixedPoint(vec![FixedPointMultiplier::identity(); count])
}

/// `seeded` weights with every bias zeroed and unit multipliers
fn seeded_without_bias(arch: Architecture) -> ParameterStore {
    let seeded = synthetic::seeded(arch, 99);
    let layers = seeded.iter().map(|l| {
        let bias = vec![0; l.bias().len()];
        let count = l.requant().map(RequantSource::len);
        let layer =
            LayerParams::new(l.index(), l.weight_shape().to_vec(), l.raw_weights().clone(), bias)
                .unwrap();
        match count {
            Some(n) => layer.with_requant(identity(n)),
            None => layer,
        }
    });
    ParameterStore::from_layers(Some(arch), layers.collect::<Vec<_>>()).unwrap()
}

fn pattern(dims: Dims) -> Tensor<u8> {
    let data = (0..dims.len()).map(|i| ((i * 37 + 11) % 256) as u8).collect();
    Tensor::from_vec(dims, data).unwrap()
}

#[test]
fn test_zero_input_gives_zero_everywhere() {
    for arch in Architecture::all() {
        for store in [synthetic::zeroed(*arch), seeded_without_bias(*arch)] {
            let image = Tensor::zeros(arch.input_dims());
            let result = infer(*arch, &image, &store).unwrap();

            assert_eq!(result.activations.len(), arch.layers().len());
            for (i, layer) in result.activations.iter().enumerate() {
                assert!(
                    layer.values().iter().all(|v| *v == 0),
                    "{arch}: layer {i} ({}) not all zero",
                    layer.kind
                );
            }
            // All logits tie at zero, so the first class wins
            assert_eq!(result.predicted, 0, "{arch}");
        }
    }
}

#[test]
fn test_layer_dims_follow_catalog() {
    let arch = Architecture::CifarWide;
    let result = infer(arch, &pattern(arch.input_dims()), &synthetic::seeded(arch, 5)).unwrap();
    let dims: Vec<Dims> = result.activations.iter().map(|l| l.dims).collect();
    assert_eq!(
        dims,
        vec![
            Dims::new(30, 30, 32),
            Dims::new(15, 15, 32),
            Dims::new(13, 13, 64),
            Dims::new(6, 6, 64),
            Dims::vector(2304),
            Dims::vector(64),
            Dims::vector(12),
        ]
    );
    assert!(matches!(
        result.activations.layer(6).unwrap().values,
        LayerValues::Logits(_)
    ));
    assert_eq!(result.activations.logits().unwrap().len(), 12);
}

#[test]
fn test_hidden_layers_are_u8_activations() {
    for arch in Architecture::all() {
        let result =
            infer(*arch, &pattern(arch.input_dims()), &synthetic::seeded(*arch, 11)).unwrap();
        let hidden = result.activations.len() - 1;
        for layer in result.activations.iter().take(hidden) {
            assert!(matches!(layer.values, LayerValues::Activations(_)));
        }
    }
}

#[test]
fn test_inference_is_deterministic() {
    let arch = Architecture::Cifar;
    let store = synthetic::seeded(arch, 2024);
    let engine = InferenceEngine::new(arch, &store).unwrap();
    let image = pattern(arch.input_dims());

    let first = engine.infer(&image).unwrap();
    let second = engine.infer(&image).unwrap();
    assert_eq!(first, second);

    let dir = tempfile::tempdir().unwrap();
    let a = first.activations.dump_to_dir(arch, dir.path().join("a")).unwrap();
    let b = second.activations.dump_to_dir(arch, dir.path().join("b")).unwrap();
    for (pa, pb) in a.iter().zip(&b) {
        assert_eq!(std::fs::read(pa).unwrap(), std::fs::read(pb).unwrap());
    }
}

#[test]
fn test_dump_matches_emulator_trace() {
    let arch = Architecture::BasicFc;
    let result = infer(arch, &pattern(arch.input_dims()), &synthetic::seeded(arch, 8)).unwrap();

    let mut dump = Vec::new();
    result
        .activations
        .write_layer_dump(arch, 1, &mut dump)
        .unwrap();
    let dump = String::from_utf8(dump).unwrap();

    // The emulator prints a prologue of its own and `i: value` records
    let values = result.activations.layer(1).unwrap().values();
    let mut emulator = String::from("loading weights\nstarting layer\n");
    for (i, v) in values.iter().enumerate() {
        emulator.push_str(&format!("{i}: {v}\n"));
    }

    let comparator = TraceComparator::new()
        .with_expected_header(DUMP_HEADER_LINES)
        .with_sync_on_zero(true);
    let report = comparator.compare(&dump, &emulator);
    assert!(report.is_clean());
    assert!(report.warnings.is_empty());
    assert_eq!(report.compared, values.len());

    // Corrupt one node
    let tampered = emulator.replacen("\n3: ", "\n3: 1", 1);
    let report = comparator.compare(&dump, &tampered);
    let first = report.first_divergence().unwrap();
    assert_eq!(first.index, 3);
}

/// Routes pixel `k` to hidden node `k` and hidden node `k` to class `k`
fn routing_store() -> ParameterStore {
    let mut w0 = vec![0i8; 100 * 784];
    let mut w1 = vec![0i8; 12 * 100];
    for k in 0..10 {
        w0[k * 784 + k] = 1;
        w1[k * 100 + k] = 1;
    }
    let hidden = LayerParams::from_i8(0, vec![100, 784], &w0, vec![0; 100])
        .unwrap()
        .with_requant(identity(1));
    let logits = LayerParams::from_i8(1, vec![12, 100], &w1, vec![0; 12]).unwrap();
    ParameterStore::from_layers(Some(Architecture::BasicFc), [hidden, logits]).unwrap()
}

#[test]
fn test_batch_prediction_sequence() {
    let arch = Architecture::BasicFc;
    let samples: Vec<Sample> = (0..12u8)
        .map(|k| {
            let mut image = Tensor::zeros(arch.input_dims());
            image.as_mut_slice()[usize::from(k % 10)] = 200;
            Sample {
                label: k % 10,
                image,
            }
        })
        .collect();
    let inputs = InputSet::from_samples(arch.input_dims(), &samples).unwrap();

    let engine = InferenceEngine::new(arch, &routing_store()).unwrap();
    let report = evaluate(&engine, &inputs, Some(10)).unwrap();

    assert_eq!(report.sequence(), (0..10).collect::<Vec<_>>());
    assert_eq!(report.correct(), 10);
    assert!((report.accuracy() - 100.0).abs() < f64::EPSILON);

    let all = evaluate(&engine, &inputs, None).unwrap();
    assert_eq!(all.total(), 12);
}

#[test]
fn test_batch_rejects_wrong_input_dims() {
    let engine =
        InferenceEngine::new(Architecture::Cifar, &synthetic::zeroed(Architecture::Cifar))
            .unwrap();
    let inputs = InputSet::from_bytes(Dims::new(28, 28, 1), vec![0u8; 785]).unwrap();
    assert!(matches!(
        evaluate(&engine, &inputs, None),
        Err(SimError::InputShape { .. })
    ));
}

#[test]
fn test_unknown_architecture() {
    let err = "lenet".parse::<Architecture>().unwrap_err();
    assert!(matches!(err, ModelError::UnknownArchitecture { .. }));
}

#[test]
fn test_configuration_errors_surface_at_construction() {
    let arch = Architecture::BasicConv;
    let full = synthetic::zeroed(arch);

    let missing = ParameterStore::from_layers(
        None,
        full.iter().filter(|l| l.index() != 2).cloned().collect::<Vec<_>>(),
    )
    .unwrap();
    assert!(matches!(
        InferenceEngine::new(arch, &missing),
        Err(SimError::Model(ModelError::MissingLayer { index: 2 }))
    ));

    let unscaled = full.iter().map(|l| {
        if l.index() == 1 {
            LayerParams::new(1, l.weight_shape().to_vec(), l.raw_weights().clone(), l.bias().to_vec())
                .unwrap()
        } else {
            l.clone()
        }
    });
    let unscaled = ParameterStore::from_layers(None, unscaled.collect::<Vec<_>>()).unwrap();
    assert!(matches!(
        InferenceEngine::new(arch, &unscaled),
        Err(SimError::Model(ModelError::MissingScale { index: 1 }))
    ));

    let miscounted = full.iter().map(|l| {
        if l.index() == 0 {
            l.clone().with_requant(identity(1))
        } else {
            l.clone()
        }
    });
    let miscounted = ParameterStore::from_layers(None, miscounted.collect::<Vec<_>>()).unwrap();
    assert!(matches!(
        InferenceEngine::new(arch, &miscounted),
        Err(SimError::Model(ModelError::Kernel {
            index: 0,
            source: KernelError::MultiplierCount {
                expected: 16,
                actual: 1
            }
        }))
    ));
}

#[test]
fn test_store_for_other_architecture_is_rejected() {
    let store = synthetic::zeroed(Architecture::Cifar);
    assert!(matches!(
        InferenceEngine::new(Architecture::CifarWide, &store),
        Err(SimError::Model(ModelError::ArchitectureMismatch { .. }))
    ));
}

#[test]
fn test_concurrent_calls_share_one_engine() {
    let arch = Architecture::MinPool;
    let engine = InferenceEngine::new(arch, &synthetic::seeded(arch, 1)).unwrap();
    let image = pattern(arch.input_dims());
    let expected = engine.infer(&image).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| engine.infer(&image).unwrap())).collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

fn multiplier(mantissa: i32, shift: u32) -> FixedPointMultiplier {
    FixedPointMultiplier::new(mantissa, shift).unwrap()
}

fn capturing(arch: Architecture, store: &ParameterStore) -> InferenceEngine {
    InferenceEngine::new(arch, store)
        .unwrap()
        .with_options(EngineOptions {
            capture_accumulators: true,
        })
}

/// One lit pixel, taps only at the filter origin, distinct per-channel
/// biases and multipliers
fn hand_built_min_conv() -> ParameterStore {
    let mut taps = vec![0i8; 16 * 3 * 3];
    for (c, w) in [(0, 3), (1, -5), (2, 7), (4, 100)] {
        taps[c * 9] = w;
    }
    let mut bias = vec![0; 16];
    bias[..4].copy_from_slice(&[4, 3, -3, 9]);
    let mut multipliers = vec![FixedPointMultiplier::identity(); 16];
    multipliers[..4].copy_from_slice(&[
        multiplier(3, 1),
        multiplier(1, 1),
        multiplier(5, 2),
        multiplier(1, 2),
    ]);
    let conv = LayerParams::from_i8(0, vec![16, 3, 3, 1], &taps, bias)
        .unwrap()
        .with_requant(RequantSource::FixedPoint(multipliers));

    const INPUTS: usize = 26 * 26 * 16;
    let mut weights = vec![0i8; 12 * INPUTS];
    // (0, 0) channel 0, then (0, 1) channel 0
    weights[0] = 2;
    weights[16] = -1;
    // (0, 0) channel 2
    weights[INPUTS + 2] = -3;
    // (0, 0) channels 4 and 3
    weights[2 * INPUTS + 4] = 1;
    weights[2 * INPUTS + 3] = 10;
    // channel 3 everywhere
    for p in 0..26 * 26 {
        weights[3 * INPUTS + p * 16 + 3] = 1;
    }
    let mut bias = vec![0; 12];
    bias[0] = 5;
    bias[2] = -300;
    bias[5] = 7;
    let logits = LayerParams::from_i8(1, vec![12, INPUTS], &weights, bias).unwrap();

    ParameterStore::from_layers(Some(Architecture::MinConv), [conv, logits]).unwrap()
}

#[test]
fn test_convolution_bias_then_requantize() {
    let arch = Architecture::MinConv;
    let mut image = Tensor::zeros(arch.input_dims());
    image.as_mut_slice()[0] = 10;

    let result = capturing(arch, &hand_built_min_conv()).infer(&image).unwrap();
    let conv = result.activations.layer(0).unwrap();

    // Origin: (10 * w + bias) * m >> s, per channel
    let acc = conv.accumulators.as_ref().unwrap();
    assert_eq!(&acc[..6], &[51, -24, 83, 2, 1000, 0]);
    assert_eq!(&conv.values()[..6], &[51, 0, 83, 2, 255, 0]);

    // Everywhere else only the bias survives
    let elsewhere = Dims::new(26, 26, 16).index(7, 19, 0);
    assert_eq!(&acc[elsewhere..elsewhere + 6], &[6, 1, -4, 2, 0, 0]);
    assert_eq!(
        &conv.values()[elsewhere..elsewhere + 6],
        &[6, 1, 0, 2, 0, 0]
    );

    let logits = result.activations.logits().unwrap();
    assert_eq!(logits, &[101, -249, -25, 1352, 0, 7, 0, 0, 0, 0, 0, 0]);
    assert_eq!(result.predicted, 3);
}

/// Two lit pixels through one hidden layer scaled by 3/4
fn hand_built_basic_fc() -> ParameterStore {
    let mut hidden = vec![0i8; 100 * 784];
    hidden[0] = 2;
    hidden[784 + 1] = -9;
    hidden[2 * 784] = 10;
    let mut bias = vec![0; 100];
    bias[..4].copy_from_slice(&[10, 5, 0, 3]);
    let hidden = LayerParams::from_i8(0, vec![100, 784], &hidden, bias)
        .unwrap()
        .with_requant(RequantSource::FixedPoint(vec![multiplier(3, 2)]));

    let mut weights = vec![0i8; 12 * 100];
    weights[0] = 1;
    weights[2] = -1;
    weights[100 + 3] = 50;
    let mut bias = vec![0; 12];
    bias[1] = 1;
    bias[2] = -7;
    let logits = LayerParams::from_i8(1, vec![12, 100], &weights, bias).unwrap();

    ParameterStore::from_layers(Some(Architecture::BasicFc), [hidden, logits]).unwrap()
}

#[test]
fn test_dense_bias_then_requantize() {
    let arch = Architecture::BasicFc;
    let mut image = Tensor::zeros(arch.input_dims());
    image.as_mut_slice()[..2].copy_from_slice(&[40, 8]);

    let result = capturing(arch, &hand_built_basic_fc()).infer(&image).unwrap();
    let hidden = result.activations.layer(1).unwrap();

    // 90 * 3 >> 2 = 67, and -67 * 3 >> 2 floors to -51
    let acc = hidden.accumulators.as_ref().unwrap();
    assert_eq!(&acc[..5], &[67, -51, 300, 2, 0]);
    assert_eq!(&hidden.values()[..5], &[67, 0, 255, 2, 0]);
    assert!(hidden.values()[5..].iter().all(|v| *v == 0));

    assert_eq!(
        result.activations.logits().unwrap(),
        &[-188, 101, -7, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    );
    assert_eq!(result.predicted, 1);
}

/// Ten fixed CIFAR-sized images
fn cifar_images() -> Vec<Tensor<u8>> {
    let dims = Architecture::Cifar.input_dims();
    (0..10)
        .map(|k| {
            let data = (0..dims.len())
                .map(|i| ((i * (2 * k + 3) + 29 * k + (i / 96) * 7) % 256) as u8)
                .collect();
            Tensor::from_vec(dims, data).unwrap()
        })
        .collect()
}

const CIFAR_SEED_42_PREDICTIONS: [usize; 10] = [0, 0, 11, 11, 11, 11, 10, 11, 10, 11];

#[test]
fn test_cifar_recorded_predictions() {
    let arch = Architecture::Cifar;
    let engine = InferenceEngine::new(arch, &synthetic::seeded(arch, 42)).unwrap();
    let images = cifar_images();

    let first = engine.infer(&images[0]).unwrap();
    let layers = &first.activations;
    let conv = layers.layer(0).unwrap().values();
    assert_eq!(&conv[..10], &[22, 0, 19, 0, 0, 0, 0, 0, 51, 55]);
    assert_eq!(conv.iter().filter(|v| **v == 0).count(), 8709);
    assert_eq!(conv.iter().filter(|v| **v == 255).count(), 358);
    assert_eq!(
        &layers.layer(3).unwrap().values()[..16],
        &[0, 7, 42, 54, 0, 147, 142, 119, 0, 0, 0, 0, 255, 157, 0, 164]
    );
    let hidden = layers.layer(5).unwrap().values();
    assert_eq!((hidden[0], hidden[10], hidden[53], hidden[63]), (24, 76, 255, 54));
    assert_eq!(hidden.iter().filter(|v| **v != 0).count(), 15);
    assert_eq!(
        layers.logits().unwrap(),
        &[4529, 723, 2119, -604, 2431, 2405, 29, 2321, -89, 2696, 2437, 4490]
    );

    let samples: Vec<Sample> = images
        .into_iter()
        .zip(CIFAR_SEED_42_PREDICTIONS)
        .map(|(image, class)| Sample {
            label: class as u8,
            image,
        })
        .collect();
    let inputs = InputSet::from_samples(arch.input_dims(), &samples).unwrap();
    let report = evaluate(&engine, &inputs, None).unwrap();
    assert_eq!(report.sequence(), CIFAR_SEED_42_PREDICTIONS);
    assert_eq!(report.correct(), 10);
}
