//! `nopu`: command-line interface for the NOPU simulator.
//!
//! ```text
//! USAGE:
//!   nopu list                                  List catalog architectures
//!   nopu run -a <arch> -p <params> -i <inputs> Run one image, print the class
//!   nopu batch -a <arch> -p <params> -i <inputs> -n 10
//!                                              Accuracy over the first N inputs
//!   nopu compare <expected> <actual>           Diff two activation traces
//! ```
//!
//! `--seed <N>` may replace `-p` to run with synthetic parameters.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nopu_models::{synthetic, Architecture, InputSet, ParameterStore};
use nopu_sim::{
    evaluate, EngineOptions, InferenceEngine, LayerOutput, TraceComparator, DUMP_HEADER_LINES,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nopu", about = "Bit-exact NOPU accelerator simulator", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List the supported architectures.
    List,
    /// Run one canonical input and report the predicted class.
    Run {
        #[command(flatten)]
        model: ModelArgs,
        /// Record index in the input set.
        #[arg(long, default_value_t = 0)]
        image: usize,
        /// Print a node window of this layer position.
        #[arg(long)]
        layer: Option<usize>,
        /// First node of the window.
        #[arg(long, default_value_t = 0, requires = "layer")]
        offset: usize,
        /// Number of nodes in the window.
        #[arg(long, default_value_t = 16, requires = "layer")]
        count: usize,
        /// Print every layer's output.
        #[arg(short, long)]
        verbose: bool,
        /// Write `simulator_layer_<i>.txt` trace dumps into this directory.
        #[arg(long)]
        dump_dir: Option<PathBuf>,
        /// Also keep and print pre-clamp accumulators.
        #[arg(long)]
        accumulators: bool,
    },
    /// Evaluate accuracy over the first N canonical inputs.
    Batch {
        #[command(flatten)]
        model: ModelArgs,
        /// Number of inputs to evaluate.
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Compare two `<index> <value>` traces; exits 1 on any mismatch.
    Compare {
        /// Reference trace (e.g. a simulator dump).
        expected: PathBuf,
        /// Trace under test (e.g. an emulator log).
        actual: PathBuf,
        /// Header lines to skip in the reference trace.
        #[arg(long, default_value_t = DUMP_HEADER_LINES)]
        expected_header: usize,
        /// Header lines to skip in the trace under test.
        #[arg(long, default_value_t = 0)]
        actual_header: usize,
        /// Skip lines of the trace under test until the first with index 0.
        #[arg(long)]
        sync_on_zero: bool,
        /// Print at most this many mismatches (all by default).
        #[arg(long)]
        max_report: Option<usize>,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Architecture identifier (see `nopu list`).
    #[arg(short, long)]
    arch: Architecture,
    #[command(flatten)]
    params: ParamsSource,
    /// Canonical input set (`[label][pixels]` records).
    #[arg(short, long)]
    inputs: PathBuf,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ParamsSource {
    /// Parameter artifact (JSON).
    #[arg(short, long)]
    params: Option<PathBuf>,
    /// Use synthetic parameters drawn from this seed.
    #[arg(long)]
    seed: Option<u64>,
}

impl ModelArgs {
    fn load(&self) -> Result<(ParameterStore, InputSet)> {
        let store = match (&self.params.params, self.params.seed) {
            (Some(path), _) => ParameterStore::from_json_file(path)
                .with_context(|| format!("loading parameters from {}", path.display()))?,
            (None, Some(seed)) => synthetic::seeded(self.arch, seed),
            (None, None) => anyhow::bail!("either --params or --seed is required"),
        };
        let inputs = InputSet::from_file(&self.inputs, self.arch.input_dims())
            .with_context(|| format!("loading inputs from {}", self.inputs.display()))?;
        tracing::info!(
            "{}: {} parameter layers, {} inputs",
            self.arch,
            store.len(),
            inputs.len()
        );
        Ok((store, inputs))
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::List => cmd_list(),
        Cmd::Run {
            model,
            image,
            layer,
            offset,
            count,
            verbose,
            dump_dir,
            accumulators,
        } => cmd_run(
            &model,
            image,
            layer.map(|l| (l, offset, count)),
            verbose,
            dump_dir.as_deref(),
            accumulators,
        )?,
        Cmd::Batch { model, count } => cmd_batch(&model, count)?,
        Cmd::Compare {
            expected,
            actual,
            expected_header,
            actual_header,
            sync_on_zero,
            max_report,
        } => {
            let comparator = TraceComparator::new()
                .with_expected_header(expected_header)
                .with_actual_header(actual_header)
                .with_sync_on_zero(sync_on_zero);
            return cmd_compare(&comparator, &expected, &actual, max_report);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_list() {
    println!("{:<12} {:<10} {:>6}  LAYERS", "ID", "INPUT", "PARAMS");
    for arch in Architecture::all() {
        println!(
            "{:<12} {:<10} {:>6}  {}",
            arch.name(),
            arch.input_dims().to_string(),
            arch.parameter_layers(),
            arch.description()
        );
    }
}

fn cmd_run(
    model: &ModelArgs,
    image: usize,
    window: Option<(usize, usize, usize)>,
    verbose: bool,
    dump_dir: Option<&Path>,
    accumulators: bool,
) -> Result<()> {
    let (store, inputs) = model.load()?;
    let engine = InferenceEngine::new(model.arch, &store)?.with_options(EngineOptions {
        capture_accumulators: accumulators,
    });
    let sample = inputs.get(image)?;
    let result = engine.infer(&sample.image)?;

    if verbose {
        for (i, output) in result.activations.iter().enumerate() {
            print_layer(i, output);
        }
    }

    if let Some((layer, offset, count)) = window {
        let output = result.activations.layer(layer)?;
        println!("layer {layer} ({}) {}", output.kind, output.dims);
        let acc = output.accumulators.as_deref();
        for (i, v) in output.window(offset, count) {
            match acc.and_then(|a| a.get(i)) {
                Some(a) => println!("{i} {v}\t(acc {a})"),
                None => println!("{i} {v}"),
            }
        }
    }

    if let Some(dir) = dump_dir {
        let paths = result.activations.dump_to_dir(model.arch, dir)?;
        println!("wrote {} trace files to {}", paths.len(), dir.display());
    }

    println!("EXPECTED {}, RETURNED {}", sample.label, result.predicted);
    Ok(())
}

fn print_layer(position: usize, output: &LayerOutput) {
    println!("layer {position} ({}) {}", output.kind, output.dims);
    for row in output.values().chunks(16) {
        let line: Vec<String> = row.iter().map(ToString::to_string).collect();
        println!("  {}", line.join(" "));
    }
    if let Some(acc) = &output.accumulators {
        println!("  accumulators:");
        for row in acc.chunks(16) {
            let line: Vec<String> = row.iter().map(ToString::to_string).collect();
            println!("  {}", line.join(" "));
        }
    }
}

fn cmd_batch(model: &ModelArgs, count: usize) -> Result<()> {
    let (store, inputs) = model.load()?;
    let engine = InferenceEngine::new(model.arch, &store)?;
    let report = evaluate(&engine, &inputs, Some(count))?;

    for p in &report.predictions {
        println!("[{}] EXPECTED {}, RETURNED {}", p.index, p.label, p.predicted);
    }
    println!();
    println!(
        "accuracy: {:.2}% ({}/{})",
        report.accuracy(),
        report.correct(),
        report.total()
    );
    println!("predictions: {:?}", report.sequence());
    Ok(())
}

fn cmd_compare(
    comparator: &TraceComparator,
    expected: &Path,
    actual: &Path,
    max_report: Option<usize>,
) -> Result<ExitCode> {
    let report = comparator.compare_files(expected, actual)?;
    let shown = max_report.unwrap_or(report.mismatches.len());

    for m in report.mismatches.iter().take(shown) {
        println!("{}: {}\t{}\tdiff:{}", m.index, m.expected, m.actual, m.delta);
    }
    if report.mismatches.len() > shown {
        println!("... {} more", report.mismatches.len() - shown);
    }
    for w in &report.warnings {
        println!("warning: {w}");
    }

    println!("lines: {}", report.compared);
    println!("mismatches: {}", report.mismatches.len());
    if report.unmatched > 0 {
        println!("unmatched: {}", report.unmatched);
    }
    if let Some(first) = report.first_divergence() {
        println!("first divergence at index {}", first.index);
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
