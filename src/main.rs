use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use cobra_ensemble::{
    Cobra, CobraConfig, Dataset, FitOutcome, FitReport, Preset, QuorumRule, SplitConfig,
};
use cobra_io::{
    EvaluationSummary, ExperimentName, LabeledReader, PredictionExtras, QueryReader, ResultWriter,
};

#[derive(Parser)]
#[command(name = "cobra")]
#[command(about = "Consensus aggregation of base classifiers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Shared ensemble construction parameters.
#[derive(Args, Debug, Clone)]
struct EnsembleArgs {
    /// Machine preset: "basic" or "advanced"
    #[arg(long, default_value = "basic")]
    preset: String,

    /// Explicit comma-separated machine list (overrides --preset)
    #[arg(long)]
    machines: Option<String>,

    /// Training subset size (rows [0, k) train the machines)
    #[arg(long)]
    k: Option<usize>,

    /// Aggregation subset end index (rows [k, l) vote)
    #[arg(long)]
    l: Option<usize>,

    /// Keep row order instead of shuffling before the split
    #[arg(long, default_value_t = false)]
    no_shuffle: bool,

    /// Quorum rule: "exact" (agreeing machines == quorum) or "at-least"
    #[arg(long, default_value = "exact")]
    quorum_rule: String,
}

#[derive(Subcommand)]
enum Command {
    /// Fit the machines, build the agreement table, and save the model
    Train {
        /// Path to the labeled CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the label column
        #[arg(long, default_value = "label")]
        label_column: String,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        ensemble: EnsembleArgs,
    },

    /// Predict labels for new samples with a saved model
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the query CSV file (first column is the sample ID)
        #[arg(long)]
        data: PathBuf,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Number of agreeing machines required (defaults to the machine count)
        #[arg(long)]
        quorum: Option<usize>,

        /// Also write mean class distributions
        #[arg(long, default_value_t = false)]
        confidence: bool,

        /// Also write the selected aggregation points per sample
        #[arg(long, default_value_t = false)]
        info: bool,
    },

    /// Hold out a test set, fit on the rest, and score the ensemble
    Evaluate {
        /// Path to the labeled CSV file
        #[arg(long)]
        data: PathBuf,

        /// Name of the label column
        #[arg(long, default_value = "label")]
        label_column: String,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Fraction of rows held out for scoring
        #[arg(long, default_value_t = 0.22)]
        test_fraction: f64,

        /// Number of agreeing machines required (defaults to the machine count)
        #[arg(long)]
        quorum: Option<usize>,

        #[command(flatten)]
        ensemble: EnsembleArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct TrainOutput {
    experiment: String,
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    k: usize,
    l: usize,
    machines: Vec<String>,
    failed: Vec<String>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_samples: usize,
    n_machines: usize,
    mean_selected: f64,
    class_counts: Vec<usize>,
}

#[derive(Serialize)]
struct EvaluateOutput {
    experiment: String,
    n_train: usize,
    n_test: usize,
    accuracy: f64,
    mean_selected: f64,
    best_machine: Option<String>,
    best_machine_accuracy: Option<f64>,
}

fn parse_quorum_rule(s: &str) -> Result<QuorumRule> {
    match s {
        "exact" => Ok(QuorumRule::Exact),
        "at-least" => Ok(QuorumRule::AtLeast),
        other => anyhow::bail!("unknown quorum rule: {other} (expected exact or at-least)"),
    }
}

fn build_config(args: &EnsembleArgs, seed: u64, quorum: Option<usize>) -> Result<CobraConfig> {
    let preset: Preset = match &args.machines {
        Some(names) => Preset::from_names(names)?,
        None => args.preset.parse::<Preset>()?,
    };
    if preset.kinds().is_empty() {
        anyhow::bail!("machine list is empty");
    }
    let split = SplitConfig::new()
        .with_k(args.k)
        .with_l(args.l)
        .with_shuffle(!args.no_shuffle);
    Ok(CobraConfig::new()
        .with_seed(seed)
        .with_preset(preset)
        .with_split(split)
        .with_quorum(quorum)
        .with_quorum_rule(parse_quorum_rule(&args.quorum_rule)?))
}

fn read_dataset(path: &Path, label_column: &str) -> Result<Dataset> {
    let table = LabeledReader::new(path, label_column)
        .read()
        .context("failed to read labeled CSV")?;
    let (features, labels, class_names) = table.into_parts();
    Dataset::with_class_names(features, labels, class_names).context("invalid dataset")
}

/// Split a fit report into `(fitted, failed)` entries for the writer.
fn report_entries(report: &FitReport) -> (Vec<(String, u64)>, Vec<(String, String)>) {
    let mut fitted = Vec::new();
    let mut failed = Vec::new();
    for outcome in report.outcomes() {
        match outcome {
            FitOutcome::Fitted { name, elapsed_ms } => fitted.push((name.clone(), *elapsed_ms)),
            FitOutcome::Failed { name, reason } => failed.push((name.clone(), reason.clone())),
        }
    }
    (fitted, failed)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train {
            data,
            label_column,
            experiment,
            output_dir,
            ensemble,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let config = build_config(&ensemble, cli.seed, None)?;

            // 1. Read dataset
            let dataset = read_dataset(&data, &label_column)?;

            // 2. Split, fit machines, build the agreement table
            let mut cobra: Cobra = Cobra::new(config);
            let report = cobra.fit(&dataset).context("training failed")?;
            cobra
                .load_machine_confidences()
                .context("failed to compute machine confidences")?;
            let split = cobra.split().context("split missing after fit")?;
            let (k, l) = (split.k(), split.l());

            // 3. Save model and fit report
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let model_path = writer.model_path();
            cobra.save(&model_path).context("failed to save model")?;
            info!(path = %model_path.display(), "model saved");

            let (fitted, failed) = report_entries(&report);
            writer.write_fit_report(k, l, dataset.class_names(), &fitted, &failed)?;

            // 4. Print summary
            let output = TrainOutput {
                experiment,
                n_samples: dataset.len(),
                n_features: dataset.n_features(),
                n_classes: dataset.n_classes(),
                k,
                l,
                machines: cobra.machine_names().into_iter().map(String::from).collect(),
                failed: failed.into_iter().map(|(name, _)| name).collect(),
                model_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            data,
            experiment,
            output_dir,
            quorum,
            confidence,
            info: with_info,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;

            // 1. Load model
            let cobra: Cobra = Cobra::load(&model).context("failed to load model")?;
            let class_names: Vec<String> = cobra.class_names().unwrap_or_default().to_vec();
            info!(
                n_machines = cobra.n_machines(),
                n_classes = class_names.len(),
                "model loaded"
            );

            // 2. Read queries
            let queries = QueryReader::new(&data)
                .read()
                .context("failed to read query CSV")?;

            // 3. Predict
            let batch = cobra
                .predict_with_info(queries.features(), quorum)
                .context("prediction failed")?;
            let probabilities = if confidence {
                Some(
                    cobra
                        .predict_proba_batch(queries.features())
                        .context("class distribution failed")?,
                )
            } else {
                None
            };
            let selections: Option<Vec<Vec<usize>>> = with_info
                .then(|| batch.selections.iter().map(|s| s.points.clone()).collect());

            let fallback: Vec<bool> = batch.selections.iter().map(|s| s.is_fallback()).collect();

            // 4. Write predictions JSON
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            let extras = PredictionExtras {
                probabilities: probabilities.as_deref(),
                selections: selections.as_deref(),
                mean_selected: Some(batch.mean_selected),
                fallback: Some(&fallback),
            };
            writer.write_predictions(queries.sample_ids(), &batch.labels, &class_names, extras)?;

            // 5. Print summary
            let mut class_counts = vec![0usize; class_names.len()];
            for &label in &batch.labels {
                if let Some(count) = class_counts.get_mut(label) {
                    *count += 1;
                }
            }
            let output = PredictOutput {
                experiment,
                n_samples: queries.n_samples(),
                n_machines: cobra.n_machines(),
                mean_selected: batch.mean_selected,
                class_counts,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Evaluate {
            data,
            label_column,
            experiment,
            output_dir,
            test_fraction,
            quorum,
            ensemble,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let config = build_config(&ensemble, cli.seed, quorum)?;

            // 1. Read and hold out
            let dataset = read_dataset(&data, &label_column)?;
            let (train, test) = dataset
                .train_test_split(test_fraction, cli.seed)
                .context("hold-out split failed")?;
            info!(n_train = train.len(), n_test = test.len(), "hold-out split");

            // 2. Fit on the training part
            let mut cobra: Cobra = Cobra::new(config);
            cobra.fit(&train).context("training failed")?;

            // 3. Score on the held-out part
            let evaluation = cobra
                .evaluate(test.features(), test.labels(), quorum)
                .context("evaluation failed")?;
            debug!("hold-out confusion matrix:\n{}", evaluation.confusion);

            // 4. Write evaluation JSON
            let class_metrics: Vec<(f64, f64, f64, usize)> = evaluation
                .confusion
                .class_metrics()
                .iter()
                .map(|m| (m.precision, m.recall, m.f1, m.support))
                .collect();
            let writer = ResultWriter::new(&output_dir, experiment_name)?;
            writer.write_evaluation(
                dataset.class_names(),
                EvaluationSummary {
                    accuracy: evaluation.accuracy,
                    mean_selected: evaluation.mean_selected,
                    n_samples: evaluation.n_samples,
                    quorum,
                    machine_accuracy: &evaluation.machine_accuracy,
                    confusion_matrix: evaluation.confusion.as_rows(),
                    class_metrics: &class_metrics,
                },
            )?;

            // 5. Print summary
            let best = evaluation
                .machine_accuracy
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1));
            let output = EvaluateOutput {
                experiment,
                n_train: train.len(),
                n_test: test.len(),
                accuracy: evaluation.accuracy,
                mean_selected: evaluation.mean_selected,
                best_machine: best.map(|(name, _)| name.clone()),
                best_machine_accuracy: best.map(|(_, &acc)| acc),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
