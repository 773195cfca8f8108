use anyhow::{bail, Result};
use pico_args::Arguments;
use std::{path::PathBuf, process::ExitCode};

use mlflow_transfer::{
    config::{ExportOptions, ImportOptions, TrackingConfig},
    lifecycle::{self, RestoreOutcome},
    transfer::{export_experiment, import_experiment, report::Counts, MissingExperiment},
};

const HELP: &str = "\
mlflow-transfer: move MLflow experiments between tracking servers

USAGE:
    mlflow-transfer <COMMAND> [OPTIONS]

COMMANDS:
    export                  Write an experiment's runs to <output-dir>/<experiment>_runs_export
    import                  Recreate the runs of an export directory in an experiment
    clear-runs              Delete every run of an experiment
    delete-experiment       Soft delete an experiment
    restore-experiments     Restore soft deleted experiments, names as free arguments

OPTIONS:
    --tracking-uri <URI>        Tracking server, default $MLFLOW_TRACKING_URI or http://127.0.0.1:5000
                                (\"memory:\" uses an empty in-process store)
    --max-retries <N>           Retries for transient server errors [default: 3]
    -e, --experiment-name <NAME>

EXPORT OPTIONS:
    -o, --output-dir <DIR>      [default: .]
    --no-artifacts              Skip artifact transfer
    --artifact-workers <N>      Parallel artifact transfers per run [default: 4]

IMPORT OPTIONS:
    -i, --input-dir <DIR>       An export directory
    --csv-path <FILE>           Table to import instead of the *_runs.csv in the input directory
    --metadata-path <FILE>      Metadata document instead of <input-dir>/metadata.json
    --no-create-experiment      Fail if the experiment does not exist
    --no-artifacts
    --artifact-workers <N>

The log level is controlled with RUST_LOG, e.g. RUST_LOG=mlflow_transfer=debug.
";

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mlflow_transfer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = Arguments::from_env();
    let command = args.subcommand()?;
    if args.contains(["-h", "--help"]) || command.is_none() {
        print!("{}", HELP);
        return Ok(if command.is_none() { ExitCode::FAILURE } else { ExitCode::SUCCESS });
    }
    let config = TrackingConfig::resolve(args.opt_value_from_str("--tracking-uri")?, args.opt_value_from_str("--max-retries")?);

    match command.as_deref() {
        Some("export") => export(args, &config),
        Some("import") => import(args, &config),
        Some("clear-runs") => {
            let experiment: String = args.value_from_str(["-e", "--experiment-name"])?;
            args.finish()?;
            let deleted = lifecycle::clear_runs(config.connect().client.as_mut(), &experiment)?;
            println!("Deleted {} runs of {}", deleted, experiment);
            Ok(ExitCode::SUCCESS)
        }
        Some("delete-experiment") => {
            let experiment: String = args.value_from_str(["-e", "--experiment-name"])?;
            args.finish()?;
            let id = lifecycle::delete_experiment(config.connect().client.as_mut(), &experiment)?;
            println!("Deleted experiment {} ({})", experiment, id);
            Ok(ExitCode::SUCCESS)
        }
        Some("restore-experiments") => {
            let names = args.free()?;
            if names.is_empty() {
                bail!("restore-experiments needs at least one experiment name");
            }
            for (name, outcome) in lifecycle::restore_experiments(config.connect().client.as_mut(), &names)? {
                match outcome {
                    RestoreOutcome::Restored(id) => println!("{}: restored ({})", name, id),
                    RestoreOutcome::AlreadyActive => println!("{}: not deleted, nothing to do", name),
                    RestoreOutcome::NotFound => println!("{}: does not exist", name),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(other) => bail!("unknown command {:?}, see --help", other),
        None => Ok(ExitCode::FAILURE),
    }
}

fn export(mut args: Arguments, config: &TrackingConfig) -> Result<ExitCode> {
    let experiment: String = args.value_from_str(["-e", "--experiment-name"])?;
    let output_dir: PathBuf = args.opt_value_from_str(["-o", "--output-dir"])?.unwrap_or_else(|| PathBuf::from("."));
    let mut options = ExportOptions::new(experiment, output_dir);
    options.include_artifacts = !args.contains("--no-artifacts");
    if let Some(workers) = args.opt_value_from_str("--artifact-workers")? {
        options.artifact_workers = workers;
    }
    args.finish()?;

    let mut connection = config.connect();
    let report = export_experiment(connection.client.as_mut(), connection.artifacts.as_ref(), &config.uri, &options)?;
    println!("Exported {} to {}", report.experiment.name, report.layout.root.display());
    print_counts(&report.summary.runs);
    Ok(exit_code(&report.summary.runs))
}

fn import(mut args: Arguments, config: &TrackingConfig) -> Result<ExitCode> {
    let input_dir: PathBuf = args.value_from_str(["-i", "--input-dir"])?;
    let experiment: String = args.value_from_str(["-e", "--experiment-name"])?;
    let mut options = ImportOptions::new(input_dir, experiment);
    options.csv_path = args.opt_value_from_str("--csv-path")?;
    options.metadata_path = args.opt_value_from_str("--metadata-path")?;
    options.include_artifacts = !args.contains("--no-artifacts");
    if args.contains("--no-create-experiment") {
        options.missing_experiment = MissingExperiment::Fail;
    }
    if let Some(workers) = args.opt_value_from_str("--artifact-workers")? {
        options.artifact_workers = workers;
    }
    args.finish()?;

    let mut connection = config.connect();
    let report = import_experiment(connection.client.as_mut(), connection.artifacts.as_ref(), &config.uri, &options)?;
    println!(
        "Imported into {} ({})",
        report.experiment.name, report.experiment.experiment_id
    );
    print_counts(&report.summary.runs);
    for failed in &report.summary.failed_runs {
        println!("  failed: {}", failed);
    }
    Ok(exit_code(&report.summary.runs))
}

fn print_counts(counts: &Counts) {
    println!(
        "{} runs: {} succeeded, {} degraded, {} failed",
        counts.attempted, counts.succeeded, counts.degraded, counts.failed
    );
}

/// Degraded runs still count as progress; failed ones do not.
fn exit_code(counts: &Counts) -> ExitCode {
    if counts.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
