// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`     — trains a model on a timeline extract
//   2. `evaluate`  — reports a trained model's held-out loss
//   3. `featurize` — writes representations for a label file
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, FeaturizeArgs, TrainArgs};

use crate::application::train_use_case::TrainRequest;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "clmbr",
    version,
    about = "Train patient timeline models and extract patient representations."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Evaluate(args)  => run_evaluate(args),
            Commands::Featurize(args) => run_featurize(args),
        }
    }
}

/// Handles the `train` subcommand.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on extract: {}", args.timelines.display());

    let request  = TrainRequest::try_from(args)?;
    let model_dir = request.config.model_dir.clone();
    let summary  = TrainUseCase::new(request).execute()?;

    match summary.best {
        Some(best) => println!(
            "Training complete. Best epoch {} (val loss {:.6}) saved in '{}'.",
            best.epoch, best.val_loss, model_dir
        ),
        None => println!("Training complete. No epoch produced a checkpoint."),
    }
    Ok(())
}

/// Handles the `evaluate` subcommand.
fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let is_val = !args.train_split;
    let loss = EvaluateUseCase::new(args.model_dir, args.timelines, is_val, args.num_batches)
        .execute()?;

    println!("{} loss: {:.6}", if is_val { "Validation" } else { "Training" }, loss);
    Ok(())
}

/// Handles the `featurize` subcommand.
fn run_featurize(args: FeaturizeArgs) -> Result<()> {
    use crate::application::featurize_use_case::FeaturizeUseCase;

    let output = args.output.clone();
    let rows = FeaturizeUseCase::new(args.model_dir, args.timelines, args.labels, args.output)
        .execute()?;

    println!("Wrote {} representations to '{}'.", rows, output.display());
    Ok(())
}
