use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nabu::io::config::ConfigFile;
use nabu::model::{HotStart, ModelConfig, VariableStore, restore_all};
use nabu::training::{DataPlan, EvaluatorConfig, LearningRateSchedule, TrainerConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and check speech recognizer configurations")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved model
    Inspect {
        model: PathBuf,

        /// Print the resolved model as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check that a model, trainer, data and evaluator configuration fit together
    Check {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        trainer: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        evaluator: Option<PathBuf>,
    },
    /// Print the learning rate over a training run
    Schedule {
        #[arg(long)]
        trainer: PathBuf,
        #[arg(long)]
        steps_per_epoch: u64,

        /// Number of evenly spaced steps to print
        #[arg(long, default_value_t = 10)]
        points: u64,
    },
    /// Restore the hot-started encoders of a model from their checkpoints
    Hotstart { model: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    match args.command {
        Command::Inspect { model, json } => inspect(&model, json),
        Command::Check {
            model,
            trainer,
            data,
            evaluator,
        } => check(&model, &trainer, &data, evaluator.as_deref()),
        Command::Schedule {
            trainer,
            steps_per_epoch,
            points,
        } => schedule(&trainer, steps_per_epoch, points),
        Command::Hotstart { model } => hotstart(&model),
    }
}

fn load(path: &Path) -> Result<ConfigFile> {
    ConfigFile::load(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_model(path: &Path) -> Result<(ConfigFile, ModelConfig)> {
    let config = load(path)?;
    let model = ModelConfig::from_config(&config)
        .with_context(|| format!("invalid model configuration {}", path.display()))?;
    Ok((config, model))
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let (config, model) = load_model(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&model)?);
        return Ok(());
    }

    println!("inputs:  {}", model.inputs.join(" "));
    println!("outputs: {}", model.outputs.join(" "));
    println!("encoder:");
    print!("{}", model.encoder);
    println!(
        "time reduction: {}x (100 frames -> {})",
        model.encoder.time_reduction(),
        model.encoder.output_length(100)
    );
    println!("decoder: {} [{}]", model.decoder.kind, model.decoder.section);

    for section in model.unused_sections(&config) {
        warn!(section, "section is not used by the model");
    }
    Ok(())
}

fn check(model: &Path, trainer: &Path, data: &Path, evaluator: Option<&Path>) -> Result<()> {
    let (_, model_config) = load_model(model)?;
    let trainer_config = TrainerConfig::from_config(&load(trainer)?)
        .with_context(|| format!("invalid trainer configuration {}", trainer.display()))?;
    let plan = DataPlan::resolve(&model_config, &trainer_config, &load(data)?)
        .with_context(|| format!("invalid data configuration {}", data.display()))?;
    let evaluator_config = match evaluator {
        Some(path) => EvaluatorConfig::from_config(&load(path)?)
            .with_context(|| format!("invalid evaluator configuration {}", path.display()))?,
        None => EvaluatorConfig::disabled(),
    };

    for stream in plan.streams() {
        let sections: Vec<&str> = stream.sections.iter().map(|(name, _)| name.as_str()).collect();
        info!(stream = %stream.name, sections = %sections.join(" "), "data stream");
    }
    for output in &model_config.outputs {
        if !trainer_config.targets.contains(output) {
            bail!("model output '{output}' has no training target");
        }
    }
    if !evaluator_config.validates() {
        warn!("no evaluator configured, training runs without validation");
    } else if !trainer_config.validates() {
        warn!("valid_frequency is 0, training runs without validation");
    }

    println!(
        "ok: {} input stream(s), {} target stream(s), loss {}, queue capacity {}",
        plan.inputs.len(),
        plan.targets.len(),
        trainer_config.loss,
        plan.queue_capacity
    );
    Ok(())
}

fn schedule(trainer: &Path, steps_per_epoch: u64, points: u64) -> Result<()> {
    let config = TrainerConfig::from_config(&load(trainer)?)
        .with_context(|| format!("invalid trainer configuration {}", trainer.display()))?;
    let schedule = LearningRateSchedule::from_config(&config, steps_per_epoch);
    let num_steps = schedule.num_steps();
    if num_steps == 0 {
        bail!("the run has no training steps");
    }

    let points = points.clamp(1, num_steps);
    println!("{:>10}  {:>12}", "step", "rate");
    for i in 0..=points {
        let step = num_steps * i / points;
        println!("{step:>10}  {:>12.6e}", schedule.rate(step));
    }
    Ok(())
}

fn hotstart(path: &Path) -> Result<()> {
    let (_, model) = load_model(path)?;
    let hotstarts = model.encoder.hotstarts();
    if hotstarts.is_empty() {
        println!("no hot-started encoders");
        return Ok(());
    }
    for (node, _) in &hotstarts {
        let plan = HotStart::from_node(node)?;
        println!(
            "[{}] {} -> {} from {}",
            plan.section,
            plan.source_scope,
            plan.target_scope,
            plan.checkpoint_path().display()
        );
    }

    let mut store = VariableStore::new();
    let reports = restore_all(&model, &mut store).context("hot-start restoration failed")?;
    for report in reports {
        println!(
            "[{}] restored {} variable(s), {} missing, trainable = {}",
            report.section,
            report.restored.len(),
            report.missing.len(),
            report.trainable
        );
    }
    Ok(())
}
