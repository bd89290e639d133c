//! Binary entry point for the Evently scoring pipeline and prediction API.
#![forbid(unsafe_code)]

use std::error::Error;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use evently::{
    config::{PipelinePaths, ServeOptions, TrainOptions, DEFAULT_MAX_BATCH},
    evaluate::{run_evaluation, EvaluationReport},
    features::run_build,
    logging::init_logging,
    pipeline::run_pipeline,
    server,
    synth::{run_generate, SynthOptions},
    training::{run_training, TrainingReport},
};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(
    name = "evently",
    version,
    about = "Event relevance scoring: offline pipeline and prediction API",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        default_value = ".",
        help = "Base directory of the data/, model-linear-regression/ and reports/ layout"
    )]
    root: PathBuf,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for step summaries"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(
        long,
        default_value_t = 0.2,
        help = "Share of rows held out for evaluation (experimentation only; the standard run holds out 0.2)"
    )]
    test_ratio: f64,

    #[arg(
        long,
        default_value_t = 42,
        help = "Train/test shuffle seed (experimentation only; the standard run uses 42)"
    )]
    seed: u64,
}

impl From<&TrainArgs> for TrainOptions {
    fn from(args: &TrainArgs) -> Self {
        TrainOptions {
            test_ratio: args.test_ratio,
            seed: args.seed,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateCmd {
    #[arg(long, default_value_t = 200, help = "Number of users")]
    users: usize,

    #[arg(long, default_value_t = 50, help = "Number of events")]
    events: usize,

    #[arg(long, default_value_t = 6, help = "Upper bound on favorites per user")]
    max_favorites: usize,

    #[arg(long, default_value_t = 42, help = "Generator seed")]
    seed: u64,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(
        long,
        env = "HOST",
        value_name = "HOST",
        default_value = "0.0.0.0",
        help = "Bind address host"
    )]
    host: IpAddr,

    #[arg(
        long,
        env = "PORT",
        value_name = "PORT",
        default_value_t = 5000,
        help = "Bind port"
    )]
    port: u16,

    #[arg(long, value_name = "FILE", help = "Model artifact to serve")]
    model: Option<PathBuf>,

    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        action = ArgAction::Append,
        help = "CORS origin to allow (repeatable; defaults to the Evently frontends)"
    )]
    allow_origins: Vec<String>,

    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_MAX_BATCH,
        help = "Largest accepted /batch-predict body"
    )]
    max_batch: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Write synthetic raw users and events tables")]
    Generate(GenerateCmd),

    #[command(about = "Join raw tables into the labeled feature table")]
    BuildFeatures,

    #[command(about = "Fit the linear model and persist its artifacts")]
    Train(TrainArgs),

    #[command(about = "Score the feature table with the persisted model")]
    Evaluate,

    #[command(about = "Run build-features, train and evaluate in order")]
    Pipeline(TrainArgs),

    #[command(about = "Serve the prediction API")]
    Serve(ServeCmd),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    init_logging("info");
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let paths = PipelinePaths::under(&cli.root);

    match cli.command {
        Command::Generate(cmd) => {
            let options = SynthOptions {
                users: cmd.users,
                events: cmd.events,
                max_favorites: cmd.max_favorites,
                seed: cmd.seed,
                ..SynthOptions::default()
            };
            let data = run_generate(&paths, &options)?;
            let summary = json!({
                "users": data.users.len(),
                "events": data.events.len(),
                "users_csv": paths.users_csv.display().to_string(),
                "events_csv": paths.events_csv.display().to_string(),
            });
            emit(cli.format, &summary, || {
                println!(
                    "wrote {} users to {} and {} events to {}",
                    data.users.len(),
                    paths.users_csv.display(),
                    data.events.len(),
                    paths.events_csv.display()
                )
            })?;
        }
        Command::BuildFeatures => {
            let summary = run_build(&paths)?;
            emit(cli.format, &summary, || {
                println!(
                    "{} users x {} events -> {} rows in {}",
                    summary.users,
                    summary.events,
                    summary.rows,
                    summary.output.display()
                )
            })?;
        }
        Command::Train(args) => {
            let report = run_training(&paths, &TrainOptions::from(&args))?;
            emit(cli.format, &training_json(&report), || print_training_text(&report))?;
        }
        Command::Evaluate => {
            let report = run_evaluation(&paths)?;
            emit(cli.format, &evaluation_json(&report), || {
                print_evaluation_text(&report)
            })?;
        }
        Command::Pipeline(args) => {
            let report = run_pipeline(&paths, &TrainOptions::from(&args))?;
            let summary = json!({
                "build": report.build,
                "training": training_json(&report.training),
                "evaluation": evaluation_json(&report.evaluation),
            });
            emit(cli.format, &summary, || {
                println!("features: {} rows", report.build.rows);
                print_training_text(&report.training);
                print_evaluation_text(&report.evaluation);
            })?;
        }
        Command::Serve(cmd) => {
            let defaults = ServeOptions::default();
            let allow_origins = if cmd.allow_origins.is_empty() {
                defaults.allow_origins
            } else {
                cmd.allow_origins
            };
            let options = ServeOptions {
                host: cmd.host,
                port: cmd.port,
                model_path: cmd.model.unwrap_or_else(|| paths.model_bin.clone()),
                allow_origins,
                max_batch: cmd.max_batch,
            };
            server::serve(options).await?;
        }
    }

    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn training_json(report: &TrainingReport) -> Value {
    json!({
        "coefficients": report.model.coefficients().to_vec(),
        "intercept": report.model.intercept(),
        "metrics": report.metrics,
        "train_rows": report.train_rows,
        "test_rows": report.test_rows,
    })
}

fn evaluation_json(report: &EvaluationReport) -> Value {
    json!({
        "stats": report.stats,
        "metrics": report.metrics,
        "unlabeled_rows": report.unlabeled_rows,
    })
}

fn print_training_text(report: &TrainingReport) {
    println!(
        "trained on {} rows, tested on {}",
        report.train_rows, report.test_rows
    );
    println!(
        "  coefficients={:?} intercept={}",
        report.model.coefficients().to_vec(),
        report.model.intercept()
    );
    println!("  mse={} r2={}", report.metrics.mse, report.metrics.r2);
}

fn print_evaluation_text(report: &EvaluationReport) {
    let stats = &report.stats;
    println!(
        "predictions: count={} mean={:.4} std={:.4} min={:.4} max={:.4}",
        stats.count, stats.mean, stats.std, stats.min, stats.max
    );
    if let Some(metrics) = &report.metrics {
        println!("  mse={} r2={}", metrics.mse, metrics.r2);
    }
}
