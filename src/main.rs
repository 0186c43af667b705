use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use shortfall::config::{parse_hidden_layers, PipelineConfig};
use shortfall::model::neural_net::{ActivationFunction, InitMethod};
use shortfall::model::Family;
use shortfall::parsing::table::{parse_dataset, TableLayout};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The county table, one row per county with a header row
    #[arg(short, long, default_value = "data/county_shortfall.csv")]
    input: PathBuf,

    /// Name of the target column
    #[arg(short, long, default_value = "shortfall")]
    target: String,

    /// Identifier columns to skip (county name, FIPS code, ...); repeatable
    #[arg(long = "id-column")]
    id_columns: Vec<String>,

    /// Fraction of counties used for training
    #[arg(long, default_value_t = 0.8)]
    split_ratio: f64,

    /// Seed for the split, the folds and every model
    #[arg(short, long, default_value_t = 101)]
    seed: u64,

    /// Number of cross-validation folds
    #[arg(long, default_value_t = 5)]
    folds: usize,

    /// Widths of the neural net's two hidden layers, e.g. 5,3
    #[arg(long, default_value = "5,3")]
    hidden_layers: String,

    /// Activation function of the neural net's hidden layers
    #[arg(long, value_enum, default_value_t = ActivationFunction::Sigmoid)]
    activation_function: ActivationFunction,

    /// Weight initialization method of the neural net
    #[arg(long, value_enum, default_value_t = InitMethod::Xavier)]
    initialization: InitMethod,

    /// Families to compare, comma separated; all seven when omitted
    #[arg(short, long, value_delimiter = ',')]
    families: Vec<Family>,

    /// Trees grown by the random forest
    #[arg(long, default_value_t = 100)]
    forest_trees: usize,

    /// Maximum training epochs of the neural net
    #[arg(short, long, default_value_t = 500)]
    epochs: usize,

    /// Train the families concurrently
    #[arg(short, long)]
    parallel: bool,

    /// Wall-clock budget per family, in seconds
    #[arg(long)]
    time_budget_secs: Option<u64>,

    /// Also write the report as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Write the train/test assignment of every row as CSV
    #[arg(long)]
    split_output: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> anyhow::Result<PipelineConfig> {
        let families = if self.families.is_empty() {
            Family::ALL.to_vec()
        } else {
            self.families.clone()
        };

        let config = PipelineConfig {
            split_ratio: self.split_ratio,
            seed: self.seed,
            folds: self.folds,
            hidden_layers: parse_hidden_layers(&self.hidden_layers)?,
            activation: self.activation_function,
            initialization: self.initialization,
            epochs: self.epochs,
            forest_trees: self.forest_trees,
            families,
            parallel: self.parallel,
            time_budget: self.time_budget_secs.map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortfall=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.config().context("invalid configuration")?;

    let layout = TableLayout::new(&args.target).with_id_columns(args.id_columns.clone());
    let dataset = parse_dataset(&args.input, &layout)
        .with_context(|| format!("failed to load {}", args.input.display()))?;

    let run = shortfall::run(&dataset, &config).context("model comparison failed")?;

    if let Some(path) = &args.split_output {
        run.split
            .write_assignments(path)
            .with_context(|| format!("failed to write split to {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            ratio = run.split.ratio(),
            seed = run.split.seed(),
            "wrote split assignments"
        );
    }
    if let Some(path) = &args.report {
        run.report
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    print!("{}", run.report);
    Ok(())
}
