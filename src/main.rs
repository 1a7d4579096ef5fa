// ========================================================================================
//
//                                  vcfcap command line
//
// ========================================================================================
//
// Opens the VCF source, stacks the requested filter stages on top of it, and drives one
// of the two evaluators. Result rows go to stdout; diagnostics go to stderr through the
// logger.

#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::error::Error;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use vcfcap::capacity::compute_capacity;
use vcfcap::config::EvalConfig;
use vcfcap::predict::predict_groups;
use vcfcap::predictor::Strategy;
use vcfcap::shared::files::{open_text_source, read_identifier_list};
use vcfcap::vcf::{IdentifierFilter, IndividualsFilter, Population, RecordStream, VcfStream};

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyCli {
    Nearest,
    Pairwise,
}

impl From<StrategyCli> for Strategy {
    fn from(value: StrategyCli) -> Self {
        match value {
            StrategyCli::Nearest => Strategy::NearestWithMargin,
            StrategyCli::Pairwise => Strategy::PairwiseVote,
        }
    }
}

#[derive(Args)]
pub struct CommonArgs {
    /// Two-column file assigning every individual to a population group
    #[arg(long, value_name = "FILE")]
    pub population: PathBuf,

    /// VCF source, optionally gzip-compressed; standard input when omitted or `-`
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// TOML file with run settings; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Predictor used to turn centroid distances into confidences
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyCli>,

    /// Minimum distance gap (or vote difference) required for a prediction
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Fraction of labelled individuals held out as targets
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Seed for the train/target splits
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fail on unlabelled or missing individuals instead of warning
    #[arg(long)]
    pub strict: bool,

    /// Keep only the individuals listed in this file; VCF column order is preserved
    #[arg(long, value_name = "FILE")]
    pub individuals: Option<PathBuf>,

    /// Keep only the markers whose ID is listed in this file
    #[arg(long, value_name = "FILE")]
    pub markers: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "vcfcap",
    version,
    about = "Measures how well VCF markers predict population labels"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every marker by its predictive capacity
    Capacity {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of random train/target splits per marker
        #[arg(long)]
        repeats: Option<usize>,
    },
    /// Call a population group for held-out individuals from all markers
    Predict {
        #[command(flatten)]
        common: CommonArgs,

        /// Required lead of the best group; values in (0, 1) are relative
        #[arg(long)]
        min_margin: Option<f64>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let result = match Cli::parse().command {
        Commands::Capacity { common, repeats } => run_capacity(common, repeats),
        Commands::Predict { common, min_margin } => run_predict(common, min_margin),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn resolve_config(common: &CommonArgs) -> Result<EvalConfig, Box<dyn Error>> {
    let mut config = match &common.config {
        Some(path) => EvalConfig::load(path)?,
        None => EvalConfig::default(),
    };

    if let Some(strategy) = common.strategy {
        config.strategy = strategy.into();
    }
    if let Some(threshold) = common.threshold {
        config.threshold = threshold;
    }
    if let Some(ratio) = common.ratio {
        config.ratio = ratio;
    }
    if common.seed.is_some() {
        config.seed = common.seed;
    }
    config.strict |= common.strict;
    Ok(config)
}

fn open_records(
    common: &CommonArgs,
    strict: bool,
) -> Result<Box<dyn RecordStream>, Box<dyn Error>> {
    let reader = open_text_source(common.input.as_deref())?;
    let mut stream: Box<dyn RecordStream> = Box::new(VcfStream::from_reader(reader)?);

    if let Some(path) = &common.individuals {
        let filter = IndividualsFilter::new(read_identifier_list(path)?).strict(strict);
        stream = Box::new(stream.pipe(filter)?);
    }
    if let Some(path) = &common.markers {
        let filter = IdentifierFilter::new(read_identifier_list(path)?);
        stream = Box::new(stream.pipe(filter)?);
    }
    Ok(stream)
}

fn run_capacity(common: CommonArgs, repeats: Option<usize>) -> Result<(), Box<dyn Error>> {
    let mut config = resolve_config(&common)?;
    if let Some(repeats) = repeats {
        config.repeats = repeats;
    }
    config.validate()?;

    let population = Population::from_path(&common.population)?;
    let stream = open_records(&common, config.strict)?;
    let mut rng = config.rng();
    let scores = compute_capacity(
        stream,
        &population,
        config.predictor_factory()?,
        &config.capacity_options(),
        &mut rng,
    )?;

    let mut out = BufWriter::new(io::stdout().lock());
    for record in scores {
        writeln!(out, "{}", record?)?;
    }
    out.flush()?;
    Ok(())
}

fn run_predict(common: CommonArgs, min_margin: Option<f64>) -> Result<(), Box<dyn Error>> {
    let mut config = resolve_config(&common)?;
    if let Some(min_margin) = min_margin {
        config.min_margin = min_margin;
    }
    config.validate()?;

    let population = Population::from_path(&common.population)?;
    let stream = open_records(&common, config.strict)?;
    let mut rng = config.rng();
    let calls = predict_groups(
        stream,
        &population,
        config.predictor_factory()?,
        &config.prediction_options(),
        &mut rng,
    )?;

    let mut out = BufWriter::new(io::stdout().lock());
    for call in &calls {
        writeln!(out, "{call}")?;
    }
    out.flush()?;
    Ok(())
}
