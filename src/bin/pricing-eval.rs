//! Evaluate saved model versions against held-out data.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use takura_pricing::common::{log, AppCfg, PricingResult};
use takura_pricing::data::FsTableRepo;
use takura_pricing::evaluation::{report, Evaluator};
use takura_pricing::training::FsModelRepo;

#[derive(Parser, Debug)]
#[command(name = "pricing-eval", about = "Evaluate ride pricing models")]
struct Args {
    /// Evaluate one model version
    #[arg(long)]
    version: Option<String>,

    /// Compare several model versions on one shared split
    #[arg(long, num_args = 1..)]
    compare: Vec<String>,

    /// Show the feature engineering roadmap
    #[arg(long)]
    show_features: bool,
}

const USAGE: &str = "\nUsage:
  pricing-eval --version v2_current
  pricing-eval --compare baseline v1_improved v2_current
  pricing-eval --show-features";

fn run(args: Args, cfg: AppCfg) -> PricingResult<()> {
    let models = FsModelRepo::new(&cfg.models_dir);
    let tables = FsTableRepo::new(&cfg.data);
    let evaluator = Evaluator::new(&models, &tables, &cfg.data);

    if args.show_features {
        println!("{}", report::FeatureRoadmap);
    } else if !args.compare.is_empty() {
        let comparison = evaluator.compare(&args.compare)?;
        println!("{}", report::ComparisonReport(&comparison));
    } else if let Some(version) = args.version {
        let result = evaluator.evaluate_version(&version)?;
        println!("{}", report::EvaluationReport(&result));
    } else {
        println!("{USAGE}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match AppCfg::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("pricing-eval: {err}");
            return ExitCode::from(err.code().exit_code() as u8);
        }
    };
    log::init(&cfg.log_filter, cfg.log_json);

    match run(args, cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "evaluation failed");
            ExitCode::from(err.code().exit_code() as u8)
        }
    }
}
