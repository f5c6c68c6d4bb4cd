//! Train one catalogued model version and optionally persist it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use takura_pricing::common::{log, AppCfg, PricingResult};
use takura_pricing::data::FsTableRepo;
use takura_pricing::training::{registry, FsModelRepo, Trainer};

#[derive(Parser, Debug)]
#[command(name = "pricing-train", about = "Train a ride pricing model")]
struct Args {
    /// Model version to train
    #[arg(long)]
    version: Option<String>,

    /// Save the trained model to disk
    #[arg(long)]
    save: bool,

    /// Directory for saved artifacts (defaults to PRICING_MODELS_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// List catalogued versions and exit
    #[arg(long)]
    list: bool,
}

fn run(args: Args, cfg: AppCfg) -> PricingResult<()> {
    if args.list {
        for d in registry::descriptors() {
            println!("{:<15} {:<6} {}", d.version, d.label, d.description);
        }
        return Ok(());
    }

    let version = args
        .version
        .unwrap_or_else(|| registry::current_version().to_string());
    let tables = FsTableRepo::new(&cfg.data);
    let mut trainer = Trainer::new(&version)?;
    trainer.train(&tables, &cfg.data)?;
    if let Some(summary) = trainer.summary() {
        println!("{summary}");
    }

    if args.save {
        let dir = args.output_dir.unwrap_or(cfg.models_dir);
        let paths = trainer.save(&FsModelRepo::new(dir))?;
        info!(
            model = %paths.model.display(),
            metadata = %paths.metadata.display(),
            "model saved"
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match AppCfg::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("pricing-train: {err}");
            return ExitCode::from(err.code().exit_code() as u8);
        }
    };
    log::init(&cfg.log_filter, cfg.log_json);

    match run(args, cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "training failed");
            ExitCode::from(err.code().exit_code() as u8)
        }
    }
}
