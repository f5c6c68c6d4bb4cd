//! HTTP pricing service.

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use takura_pricing::api;
use takura_pricing::common::{log, AppCfg, PricingResult};
use takura_pricing::inference::ServiceContext;
use takura_pricing::training::FsModelRepo;

#[derive(Parser, Debug)]
#[command(name = "pricing-api", about = "Serve ride price estimates over HTTP")]
struct Args {
    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<Ipv4Addr>,

    /// Model version to serve
    #[arg(long)]
    version: Option<String>,
}

async fn run(args: Args, mut cfg: AppCfg) -> PricingResult<()> {
    if let Some(port) = args.port {
        cfg.serve.port = port;
    }
    if let Some(host) = args.host {
        cfg.serve.host = host.octets();
    }
    if let Some(version) = args.version {
        cfg.serve.model_version = version;
    }

    let repo = FsModelRepo::new(&cfg.models_dir);
    let ctx = ServiceContext::load(&repo, &cfg.serve.model_version, cfg.serve.max_batch_size)?;
    let addr = SocketAddr::from((cfg.serve.host, cfg.serve.port));
    api::serve(Arc::new(ctx), addr).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let cfg = match AppCfg::load() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("pricing-api: {err}");
            return ExitCode::from(err.code().exit_code() as u8);
        }
    };
    log::init(&cfg.log_filter, cfg.log_json);

    match run(args, cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "pricing api failed");
            ExitCode::from(err.code().exit_code() as u8)
        }
    }
}
