use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use ensemble_node::{
    cli::{Args, Launch},
    Harness, HarnessConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Execution diagnostics go to stderr untouched; everything else to stdout.
    let (execution_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let execution_layer = tracing_subscriber::fmt::layer()
        .with_writer(execution_writer)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "execution"
        }));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_filter(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,ensemble_node=debug".into()))
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "execution"
        }));

    tracing_subscriber::registry()
        .with(execution_layer)
        .with(stdout_layer)
        .init();

    let id = match args.launch() {
        Ok(Launch::Run(id)) => id,
        Ok(Launch::Usage) => {
            println!("id is required!");
            println!("{}", Args::usage());
            return Ok(());
        }
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let config = match &args.config {
        Some(path) => HarnessConfig::load_from_file(path),
        None => {
            let config = HarnessConfig::default();
            config.validate().map(|_| config)
        }
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(path) = &args.write_config {
        config.save_to_file(path)?;
        info!("configuration written to {}", path.display());
    }

    let harness = Harness::new(config, id, args.restore, args.concurrent);
    match harness.run().await {
        Ok(stats) => {
            println!("\n{}\n", stats);
            Ok(())
        }
        Err(e) => {
            error!("replica {} aborted: {}", id, e);
            Err(e.into())
        }
    }
}
