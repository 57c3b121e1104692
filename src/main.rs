//! cacheqos daemon entrypoint.
//!
//! Usage:
//!   cacheqos --config cacheqos.toml
//!   cacheqos --config cacheqos.toml --port 5000 -V
//!
//! Exit codes: 0 clean shutdown, 2 configuration error, 3 hardware or
//! capability error, 4 control-surface error.

use cacheqos::cli::Cli;
use cacheqos::core::config::{Config, ConfigOverrides};
use cacheqos::core::error::{QosError, QosResult};
use cacheqos::core::runtime::Runtime;
use cacheqos::hw::allocator::ResctrlAllocator;
use clap::Parser;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> QosResult<()> {
    let mut config = Config::from_file(&cli.config).map_err(|e| QosError::Config {
        message: format!("{e:#}"),
    })?;
    config.apply_overrides(&ConfigOverrides {
        address: cli.address,
        port: cli.port,
    });

    let mut allocator = ResctrlAllocator::new(&config.hardware);
    let mut runtime = Runtime::new(config);
    runtime.run(&mut allocator).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "terminating");
        std::process::exit(err.exit_code());
    }
}
