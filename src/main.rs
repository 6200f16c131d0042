//! vmrelay - line-based VM control relay.

mod cli;

use anyhow::Context;
use cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vmrelay::config::Config;
use vmrelay::error::RelayError;
use vmrelay::interpreter::RelayContext;
use vmrelay::{backend, logging, server};

#[tokio::main]
async fn main() {
    // Loaded before argument parsing so `.env` can supply VMRELAY_CONFIG.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring .env: {}", e),
    }

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RelayError>() {
            Some(relay) => error!("{}: {}", relay.category(), relay),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();
    cli.apply_to(&mut config);
    if let Err(msg) = cli.validate(&config) {
        anyhow::bail!(msg);
    }

    let backend = backend::from_config(&config.backend, cli.seed.as_deref())?;
    info!("Using backend: {}", backend.label());
    let ctx = RelayContext::new(backend, config.interpreter.clone());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            signal_token.cancel();
        }
    });

    if cli.stdio {
        let end = server::serve_stdio(ctx, shutdown).await?;
        info!(?end, "Session ended");
        return Ok(());
    }

    let addr = config.server.listen_addr()?;
    let listener = server::bind(addr)
        .await
        .with_context(|| format!("starting relay on {addr}"))?;
    server::serve_tcp(listener, ctx, config.server.idle_timeout(), shutdown).await?;
    Ok(())
}
