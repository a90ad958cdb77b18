use chart_proxy::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!(
        port = config.port,
        rewrite_dependencies = config.rewrite_dependencies,
        "starting chart proxy"
    );

    let shutdown = CancellationToken::new();
    let handle = chart_proxy::start_server(config, shutdown.clone()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();
    let _ = handle.await;
    Ok(())
}
