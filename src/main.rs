use slirc_bot::bot::BotClient;
use slirc_bot::config::ClientConfig;
use slirc_bot::plugin::PluginLoader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "slircbot.json".to_string());

    let config = ClientConfig::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let plugin_directory = config.plugin_directory();
    info!(
        config = %config_path,
        plugins = %plugin_directory.display(),
        networks = config.networks.len(),
        modules = config.modules.len(),
        "Starting slirc-bot"
    );

    let loader = PluginLoader::with_builtins(plugin_directory);
    let client = BotClient::from_config(&config, &loader);
    if client.network_names().is_empty() {
        error!("no usable network configured");
        return Err(anyhow::anyhow!("no usable network in {config_path}"));
    }

    if client.run().await == 0 {
        warn!("no network connected");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    client.shutdown().await;
    Ok(())
}
