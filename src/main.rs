use anyhow::Context;
use quillgeist::config::get_config;
use quillgeist::extractor::instagram::{InstagramClientFactory, SessionManager};
use quillgeist::router::LinkRouter;
use quillgeist::{bot, build_registry};
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config().context("failed to load configuration")?;
    init_tracing(&config.log_level);
    config.validate()?;

    let sessions = Arc::new(SessionManager::new(
        InstagramClientFactory::new(config.instagram.client_options()),
        config.instagram.credentials(),
        config.instagram.session_file.clone(),
    ));

    // The bot is useless without Instagram, so refuse to start without a session.
    info!("Initializing Instagram client...");
    if let Err(e) = sessions.acquire().await {
        error!(error = %e, "FATAL: Could not initialize Instagram client. Bot cannot start.");
        return Err(e).context("Instagram session initialization failed");
    }

    let registry = build_registry(&config, sessions).context("failed to build HTTP clients")?;
    let router = Arc::new(LinkRouter::new(registry));

    let token = config.telegram.bot_token.clone().unwrap_or_default();
    bot::run(Bot::new(token), router).await;

    info!("Shutting down");
    Ok(())
}
