use anyhow::Context;
use chatstream::configuration::get_configuration;
use chatstream::server::config::configure_app;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = get_configuration().context("Failed to load configuration")?;
    let app = configure_app(&settings).context("Failed to configure application")?;

    let addr = format!(
        "{}:{}",
        settings.application.host, settings.application.port
    );
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("✨ Server ready:");
    info!("  🌎 http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
