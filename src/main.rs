use anyhow::Result;
use api_agent::{Agent, CancellationToken, Config, Request, Route};
use clap::Parser;
use reqwest::Method;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "api-agent", version, about = "Issue one rate-limited API call")]
struct Cli {
    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: Method,

    /// Request path, joined onto API_BASE_URL
    #[arg(short, long)]
    path: String,

    /// Explicit rate-limit route, derived from the path when omitted
    #[arg(short, long)]
    route: Option<String>,

    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("api_agent={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        "Configuration: base_url={}, max_attempts={}",
        config.base_url,
        config.max_attempts
    );

    let agent = Arc::new(
        Agent::init(&config).map_err(|e| anyhow::anyhow!("Failed to create agent: {}", e))?,
    );
    let stop_sweeper = CancellationToken::new();
    let sweeper = agent.spawn_idle_sweeper(config.bucket_idle(), stop_sweeper.clone());

    let mut request = Request::new(cli.method, cli.path);
    if let Some(route) = cli.route {
        request = request.route(Route::new(route));
    }
    if let Some(body) = cli.body {
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("Request body is not valid JSON: {}", e))?;
        request = request.json(&value)?;
    }

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling request");
            canceller.cancel();
        }
    });

    let outcome = agent.execute_with_cancel(request, &cancel).await;
    stop_sweeper.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Idle bucket sweeper failed: {}", e);
    }
    if let Ok(agent) = Arc::try_unwrap(agent) {
        agent.shutdown();
    }

    let response = outcome?;
    println!("{}", response.text());
    Ok(())
}
