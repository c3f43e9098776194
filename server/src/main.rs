use std::sync::Arc;

use clap::Parser;
use log::info;

use server::filter::ContentFilter;
use server::network::{self, AppState, ServerConfig};
use server::notifier::DiscordNotifier;
use server::registry::RoomRegistry;

#[derive(Parser)]
#[command(author, version, about = "Karma Court game server")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 3001)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = Arc::new(ServerConfig::from_env());
    if config.bot_token.is_none() {
        info!("No bot token configured; channel notifications disabled");
    }

    let filter = Arc::new(ContentFilter::new());
    let notifier = Arc::new(DiscordNotifier::new(config.bot_token.clone()));
    let registry = Arc::new(RoomRegistry::new(filter, notifier));

    let state = AppState {
        registry,
        http: reqwest::Client::new(),
        config,
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Karma Court server listening on {}", addr);
    axum::serve(listener, network::build_router(state)).await?;

    Ok(())
}
