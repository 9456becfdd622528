use std::sync::Arc;
use std::time::Duration;

use caravan::catalog::RoomCatalog;
use caravan::channel::Channel;
use caravan::provider::{HotelAgent, HotelAgentConfig};
use caravan::relay::RelayChannel;
use caravan::runtime::{run_role, DelayStrategy, EventBus};
use chrono::Utc;
use clap::Parser;

#[derive(Parser)]
#[command(name = "hotel-agent")]
#[command(about = "Provider agent quoting and confirming hotel bookings")]
struct Args {
    #[arg(short, long, default_value = "http://localhost:8600")]
    relay_endpoint: String,

    #[arg(long, default_value = "hotel-agent")]
    agent_id: String,

    #[arg(long, default_value = "0.0.1002")]
    account_id: String,

    /// Pacing delay before each reply, in milliseconds.
    #[arg(long)]
    response_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let channel: Arc<dyn Channel> = Arc::new(
        RelayChannel::new(args.relay_endpoint.clone()).with_poll_interval(Duration::from_millis(250)),
    );
    let events = EventBus::new();

    let agent = HotelAgent::new(
        HotelAgentConfig {
            agent_id: args.agent_id,
            account_id: args.account_id,
            service: "hotel_booking".to_string(),
        },
        RoomCatalog::default(),
        channel.clone(),
        events,
        DelayStrategy::from_millis(args.response_delay_ms),
    );

    println!("Hotel agent connected to {}", args.relay_endpoint);
    run_role(channel, Utc::now(), agent).await?;

    Ok(())
}
