use caravan::channel::InMemoryTopic;
use caravan::relay;
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Shared broadcast topic for agent processes")]
struct Args {
    #[arg(short, long, default_value = "8600")]
    port: u16,
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

    let topic = InMemoryTopic::new();
    let app = relay::router(topic);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    println!("Relay listening on {}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
