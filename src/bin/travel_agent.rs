use std::sync::Arc;
use std::time::Duration;

use caravan::bridge;
use caravan::channel::Channel;
use caravan::model::StayDetails;
use caravan::relay::RelayChannel;
use caravan::requester::{TravelAgent, TravelAgentConfig};
use caravan::runtime::{EventBus, RoleHandler};
use caravan::settlement::SettlementService;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

#[derive(Parser)]
#[command(name = "travel-agent")]
#[command(about = "Requester agent negotiating travel bookings")]
struct Args {
    #[arg(short, long, default_value = "http://localhost:8600")]
    relay_endpoint: String,

    #[arg(long, default_value = "travel-agent")]
    agent_id: String,

    #[arg(long, default_value = "0.0.1001")]
    account_id: String,

    #[arg(long, default_value = "500.0")]
    max_budget: f64,

    /// Coverage tier to buy when offered; omit to decline insurance.
    #[arg(long)]
    insurance_tier: Option<String>,

    #[arg(long, default_value = "5000.0")]
    opening_balance: f64,

    /// Serve the WebSocket chat bridge instead of the stdin prompt.
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "8601")]
    bridge_port: u16,
}

/// `<destination> <check-in> <check-out> [rooms]`, dates as YYYY-MM-DD.
fn parse_stay(parts: &[&str]) -> Option<StayDetails> {
    if parts.len() < 3 {
        return None;
    }
    let check_in = NaiveDate::parse_from_str(parts[1], "%Y-%m-%d").ok()?;
    let check_out = NaiveDate::parse_from_str(parts[2], "%Y-%m-%d").ok()?;
    let rooms = parts.get(3).and_then(|raw| raw.parse().ok()).unwrap_or(1);
    Some(StayDetails {
        destination: parts[0].to_string(),
        check_in,
        check_out,
        rooms,
    })
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
    let settlement = SettlementService::new("USD");
    settlement
        .credit(&args.account_id, args.opening_balance)
        .await?;

    let agent = Arc::new(Mutex::new(TravelAgent::new(
        TravelAgentConfig {
            agent_id: args.agent_id,
            account_id: args.account_id.clone(),
            max_budget: args.max_budget,
            insurance_tier: args.insurance_tier,
        },
        channel.clone(),
        settlement.clone(),
        events.clone(),
    )));

    // Dispatch inbound envelopes to the shared agent, one at a time.
    let filter = agent.lock().await.filter();
    let mut subscription = channel.subscribe(Utc::now(), filter).await?;
    let dispatch_agent = agent.clone();
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            if let Err(e) = dispatch_agent.lock().await.handle(envelope).await {
                tracing::error!("handler failed: {}", e);
            }
        }
    });

    if args.serve {
        let (input_tx, mut input_rx) = mpsc::channel::<String>(16);
        let submit_agent = agent.clone();
        tokio::spawn(async move {
            while let Some(line) = input_rx.recv().await {
                let parts: Vec<&str> = line.split_whitespace().collect();
                match parse_stay(&parts) {
                    Some(details) => {
                        if let Err(e) = submit_agent.lock().await.submit_request(details).await {
                            tracing::error!("failed to submit request: {}", e);
                        }
                    }
                    None => tracing::warn!("unparseable chat input: {}", line),
                }
            }
        });

        let app = bridge::router(input_tx, events);
        let listener = TcpListener::bind(format!("127.0.0.1:{}", args.bridge_port)).await?;
        println!("Chat bridge listening on {}", args.bridge_port);
        axum::serve(listener, app).await?;
        return Ok(());
    }

    println!("Travel agent connected to {}", args.relay_endpoint);
    println!("Available commands:");
    println!("  book <destination> <check-in> <check-out> [rooms] - Request a booking");
    println!("  active - Show open negotiation threads");
    println!("  balance - Show account balance");
    println!("  exit - Exit program");

    let mut input = String::new();
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush()?;
        input.clear();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        match input {
            "exit" => break,
            "" => continue,
            "active" => {
                let agent = agent.lock().await;
                for id in agent.active_threads() {
                    println!("Thread {}: {:?}", id, agent.thread_state(id));
                }
            }
            "balance" => {
                println!("Balance: {}", settlement.balance(&args.account_id).await);
            }
            cmd if cmd.starts_with("book") => {
                let parts: Vec<&str> = cmd.split_whitespace().skip(1).collect();
                match parse_stay(&parts) {
                    Some(details) => {
                        match agent.lock().await.submit_request(details).await {
                            Ok(id) => println!("Request submitted. Thread ID: {}", id),
                            Err(e) => println!("Error submitting request: {}", e),
                        }
                    }
                    None => println!("Usage: book <destination> <check-in> <check-out> [rooms]"),
                }
            }
            _ => println!("Unknown command."),
        }
    }

    println!("Travel agent shutting down");
    Ok(())
}
