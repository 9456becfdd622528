//! Example demonstrating a complete negotiation flow in one process.
//!
//! This example shows how to:
//! 1. Stand up the shared topic and settlement service
//! 2. Wire the three role agents to the channel
//! 3. Submit a booking request within budget (direct acceptance + insurance)
//! 4. Submit a request over budget (one counter-offer round)
//! 5. Inspect the settlement record

use std::sync::Arc;
use std::time::Duration;

use caravan::catalog::{RoomCatalog, RoomRate, DEFAULT_COVERAGE_TIERS};
use caravan::channel::{Channel, InMemoryTopic};
use caravan::insurance::{InsuranceAgent, InsuranceAgentConfig};
use caravan::model::StayDetails;
use caravan::provider::{HotelAgent, HotelAgentConfig};
use caravan::requester::{TravelAgent, TravelAgentConfig};
use caravan::runtime::{run_role, DelayStrategy, EventBus, RoleHandler};
use caravan::session::ThreadState;
use caravan::settlement::SettlementService;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("Caravan negotiation demo");
    println!("========================\n");

    let topic = Arc::new(InMemoryTopic::new());
    let channel: Arc<dyn Channel> = topic.clone();
    let events = EventBus::new();
    let settlement = SettlementService::new("USD");
    settlement.credit("0.0.1001", 2000.0).await?;

    // Narrate everything the agents do.
    let mut narration = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = narration.recv().await {
            println!("  [{}] {}", event.sender, event.content);
        }
    });

    println!("1. Starting hotel and insurance agents...");
    let hotel = HotelAgent::new(
        HotelAgentConfig {
            agent_id: "hotel-agent".to_string(),
            account_id: "0.0.1002".to_string(),
            service: "hotel_booking".to_string(),
        },
        RoomCatalog::new(
            "USD",
            vec![RoomRate {
                room_type: "standard".to_string(),
                price_per_night: 120.0,
                minimum_per_night: 95.0,
            }],
        ),
        channel.clone(),
        events.clone(),
        DelayStrategy::Fixed(Duration::from_millis(50)),
    );
    tokio::spawn(run_role(
        channel.clone(),
        DateTime::<Utc>::MIN_UTC,
        hotel,
    ));

    let insurance = InsuranceAgent::new(
        InsuranceAgentConfig {
            agent_id: "insurance-agent".to_string(),
            account_id: "0.0.1003".to_string(),
        },
        DEFAULT_COVERAGE_TIERS.clone(),
        channel.clone(),
        events.clone(),
        DelayStrategy::Fixed(Duration::from_millis(50)),
    );
    tokio::spawn(run_role(
        channel.clone(),
        DateTime::<Utc>::MIN_UTC,
        insurance,
    ));

    println!("2. Starting travel agent (budget 500, buys basic coverage)...\n");
    let requester = Arc::new(Mutex::new(TravelAgent::new(
        TravelAgentConfig {
            agent_id: "travel-agent".to_string(),
            account_id: "0.0.1001".to_string(),
            max_budget: 500.0,
            insurance_tier: Some("basic".to_string()),
        },
        channel.clone(),
        settlement.clone(),
        events.clone(),
    )));
    let filter = requester.lock().await.filter();
    let mut subscription = channel.subscribe(DateTime::<Utc>::MIN_UTC, filter).await?;
    let dispatch = requester.clone();
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            if let Err(e) = dispatch.lock().await.handle(envelope).await {
                tracing::error!("requester handler failed: {}", e);
            }
        }
    });

    println!("3. Booking 3 nights in Lisbon (360 total, within budget)...");
    let check_in = NaiveDate::from_ymd_opt(2025, 9, 12).unwrap();
    let thread = requester
        .lock()
        .await
        .submit_request(StayDetails {
            destination: "Lisbon".to_string(),
            check_in,
            check_out: check_in + chrono::Duration::days(3),
            rooms: 1,
        })
        .await?;
    wait_for(&requester, thread, ThreadState::Done).await;

    println!("\n4. A second requester books Porto with a 300 budget (forces a counter-offer)...");
    settlement.credit("0.0.1004", 1000.0).await?;
    let requester2 = Arc::new(Mutex::new(TravelAgent::new(
        TravelAgentConfig {
            agent_id: "travel-agent-2".to_string(),
            account_id: "0.0.1004".to_string(),
            max_budget: 300.0,
            insurance_tier: None,
        },
        channel.clone(),
        settlement.clone(),
        events.clone(),
    )));
    let filter = requester2.lock().await.filter();
    let mut subscription = channel.subscribe(Utc::now(), filter).await?;
    let dispatch = requester2.clone();
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            if let Err(e) = dispatch.lock().await.handle(envelope).await {
                tracing::error!("requester handler failed: {}", e);
            }
        }
    });

    let thread = requester2
        .lock()
        .await
        .submit_request(StayDetails {
            destination: "Porto".to_string(),
            check_in,
            check_out: check_in + chrono::Duration::days(3),
            rooms: 1,
        })
        .await?;
    wait_for(&requester2, thread, ThreadState::Done).await;

    println!("\n5. Settlement record:");
    for record in settlement.transactions().await {
        println!(
            "   {} -> {}: {} {} ({})",
            record.from_account, record.to_account, record.amount, record.currency, record.memo
        );
    }
    println!(
        "   Requester balance: {}",
        settlement.balance("0.0.1001").await
    );

    println!("\nDemo completed successfully!");
    Ok(())
}

async fn wait_for(agent: &Arc<Mutex<TravelAgent>>, thread: Uuid, target: ThreadState) {
    for _ in 0..100 {
        if agent.lock().await.thread_state(thread) == Some(target) {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    println!("   (timed out waiting for {:?})", target);
}
