use crate::infra::Registry;
use chrono::Utc;
use clap::Args;
use flat_registry::config::AppConfig;
use flat_registry::error::AppError;
use flat_registry::notifications::DrainOutcome;
use flat_registry::records::{
    Flat, FlatStatus, NewFlat, NewHouse, RecordServiceError, RequestContext, UserRole,
};
use flat_registry::telemetry;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of subscribers registered on the demo house
    #[arg(long, default_value_t = 3)]
    pub(crate) subscribers: usize,
    /// Simulated delivery latency per notification, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub(crate) latency_ms: u64,
    /// Target status both moderators request
    #[arg(long, default_value = "approved")]
    pub(crate) target: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    config.notifications.simulated_latency = Duration::from_millis(args.latency_ms);
    telemetry::init(&config.telemetry)?;

    let target = FlatStatus::parse(&args.target).map_err(RecordServiceError::from)?;
    let registry = Registry::in_memory(&config);
    let records = &registry.records;

    println!("== Flat registry demo ({})", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));

    let house = records
        .houses
        .create(NewHouse {
            address: "21 Lantern Street".to_string(),
            year: 2019,
            developer: Some("Harbourline Developments".to_string()),
        })
        .await?;
    println!("house #{} at {} ({})", house.id, house.address, house.year);

    for n in 0..args.subscribers {
        let email = records
            .houses
            .subscribe(house.id, &format!("tenant{}@example.com", n + 1))
            .await?;
        println!("  subscribed {email}");
    }

    let flat = records
        .flats
        .create(NewFlat {
            house_id: house.id,
            flat_number: 1,
            price: 185_000,
            rooms: 2,
        })
        .await?;
    println!(
        "flat #{} listed as {} ({} notification batch pending)",
        flat.flat_number,
        flat.status,
        registry.drain.outstanding()
    );

    println!("two moderators request '{target}' at once:");
    let (first_ctx, second_ctx) = (RequestContext::new(), RequestContext::new());
    let (first, second) = tokio::join!(
        records.flats.transition(&first_ctx, flat.id, target),
        records.flats.transition(&second_ctx, flat.id, target),
    );
    print_outcome("moderator A", &first);
    print_outcome("moderator B", &second);

    let visible = records.houses.flats(house.id, UserRole::Client).await?;
    println!("clients now see {} flat(s) in house #{}", visible.len(), house.id);

    match registry
        .drain
        .wait_with_timeout(config.server.drain_timeout)
        .await
    {
        DrainOutcome::Drained => println!("all notification batches delivered"),
        DrainOutcome::TimedOut { outstanding } => {
            println!("{outstanding} notification batch(es) abandoned after drain timeout")
        }
    }

    Ok(())
}

fn print_outcome(label: &str, outcome: &Result<Flat, RecordServiceError>) {
    match outcome {
        Ok(flat) => println!("  {label}: flat #{} is now {}", flat.flat_number, flat.status),
        Err(err) => println!("  {label}: rejected ({err})"),
    }
}
