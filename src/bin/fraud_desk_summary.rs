//! fraud-desk-summary: Transaction totals per list
//!
//! Prints count and amount totals of evaluated transactions for a date
//! range as JSON, split by blacklist, watchlist, stafflist, limit hits and
//! normal transactions.
//!
//! ## Usage
//! ```text
//! fraud-desk-summary <start_date> <end_date> [config.yaml]
//! ```
//! Dates are `YYYY-MM-DD` (UTC, inclusive).
//!
//! ## Configuration
//! - FRAUD_DESK_CONFIG: Path to config file (optional)
//! - FRAUD_DESK__STORAGE__TYPE: `memory` or `dynamo`
//! - FRAUD_DESK_LOG: Log filter (default: info)

use tracing::info;

use fraud_desk::services::SummaryService;
use fraud_desk::utils::bootstrap::{init_tracing, load_and_connect};

const USAGE: &str = "usage: fraud-desk-summary <start_date> <end_date> [config.yaml]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(start_date), Some(end_date)) = (args.next(), args.next()) else {
        return Err(USAGE.into());
    };
    let config_path = args.next();

    let (_config, store) = load_and_connect(config_path.as_deref()).await?;
    info!(start_date = %start_date, end_date = %end_date, "fraud-desk-summary started");

    let summary = SummaryService::new(store)
        .summarize(&start_date, &end_date)
        .await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
