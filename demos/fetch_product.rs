//! Fetch one product page and print the extracted record as JSON.
//!
//! ```text
//! PROXY_LIST="http://10.0.0.1:3128,http://10.0.0.2:3128" \
//! RUST_LOG=relay_fetch=debug \
//!     cargo run --example fetch_product -- B0EXAMPLE1
//! ```

use std::error::Error;

use relay_fetch::Fetcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let id = std::env::args()
        .nth(1)
        .ok_or("usage: fetch_product <product-id>")?;

    let fetcher = Fetcher::from_env()?;
    println!("relay-fetch {}", relay_fetch::VERSION);
    println!("strategies: {}", fetcher.strategy_names().join(" -> "));

    if !fetcher.pool().is_empty() {
        let summary = fetcher.validate_proxies().await;
        println!("proxies: {}/{} healthy", summary.healthy, summary.total);
    }

    match fetcher.fetch_product(&id).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} ({})", err, err.status_hint());
            for attempt in err.attempts() {
                eprintln!(
                    "  {} #{} via {}: {}",
                    attempt.strategy,
                    attempt.attempt + 1,
                    attempt.endpoint.as_deref().unwrap_or("direct"),
                    attempt.outcome
                );
            }
            Err(err.into())
        }
    }
}
