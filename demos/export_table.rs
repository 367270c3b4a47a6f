//! Exports a thing type to CSV.
//!
//! Reads the client configuration from `BUBBLE_*` environment variables:
//!
//! ```text
//! BUBBLE_BASE_URL=https://myapp.bubbleapps.io BUBBLE_API_TOKEN=... \
//!     cargo run --example export_table -- User users.csv
//! ```
//!
//! Set `RUST_LOG=bubble_api=debug` to see every page request.

use bubble_api::{Client, CsvSink, Error, Query};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(thing_type), Some(output)) = (args.next(), args.next()) else {
        eprintln!("usage: export_table <thing type> <output.csv> [workers]");
        std::process::exit(2);
    };
    let workers = args.next().and_then(|w| w.parse().ok()).unwrap_or(4);

    let client = Client::from_env()?;
    println!("Client: {:?}", client);

    let total = client.count_objects(&thing_type, &[]).await?;
    println!("{} has {} things", thing_type, total);

    let mut sink = CsvSink::from_path(&output)?;
    let written = client
        .fetch_all_into(&thing_type, Query::new(), workers, &mut sink)
        .await?;
    println!("Wrote {} rows to {}", written, output);

    Ok(())
}
