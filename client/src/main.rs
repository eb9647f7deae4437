use clap::Parser;
use client::network::{BotOptions, Client};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Players required to start, if this client opens the session
    #[arg(short = 'n', long)]
    seats: Option<u8>,

    /// Display name shown to other players
    #[arg(long)]
    name: Option<String>,

    /// Start automatically once the lobby is full (owner only)
    #[arg(long)]
    auto_start: bool,

    /// Reset automatically after each round (owner only)
    #[arg(long)]
    auto_reset: bool,

    /// Seconds to wait before an automatic reset
    #[arg(long, default_value = "5")]
    reset_delay: u64,

    /// Leave after this many rounds
    #[arg(short = 'r', long)]
    rounds: Option<u32>,

    /// Seed for reproducible cards
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let options = BotOptions {
        desired_seat_count: args.seats,
        display_name: args.name,
        auto_start: args.auto_start,
        auto_reset: args.auto_reset,
        reset_delay: Duration::from_secs(args.reset_delay),
        max_rounds: args.rounds,
        seed: args.seed,
        ..BotOptions::default()
    };

    let mut client = Client::new(&args.server, options).await?;
    client.run().await?;

    if let Some(outcome) = client.view().outcome {
        info!("Last round: {:?}", outcome);
    }

    Ok(())
}
