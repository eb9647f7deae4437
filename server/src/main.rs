use clap::Parser;
use log::{error, info};
use server::config::{self, SessionConfig};
use server::network::{Server, ServerMessage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Number of seats in the session
    #[arg(short, long, default_value_t = config::DEFAULT_CAPACITY)]
    capacity: u8,

    /// Lowest number in the pool
    #[arg(long, default_value_t = config::DEFAULT_MIN_NUMBER)]
    min: u32,

    /// Highest number in the pool
    #[arg(long, default_value_t = config::DEFAULT_MAX_NUMBER)]
    max: u32,

    /// Draws per round before it ends without a winner
    #[arg(long, default_value_t = config::DEFAULT_MAX_DRAWS)]
    max_draws: usize,

    /// Seconds between draws
    #[arg(short = 'i', long, default_value_t = config::DEFAULT_DRAW_INTERVAL_SECONDS)]
    draw_interval: f32,

    /// Seconds between a start request and the first draw
    #[arg(long, default_value_t = config::DEFAULT_SETTLE_DELAY_SECONDS)]
    settle_delay: f32,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value_t = config::DEFAULT_CLIENT_TIMEOUT_SECONDS)]
    client_timeout: f32,

    /// Seed for reproducible draws
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capacity: self.capacity,
            number_range: (self.min, self.max),
            max_draws: self.max_draws,
            draw_interval_seconds: self.draw_interval,
            start_settle_delay_seconds: self.settle_delay,
            client_timeout_seconds: self.client_timeout,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting session with {} seats, numbers {}..={}, {} draws every {}s",
        args.capacity, args.min, args.max, args.max_draws, args.draw_interval
    );

    let mut server = Server::new(&address, args.session_config()).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = shutdown.send(ServerMessage::Shutdown);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
