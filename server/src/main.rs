use clap::Parser;
use log::{error, info};
use server::coordinator::SessionConfig;
use server::network::{Server, ServerOptions};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Players required before the lobby can start a match
    #[arg(long, default_value = "4")]
    min_players: usize,

    /// Roster capacity
    #[arg(long, default_value = "7")]
    max_players: usize,

    /// Maximum open connections, spectators included
    #[arg(long, default_value = "16")]
    max_connections: usize,

    /// Seconds after a match ends before the session resets (0 disables)
    #[arg(long, default_value = "10")]
    reset_after_end: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = SessionConfig {
        min_players: args.min_players,
        max_players: args.max_players,
        reset_after_end: (args.reset_after_end > 0)
            .then(|| Duration::from_secs(args.reset_after_end)),
        ..SessionConfig::default()
    };
    let options = ServerOptions {
        tick_duration: Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1))),
        max_connections: args.max_connections,
        ..ServerOptions::default()
    };

    info!(
        "Starting match server: {}-{} players, {}Hz",
        config.min_players, config.max_players, args.tick_rate
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, options).await?;
    let handle = server.handle();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    }

    Ok(())
}
