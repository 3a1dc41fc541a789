use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Nickname shown to the other players
    #[arg(short = 'n', long, default_value = "player")]
    nickname: String,

    /// Do not flag ready in the lobby
    #[arg(long)]
    no_ready: bool,

    /// Leave once the first match has been decided
    #[arg(long)]
    single_match: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let options = ClientOptions {
        nickname: args.nickname,
        auto_ready: !args.no_ready,
        ..ClientOptions::default()
    };
    let mut client = Client::new(&args.server, options).await?;

    if args.single_match {
        client.run_until(|state| state.result().is_some()).await?;
        if let Some(result) = client.state().result() {
            info!("{} win", result.winning_team);
            match client.state().won() {
                Some(true) => info!("We won as {}", client.state().role()),
                Some(false) => info!("We lost as {}", client.state().role()),
                None => info!("We watched without a role"),
            }
            for (nickname, role) in &result.revealed_roles {
                info!("  {} was {}", nickname, role);
            }
        }
        client.leave().await?;
    } else {
        client.run().await?;
    }

    Ok(())
}
