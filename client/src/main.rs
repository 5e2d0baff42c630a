use clap::Parser;
use client::config::ClientConfig;
use client::network::Client;
use client::BoxError;
use log::info;
use shared::netsim::Preset;

/// Headless client for the multiplayer game
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3001")]
    server: String,

    /// Player name sent with Hello
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Simulate a network preset (fiber, dsl, mobile3g, ...)
    #[arg(short = 'p', long)]
    preset: Option<Preset>,

    /// Move around at random
    #[arg(short = 'w', long)]
    wander: bool,

    /// Frames per second
    #[arg(short = 'f', long, default_value = "60")]
    frame_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let config = ClientConfig {
        server_url: args.server,
        player_name: args.name,
        preset: args.preset,
        wander: args.wander,
        frame_rate: args.frame_rate,
    };
    let mut client = Client::new(config);

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    client.shutdown();
    Ok(())
}
