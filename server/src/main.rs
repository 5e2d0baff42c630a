use clap::Parser;
use log::info;
use server::config::WorldConfig;
use server::network::Server;
use server::BoxError;

/// Authoritative server for the multiplayer game
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "3001")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Monsters spawned at startup
    #[clap(short, long, default_value = "3")]
    monsters: usize,
    /// Maximum distance at which an attack lands
    #[clap(long, default_value = "2.5")]
    attack_range: f32,
    /// Damage dealt per attack swing
    #[clap(long, default_value = "20")]
    attack_damage: i32,
    /// Delay before a dead unit respawns, in milliseconds
    #[clap(long, default_value = "1000")]
    respawn_delay_ms: f64,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = WorldConfig {
        tick_rate: args.tick_rate,
        monster_count: args.monsters,
        attack_range: args.attack_range,
        attack_damage: args.attack_damage,
        respawn_delay_ms: args.respawn_delay_ms,
        ..WorldConfig::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, config).await?;

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
        })
        .await
}
