//! # Game Server Library
//!
//! This library provides the authoritative server for the multiplayer 3D
//! game. It owns the canonical world state (every unit's position,
//! orientation, movement flags and health), accepts WebSocket connections,
//! and broadcasts state changes so that every client converges on the same
//! picture of the world.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! Units are created, mutated and destroyed only here. Clients report their
//! own movement, which the server accepts as-is and relays to everyone else;
//! combat, death, experience and respawning are decided on the server.
//!
//! ### Session Lifecycle
//! Each connection is a session moving through
//! `Connecting -> Handshaking -> Active -> Closed`:
//! - the handshake token is sent as soon as the socket is accepted
//! - `Hello` allocates a player unit, answers `Welcome` with its full state,
//!   pushes every other unit as `Spawn` and announces the newcomer
//! - closing the connection despawns the player and releases its id
//!
//! ### Clock Synchronization
//! Every active session is probed with `TimeSync` messages, every two
//! seconds at first and every ten seconds afterwards. Responses feed a
//! per-session clock delta estimator with outlier rejection.
//!
//! ## Architecture Design
//!
//! ### Single World Loop
//! All world mutation happens on one task. Connection tasks decode frames
//! and forward packets over an mpsc channel; the loop interleaves those
//! messages with fixed-rate ticks (20Hz by default). No locks guard the
//! world because nothing else can reach it.
//!
//! ### Fire-and-Forget Sends
//! Sessions queue outbound packets on an unbounded channel drained by the
//! connection's writer task. Broadcasting never waits on the network, and a
//! send to a connection that is already gone is silently dropped.
//!
//! ## Module Organization
//!
//! - `config`: world tunables (`WorldConfig`)
//! - `unit`: unit state, combat binding and progression
//! - `registry`: id allocation and unit storage
//! - `session`: per-connection state machine and outbound queue
//! - `world`: packet handlers, tick, broadcast and world events
//! - `socket`: per-connection WebSocket reader and writer tasks
//! - `network`: listener, acceptor task and the main loop
//! - `utils`: text sanitising and colour helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::WorldConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::BoxError> {
//!     let config = WorldConfig {
//!         monster_count: 3,
//!         ..WorldConfig::default()
//!     };
//!
//!     // Bind the listener, then run the world loop until the process exits
//!     let server = Server::bind("127.0.0.1:3001", config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod network;
pub mod registry;
pub mod session;
pub mod socket;
pub mod unit;
pub mod utils;
pub mod world;

/// Error type returned by the async entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
