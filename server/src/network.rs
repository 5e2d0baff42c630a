//! Server network layer: accepting connections and driving the world loop

use crate::config::WorldConfig;
use crate::session::Outgoing;
use crate::socket::handle_connection;
use crate::world::World;
use crate::BoxError;
use log::{debug, error, info};
use shared::packets::Packet;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from connection tasks to the world loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        session_id: u32,
        sender: mpsc::UnboundedSender<Outgoing>,
    },
    PacketReceived {
        session_id: u32,
        packet: Packet,
    },
    Disconnected {
        session_id: u32,
    },
}

/// Authoritative game server: one listener plus the single world loop
pub struct Server {
    listener: TcpListener,
    world: World,
}

impl Server {
    pub async fn bind(addr: &str, config: WorldConfig) -> Result<Self, BoxError> {
        Self::with_world(addr, World::new(config)).await
    }

    pub async fn with_world(addr: &str, world: World) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server { listener, world })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BoxError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns the task that accepts connections and hands out session ids
    fn spawn_acceptor(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerMessage>) {
        tokio::spawn(async move {
            let mut next_session_id: u32 = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let session_id = next_session_id;
                        next_session_id = next_session_id.wrapping_add(1).max(1);
                        debug!("Accepted {} as session {}", addr, session_id);

                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            session_id,
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }

                if server_tx.is_closed() {
                    break;
                }
            }
        });
    }

    /// Runs until the process is killed
    pub async fn run(self) -> Result<(), BoxError> {
        self.run_until(std::future::pending()).await
    }

    /// Main server loop: inbound messages and fixed-rate ticks, both applied
    /// to the world from this one task. When `shutdown` resolves every
    /// session is closed and the loop returns.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BoxError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            mut world,
        } = self;

        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        Self::spawn_acceptor(listener, server_tx);

        let started = Instant::now();
        let mut tick_interval = interval(world.config().tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },

                message = server_rx.recv() => {
                    let now = started.elapsed().as_millis() as u64;
                    match message {
                        Some(ServerMessage::Connected { session_id, sender }) => {
                            world.add_session(session_id, sender);
                        },
                        Some(ServerMessage::PacketReceived { session_id, packet }) => {
                            world.handle_packet(session_id, packet, now);
                        },
                        Some(ServerMessage::Disconnected { session_id }) => {
                            world.remove_session(session_id);
                        },
                        None => break,
                    }
                },

                _ = tick_interval.tick() => {
                    let tick_now = Instant::now();
                    let dt_ms = tick_now.duration_since(last_tick).as_secs_f64() * 1000.0;
                    last_tick = tick_now;

                    world.update(dt_ms, started.elapsed().as_millis() as u64);

                    // Periodic performance monitoring
                    if world.tick() % 200 == 0 && world.session_count() > 0 {
                        debug!(
                            "Tick {}: {} sessions, {} units, {:.1}ms frame",
                            world.tick(),
                            world.session_count(),
                            world.units().count(),
                            dt_ms
                        );
                    }
                },
            }
        }

        world.shutdown();
        Ok(())
    }
}
