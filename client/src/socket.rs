//! Client end of the WebSocket connection.
//!
//! A reader task turns inbound frames into [`SocketEvent`]s and a writer task
//! drains outbound frames. Outbound packets can be routed through a
//! [`NetworkSimulator`] first, in which case they only reach the writer once
//! [`Socket::update`] releases them.

use crate::BoxError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::netsim::{NetworkSimulator, Preset};
use shared::packets::{decode_frame, encode_batch, Packet, HANDSHAKE_TOKEN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// The server sent its handshake token and is ready for Hello.
    Connected,
    Packet(Packet),
    /// Sent exactly once, after which no more events arrive.
    Disconnected,
}

#[derive(Debug)]
enum Command {
    Frame(String),
    Close,
}

pub struct Socket {
    commands: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
    simulator: Option<NetworkSimulator<String>>,
}

impl Socket {
    /// Connects to `url`. With a preset, outbound traffic goes through a
    /// network simulator configured with it.
    pub async fn connect(
        url: &str,
        preset: Option<Preset>,
    ) -> Result<(Socket, mpsc::UnboundedReceiver<SocketEvent>), BoxError> {
        let (ws, _) = connect_async(url).await?;
        info!("Connected to {}", url);

        let (mut sink, mut stream) = ws.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    Command::Frame(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!("Writer stopped: {}", e);
                            break;
                        }
                    }
                    Command::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) if text == HANDSHAKE_TOKEN => {
                        let _ = event_tx.send(SocketEvent::Connected);
                    }
                    Ok(Message::Text(text)) => match decode_frame(&text) {
                        Ok(packets) => {
                            for packet in packets {
                                let _ = event_tx.send(SocketEvent::Packet(packet));
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Transport error: {}", e);
                        break;
                    }
                }
            }

            reader_open.store(false, Ordering::SeqCst);
            info!("Disconnected from server");
            let _ = event_tx.send(SocketEvent::Disconnected);
        });

        let simulator = preset.map(|preset| {
            let mut simulator = NetworkSimulator::new();
            simulator.set_preset(preset);
            simulator
        });

        let socket = Socket {
            commands: command_tx,
            open,
            simulator,
        };
        Ok((socket, event_rx))
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Switches the simulator to `preset`, creating it if needed. Only
    /// packets sent afterwards are affected.
    pub fn set_preset(&mut self, preset: Preset) {
        self.simulator
            .get_or_insert_with(NetworkSimulator::new)
            .set_preset(preset);
    }

    pub fn simulator(&self) -> Option<&NetworkSimulator<String>> {
        self.simulator.as_ref()
    }

    pub fn send(&mut self, packet: &Packet) {
        self.send_frame(packet.encode());
    }

    /// Sends several packets as one frame.
    pub fn send_batch(&mut self, packets: &[Packet]) {
        match packets {
            [] => {}
            [packet] => self.send(packet),
            _ => self.send_frame(encode_batch(packets)),
        }
    }

    fn send_frame(&mut self, frame: String) {
        if !self.is_open() {
            debug!("Dropping frame on closed socket");
            return;
        }

        match self.simulator.as_mut() {
            Some(simulator) => simulator.enqueue(frame),
            None => {
                let _ = self.commands.send(Command::Frame(frame));
            }
        }
    }

    /// Advances the simulator by `dt_ms` and writes whatever it releases.
    pub fn update(&mut self, dt_ms: f64) {
        let Some(simulator) = self.simulator.as_mut() else {
            return;
        };

        for frame in simulator.update(dt_ms) {
            if !self.open.load(Ordering::SeqCst) {
                break;
            }
            let _ = self.commands.send(Command::Frame(frame));
        }
    }

    pub fn close(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}
