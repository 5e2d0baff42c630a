//! Per-connection transport tasks.
//!
//! Each accepted TCP stream is upgraded to a WebSocket and split in two. The
//! writer task drains the session's [`Outgoing`] queue; the reader loop
//! decodes inbound text frames and forwards each packet to the world loop.
//! Whatever ends the reader (close frame, transport error, stream end), the
//! world receives exactly one `Disconnected` for the session.

use crate::network::ServerMessage;
use crate::session::Outgoing;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::packets::{decode_frame, HANDSHAKE_TOKEN};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type WsSink = futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// Runs one connection until it closes.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    session_id: u32,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    info!("Connection {} established from {}", session_id, addr);

    let (sink, mut stream) = ws.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    if server_tx
        .send(ServerMessage::Connected {
            session_id,
            sender: out_tx,
        })
        .is_err()
    {
        error!("World loop gone, dropping connection {}", session_id);
        return;
    }

    tokio::spawn(write_loop(sink, out_rx, session_id));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_frame(&text) {
                Ok(packets) => {
                    for packet in packets {
                        if server_tx
                            .send(ServerMessage::PacketReceived { session_id, packet })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(e) => warn!("Dropping malformed frame from {}: {}", addr, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => warn!("Ignoring binary frame from {}", addr),
            Ok(_) => {}
            Err(e) => {
                error!("Transport error on connection {}: {}", session_id, e);
                break;
            }
        }
    }

    info!("Connection {} from {} closed", session_id, addr);
    let _ = server_tx.send(ServerMessage::Disconnected { session_id });
}

async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outgoing>, session_id: u32) {
    while let Some(outgoing) = rx.recv().await {
        let message = match outgoing {
            Outgoing::Handshake => Message::Text(HANDSHAKE_TOKEN.to_string()),
            Outgoing::Packet(packet) => Message::Text(packet.encode()),
            Outgoing::Close => {
                let _ = sink.close().await;
                break;
            }
        };

        if let Err(e) = sink.send(message).await {
            debug!("Writer for connection {} stopped: {}", session_id, e);
            break;
        }
    }
}
