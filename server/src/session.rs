//! Server-side per-connection state.
//!
//! A session moves through `Connecting -> Handshaking -> Active -> Closed`.
//! It never touches the socket directly: outbound traffic is queued on an
//! unbounded channel drained by the connection's writer task, so sends from
//! the world loop never wait on network I/O.

use log::{debug, info};
use shared::packets::Packet;
use shared::time_sync::ClockSync;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, handshake token not yet queued
    Connecting,
    /// Handshake token sent, waiting for Hello
    Handshaking,
    /// Bound to a player unit
    Active,
    Closed,
}

/// Work for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// The bare handshake token
    Handshake,
    Packet(Packet),
    Close,
}

#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub state: SessionState,
    sender: mpsc::UnboundedSender<Outgoing>,
    /// Player unit owned by this session once Active
    pub player_id: Option<u32>,
    pub clock_sync: ClockSync,
}

impl Session {
    pub fn new(id: u32, sender: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            sender,
            player_id: None,
            clock_sync: ClockSync::new(),
        }
    }

    /// Queues the handshake token and starts waiting for Hello.
    pub fn begin_handshake(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }

        if self.sender.send(Outgoing::Handshake).is_ok() {
            self.state = SessionState::Handshaking;
        }
    }

    /// Binds the session to its player unit.
    pub fn activate(&mut self, player_id: u32) {
        self.player_id = Some(player_id);
        self.state = SessionState::Active;
        info!("Session {} bound to unit {}", self.id, player_id);
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Queues a packet for this connection.
    ///
    /// Sends on a closed session or a connection whose writer is gone are
    /// dropped silently; returns whether the packet was queued.
    pub fn send(&self, packet: Packet) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }

        match self.sender.send(Outgoing::Packet(packet)) {
            Ok(()) => true,
            Err(_) => {
                debug!("Session {} writer gone, dropping packet", self.id);
                false
            }
        }
    }

    /// Cancels clock sync and asks the writer to close the connection.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        self.clock_sync.cancel();
        self.state = SessionState::Closed;
        let _ = self.sender.send(Outgoing::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = Session::new(3, tx);
        assert_eq!(session.state, SessionState::Connecting);

        session.begin_handshake();
        assert_eq!(session.state, SessionState::Handshaking);
        assert_eq!(rx.try_recv(), Ok(Outgoing::Handshake));

        // A second handshake is a no-op.
        session.begin_handshake();
        assert!(rx.try_recv().is_err());

        session.activate(1);
        assert!(session.is_active());
        assert_eq!(session.player_id, Some(1));

        session.close();
        assert_eq!(session.state, SessionState::Closed);
        assert_eq!(rx.try_recv(), Ok(Outgoing::Close));
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = Session::new(1, tx);

        assert!(session.send(Packet::AttackStop));
        assert_eq!(rx.try_recv(), Ok(Outgoing::Packet(Packet::AttackStop)));

        session.close();
        assert!(!session.send(Packet::AttackStop));
        assert_eq!(rx.try_recv(), Ok(Outgoing::Close));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_writer_is_not_an_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let session = Session::new(1, tx);
        assert!(!session.send(Packet::Despawn { id: 1 }));
    }

    #[test]
    fn test_close_cancels_clock_sync() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new(1, tx);
        session.clock_sync.start(0);
        assert_eq!(session.clock_sync.pending_probes(), 1);

        session.close();
        assert_eq!(session.clock_sync.pending_probes(), 0);
    }
}
