//! # Game Client Library
//!
//! Client side of the multiplayer 3D game: it mirrors the server's units,
//! predicts the local player's movement, and smooths every other unit with
//! dead reckoning so that late or jittery updates do not show up as snaps.
//!
//! ## Architecture Overview
//!
//! ### Local Prediction
//! Input is applied to the local character immediately. The client reports
//! its own position with `Move` messages, at once when input changes and
//! every half second while moving, and the server relays them unchanged.
//!
//! ### Dead Reckoning
//! Remote units keep moving along their last known velocity between updates.
//! When an authoritative position arrives, the jump between where the unit
//! was drawn and where the server says it is becomes an error term that
//! decays over the next frames; the decay speeds up for large corrections.
//!
//! ### Simulated Networks
//! Outbound traffic can be routed through a network simulator preset
//! (fiber, DSL, 3G, ...) to see how the game behaves on a poor link.
//!
//! ## Module Organization
//!
//! - `reconciliation`: dead reckoning and the adaptive correction factor
//! - `character`: client-side unit with movement integration
//! - `entities`: every known unit, keyed by id
//! - `game`: packet handling, input, targeting and outgoing messages
//! - `socket`: WebSocket transport with the optional simulator
//! - `network`: the headless run loop
//! - `config`: client tunables

pub mod character;
pub mod config;
pub mod entities;
pub mod game;
pub mod network;
pub mod reconciliation;
pub mod socket;

/// Error type returned by the async entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
