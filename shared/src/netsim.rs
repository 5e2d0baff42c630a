//! Artificial network conditions for local testing.
//!
//! Outgoing messages are queued and released later to emulate latency and
//! jitter. Packet loss is modelled the way a TCP connection experiences it:
//! the message is not dropped but retransmitted after another round of
//! latency, so it arrives late instead of never.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Retransmissions after which a message is delivered regardless of loss.
pub const MAX_RETRANSMISSIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConditions {
    pub latency_ms: u32,
    /// Maximum +/- variance applied to the latency.
    pub jitter_ms: u32,
    /// Loss probability as a percentage, 0 to 100.
    pub packet_loss: u8,
}

impl NetworkConditions {
    pub const fn new(latency_ms: u32, jitter_ms: u32, packet_loss: u8) -> Self {
        Self {
            latency_ms,
            jitter_ms,
            packet_loss,
        }
    }

    pub const fn perfect() -> Self {
        Self::new(0, 0, 0)
    }
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Preset::default().conditions()
    }
}

/// Named connection profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    Broadband,
    #[default]
    Fiber,
    Cable,
    Dsl,
    Satellite,
    Congested,
    Mobile2g,
    Mobile2_5g,
    Mobile2_75g,
    Mobile3g,
    Mobile3_5g,
    Mobile3_75g,
    Mobile4g,
    Mobile4_5g,
    Mobile5g,
}

impl Preset {
    pub const ALL: [Preset; 15] = [
        Preset::Broadband,
        Preset::Fiber,
        Preset::Cable,
        Preset::Dsl,
        Preset::Satellite,
        Preset::Congested,
        Preset::Mobile2g,
        Preset::Mobile2_5g,
        Preset::Mobile2_75g,
        Preset::Mobile3g,
        Preset::Mobile3_5g,
        Preset::Mobile3_75g,
        Preset::Mobile4g,
        Preset::Mobile4_5g,
        Preset::Mobile5g,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Preset::Broadband => "broadband",
            Preset::Fiber => "fiber",
            Preset::Cable => "cable",
            Preset::Dsl => "dsl",
            Preset::Satellite => "satellite",
            Preset::Congested => "congested",
            Preset::Mobile2g => "mobile2g",
            Preset::Mobile2_5g => "mobile2_5g",
            Preset::Mobile2_75g => "mobile2_75g",
            Preset::Mobile3g => "mobile3g",
            Preset::Mobile3_5g => "mobile3_5g",
            Preset::Mobile3_75g => "mobile3_75g",
            Preset::Mobile4g => "mobile4g",
            Preset::Mobile4_5g => "mobile4_5g",
            Preset::Mobile5g => "mobile5g",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Preset::Broadband => "Home Broadband [WIFI, Cable, Console, PC]",
            Preset::Fiber => "Home Fiber [Best real-world scenario]",
            Preset::Cable => "Home Cable [Optimal real-world scenario]",
            Preset::Dsl => "Home DSL [ADSL or VDSL]",
            Preset::Satellite => "Home Satellite [low Earth orbit]",
            Preset::Congested => "Home Broadband with Congested Network",
            Preset::Mobile2g => "Mobile 2G [CDMA & GSM, '00]",
            Preset::Mobile2_5g => "Mobile 2.5G [GPRS, G, '00]",
            Preset::Mobile2_75g => "Mobile 2.75G [Edge, E, '06]",
            Preset::Mobile3g => "Mobile 3G [WCDMA & UMTS, '03]",
            Preset::Mobile3_5g => "Mobile 3.5G [HSDPA, H, '06]",
            Preset::Mobile3_75g => "Mobile 3.75G [HDSDPA+, H+, '11]",
            Preset::Mobile4g => "Mobile 4G [4G, LTE, '13]",
            Preset::Mobile4_5g => "Mobile 4.5G [4G+, LTE-A, '16]",
            Preset::Mobile5g => "Mobile 5G ['20]",
        }
    }

    pub fn conditions(&self) -> NetworkConditions {
        match self {
            Preset::Broadband => NetworkConditions::new(32, 12, 2),
            Preset::Fiber => NetworkConditions::new(10, 1, 0),
            Preset::Cable => NetworkConditions::new(25, 5, 2),
            Preset::Dsl => NetworkConditions::new(30, 10, 0),
            Preset::Satellite => NetworkConditions::new(100, 10, 0),
            Preset::Congested => NetworkConditions::new(50, 50, 1),
            Preset::Mobile2g => NetworkConditions::new(520, 50, 7),
            Preset::Mobile2_5g => NetworkConditions::new(480, 40, 7),
            Preset::Mobile2_75g => NetworkConditions::new(440, 40, 7),
            Preset::Mobile3g => NetworkConditions::new(360, 30, 7),
            Preset::Mobile3_5g => NetworkConditions::new(160, 30, 6),
            Preset::Mobile3_75g => NetworkConditions::new(130, 30, 6),
            Preset::Mobile4g => NetworkConditions::new(100, 20, 4),
            Preset::Mobile4_5g => NetworkConditions::new(80, 20, 4),
            Preset::Mobile5g => NetworkConditions::new(30, 20, 4),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .iter()
            .copied()
            .find(|preset| preset.key() == s)
            .ok_or_else(|| {
                let keys: Vec<&str> = Preset::ALL.iter().map(Preset::key).collect();
                format!("unknown preset '{}', expected one of: {}", s, keys.join(", "))
            })
    }
}

#[derive(Debug)]
struct Queued<T> {
    due_at: f64,
    conditions: NetworkConditions,
    retransmissions: u32,
    payload: T,
}

/// Delays, jitters and retransmits queued messages.
///
/// Conditions are captured per message at enqueue time, so switching presets
/// only affects messages enqueued afterwards. The queue is drained head first
/// and stops at the first message that is not yet due, so messages are never
/// reordered even when jitter would make a later one due earlier.
#[derive(Debug)]
pub struct NetworkSimulator<T> {
    conditions: NetworkConditions,
    elapsed_ms: f64,
    queue: VecDeque<Queued<T>>,
    rng: StdRng,
}

impl<T> Default for NetworkSimulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NetworkSimulator<T> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            conditions: NetworkConditions::default(),
            elapsed_ms: 0.0,
            queue: VecDeque::new(),
            rng,
        }
    }

    pub fn conditions(&self) -> NetworkConditions {
        self.conditions
    }

    pub fn set_conditions(&mut self, conditions: NetworkConditions) {
        self.conditions = conditions;
    }

    pub fn set_preset(&mut self, preset: Preset) {
        debug!("Network simulator preset: {}", preset.label());
        self.conditions = preset.conditions();
    }

    /// Simulated time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Number of messages not yet delivered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue(&mut self, payload: T) {
        let conditions = self.conditions;
        let due_at = self.elapsed_ms + self.delay(&conditions);
        self.queue.push_back(Queued {
            due_at,
            conditions,
            retransmissions: 0,
            payload,
        });
    }

    /// Releases every message due at the current simulated time, then
    /// advances the clock by `dt_ms`.
    pub fn update(&mut self, dt_ms: f64) -> Vec<T> {
        let mut delivered = Vec::new();

        while let Some(head) = self.queue.front() {
            if head.due_at > self.elapsed_ms {
                break;
            }

            let conditions = head.conditions;
            let lost = head.retransmissions < MAX_RETRANSMISSIONS
                && self.rng.gen_range(0.0..100.0) < f64::from(conditions.packet_loss);

            if lost {
                let delay = self.delay(&conditions);
                if let Some(head) = self.queue.front_mut() {
                    head.due_at += delay;
                    head.retransmissions += 1;
                    debug!(
                        "Simulated loss, retransmission {} in {:.0}ms",
                        head.retransmissions, delay
                    );
                }
                break;
            }

            if let Some(head) = self.queue.pop_front() {
                delivered.push(head.payload);
            }
        }

        self.elapsed_ms += dt_ms;
        delivered
    }

    fn delay(&mut self, conditions: &NetworkConditions) -> f64 {
        let jitter = i64::from(conditions.jitter_ms);
        let offset = if jitter > 0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0
        };
        (i64::from(conditions.latency_ms) + offset).max(0) as f64
    }
}
