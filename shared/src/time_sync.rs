//! Clock synchronization between two peers without a shared clock.
//!
//! The prober sends `TimeSync(seq)` and remembers when it did; the other peer
//! answers `TimeSyncResponse(seq, itsLocalTime)`. Each answer yields one
//! [`ClockSyncSample`]. The six most recent samples are kept, round trips
//! further than one standard deviation above the median are discarded (these
//! are usually retransmissions), and the mean delta of the rest becomes the
//! current clock delta.

use log::debug;
use std::collections::BTreeMap;

/// Number of samples kept in the rolling window.
pub const SAMPLE_WINDOW: usize = 6;

/// Probes sent at the short interval right after the handshake.
pub const FAST_PROBE_COUNT: u32 = 4;
pub const FAST_PROBE_INTERVAL_MS: f64 = 2_000.0;
pub const SLOW_PROBE_INTERVAL_MS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSyncSample {
    pub sequence_index: u32,
    pub sent_at: u64,
    pub round_trip_duration: f64,
    pub clock_delta: f64,
}

/// Prober-side clock sync state for one connection.
///
/// All times are milliseconds on the prober's local clock and are passed in
/// by the caller, which keeps the estimator deterministic under test.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    pending: BTreeMap<u32, u64>,
    next_sequence: u32,
    timer_ms: f64,
    samples: [Option<ClockSyncSample>; SAMPLE_WINDOW],
    latest: Option<ClockSyncSample>,
    clock_delta: f64,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current estimate of `remote clock -> local clock` offset.
    pub fn clock_delta(&self) -> f64 {
        self.clock_delta
    }

    pub fn pending_probes(&self) -> usize {
        self.pending.len()
    }

    /// Sends the first probe, right after the handshake completes.
    pub fn start(&mut self, now: u64) -> u32 {
        self.send_probe(now)
    }

    /// Records a probe as sent at `now` and schedules the next one.
    ///
    /// At most [`SAMPLE_WINDOW`] probes stay outstanding; the oldest
    /// unanswered one is forgotten first.
    ///
    /// Returns the sequence index to put in the `TimeSync` message.
    pub fn send_probe(&mut self, now: u64) -> u32 {
        let sequence_index = self.next_sequence;
        self.pending.insert(sequence_index, now);
        while self.pending.len() > SAMPLE_WINDOW {
            if let Some((dropped, _)) = self.pending.pop_first() {
                debug!("Time sync {} never answered", dropped);
            }
        }

        self.timer_ms = if sequence_index < FAST_PROBE_COUNT {
            FAST_PROBE_INTERVAL_MS
        } else {
            SLOW_PROBE_INTERVAL_MS
        };
        self.next_sequence += 1;

        sequence_index
    }

    /// Advances the probe timer by `dt_ms`.
    ///
    /// Returns the sequence index of a new probe when one is due. Does nothing
    /// until the first probe has been sent, and after [`ClockSync::cancel`].
    pub fn update(&mut self, dt_ms: f64, now: u64) -> Option<u32> {
        if self.timer_ms <= 0.0 {
            return None;
        }

        if dt_ms >= self.timer_ms {
            Some(self.send_probe(now))
        } else {
            self.timer_ms -= dt_ms;
            None
        }
    }

    /// Drops outstanding probes and stops the probe timer.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.timer_ms = 0.0;
    }

    /// Consumes the response to probe `sequence_index`.
    ///
    /// Returns false for unknown or already-consumed sequence indices, which
    /// are otherwise ignored.
    pub fn handle_response(&mut self, sequence_index: u32, remote_time: u64, now: u64) -> bool {
        let Some(sent_at) = self.pending.remove(&sequence_index) else {
            debug!("Ignoring stale time sync response {}", sequence_index);
            return false;
        };

        let round_trip_duration = now.saturating_sub(sent_at) as f64;
        let lag_delay = round_trip_duration / 2.0;
        let clock_delta = sent_at as f64 + lag_delay - remote_time as f64;

        self.record(ClockSyncSample {
            sequence_index,
            sent_at,
            round_trip_duration,
            clock_delta,
        });

        debug!(
            "Time sync {}: rtt {:.0}ms, sample delta {:.1}ms, smoothed delta {:.1}ms",
            sequence_index, round_trip_duration, clock_delta, self.clock_delta
        );
        true
    }

    /// Stores `sample` in its ring slot and recomputes the clock delta.
    pub fn record(&mut self, sample: ClockSyncSample) {
        self.samples[sample.sequence_index as usize % SAMPLE_WINDOW] = Some(sample);
        self.latest = Some(sample);
        self.recompute();
    }

    fn recompute(&mut self) {
        let samples: Vec<&ClockSyncSample> = self.samples.iter().flatten().collect();
        if samples.is_empty() {
            return;
        }

        let mut round_trips: Vec<f64> = samples.iter().map(|s| s.round_trip_duration).collect();
        round_trips.sort_by(f64::total_cmp);

        let median = round_trips[round_trips.len() / 2];
        let variance = round_trips
            .iter()
            .map(|rtt| (rtt - median).powi(2))
            .sum::<f64>()
            / round_trips.len() as f64;
        let threshold = median + variance.sqrt();

        let kept: Vec<f64> = samples
            .iter()
            .filter(|s| s.round_trip_duration < threshold)
            .map(|s| s.clock_delta)
            .collect();

        if kept.is_empty() {
            if let Some(latest) = self.latest {
                self.clock_delta = latest.clock_delta;
            }
        } else {
            self.clock_delta = kept.iter().sum::<f64>() / kept.len() as f64;
        }
    }

    /// Translates a remote timestamp onto the prober's (server) clock.
    ///
    /// Falls back to `local_now` while no delta has been estimated yet or when
    /// the translated time does not fit an unsigned 32-bit millisecond value.
    pub fn to_server_time(&self, remote_time: u64, local_now: u64) -> u64 {
        let translated = (remote_time as f64 + self.clock_delta).floor();
        if self.clock_delta == 0.0 || translated < 0.0 || translated > u32::MAX as f64 {
            debug!(
                "Clock delta {:.1} cannot translate remote time {}, using local time",
                self.clock_delta, remote_time
            );
            local_now
        } else {
            translated as u64
        }
    }
}
