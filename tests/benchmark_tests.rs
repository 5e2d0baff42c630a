//! Performance benchmarks for the hot paths

use client::reconciliation::{error_correction_factor, DeadReckoning};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::config::WorldConfig;
use server::world::World;
use shared::netsim::{NetworkConditions, NetworkSimulator};
use shared::packets::{decode_frame, encode_batch, Packet};
use shared::time_sync::{ClockSync, ClockSyncSample};
use shared::{MovementFlags, UnitSnapshot, Vec3};
use std::time::Instant;

fn snapshot(id: u32) -> UnitSnapshot {
    UnitSnapshot {
        id,
        flags: MovementFlags::FORWARD,
        name: format!("Player{}", id),
        position: Vec3::new(id as f32, 0.0, 2.5),
        orientation: 1.25,
        color: 0x3366ff,
        max_health: 100,
        current_health: 80,
    }
}

/// Benchmarks encoding and decoding single messages
#[test]
fn benchmark_packet_codec() {
    let packet = Packet::MoveUpdate {
        id: 7,
        flags: MovementFlags::FORWARD | MovementFlags::STRAFE_LEFT,
        position: Vec3::new(3.5, 0.0, -2.25),
        orientation: 0.5,
    };

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let text = packet.encode();
        let decoded = decode_frame(&text).expect("decode");
        assert_eq!(decoded.len(), 1);
    }

    let duration = start.elapsed();
    println!(
        "Packet codec: {} round trips in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds even in debug builds
    assert!(duration.as_secs() < 5);
}

/// Benchmarks decoding a large batched frame
#[test]
fn benchmark_batch_decode() {
    let batch: Vec<Packet> = (1..=200).map(|id| Packet::Spawn(snapshot(id))).collect();
    let frame = encode_batch(&batch);

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        let decoded = decode_frame(&frame).expect("decode");
        assert_eq!(decoded.len(), batch.len());
    }

    let duration = start.elapsed();
    println!(
        "Batch decode: {} frames of {} messages in {:?}",
        iterations,
        batch.len(),
        duration
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks dead reckoning for many remote units
#[test]
fn benchmark_dead_reckoning() {
    let mut units: Vec<DeadReckoning> = (0..100)
        .map(|i| DeadReckoning::new(Vec3::new(i as f32, 0.0, 0.0)))
        .collect();
    let velocity = Vec3::new(8.0, 0.0, 0.0);

    let frames = 6_000;
    let start = Instant::now();

    for frame in 0..frames {
        for (i, unit) in units.iter_mut().enumerate() {
            // One authoritative update every 10 frames, slightly off course
            if frame % 10 == i % 10 {
                let target = unit.position().add(&Vec3::new(0.3, 0.0, 0.1));
                unit.correct(target);
            }
            unit.advance(velocity, 1.0 / 60.0);
        }
    }

    let duration = start.elapsed();
    println!(
        "Dead reckoning: {} unit-frames in {:?}",
        frames * units.len(),
        duration
    );

    assert!(duration.as_secs() < 5);
    assert!(units.iter().all(|u| u.error().length() < 1.0));
}

/// Benchmarks the correction factor ramp
#[test]
fn benchmark_error_correction_factor() {
    let iterations = 1_000_000;
    let start = Instant::now();

    let mut sum = 0.0f32;
    for i in 0..iterations {
        sum += error_correction_factor((i % 200) as f32 * 0.01);
    }

    let duration = start.elapsed();
    println!("Correction factor: {} calls in {:?}", iterations, duration);

    assert!(sum > 0.0);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks clock delta recomputation
#[test]
fn benchmark_clock_sync_recompute() {
    let mut sync = ClockSync::new();

    let iterations = 100_000u32;
    let start = Instant::now();

    for i in 0..iterations {
        sync.record(ClockSyncSample {
            sequence_index: i,
            sent_at: u64::from(i) * 2_000,
            round_trip_duration: 40.0 + f64::from(i % 7),
            clock_delta: 250.0,
        });
    }

    let duration = start.elapsed();
    println!("Clock sync: {} samples in {:?}", iterations, duration);

    assert!((sync.clock_delta() - 250.0).abs() < 1e-9);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks the network simulator queue under load
#[test]
fn benchmark_network_simulator() {
    let mut sim = NetworkSimulator::with_rng(StdRng::seed_from_u64(11));
    sim.set_conditions(NetworkConditions::new(50, 20, 5));

    let messages = 20_000;
    let start = Instant::now();

    let mut delivered = 0;
    for i in 0..messages {
        sim.enqueue(i);
        delivered += sim.update(1.0).len();
    }
    while sim.pending() > 0 {
        delivered += sim.update(10.0).len();
    }

    let duration = start.elapsed();
    println!("Network simulator: {} messages in {:?}", messages, duration);

    assert_eq!(delivered, messages);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks world ticks with many monsters fighting nothing
#[test]
fn benchmark_world_tick() {
    let config = WorldConfig {
        monster_count: 200,
        ..WorldConfig::default()
    };
    let mut world = World::with_rng(config, StdRng::seed_from_u64(5));

    let ticks = 2_000u64;
    let start = Instant::now();

    for tick in 0..ticks {
        world.update(50.0, tick * 50);
    }

    let duration = start.elapsed();
    println!("World tick: {} ticks with 200 monsters in {:?}", ticks, duration);

    assert_eq!(world.units().count(), 200);
    assert!(duration.as_secs() < 5);
}
