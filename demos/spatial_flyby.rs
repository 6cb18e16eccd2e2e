//! An emitter circling the listener's head while a looping tone plays
//! through it. Listen for the left-right sweep and the level falling as the
//! orbit carries the tone behind and away.
//!
//! Run with: cargo run --example spatial_flyby

use anyhow::Result;
use farfield::{Anchor, FarfieldConfig, FarfieldEngine, FarfieldWorld, LoopMode, Pose, Vec3};
use std::f32::consts::{PI, TAU};
use std::thread;
use std::time::{Duration, Instant};

const SOURCE_RATE: u32 = 44100;
const ORBIT_RADIUS: f32 = 3.0;

/// A one-second sine burst with a half-sine envelope, at a deliberately
/// mismatched source rate so registration exercises the resampler.
fn tone(frequency: f32, seconds: f32) -> Vec<f32> {
    let frames = (seconds * SOURCE_RATE as f32) as usize;
    (0..frames)
        .map(|i| {
            let t = i as f32 / SOURCE_RATE as f32;
            let envelope = (PI * i as f32 / frames as f32).sin();
            0.4 * envelope * (TAU * frequency * t).sin()
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let config = FarfieldConfig::new().workers(2);
    let world = FarfieldWorld::new(config.clone())?;

    let pipeline = world.add_listener();
    let listener = pipeline.listener_id();
    world.set_listener_pose(listener, Pose::identity())?;

    let mut engine = FarfieldEngine::new(config, pipeline)?;
    engine.start()?;

    let hum = world.register_samples(&tone(220.0, 1.0), SOURCE_RATE)?;
    let emitter = world.add_emitter(Vec3::new(ORBIT_RADIUS, 0.0, 0.0));
    world.play(hum, Anchor::Tracking(emitter), LoopMode::Infinite)?;
    log::info!("Emitter orbiting at {} m", ORBIT_RADIUS);

    let orbit_period = Duration::from_secs(6);
    let speed = TAU * ORBIT_RADIUS / orbit_period.as_secs_f32();
    let start = Instant::now();
    while start.elapsed() < orbit_period * 3 {
        let angle = TAU * start.elapsed().as_secs_f32() / orbit_period.as_secs_f32();
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * ORBIT_RADIUS;
        let tangent = Vec3::new(-angle.sin(), 0.0, angle.cos());
        world.set_emitter(emitter, position, tangent * speed)?;

        for event in world.poll_events() {
            log::info!("{:?}", event);
        }
        thread::sleep(Duration::from_millis(16));
    }

    world.stop_all();
    thread::sleep(Duration::from_millis(100));
    engine.stop();
    log::info!("Flyby complete after {} frames", engine.frames_processed());
    Ok(())
}
