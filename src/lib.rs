//! # Farfield
//!
//! Asynchronous spatial audio mixing that keeps rendering off the real-time
//! audio callback.
//!
//! Farfield splits playback across three roles: a control-thread world that
//! owns assets, emitters, and listeners; a worker pool that renders
//! spatialized stereo one buffer ahead of time; and a per-listener pipeline
//! that runs inside the audio callback and only ever swaps and adds buffers.
//! The callback never waits on a render: if a buffer is late, the previous
//! one plays again and the engine reports the overrun as an event.
//!
//! ## Quick Start
//!
//! ```no_run
//! use farfield::{Anchor, FarfieldConfig, FarfieldEngine, FarfieldWorld, LoopMode, Vec3};
//!
//! // 48 kHz stereo output, two render workers.
//! let config = FarfieldConfig::new().workers(2);
//! let world = FarfieldWorld::new(config.clone())?;
//!
//! // The pipeline is the audio-thread half; the engine drives it from the
//! // default output device.
//! let pipeline = world.add_listener();
//! let mut engine = FarfieldEngine::new(config, pipeline)?;
//! engine.start()?;
//!
//! // Register a mono clip at its source rate; it is resampled on load.
//! let samples = vec![0.0f32; 4800];
//! let asset = world.register_samples(&samples, 44100)?;
//!
//! // Play it two meters right, three ahead of the listener.
//! world.play(
//!     asset,
//!     Anchor::Static(Vec3::new(2.0, 0.0, -3.0)),
//!     LoopMode::Infinite,
//! )?;
//!
//! // Drain playback events from the game loop.
//! for event in world.poll_events() {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), farfield::FarfieldError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`FarfieldWorld`]**: Control-thread API for assets, emitters,
//!   listeners, and playback
//! - **[`ListenerPipeline`]**: Per-listener mix state machine driven by the
//!   audio callback
//! - **[`OffloadWorkerPool`]**: Render threads that fill buffers away from
//!   the callback
//! - **[`FarfieldEngine`]**: cpal adapter that runs a pipeline on the default
//!   output device
//! - **[`FarfieldEvent`]**: Playback notifications (started, completed,
//!   looped, overruns)
//!
//! ## Architecture
//!
//! Each listener owns two interleaved stereo buffers that trade places once
//! per callback:
//!
//! 1. **Control thread**: owns [`FarfieldWorld`], registers samples, moves
//!    emitters, admits calls
//! 2. **Audio callback**: runs [`ListenerPipeline::mix_into`]; swaps in the
//!    finished buffer, mixes it out, dispatches the next render
//! 3. **Render workers**: spatialize a frozen snapshot of the active calls
//!    into the free buffer
//!
//! The callback path takes no blocking locks and allocates only when the
//! host changes its buffer size. Sample data is shared immutably, so one
//! clip can back any number of simultaneous calls.

pub mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod math;
pub mod pipeline;
pub mod spatial;
pub mod store;
pub mod worker;
pub mod world;

pub use call::{Anchor, CallId, LoopMode, SoundCall};
pub use config::FarfieldConfig;
pub use engine::FarfieldEngine;
pub use error::{FarfieldError, Result};
pub use events::FarfieldEvent;
pub use math::{Pose, Quat, Vec3};
pub use pipeline::{ListenerPipeline, PipelineCommand};
pub use spatial::{Channel, ListenerSnapshot, DISTANCE_FLOOR};
pub use store::SampleStore;
pub use worker::{OffloadWorkerPool, RenderTask};
pub use world::{AssetId, EmitterId, EmitterState, FarfieldWorld, ListenerId};
