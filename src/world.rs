//! World facade: sample assets, emitters, listeners, and call admission.

use crate::call::{Anchor, CallId, LoopMode, SoundCall};
use crate::config::FarfieldConfig;
use crate::error::{FarfieldError, Result};
use crate::events::{FarfieldEvent, EVENT_CAPACITY};
use crate::math::{Pose, Vec3};
use crate::pipeline::{ListenerPipeline, PipelineCommand};
use crate::store::SampleStore;
use crate::worker::OffloadWorkerPool;
use crossbeam_channel::{Receiver, Sender, TryIter};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle to registered sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub(crate) u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

/// Handle to a positional emitter that tracking calls follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(pub(crate) u64);

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EmitterId({})", self.0)
    }
}

/// Handle to a listener lane created by [`FarfieldWorld::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// Position and velocity of one emitter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmitterState {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Shared emitter table. The control thread writes it through the world;
/// pipelines read it with `try_lock` once per callback.
#[derive(Debug, Default)]
pub struct EmitterRegistry {
    emitters: HashMap<EmitterId, EmitterState>,
}

impl EmitterRegistry {
    pub(crate) fn new() -> Self {
        Self {
            emitters: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: EmitterId, state: EmitterState) {
        self.emitters.insert(id, state);
    }

    pub(crate) fn remove(&mut self, id: EmitterId) -> Option<EmitterState> {
        self.emitters.remove(&id)
    }

    pub fn get(&self, id: EmitterId) -> Option<EmitterState> {
        self.emitters.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

/// Pose and velocity of one listener, shared with its pipeline.
#[derive(Debug, Clone, Default)]
pub struct ListenerState {
    pub pose: Pose,
    pub velocity: Vec3,
}

/// World-side endpoint of one listener pipeline.
struct ListenerLane {
    id: ListenerId,
    commands: Sender<PipelineCommand>,
    state: Arc<Mutex<ListenerState>>,
}

/// Owns everything that is not the audio callback: the asset registry, the
/// emitter table, one command lane per listener, and the offload worker pool.
///
/// The world is the control-thread surface. Playing a sound admits a
/// [`SoundCall`] and broadcasts it to every listener lane; each listener's
/// [`ListenerPipeline`] picks it up at its next audio callback. All methods
/// take `&self`, so the world can sit behind an `Arc` and be driven from
/// wherever the game loop lives.
///
/// # Examples
///
/// ```no_run
/// use farfield::{Anchor, FarfieldConfig, FarfieldWorld, LoopMode, Vec3};
///
/// # fn main() -> farfield::Result<()> {
/// let world = FarfieldWorld::new(FarfieldConfig::default())?;
/// let pipeline = world.add_listener();
/// let chime = world.register_samples(&[0.0, 0.5, 0.0, -0.5], 24000)?;
/// world.play(chime, Anchor::Static(Vec3::new(2.0, 0.0, -1.0)), LoopMode::Once)?;
/// # let _ = pipeline;
/// # Ok(())
/// # }
/// ```
pub struct FarfieldWorld {
    config: FarfieldConfig,
    assets: Mutex<HashMap<AssetId, Arc<SampleStore>>>,
    emitters: Arc<Mutex<EmitterRegistry>>,
    listeners: Mutex<Vec<ListenerLane>>,
    pool: OffloadWorkerPool,
    next_asset: AtomicU64,
    next_emitter: AtomicU64,
    next_listener: AtomicU64,
    next_call: AtomicU64,
    events_tx: Sender<FarfieldEvent>,
    events_rx: Receiver<FarfieldEvent>,
}

impl FarfieldWorld {
    /// Creates a world and spawns its render worker pool.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the config fails validation and `Engine`
    /// when a worker thread cannot be spawned.
    pub fn new(config: FarfieldConfig) -> Result<Self> {
        config.validate()?;
        let pool = OffloadWorkerPool::new(config.workers)?;
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        log::info!(
            "Farfield world created: {} Hz, {} channels, {} render worker(s)",
            config.sample_rate,
            config.channels,
            pool.thread_count()
        );
        Ok(Self {
            config,
            assets: Mutex::new(HashMap::new()),
            emitters: Arc::new(Mutex::new(EmitterRegistry::new())),
            listeners: Mutex::new(Vec::new()),
            pool,
            next_asset: AtomicU64::new(1),
            next_emitter: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
            next_call: AtomicU64::new(1),
            events_tx,
            events_rx,
        })
    }

    pub fn config(&self) -> &FarfieldConfig {
        &self.config
    }

    /// Output sample rate every registered asset is resampled to.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Registers mono sample data, resampling it to the world rate.
    ///
    /// # Arguments
    ///
    /// * `raw` - Mono samples in `[-1.0, 1.0]`
    /// * `source_rate` - The rate `raw` was captured or decoded at
    ///
    /// # Errors
    ///
    /// Returns `Unloaded` for empty sample data and `AudioFormat` for a zero
    /// sample rate.
    pub fn register_samples(&self, raw: &[f32], source_rate: u32) -> Result<AssetId> {
        let store = SampleStore::load(raw, source_rate, self.config.sample_rate)?;
        let id = AssetId(self.next_asset.fetch_add(1, Ordering::Relaxed));
        self.assets.lock().unwrap().insert(id, Arc::new(store));
        log::debug!("Registered {} from {} source frame(s)", id, raw.len());
        Ok(id)
    }

    /// Drops an asset from the registry. Calls already playing it keep their
    /// own `Arc` and play out unaffected.
    ///
    /// # Errors
    ///
    /// Returns `Unloaded` when the asset is not registered.
    pub fn remove_samples(&self, asset: AssetId) -> Result<()> {
        self.assets
            .lock()
            .unwrap()
            .remove(&asset)
            .map(|_| ())
            .ok_or_else(|| FarfieldError::Unloaded(format!("{asset} is not registered")))
    }

    /// Looks up the resampled store for an asset.
    pub fn samples(&self, asset: AssetId) -> Option<Arc<SampleStore>> {
        self.assets.lock().unwrap().get(&asset).cloned()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    /// Adds an emitter at `position` with zero velocity.
    pub fn add_emitter(&self, position: Vec3) -> EmitterId {
        let id = EmitterId(self.next_emitter.fetch_add(1, Ordering::Relaxed));
        self.emitters.lock().unwrap().insert(
            id,
            EmitterState {
                position,
                velocity: Vec3::ZERO,
            },
        );
        id
    }

    /// Updates an emitter's position and velocity. Tracking calls pick the
    /// change up at each listener's next audio callback.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the emitter is not registered.
    pub fn set_emitter(&self, emitter: EmitterId, position: Vec3, velocity: Vec3) -> Result<()> {
        let mut emitters = self.emitters.lock().unwrap();
        if emitters.get(emitter).is_none() {
            return Err(FarfieldError::Engine(format!(
                "{emitter} is not registered"
            )));
        }
        emitters.insert(emitter, EmitterState { position, velocity });
        Ok(())
    }

    /// Removes an emitter. Calls tracking it keep their last-known position.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the emitter is not registered.
    pub fn remove_emitter(&self, emitter: EmitterId) -> Result<()> {
        self.emitters
            .lock()
            .unwrap()
            .remove(emitter)
            .map(|_| ())
            .ok_or_else(|| FarfieldError::Engine(format!("{emitter} is not registered")))
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.lock().unwrap().len()
    }

    /// Creates a listener lane and returns its pipeline.
    ///
    /// The returned [`ListenerPipeline`] is the real-time half: hand it to a
    /// [`FarfieldEngine`](crate::engine::FarfieldEngine) or drive its
    /// `mix_into` from your own audio callback. Every subsequent `play` is
    /// broadcast to this listener as well.
    pub fn add_listener(&self) -> ListenerPipeline {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let state = Arc::new(Mutex::new(ListenerState::default()));
        let pipeline = ListenerPipeline::new(
            id,
            self.config.channels,
            command_rx,
            self.emitters.clone(),
            state.clone(),
            self.pool.sender(),
            self.events_tx.clone(),
        );
        self.listeners
            .lock()
            .unwrap()
            .push(ListenerLane {
                id,
                commands,
                state,
            });
        log::info!("{} added", id);
        pipeline
    }

    /// Detaches a listener lane. The pipeline keeps mixing whatever it
    /// already holds but receives no further calls.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the listener is not registered.
    pub fn remove_listener(&self, listener: ListenerId) -> Result<()> {
        let mut listeners = self.listeners.lock().unwrap();
        let before = listeners.len();
        listeners.retain(|lane| lane.id != listener);
        if listeners.len() == before {
            return Err(FarfieldError::Engine(format!(
                "{listener} is not registered"
            )));
        }
        Ok(())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Moves a listener. Its pipeline snapshots the new pose at the next
    /// audio callback.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the listener is not registered.
    pub fn set_listener_pose(&self, listener: ListenerId, pose: Pose) -> Result<()> {
        self.with_listener(listener, |state| state.pose = pose)
    }

    /// Sets a listener's velocity.
    ///
    /// # Errors
    ///
    /// Returns `Engine` when the listener is not registered.
    pub fn set_listener_velocity(&self, listener: ListenerId, velocity: Vec3) -> Result<()> {
        self.with_listener(listener, |state| state.velocity = velocity)
    }

    fn with_listener(&self, listener: ListenerId, update: impl FnOnce(&mut ListenerState)) -> Result<()> {
        let listeners = self.listeners.lock().unwrap();
        let lane = listeners
            .iter()
            .find(|lane| lane.id == listener)
            .ok_or_else(|| FarfieldError::Engine(format!("{listener} is not registered")))?;
        update(&mut lane.state.lock().unwrap());
        Ok(())
    }

    /// Plays an asset from its first frame. See [`FarfieldWorld::play_from`].
    pub fn play(&self, asset: AssetId, anchor: Anchor, loop_mode: LoopMode) -> Result<CallId> {
        self.play_from(asset, anchor, loop_mode, 0)
    }

    /// Admits a sound call and broadcasts it to every listener.
    ///
    /// The call starts at `start_frame` in the resampled store; looping calls
    /// wrap the offset, one-shots clamp it. Each listener hears the same call
    /// under one id, spatialized against its own pose.
    ///
    /// # Errors
    ///
    /// * `Unloaded` when `asset` is not registered
    /// * `InvalidCall` when a tracking anchor names an unregistered emitter
    ///   or the asset holds no samples
    /// * `Engine` when the world has no listeners to play into
    pub fn play_from(
        &self,
        asset: AssetId,
        anchor: Anchor,
        loop_mode: LoopMode,
        start_frame: usize,
    ) -> Result<CallId> {
        let store = self
            .samples(asset)
            .ok_or_else(|| FarfieldError::Unloaded(format!("{asset} is not registered")))?;
        if store.is_empty() {
            return Err(FarfieldError::InvalidCall(format!(
                "{asset} holds no samples"
            )));
        }

        let id = CallId(self.next_call.fetch_add(1, Ordering::Relaxed));
        let mut call = SoundCall::new(id, store, anchor, loop_mode).with_start_frame(start_frame);
        if let Anchor::Tracking(emitter) = anchor {
            let state = self.emitters.lock().unwrap().get(emitter).ok_or_else(|| {
                FarfieldError::InvalidCall(format!("{emitter} is not registered"))
            })?;
            call.set_position(state.position);
            call.set_velocity(state.velocity);
        }

        let mut listeners = self.listeners.lock().unwrap();
        if listeners.is_empty() {
            return Err(FarfieldError::Engine(
                "world has no listeners to play into".into(),
            ));
        }
        // A lane whose pipeline was dropped is pruned on the way through.
        listeners.retain(|lane| {
            lane.commands
                .send(PipelineCommand::Add(call.clone()))
                .is_ok()
        });
        log::debug!(
            "{} playing {} on {} listener(s)",
            id,
            asset,
            listeners.len()
        );
        Ok(id)
    }

    /// Stops one call on every listener. Takes effect at each listener's next
    /// audio callback; a `CallStopped` event fires per listener that was
    /// still playing it.
    pub fn stop(&self, call: CallId) {
        let listeners = self.listeners.lock().unwrap();
        for lane in listeners.iter() {
            let _ = lane.commands.send(PipelineCommand::Stop(call));
        }
    }

    /// Stops every call on every listener.
    pub fn stop_all(&self) {
        let listeners = self.listeners.lock().unwrap();
        for lane in listeners.iter() {
            let _ = lane.commands.send(PipelineCommand::StopAll);
        }
    }

    /// Drains pending playback events without blocking.
    ///
    /// Events are emitted by pipelines on the audio thread into a bounded
    /// queue; poll regularly, as emission into a full queue is dropped.
    pub fn poll_events(&self) -> TryIter<'_, FarfieldEvent> {
        self.events_rx.try_iter()
    }
}
