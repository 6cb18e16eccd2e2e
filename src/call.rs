//! Sound calls: one playing instance of an audio asset.
//!
//! A [`SoundCall`] pairs a shared [`SampleStore`] with per-instance state: the
//! playback cursor, the loop mode, and the last-known spatial placement. Calls
//! are created on the control thread, queued to a listener, then owned and
//! mutated by that listener's pipeline once per audio callback.

use crate::error::{FarfieldError, Result};
use crate::math::Vec3;
use crate::store::SampleStore;
use crate::world::{EmitterId, EmitterRegistry};
use std::sync::Arc;

/// Lightweight handle identifying one playing call in events and stop requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallId(pub(crate) u64);

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallId({})", self.0)
    }
}

/// Loop mode for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play once and retire.
    /// Emits `CallCompleted` when the cursor passes the end of the store.
    Once,
    /// Loop until stopped.
    /// Emits `CallLooped` every time the cursor wraps.
    Infinite,
}

impl Default for LoopMode {
    fn default() -> Self {
        Self::Once
    }
}

/// How a call refreshes its position each audio callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// Fixed position chosen at spawn time.
    Static(Vec3),
    /// Follows an emitter in the world registry. If the emitter has been
    /// removed, the call keeps its last-known position and velocity.
    Tracking(EmitterId),
}

/// One playing instance of a [`SampleStore`].
#[derive(Debug, Clone)]
pub struct SoundCall {
    id: CallId,
    store: Arc<SampleStore>,
    cursor: usize,
    loop_mode: LoopMode,
    loops_completed: u32,
    anchor: Anchor,
    position: Vec3,
    velocity: Vec3,
}

impl SoundCall {
    pub fn new(id: CallId, store: Arc<SampleStore>, anchor: Anchor, loop_mode: LoopMode) -> Self {
        let position = match anchor {
            Anchor::Static(position) => position,
            Anchor::Tracking(_) => Vec3::ZERO,
        };
        Self {
            id,
            store,
            cursor: 0,
            loop_mode,
            loops_completed: 0,
            anchor,
            position,
            velocity: Vec3::ZERO,
        }
    }

    /// Starts playback at `frame` instead of the beginning.
    ///
    /// Wrapped into the store for looping calls; clamped to the end otherwise
    /// (a one-shot call offset past the end is born finished).
    pub fn with_start_frame(mut self, frame: usize) -> Self {
        let len = self.store.len();
        self.cursor = match self.loop_mode {
            LoopMode::Infinite if len > 0 => frame % len,
            _ => frame.min(len),
        };
        self
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Number of complete loops a looping call has played.
    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    /// A call is valid when its store actually holds samples. Checked once at
    /// admission; an invalid call never reaches the mix.
    pub fn is_valid(&self) -> bool {
        !self.store.is_empty()
    }

    /// A one-shot call whose cursor has passed the end of its store.
    pub fn is_finished(&self) -> bool {
        matches!(self.loop_mode, LoopMode::Once) && self.cursor >= self.store.len()
    }

    /// Fills `out` from the store at the current cursor, then advances the
    /// cursor by the chunk length.
    ///
    /// Past-end reads yield zeros for one-shot calls and wrap for looping
    /// calls, per the store's chunk semantics.
    ///
    /// # Errors
    ///
    /// Returns `Unloaded` if the store holds no samples; callers mix silence
    /// for this call and carry on.
    pub fn next_chunk(&mut self, out: &mut [f32]) -> Result<()> {
        if self.store.is_empty() {
            return Err(FarfieldError::Unloaded(format!(
                "{} has an empty store",
                self.id
            )));
        }
        let looping = matches!(self.loop_mode, LoopMode::Infinite);
        self.store.fill_chunk(self.cursor, looping, out);
        self.advance(out.len());
        Ok(())
    }

    /// Advances the cursor by `frames`: wrapping modulo the store length under
    /// `Infinite`, monotonic under `Once`. Returns how many times the cursor
    /// wrapped, for loop-event accounting.
    pub(crate) fn advance(&mut self, frames: usize) -> u32 {
        let len = self.store.len();
        if len == 0 {
            return 0;
        }
        match self.loop_mode {
            LoopMode::Infinite => {
                let next = self.cursor + frames;
                let wraps = (next / len) as u32;
                self.cursor = next % len;
                self.loops_completed += wraps;
                wraps
            }
            LoopMode::Once => {
                self.cursor = self.cursor.saturating_add(frames);
                0
            }
        }
    }

    /// Pulls current position and velocity from the call's emitter, if it has
    /// one and the emitter still exists. Called by the pipeline exactly once
    /// per audio callback, before any dispatch, so the worker always sees one
    /// consistent snapshot.
    pub fn refresh_spatial_state(&mut self, emitters: &EmitterRegistry) {
        if let Anchor::Tracking(emitter) = self.anchor {
            if let Some(state) = emitters.get(emitter) {
                self.position = state.position;
                self.velocity = state.velocity;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::EmitterState;

    fn store(samples: &[f32]) -> Arc<SampleStore> {
        Arc::new(SampleStore::load(samples, 48000, 48000).unwrap())
    }

    fn one_shot(samples: &[f32]) -> SoundCall {
        SoundCall::new(
            CallId(1),
            store(samples),
            Anchor::Static(Vec3::ZERO),
            LoopMode::Once,
        )
    }

    fn looping(samples: &[f32]) -> SoundCall {
        SoundCall::new(
            CallId(2),
            store(samples),
            Anchor::Static(Vec3::ZERO),
            LoopMode::Infinite,
        )
    }

    #[test]
    fn test_next_chunk_reads_and_advances() {
        let mut call = one_shot(&[1.0, 2.0, 3.0, 4.0]);
        let mut out = [0.0; 3];
        call.next_chunk(&mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(call.cursor(), 3);
        assert!(!call.is_finished());
    }

    #[test]
    fn test_one_shot_yields_zeros_past_end() {
        let mut call = one_shot(&[1.0, 2.0]);
        let mut out = [9.0; 4];
        call.next_chunk(&mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 0.0, 0.0]);
        assert!(call.is_finished());

        call.next_chunk(&mut out).unwrap();
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn test_looping_call_wraps_cursor_and_counts_loops() {
        let mut call = looping(&[1.0, 2.0, 3.0]);
        let mut out = [0.0; 7];
        call.next_chunk(&mut out).unwrap();
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(call.cursor(), 1);
        assert_eq!(call.loops_completed(), 2);
        assert!(!call.is_finished());
    }

    #[test]
    fn test_advance_reports_wraps() {
        let mut call = looping(&[0.0; 4]);
        assert_eq!(call.advance(3), 0);
        assert_eq!(call.advance(6), 2);
        assert_eq!(call.cursor(), 1);
    }

    #[test]
    fn test_start_frame_offsets_playback() {
        let mut call = one_shot(&[1.0, 2.0, 3.0, 4.0]).with_start_frame(2);
        let mut out = [0.0; 2];
        call.next_chunk(&mut out).unwrap();
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    fn test_start_frame_wraps_for_looping_calls() {
        let call = looping(&[1.0, 2.0, 3.0]).with_start_frame(7);
        assert_eq!(call.cursor(), 1);

        let call = one_shot(&[1.0, 2.0, 3.0]).with_start_frame(10);
        assert!(call.is_finished());
    }

    #[test]
    fn test_tracking_call_follows_emitter() {
        let mut emitters = EmitterRegistry::new();
        let id = EmitterId(7);
        emitters.insert(
            id,
            EmitterState {
                position: Vec3::new(1.0, 2.0, 3.0),
                velocity: Vec3::new(0.5, 0.0, 0.0),
            },
        );

        let mut call = SoundCall::new(
            CallId(3),
            store(&[0.0]),
            Anchor::Tracking(id),
            LoopMode::Once,
        );
        call.refresh_spatial_state(&emitters);
        assert_eq!(call.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(call.velocity(), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_dangling_emitter_keeps_last_known_state() {
        let mut emitters = EmitterRegistry::new();
        let id = EmitterId(9);
        emitters.insert(
            id,
            EmitterState {
                position: Vec3::new(4.0, 0.0, 0.0),
                velocity: Vec3::ZERO,
            },
        );

        let mut call = SoundCall::new(
            CallId(4),
            store(&[0.0]),
            Anchor::Tracking(id),
            LoopMode::Once,
        );
        call.refresh_spatial_state(&emitters);
        emitters.remove(id);
        call.refresh_spatial_state(&emitters);
        assert_eq!(call.position(), Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_static_anchor_ignores_registry() {
        let emitters = EmitterRegistry::new();
        let mut call = SoundCall::new(
            CallId(5),
            store(&[0.0]),
            Anchor::Static(Vec3::new(-2.0, 0.0, 0.0)),
            LoopMode::Once,
        );
        call.refresh_spatial_state(&emitters);
        assert_eq!(call.position(), Vec3::new(-2.0, 0.0, 0.0));
    }
}
