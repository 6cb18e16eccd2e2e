//! The listener pipeline: the real-time half of the offload hand-off.
//!
//! One [`ListenerPipeline`] runs inside one host audio callback. Each
//! invocation is an epoch that swaps in the latest completed render, mixes it
//! additively into the host buffer, merges queued calls, refreshes spatial
//! state, and hands a frozen snapshot plus the free buffer to the worker pool.
//! The two buffers round-trip inside a single [`RenderTask`]: dispatch moves
//! the task to a worker, completion mails it home through a single-slot
//! channel, and the swap is a plain `mem::swap` of owned vectors. The epoch
//! path takes no locks it can wait on, allocates only when the host changes
//! its buffer length, and never blocks: a late render means the previous
//! buffer plays again.

use crate::call::{CallId, SoundCall};
use crate::events::FarfieldEvent;
use crate::spatial::ListenerSnapshot;
use crate::worker::RenderTask;
use crate::world::{EmitterRegistry, ListenerId, ListenerState};
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Control messages drained by the pipeline once per audio callback.
///
/// Sent internally by [`FarfieldWorld`](crate::world::FarfieldWorld); most
/// users go through the world's `play`/`stop` methods rather than building
/// commands directly.
#[derive(Debug)]
pub enum PipelineCommand {
    /// Queue a call; it joins the active set at the next callback.
    Add(SoundCall),
    /// Remove one call at the next callback.
    Stop(CallId),
    /// Remove every active call at the next callback.
    StopAll,
}

/// Owns the double-buffer state machine for one listener.
pub struct ListenerPipeline {
    listener_id: ListenerId,
    channels: usize,
    /// Interleaved length both buffers currently match; 0 until the first
    /// callback establishes it.
    buffer_len: usize,
    out_buffer: Vec<f32>,
    active: Vec<SoundCall>,
    /// The round-tripping task. `Some` exactly when no render is in flight.
    idle_task: Option<RenderTask>,
    rendering: bool,
    commands: Receiver<PipelineCommand>,
    emitters: Arc<Mutex<EmitterRegistry>>,
    listener_state: Arc<Mutex<ListenerState>>,
    listener_cache: ListenerSnapshot,
    task_tx: Sender<RenderTask>,
    done_rx: Receiver<RenderTask>,
    events: Sender<FarfieldEvent>,
}

impl ListenerPipeline {
    pub(crate) fn new(
        listener_id: ListenerId,
        channels: u16,
        commands: Receiver<PipelineCommand>,
        emitters: Arc<Mutex<EmitterRegistry>>,
        listener_state: Arc<Mutex<ListenerState>>,
        task_tx: Sender<RenderTask>,
        events: Sender<FarfieldEvent>,
    ) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            listener_id,
            channels: channels.max(1) as usize,
            buffer_len: 0,
            out_buffer: Vec::new(),
            active: Vec::new(),
            idle_task: Some(RenderTask::new(channels, 0, done_tx)),
            rendering: false,
            commands,
            emitters,
            listener_state,
            listener_cache: ListenerSnapshot::default(),
            task_tx,
            done_rx,
            events,
        }
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Calls currently in the active set.
    pub fn active_calls(&self) -> usize {
        self.active.len()
    }

    /// Whether a render is in flight on the worker pool.
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Frames per channel of the currently established host buffer.
    pub fn buffer_frames(&self) -> usize {
        self.buffer_len / self.channels
    }

    /// Runs one epoch against the host's interleaved output buffer.
    ///
    /// Adds the last completed render into `dst` (never overwrites), then
    /// queues the next render. Call this from the audio callback, once per
    /// invocation, with whatever buffer the host hands over; length changes
    /// are absorbed with a single silent callback.
    pub fn mix_into(&mut self, dst: &mut [f32]) {
        // Completed render: take the task home and swap the finished buffer in.
        if let Ok(mut task) = self.done_rx.try_recv() {
            self.rendering = false;
            if task.buffer.len() == self.buffer_len {
                std::mem::swap(&mut self.out_buffer, &mut task.buffer);
            }
            // A render of a stale length (pre-resize) is discarded unmixed.
            self.idle_task = Some(task);
        }

        if dst.len() != self.buffer_len {
            // Host reconfigured: reallocate both buffers, go out silent once.
            self.buffer_len = dst.len();
            self.out_buffer = vec![0.0; self.buffer_len];
            if let Some(task) = self.idle_task.as_mut() {
                task.buffer.resize(self.buffer_len, 0.0);
                task.buffer.fill(0.0);
            }
            let _ = self.events.try_send(FarfieldEvent::BufferResized {
                listener: self.listener_id,
                frames: self.buffer_len / self.channels,
            });
        } else {
            for (slot, sample) in dst.iter_mut().zip(&self.out_buffer) {
                *slot += *sample;
            }
        }

        self.drain_commands();
        self.refresh_spatial_state();

        if self.rendering {
            // Previous render still in flight: this epoch replayed the stale
            // buffer above, and no new work is queued until it lands.
            let _ = self.events.try_send(FarfieldEvent::RenderOverrun {
                listener: self.listener_id,
            });
        } else {
            self.dispatch();
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                PipelineCommand::Add(call) => {
                    let _ = self.events.try_send(FarfieldEvent::CallStarted {
                        listener: self.listener_id,
                        call: call.id(),
                    });
                    self.active.push(call);
                }
                PipelineCommand::Stop(id) => {
                    let before = self.active.len();
                    self.active.retain(|call| call.id() != id);
                    if self.active.len() != before {
                        let _ = self.events.try_send(FarfieldEvent::CallStopped {
                            listener: self.listener_id,
                            call: id,
                        });
                    }
                }
                PipelineCommand::StopAll => {
                    for call in self.active.drain(..) {
                        let _ = self.events.try_send(FarfieldEvent::CallStopped {
                            listener: self.listener_id,
                            call: call.id(),
                        });
                    }
                }
            }
        }
    }

    /// Refreshes every tracking call and the listener cache. `try_lock` only:
    /// contention with the control thread keeps last-known state for one
    /// callback instead of waiting.
    fn refresh_spatial_state(&mut self) {
        if let Ok(emitters) = self.emitters.try_lock() {
            for call in self.active.iter_mut() {
                call.refresh_spatial_state(&emitters);
            }
        }
        if let Ok(state) = self.listener_state.try_lock() {
            self.listener_cache = ListenerSnapshot::from_pose(&state.pose, state.velocity);
        }
    }

    /// Freezes the active set into the idle task and sends it to the pool.
    /// The authoritative cursors advance here, once per dispatched render, so
    /// backpressured epochs consume nothing.
    fn dispatch(&mut self) {
        let Some(mut task) = self.idle_task.take() else {
            return;
        };

        task.calls.clear();
        task.calls.extend(self.active.iter().cloned());
        task.listener = self.listener_cache;
        if task.buffer.len() != self.buffer_len {
            task.buffer.resize(self.buffer_len, 0.0);
        }
        let frames = self.buffer_len / self.channels;
        task.mono.resize(frames, 0.0);

        match self.task_tx.send(task) {
            Ok(()) => {
                self.rendering = true;
                self.retire_consumed(frames);
            }
            Err(send_error) => {
                // No workers listening; keep the task and retry next callback.
                self.idle_task = Some(send_error.into_inner());
            }
        }
    }

    fn retire_consumed(&mut self, frames: usize) {
        for call in self.active.iter_mut() {
            let wraps = call.advance(frames);
            if wraps > 0 {
                let _ = self.events.try_send(FarfieldEvent::CallLooped {
                    listener: self.listener_id,
                    call: call.id(),
                    loop_count: call.loops_completed(),
                });
            }
        }

        let listener = self.listener_id;
        let events = &self.events;
        self.active.retain(|call| {
            if call.is_finished() {
                let _ = events.try_send(FarfieldEvent::CallCompleted {
                    listener,
                    call: call.id(),
                });
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Anchor, LoopMode};
    use crate::math::Vec3;
    use crate::store::SampleStore;
    use crate::worker;
    use crate::world::EmitterId;

    struct Rig {
        pipeline: ListenerPipeline,
        cmd_tx: Sender<PipelineCommand>,
        task_rx: Receiver<RenderTask>,
        event_rx: Receiver<FarfieldEvent>,
        emitters: Arc<Mutex<EmitterRegistry>>,
    }

    fn rig() -> Rig {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(64);
        let emitters = Arc::new(Mutex::new(EmitterRegistry::new()));
        let listener_state = Arc::new(Mutex::new(ListenerState::default()));
        let pipeline = ListenerPipeline::new(
            ListenerId(0),
            2,
            cmd_rx,
            emitters.clone(),
            listener_state,
            task_tx,
            event_tx,
        );
        Rig {
            pipeline,
            cmd_tx,
            task_rx,
            event_rx,
            emitters,
        }
    }

    /// Plays the worker: renders the one pending task and mails it home.
    fn complete_render(task_rx: &Receiver<RenderTask>) {
        let mut task = task_rx.try_recv().expect("a task should be in flight");
        worker::render(&mut task);
        let done = task.done_tx.clone();
        done.send(task).unwrap();
    }

    fn ahead_unit_call(samples: &[f32], loop_mode: LoopMode) -> SoundCall {
        // Dead ahead at distance 1: gain 0.5 on both channels.
        let store = Arc::new(SampleStore::load(samples, 48000, 48000).unwrap());
        SoundCall::new(
            CallId(1),
            store,
            Anchor::Static(Vec3::new(0.0, 0.0, -1.0)),
            loop_mode,
        )
    }

    #[test]
    fn test_first_callback_establishes_buffers_silently() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Once,
            )))
            .unwrap();

        let mut dst = [0.5; 8];
        r.pipeline.mix_into(&mut dst);

        // Nothing mixed, but the call merged and a render went out.
        assert_eq!(dst, [0.5; 8]);
        assert_eq!(r.pipeline.buffer_frames(), 4);
        assert_eq!(r.pipeline.active_calls(), 0); // one-shot consumed in full
        assert!(r.pipeline.is_rendering());

        let events: Vec<_> = r.event_rx.try_iter().collect();
        assert!(events.contains(&FarfieldEvent::BufferResized {
            listener: ListenerId(0),
            frames: 4
        }));
        assert!(events.contains(&FarfieldEvent::CallStarted {
            listener: ListenerId(0),
            call: CallId(1)
        }));
        assert!(events.contains(&FarfieldEvent::CallCompleted {
            listener: ListenerId(0),
            call: CallId(1)
        }));
    }

    #[test]
    fn test_completed_render_mixes_additively() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Once,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst);
        complete_render(&r.task_rx);

        // Pre-existing destination content must survive the mix.
        let mut dst = [1.0; 8];
        r.pipeline.mix_into(&mut dst);
        for &slot in &dst {
            assert!((slot - 1.5).abs() < 1e-6, "slot {slot}");
        }
    }

    #[test]
    fn test_backpressure_replays_stale_buffer_without_dispatch() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Infinite,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // establish + dispatch #1
        complete_render(&r.task_rx);

        let mut second = [0.0; 8];
        r.pipeline.mix_into(&mut second); // mix #1, dispatch #2
        assert!(second.iter().all(|&s| (s - 0.5).abs() < 1e-6));

        // Leave render #2 in flight: the next epochs replay the same buffer
        // and queue nothing new.
        let mut third = [0.0; 8];
        r.pipeline.mix_into(&mut third);
        assert_eq!(third, second);
        assert!(r.pipeline.is_rendering());

        let in_flight = r.task_rx.try_recv();
        assert!(in_flight.is_ok(), "render #2 should be queued");
        assert!(r.task_rx.try_recv().is_err(), "no further dispatch");

        let events: Vec<_> = r.event_rx.try_iter().collect();
        assert!(events.contains(&FarfieldEvent::RenderOverrun {
            listener: ListenerId(0)
        }));
    }

    #[test]
    fn test_backpressure_does_not_advance_cursors() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Infinite,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // dispatch #1 advances one chunk
        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // starved: no dispatch, no advance
        r.pipeline.mix_into(&mut dst);

        let events: Vec<_> = r.event_rx.try_iter().collect();
        let loops = events
            .iter()
            .filter(|e| matches!(e, FarfieldEvent::CallLooped { .. }))
            .count();
        // Store length equals the chunk, so each dispatch wraps exactly once.
        assert_eq!(loops, 1, "only the dispatched epoch consumes samples");
    }

    #[test]
    fn test_resize_goes_silent_once_then_resumes_at_new_length() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Infinite,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // establish at 8
        complete_render(&r.task_rx);
        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // mix, dispatch #2
        complete_render(&r.task_rx);

        // Host switches to 16: exactly one silent callback.
        let mut grown = [0.25; 16];
        r.pipeline.mix_into(&mut grown);
        assert_eq!(grown, [0.25; 16]);
        assert_eq!(r.pipeline.buffer_frames(), 8);

        let events: Vec<_> = r.event_rx.try_iter().collect();
        assert!(events.contains(&FarfieldEvent::BufferResized {
            listener: ListenerId(0),
            frames: 8
        }));

        // The render dispatched during the silent callback fills the new
        // length; the following callback mixes it.
        complete_render(&r.task_rx);
        let mut grown = [0.0; 16];
        r.pipeline.mix_into(&mut grown);
        assert!(grown.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_stale_length_render_is_discarded_after_resize() {
        let mut r = rig();
        r.cmd_tx
            .send(PipelineCommand::Add(ahead_unit_call(
                &[1.0; 4],
                LoopMode::Infinite,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst); // dispatch #1 at length 8, leave it in flight

        let mut grown = [0.0; 16];
        r.pipeline.mix_into(&mut grown); // resize while rendering
        assert_eq!(grown, [0.0; 16]);

        complete_render(&r.task_rx); // render #1 lands with the old length

        let mut grown = [0.0; 16];
        r.pipeline.mix_into(&mut grown);
        // The stale 8-sample render must not leak into the 16-sample mix.
        assert_eq!(grown, [0.0; 16]);
        assert!(r.pipeline.is_rendering(), "a fresh render went out");

        let task = r.task_rx.try_recv().expect("redispatched task");
        assert_eq!(task.buffer().len(), 16);
    }

    #[test]
    fn test_stop_and_stop_all_remove_calls() {
        let mut r = rig();
        let store = Arc::new(SampleStore::load(&[1.0; 4], 48000, 48000).unwrap());
        for id in [10, 11] {
            r.cmd_tx
                .send(PipelineCommand::Add(SoundCall::new(
                    CallId(id),
                    store.clone(),
                    Anchor::Static(Vec3::ZERO),
                    LoopMode::Infinite,
                )))
                .unwrap();
        }

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst);
        assert_eq!(r.pipeline.active_calls(), 2);

        r.cmd_tx.send(PipelineCommand::Stop(CallId(10))).unwrap();
        r.pipeline.mix_into(&mut dst);
        assert_eq!(r.pipeline.active_calls(), 1);

        r.cmd_tx.send(PipelineCommand::StopAll).unwrap();
        r.pipeline.mix_into(&mut dst);
        assert_eq!(r.pipeline.active_calls(), 0);

        let stopped: Vec<_> = r
            .event_rx
            .try_iter()
            .filter(|e| matches!(e, FarfieldEvent::CallStopped { .. }))
            .collect();
        assert_eq!(stopped.len(), 2);
    }

    #[test]
    fn test_tracking_call_snapshots_fresh_emitter_state() {
        let mut r = rig();
        let emitter = EmitterId(3);
        r.emitters.lock().unwrap().insert(
            emitter,
            crate::world::EmitterState {
                position: Vec3::new(-2.0, 0.0, 0.0),
                velocity: Vec3::ZERO,
            },
        );

        let store = Arc::new(SampleStore::load(&[1.0; 4], 48000, 48000).unwrap());
        r.cmd_tx
            .send(PipelineCommand::Add(SoundCall::new(
                CallId(7),
                store,
                Anchor::Tracking(emitter),
                LoopMode::Infinite,
            )))
            .unwrap();

        let mut dst = [0.0; 8];
        r.pipeline.mix_into(&mut dst);
        let task = r.task_rx.try_recv().unwrap();
        assert_eq!(task.calls[0].position(), Vec3::new(-2.0, 0.0, 0.0));

        // Move the emitter; the next dispatched snapshot must carry it.
        r.emitters.lock().unwrap().insert(
            emitter,
            crate::world::EmitterState {
                position: Vec3::new(5.0, 0.0, 0.0),
                velocity: Vec3::ZERO,
            },
        );
        let done = task.done_tx.clone();
        let mut task = task;
        worker::render(&mut task);
        done.send(task).unwrap();

        r.pipeline.mix_into(&mut dst);
        let task = r.task_rx.try_recv().unwrap();
        assert_eq!(task.calls[0].position(), Vec3::new(5.0, 0.0, 0.0));
    }
}
