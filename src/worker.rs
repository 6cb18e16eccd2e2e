//! The offload worker pool.
//!
//! Spatialization runs on plain render threads, never on the audio callback.
//! A [`RenderTask`] carries everything a render needs by value: the frozen
//! call snapshot, the listener snapshot, the interleaved buffer to fill, and
//! the single-slot channel that mails the finished task back to its pipeline.
//! Exactly one worker takes each task; completion is the send of the task
//! itself, after which the worker never touches the buffer again.

use crate::call::SoundCall;
use crate::error::{FarfieldError, Result};
use crate::spatial::{self, Channel, ListenerSnapshot};
use crossbeam_channel::{Receiver, Sender};
use std::thread::JoinHandle;

/// One batch of offloaded mixing: every call's next chunk, spatialized and
/// accumulated into an interleaved stereo buffer.
#[derive(Debug)]
pub struct RenderTask {
    pub(crate) calls: Vec<SoundCall>,
    pub(crate) listener: ListenerSnapshot,
    pub(crate) channels: u16,
    pub(crate) buffer: Vec<f32>,
    pub(crate) mono: Vec<f32>,
    pub(crate) done_tx: Sender<RenderTask>,
}

impl RenderTask {
    pub(crate) fn new(channels: u16, buffer_len: usize, done_tx: Sender<RenderTask>) -> Self {
        let frames = buffer_len / channels.max(1) as usize;
        Self {
            calls: Vec::new(),
            listener: ListenerSnapshot::default(),
            channels,
            buffer: vec![0.0; buffer_len],
            mono: vec![0.0; frames],
            done_tx,
        }
    }

    /// The interleaved output buffer in its current state.
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

/// Renders one task in place: zero the buffer, then accumulate every call.
///
/// A call whose chunk cannot be read contributes silence and never aborts the
/// batch. Cursor advancement here only affects the task's private copies; the
/// pipeline advances the authoritative cursors at dispatch time.
pub(crate) fn render(task: &mut RenderTask) {
    let channels = task.channels.max(1) as usize;
    let frames = task.buffer.len() / channels;
    task.buffer.fill(0.0);
    task.mono.resize(frames, 0.0);

    for call in task.calls.iter_mut() {
        if let Err(err) = call.next_chunk(&mut task.mono) {
            log::debug!("Silencing {}: {}", call.id(), err);
            continue;
        }
        for channel in Channel::STEREO {
            let gain = spatial::channel_gain(
                call.position(),
                task.listener.position,
                task.listener.forward,
                channel,
            );
            let lane = channel.index();
            for (frame, &sample) in task.mono.iter().enumerate() {
                task.buffer[frame * channels + lane] += sample * gain;
            }
        }
    }
}

fn worker_loop(tasks: Receiver<RenderTask>) {
    while let Ok(mut task) = tasks.recv() {
        render(&mut task);
        let done = task.done_tx.clone();
        if done.send(task).is_err() {
            // The submitting pipeline is gone; the task drops with it.
            log::debug!("Dropping render for a closed pipeline");
        }
    }
    log::debug!("Render worker exiting");
}

/// Fixed set of render threads shared by every listener pipeline in a world.
///
/// Workers exit once every task sender (the pool handle and all pipelines) is
/// dropped; the pool itself never joins, so tearing down a world cannot block
/// behind a running render.
pub struct OffloadWorkerPool {
    task_tx: Sender<RenderTask>,
    threads: Vec<JoinHandle<()>>,
}

impl OffloadWorkerPool {
    /// Spawns `workers` named render threads.
    ///
    /// # Errors
    ///
    /// Returns `Engine` if the OS refuses to spawn a thread.
    pub fn new(workers: usize) -> Result<Self> {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<RenderTask>();
        let mut threads = Vec::with_capacity(workers);
        for index in 0..workers {
            let rx = task_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("farfield-render-{index}"))
                .spawn(move || worker_loop(rx))
                .map_err(|e| {
                    FarfieldError::Engine(format!("failed to spawn render worker {index}: {e}"))
                })?;
            threads.push(handle);
        }
        log::info!("Offload worker pool started with {} thread(s)", workers);
        Ok(Self { task_tx, threads })
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn sender(&self) -> Sender<RenderTask> {
        self.task_tx.clone()
    }
}
