//! Device adapter: runs one listener pipeline inside a cpal output stream.

use crate::config::FarfieldConfig;
use crate::error::{FarfieldError, Result};
use crate::pipeline::ListenerPipeline;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Drives a [`ListenerPipeline`] from the default output device.
///
/// The pipeline moves into the device callback when the stream is built;
/// every callback runs one mix epoch and converts the result to the device's
/// sample format. `stop` pauses the stream without tearing the pipeline
/// down, so `start` picks playback back up where it left off.
///
/// Hosts with their own audio callback can skip this type entirely and call
/// [`ListenerPipeline::mix_into`] themselves.
pub struct FarfieldEngine {
    config: FarfieldConfig,
    pipeline: Option<ListenerPipeline>,
    stream: Option<cpal::Stream>,
    is_running: Arc<AtomicBool>,
    frames_processed: Arc<AtomicUsize>,
}

impl FarfieldEngine {
    /// Pairs a pipeline with the device configuration it will run under.
    /// No device is touched until [`start`](FarfieldEngine::start).
    pub fn new(config: FarfieldConfig, pipeline: ListenerPipeline) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pipeline: Some(pipeline),
            stream: None,
            is_running: Arc::new(AtomicBool::new(false)),
            frames_processed: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Opens the default output device and starts the stream.
    ///
    /// # Errors
    ///
    /// Returns `AudioDevice` when no output device is available or the stream
    /// cannot be built or started, and `AudioFormat` when the device wants a
    /// sample format other than f32, i16, or u16.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }

        if let Some(stream) = &self.stream {
            // Paused stream from an earlier stop: resume it.
            stream
                .play()
                .map_err(|e| FarfieldError::AudioDevice(format!("Failed to resume stream: {}", e)))?;
            self.is_running.store(true, Ordering::Relaxed);
            return Ok(());
        }

        let pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| FarfieldError::Engine("No pipeline attached".into()))?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            FarfieldError::AudioDevice("No default output device available".into())
        })?;

        let config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let is_running = self.is_running.clone();
        let frames_processed = self.frames_processed.clone();

        let default_config = device.default_output_config().map_err(|e| {
            FarfieldError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => Self::create_stream::<f32>(
                &device,
                &config,
                pipeline,
                is_running,
                frames_processed,
            )?,
            cpal::SampleFormat::I16 => Self::create_stream::<i16>(
                &device,
                &config,
                pipeline,
                is_running,
                frames_processed,
            )?,
            cpal::SampleFormat::U16 => Self::create_stream::<u16>(
                &device,
                &config,
                pipeline,
                is_running,
                frames_processed,
            )?,
            other => {
                return Err(FarfieldError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        // Store before playing: a failed play keeps the stream (and the
        // pipeline inside it) around for a later resume attempt.
        let stream = self.stream.insert(stream);
        stream
            .play()
            .map_err(|e| FarfieldError::AudioDevice(format!("Failed to start stream: {}", e)))?;

        self.is_running.store(true, Ordering::Relaxed);
        log::info!(
            "Audio stream started: {} Hz, {} channels",
            self.config.sample_rate,
            self.config.channels
        );
        Ok(())
    }

    /// Pauses the stream. The pipeline and its active calls are kept; nothing
    /// is consumed while stopped.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                // Backends without pause keep running; the callback outputs
                // silence while the running flag is down.
                log::warn!("Stream pause not honored: {}", err);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Frames pushed to the device since the stream was built.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &FarfieldConfig {
        &self.config
    }

    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut pipeline: ListenerPipeline,
        is_running: Arc<AtomicBool>,
        frames_processed: Arc<AtomicUsize>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        // Scratch persists across callbacks; it reallocates only when the
        // host changes its buffer length.
        let mut scratch: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if !is_running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    scratch.resize(data.len(), 0.0);
                    scratch.fill(0.0);
                    pipeline.mix_into(&mut scratch);

                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }
                    frames_processed.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| FarfieldError::AudioDevice(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }
}

impl Drop for FarfieldEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
