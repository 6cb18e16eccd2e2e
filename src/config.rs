//! Configuration for Farfield

use crate::error::{FarfieldError, Result};

/// Engine-wide configuration shared by the world, its pipelines, and the device
/// adapter.
///
/// `sample_rate` is the rate every registered asset is resampled to at
/// registration time. `channels` is the interleaved channel count of the host
/// callback; only stereo is spatialized. `workers` is the number of render
/// threads in the offload pool.
#[derive(Debug, Clone)]
pub struct FarfieldConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub workers: usize,
}

impl Default for FarfieldConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            workers: 1,
        }
    }
}

impl FarfieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Checks that the configuration describes something the pipeline can run.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for a zero sample rate, a zero worker count, or
    /// a channel count other than stereo.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(FarfieldError::Configuration(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.channels != 2 {
            return Err(FarfieldError::Configuration(format!(
                "spatialization is stereo-only, got {} channels",
                self.channels
            )));
        }
        if self.workers == 0 {
            return Err(FarfieldError::Configuration(
                "worker pool needs at least one thread".into(),
            ));
        }
        Ok(())
    }
}
