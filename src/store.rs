//! Immutable sample storage for decoded audio assets.
//!
//! A [`SampleStore`] holds the mono play buffer for one asset, already resampled
//! to the output rate the engine mixes at. Stores are cheap to clone (the payload
//! sits behind an `Arc`) and are shared read-only by every sound call playing the
//! asset.

use crate::error::{FarfieldError, Result};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SampleStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    samples: Vec<f32>,
    sample_rate: u32,
    source_rate: u32,
}

impl SampleStore {
    /// Builds a store from a raw decoded mono buffer.
    ///
    /// When `source_rate` differs from `target_rate` the play buffer is derived
    /// by linear interpolation; the raw buffer itself is never modified. The
    /// first and last output samples equal the first and last input samples
    /// exactly, whatever the ratio.
    ///
    /// # Errors
    ///
    /// Returns `Unloaded` for an empty buffer and `AudioFormat` for a zero
    /// sample rate on either side.
    pub fn load(raw: &[f32], source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(FarfieldError::AudioFormat(format!(
                "invalid sample rates: source={}, target={}",
                source_rate, target_rate
            )));
        }
        if raw.is_empty() {
            return Err(FarfieldError::Unloaded(
                "raw sample buffer is empty".into(),
            ));
        }

        let samples = if source_rate == target_rate {
            raw.to_vec()
        } else {
            resample_linear(raw, source_rate, target_rate)
        };

        log::debug!(
            "Loaded sample store: {} samples at {} Hz (from {} samples at {} Hz)",
            samples.len(),
            target_rate,
            raw.len(),
            source_rate
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                samples,
                sample_rate: target_rate,
                source_rate,
            }),
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn len(&self) -> usize {
        self.inner.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.samples.is_empty()
    }

    /// Rate of the play buffer (the engine's output rate).
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    /// Rate the asset was decoded at before resampling.
    pub fn source_rate(&self) -> u32 {
        self.inner.source_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len() as f64 / self.inner.sample_rate as f64)
    }

    /// Fills `out` with consecutive samples starting at `cursor`.
    ///
    /// Reads past the end of the buffer produce zeros, unless `looping`, in
    /// which case every index wraps modulo the buffer length. A single chunk
    /// may wrap any number of times.
    pub fn fill_chunk(&self, cursor: usize, looping: bool, out: &mut [f32]) {
        let samples = &self.inner.samples;
        let len = samples.len();
        for (i, slot) in out.iter_mut().enumerate() {
            let index = cursor + i;
            *slot = if index < len {
                samples[index]
            } else if looping {
                samples[index % len]
            } else {
                0.0
            };
        }
    }

    /// Allocating variant of [`fill_chunk`](Self::fill_chunk).
    pub fn chunk(&self, cursor: usize, count: usize, looping: bool) -> Vec<f32> {
        let mut out = vec![0.0; count];
        self.fill_chunk(cursor, looping, &mut out);
        out
    }
}

/// Linear-interpolation resampler with pinned endpoints.
///
/// Output length is `ceil(input_len * target / source)`. Interior sample `i`
/// reads the fractional source position `i / (out_len - 1) * (in_len - 1)` and
/// blends its two neighbours; the endpoints copy the input endpoints exactly
/// rather than interpolating, so ratio choice can never drift the first or last
/// sample.
fn resample_linear(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    // Integer ceiling division; going through an f64 ratio first can land a
    // hair above a whole number and overshoot the length by one.
    let output_len = (input.len() as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
    let mut output = vec![0.0f32; output_len];

    output[0] = input[0];
    if output_len > 1 {
        output[output_len - 1] = input[input.len() - 1];
    }

    let input_span = (input.len() - 1) as f64;
    let output_span = (output_len - 1) as f64;
    for i in 1..output_len.saturating_sub(1) {
        let position = i as f64 / output_span * input_span;
        let base = position.floor();
        let fraction = (position - base) as f32;
        let lower = base as usize;
        let upper = position.ceil() as usize;
        output[i] = (1.0 - fraction) * input[lower] + fraction * input[upper];
    }

    output
}
