//! Error types for Farfield

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarfieldError {
    /// Sample data for an asset is missing or not yet decoded.
    #[error("Sample data not loaded: {0}")]
    Unloaded(String),

    /// A sound call referenced a store or emitter that does not exist.
    #[error("Invalid sound call: {0}")]
    InvalidCall(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, FarfieldError>;
