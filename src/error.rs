//! Error types for SonicWeave

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SonicWeaveError {
    /// A construction or control argument is outside its domain.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The output backend could not be acquired.
    #[error("Failed to open audio device: {0}")]
    DeviceOpen(String),

    /// A sound could not be registered with a device.
    #[error("Failed to start playback: {0}")]
    PlaybackStart(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Resampling error: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, SonicWeaveError>;

/// Rejects NaN, infinities and negative values.
pub(crate) fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SonicWeaveError::InvalidParameter(format!(
            "{} must be a finite, non-negative number (got {})",
            name, value
        )));
    }
    Ok(())
}

pub(crate) fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SonicWeaveError::InvalidParameter(format!(
            "{} must be finite (got {})",
            name, value
        )));
    }
    Ok(())
}

pub(crate) fn ensure_sample_rate(sample_rate: u32) -> Result<()> {
    if sample_rate == 0 {
        return Err(SonicWeaveError::InvalidParameter(
            "Sample rate must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
