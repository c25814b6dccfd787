//! Configuration for SonicWeave devices

use crate::error::{Result, SonicWeaveError};

/// Which output backend a [`Device`](crate::Device) drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Real audio output through cpal.
    ///
    /// `host` and `device` are matched by name; `None` picks the platform default.
    Cpal {
        host: Option<String>,
        device: Option<String>,
    },
    /// A background thread runs the mixing step at the block cadence and
    /// discards the output. Useful for headless machines.
    Null,
    /// No mixing thread at all. The caller pulls blocks with
    /// [`Device::render`](crate::Device::render).
    Manual,
}

impl Default for Backend {
    fn default() -> Self {
        Self::Cpal {
            host: None,
            device: None,
        }
    }
}

impl Backend {
    /// Default cpal host, device selected by name.
    pub fn cpal_device(name: impl Into<String>) -> Self {
        Self::Cpal {
            host: None,
            device: Some(name.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpal { .. } => "cpal",
            Self::Null => "null",
            Self::Manual => "manual",
        }
    }
}

/// Sample format of the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
    U16,
}

/// Configuration descriptor for a device
#[derive(Debug, Clone)]
pub struct DeviceDesc {
    /// Output backend
    pub backend: Backend,
    /// Output sample rate in Hz. Sounds at other rates are resampled on play.
    pub sample_rate: u32,
    /// Number of output channels (typically 2 for stereo)
    pub channels: u16,
    /// Frames rendered per mixing step
    pub block_size: usize,
    /// Maximum number of concurrently active handles
    pub max_sources: usize,
    /// Capacity of the event channel; events beyond it are dropped
    pub event_capacity: usize,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            sample_rate: 48000,
            channels: 2,
            block_size: 512,
            max_sources: 64,
            event_capacity: 256,
        }
    }
}

impl DeviceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SonicWeaveError::InvalidParameter(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(SonicWeaveError::InvalidParameter(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(SonicWeaveError::InvalidParameter(
                "Block size must be greater than 0".to_string(),
            ));
        }
        if self.max_sources == 0 {
            return Err(SonicWeaveError::InvalidParameter(
                "max_sources must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let desc = DeviceDesc::new()
            .backend(Backend::Manual)
            .sample_rate(44100)
            .channels(1)
            .block_size(128)
            .max_sources(4);

        assert_eq!(desc.backend, Backend::Manual);
        assert_eq!(desc.sample_rate, 44100);
        assert_eq!(desc.channels, 1);
        assert_eq!(desc.block_size, 128);
        assert_eq!(desc.max_sources, 4);
        assert_eq!(desc.event_capacity, 256);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(DeviceDesc::new().sample_rate(0).validate().is_err());
        assert!(DeviceDesc::new().channels(0).validate().is_err());
        assert!(DeviceDesc::new().block_size(0).validate().is_err());
        assert!(DeviceDesc::new().max_sources(0).validate().is_err());
    }
}
