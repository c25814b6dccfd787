//! Output drivers: what runs the mixer and where its blocks go.

use crate::config::{Backend, DeviceDesc, SampleFormat};
use crate::error::{Result, SonicWeaveError};
use crate::events::{SonicWeaveEvent, send_event};
use crate::mixer::Mixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// The running side of a device. Dropping a driver stops its mixing loop and
/// drops the mixer with it.
pub(crate) enum Driver {
    Cpal(CpalDriver),
    Null(NullDriver),
    /// Mixer driven by [`Device::render`](crate::Device::render)
    Manual(Box<Mixer>),
    Closed,
}

impl Driver {
    pub(crate) fn start(
        desc: &DeviceDesc,
        mixer: Mixer,
        events: Sender<SonicWeaveEvent>,
    ) -> Result<(Self, SampleFormat)> {
        match &desc.backend {
            Backend::Cpal { host, device } => {
                let driver = CpalDriver::start(desc, host.as_deref(), device.as_deref(), mixer, events)?;
                let format = driver.format;
                Ok((Self::Cpal(driver), format))
            }
            Backend::Null => Ok((Self::Null(NullDriver::start(desc, mixer)?), SampleFormat::F32)),
            Backend::Manual => Ok((Self::Manual(Box::new(mixer)), SampleFormat::F32)),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Real audio output: the mixer lives inside the cpal data callback.
pub(crate) struct CpalDriver {
    stream: cpal::Stream,
    format: SampleFormat,
}

impl CpalDriver {
    fn start(
        desc: &DeviceDesc,
        host_name: Option<&str>,
        device_name: Option<&str>,
        mixer: Mixer,
        events: Sender<SonicWeaveEvent>,
    ) -> Result<Self> {
        let host = select_host(host_name)?;
        let device = select_device(&host, device_name)?;
        log::info!(
            "Using audio device '{}' on host {:?}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            host.id()
        );

        let config = cpal::StreamConfig {
            channels: desc.channels,
            sample_rate: cpal::SampleRate(desc.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(desc.block_size as u32),
        };

        // Stream format follows the device's default output format
        let default_config = device.default_output_config().map_err(|e| {
            SonicWeaveError::DeviceOpen(format!("Failed to get default config: {}", e))
        })?;

        let block_samples = desc.block_size * desc.channels as usize;
        let (stream, format) = match default_config.sample_format() {
            cpal::SampleFormat::F32 => (
                create_stream::<f32>(&device, &config, mixer, events, block_samples)?,
                SampleFormat::F32,
            ),
            cpal::SampleFormat::I16 => (
                create_stream::<i16>(&device, &config, mixer, events, block_samples)?,
                SampleFormat::I16,
            ),
            cpal::SampleFormat::U16 => (
                create_stream::<u16>(&device, &config, mixer, events, block_samples)?,
                SampleFormat::U16,
            ),
            other => {
                return Err(SonicWeaveError::DeviceOpen(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        stream.play().map_err(|e| {
            SonicWeaveError::DeviceOpen(format!("Failed to start stream: {}", e))
        })?;

        Ok(Self { stream, format })
    }
}

impl Drop for CpalDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::debug!("Pausing stream on shutdown failed: {}", e);
        }
    }
}

fn select_host(name: Option<&str>) -> Result<cpal::Host> {
    let Some(name) = name else {
        return Ok(cpal::default_host());
    };

    let id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| SonicWeaveError::DeviceOpen(format!("Unknown audio host '{}'", name)))?;
    cpal::host_from_id(id)
        .map_err(|e| SonicWeaveError::DeviceOpen(format!("Host '{}' unavailable: {}", name, e)))
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        None => host.default_output_device().ok_or_else(|| {
            SonicWeaveError::DeviceOpen("No default output device available".into())
        }),
        Some(name) => host
            .output_devices()
            .map_err(|e| {
                SonicWeaveError::DeviceOpen(format!("Failed to enumerate devices: {}", e))
            })?
            .find(|device| device.name().is_ok_and(|n| n == name))
            .ok_or_else(|| {
                SonicWeaveError::DeviceOpen(format!("No output device named '{}'", name))
            }),
    }
}

/// Build a typed output stream around `mixer`.
///
/// The mixer always renders `f32`; blocks are converted with `FromSample`
/// through a scratch buffer sized at creation, in chunks if the host asks for
/// more than one block at a time.
fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    events: Sender<SonicWeaveEvent>,
    block_samples: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0.0f32; block_samples.max(mixer.channels())];
    let chunk_len = scratch.len() - scratch.len() % mixer.channels();

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(chunk_len) {
                    let buffer = &mut scratch[..chunk.len()];
                    mixer.process(buffer);
                    for (out, &sample) in chunk.iter_mut().zip(buffer.iter()) {
                        *out = T::from_sample(sample);
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                send_event(
                    &events,
                    SonicWeaveEvent::StreamError {
                        error: err.to_string(),
                    },
                );
            },
            None,
        )
        .map_err(|e| SonicWeaveError::DeviceOpen(format!("Failed to build stream: {}", e)))?;

    Ok(stream)
}

/// Runs the mixer on a plain thread at the block cadence and discards the output.
pub(crate) struct NullDriver {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NullDriver {
    fn start(desc: &DeviceDesc, mut mixer: Mixer) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs_f64(desc.block_size as f64 / desc.sample_rate as f64);
        let mut buffer = vec![0.0f32; desc.block_size * desc.channels as usize];

        let stop_flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name("sonicweave-null".into())
            .spawn(move || {
                let mut next = Instant::now();
                while !stop_flag.load(Ordering::Relaxed) {
                    mixer.process(&mut buffer);
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        // Fell behind; don't try to catch up with a burst.
                        next = now;
                    }
                }
                log::debug!("Null output thread exiting");
            })
            .map_err(|e| {
                SonicWeaveError::DeviceOpen(format!("Failed to spawn output thread: {}", e))
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for NullDriver {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Null output thread panicked");
            }
        }
    }
}
