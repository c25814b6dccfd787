//! The output device: owns the stream and the mixing loop, hands out handles.

use crate::config::{Backend, DeviceDesc, SampleFormat};
use crate::engine::Driver;
use crate::error::{Result, SonicWeaveError, ensure_non_negative};
use crate::events::{SonicWeaveEvent, send_event};
use crate::mixer::{Mixer, MixerLinks};
use crate::playback::{Handle, HandleId, HandleStatus, MixerCommand, PlaybackInstance};
use crate::reader::Reader;
use crate::sound::Sound;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// An open audio output with its own mixing loop.
///
/// All methods are non-blocking. Sounds are handed to the mixing thread as
/// ready-made reader trees; the mixing thread hands retired trees back so they
/// are freed here, in [`poll_events`](Self::poll_events) or [`play`](Self::play).
pub struct Device {
    desc: DeviceDesc,
    format: SampleFormat,
    driver: Driver,
    commands: Sender<MixerCommand>,
    event_tx: Sender<SonicWeaveEvent>,
    events: Receiver<SonicWeaveEvent>,
    retired: Receiver<Box<dyn Reader>>,
    active_count: Arc<AtomicUsize>,
    master_volume: Arc<AtomicU32>,
    next_id: AtomicU64,
}

impl Device {
    /// Open an output device and start its mixing loop.
    ///
    /// # Arguments
    /// * `desc` - Backend selection and stream parameters
    ///
    /// # Errors
    /// `InvalidParameter` for an invalid descriptor, `DeviceOpen` if the
    /// backend, host or output device cannot be acquired.
    pub fn open(desc: DeviceDesc) -> Result<Self> {
        desc.validate()?;

        let (commands, command_rx) = unbounded();
        let (event_tx, events) = bounded(desc.event_capacity.max(1));
        let (retired_tx, retired) = bounded(desc.max_sources);
        let active_count = Arc::new(AtomicUsize::new(0));
        let master_volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        let mixer = Mixer::new(
            desc.channels,
            desc.max_sources,
            MixerLinks {
                commands: command_rx,
                events: event_tx.clone(),
                retired: retired_tx,
                active_count: active_count.clone(),
                master_volume: master_volume.clone(),
            },
        );

        let (driver, format) = Driver::start(&desc, mixer, event_tx.clone())?;
        log::info!(
            "Opened {} device: {} Hz, {} channels, {:?}, {} frames per block",
            desc.backend.name(),
            desc.sample_rate,
            desc.channels,
            format,
            desc.block_size
        );

        Ok(Self {
            desc,
            format,
            driver,
            commands,
            event_tx,
            events,
            retired,
            active_count,
            master_volume,
            next_id: AtomicU64::new(1),
        })
    }

    /// Start playing `sound` and return a handle to control it.
    ///
    /// Sounds at a different sample rate are resampled to the device rate.
    ///
    /// # Errors
    /// `PlaybackStart` if the device is closed or already plays `max_sources`
    /// handles. `Resample` if the rate conversion cannot be set up.
    pub fn play(&self, sound: &Sound) -> Result<Handle> {
        if self.driver.is_closed() {
            return Err(SonicWeaveError::PlaybackStart("Device is closed".into()));
        }
        self.collect_retired();

        let sound = sound.resample(self.desc.sample_rate)?;
        let reader = sound.reader()?;

        let max = self.desc.max_sources;
        self.active_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| {
                SonicWeaveError::PlaybackStart(format!("All {} playback slots are in use", max))
            })?;

        let id = HandleId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let status = Arc::new(HandleStatus::new());
        let instance = PlaybackInstance::new(id, reader, status.clone());

        if self.commands.send(MixerCommand::Play(instance)).is_err() {
            self.active_count.fetch_sub(1, Ordering::AcqRel);
            return Err(SonicWeaveError::PlaybackStart(
                "The mixing loop is no longer running".into(),
            ));
        }

        log::debug!(
            "Playing {} ({} Hz, {} samples)",
            id,
            sound.sample_rate(),
            sound
                .length()
                .map_or_else(|| "infinite".to_string(), |len| len.to_string())
        );
        Ok(Handle::new(
            id,
            status,
            self.commands.clone(),
            self.desc.sample_rate,
        ))
    }

    /// Stop every active handle. Takes effect at the mixer's next step.
    pub fn stop_all(&self) {
        if self.commands.send(MixerCommand::StopAll).is_err() {
            log::debug!("stop_all ignored, device is closed");
        }
    }

    /// Master gain applied to the summed mix before clamping.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        ensure_non_negative("Device volume", volume as f64)?;
        self.master_volume
            .store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    /// Handles registered with the mixer and not yet retired.
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Drain pending events. Also frees reader trees the mixer has retired.
    pub fn poll_events(&self) -> Vec<SonicWeaveEvent> {
        self.collect_retired();
        self.events.try_iter().collect()
    }

    /// Run one mixing step into `out` (interleaved). Only available on
    /// [`Backend::Manual`]; returns the number of frames written.
    pub fn render(&mut self, out: &mut [f32]) -> Result<usize> {
        match &mut self.driver {
            Driver::Manual(mixer) => Ok(mixer.process(out).frames),
            Driver::Closed => Err(SonicWeaveError::Stream("Device is closed".into())),
            _ => Err(SonicWeaveError::InvalidParameter(format!(
                "render() needs the manual backend, this device uses '{}'",
                self.desc.backend.name()
            ))),
        }
    }

    /// Stop the output stream. Every handle still active becomes `Stopped`.
    pub fn close(&mut self) {
        if self.driver.is_closed() {
            return;
        }
        self.driver = Driver::Closed;
        self.collect_retired();
        send_event(&self.event_tx, SonicWeaveEvent::DeviceClosed);
        log::info!("Closed {} device", self.desc.backend.name());
    }

    pub fn is_closed(&self) -> bool {
        self.driver.is_closed()
    }

    pub fn sample_rate(&self) -> u32 {
        self.desc.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.desc.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn backend(&self) -> &Backend {
        &self.desc.backend
    }

    fn collect_retired(&self) {
        let freed = self.retired.try_iter().count();
        if freed > 0 {
            log::trace!("Freed {} retired readers", freed);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}
