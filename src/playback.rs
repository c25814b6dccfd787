//! Playback control and state management.
//!
//! This module provides the types that connect a caller to a sound playing on a
//! [`Device`](crate::Device):
//! - [`LoopMode`]: How many times a looped sound repeats
//! - [`PlayState`]: Current playback state (playing, paused, stopped, finished)
//! - [`Handle`]: Live control token returned by [`Device::play`](crate::Device::play)
//! - [`HandleId`]: Identity of a handle inside its device
//! - [`MixerCommand`]: Commands for the mixing thread (internal)
//!
//! A handle never owns its device-side entry. It shares a [`HandleStatus`]
//! block of atomics with the mixer and holds the sending side of the command
//! channel. Once the entry is retired every control call is a no-op.

use crate::error::{Result, ensure_non_negative};
use crate::reader::{Reader, seconds_to_samples};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Loop mode for [`Sound::looped`](crate::Sound::looped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play the sound this many times back-to-back
    Count(u32),
    /// Loop forever
    Infinite,
}

impl Default for LoopMode {
    fn default() -> Self {
        Self::Count(1)
    }
}

/// Represents the current playback state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// Contributing to the device mix
    Playing,
    /// Skipped by the mixer, position frozen
    Paused,
    /// Stopped by the caller (terminal)
    Stopped,
    /// The sound ran out of samples (terminal)
    Finished,
}

impl PlayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Playing => 0,
            Self::Paused => 1,
            Self::Stopped => 2,
            Self::Finished => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Playing,
            1 => Self::Paused,
            2 => Self::Stopped,
            _ => Self::Finished,
        }
    }
}

/// Identity of a playing sound inside its device.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandleId({})", self.0)
    }
}

/// State shared between a [`Handle`] and the mixer entry it controls.
///
/// Every field is an atomic so neither side ever waits on the other.
#[derive(Debug)]
pub struct HandleStatus {
    state: AtomicU8,
    volume: AtomicU32,
    position: AtomicU64,
}

impl HandleStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(PlayState::Playing.to_u8()),
            volume: AtomicU32::new(1.0f32.to_bits()),
            position: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Position in samples at the device rate, as last published by the mixer.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn publish_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
    }

    /// Atomically move `from` → `to`. Fails if the current state is not `from`.
    pub(crate) fn transition(&self, from: PlayState, to: PlayState) -> bool {
        self.state
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move any non-terminal state to `to`. Returns false if already terminal.
    pub(crate) fn terminate(&self, to: PlayState) -> bool {
        debug_assert!(to.is_terminal());
        self.transition(PlayState::Playing, to) || self.transition(PlayState::Paused, to)
    }
}

/// Commands that travel from control threads to the mixing thread.
///
/// Transport flips and volume go through [`HandleStatus`] instead; these are
/// the operations that need the mixer to touch its own state.
pub enum MixerCommand {
    /// Register a new entry
    Play(PlaybackInstance),
    /// Move a reader to an absolute sample offset
    Seek(HandleId, u64),
    /// Stop every active entry
    StopAll,
}

impl std::fmt::Debug for MixerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Play(instance) => write!(f, "Play({})", instance.id),
            Self::Seek(id, position) => write!(f, "Seek({}, {})", id, position),
            Self::StopAll => write!(f, "StopAll"),
        }
    }
}

/// A device-side entry: the reader plus the status block it shares with its handle.
pub struct PlaybackInstance {
    pub(crate) id: HandleId,
    pub(crate) reader: Box<dyn Reader>,
    pub(crate) status: Arc<HandleStatus>,
    /// Set once the entry should leave the active set after this step
    pub(crate) retired: bool,
    pub(crate) announced: bool,
}

impl PlaybackInstance {
    pub(crate) fn new(id: HandleId, reader: Box<dyn Reader>, status: Arc<HandleStatus>) -> Self {
        Self {
            id,
            reader,
            status,
            retired: false,
            announced: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Pull up to `buffer.len()` samples and add them, scaled by the handle
    /// volume, into `mix`. Returns the number of samples contributed.
    ///
    /// Marks the instance finished when its reader is exhausted.
    pub(crate) fn mix_into(&mut self, mix: &mut [f32], buffer: &mut [f32]) -> usize {
        let result = self.reader.read(buffer);
        let volume = self.status.volume();

        for (m, s) in mix.iter_mut().zip(&buffer[..result.frames]) {
            *m += s * volume;
        }

        self.status.publish_position(self.reader.position());

        if result.exhausted {
            if self.status.terminate(PlayState::Finished) {
                log::debug!(
                    "{} finished at sample {}",
                    self.id,
                    self.reader.position()
                );
            }
            self.retired = true;
        }

        result.frames
    }

    pub(crate) fn seek(&mut self, position: u64) {
        log::debug!("{} seeking to sample {}", self.id, position);
        self.reader.seek(position);
        self.status.publish_position(position);
    }
}

/// Live control token for a sound playing on a device.
///
/// Cloning a handle yields another token for the same entry. Dropping a
/// handle does not stop playback.
#[derive(Debug, Clone)]
pub struct Handle {
    id: HandleId,
    status: Arc<HandleStatus>,
    commands: Sender<MixerCommand>,
    sample_rate: u32,
}

impl Handle {
    pub(crate) fn new(
        id: HandleId,
        status: Arc<HandleStatus>,
        commands: Sender<MixerCommand>,
        sample_rate: u32,
    ) -> Self {
        Self {
            id,
            status,
            commands,
            sample_rate,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn state(&self) -> PlayState {
        self.status.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Pause a playing handle. Returns false if it was not playing.
    pub fn pause(&self) -> bool {
        let paused = self.status.transition(PlayState::Playing, PlayState::Paused);
        if paused {
            log::debug!("{} paused at sample {}", self.id, self.status.position());
        }
        paused
    }

    /// Resume a paused handle. Returns false if it was not paused.
    pub fn resume(&self) -> bool {
        let resumed = self.status.transition(PlayState::Paused, PlayState::Playing);
        if resumed {
            log::debug!("{} resuming from sample {}", self.id, self.status.position());
        }
        resumed
    }

    /// Stop the handle. The state changes immediately; the mixer drops the
    /// entry at its next step, so at most one more block may be heard.
    pub fn stop(&self) -> bool {
        let stopped = self.status.terminate(PlayState::Stopped);
        if stopped {
            log::debug!("{} stopped at sample {}", self.id, self.status.position());
        }
        stopped
    }

    /// Set this handle's gain in the device mix. Independent of any volume
    /// nodes inside the sound itself.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        ensure_non_negative("Handle volume", volume as f64)?;
        if !self.is_terminal() {
            self.status.set_volume(volume);
        }
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.status.volume()
    }

    /// Move playback to `seconds` from the start of the sound.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        ensure_non_negative("Seek position", seconds)?;
        if self.is_terminal() {
            return Ok(());
        }

        let position = seconds_to_samples(seconds, self.sample_rate);
        // A closed device has dropped the receiver; the handle is inert then.
        if self
            .commands
            .send(MixerCommand::Seek(self.id, position))
            .is_err()
        {
            log::debug!("{} seek ignored, device is closed", self.id);
        }
        Ok(())
    }

    /// Playback position in seconds, as last published by the mixer.
    pub fn position(&self) -> f64 {
        self.status.position() as f64 / self.sample_rate as f64
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.status, &other.status)
    }
}

impl Eq for Handle {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SonicWeaveError;
    use crate::reader::test_util::VecReader;

    fn handle() -> (Handle, crossbeam_channel::Receiver<MixerCommand>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = Handle::new(HandleId(7), Arc::new(HandleStatus::new()), tx, 1000);
        (handle, rx)
    }

    #[test]
    fn test_state_machine() {
        let (handle, _rx) = handle();
        assert_eq!(handle.state(), PlayState::Playing);
        assert!(!handle.resume());
        assert!(handle.pause());
        assert!(!handle.pause());
        assert_eq!(handle.state(), PlayState::Paused);
        assert!(handle.resume());
        assert!(handle.stop());
        assert_eq!(handle.state(), PlayState::Stopped);
    }

    #[test]
    fn test_terminal_handle_ignores_control() {
        let (handle, rx) = handle();
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(!handle.pause());
        assert!(!handle.resume());
        handle.set_volume(0.25).unwrap();
        assert_eq!(handle.volume(), 1.0);
        handle.seek(1.0).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.state(), PlayState::Stopped);
    }

    #[test]
    fn test_paused_handle_can_stop() {
        let (handle, _rx) = handle();
        handle.pause();
        assert!(handle.stop());
        assert_eq!(handle.state(), PlayState::Stopped);
    }

    #[test]
    fn test_volume_validation() {
        let (handle, _rx) = handle();
        assert!(matches!(
            handle.set_volume(-0.5),
            Err(SonicWeaveError::InvalidParameter(_))
        ));
        handle.set_volume(0.0).unwrap();
        assert_eq!(handle.volume(), 0.0);
        assert_eq!(handle.state(), PlayState::Playing);
    }

    #[test]
    fn test_seek_sends_command() {
        let (handle, rx) = handle();
        handle.seek(0.5).unwrap();
        match rx.try_recv() {
            Ok(MixerCommand::Seek(id, position)) => {
                assert_eq!(id, handle.id());
                assert_eq!(position, 500);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(handle.seek(-1.0).is_err());
    }

    #[test]
    fn test_seek_after_device_gone_is_inert() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(handle.seek(0.1).is_ok());
    }

    #[test]
    fn test_instance_finishes_on_exhaustion() {
        let status = Arc::new(HandleStatus::new());
        let mut instance = PlaybackInstance::new(
            HandleId(1),
            VecReader::boxed(vec![1.0, 1.0, 1.0]),
            status.clone(),
        );
        status.set_volume(0.5);

        let mut mix = [0.0; 4];
        let mut scratch = [0.0; 4];
        assert_eq!(instance.mix_into(&mut mix, &mut scratch), 3);
        assert_eq!(mix, [0.5, 0.5, 0.5, 0.0]);
        assert!(instance.retired);
        assert_eq!(status.state(), PlayState::Finished);
        assert_eq!(status.position(), 3);
    }
}
