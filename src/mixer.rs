// Mixer module - the per-step mixing routine run by the device's audio thread.
// It is the only place readers are pulled while a device is live.

use crate::events::{SonicWeaveEvent, send_event};
use crate::playback::{HandleId, MixerCommand, PlayState, PlaybackInstance};
use crate::reader::{MAX_BLOCK_SIZE, Reader};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Result of one mixing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixResult {
    /// Frames written to the output buffer
    pub frames: usize,
    /// Entries that contributed samples this step
    pub playing: usize,
    /// Entries that reached the end of their sound this step
    pub finished: usize,
    /// Entries removed because they were stopped
    pub stopped: usize,
}

/// The channels connecting a mixer to its device.
pub(crate) struct MixerLinks {
    pub commands: Receiver<MixerCommand>,
    pub events: Sender<SonicWeaveEvent>,
    pub retired: Sender<Box<dyn Reader>>,
    pub active_count: Arc<AtomicUsize>,
    pub master_volume: Arc<AtomicU32>,
}

/// Owns the active set and renders it into interleaved output blocks.
///
/// All buffers are sized at construction. `process` never blocks: commands are
/// drained with `try_recv`, events and retired readers leave with `try_send`.
pub struct Mixer {
    channels: usize,
    active: Vec<PlaybackInstance>,
    links: MixerLinks,
    mix: Vec<f32>,
    scratch: Vec<f32>,
}

impl Mixer {
    pub(crate) fn new(channels: u16, max_sources: usize, links: MixerLinks) -> Self {
        Self {
            channels: channels.max(1) as usize,
            active: Vec::with_capacity(max_sources),
            links,
            mix: vec![0.0; MAX_BLOCK_SIZE],
            scratch: vec![0.0; MAX_BLOCK_SIZE],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of entries currently held by the mixer.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Render one step into `out` (interleaved, `channels` samples per frame).
    ///
    /// Playing entries are pulled, scaled by their handle volume, summed, scaled
    /// by the master volume and clamped to [-1, 1]. Mono entry output is copied
    /// to every channel. Paused entries are skipped with their position frozen.
    /// Stopped and exhausted entries leave the active set at the end of the step.
    pub fn process(&mut self, out: &mut [f32]) -> MixResult {
        self.drain_commands();

        let channels = self.channels;
        let master = f32::from_bits(self.links.master_volume.load(Ordering::Relaxed));
        let mut result = MixResult {
            frames: out.len() / channels,
            ..Default::default()
        };

        for chunk in out.chunks_mut(MAX_BLOCK_SIZE * channels) {
            let frames = chunk.len() / channels;
            let mix = &mut self.mix[..frames];
            mix.fill(0.0);

            for instance in self.active.iter_mut() {
                if instance.retired {
                    continue;
                }
                match instance.status.state() {
                    PlayState::Playing => {
                        instance.mix_into(mix, &mut self.scratch[..frames]);
                    }
                    PlayState::Paused => {}
                    PlayState::Stopped | PlayState::Finished => instance.retired = true,
                }
            }

            for (frame, &sample) in chunk.chunks_mut(channels).zip(mix.iter()) {
                frame.fill((sample * master).clamp(-1.0, 1.0));
            }
            // A trailing partial frame gets silence.
            let tail = frames * channels;
            chunk[tail..].fill(0.0);
        }

        result.playing = self
            .active
            .iter()
            .filter(|i| !i.retired && i.status.state() == PlayState::Playing)
            .count();
        self.retire(&mut result);
        result
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.links.commands.try_recv() {
            match command {
                MixerCommand::Play(mut instance) => {
                    log::debug!("Mixer: registering {}", instance.id);
                    if !instance.announced {
                        instance.announced = true;
                        self.emit(SonicWeaveEvent::HandleStarted {
                            handle: instance.id,
                        });
                    }
                    self.active.push(instance);
                }
                MixerCommand::Seek(id, position) => match self.find(id) {
                    Some(instance) => instance.seek(position),
                    None => log::debug!("Mixer: seek for retired {} ignored", id),
                },
                MixerCommand::StopAll => {
                    log::debug!("Mixer: stopping all {} entries", self.active.len());
                    for instance in self.active.iter_mut() {
                        instance.status.terminate(PlayState::Stopped);
                        instance.retired = true;
                    }
                }
            }
        }
    }

    fn find(&mut self, id: HandleId) -> Option<&mut PlaybackInstance> {
        self.active.iter_mut().find(|i| i.id == id && !i.retired)
    }

    fn retire(&mut self, result: &mut MixResult) {
        let mut index = 0;
        while index < self.active.len() {
            if !self.active[index].retired {
                index += 1;
                continue;
            }

            let instance = self.active.swap_remove(index);
            let event = if instance.status.state() == PlayState::Stopped {
                result.stopped += 1;
                SonicWeaveEvent::HandleStopped {
                    handle: instance.id,
                }
            } else {
                result.finished += 1;
                SonicWeaveEvent::HandleFinished {
                    handle: instance.id,
                }
            };
            log::debug!("Mixer: removed {} from the active set", instance.id);
            self.links.active_count.fetch_sub(1, Ordering::AcqRel);
            self.emit(event);

            // Hand the reader tree back so it is freed off the audio thread.
            if let Err(TrySendError::Full(reader)) = self.links.retired.try_send(instance.reader) {
                drop(reader);
            }
        }
    }

    fn emit(&self, event: SonicWeaveEvent) {
        send_event(&self.links.events, event);
    }
}

impl Drop for Mixer {
    // Handles outlive their device; leave them in a terminal state.
    fn drop(&mut self) {
        for instance in self.active.drain(..) {
            instance.status.terminate(PlayState::Stopped);
        }
        while let Ok(command) = self.links.commands.try_recv() {
            if let MixerCommand::Play(instance) = command {
                instance.status.terminate(PlayState::Stopped);
            }
        }
        self.links.active_count.store(0, Ordering::Release);
    }
}
