//! # SonicWeave
//!
//! Composable sound graphs rendered by sample-accurate streaming readers, with
//! a real-time mixing device on top.
//!
//! A [`Sound`] is an immutable description built from generators and
//! operators. Nothing is computed until a [`Device`] plays it (or it is
//! rendered offline), at which point a [`Reader`](reader::Reader) tree is
//! instantiated from it and pulled block by block.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sonicweave::*;
//!
//! // A short two-note phrase: a sine A4 followed by a square-wave E5
//! let a = Sound::sine(440.0, 44100)?.limit(0.0, 0.25)?;
//! let e = Sound::sine(659.25, 44100)?.square().volume(0.3)?.limit(0.0, 0.25)?;
//! let phrase = a.join(&e)?.fadeout(0.45, 0.05)?;
//!
//! // Open the default output and play it
//! let device = Device::open(DeviceDesc::default())?;
//! let handle = device.play(&phrase)?;
//!
//! handle.set_volume(0.8)?;
//! std::thread::sleep(std::time::Duration::from_millis(600));
//!
//! for event in device.poll_events() {
//!     if let SonicWeaveEvent::HandleFinished { handle } = event {
//!         println!("{} done", handle);
//!     }
//! }
//! # Ok::<(), SonicWeaveError>(())
//! ```
//!
//! ## Key Components
//!
//! - **[`Sound`]**: Immutable sound graph node and the operator library
//! - **[`Device`]**: Output stream plus the mixing loop
//! - **[`Handle`]**: Transport and volume control for one playing sound
//! - **[`DeviceDesc`]**: Device configuration (backend, rate, channels, block size)
//! - **[`SonicWeaveEvent`]**: Events emitted by the mixing loop
//!
//! ## Threading
//!
//! The mixing loop never blocks and never waits on callers. Handle transport
//! and volume are shared atomics; seeks and new sounds travel over a lock-free
//! channel that the mixer drains at the start of each block.

pub mod config;
pub mod device;
mod engine;
pub mod error;
pub mod events;
pub mod mixer;
pub mod playback;
pub mod reader;
pub mod sound;

pub use config::{Backend, DeviceDesc, SampleFormat};
pub use device::Device;
pub use error::{Result, SonicWeaveError};
pub use events::SonicWeaveEvent;
pub use playback::{Handle, HandleId, LoopMode, PlayState};
pub use sound::{SampleBuffer, Sound, SoundNode};
