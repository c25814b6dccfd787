//! Streaming readers instantiated from [`Sound`](crate::Sound) graphs.
//!
//! A reader is a stateful cursor over one sound. Composite readers own their
//! child readers exclusively, mirroring the shape of the sound graph they were
//! built from. Readers run on the device's mixing thread, so `read` must not
//! block or allocate: every scratch buffer is sized to [`MAX_BLOCK_SIZE`] when
//! the reader is constructed and longer requests are served in chunks.

/// In-memory playback of pre-rendered samples.
pub mod buffer;
/// Join and Mix: sequential and parallel combination of two readers.
pub mod combine;
/// Per-sample transforms: threshold, volume, fades, limit, delay, loop, reverse.
pub mod effect;
/// IIR filtering and biquad coefficient design.
pub mod filter;
/// Waveform generators (sine, sawtooth, triangle, silence).
pub mod generator;
/// Sample-rate conversion and pitch shifting backed by rubato.
pub mod resample;

pub use buffer::BufferReader;
pub use combine::{JoinReader, MixReader};
pub use effect::{
    DelayReader, FadeDirection, FadeReader, LimitReader, LoopReader, ReverseReader,
    ThresholdReader, VolumeReader,
};
pub use filter::{BiquadKind, IirFilterReader, biquad_coefficients};
pub use generator::{GeneratorReader, Waveform};
pub use resample::ResampleReader;

/// Largest block any reader processes in one pass.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Outcome of a single [`Reader::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Number of samples written to the front of the output slice
    pub frames: usize,
    /// True once the reader has no more samples after these
    pub exhausted: bool,
}

impl ReadResult {
    /// `frames` samples were written and more will follow.
    pub fn more(frames: usize) -> Self {
        Self {
            frames,
            exhausted: false,
        }
    }

    /// `frames` samples were written and the reader is now exhausted.
    pub fn end(frames: usize) -> Self {
        Self {
            frames,
            exhausted: true,
        }
    }
}

/// A position-tracking source of mono `f32` samples.
///
/// `read` fills as much of `out` as it can. It only writes fewer than
/// `out.len()` samples when it also reports `exhausted`; afterwards it keeps
/// returning zero frames until it is seeked back into range.
pub trait Reader: Send {
    fn read(&mut self, out: &mut [f32]) -> ReadResult;

    /// Current sample offset.
    fn position(&self) -> u64;

    /// Move to an absolute sample offset. Seeking past the end makes the next
    /// read report exhaustion.
    fn seek(&mut self, position: u64);

    /// Total length in samples, `None` when infinite.
    fn length(&self) -> Option<u64>;

    fn sample_rate(&self) -> u32;
}

/// Convert seconds to a sample count at `sample_rate`, rounding to nearest.
pub(crate) fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * sample_rate as f64).round().max(0.0) as u64
}

/// Sum of two optional lengths, `None` if either side is infinite.
pub(crate) fn add_lengths(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    Some(a?.saturating_add(b?))
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Finite reader over a fixed sample vector.
    pub struct VecReader {
        samples: Vec<f32>,
        position: u64,
        sample_rate: u32,
    }

    impl VecReader {
        pub fn new(samples: Vec<f32>) -> Self {
            Self {
                samples,
                position: 0,
                sample_rate: 1000,
            }
        }

        pub fn boxed(samples: Vec<f32>) -> Box<dyn Reader> {
            Box::new(Self::new(samples))
        }
    }

    impl Reader for VecReader {
        fn read(&mut self, out: &mut [f32]) -> ReadResult {
            let start = (self.position as usize).min(self.samples.len());
            let n = out.len().min(self.samples.len() - start);
            out[..n].copy_from_slice(&self.samples[start..start + n]);
            self.position += n as u64;
            if self.position as usize >= self.samples.len() {
                ReadResult::end(n)
            } else {
                ReadResult::more(n)
            }
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn seek(&mut self, position: u64) {
            self.position = position;
        }

        fn length(&self) -> Option<u64> {
            Some(self.samples.len() as u64)
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
    }

    /// Pull everything from a finite reader in blocks of `block`.
    pub fn drain(reader: &mut dyn Reader, block: usize) -> Vec<f32> {
        let mut all = Vec::new();
        let mut buf = vec![0.0; block];
        loop {
            let r = reader.read(&mut buf);
            all.extend_from_slice(&buf[..r.frames]);
            if r.exhausted {
                return all;
            }
        }
    }
}
