//! Immutable sound descriptions.
//!
//! A [`Sound`] is a node in an acyclic graph of generators and transforms. It
//! never produces samples itself: [`Sound::reader`] instantiates a fresh
//! [`Reader`] tree mirroring the graph, which is what a device or an offline
//! render pulls from.
//!
//! Every operator takes `&self` and returns a new `Sound` wrapping the
//! receiver, so one sound can be reused as the child of any number of parents
//! and shared across threads.
//!
//! ```no_run
//! use sonicweave::Sound;
//!
//! # fn main() -> sonicweave::Result<()> {
//! let a = Sound::sine(440.0, 44100)?.limit(0.0, 0.25)?;
//! let e = Sound::sine(659.25, 44100)?.square().limit(0.0, 0.25)?;
//! let melody = a.join(&e)?.fadeout(0.4, 0.1)?;
//! let samples = melody.render(44100)?;
//! assert_eq!(samples.len(), 22050);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::{
    Result, SonicWeaveError, ensure_finite, ensure_non_negative, ensure_sample_rate,
};
use crate::playback::LoopMode;
use crate::reader::filter::{BiquadKind, biquad_coefficients};
use crate::reader::resample::{pitched_length, scaled_length};
use crate::reader::{
    BufferReader, DelayReader, FadeDirection, FadeReader, GeneratorReader, IirFilterReader,
    JoinReader, LimitReader, LoopReader, MixReader, Reader, ResampleReader, ReverseReader,
    ThresholdReader, VolumeReader, Waveform, add_lengths, seconds_to_samples,
};

/// Samples rendered by [`Sound::buffer`], shared by every reader over them.
#[derive(Clone)]
pub struct SampleBuffer(Arc<[f32]>);

impl SampleBuffer {
    pub fn samples(&self) -> &[f32] {
        &self.0
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleBuffer({} samples)", self.0.len())
    }
}

/// One node of a sound graph. Time parameters are in seconds.
#[derive(Debug, Clone)]
pub enum SoundNode {
    Sine { frequency: f64, sample_rate: u32 },
    Sawtooth { frequency: f64, sample_rate: u32 },
    Triangle { frequency: f64, sample_rate: u32 },
    Silence { sample_rate: u32 },
    Buffer { samples: SampleBuffer, sample_rate: u32 },
    Threshold { source: Sound, level: f32 },
    Volume { source: Sound, gain: f32 },
    FadeIn { source: Sound, start: f64, duration: f64 },
    FadeOut { source: Sound, start: f64, duration: f64 },
    Limit { source: Sound, start: f64, end: f64 },
    Delay { source: Sound, delay: f64 },
    Loop { source: Sound, mode: LoopMode },
    Resample { source: Sound, sample_rate: u32 },
    Pitch { source: Sound, factor: f64 },
    Reverse { source: Sound },
    Lowpass { source: Sound, frequency: f64, q: f64 },
    Highpass { source: Sound, frequency: f64, q: f64 },
    Filter { source: Sound, b: Arc<[f32]>, a: Arc<[f32]> },
    Join { first: Sound, second: Sound },
    Mix { first: Sound, second: Sound },
}

/// Shareable, immutable sound description. Cloning is an `Arc` clone.
#[derive(Debug, Clone)]
pub struct Sound {
    node: Arc<SoundNode>,
}

impl Sound {
    fn new(node: SoundNode) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    fn generator(waveform: Waveform, frequency: f64, sample_rate: u32) -> Result<Self> {
        ensure_non_negative("Frequency", frequency)?;
        ensure_sample_rate(sample_rate)?;
        Ok(Self::new(match waveform {
            Waveform::Sine => SoundNode::Sine {
                frequency,
                sample_rate,
            },
            Waveform::Sawtooth => SoundNode::Sawtooth {
                frequency,
                sample_rate,
            },
            Waveform::Triangle => SoundNode::Triangle {
                frequency,
                sample_rate,
            },
            Waveform::Silence => SoundNode::Silence { sample_rate },
        }))
    }

    /// Infinite sine wave with amplitude 1, starting at phase 0.
    ///
    /// # Arguments
    /// * `frequency` - Frequency in Hz
    /// * `sample_rate` - Sample rate in Hz
    ///
    /// # Errors
    /// `InvalidParameter` for a negative or non-finite frequency or a zero sample rate.
    pub fn sine(frequency: f64, sample_rate: u32) -> Result<Self> {
        Self::generator(Waveform::Sine, frequency, sample_rate)
    }

    /// Infinite rising sawtooth in [-1, 1).
    pub fn sawtooth(frequency: f64, sample_rate: u32) -> Result<Self> {
        Self::generator(Waveform::Sawtooth, frequency, sample_rate)
    }

    /// Infinite triangle wave, starting at 0 and rising like the sine.
    pub fn triangle(frequency: f64, sample_rate: u32) -> Result<Self> {
        Self::generator(Waveform::Triangle, frequency, sample_rate)
    }

    /// Infinite silence.
    pub fn silence(sample_rate: u32) -> Result<Self> {
        Self::generator(Waveform::Silence, 0.0, sample_rate)
    }

    /// Bipolar square wave, built as `sine(frequency, sample_rate).square()`.
    pub fn square_wave(frequency: f64, sample_rate: u32) -> Result<Self> {
        Ok(Self::sine(frequency, sample_rate)?.square())
    }

    /// Map each sample to `+1` if it is `>= level`, otherwise `-1`.
    pub fn threshold(&self, level: f32) -> Result<Self> {
        ensure_finite("Threshold level", level as f64)?;
        Ok(Self::new(SoundNode::Threshold {
            source: self.clone(),
            level,
        }))
    }

    /// Same as `threshold(0.0)`.
    pub fn square(&self) -> Self {
        Self::new(SoundNode::Threshold {
            source: self.clone(),
            level: 0.0,
        })
    }

    /// Multiply every sample by `gain`. A gain of 0 keeps the stream running silently.
    pub fn volume(&self, gain: f32) -> Result<Self> {
        ensure_finite("Gain", gain as f64)?;
        Ok(Self::new(SoundNode::Volume {
            source: self.clone(),
            gain,
        }))
    }

    /// Silence before `start`, a linear 0→1 ramp over `duration`, then unity.
    ///
    /// # Errors
    /// `InvalidParameter` if either time is negative or not finite.
    pub fn fadein(&self, start: f64, duration: f64) -> Result<Self> {
        ensure_non_negative("Fade start", start)?;
        ensure_non_negative("Fade duration", duration)?;
        Ok(Self::new(SoundNode::FadeIn {
            source: self.clone(),
            start,
            duration,
        }))
    }

    /// Unity before `start`, a linear 1→0 ramp over `duration`, then silence.
    pub fn fadeout(&self, start: f64, duration: f64) -> Result<Self> {
        ensure_non_negative("Fade start", start)?;
        ensure_non_negative("Fade duration", duration)?;
        Ok(Self::new(SoundNode::FadeOut {
            source: self.clone(),
            start,
            duration,
        }))
    }

    /// Window `[start, end)` of this sound's timeline. Offset `k` of the result
    /// is this sound's sample at `start + k`. `end <= start` gives an empty sound.
    pub fn limit(&self, start: f64, end: f64) -> Result<Self> {
        ensure_non_negative("Limit start", start)?;
        ensure_non_negative("Limit end", end)?;
        Ok(Self::new(SoundNode::Limit {
            source: self.clone(),
            start,
            end,
        }))
    }

    /// Prepend `seconds` of silence.
    pub fn delay(&self, seconds: f64) -> Result<Self> {
        ensure_non_negative("Delay", seconds)?;
        Ok(Self::new(SoundNode::Delay {
            source: self.clone(),
            delay: seconds,
        }))
    }

    /// Replay this sound back-to-back according to `mode`.
    pub fn looped(&self, mode: LoopMode) -> Self {
        Self::new(SoundNode::Loop {
            source: self.clone(),
            mode,
        })
    }

    /// Convert to `sample_rate`. Returns a plain clone when the rate already matches.
    pub fn resample(&self, sample_rate: u32) -> Result<Self> {
        ensure_sample_rate(sample_rate)?;
        if sample_rate == self.sample_rate() {
            return Ok(self.clone());
        }
        Ok(Self::new(SoundNode::Resample {
            source: self.clone(),
            sample_rate,
        }))
    }

    /// Play this sound `factor` times faster, which raises its pitch by the
    /// same factor. The declared sample rate is unchanged.
    ///
    /// # Errors
    /// `InvalidParameter` unless `factor` is finite and positive.
    pub fn pitch(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SonicWeaveError::InvalidParameter(format!(
                "Pitch factor must be finite and positive (got {})",
                factor
            )));
        }
        Ok(Self::new(SoundNode::Pitch {
            source: self.clone(),
            factor,
        }))
    }

    /// Play this sound backwards.
    ///
    /// # Errors
    /// `InvalidParameter` if the sound is infinite.
    pub fn reverse(&self) -> Result<Self> {
        self.ensure_finite_length("reverse")?;
        Ok(Self::new(SoundNode::Reverse {
            source: self.clone(),
        }))
    }

    /// This sound forwards, then backwards.
    pub fn pingpong(&self) -> Result<Self> {
        self.join(&self.reverse()?)
    }

    /// Render this sound once and keep the samples in memory. Readers of the
    /// result share the rendered buffer.
    ///
    /// # Errors
    /// `InvalidParameter` if the sound is infinite or too long to hold in memory.
    pub fn buffer(&self) -> Result<Self> {
        let length = self.ensure_finite_length("buffer")?;
        let frames = usize::try_from(length).map_err(|_| {
            SonicWeaveError::InvalidParameter(format!("{} samples do not fit in memory", length))
        })?;
        let samples = self.render(frames)?;
        log::debug!("Buffered {} samples at {} Hz", samples.len(), self.sample_rate());
        Ok(Self::new(SoundNode::Buffer {
            samples: SampleBuffer(Arc::from(samples)),
            sample_rate: self.sample_rate(),
        }))
    }

    /// Second-order lowpass at `frequency` Hz with quality factor `q`.
    ///
    /// # Errors
    /// `InvalidParameter` if `frequency` is not in (0, Nyquist) or `q` is not positive.
    pub fn lowpass(&self, frequency: f64, q: f64) -> Result<Self> {
        self.ensure_cutoff(frequency, q)?;
        Ok(Self::new(SoundNode::Lowpass {
            source: self.clone(),
            frequency,
            q,
        }))
    }

    /// Second-order highpass at `frequency` Hz with quality factor `q`.
    pub fn highpass(&self, frequency: f64, q: f64) -> Result<Self> {
        self.ensure_cutoff(frequency, q)?;
        Ok(Self::new(SoundNode::Highpass {
            source: self.clone(),
            frequency,
            q,
        }))
    }

    /// General IIR filter with feed-forward coefficients `b` and feedback
    /// coefficients `a` (`a[0]` scales the output). `&[1.0]` for `a` gives an
    /// FIR filter.
    ///
    /// # Errors
    /// `InvalidParameter` if either list is empty, `a[0]` is zero, or any
    /// coefficient is not finite.
    pub fn filter(&self, b: &[f32], a: &[f32]) -> Result<Self> {
        if b.is_empty() || a.is_empty() {
            return Err(SonicWeaveError::InvalidParameter(
                "Filter coefficient lists must not be empty".into(),
            ));
        }
        if a[0] == 0.0 {
            return Err(SonicWeaveError::InvalidParameter(
                "The first feedback coefficient must not be zero".into(),
            ));
        }
        for &c in b.iter().chain(a) {
            ensure_finite("Filter coefficient", c as f64)?;
        }
        Ok(Self::new(SoundNode::Filter {
            source: self.clone(),
            b: Arc::from(b),
            a: Arc::from(a),
        }))
    }

    fn ensure_finite_length(&self, operation: &str) -> Result<u64> {
        self.length().ok_or_else(|| {
            SonicWeaveError::InvalidParameter(format!("Cannot {} an infinite sound", operation))
        })
    }

    fn ensure_cutoff(&self, frequency: f64, q: f64) -> Result<()> {
        let nyquist = self.sample_rate() as f64 / 2.0;
        if !frequency.is_finite() || frequency <= 0.0 || frequency >= nyquist {
            return Err(SonicWeaveError::InvalidParameter(format!(
                "Cutoff must be between 0 and {} Hz (got {})",
                nyquist, frequency
            )));
        }
        if !q.is_finite() || q <= 0.0 {
            return Err(SonicWeaveError::InvalidParameter(format!(
                "Q must be finite and positive (got {})",
                q
            )));
        }
        Ok(())
    }

    /// Play this sound to its end, then `other`.
    ///
    /// # Errors
    /// `InvalidParameter` if the two sounds have different sample rates.
    pub fn join(&self, other: &Sound) -> Result<Self> {
        self.ensure_same_rate(other, "join")?;
        Ok(Self::new(SoundNode::Join {
            first: self.clone(),
            second: other.clone(),
        }))
    }

    /// Sum this sound and `other` sample by sample. The shorter one is padded
    /// with silence; no clipping is applied.
    ///
    /// # Errors
    /// `InvalidParameter` if the two sounds have different sample rates.
    pub fn mix(&self, other: &Sound) -> Result<Self> {
        self.ensure_same_rate(other, "mix")?;
        Ok(Self::new(SoundNode::Mix {
            first: self.clone(),
            second: other.clone(),
        }))
    }

    fn ensure_same_rate(&self, other: &Sound, operation: &str) -> Result<()> {
        let (a, b) = (self.sample_rate(), other.sample_rate());
        if a != b {
            return Err(SonicWeaveError::InvalidParameter(format!(
                "Cannot {} sounds at {} Hz and {} Hz; resample one of them first",
                operation, a, b
            )));
        }
        Ok(())
    }

    pub fn node(&self) -> &SoundNode {
        &self.node
    }

    pub fn sample_rate(&self) -> u32 {
        match self.node() {
            SoundNode::Sine { sample_rate, .. }
            | SoundNode::Sawtooth { sample_rate, .. }
            | SoundNode::Triangle { sample_rate, .. }
            | SoundNode::Silence { sample_rate }
            | SoundNode::Buffer { sample_rate, .. }
            | SoundNode::Resample { sample_rate, .. } => *sample_rate,
            SoundNode::Threshold { source, .. }
            | SoundNode::Volume { source, .. }
            | SoundNode::FadeIn { source, .. }
            | SoundNode::FadeOut { source, .. }
            | SoundNode::Limit { source, .. }
            | SoundNode::Delay { source, .. }
            | SoundNode::Loop { source, .. }
            | SoundNode::Pitch { source, .. }
            | SoundNode::Reverse { source }
            | SoundNode::Lowpass { source, .. }
            | SoundNode::Highpass { source, .. }
            | SoundNode::Filter { source, .. } => source.sample_rate(),
            SoundNode::Join { first, .. } | SoundNode::Mix { first, .. } => first.sample_rate(),
        }
    }

    /// Length in samples, `None` if the sound never ends.
    pub fn length(&self) -> Option<u64> {
        match self.node() {
            SoundNode::Sine { .. }
            | SoundNode::Sawtooth { .. }
            | SoundNode::Triangle { .. }
            | SoundNode::Silence { .. } => None,
            SoundNode::Threshold { source, .. }
            | SoundNode::Volume { source, .. }
            | SoundNode::FadeIn { source, .. }
            | SoundNode::FadeOut { source, .. }
            | SoundNode::Reverse { source }
            | SoundNode::Lowpass { source, .. }
            | SoundNode::Highpass { source, .. }
            | SoundNode::Filter { source, .. } => source.length(),
            SoundNode::Buffer { samples, .. } => Some(samples.samples().len() as u64),
            SoundNode::Pitch { source, factor } => {
                source.length().map(|len| pitched_length(len, *factor))
            }
            SoundNode::Limit { source, start, end } => {
                let rate = source.sample_rate();
                let start = seconds_to_samples(*start, rate);
                let window = seconds_to_samples(*end, rate).saturating_sub(start);
                match source.length() {
                    Some(len) => Some(len.saturating_sub(start).min(window)),
                    None => Some(window),
                }
            }
            SoundNode::Delay { source, delay } => source
                .length()
                .map(|len| len.saturating_add(seconds_to_samples(*delay, source.sample_rate()))),
            SoundNode::Loop { source, mode } => match (*mode, source.length()) {
                (LoopMode::Count(0), _) | (_, Some(0)) => Some(0),
                (LoopMode::Count(n), Some(len)) => Some(len.saturating_mul(n as u64)),
                _ => None,
            },
            SoundNode::Resample {
                source,
                sample_rate,
            } => source
                .length()
                .map(|len| scaled_length(len, source.sample_rate() as u64, *sample_rate as u64)),
            SoundNode::Join { first, second } => add_lengths(first.length(), second.length()),
            SoundNode::Mix { first, second } => Some(first.length()?.max(second.length()?)),
        }
    }

    /// Length in seconds, `None` if the sound never ends.
    pub fn duration(&self) -> Option<f64> {
        self.length()
            .map(|len| len as f64 / self.sample_rate() as f64)
    }

    /// Instantiate a fresh reader tree for this sound.
    ///
    /// # Errors
    /// `Resample` if a resampling stage cannot be set up.
    pub fn reader(&self) -> Result<Box<dyn Reader>> {
        let reader: Box<dyn Reader> = match self.node() {
            SoundNode::Sine {
                frequency,
                sample_rate,
            } => Box::new(GeneratorReader::new(Waveform::Sine, *frequency, *sample_rate)),
            SoundNode::Sawtooth {
                frequency,
                sample_rate,
            } => Box::new(GeneratorReader::new(
                Waveform::Sawtooth,
                *frequency,
                *sample_rate,
            )),
            SoundNode::Triangle {
                frequency,
                sample_rate,
            } => Box::new(GeneratorReader::new(
                Waveform::Triangle,
                *frequency,
                *sample_rate,
            )),
            SoundNode::Silence { sample_rate } => {
                Box::new(GeneratorReader::new(Waveform::Silence, 0.0, *sample_rate))
            }
            SoundNode::Threshold { source, level } => {
                Box::new(ThresholdReader::new(source.reader()?, *level))
            }
            SoundNode::Volume { source, gain } => {
                Box::new(VolumeReader::new(source.reader()?, *gain))
            }
            SoundNode::FadeIn {
                source,
                start,
                duration,
            } => fade(source, FadeDirection::In, *start, *duration)?,
            SoundNode::FadeOut {
                source,
                start,
                duration,
            } => fade(source, FadeDirection::Out, *start, *duration)?,
            SoundNode::Limit { source, start, end } => {
                let rate = source.sample_rate();
                Box::new(LimitReader::new(
                    source.reader()?,
                    seconds_to_samples(*start, rate),
                    seconds_to_samples(*end, rate),
                ))
            }
            SoundNode::Delay { source, delay } => Box::new(DelayReader::new(
                source.reader()?,
                seconds_to_samples(*delay, source.sample_rate()),
            )),
            SoundNode::Loop { source, mode } => Box::new(LoopReader::new(source.reader()?, *mode)),
            SoundNode::Resample {
                source,
                sample_rate,
            } => Box::new(ResampleReader::new(source.reader()?, *sample_rate)?),
            SoundNode::Buffer {
                samples,
                sample_rate,
            } => Box::new(BufferReader::new(samples.0.clone(), *sample_rate)),
            SoundNode::Pitch { source, factor } => {
                Box::new(ResampleReader::pitched(source.reader()?, *factor)?)
            }
            SoundNode::Reverse { source } => Box::new(ReverseReader::new(source.reader()?)),
            SoundNode::Lowpass {
                source,
                frequency,
                q,
            } => biquad(source, BiquadKind::Lowpass, *frequency, *q)?,
            SoundNode::Highpass {
                source,
                frequency,
                q,
            } => biquad(source, BiquadKind::Highpass, *frequency, *q)?,
            SoundNode::Filter { source, b, a } => {
                Box::new(IirFilterReader::new(source.reader()?, b, a))
            }
            SoundNode::Join { first, second } => {
                Box::new(JoinReader::new(first.reader()?, second.reader()?))
            }
            SoundNode::Mix { first, second } => {
                Box::new(MixReader::new(first.reader()?, second.reader()?))
            }
        };
        Ok(reader)
    }

    /// Render up to `frames` samples offline. The result is shorter only if
    /// the sound ends first.
    pub fn render(&self, frames: usize) -> Result<Vec<f32>> {
        let mut samples = vec![0.0; frames];
        let written = self.render_into(&mut samples)?;
        samples.truncate(written);
        Ok(samples)
    }

    /// Render into `out` from the start of the sound. Returns the number of
    /// samples written; the rest of `out` is left untouched.
    pub fn render_into(&self, out: &mut [f32]) -> Result<usize> {
        let mut reader = self.reader()?;
        let mut written = 0;
        while written < out.len() {
            let result = reader.read(&mut out[written..]);
            written += result.frames;
            if result.exhausted || result.frames == 0 {
                break;
            }
        }
        Ok(written)
    }
}

fn fade(
    source: &Sound,
    direction: FadeDirection,
    start: f64,
    duration: f64,
) -> Result<Box<dyn Reader>> {
    let rate = source.sample_rate() as f64;
    Ok(Box::new(FadeReader::new(
        source.reader()?,
        direction,
        start * rate,
        duration * rate,
    )))
}

fn biquad(source: &Sound, kind: BiquadKind, frequency: f64, q: f64) -> Result<Box<dyn Reader>> {
    let (b, a) = biquad_coefficients(kind, frequency, q, source.sample_rate());
    Ok(Box::new(IirFilterReader::new(source.reader()?, &b, &a)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_samples() {
        let samples = Sound::sine(250.0, 1000).unwrap().render(5).unwrap();
        let expected = [0.0, 1.0, 0.0, -1.0, 0.0];
        for (s, e) in samples.iter().zip(expected) {
            assert!((s - e).abs() < 1e-6, "{} != {}", s, e);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Sound::sine(440.0, 0).is_err());
        assert!(Sound::sine(-1.0, 44100).is_err());
        assert!(Sound::sine(f64::NAN, 44100).is_err());

        let sine = Sound::sine(440.0, 44100).unwrap();
        assert!(sine.threshold(f32::NAN).is_err());
        assert!(sine.volume(f32::INFINITY).is_err());
        assert!(sine.fadein(-0.1, 1.0).is_err());
        assert!(sine.fadeout(0.0, -1.0).is_err());
        assert!(sine.limit(-1.0, 1.0).is_err());
        assert!(sine.delay(-0.5).is_err());
        assert!(sine.resample(0).is_err());
    }

    #[test]
    fn test_operators_do_not_modify_receiver() {
        let sine = Sound::sine(440.0, 44100).unwrap();
        let short = sine.limit(0.0, 0.5).unwrap();
        let quiet = sine.volume(0.5).unwrap();
        assert_eq!(sine.length(), None);
        assert_eq!(short.length(), Some(22050));
        assert_eq!(quiet.length(), None);
        assert!(matches!(short.node(), SoundNode::Limit { .. }));
        assert!(matches!(sine.node(), SoundNode::Sine { .. }));
    }

    #[test]
    fn test_limit_end_before_start_is_empty() {
        let sound = Sound::sine(440.0, 1000).unwrap().limit(0.5, 0.2).unwrap();
        assert_eq!(sound.length(), Some(0));
        assert!(sound.render(16).unwrap().is_empty());
    }

    #[test]
    fn test_limit_of_finite_source() {
        let inner = Sound::sine(100.0, 1000).unwrap().limit(0.0, 0.010).unwrap();
        let outer = inner.limit(0.004, 1.0).unwrap();
        assert_eq!(outer.length(), Some(6));
        assert_eq!(outer.render(100).unwrap().len(), 6);
    }

    #[test]
    fn test_join_requires_matching_rates() {
        let a = Sound::sine(440.0, 44100).unwrap();
        let b = Sound::sine(440.0, 48000).unwrap();
        assert!(matches!(
            a.join(&b),
            Err(SonicWeaveError::InvalidParameter(_))
        ));
        assert!(a.mix(&b).is_err());
        assert!(a.join(&b.resample(44100).unwrap()).is_ok());
    }

    #[test]
    fn test_join_length_infinite_first() {
        let a = Sound::sine(440.0, 1000).unwrap();
        let b = a.limit(0.0, 1.0).unwrap();
        assert_eq!(a.join(&b).unwrap().length(), None);
        assert_eq!(b.join(&a).unwrap().length(), None);
        assert_eq!(b.join(&b).unwrap().duration(), Some(2.0));
    }

    #[test]
    fn test_mix_length() {
        let a = Sound::sine(440.0, 1000).unwrap().limit(0.0, 0.3).unwrap();
        let b = Sound::sine(220.0, 1000).unwrap().limit(0.0, 0.7).unwrap();
        assert_eq!(a.mix(&b).unwrap().length(), Some(700));
        let endless = Sound::silence(1000).unwrap();
        assert_eq!(a.mix(&endless).unwrap().length(), None);
    }

    #[test]
    fn test_delay_and_loop() {
        let tone = Sound::sawtooth(10.0, 1000).unwrap().limit(0.0, 0.01).unwrap();
        let delayed = tone.delay(0.005).unwrap();
        assert_eq!(delayed.length(), Some(15));
        let samples = delayed.render(100).unwrap();
        assert!(samples[..5].iter().all(|&s| s == 0.0));
        assert_eq!(&samples[5..], &tone.render(10).unwrap()[..]);

        let thrice = tone.looped(LoopMode::Count(3));
        assert_eq!(thrice.length(), Some(30));
        let looped = thrice.render(100).unwrap();
        assert_eq!(looped.len(), 30);
        assert_eq!(&looped[20..], &looped[..10]);

        assert_eq!(tone.looped(LoopMode::Infinite).length(), None);
        assert_eq!(tone.looped(LoopMode::Count(0)).length(), Some(0));
    }

    #[test]
    fn test_resample_length_and_rate() {
        let tone = Sound::sine(440.0, 44100).unwrap().limit(0.0, 0.01).unwrap();
        let converted = tone.resample(48000).unwrap();
        assert_eq!(converted.sample_rate(), 48000);
        assert_eq!(converted.length(), Some(480));
        assert_eq!(converted.render(1000).unwrap().len(), 480);

        let same = tone.resample(44100).unwrap();
        assert!(matches!(same.node(), SoundNode::Limit { .. }));
    }

    #[test]
    fn test_square_wave_is_bipolar() {
        let samples = Sound::square_wave(440.0, 44100)
            .unwrap()
            .render(1000)
            .unwrap();
        assert!(samples.iter().all(|&s| s == 1.0 || s == -1.0));
        assert_eq!(samples[0], 1.0);
    }

    #[test]
    fn test_render_into_reports_written() {
        let sound = Sound::silence(1000).unwrap().limit(0.0, 0.004).unwrap();
        let mut out = [7.0; 6];
        assert_eq!(sound.render_into(&mut out).unwrap(), 4);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 7.0, 7.0]);
    }

    #[test]
    fn test_reverse_and_pingpong() {
        let ramp = Sound::sawtooth(1.0, 1000).unwrap().limit(0.0, 0.1).unwrap();
        let forward = ramp.render(1000).unwrap();

        let backward = ramp.reverse().unwrap().render(1000).unwrap();
        let mut expected = forward.clone();
        expected.reverse();
        assert_eq!(backward, expected);

        let pingpong = ramp.pingpong().unwrap();
        assert_eq!(pingpong.length(), Some(200));
        let samples = pingpong.render(1000).unwrap();
        assert_eq!(&samples[..100], &forward[..]);
        assert_eq!(&samples[100..], &expected[..]);

        let endless = Sound::sine(440.0, 1000).unwrap();
        assert!(matches!(
            endless.reverse(),
            Err(SonicWeaveError::InvalidParameter(_))
        ));
        assert!(endless.pingpong().is_err());
    }

    #[test]
    fn test_buffer_matches_source() {
        let tone = Sound::triangle(30.0, 1000).unwrap().limit(0.0, 0.25).unwrap();
        let buffered = tone.buffer().unwrap();
        assert_eq!(buffered.length(), Some(250));
        assert_eq!(buffered.sample_rate(), 1000);
        assert_eq!(buffered.render(1000).unwrap(), tone.render(1000).unwrap());

        match buffered.node() {
            SoundNode::Buffer { samples, .. } => assert_eq!(samples.samples().len(), 250),
            other => panic!("unexpected node {:?}", other),
        }
        assert!(Sound::silence(1000).unwrap().buffer().is_err());
    }

    #[test]
    fn test_lowpass_and_highpass_keep_length() {
        let tone = Sound::sine(100.0, 8000).unwrap().limit(0.0, 0.5).unwrap();
        let low = tone.lowpass(1000.0, 0.707).unwrap();
        let high = tone.highpass(1000.0, 0.707).unwrap();
        assert_eq!(low.length(), Some(4000));
        assert_eq!(high.render(10_000).unwrap().len(), 4000);

        let low_peak = low.render(4000).unwrap()[2000..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        let high_peak = high.render(4000).unwrap()[2000..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(low_peak > 0.95, "low peak {}", low_peak);
        assert!(high_peak < 0.05, "high peak {}", high_peak);
    }

    #[test]
    fn test_filter_operator() {
        let steps = Sound::silence(1000)
            .unwrap()
            .threshold(0.0)
            .unwrap()
            .limit(0.0, 0.004)
            .unwrap();
        let averaged = steps.filter(&[0.5, 0.5], &[1.0]).unwrap();
        assert_eq!(averaged.render(10).unwrap(), vec![0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_pitch_scales_length_and_keeps_rate() {
        let tone = Sound::sine(10.0, 1000).unwrap().limit(0.0, 1.0).unwrap();
        let up = tone.pitch(2.0).unwrap();
        assert_eq!(up.sample_rate(), 1000);
        assert_eq!(up.length(), Some(500));
        assert_eq!(up.render(2000).unwrap().len(), 500);
        assert_eq!(tone.pitch(0.5).unwrap().length(), Some(2000));
        assert_eq!(Sound::sine(10.0, 1000).unwrap().pitch(3.0).unwrap().length(), None);
    }

    #[test]
    fn test_new_operator_parameters() {
        let sine = Sound::sine(440.0, 44100).unwrap();
        assert!(sine.pitch(0.0).is_err());
        assert!(sine.pitch(f64::NAN).is_err());
        assert!(sine.lowpass(0.0, 0.7).is_err());
        assert!(sine.lowpass(22050.0, 0.7).is_err());
        assert!(sine.highpass(1000.0, 0.0).is_err());
        assert!(sine.highpass(f64::INFINITY, 0.7).is_err());
        assert!(sine.filter(&[], &[1.0]).is_err());
        assert!(sine.filter(&[1.0], &[]).is_err());
        assert!(sine.filter(&[1.0], &[0.0, 1.0]).is_err());
        assert!(sine.filter(&[f32::NAN], &[1.0]).is_err());
        assert!(sine.lowpass(1000.0, 0.7).is_ok());
    }

    #[test]
    fn test_sound_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sound>();
    }
}
