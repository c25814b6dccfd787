use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use super::{ReadResult, Reader};
use crate::error::{Result, SonicWeaveError};

/// Input frames fed to the resampler per process call.
const INPUT_CHUNK: usize = 256;

/// Fixed-point scale for pitch factors, so lengths and seeks stay integral.
const PITCH_UNITS: u64 = 1_000_000;

/// Streaming sample-rate converter.
///
/// Pulls fixed chunks of `INPUT_CHUNK` frames from the source and queues the
/// variable-size output. All buffers are allocated up front; the rubato
/// `process_into_buffer` call is allocation-free. The resampler's output delay
/// is trimmed so sample 0 of the output lines up with sample 0 of the source.
///
/// The conversion ratio is `to_units / from_units`. A plain rate conversion
/// uses the two sample rates; a pitch shift uses the pitch factor and keeps
/// the source's declared rate.
pub struct ResampleReader {
    source: Box<dyn Reader>,
    resampler: FastFixedIn<f32>,
    from_units: u64,
    to_units: u64,
    output_rate: u32,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    pending_start: usize,
    pending_end: usize,
    delay_left: usize,
    source_done: bool,
    position: u64,
    length: Option<u64>,
}

impl ResampleReader {
    /// Wrap `source` so it is delivered at `target_rate`.
    pub fn new(source: Box<dyn Reader>, target_rate: u32) -> Result<Self> {
        let source_rate = source.sample_rate();
        if source_rate == 0 || target_rate == 0 {
            return Err(SonicWeaveError::InvalidParameter(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        log::debug!(
            "Creating resampler: {} Hz -> {} Hz (fixed input: {} frames)",
            source_rate,
            target_rate,
            INPUT_CHUNK
        );
        Self::with_ratio(source, source_rate as u64, target_rate as u64, target_rate)
    }

    /// Play `source` `factor` times faster (and higher), keeping its sample rate.
    pub fn pitched(source: Box<dyn Reader>, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SonicWeaveError::InvalidParameter(format!(
                "Pitch factor must be positive (got {})",
                factor
            )));
        }

        let from_units = ((factor * PITCH_UNITS as f64).round() as u64).max(1);
        let output_rate = source.sample_rate();
        log::debug!("Creating pitch shifter: factor {}", factor);
        Self::with_ratio(source, from_units, PITCH_UNITS, output_rate)
    }

    fn with_ratio(
        source: Box<dyn Reader>,
        from_units: u64,
        to_units: u64,
        output_rate: u32,
    ) -> Result<Self> {
        // target/source (output/input)
        let ratio = to_units as f64 / from_units as f64;
        let resampler = FastFixedIn::new(ratio, 1.0, PolynomialDegree::Septic, INPUT_CHUNK, 1)
            .map_err(|e| SonicWeaveError::Resample(format!("Failed to create resampler: {}", e)))?;

        let output_max = resampler.output_frames_max();
        let delay = resampler.output_delay();
        let length = source
            .length()
            .map(|len| scaled_length(len, from_units, to_units));

        Ok(Self {
            source,
            resampler,
            from_units,
            to_units,
            output_rate,
            input: vec![vec![0.0; INPUT_CHUNK]; 1],
            output: vec![vec![0.0; output_max]; 1],
            pending_start: 0,
            pending_end: 0,
            delay_left: delay,
            source_done: false,
            position: 0,
            length,
        })
    }

    /// Pull one input chunk and run it through the resampler.
    fn refill(&mut self) {
        let frames = if self.source_done {
            0
        } else {
            let result = self.source.read(&mut self.input[0]);
            self.source_done = result.exhausted;
            result.frames
        };
        self.input[0][frames..].fill(0.0);

        match self
            .resampler
            .process_into_buffer(&self.input, &mut self.output, None)
        {
            Ok((_, produced)) => {
                let skipped = self.delay_left.min(produced);
                self.delay_left -= skipped;
                self.pending_start = skipped;
                self.pending_end = produced;
            }
            Err(e) => {
                log::error!("Streaming resampling error: {}", e);
                self.pending_start = 0;
                self.pending_end = 0;
                self.source_done = true;
                self.length = Some(self.position);
            }
        }
    }

    pub fn source_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

impl Reader for ResampleReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let mut written = 0;

        while written < out.len() {
            let remaining = match self.length {
                Some(len) if self.position >= len => return ReadResult::end(written),
                Some(len) => len - self.position,
                None => u64::MAX,
            };

            if self.pending_start < self.pending_end {
                let n = (out.len() - written)
                    .min(self.pending_end - self.pending_start)
                    .min(remaining.min(usize::MAX as u64) as usize);
                out[written..written + n]
                    .copy_from_slice(&self.output[0][self.pending_start..self.pending_start + n]);
                written += n;
                self.pending_start += n;
                self.position += n as u64;
                continue;
            }

            if self.source_done && self.length.is_none() {
                return ReadResult::end(written);
            }
            self.refill();
        }

        match self.length {
            Some(len) if self.position >= len => ReadResult::end(written),
            _ => ReadResult::more(written),
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        let source_position = scaled_position(position, self.to_units, self.from_units);
        self.source.seek(source_position);
        self.resampler.reset();
        self.delay_left = self.resampler.output_delay();
        self.pending_start = 0;
        self.pending_end = 0;
        self.source_done = false;
        self.position = position;
    }

    fn length(&self) -> Option<u64> {
        self.length
    }

    fn sample_rate(&self) -> u32 {
        self.output_rate
    }
}

/// `ceil(len * to / from)`, saturating at `u64::MAX`.
pub(crate) fn scaled_length(len: u64, from: u64, to: u64) -> u64 {
    let num = len as u128 * to as u128;
    u64::try_from(num.div_ceil(from as u128)).unwrap_or(u64::MAX)
}

/// `floor(position * to / from)`, saturating at `u64::MAX`.
fn scaled_position(position: u64, from: u64, to: u64) -> u64 {
    u64::try_from(position as u128 * to as u128 / from as u128).unwrap_or(u64::MAX)
}

/// Output length of a pitch shift by `factor` over `len` source samples.
pub(crate) fn pitched_length(len: u64, factor: f64) -> u64 {
    let from_units = ((factor * PITCH_UNITS as f64).round() as u64).max(1);
    scaled_length(len, from_units, PITCH_UNITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::generator::{GeneratorReader, Waveform};
    use crate::reader::test_util::{VecReader, drain};

    #[test]
    fn test_scaled_length() {
        assert_eq!(scaled_length(441, 44100, 48000), 480);
        assert_eq!(scaled_length(1000, 48000, 44100), 919);
        assert_eq!(scaled_length(0, 48000, 44100), 0);
    }

    #[test]
    fn test_scaled_length_saturates() {
        assert_eq!(scaled_length(u64::MAX / 2, 44100, 48000), u64::MAX);
        assert_eq!(scaled_length(u64::MAX, 1, 1), u64::MAX);
        assert_eq!(pitched_length(100, 2.0), 50);
        assert_eq!(pitched_length(100, 0.5), 200);
    }

    #[test]
    fn test_pitch_keeps_rate_and_scales_length() {
        let source = VecReader::boxed(vec![0.5; 1000]);
        let mut reader = ResampleReader::pitched(source, 2.0).unwrap();
        assert_eq!(reader.sample_rate(), 1000);
        assert_eq!(reader.length(), Some(500));

        let out = drain(&mut reader, 128);
        assert_eq!(out.len(), 500);
        for &s in &out[50..450] {
            assert!((s - 0.5).abs() < 1e-3, "sample {}", s);
        }
    }

    #[test]
    fn test_pitch_raises_frequency() {
        // 10 Hz at 1000 Hz, played twice as fast, lines up with 20 Hz.
        let source = Box::new(GeneratorReader::new(Waveform::Sine, 10.0, 1000));
        let mut reader = ResampleReader::pitched(source, 2.0).unwrap();
        let mut buf = vec![0.0; 1024];
        reader.read(&mut buf);
        for n in 300..400 {
            let expected = (std::f64::consts::TAU * 20.0 * n as f64 / 1000.0).sin() as f32;
            assert!((buf[n] - expected).abs() < 0.05, "sample {}", n);
        }
    }

    #[test]
    fn test_pitch_rejects_bad_factor() {
        assert!(ResampleReader::pitched(VecReader::boxed(vec![0.0; 4]), 0.0).is_err());
        assert!(ResampleReader::pitched(VecReader::boxed(vec![0.0; 4]), f64::NAN).is_err());
    }

    #[test]
    fn test_finite_source_has_expected_length() {
        // VecReader runs at 1000 Hz
        let source = VecReader::boxed(vec![0.5; 1000]);
        let mut reader = ResampleReader::new(source, 2000).unwrap();
        assert_eq!(reader.length(), Some(2000));
        assert_eq!(reader.sample_rate(), 2000);

        let out = drain(&mut reader, 300);
        assert_eq!(out.len(), 2000);
        // Away from the edges a constant signal stays constant.
        for &s in &out[100..1900] {
            assert!((s - 0.5).abs() < 1e-3, "sample {}", s);
        }
    }

    #[test]
    fn test_infinite_source_keeps_streaming() {
        let source = Box::new(GeneratorReader::new(Waveform::Sine, 440.0, 44100));
        let mut reader = ResampleReader::new(source, 48000).unwrap();
        assert_eq!(reader.length(), None);

        let mut buf = vec![0.0; 4096];
        for _ in 0..4 {
            let result = reader.read(&mut buf);
            assert_eq!(result, ReadResult::more(4096));
            assert!(buf.iter().all(|s| s.is_finite() && s.abs() <= 1.1));
        }
        assert_eq!(reader.position(), 4 * 4096);
    }

    #[test]
    fn test_output_is_time_aligned() {
        let source = Box::new(GeneratorReader::new(Waveform::Sine, 100.0, 24000));
        let mut reader = ResampleReader::new(source, 48000).unwrap();
        let mut buf = vec![0.0; 2048];
        reader.read(&mut buf);

        // After the edge transient, output sample n is the sine at n / 48000 s.
        for n in 1000..1100 {
            let expected = (std::f64::consts::TAU * 100.0 * n as f64 / 48000.0).sin() as f32;
            assert!((buf[n] - expected).abs() < 0.05, "sample {}", n);
        }
    }

    #[test]
    fn test_seek_past_end_exhausts() {
        let source = VecReader::boxed(vec![0.1; 100]);
        let mut reader = ResampleReader::new(source, 3000).unwrap();
        reader.seek(10_000);
        let mut buf = [0.0; 16];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }
}
