use std::f64::consts::TAU;

use super::{ReadResult, Reader};

/// Periodic waveform produced by a [`GeneratorReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Triangle,
    Silence,
}

impl Waveform {
    /// Sample value at `phase` cycles, where only the fractional part matters.
    #[inline]
    fn sample_at(self, phase: f64) -> f32 {
        let frac = phase.fract();
        match self {
            Self::Sine => (TAU * frac).sin() as f32,
            Self::Sawtooth => (2.0 * frac - 1.0) as f32,
            // Starts at 0 and rises, in phase with the sine.
            Self::Triangle => (1.0 - 4.0 * ((frac + 0.25).fract() - 0.5).abs()) as f32,
            Self::Silence => 0.0,
        }
    }
}

/// Infinite generator. Sample `n` is computed directly from `n`, so seeking
/// is exact and there is no accumulated phase drift.
pub struct GeneratorReader {
    waveform: Waveform,
    frequency: f64,
    sample_rate: u32,
    position: u64,
}

impl GeneratorReader {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: u32) -> Self {
        Self {
            waveform,
            frequency,
            sample_rate,
            position: 0,
        }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
}

impl Reader for GeneratorReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        if self.waveform == Waveform::Silence {
            out.fill(0.0);
        } else {
            let step = self.frequency / self.sample_rate as f64;
            for (i, sample) in out.iter_mut().enumerate() {
                let n = self.position + i as u64;
                *sample = self.waveform.sample_at(step * n as f64);
            }
        }

        self.position += out.len() as u64;
        ReadResult::more(out.len())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn length(&self) -> Option<u64> {
        None
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
