use std::f64::consts::TAU;

use super::{ReadResult, Reader};

/// Direct form I IIR filter:
/// `a[0]·y[n] = Σ b[k]·x[n-k] − Σ_{k≥1} a[k]·y[n-k]`.
///
/// Coefficients are normalised by `a[0]` and the history buffers are sized
/// once at construction. Seeking clears the history.
pub struct IirFilterReader {
    source: Box<dyn Reader>,
    b: Vec<f32>,
    a: Vec<f32>,
    x: Vec<f32>,
    y: Vec<f32>,
    /// Ring index of the newest entry in `x` and `y`
    head: usize,
}

impl IirFilterReader {
    /// `a[0]` must be non-zero; both slices must be non-empty.
    pub fn new(source: Box<dyn Reader>, b: &[f32], a: &[f32]) -> Self {
        let a0 = a.first().copied().unwrap_or(1.0);
        let b: Vec<f32> = b.iter().map(|c| c / a0).collect();
        let a: Vec<f32> = a.iter().map(|c| c / a0).collect();
        let order = b.len().max(a.len()).max(1);
        Self {
            source,
            b,
            a,
            x: vec![0.0; order],
            y: vec![0.0; order],
            head: 0,
        }
    }

    /// Reads history `k` samples back (0 = newest).
    #[inline]
    fn back(&self, k: usize) -> usize {
        let len = self.x.len();
        (self.head + len - k) % len
    }

    fn reset(&mut self) {
        self.x.fill(0.0);
        self.y.fill(0.0);
        self.head = 0;
    }
}

impl Reader for IirFilterReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let result = self.source.read(out);
        let len = self.x.len();

        for sample in &mut out[..result.frames] {
            self.head = (self.head + 1) % len;
            self.x[self.head] = *sample;

            let mut acc = 0.0f32;
            for (k, b) in self.b.iter().enumerate() {
                acc += b * self.x[self.back(k)];
            }
            for (k, a) in self.a.iter().enumerate().skip(1) {
                acc -= a * self.y[self.back(k)];
            }

            self.y[self.head] = acc;
            *sample = acc;
        }
        result
    }

    fn position(&self) -> u64 {
        self.source.position()
    }

    fn seek(&mut self, position: u64) {
        self.reset();
        self.source.seek(position);
    }

    fn length(&self) -> Option<u64> {
        self.source.length()
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
}

/// Second-order lowpass/highpass coefficients `(b, a)` from the RBJ audio EQ
/// cookbook. `frequency` must be below Nyquist.
pub fn biquad_coefficients(
    kind: BiquadKind,
    frequency: f64,
    q: f64,
    sample_rate: u32,
) -> ([f32; 3], [f32; 3]) {
    let w0 = TAU * frequency / sample_rate as f64;
    let (sin, cos) = w0.sin_cos();
    let alpha = sin / (2.0 * q);
    let norm = 1.0 + alpha;

    let (b0, b1) = match kind {
        BiquadKind::Lowpass => ((1.0 - cos) / 2.0, 1.0 - cos),
        BiquadKind::Highpass => ((1.0 + cos) / 2.0, -(1.0 + cos)),
    };

    (
        [(b0 / norm) as f32, (b1 / norm) as f32, (b0 / norm) as f32],
        [1.0, (-2.0 * cos / norm) as f32, ((1.0 - alpha) / norm) as f32],
    )
}
