use super::{MAX_BLOCK_SIZE, ReadResult, Reader};
use crate::playback::LoopMode;

/// Maps every sample to `+1` when it is at or above `level`, else `-1`.
pub struct ThresholdReader {
    source: Box<dyn Reader>,
    level: f32,
}

impl ThresholdReader {
    pub fn new(source: Box<dyn Reader>, level: f32) -> Self {
        Self { source, level }
    }
}

impl Reader for ThresholdReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let result = self.source.read(out);
        for sample in &mut out[..result.frames] {
            // Ties go to the positive branch.
            *sample = if *sample >= self.level { 1.0 } else { -1.0 };
        }
        result
    }

    fn position(&self) -> u64 {
        self.source.position()
    }

    fn seek(&mut self, position: u64) {
        self.source.seek(position);
    }

    fn length(&self) -> Option<u64> {
        self.source.length()
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

/// Constant gain.
pub struct VolumeReader {
    source: Box<dyn Reader>,
    gain: f32,
}

impl VolumeReader {
    pub fn new(source: Box<dyn Reader>, gain: f32) -> Self {
        Self { source, gain }
    }
}

impl Reader for VolumeReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let result = self.source.read(out);
        for sample in &mut out[..result.frames] {
            *sample *= self.gain;
        }
        result
    }

    fn position(&self) -> u64 {
        self.source.position()
    }

    fn seek(&mut self, position: u64) {
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
pub enum FadeDirection {
    In,
    Out,
}

/// Linear fade. `start` and `length` are in (fractional) samples so the ramp
/// is not quantised to whole samples.
///
/// Fade in: silence before `start`, ramp 0→1 across `length`, then unity.
/// Fade out: unity before `start`, ramp 1→0 across `length`, then silence.
pub struct FadeReader {
    source: Box<dyn Reader>,
    direction: FadeDirection,
    start: f64,
    length: f64,
}

impl FadeReader {
    pub fn new(source: Box<dyn Reader>, direction: FadeDirection, start: f64, length: f64) -> Self {
        Self {
            source,
            direction,
            start,
            length,
        }
    }

    #[inline]
    fn gain_at(&self, n: f64) -> f32 {
        let ramp = if n < self.start {
            0.0
        } else if n < self.start + self.length {
            (n - self.start) / self.length
        } else {
            1.0
        };

        match self.direction {
            FadeDirection::In => ramp as f32,
            FadeDirection::Out => (1.0 - ramp) as f32,
        }
    }
}

impl Reader for FadeReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let first = self.source.position();
        let result = self.source.read(out);
        for (i, sample) in out[..result.frames].iter_mut().enumerate() {
            *sample *= self.gain_at((first + i as u64) as f64);
        }
        result
    }

    fn position(&self) -> u64 {
        self.source.position()
    }

    fn seek(&mut self, position: u64) {
        self.source.seek(position);
    }

    fn length(&self) -> Option<u64> {
        self.source.length()
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

/// Time window `[start, end)` over the source's own timeline.
///
/// Offset `k` of this reader is sample `start + k` of the source. The source
/// is seeked to `start` on construction, so nothing before the window is
/// rendered.
pub struct LimitReader {
    source: Box<dyn Reader>,
    start: u64,
    window: u64,
    position: u64,
}

impl LimitReader {
    pub fn new(mut source: Box<dyn Reader>, start: u64, end: u64) -> Self {
        let window = end.saturating_sub(start);
        if window > 0 {
            source.seek(start);
        }
        Self {
            source,
            start,
            window,
            position: 0,
        }
    }
}

impl Reader for LimitReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let remaining = self.window.saturating_sub(self.position);
        if remaining == 0 {
            return ReadResult::end(0);
        }

        let n = (out.len() as u64).min(remaining) as usize;
        let result = self.source.read(&mut out[..n]);
        self.position += result.frames as u64;

        if result.exhausted || self.position >= self.window {
            ReadResult::end(result.frames)
        } else {
            ReadResult::more(result.frames)
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
        if position < self.window {
            self.source.seek(self.start + position);
        }
    }

    fn length(&self) -> Option<u64> {
        match self.source.length() {
            Some(len) => Some(len.saturating_sub(self.start).min(self.window)),
            None => Some(self.window),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

/// Leading silence of `delay` samples before the source starts.
pub struct DelayReader {
    source: Box<dyn Reader>,
    delay: u64,
    position: u64,
}

impl DelayReader {
    pub fn new(source: Box<dyn Reader>, delay: u64) -> Self {
        Self {
            source,
            delay,
            position: 0,
        }
    }
}

impl Reader for DelayReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let silent = self.delay.saturating_sub(self.position).min(out.len() as u64) as usize;
        out[..silent].fill(0.0);
        self.position += silent as u64;

        if silent == out.len() {
            return ReadResult::more(silent);
        }

        let result = self.source.read(&mut out[silent..]);
        self.position += result.frames as u64;
        ReadResult {
            frames: silent + result.frames,
            exhausted: result.exhausted,
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
        self.source.seek(position.saturating_sub(self.delay));
    }

    fn length(&self) -> Option<u64> {
        self.source.length().map(|len| len.saturating_add(self.delay))
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

/// Replays the source back-to-back according to its [`LoopMode`].
pub struct LoopReader {
    source: Box<dyn Reader>,
    mode: LoopMode,
    passes_done: u32,
    position: u64,
}

impl LoopReader {
    pub fn new(source: Box<dyn Reader>, mode: LoopMode) -> Self {
        Self {
            source,
            mode,
            passes_done: 0,
            position: 0,
        }
    }

    fn more_passes(&self) -> bool {
        match self.mode {
            LoopMode::Count(n) => self.passes_done < n,
            LoopMode::Infinite => true,
        }
    }
}

impl Reader for LoopReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let mut written = 0;
        while written < out.len() {
            if !self.more_passes() {
                self.position += written as u64;
                return ReadResult::end(written);
            }

            let result = self.source.read(&mut out[written..]);
            written += result.frames;

            if result.exhausted {
                self.passes_done = self.passes_done.saturating_add(1);
                // A zero-length pass would spin forever.
                if self.source.position() == 0 && result.frames == 0 {
                    self.passes_done = u32::MAX;
                    self.mode = LoopMode::Count(0);
                    continue;
                }
                if self.more_passes() {
                    self.source.seek(0);
                }
            }
        }

        self.position += written as u64;
        if self.more_passes() {
            ReadResult::more(written)
        } else {
            ReadResult::end(written)
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
        match self.source.length() {
            Some(0) => {
                self.passes_done = 0;
                self.source.seek(0);
            }
            Some(len) => {
                let pass = position / len;
                self.passes_done = u32::try_from(pass).unwrap_or(u32::MAX);
                self.source.seek(position % len);
            }
            None => {
                self.passes_done = 0;
                self.source.seek(position);
            }
        }
    }

    fn length(&self) -> Option<u64> {
        match (self.mode, self.source.length()) {
            (LoopMode::Count(0), _) | (_, Some(0)) => Some(0),
            (LoopMode::Count(n), Some(len)) => Some(len.saturating_mul(n as u64)),
            _ => None,
        }
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

/// Plays a finite source backwards.
///
/// Each block seeks the source to the start of the matching window and reads
/// that window forwards into a scratch buffer sized at construction.
pub struct ReverseReader {
    source: Box<dyn Reader>,
    length: u64,
    position: u64,
    scratch: Vec<f32>,
}

impl ReverseReader {
    /// An infinite source reverses to an empty reader.
    pub fn new(source: Box<dyn Reader>) -> Self {
        let length = source.length().unwrap_or(0);
        Self {
            source,
            length,
            position: 0,
            scratch: vec![0.0; MAX_BLOCK_SIZE],
        }
    }
}

impl Reader for ReverseReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let mut written = 0;

        for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
            let remaining = self.length.saturating_sub(self.position);
            let n = (chunk.len() as u64).min(remaining) as usize;
            if n == 0 {
                break;
            }

            self.source.seek(self.length - self.position - n as u64);
            let window = &mut self.scratch[..n];
            let mut frames = 0;
            while frames < n {
                let result = self.source.read(&mut window[frames..]);
                frames += result.frames;
                if result.exhausted || result.frames == 0 {
                    break;
                }
            }
            window[frames..].fill(0.0);
            for (out, &sample) in chunk.iter_mut().zip(window.iter().rev()) {
                *out = sample;
            }

            self.position += n as u64;
            written += n;
            if n < chunk.len() {
                break;
            }
        }

        if self.position >= self.length {
            ReadResult::end(written)
        } else {
            ReadResult::more(written)
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::test_util::{VecReader, drain};

    #[test]
    fn test_threshold_ties_go_positive() {
        let mut reader = ThresholdReader::new(VecReader::boxed(vec![-0.5, 0.0, 0.2, 0.5]), 0.2);
        assert_eq!(drain(&mut reader, 8), vec![-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_volume_zero_keeps_length() {
        let mut reader = VolumeReader::new(VecReader::boxed(vec![0.3; 10]), 0.0);
        let out = drain(&mut reader, 3);
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fade_in_ramp() {
        let mut reader = FadeReader::new(VecReader::boxed(vec![1.0; 8]), FadeDirection::In, 2.0, 4.0);
        assert_eq!(
            drain(&mut reader, 3),
            vec![0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0, 1.0]
        );
    }

    #[test]
    fn test_fade_out_ramp() {
        let mut reader =
            FadeReader::new(VecReader::boxed(vec![1.0; 8]), FadeDirection::Out, 2.0, 4.0);
        assert_eq!(
            drain(&mut reader, 5),
            vec![1.0, 1.0, 1.0, 0.75, 0.5, 0.25, 0.0, 0.0]
        );
    }

    #[test]
    fn test_zero_length_fade_is_a_step() {
        let mut reader = FadeReader::new(VecReader::boxed(vec![1.0; 4]), FadeDirection::In, 2.0, 0.0);
        assert_eq!(drain(&mut reader, 4), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_limit_window() {
        let source: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut reader = LimitReader::new(VecReader::boxed(source), 3, 7);
        assert_eq!(reader.length(), Some(4));
        assert_eq!(drain(&mut reader, 3), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_limit_end_before_start_is_empty() {
        let mut reader = LimitReader::new(VecReader::boxed(vec![1.0; 10]), 5, 2);
        assert_eq!(reader.length(), Some(0));
        let mut buf = [0.0; 4];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }

    #[test]
    fn test_limit_past_source_end() {
        let mut reader = LimitReader::new(VecReader::boxed(vec![1.0; 5]), 2, 100);
        assert_eq!(reader.length(), Some(3));
        assert_eq!(drain(&mut reader, 64).len(), 3);
    }

    #[test]
    fn test_limit_seek() {
        let source: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let mut reader = LimitReader::new(VecReader::boxed(source), 2, 8);
        reader.seek(4);
        assert_eq!(drain(&mut reader, 8), vec![6.0, 7.0]);

        reader.seek(50);
        let mut buf = [0.0; 2];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }

    #[test]
    fn test_delay_prepends_silence() {
        let mut reader = DelayReader::new(VecReader::boxed(vec![1.0, 2.0]), 3);
        assert_eq!(reader.length(), Some(5));
        assert_eq!(drain(&mut reader, 2), vec![0.0, 0.0, 0.0, 1.0, 2.0]);

        reader.seek(4);
        assert_eq!(drain(&mut reader, 2), vec![2.0]);
    }

    #[test]
    fn test_loop_count() {
        let mut reader = LoopReader::new(VecReader::boxed(vec![1.0, 2.0, 3.0]), LoopMode::Count(3));
        assert_eq!(reader.length(), Some(9));
        assert_eq!(
            drain(&mut reader, 4),
            vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_loop_zero_count_is_empty() {
        let mut reader = LoopReader::new(VecReader::boxed(vec![1.0]), LoopMode::Count(0));
        let mut buf = [0.0; 4];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }

    #[test]
    fn test_infinite_loop_over_empty_source_ends() {
        let mut reader = LoopReader::new(VecReader::boxed(Vec::new()), LoopMode::Infinite);
        assert_eq!(reader.length(), Some(0));
        let mut buf = [0.0; 4];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }

    #[test]
    fn test_infinite_loop_keeps_going() {
        let mut reader = LoopReader::new(VecReader::boxed(vec![1.0, -1.0]), LoopMode::Infinite);
        let mut buf = [0.0; 7];
        assert_eq!(reader.read(&mut buf), ReadResult::more(7));
        assert_eq!(buf, [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0]);
        assert_eq!(reader.length(), None);
    }

    #[test]
    fn test_loop_seek_beyond_last_pass_exhausts() {
        let mut reader = LoopReader::new(VecReader::boxed(vec![1.0, 2.0, 3.0]), LoopMode::Count(2));
        reader.seek(6);
        let mut buf = [0.0; 4];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));

        reader.seek(40);
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));

        reader.seek(5);
        assert_eq!(drain(&mut reader, 4), vec![3.0]);
    }

    #[test]
    fn test_reverse() {
        let source: Vec<f32> = (0..5).map(|i| i as f32).collect();
        let mut reader = ReverseReader::new(VecReader::boxed(source));
        assert_eq!(reader.length(), Some(5));
        assert_eq!(drain(&mut reader, 2), vec![4.0, 3.0, 2.0, 1.0, 0.0]);

        reader.seek(3);
        assert_eq!(drain(&mut reader, 2), vec![1.0, 0.0]);

        reader.seek(9);
        let mut buf = [0.0; 2];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
    }

    #[test]
    fn test_reverse_longer_than_block() {
        let len = MAX_BLOCK_SIZE * 2 + 5;
        let source: Vec<f32> = (0..len).map(|i| i as f32).collect();
        let mut reader = ReverseReader::new(VecReader::boxed(source));
        let mut buf = vec![0.0; len + 10];
        assert_eq!(reader.read(&mut buf), ReadResult::end(len));
        for (i, &s) in buf[..len].iter().enumerate() {
            assert_eq!(s, (len - 1 - i) as f32);
        }
    }

    #[test]
    fn test_loop_seek_lands_in_later_pass() {
        let mut reader = LoopReader::new(VecReader::boxed(vec![1.0, 2.0, 3.0]), LoopMode::Count(2));
        reader.seek(4);
        assert_eq!(drain(&mut reader, 8), vec![2.0, 3.0]);
    }
}
