use std::sync::Arc;

use super::{ReadResult, Reader};

/// Plays back samples rendered ahead of time. Every reader over the same
/// buffer shares one allocation.
pub struct BufferReader {
    samples: Arc<[f32]>,
    sample_rate: u32,
    position: u64,
}

impl BufferReader {
    pub fn new(samples: Arc<[f32]>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            position: 0,
        }
    }
}

impl Reader for BufferReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let len = self.samples.len();
        let start = usize::try_from(self.position).unwrap_or(usize::MAX).min(len);
        let n = out.len().min(len - start);
        out[..n].copy_from_slice(&self.samples[start..start + n]);
        self.position += n as u64;

        if start + n >= len {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_shares_samples() {
        let samples: Arc<[f32]> = Arc::from(vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        let mut a = BufferReader::new(samples.clone(), 1000);
        let mut b = BufferReader::new(samples.clone(), 1000);

        let mut buf = [0.0; 3];
        assert_eq!(a.read(&mut buf), ReadResult::more(3));
        assert_eq!(buf, [0.1, 0.2, 0.3]);
        assert_eq!(a.read(&mut buf), ReadResult::end(2));
        assert_eq!(&buf[..2], &[0.4, 0.5]);

        b.seek(4);
        assert_eq!(b.read(&mut buf), ReadResult::end(1));
        assert_eq!(buf[0], 0.5);
        assert_eq!(Arc::strong_count(&samples), 3);
    }

    #[test]
    fn test_seek_past_end() {
        let mut reader = BufferReader::new(Arc::from(vec![1.0; 4]), 1000);
        reader.seek(100);
        let mut buf = [0.0; 2];
        assert_eq!(reader.read(&mut buf), ReadResult::end(0));
        assert_eq!(reader.length(), Some(4));
    }
}
