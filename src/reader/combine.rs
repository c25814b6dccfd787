use super::{MAX_BLOCK_SIZE, ReadResult, Reader, add_lengths};

/// Plays the first reader to exhaustion, then the second.
///
/// Both readers are built before playback starts. Once the first segment is
/// exhausted it is parked rather than dropped, so neither the switch nor a
/// later seek back into it allocates or frees memory on the mixing thread.
pub struct JoinReader {
    first: Box<dyn Reader>,
    first_length: Option<u64>,
    second: Box<dyn Reader>,
    in_second: bool,
    position: u64,
}

impl JoinReader {
    pub fn new(first: Box<dyn Reader>, second: Box<dyn Reader>) -> Self {
        let first_length = first.length();
        Self {
            first,
            first_length,
            second,
            in_second: false,
            position: 0,
        }
    }

    fn enter_second(&mut self, offset: u64) {
        if !self.in_second {
            log::trace!("Join switched to its second segment at sample {}", self.position);
        }
        self.in_second = true;
        if self.second.position() != offset {
            self.second.seek(offset);
        }
    }
}

impl Reader for JoinReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let mut written = 0;

        if !self.in_second {
            let result = self.first.read(out);
            written = result.frames;
            if !result.exhausted {
                self.position += written as u64;
                return ReadResult::more(written);
            }
            self.enter_second(0);
        }

        let result = self.second.read(&mut out[written..]);
        written += result.frames;
        self.position += written as u64;
        ReadResult {
            frames: written,
            exhausted: result.exhausted,
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;

        match self.first_length {
            Some(len) if position >= len => self.enter_second(position - len),
            _ => {
                self.first.seek(position);
                self.in_second = false;
            }
        }
    }

    fn length(&self) -> Option<u64> {
        add_lengths(self.first_length, self.second.length())
    }

    fn sample_rate(&self) -> u32 {
        self.second.sample_rate()
    }
}

/// Sample-wise sum of two readers. A child that runs out contributes silence
/// while the other continues. No clipping is applied here.
pub struct MixReader {
    first: Box<dyn Reader>,
    second: Box<dyn Reader>,
    first_done: bool,
    second_done: bool,
    scratch: Vec<f32>,
    position: u64,
}

impl MixReader {
    pub fn new(first: Box<dyn Reader>, second: Box<dyn Reader>) -> Self {
        Self {
            first,
            second,
            first_done: false,
            second_done: false,
            scratch: vec![0.0; MAX_BLOCK_SIZE],
            position: 0,
        }
    }
}

impl Reader for MixReader {
    fn read(&mut self, out: &mut [f32]) -> ReadResult {
        let mut written = 0;

        for chunk in out.chunks_mut(MAX_BLOCK_SIZE) {
            let n = chunk.len();

            let a_frames = if self.first_done {
                0
            } else {
                let result = self.first.read(chunk);
                self.first_done = result.exhausted;
                result.frames
            };
            chunk[a_frames..].fill(0.0);

            let b_frames = if self.second_done {
                0
            } else {
                let frames = &mut self.scratch[..n];
                let result = self.second.read(frames);
                self.second_done = result.exhausted;
                for (o, b) in chunk.iter_mut().zip(&frames[..result.frames]) {
                    *o += b;
                }
                result.frames
            };

            let frames = a_frames.max(b_frames);
            written += frames;
            if self.first_done && self.second_done {
                self.position += written as u64;
                return ReadResult::end(written);
            }
        }

        self.position += written as u64;
        ReadResult::more(written)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) {
        self.position = position;
        self.first.seek(position);
        self.second.seek(position);
        self.first_done = false;
        self.second_done = false;
    }

    fn length(&self) -> Option<u64> {
        Some(self.first.length()?.max(self.second.length()?))
    }

    fn sample_rate(&self) -> u32 {
        self.first.sample_rate()
    }
}
