//! Multi-channel circular delay line with fractional read taps.

/// Circular buffer holding the most recent input of each channel
///
/// Per frame: `write` every channel, `read` any number of taps, then
/// `advance` once. A tap of delay 0 returns the sample written this frame.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffers: Vec<Vec<f32>>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a line able to delay by up to `max_delay_samples`
    pub fn new(channels: usize, max_delay_samples: usize) -> Self {
        // Two extra slots: the current frame and the interpolation neighbour
        let size = max_delay_samples + 2;
        Self {
            buffers: vec![vec![0.0; size]; channels],
            write_pos: 0,
        }
    }

    /// Longest delay (in samples) that can be read without wrapping
    pub fn max_delay(&self) -> usize {
        self.len().saturating_sub(2)
    }

    fn len(&self) -> usize {
        self.buffers.first().map(|b| b.len()).unwrap_or(0)
    }

    #[inline]
    pub fn write(&mut self, channel: usize, sample: f32) {
        let pos = self.write_pos;
        if let Some(buffer) = self.buffers.get_mut(channel) {
            buffer[pos] = sample;
        }
    }

    #[inline]
    fn at(&self, channel: usize, delay: usize) -> f32 {
        let len = self.len();
        self.buffers[channel][(self.write_pos + len - delay) % len]
    }

    /// Read an integer delay
    #[inline]
    pub fn read(&self, channel: usize, delay_samples: usize) -> f32 {
        if channel >= self.buffers.len() {
            return 0.0;
        }
        self.at(channel, delay_samples.min(self.max_delay()))
    }

    /// Read a fractional delay with linear interpolation
    #[inline]
    pub fn read_fractional(&self, channel: usize, delay_samples: f64) -> f32 {
        if channel >= self.buffers.len() {
            return 0.0;
        }
        let delay = delay_samples.clamp(0.0, self.max_delay() as f64);
        let whole = delay.floor() as usize;
        let frac = (delay - whole as f64) as f32;

        let s0 = self.at(channel, whole);
        if frac == 0.0 {
            return s0;
        }
        let s1 = self.at(channel, whole + 1);
        s0 + (s1 - s0) * frac
    }

    /// Move to the next frame
    #[inline]
    pub fn advance(&mut self) {
        let len = self.len().max(1);
        self.write_pos = (self.write_pos + 1) % len;
    }

    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }
}
