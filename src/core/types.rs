/// A single audio sample (32-bit float, range -1.0 to 1.0).
pub type Sample = f32;

/// Audio held as separate channel vectors.
///
/// Channels share a sample rate but are not required to have identical
/// lengths: independent per-channel stretching can leave them a few samples
/// apart. Channel 0 is the reference for the reported length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    /// Per-channel sample data.
    pub channels: Vec<Vec<Sample>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from per-channel vectors.
    pub fn new(channels: Vec<Vec<Sample>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Creates a single-channel buffer.
    pub fn from_mono(samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    /// Splits interleaved samples (`[L0, R0, L1, R1, ...]`) into channels.
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(data: &[Sample], num_channels: usize, sample_rate: u32) -> Self {
        if num_channels == 0 {
            return Self::new(Vec::new(), sample_rate);
        }
        let frames = data.len() / num_channels;
        let channels = (0..num_channels)
            .map(|ch| {
                data.iter()
                    .skip(ch)
                    .step_by(num_channels)
                    .take(frames)
                    .copied()
                    .collect()
            })
            .collect();
        Self::new(channels, sample_rate)
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames, taken from channel 0.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Returns true if there is no channel or channel 0 is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Averages all channels into one, over the shortest channel length.
    pub fn mono_mix(&self) -> Vec<Sample> {
        mix_to_mono(&self.channels)
    }
}

/// Averages channels sample-by-sample, truncating to the shortest channel.
pub fn mix_to_mono(channels: &[Vec<Sample>]) -> Vec<Sample> {
    match channels {
        [] => Vec::new(),
        [only] => only.clone(),
        _ => {
            let len = channels.iter().map(Vec::len).min().unwrap_or(0);
            let scale = 1.0 / channels.len() as f32;
            (0..len)
                .map(|i| channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

/// Root-mean-square level of a signal, accumulated in f64.
#[inline]
pub fn rms(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}
