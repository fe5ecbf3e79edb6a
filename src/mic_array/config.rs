use thiserror::Error;

/// Number of 32-bit words of PDM history kept for each channel by the first stage
pub const PDM_HISTORY_WORDS: usize = 8;
/// Number of taps in the first stage filter; one tap per PDM bit of history
pub const STAGE1_TAP_COUNT: usize = PDM_HISTORY_WORDS * 32;
/// The largest channel count the deinterleaver knows how to unpack
pub const MAX_CHANNELS: usize = 2;
/// Upper bound on second stage filter length, which sizes the per-channel tap buffers
pub const MAX_STAGE2_TAPS: usize = 128;
/// Alternating bit pattern written to the history at startup. A half-density PDM stream is what
/// a silent microphone produces, so starting from it keeps the first frames quiet.
pub const HISTORY_INIT_PATTERN: u32 = 0x5555_5555;
/// Right shifts of 63 or more would discard the whole 64-bit accumulator
pub const MAX_STAGE2_SHR: u32 = 62;

/// First stage coefficients, tap 0 applies to the newest PDM bit
pub type Stage1Coefficients = [i16; STAGE1_TAP_COUNT];

/// Number of words one fill of a single buffer holds
pub const fn block_words(channel_count: usize, decimation_factor: usize) -> usize {
    channel_count * decimation_factor
}

/// Size of the buffer region the application must provide: two capture buffers followed by the
/// per-channel PDM history.
pub const fn buffer_size_words(channel_count: usize, decimation_factor: usize) -> usize {
    2 * block_words(channel_count, decimation_factor) + channel_count * PDM_HISTORY_WORDS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported channel count {0} (supported: 1..={max})", max = MAX_CHANNELS)]
    UnsupportedChannelCount(usize),
    #[error("decimation factor must be at least 1")]
    InvalidDecimationFactor,
    #[error("buffer region is {actual} words, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("second stage filter has {0} taps (supported: 1..={max})", max = MAX_STAGE2_TAPS)]
    InvalidStage2Taps(usize),
    #[error("second stage shift {0} exceeds {max}", max = MAX_STAGE2_SHR)]
    InvalidStage2Shift(u32),
}

/// How the capture port must be clocked for a given number of microphones. Each microphone pair
/// shares one data line, one on each clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    SingleDataRate,
    DoubleDataRate,
}

impl PortMode {
    pub const fn for_channels(channel_count: usize) -> Self {
        if channel_count <= 1 {
            PortMode::SingleDataRate
        } else {
            PortMode::DoubleDataRate
        }
    }
}

/// Everything the pipeline needs, handed over once to [`crate::pipeline::setup`].
pub struct PipelineConfig<'a, P> {
    /// Number of microphones on the port
    pub channel_count: usize,
    /// Second stage decimation ratio; also the number of port words per channel in each buffer
    pub decimation_factor: usize,
    /// First stage filter, shared by all channels
    pub stage1_coefficients: &'a Stage1Coefficients,
    /// Second stage filter, shared by all channels. Tap 0 applies to the newest sample.
    pub stage2_coefficients: &'a [i32],
    /// Right shift applied to the second stage accumulator
    pub stage2_shr: u32,
    /// The capture port
    pub port: P,
    /// Backing memory, exactly [`buffer_size_words`] long
    pub buffer: &'a mut [u32],
}

impl<'a, P> PipelineConfig<'a, P> {
    pub fn block_words(&self) -> usize {
        block_words(self.channel_count, self.decimation_factor)
    }

    pub fn required_buffer_words(&self) -> usize {
        buffer_size_words(self.channel_count, self.decimation_factor)
    }

    pub fn port_mode(&self) -> PortMode {
        PortMode::for_channels(self.channel_count)
    }

    /// Check every setup-time invariant. Nothing is started by this call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ConfigError::UnsupportedChannelCount(self.channel_count));
        }
        if self.decimation_factor == 0 {
            return Err(ConfigError::InvalidDecimationFactor);
        }
        let taps = self.stage2_coefficients.len();
        if taps == 0 || taps > MAX_STAGE2_TAPS {
            return Err(ConfigError::InvalidStage2Taps(taps));
        }
        if self.stage2_shr > MAX_STAGE2_SHR {
            return Err(ConfigError::InvalidStage2Shift(self.stage2_shr));
        }
        let expected = self.required_buffer_words();
        if self.buffer.len() != expected {
            return Err(ConfigError::BufferSizeMismatch { expected, actual: self.buffer.len() });
        }
        Ok(())
    }
}
