use crate::config::ConfigError;

/// How channels are packed into port words. Only the layouts listed here can be unpacked;
/// anything else is refused when the pipeline is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// One microphone, every bit of a word belongs to it
    Mono,
    /// Two microphones on one double data rate line, bits alternate between them
    Pair,
}

impl ChannelLayout {
    pub fn new(channel_count: usize) -> Result<Self, ConfigError> {
        match channel_count {
            1 => Ok(ChannelLayout::Mono),
            2 => Ok(ChannelLayout::Pair),
            n => Err(ConfigError::UnsupportedChannelCount(n)),
        }
    }

    pub const fn channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Pair => 2,
        }
    }
}

const EVEN_BITS: u64 = 0x5555_5555_5555_5555;

/// Gather the even bits of `x` into a 32-bit word, preserving their order
fn gather_even(x: u64) -> u32 {
    let mut x = x & EVEN_BITS;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Inverse of `gather_even`: spread 32 bits out to the even positions of a 64-bit word
fn spread_even(x: u32) -> u64 {
    let mut x = x as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & EVEN_BITS;
    x
}

/// Reorganise a capture buffer in place so each word holds samples of a single channel.
///
/// The buffer arrives newest word first (index 0 is the last word read from the port). On
/// return it is laid out as `[frame][channel]`, still newest frame first, so the word for
/// channel `ch` of frame `f` is at `f * channels + ch`.
///
/// For pairs, words `2j` (newer) and `2j + 1` (older) together hold 64 port bits in arrival
/// order; the even bits become channel 0 and the odd bits channel 1.
pub fn deinterleave(block: &mut [u32], layout: ChannelLayout) {
    match layout {
        ChannelLayout::Mono => {}
        ChannelLayout::Pair => {
            debug_assert!(block.len() % 2 == 0);
            for pair in block.chunks_exact_mut(2) {
                let x = ((pair[0] as u64) << 32) | pair[1] as u64;
                pair[0] = gather_even(x);
                pair[1] = gather_even(x >> 1);
            }
        }
    }
}

/// Inverse of [`deinterleave`]: pack per-channel words back into port order
pub fn interleave(block: &mut [u32], layout: ChannelLayout) {
    match layout {
        ChannelLayout::Mono => {}
        ChannelLayout::Pair => {
            debug_assert!(block.len() % 2 == 0);
            for pair in block.chunks_exact_mut(2) {
                let x = spread_even(pair[0]) | (spread_even(pair[1]) << 1);
                pair[0] = (x >> 32) as u32;
                pair[1] = x as u32;
            }
        }
    }
}

/// Move `window[0..n-1]` to `window[1..n]`, dropping the oldest word. Whatever is left in
/// `window[0]` is overwritten by the next sample.
pub fn shift_history(window: &mut [u32]) {
    let n = window.len();
    if n > 1 {
        window.copy_within(0..n - 1, 1);
    }
}
