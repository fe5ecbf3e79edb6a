use crate::config::{Stage1Coefficients, HISTORY_INIT_PATTERN, PDM_HISTORY_WORDS};
use crate::deinterleave::shift_history;

/// Fill a channel's history with the startup pattern
pub fn init_history(window: &mut [u32]) {
    for word in window.iter_mut() {
        *word = HISTORY_INIT_PATTERN;
    }
}

/// First stage decimator: a 256 tap FIR over the raw PDM bits, producing one sample per 32 bits.
///
/// The history window holds [`PDM_HISTORY_WORDS`] words, newest at index 0. Within each word the
/// MSB is the newest bit, so tap `t` reads bit `31 - t % 32` of word `t / 32`.
///
/// A set bit contributes its coefficient and a clear bit contributes nothing. The sum is exact:
/// 256 coefficients of at most 2^15 in magnitude cannot leave the `i32` range, so there is no
/// saturation or truncation in this stage.
#[derive(Clone, Copy)]
pub struct Stage1Decimator<'a> {
    coefficients: &'a Stage1Coefficients,
}

impl<'a> Stage1Decimator<'a> {
    pub const fn new(coefficients: &'a Stage1Coefficients) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &'a Stage1Coefficients {
        self.coefficients
    }

    /// Bit-domain convolution of the coefficients with the history window
    pub fn convolve(&self, window: &[u32]) -> i32 {
        debug_assert!(window.len() >= PDM_HISTORY_WORDS);
        let mut acc = 0i32;
        for (w, &word) in window.iter().take(PDM_HISTORY_WORDS).enumerate() {
            let taps = &self.coefficients[32 * w..32 * w + 32];
            let mut bits = word;
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                acc += taps[31 - bit] as i32;
                bits &= bits - 1;
            }
        }
        acc
    }

    /// Push the newest word into the window, filter, then shift the window to make room for the
    /// next word.
    pub fn process(&self, window: &mut [u32], sample: u32) -> i32 {
        window[0] = sample;
        let out = self.convolve(window);
        shift_history(window);
        out
    }
}
