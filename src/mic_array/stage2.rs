use heapless::Vec;

use crate::config::{ConfigError, MAX_STAGE2_SHR, MAX_STAGE2_TAPS};

/// Word-domain FIR filter with a circular tap buffer.
///
/// Products are summed in an `i64`, saturating at its limits. The sum is then shifted right by
/// `shr` with rounding (half rounds up) and saturated to the `i32` range.
pub struct Stage2Filter<'a> {
    coefficients: &'a [i32],
    shr: u32,
    state: Vec<i32, MAX_STAGE2_TAPS>,
    // Slot the next sample is written to; the newest sample sits just before it
    head: usize,
}

impl<'a> Stage2Filter<'a> {
    pub fn new(coefficients: &'a [i32], shr: u32) -> Result<Self, ConfigError> {
        let taps = coefficients.len();
        if taps == 0 || taps > MAX_STAGE2_TAPS {
            return Err(ConfigError::InvalidStage2Taps(taps));
        }
        if shr > MAX_STAGE2_SHR {
            return Err(ConfigError::InvalidStage2Shift(shr));
        }
        let mut state = Vec::new();
        state.resize(taps, 0).map_err(|_| ConfigError::InvalidStage2Taps(taps))?;
        Ok(Self { coefficients, shr, state, head: 0 })
    }

    pub fn taps(&self) -> usize {
        self.coefficients.len()
    }

    /// Push a sample into the tap buffer without computing an output
    pub fn add_sample(&mut self, sample: i32) {
        self.state[self.head] = sample;
        self.head += 1;
        if self.head == self.state.len() {
            self.head = 0;
        }
    }

    /// Push a sample and compute the filter output
    pub fn filter(&mut self, sample: i32) -> i32 {
        self.add_sample(sample);
        // Newest first: state[..head] backwards, then state[head..] backwards
        let (wrapped, oldest) = self.state.split_at(self.head);
        let history = wrapped.iter().rev().chain(oldest.iter().rev());
        let mut acc = 0i64;
        for (&c, &x) in self.coefficients.iter().zip(history) {
            acc = acc.saturating_add(c as i64 * x as i64);
        }
        self.scale(acc)
    }

    fn scale(&self, acc: i64) -> i32 {
        let shifted = if self.shr == 0 {
            acc
        } else {
            acc.saturating_add(1i64 << (self.shr - 1)) >> self.shr
        };
        shifted.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

/// A [`Stage2Filter`] that only produces an output on every `factor`-th input
pub struct Stage2Decimator<'a> {
    filter: Stage2Filter<'a>,
    factor: usize,
    phase: usize,
}

impl<'a> Stage2Decimator<'a> {
    pub fn new(filter: Stage2Filter<'a>, factor: usize) -> Result<Self, ConfigError> {
        if factor == 0 {
            return Err(ConfigError::InvalidDecimationFactor);
        }
        Ok(Self { filter, factor, phase: 0 })
    }

    pub fn push(&mut self, sample: i32) -> Option<i32> {
        self.phase += 1;
        if self.phase == self.factor {
            self.phase = 0;
            Some(self.filter.filter(sample))
        } else {
            self.filter.add_sample(sample);
            None
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}
