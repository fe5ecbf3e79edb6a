use core::f32::consts::PI;

use crate::config::{Stage1Coefficients, STAGE1_TAP_COUNT};

/// PDM clock of the reference board: a 24.576 MHz master clock divided by 8
pub const DEFAULT_PDM_FREQ: f32 = 3_072_000.0;
/// Rate after the first stage, which keeps one sample per 32 PDM bits
pub const STAGE1_OUTPUT_FREQ: f32 = DEFAULT_PDM_FREQ / 32.0;
/// 96 kHz to 16 kHz
pub const DEFAULT_DECIMATION_FACTOR: usize = 6;
pub const DEFAULT_STAGE2_TAPS: usize = 65;
/// The default second stage has a DC gain of 2^30. With this shift, a full-scale first stage
/// output leaves the pipeline around 2^30, half the `i32` range.
pub const DEFAULT_STAGE2_SHR: u32 = 21;
const STAGE2_GAIN_LOG2: u32 = 30;

/// Cut-off of the default first stage filter
pub const DEFAULT_STAGE1_CUTOFF_HZ: f32 = 24e3;
/// Second stage cut-off as a fraction of the output rate: 7 kHz at 16 kHz out
pub const STAGE2_CUTOFF_FRACTION: f32 = 0.4375;

/// Design a Blackman-windowed sinc lowpass, normalised to unity DC gain.
///
/// `cutoff` is a fraction of the sample rate, in (0, 0.5).
pub fn design_lowpass(taps: &mut [f32], cutoff: f32) {
    let n = taps.len();
    if n == 0 {
        return;
    }
    let centre = (n as f32 - 1.0) / 2.0;
    let span = if n > 1 { n as f32 - 1.0 } else { 1.0 };
    let mut sum = 0.0f32;
    for (i, tap) in taps.iter_mut().enumerate() {
        let m = i as f32 - centre;
        let sinc = if m == 0.0 {
            2.0 * cutoff
        } else {
            libm::sinf(2.0 * PI * cutoff * m) / (PI * m)
        };
        // Blackman window measured from the centre, so mirrored taps come out bit-identical
        let phase = 2.0 * PI * m / span;
        let window = 0.42 + 0.5 * libm::cosf(phase) + 0.08 * libm::cosf(2.0 * phase);
        *tap = sinc * window;
        sum += *tap;
    }
    for tap in taps.iter_mut() {
        *tap /= sum;
    }
}

/// Scale first stage taps so the largest magnitude uses the full 16-bit range
pub fn quantize_stage1(taps: &[f32; STAGE1_TAP_COUNT]) -> Stage1Coefficients {
    let peak = taps.iter().fold(0.0f32, |m, &t| m.max(libm::fabsf(t)));
    let mut out = [0i16; STAGE1_TAP_COUNT];
    if peak == 0.0 {
        return out;
    }
    let scale = i16::MAX as f32 / peak;
    for (q, &t) in out.iter_mut().zip(taps.iter()) {
        *q = libm::roundf(t * scale) as i16;
    }
    out
}

/// Scale unity-gain taps to a DC gain of exactly `2^gain_log2`. The rounding residual goes to
/// the centre tap.
pub fn quantize_stage2(taps: &[f32], gain_log2: u32, out: &mut [i32]) {
    let scale = libm::ldexp(1.0, gain_log2 as i32);
    for (q, &t) in out.iter_mut().zip(taps.iter()) {
        let v = libm::round(t as f64 * scale);
        *q = v.clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    }
    let n = out.len().min(taps.len());
    if n == 0 {
        return;
    }
    let sum: i64 = out[..n].iter().map(|&q| q as i64).sum();
    let residual = (1i64 << gain_log2.min(62)) - sum;
    let centre = &mut out[n / 2];
    *centre = (*centre as i64 + residual).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
}

/// 256 tap lowpass for 3.072 MHz PDM in, 96 kHz out
pub fn default_stage1() -> Stage1Coefficients {
    let mut taps = [0.0f32; STAGE1_TAP_COUNT];
    design_lowpass(&mut taps, DEFAULT_STAGE1_CUTOFF_HZ / DEFAULT_PDM_FREQ);
    quantize_stage1(&taps)
}

/// 65 tap anti-alias lowpass for decimating by `decimation_factor`, to be used with
/// [`DEFAULT_STAGE2_SHR`]
pub fn design_stage2(decimation_factor: usize) -> [i32; DEFAULT_STAGE2_TAPS] {
    let mut taps = [0.0f32; DEFAULT_STAGE2_TAPS];
    design_lowpass(&mut taps, STAGE2_CUTOFF_FRACTION / decimation_factor.max(1) as f32);
    let mut out = [0i32; DEFAULT_STAGE2_TAPS];
    quantize_stage2(&taps, STAGE2_GAIN_LOG2, &mut out);
    out
}

/// 96 kHz in, 16 kHz out
pub fn default_stage2() -> [i32; DEFAULT_STAGE2_TAPS] {
    design_stage2(DEFAULT_DECIMATION_FACTOR)
}
