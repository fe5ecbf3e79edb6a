//! Synthetic PDM streams for exercising the pipeline off-target

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigError;
use crate::deinterleave::{interleave, ChannelLayout};

/// Second order sigma-delta modulator.
///
/// Input is in [-1, 1]; output bits have a density of `(1 + x) / 2`. Inputs much beyond
/// +/-0.7 can make the loop unstable, so keep test tones below that.
pub struct SigmaDelta {
    i1: f64,
    i2: f64,
    feedback: f64,
}

impl SigmaDelta {
    pub fn new() -> Self {
        Self { i1: 0.0, i2: 0.0, feedback: -1.0 }
    }

    pub fn step(&mut self, x: f64) -> bool {
        self.i1 += x - self.feedback;
        self.i2 += self.i1 - self.feedback;
        let bit = self.i2 >= 0.0;
        self.feedback = if bit { 1.0 } else { -1.0 };
        bit
    }
}

impl Default for SigmaDelta {
    fn default() -> Self {
        Self::new()
    }
}

/// A sine tone modulated to a PDM bit stream
pub struct SineSource {
    amplitude: f64,
    phase: f64,
    phase_step: f64,
    modulator: SigmaDelta,
    dither: Option<(StdRng, f64)>,
}

impl SineSource {
    /// `frequency` and `pdm_rate` in Hz, `amplitude` as a fraction of full scale
    pub fn new(frequency: f64, pdm_rate: f64, amplitude: f64) -> Self {
        Self {
            amplitude,
            phase: 0.0,
            phase_step: 2.0 * core::f64::consts::PI * frequency / pdm_rate,
            modulator: SigmaDelta::new(),
            dither: None,
        }
    }

    /// Silence: a half density stream
    pub fn silent() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    /// Start at a phase offset, in radians
    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    /// Add uniform noise of the given peak level ahead of the modulator
    pub fn with_dither(mut self, seed: u64, level: f64) -> Self {
        self.dither = Some((StdRng::seed_from_u64(seed), level));
        self
    }

    /// The ideal (unmodulated) value of the next bit
    pub fn level(&self) -> f64 {
        self.amplitude * libm::sin(self.phase)
    }

    pub fn next_bit(&mut self) -> bool {
        let mut x = self.level();
        if let Some((rng, level)) = self.dither.as_mut() {
            x += rng.gen_range(-1.0..1.0) * *level;
        }
        self.phase += self.phase_step;
        if self.phase > 2.0 * core::f64::consts::PI {
            self.phase -= 2.0 * core::f64::consts::PI;
        }
        self.modulator.step(x)
    }

    /// The next 32 bits as a word, oldest in the LSB
    pub fn next_word(&mut self) -> u32 {
        pack_word((0..32).map(|_| self.next_bit()))
    }
}

/// Pack 32 bits, arrival order, into a word with the oldest in the LSB. Missing bits are zero.
pub fn pack_word<I>(bits: I) -> u32
where I: IntoIterator<Item = bool>
{
    bits.into_iter()
        .take(32)
        .enumerate()
        .fold(0u32, |w, (i, b)| if b { w | (1 << i) } else { w })
}

/// Words as a port would deliver them, one source per microphone. `frames` is the number of
/// 32-bit words generated for each microphone.
///
/// With two sources the bits are interleaved onto one double data rate line, each frame taking
/// two port words. Any other number of sources is refused the way `setup` refuses it.
pub fn port_words(sources: &mut [SineSource], frames: usize) -> Result<Vec<u32>, ConfigError> {
    let layout = ChannelLayout::new(sources.len())?;
    let mut out = Vec::with_capacity(frames * layout.channels());
    for _ in 0..frames {
        match layout {
            ChannelLayout::Mono => out.push(sources[0].next_word()),
            ChannelLayout::Pair => {
                let mut pair = [sources[0].next_word(), sources[1].next_word()];
                interleave(&mut pair, layout);
                // interleave leaves the pair newest first, the line carries the older word first
                out.push(pair[1]);
                out.push(pair[0]);
            }
        }
    }
    Ok(out)
}
