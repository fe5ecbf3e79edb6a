/*! Run a raw PDM capture through the decimation pipeline and write one WAV file per microphone.

The input is the port's word stream as captured: little-endian 32-bit words, in the order they
were read. */
#[path = "../logger.rs"]
mod logger;

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use mic_array::filters::{
    default_stage1, design_stage2, DEFAULT_DECIMATION_FACTOR, DEFAULT_STAGE2_SHR,
};
use mic_array::{buffer_size_words, setup, Handoff, IsrSlot, PcmSink, PipelineConfig, SimulatedPort};

#[derive(Parser)]
#[command(name = "pdm2wav", version)]
struct Cli {
    /// Raw capture file of little-endian 32-bit port words
    input: PathBuf,

    /// Number of microphones on the port (1 or 2)
    #[arg(short = 'c', long = "channels", default_value_t = 1)]
    channels: usize,

    /// Second stage decimation factor
    #[arg(short = 'd', long = "decimation", default_value_t = DEFAULT_DECIMATION_FACTOR)]
    decimation: usize,

    /// PDM bit clock in Hz, used to label the output sample rate
    #[arg(short = 'r', long = "pdm-rate", default_value_t = 3_072_000)]
    pdm_rate: u32,

    /// Output file prefix; channel N is written to <PREFIX>chN.wav
    #[arg(short = 'o', long = "output", default_value = "")]
    prefix: String,

    /// Output bit depth: 16 or 32
    #[arg(short = 'b', long = "bits", default_value_t = 16)]
    bits: u16,

    /// Keep the DC offset of the unipolar PDM stream instead of filtering it out
    #[arg(long = "keep-dc")]
    keep_dc: bool,

    /// More log output, repeat for per-frame tracing
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// One-pole DC blocker
struct DcBlocker {
    x1: f64,
    y1: f64,
}

impl DcBlocker {
    const POLE: f64 = 0.999;

    fn new() -> Self {
        Self { x1: 0.0, y1: 0.0 }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = x - self.x1 + Self::POLE * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

struct WavSink {
    writers: Vec<hound::WavWriter<BufWriter<File>>>,
    dc: Vec<DcBlocker>,
    keep_dc: bool,
    shift: u32,
    error: Option<hound::Error>,
}

impl PcmSink for WavSink {
    fn on_frame(&mut self, frame: &[i32]) {
        if self.error.is_some() {
            return;
        }
        for (ch, &sample) in frame.iter().enumerate() {
            let x = if self.keep_dc {
                sample as f64
            } else {
                self.dc[ch].process(sample as f64)
            };
            // Pipeline output spans about 2^30 at full scale
            let scaled = (x / (1u64 << self.shift) as f64).round();
            let result = if self.shift > 0 {
                self.writers[ch].write_sample(scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16)
            } else {
                self.writers[ch].write_sample(scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
            };
            if let Err(e) = result {
                self.error = Some(e);
                return;
            }
        }
    }
}

fn read_words(path: &PathBuf) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        warn!("ignoring {} trailing bytes", chunks.remainder().len());
    }
    Ok(chunks.map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.quiet, cli.verbose);

    let shift = match cli.bits {
        16 => 15,
        32 => 0,
        other => bail!("unsupported bit depth {}", other),
    };

    let words = read_words(&cli.input)?;
    let stage1 = default_stage1();
    let stage2 = design_stage2(cli.decimation);
    let mut region = vec![0u32; buffer_size_words(cli.channels, cli.decimation)];
    let mut handoff = Handoff::new();
    let n_words = words.len();
    let config = PipelineConfig {
        channel_count: cli.channels,
        decimation_factor: cli.decimation,
        stage1_coefficients: &stage1,
        stage2_coefficients: &stage2,
        stage2_shr: DEFAULT_STAGE2_SHR,
        port: SimulatedPort::new(words.into_iter()),
        buffer: &mut region,
    };
    let (producer, mut controller) = setup(config, &mut handoff).context("configuring pipeline")?;

    let sample_rate = cli.pdm_rate / 32 / cli.decimation as u32;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: cli.bits,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writers = Vec::new();
    for ch in 0..cli.channels {
        let path = format!("{}ch{}.wav", cli.prefix, ch + 1);
        debug!("channel {} -> {}", ch + 1, path);
        let writer =
            hound::WavWriter::create(&path, spec).with_context(|| format!("creating {}", path))?;
        writers.push(writer);
    }
    let mut sink = WavSink {
        writers,
        dc: (0..cli.channels).map(|_| DcBlocker::new()).collect(),
        keep_dc: cli.keep_dc,
        shift,
        error: None,
    };

    // Each word is one port-ready interrupt; the consumer runs between them
    let isr = IsrSlot::new();
    isr.install(producer);
    for _ in 0..n_words {
        isr.on_interrupt();
        controller.poll(&mut sink);
    }

    if let Some(e) = sink.error.take() {
        return Err(e).context("writing samples");
    }
    for writer in sink.writers {
        writer.finalize().context("finalizing wav")?;
    }
    info!(
        "{} words -> {} frames at {} Hz, {} overruns",
        n_words,
        controller.frames(),
        sample_rate,
        controller.overruns()
    );
    Ok(())
}
