/*! Write a synthetic PDM capture: sine tones for one or two microphones, sigma-delta modulated
and packed as the port would deliver them. The output is what `pdm2wav` reads. */
#[path = "../logger.rs"]
mod logger;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use mic_array::generation::{port_words, SineSource};

/// Words generated per microphone between writes
const CHUNK_WORDS: usize = 4096;

#[derive(Parser)]
#[command(name = "pdmsynth", version)]
struct Cli {
    /// Output file of little-endian 32-bit port words
    output: PathBuf,

    /// Tone frequency in Hz, one per microphone (one or two values)
    #[arg(short = 'f', long = "freq", default_values_t = [1000.0])]
    freqs: Vec<f64>,

    /// Tone amplitude as a fraction of full scale
    #[arg(short = 'a', long = "amplitude", default_value_t = 0.5)]
    amplitude: f64,

    /// Length in seconds
    #[arg(short = 's', long = "seconds", default_value_t = 1.0)]
    seconds: f64,

    /// PDM bit clock in Hz
    #[arg(short = 'r', long = "pdm-rate", default_value_t = 3_072_000.0)]
    pdm_rate: f64,

    /// Peak level of uniform noise added ahead of the modulator
    #[arg(long = "dither", default_value_t = 0.0)]
    dither: f64,

    /// Seed for the dither noise
    #[arg(long = "seed", default_value_t = 1)]
    seed: u64,

    /// More log output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.quiet, cli.verbose);

    if cli.freqs.is_empty() || cli.freqs.len() > 2 {
        bail!("give one or two frequencies, got {}", cli.freqs.len());
    }
    if !(0.0..0.75).contains(&cli.amplitude.abs()) {
        bail!("amplitude {} would overload the modulator", cli.amplitude);
    }

    let mut sources: Vec<SineSource> = cli
        .freqs
        .iter()
        .enumerate()
        .map(|(ch, &f)| {
            let source = SineSource::new(f, cli.pdm_rate, cli.amplitude);
            if cli.dither > 0.0 {
                source.with_dither(cli.seed + ch as u64, cli.dither)
            } else {
                source
            }
        })
        .collect();

    let total = (cli.seconds * cli.pdm_rate / 32.0).round() as usize;
    let file = File::create(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    let mut out = BufWriter::new(file);
    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(CHUNK_WORDS);
        for word in port_words(&mut sources, n).context("generating port words")? {
            out.write_all(&word.to_le_bytes())?;
        }
        remaining -= n;
    }
    out.flush().context("flushing output")?;

    info!(
        "{} words per microphone, {} microphone(s), {:.3} s at {} Hz",
        total,
        sources.len(),
        cli.seconds,
        cli.pdm_rate
    );
    Ok(())
}
