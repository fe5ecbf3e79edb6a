use embassy_futures::block_on;
use mic_array::config::{HISTORY_INIT_PATTERN, STAGE1_TAP_COUNT};
use mic_array::filters::{
    default_stage1, default_stage2, DEFAULT_DECIMATION_FACTOR, DEFAULT_PDM_FREQ, DEFAULT_STAGE2_SHR,
};
use mic_array::generation::{port_words, SineSource};
use mic_array::{
    buffer_size_words, setup, ConfigError, Handoff, PipelineConfig, SimulatedPort,
    Stage1Coefficients,
};

const D: usize = DEFAULT_DECIMATION_FACTOR;

fn first_word_taps() -> Stage1Coefficients {
    let mut c = [0i16; STAGE1_TAP_COUNT];
    for tap in c.iter_mut().take(32) {
        *tap = 1;
    }
    c
}

/// Feed `words` through a pipeline one interrupt at a time, polling after every word
fn run_pipeline(
    words: &[u32],
    channels: usize,
    stage1: &Stage1Coefficients,
    stage2: &[i32],
    shr: u32,
) -> Vec<Vec<i32>> {
    let mut buffer = vec![0u32; buffer_size_words(channels, D)];
    let mut handoff = Handoff::new();
    let config = PipelineConfig {
        channel_count: channels,
        decimation_factor: D,
        stage1_coefficients: stage1,
        stage2_coefficients: stage2,
        stage2_shr: shr,
        port: SimulatedPort::new(words.iter().copied()),
        buffer: &mut buffer,
    };
    let (mut producer, mut controller) = setup(config, &mut handoff).unwrap();
    producer.arm();

    let mut frames = Vec::new();
    let mut sink = |f: &[i32]| frames.push(f.to_vec());
    for _ in 0..words.len() {
        producer.on_port_ready();
        controller.poll(&mut sink);
    }
    assert_eq!(controller.overruns(), 0);
    assert_eq!(controller.frames() as usize, words.len() / (channels * D));
    frames
}

/// Floating point model of both stages over one channel's words in arrival order. Words before
/// the start of the stream read as the startup pattern; stage 2 starts from zeros.
fn reference(words: &[u32], stage1: &Stage1Coefficients, stage2: &[i32], shr: u32) -> Vec<f64> {
    let word_at = |m: isize| if m < 0 { HISTORY_INIT_PATTERN } else { words[m as usize] };
    let y1: Vec<f64> = (0..words.len() as isize)
        .map(|m| {
            (0..STAGE1_TAP_COUNT)
                .map(|t| {
                    let bit = (word_at(m - (t / 32) as isize) >> (31 - t % 32)) & 1;
                    stage1[t] as f64 * bit as f64
                })
                .sum::<f64>()
        })
        .collect();
    let scale = (1u64 << shr) as f64;
    (0..words.len() / D)
        .map(|f| {
            let m = f * D + D - 1;
            let acc: f64 = stage2
                .iter()
                .enumerate()
                .filter(|(i, _)| *i <= m)
                .map(|(i, &c)| c as f64 * y1[m - i])
                .sum();
            acc / scale
        })
        .collect()
}

#[test]
fn six_single_bit_words_make_one_frame_of_six() {
    let coeffs = first_word_taps();
    let frames = run_pipeline(&[1; 6], 1, &coeffs, &[4; 6], 2);
    assert_eq!(frames, vec![vec![6]]);
}

#[test]
fn every_buffer_makes_one_frame() {
    let coeffs = first_word_taps();
    for channels in 1..=2 {
        let k = 25;
        let words = vec![0xF0F0_F0F0; k * channels * D];
        let frames = run_pipeline(&words, channels, &coeffs, &[4; 6], 2);
        assert_eq!(frames.len(), k);
        assert!(frames.iter().all(|f| f.len() == channels));
    }
}

#[test]
fn zero_stream_settles_to_zero() {
    let stage1 = default_stage1();
    let stage2 = default_stage2();
    for channels in 1..=2 {
        let words = vec![0u32; 40 * channels * D];
        let frames = run_pipeline(&words, channels, &stage1, &stage2, DEFAULT_STAGE2_SHR);
        // 8 words for the startup pattern to leave stage 1, then the stage 2 taps to clear
        for frame in &frames[20..] {
            assert!(frame.iter().all(|&s| s == 0), "{:?}", frame);
        }
    }
}

#[test]
fn idle_microphone_sits_at_mid_scale() {
    let stage1 = default_stage1();
    let stage2 = default_stage2();
    let mut sources = [SineSource::silent(), SineSource::silent()];
    let words = port_words(&mut sources, 60 * D).unwrap();
    let frames = run_pipeline(&words, 2, &stage1, &stage2, DEFAULT_STAGE2_SHR);

    let full_scale: i64 =
        stage1.iter().map(|&c| c as i64).sum::<i64>() << (30 - DEFAULT_STAGE2_SHR);
    let mid = full_scale as f64 / 2.0;
    for frame in &frames[20..] {
        for &s in frame {
            assert!((s as f64 - mid).abs() < mid * 0.01, "{} vs {}", s, mid);
        }
    }
}

#[test]
fn sine_matches_floating_point_model() {
    let stage1 = default_stage1();
    let stage2 = default_stage2();
    let sources = || {
        [
            SineSource::new(1000.0, DEFAULT_PDM_FREQ as f64, 0.5),
            SineSource::new(400.0, DEFAULT_PDM_FREQ as f64, 0.3)
                .with_phase(0.7)
                .with_dither(9, 0.05),
        ]
    };
    let n_frames = 180;

    // Mono: the first source alone
    let mut mono = [sources().into_iter().next().unwrap()];
    let words = port_words(&mut mono, n_frames * D).unwrap();
    let frames = run_pipeline(&words, 1, &stage1, &stage2, DEFAULT_STAGE2_SHR);
    let expected = reference(&words, &stage1, &stage2, DEFAULT_STAGE2_SHR);
    for (got, want) in frames.iter().zip(expected.iter()) {
        assert!((got[0] as f64 - want).abs() <= 1.0, "{} vs {}", got[0], want);
    }

    // Pair: each channel checked against its own source's words
    let mut pair = sources();
    let words = port_words(&mut pair, n_frames * D).unwrap();
    let frames = run_pipeline(&words, 2, &stage1, &stage2, DEFAULT_STAGE2_SHR);
    for (ch, source) in sources().into_iter().enumerate() {
        let mut source = source;
        let channel_words: Vec<u32> = (0..n_frames * D).map(|_| source.next_word()).collect();
        let expected = reference(&channel_words, &stage1, &stage2, DEFAULT_STAGE2_SHR);
        for (f, (got, want)) in frames.iter().zip(expected.iter()).enumerate() {
            assert!(
                (got[ch] as f64 - want).abs() <= 1.0,
                "ch {} frame {}: {} vs {}",
                ch,
                f,
                got[ch],
                want
            );
        }
    }
}

#[test]
fn sine_amplitude_survives_the_filters() {
    let stage1 = default_stage1();
    let stage2 = default_stage2();
    let amplitude = 0.5;
    let mut source = [SineSource::new(1000.0, DEFAULT_PDM_FREQ as f64, amplitude)];
    // 1 kHz at 16 kHz output: skip 20 frames, then 10 whole periods
    let words = port_words(&mut source, 180 * D).unwrap();
    let frames = run_pipeline(&words, 1, &stage1, &stage2, DEFAULT_STAGE2_SHR);
    let settled: Vec<f64> = frames[20..].iter().map(|f| f[0] as f64).collect();
    let mean = settled.iter().sum::<f64>() / settled.len() as f64;
    let variance = settled.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / settled.len() as f64;
    let rms = variance.sqrt();

    let stage2_gain = (1u64 << (30 - DEFAULT_STAGE2_SHR)) as f64;
    let full_scale = stage1.iter().map(|&c| c as f64).sum::<f64>() * stage2_gain;
    // Bit density swings by amplitude / 2 around one half
    let want = full_scale * amplitude / 2.0 / 2f64.sqrt();
    assert!((rms - want).abs() < want * 0.05, "rms {} expected {}", rms, want);
}

#[test]
fn slow_consumer_loses_blocks_but_never_sees_a_torn_one() {
    let coeffs = first_word_taps();
    let mut buffer = [0u32; 20];
    let mut handoff = Handoff::new();
    // Block k (from 1) is made of words with k bits set
    let words = (1..=9u32).flat_map(|k| std::iter::repeat((1u32 << k) - 1).take(D));
    let config = PipelineConfig {
        channel_count: 1,
        decimation_factor: D,
        stage1_coefficients: &coeffs,
        stage2_coefficients: &[4; 6],
        stage2_shr: 2,
        port: SimulatedPort::new(words),
        buffer: &mut buffer,
    };
    let (mut producer, mut controller) = setup(config, &mut handoff).unwrap();

    let mut frames = Vec::new();
    let mut sink = |f: &[i32]| frames.push(f[0]);
    for _ in 0..3 {
        // Three blocks arrive for every one the consumer gets to
        for _ in 0..3 * D {
            producer.on_port_ready();
        }
        assert!(controller.poll(&mut sink));
        assert!(!controller.poll(&mut sink));
    }
    assert_eq!(controller.frames(), 3);
    assert_eq!(controller.overruns(), 6);
    assert_eq!(producer.overruns(), 6);
    // Each frame sums the bits of exactly one block: blocks 1, 4 and 7
    assert_eq!(frames, vec![6, 24, 42]);
}

/// Run ten buffers of pseudo random words through a pipeline living in `buffer`
fn run_ten_buffers(channels: usize, buffer: &mut [u32]) {
    let coeffs = first_word_taps();
    let mut handoff = Handoff::new();
    let config = PipelineConfig {
        channel_count: channels,
        decimation_factor: D,
        stage1_coefficients: &coeffs,
        stage2_coefficients: &[1],
        stage2_shr: 0,
        port: SimulatedPort::new((0..).map(|i: u32| i.wrapping_mul(0x9E37_79B9))),
        buffer,
    };
    let (mut producer, mut controller) = setup(config, &mut handoff).unwrap();
    let mut sink = |_: &[i32]| {};
    for _ in 0..10 * channels * D {
        producer.on_port_ready();
        controller.poll(&mut sink);
    }
    assert_eq!(controller.frames(), 10);
}

#[test]
fn pipeline_stays_inside_its_buffer_region() {
    const GUARD: u32 = 0xA5A5_A5A5;
    for channels in 1..=2 {
        let n = buffer_size_words(channels, D);
        let mut region = vec![GUARD; n + 8];
        run_ten_buffers(channels, &mut region[4..4 + n]);
        assert!(region[..4].iter().all(|&w| w == GUARD));
        assert!(region[4 + n..].iter().all(|&w| w == GUARD));
        // Both ends of the region are in use: the first capture word and the last history word
        let used = &region[4..4 + n];
        assert_ne!(used[0], GUARD);
        assert_ne!(used[2 * channels * D - 1], GUARD);
        assert_ne!(used[2 * channels * D], GUARD);
        assert_ne!(used[n - 1], GUARD);
    }
}

#[test]
fn wrong_buffer_size_is_refused_for_each_channel_count() {
    let coeffs = first_word_taps();
    for channels in 1..=2 {
        let n = buffer_size_words(channels, D);
        for len in [n - 1, n + 1] {
            let mut buffer = vec![0u32; len];
            let mut handoff = Handoff::new();
            let config = PipelineConfig {
                channel_count: channels,
                decimation_factor: D,
                stage1_coefficients: &coeffs,
                stage2_coefficients: &[1],
                stage2_shr: 0,
                port: SimulatedPort::new(std::iter::empty::<u32>()),
                buffer: &mut buffer,
            };
            let err = setup(config, &mut handoff).err();
            assert_eq!(err, Some(ConfigError::BufferSizeMismatch { expected: n, actual: len }));
        }
    }
}

#[test]
fn async_consumer_gets_every_frame() {
    let coeffs = first_word_taps();
    let mut buffer = [0u32; 20];
    let mut handoff = Handoff::new();
    let config = PipelineConfig {
        channel_count: 1,
        decimation_factor: D,
        stage1_coefficients: &coeffs,
        stage2_coefficients: &[4; 6],
        stage2_shr: 2,
        port: SimulatedPort::new(std::iter::repeat(3u32)),
        buffer: &mut buffer,
    };
    let (mut producer, mut controller) = setup(config, &mut handoff).unwrap();
    let mut frames = Vec::new();
    for _ in 0..5 {
        for _ in 0..D {
            producer.on_port_ready();
        }
        block_on(controller.next_frame(&mut |f: &[i32]| frames.push(f[0])));
    }
    assert_eq!(frames, vec![12; 5]);
}
