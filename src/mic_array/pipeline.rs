use embassy_futures::{block_on, yield_now};
use heapless::Vec;
use log::{debug, error, info, trace};

use crate::config::{block_words, ConfigError, PipelineConfig, MAX_CHANNELS, PDM_HISTORY_WORDS};
use crate::deinterleave::{deinterleave, ChannelLayout};
use crate::handoff::{BufferReceiver, Handoff};
use crate::port::PdmPort;
use crate::producer::PdmProducer;
use crate::stage1::{init_history, Stage1Decimator};
use crate::stage2::{Stage2Decimator, Stage2Filter};

/// Receives one PCM frame per processed buffer, one sample per channel in channel order.
///
/// Called from the consumer context, never from the interrupt.
pub trait PcmSink {
    fn on_frame(&mut self, frame: &[i32]);
}

impl<F> PcmSink for F
where F: FnMut(&[i32])
{
    fn on_frame(&mut self, frame: &[i32]) {
        self(frame)
    }
}

/// Where the controller is within a buffer. Outside of `poll` it is always `AwaitingBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    AwaitingBuffer,
    Deinterleaving,
    FilteringChannel(usize),
    EmitFrame,
}

/// Consumer side of the pipeline: turns every published capture buffer into one PCM frame
pub struct PipelineController<'q, 'a> {
    layout: ChannelLayout,
    decimation_factor: usize,
    stage1: Stage1Decimator<'a>,
    history: &'a mut [u32],
    stage2: Vec<Stage2Decimator<'a>, MAX_CHANNELS>,
    receiver: BufferReceiver<'q, 'a>,
    frame: [i32; MAX_CHANNELS],
    state: ControllerState,
    frames: u32,
}

/// Validate `config`, carve up its buffer and build both halves of the pipeline.
///
/// On error nothing has been started and the port has not been armed. On success the producer
/// is returned unarmed; install it with [`crate::producer::IsrSlot::install`] (or call
/// [`PdmProducer::arm`]) once it is somewhere the interrupt handler can reach.
pub fn setup<'q, 'a, P>(
    config: PipelineConfig<'a, P>,
    handoff: &'q mut Handoff<'a>,
) -> Result<(PdmProducer<'q, 'a, P>, PipelineController<'q, 'a>), ConfigError>
where P: PdmPort
{
    config.validate()?;
    let layout = ChannelLayout::new(config.channel_count)?;
    let port_mode = config.port_mode();
    let PipelineConfig {
        channel_count,
        decimation_factor,
        stage1_coefficients,
        stage2_coefficients,
        stage2_shr,
        port,
        buffer,
    } = config;

    let mut stage2 = Vec::new();
    for _ in 0..channel_count {
        let filter = Stage2Filter::new(stage2_coefficients, stage2_shr)?;
        let decimator = Stage2Decimator::new(filter, decimation_factor)?;
        stage2
            .push(decimator)
            .map_err(|_| ConfigError::UnsupportedChannelCount(channel_count))?;
    }

    let total = buffer.len();
    let block = block_words(channel_count, decimation_factor);
    let (captures, history) = buffer.split_at_mut(2 * block);
    let (first, second) = captures.split_at_mut(block);
    init_history(history);

    info!(
        "PDM pipeline: {} mic(s), {:?}, decimation {}, {} stage 2 taps",
        channel_count,
        port_mode,
        decimation_factor,
        stage2_coefficients.len()
    );
    debug!("buffer region {} words: 2 x {} capture, {} history", total, block, history.len());

    let (publisher, receiver) = handoff.split();
    let producer = PdmProducer::new(port, first, second, publisher);
    let controller = PipelineController {
        layout,
        decimation_factor,
        stage1: Stage1Decimator::new(stage1_coefficients),
        history,
        stage2,
        receiver,
        frame: [0; MAX_CHANNELS],
        state: ControllerState::AwaitingBuffer,
        frames: 0,
    };
    Ok((producer, controller))
}

impl<'q, 'a> PipelineController<'q, 'a> {
    /// Process at most one buffer. Returns true if a frame was delivered to `sink`.
    ///
    /// Never waits: if no buffer has been published it returns false straight away.
    pub fn poll<S>(&mut self, sink: &mut S) -> bool
    where S: PcmSink + ?Sized
    {
        let block = match self.receiver.receive() {
            Some(block) => block,
            None => return false,
        };

        self.state = ControllerState::Deinterleaving;
        deinterleave(block, self.layout);

        let channels = self.layout.channels();
        let d = self.decimation_factor;
        for ch in 0..channels {
            self.state = ControllerState::FilteringChannel(ch);
            let window = &mut self.history[ch * PDM_HISTORY_WORDS..(ch + 1) * PDM_HISTORY_WORDS];
            let decimator = &mut self.stage2[ch];
            // The buffer is newest first, so walk it backwards to filter in arrival order
            for k in 0..d {
                let word = block[(d - 1 - k) * channels + ch];
                let sample = self.stage1.process(window, word);
                if let Some(out) = decimator.push(sample) {
                    self.frame[ch] = out;
                }
            }
        }

        if self.receiver.release(block).is_err() {
            error!("PDM free slot occupied, buffer lost");
        }

        self.state = ControllerState::EmitFrame;
        let frame = &self.frame[..channels];
        trace!("frame {}: {:?}", self.frames, frame);
        sink.on_frame(frame);
        self.frames = self.frames.wrapping_add(1);
        self.state = ControllerState::AwaitingBuffer;
        true
    }

    /// Wait, yielding to other tasks, until one frame has been delivered
    pub async fn next_frame<S>(&mut self, sink: &mut S)
    where S: PcmSink + ?Sized
    {
        while !self.poll(sink) {
            yield_now().await;
        }
    }

    /// Consumer task body. Delivers frames forever and never resolves.
    pub async fn run<S>(&mut self, sink: &mut S)
    where S: PcmSink + ?Sized
    {
        loop {
            self.next_frame(sink).await;
        }
    }

    /// Run the consumer on the current thread, for targets without an executor
    pub fn run_blocking<S>(&mut self, sink: &mut S) -> !
    where S: PcmSink + ?Sized
    {
        loop {
            block_on(self.next_frame(sink));
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Frames delivered so far
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Buffers dropped by the producer because this side had not finished with the last one
    pub fn overruns(&self) -> u32 {
        self.receiver.overruns()
    }

    pub fn channel_count(&self) -> usize {
        self.layout.channels()
    }

    /// The per-channel PDM history, `PDM_HISTORY_WORDS` words per channel
    pub fn history(&self) -> &[u32] {
        self.history
    }
}
