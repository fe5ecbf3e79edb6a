//! PDM microphone capture and decimation to PCM.
//!
//! An interrupt handler ([`producer::PdmProducer`]) reads 32 bits of PDM data per port event into
//! one of two capture buffers. Whenever a buffer fills it is handed to the consumer
//! ([`pipeline::PipelineController`]), which unpacks the channels, runs each through a 256 tap
//! bit-domain FIR and a decimating word-domain FIR, and delivers one PCM frame per buffer.
//!
//! ```ignore
//! let mut region = [0u32; buffer_size_words(2, DEFAULT_DECIMATION_FACTOR)];
//! let (producer, mut controller) = setup(config, &mut handoff)?;
//! PDM_ISR.install(producer);
//! controller.run(&mut |frame: &[i32]| send(frame)).await;
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

pub mod config;
pub mod deinterleave;
pub mod filters;
#[cfg(feature = "std")]
pub mod generation;
pub mod handoff;
pub mod pipeline;
pub mod port;
pub mod producer;
pub mod stage1;
pub mod stage2;

pub use config::{buffer_size_words, ConfigError, PipelineConfig, PortMode, Stage1Coefficients};
pub use handoff::Handoff;
pub use pipeline::{setup, ControllerState, PcmSink, PipelineController};
pub use port::{PdmPort, SimulatedPort};
pub use producer::{IsrSlot, PdmProducer};
