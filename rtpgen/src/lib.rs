//! Synthetic RTP traffic generator.
//!
//! Simulates the outbound audio leg of a call: once started, a background
//! task emits one RTP packet per packetization interval, carrying queued
//! application payload when there is some and silence when there is not.
//! The stream can be suspended (sequence numbers and timestamps keep
//! advancing, nothing is sent), resumed, and stopped.

pub mod config;
pub mod error;
pub mod generator;
pub mod queue;
pub mod sink;
pub mod state;
pub mod stats;
pub mod synth;
pub mod ticker;

pub use config::GeneratorConfig;
pub use error::GeneratorError;
pub use generator::{PacketizerFactory, RtpGenerator};
pub use queue::PayloadQueue;
pub use rtpgen_common::RtpPacket;
pub use sink::{PacketSink, RecordingSink, UdpSink};
pub use state::{GeneratorState, StartAction};
pub use stats::StatsSnapshot;
pub use synth::{Packetizer, RtpSynth};
pub use ticker::Ticker;
