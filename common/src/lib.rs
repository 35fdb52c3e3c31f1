//! Shared utilities for the RTP traffic generator.
//!
//! This crate provides the RTP packet structure, the CLI color policy and
//! the observability setup (tracing + Prometheus) used by the generator
//! library and its binary.

pub mod cli;
pub mod observability;
pub mod rtp;

pub use cli::ColorWhen;
pub use observability::{init_tracing, MetricsContext, MetricsServerConfig};
pub use rtp::RtpPacket;
