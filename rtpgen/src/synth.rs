//! RTP packet synthesis.
//!
//! The emission loop has no codec knowledge: it asks a [`Packetizer`] for
//! the next packet of `samples` samples, optionally carrying a queued
//! payload, and the packetizer owns sequence numbers, timestamps and
//! filler.

use anyhow::Result;
use rand::Rng;
use rtpgen_common::rtp::{PAYLOAD_TYPE_PCMA, PAYLOAD_TYPE_PCMU};
use rtpgen_common::RtpPacket;
use tracing::trace;

/// Produces consecutive RTP packets for one stream.
///
/// Every call advances the sequence number by one and the timestamp by
/// `samples`, whether or not a payload was supplied and whether or not
/// the caller ends up transmitting the packet.
pub trait Packetizer: Send {
    /// Synthesizes the next packet.
    ///
    /// # Errors
    ///
    /// Implementations fail only on conditions the caller cannot recover
    /// from; the emission loop treats any error as fatal.
    fn next_packet(
        &mut self,
        samples: u32,
        payload_type: u8,
        payload: Option<Vec<u8>>,
    ) -> Result<RtpPacket>;
}

/// Filler byte that decodes to silence for the given payload type.
///
/// G.711 mu-law silence is 0xFF and A-law silence is 0xD5; anything else
/// gets zeros.
pub fn silence_byte(payload_type: u8) -> u8 {
    // ---
    match payload_type {
        PAYLOAD_TYPE_PCMU => 0xFF,
        PAYLOAD_TYPE_PCMA => 0xD5,
        _ => 0x00,
    }
}

/// Packet synthesizer with random SSRC and random initial sequence and
/// timestamp, per RFC 3550 section 5.1.
///
/// Without a payload it emits `samples` bytes of silence filler, which is
/// the right size for 8-bit-per-sample codecs such as G.711.
#[derive(Debug, Clone)]
pub struct RtpSynth {
    // ---
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    marker_pending: bool,
}

impl Default for RtpSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpSynth {
    // ---
    /// Creates a synthesizer with random SSRC, sequence and timestamp.
    pub fn new() -> Self {
        // ---
        let mut rng = rand::thread_rng();
        Self::with_initial_state(rng.gen(), rng.gen(), rng.gen())
    }

    /// Creates a synthesizer with explicit starting values.
    pub fn with_initial_state(ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        // ---
        Self {
            ssrc,
            sequence,
            timestamp,
            marker_pending: true,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }
}

impl Packetizer for RtpSynth {
    fn next_packet(
        &mut self,
        samples: u32,
        payload_type: u8,
        payload: Option<Vec<u8>>,
    ) -> Result<RtpPacket> {
        // ---
        let payload =
            payload.unwrap_or_else(|| vec![silence_byte(payload_type); samples as usize]);

        let packet =
            RtpPacket::new(payload_type, self.sequence, self.timestamp, self.ssrc, payload)
                .with_marker(self.marker_pending);

        trace!(
            "Synthesized seq={} ts={} marker={} len={}",
            packet.sequence,
            packet.timestamp,
            packet.marker,
            packet.payload.len()
        );

        self.marker_pending = false;
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(samples);

        Ok(packet)
    }
}
