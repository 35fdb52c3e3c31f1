//! RTP packet structure and serialization.
//!
//! Implements the RFC 3550 fixed header. CSRC lists, header extensions
//! and padding are never produced by the generator and are rejected or
//! skipped on parse.

use anyhow::Result;

/// RTP packet version 2 (as per RFC 3550)
pub const RTP_VERSION: u8 = 2;

/// Size of the fixed RTP header in bytes
pub const RTP_HEADER_LEN: usize = 12;

/// Static payload type for G.711 mu-law (RFC 3551)
pub const PAYLOAD_TYPE_PCMU: u8 = 0;

/// Static payload type for G.711 A-law (RFC 3551)
pub const PAYLOAD_TYPE_PCMA: u8 = 8;

/// Synthesized RTP packet.
///
/// # Protocol Details
///
/// - Version: Always 2 (RFC 3550)
/// - Marker: set on the first packet of a talkspurt
/// - Payload Type: 7-bit, static or dynamic
/// - Sequence: Increments by 1 for each packet
/// - Timestamp: Increments by the sample count of each packet
/// - SSRC: Synchronization source identifier (random per session)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    // ---
    /// Marker bit
    pub marker: bool,

    /// Payload type (0-127)
    pub payload_type: u8,

    /// Packet sequence number (wraps at 65535)
    pub sequence: u16,

    /// RTP timestamp in sample units
    pub timestamp: u32,

    /// Synchronization source identifier
    pub ssrc: u32,

    /// Media payload
    pub payload: Vec<u8>,
}

impl RtpPacket {
    // ---
    /// Creates a new RTP packet without the marker bit.
    ///
    /// # Arguments
    ///
    /// * `payload_type` - RTP payload type
    /// * `sequence` - Packet sequence number
    /// * `timestamp` - RTP timestamp (in sample units)
    /// * `ssrc` - Synchronization source identifier
    /// * `payload` - Media payload
    pub fn new(
        payload_type: u8,
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        payload: Vec<u8>,
    ) -> Self {
        // ---
        Self {
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence,
            timestamp,
            ssrc,
            payload,
        }
    }

    /// Returns the packet with the marker bit set to `marker`.
    pub fn with_marker(mut self, marker: bool) -> Self {
        // ---
        self.marker = marker;
        self
    }

    /// Total size of the serialized packet in bytes.
    pub fn wire_len(&self) -> usize {
        // ---
        RTP_HEADER_LEN + self.payload.len()
    }

    /// Serializes the RTP packet into wire format.
    ///
    /// # Wire Format
    ///
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |V=2|P|X|  CC   |M|     PT      |       sequence number         |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |                           timestamp                           |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// |           synchronization source (SSRC) identifier            |
    /// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
    /// |                           payload...                          |
    /// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    /// ```
    ///
    /// # Errors
    ///
    /// Currently infallible; returns `Result` so sinks can treat
    /// serialization like any other I/O step.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        // ---
        let mut buf = Vec::with_capacity(self.wire_len());

        // V=2, P=0, X=0, CC=0
        buf.push(RTP_VERSION << 6);

        let marker = if self.marker { 0x80 } else { 0x00 };
        buf.push(marker | (self.payload_type & 0x7F));

        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&self.payload);

        Ok(buf)
    }

    /// Deserializes an RTP packet from wire format.
    ///
    /// CSRC entries are skipped. Packets carrying a header extension are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Packet is smaller than the fixed header (12 bytes)
    /// - RTP version is not 2
    /// - The CSRC list runs past the end of the packet
    /// - The extension bit is set
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        // ---
        if data.len() < RTP_HEADER_LEN {
            anyhow::bail!("packet too small: {} bytes", data.len());
        }

        let version = (data[0] >> 6) & 0x03;
        if version != RTP_VERSION {
            anyhow::bail!("invalid RTP version: {}", version);
        }

        if data[0] & 0x10 != 0 {
            anyhow::bail!("RTP header extensions are not supported");
        }

        let csrc_count = (data[0] & 0x0F) as usize;
        let header_len = RTP_HEADER_LEN + csrc_count * 4;
        if data.len() < header_len {
            anyhow::bail!(
                "truncated CSRC list: need {} bytes, have {}",
                header_len,
                data.len()
            );
        }

        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        Ok(Self {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload: data[header_len..].to_vec(),
        })
    }
}
