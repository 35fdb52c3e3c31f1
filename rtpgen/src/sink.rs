//! Transmission sinks for synthesized packets.
//!
//! A sink is anything that can take a packet plus a destination. Errors a
//! sink returns are fatal to the emission loop, so sinks decide for
//! themselves which failures are worth stopping the stream for.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rtpgen_common::RtpPacket;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Accepts synthesized packets for transmission.
///
/// Called from the emission loop's task once per transmitted packet, so
/// implementations must not block for long.
pub trait PacketSink: Send + Sync {
    /// Sends `packet` to `destination`.
    ///
    /// # Errors
    ///
    /// Any error terminates the emission loop.
    fn send_to(&self, packet: &RtpPacket, destination: SocketAddr) -> Result<()>;
}

/// UDP sink backed by a tokio socket bound to an ephemeral port.
///
/// Sends are non-blocking. A full socket buffer drops the packet (counted
/// and logged), since a late RTP packet is worthless anyway. Every other
/// socket error is returned.
///
/// # Example
///
/// ```ignore
/// use rtpgen::sink::UdpSink;
///
/// // Async context required
/// let sink = UdpSink::bind("0.0.0.0:0").await.unwrap();
/// ```
#[derive(Debug)]
pub struct UdpSink {
    // ---
    socket: UdpSocket,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_dropped: AtomicU64,
}

impl UdpSink {
    // ---
    /// Binds a UDP socket on `local_addr` (use port 0 for ephemeral).
    ///
    /// # Errors
    ///
    /// Returns error if socket binding fails.
    pub async fn bind(local_addr: &str) -> Result<Self> {
        // ---
        let socket = UdpSocket::bind(local_addr)
            .await
            .with_context(|| format!("failed to bind UDP socket to {local_addr}"))?;

        // try_send_to reports WouldBlock until the reactor has seen the
        // socket become writable at least once.
        socket
            .writable()
            .await
            .context("UDP socket never became writable")?;

        debug!("UDP sink bound to {}", socket.local_addr()?);

        Ok(Self {
            socket,
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        // ---
        Ok(self.socket.local_addr()?)
    }

    /// Returns `(packets_sent, bytes_sent, packets_dropped)`.
    pub fn stats(&self) -> (u64, u64, u64) {
        // ---
        (
            self.packets_sent.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.packets_dropped.load(Ordering::Relaxed),
        )
    }
}

impl PacketSink for UdpSink {
    fn send_to(&self, packet: &RtpPacket, destination: SocketAddr) -> Result<()> {
        // ---
        let data = packet
            .serialize()
            .context("failed to serialize RTP packet")?;

        match self.socket.try_send_to(&data, destination) {
            Ok(bytes) => {
                let sent = self.packets_sent.fetch_add(1, Ordering::Relaxed) + 1;
                self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);

                if sent.is_multiple_of(100) {
                    debug!(
                        "Sent {} packets to {} - seq={}",
                        sent, destination, packet.sequence
                    );
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Socket buffer full, dropped packet seq={} to {}",
                    packet.sequence, destination
                );
                Ok(())
            }
            Err(e) => Err(e).with_context(|| {
                format!(
                    "failed to send packet seq={} to {}",
                    packet.sequence, destination
                )
            }),
        }
    }
}

/// In-memory sink that keeps every packet it is given.
///
/// Stands in for the network in test harnesses. Can be told to start
/// failing after a number of packets to exercise fatal-error handling.
#[derive(Debug, Default)]
pub struct RecordingSink {
    // ---
    sent: Mutex<Vec<(RtpPacket, SocketAddr)>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    /// A sink that accepts `limit` packets and fails every send after.
    pub fn failing_after(limit: usize) -> Self {
        // ---
        Self {
            sent: Mutex::default(),
            fail_after: Some(limit),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(RtpPacket, SocketAddr)>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of packets accepted so far.
    pub fn count(&self) -> usize {
        // ---
        self.lock().len()
    }

    /// Copies of the accepted packets, in send order.
    pub fn packets(&self) -> Vec<RtpPacket> {
        // ---
        self.lock().iter().map(|(packet, _)| packet.clone()).collect()
    }

    /// Destinations of the accepted packets, in send order.
    pub fn destinations(&self) -> Vec<SocketAddr> {
        // ---
        self.lock().iter().map(|(_, dest)| *dest).collect()
    }
}

impl PacketSink for RecordingSink {
    fn send_to(&self, packet: &RtpPacket, destination: SocketAddr) -> Result<()> {
        // ---
        let mut sent = self.lock();
        if let Some(limit) = self.fail_after {
            if sent.len() >= limit {
                anyhow::bail!("recording sink refused packet seq={}", packet.sequence);
            }
        }
        sent.push((packet.clone(), destination));
        Ok(())
    }
}
