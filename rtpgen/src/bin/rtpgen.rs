//! Synthetic RTP traffic generator - CLI binary.
//!
//! Streams a simulated call leg to a UDP destination: runs, optionally
//! pauses and resumes, then stops and reports what was sent.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rtpgen::{GeneratorConfig, RtpGenerator, UdpSink};
use rtpgen_common::{init_tracing, ColorWhen, MetricsContext, MetricsServerConfig};

/// Synthetic RTP traffic generator - simulate an outbound call leg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    // ---
    /// Remote address (IP:port) to send to
    #[arg(short, long, default_value = "127.0.0.1:5004")]
    remote: SocketAddr,

    /// Local address to send from
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Packetization interval in milliseconds
    #[arg(short = 't', long, default_value_t = rtpgen::config::DEFAULT_PTIME_MS)]
    ptime_ms: u64,

    /// RTP clock rate in Hz
    #[arg(long, default_value_t = rtpgen::config::DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// RTP payload type (0 = PCMU, 8 = PCMA)
    #[arg(long, default_value_t = rtpgen::config::DEFAULT_PAYLOAD_TYPE)]
    payload_type: u8,

    /// Raw pre-encoded payload to send, split into one chunk per packet.
    /// Silence is sent once it runs out.
    #[arg(short, long)]
    payload_file: Option<PathBuf>,

    /// How long to stream before suspending (0 = until Ctrl-C)
    #[arg(long, default_value_t = 2000)]
    run_ms: u64,

    /// How long to stay suspended (0 = skip suspend/resume)
    #[arg(long, default_value_t = 0)]
    suspend_ms: u64,

    /// How long to stream after resuming
    #[arg(long, default_value_t = 2000)]
    resume_ms: u64,

    /// Prometheus metrics bind address (serves `GET /metrics`)
    #[arg(long)]
    metrics_bind: Option<SocketAddr>,

    /// Coloring (auto, always, never)
    #[arg(long, default_value = "auto")]
    color: ColorWhen,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let args = Args::parse();

    init_tracing(args.color)?;

    info!("Starting rtpgen v{VERSION}");
    info!("Remote address: {}", args.remote);
    info!(
        "Packetization: {}ms @ {}Hz, PT {}",
        args.ptime_ms, args.sample_rate, args.payload_type
    );

    let config = GeneratorConfig {
        ptime: Duration::from_millis(args.ptime_ms),
        sample_rate: args.sample_rate,
        payload_type: args.payload_type,
    };

    let metrics = MetricsContext::new("rtpgen")?;
    let _metrics_task = args
        .metrics_bind
        .map(|bind| metrics.spawn_metrics_server(MetricsServerConfig::new(bind)));

    let mut generator = RtpGenerator::new(config)
        .context("invalid packetization settings")?
        .with_metrics(metrics);

    if let Some(path) = &args.payload_file {
        let chunks = load_payload(path, config.samples_per_packet() as usize).await?;
        info!("Queued {} payload chunks from {}", chunks.len(), path.display());
        for chunk in chunks {
            generator.enqueue(chunk);
        }
    }

    let sink = Arc::new(UdpSink::bind(&args.bind).await?);
    info!("Sending from {}", sink.local_addr()?);

    generator.start(sink.clone(), args.remote)?;

    if args.run_ms == 0 {
        info!("Streaming until Ctrl-C");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
    } else {
        tokio::time::sleep(Duration::from_millis(args.run_ms)).await;

        if args.suspend_ms > 0 {
            generator.suspend()?;
            tokio::time::sleep(Duration::from_millis(args.suspend_ms)).await;
            generator.start(sink.clone(), args.remote)?;
            tokio::time::sleep(Duration::from_millis(args.resume_ms)).await;
        }
    }

    generator.stop().await?;

    let stats = generator.stats();
    let (_, _, dropped) = sink.stats();
    info!(
        "Transmission complete: {} packets, {} bytes, {} suppressed, {} catch-up, {} dropped",
        stats.packets_sent,
        stats.bytes_sent,
        stats.packets_suppressed,
        stats.catchup_packets,
        dropped
    );

    Ok(())
}

/// Reads `path` and splits it into per-packet chunks.
async fn load_payload(path: &Path, chunk_len: usize) -> Result<Vec<Vec<u8>>> {
    // ---
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read payload file: {}", path.display()))?;

    Ok(data.chunks(chunk_len.max(1)).map(<[u8]>::to_vec).collect())
}
