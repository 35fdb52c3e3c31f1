//! Prometheus metrics (Rust `prometheus` crate).
//!
//! One `MetricsContext` is intended per process. The generator library
//! only ever increments the handles; whether the registry is scraped is up
//! to the binary.

use anyhow::Result;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Buckets for emission-loop wakeup lag, in seconds.
///
/// The loop runs at packetization cadence (tens of milliseconds), so
/// anything past 100 ms means several packets went out as a catch-up burst.
const TICK_LAG_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.002, 0.005, 0.010, 0.020, 0.030, 0.050, 0.100,
];

/// Configuration for the built-in Prometheus scrape endpoint.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    // ---
    /// Address to bind, e.g. `127.0.0.1:9100`.
    pub bind: SocketAddr,
}

impl MetricsServerConfig {
    // ---
    pub fn new(bind: SocketAddr) -> Self {
        // ---
        Self { bind }
    }
}

/// Prometheus registry plus the generator's metric handles.
///
/// Cloning is cheap; every clone shares the same underlying counters.
#[derive(Clone)]
pub struct MetricsContext {
    // ---
    registry: Registry,

    // Emission counters
    pub packets_sent_total: IntCounter,
    pub bytes_sent_total: IntCounter,
    pub packets_suppressed_total: IntCounter,
    pub catchup_packets_total: IntCounter,
    pub payloads_forwarded_total: IntCounter,

    // Queue gauge
    pub payload_queue_depth: IntGauge,

    // Wakeup lag behind the ideal tick deadline (seconds)
    pub tick_lag_seconds: Histogram,
}

impl MetricsContext {
    // ---
    /// Create a new registry and register the generator metrics.
    ///
    /// `process_name` is applied as a constant label (`process=<name>`).
    pub fn new(process_name: &str) -> Result<Self> {
        // ---
        let registry = Registry::new_custom(
            Some("rtpgen".into()),
            Some(prometheus::labels! { "process".to_string() => process_name.to_string() }),
        )?;

        let packets_sent_total = IntCounter::with_opts(Opts::new(
            "rtp_packets_sent_total",
            "Total RTP packets handed to the transmission sink",
        ))?;
        let bytes_sent_total = IntCounter::with_opts(Opts::new(
            "rtp_bytes_sent_total",
            "Total serialized RTP bytes handed to the transmission sink",
        ))?;
        let packets_suppressed_total = IntCounter::with_opts(Opts::new(
            "rtp_packets_suppressed_total",
            "Packets synthesized but not transmitted while suspended",
        ))?;
        let catchup_packets_total = IntCounter::with_opts(Opts::new(
            "rtp_catchup_packets_total",
            "Packets emitted beyond the first in a single loop iteration",
        ))?;
        let payloads_forwarded_total = IntCounter::with_opts(Opts::new(
            "rtp_payloads_forwarded_total",
            "Queued application payloads carried by transmitted packets",
        ))?;

        let payload_queue_depth = IntGauge::with_opts(Opts::new(
            "payload_queue_depth",
            "Application payloads waiting for transmission",
        ))?;

        let tick_lag_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tick_lag_seconds",
                "Delay between the ideal tick deadline and the loop waking (seconds)",
            )
            .buckets(TICK_LAG_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(packets_sent_total.clone()))?;
        registry.register(Box::new(bytes_sent_total.clone()))?;
        registry.register(Box::new(packets_suppressed_total.clone()))?;
        registry.register(Box::new(catchup_packets_total.clone()))?;
        registry.register(Box::new(payloads_forwarded_total.clone()))?;
        registry.register(Box::new(payload_queue_depth.clone()))?;
        registry.register(Box::new(tick_lag_seconds.clone()))?;

        Ok(Self {
            registry,
            packets_sent_total,
            bytes_sent_total,
            packets_suppressed_total,
            catchup_packets_total,
            payloads_forwarded_total,
            payload_queue_depth,
            tick_lag_seconds,
        })
    }

    /// Gather metric families from this registry.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        // ---
        self.registry.gather()
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<Vec<u8>> {
        // ---
        encode_registry(&self.registry)
    }

    /// Spawns a minimal HTTP server that serves `GET /metrics`.
    pub fn spawn_metrics_server(&self, cfg: MetricsServerConfig) -> JoinHandle<Result<()>> {
        // ---
        let registry = Arc::new(self.registry.clone());
        tokio::spawn(async move {
            // ---
            let make_svc = make_service_fn(move |_conn| {
                let registry = Arc::clone(&registry);
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req| {
                        let registry = Arc::clone(&registry);
                        async move { handle_metrics_request(req, registry).await }
                    }))
                }
            });

            let server = Server::try_bind(&cfg.bind)?.serve(make_svc);
            info!("Metrics endpoint listening on http://{}/metrics", cfg.bind);
            server.await.map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        })
    }
}

fn encode_registry(registry: &Registry) -> Result<Vec<u8>> {
    // ---
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(buffer)
}

async fn handle_metrics_request(
    req: Request<Body>,
    registry: Arc<Registry>,
) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match encode_registry(&registry) {
            Ok(buffer) => {
                let mut resp = Response::new(Body::from(buffer));
                resp.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                Ok(resp)
            }
            Err(e) => {
                let mut resp = Response::new(Body::from(format!("encode error: {e}")));
                *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                Ok(resp)
            }
        },
        _ => {
            let mut resp = Response::new(Body::from("not found"));
            *resp.status_mut() = StatusCode::NOT_FOUND;
            Ok(resp)
        }
    }
}
