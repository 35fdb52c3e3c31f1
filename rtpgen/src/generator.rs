//! Periodic packet emission.
//!
//! [`RtpGenerator`] is the control handle; the emission loop is a tokio
//! task it spawns on the first `start()`. The two only communicate through
//! the [`Lifecycle`] (state + target) and the [`PayloadQueue`].
//!
//! Each loop iteration works out how many packet intervals have elapsed
//! since the session started and emits one packet for every interval not
//! yet covered, so a late wakeup produces a short burst and the long-run
//! packet rate stays exact. State changes are observed once per iteration;
//! a burst already in progress always completes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rtpgen_common::MetricsContext;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::GeneratorConfig;
use crate::error::GeneratorError;
use crate::queue::PayloadQueue;
use crate::sink::PacketSink;
use crate::state::{GeneratorState, Lifecycle, StartAction, Target};
use crate::stats::{GeneratorStats, StatsSnapshot};
use crate::synth::{Packetizer, RtpSynth};
use crate::ticker::Ticker;

/// Builds a fresh packetizer for every spawned session.
pub type PacketizerFactory = Arc<dyn Fn(&GeneratorConfig) -> Box<dyn Packetizer> + Send + Sync>;

/// Number of whole `ptime` intervals between `start` and `now`.
pub fn intervals_elapsed(start: Instant, now: Instant, ptime: Duration) -> u64 {
    // ---
    let elapsed = now.saturating_duration_since(start).as_nanos();
    (elapsed / ptime.as_nanos().max(1)) as u64
}

/// Synthetic outbound RTP stream.
///
/// ```ignore
/// use std::sync::Arc;
/// use rtpgen::{GeneratorConfig, RtpGenerator, UdpSink};
///
/// let sink = Arc::new(UdpSink::bind("0.0.0.0:0").await?);
/// let mut generator = RtpGenerator::new(GeneratorConfig::default())?;
/// generator.start(sink, "127.0.0.1:5004".parse()?)?;
/// generator.enqueue(vec![0xFF; 240]);
/// generator.suspend()?;
/// generator.start(sink, "127.0.0.1:5004".parse()?)?; // resume
/// generator.stop().await?;
/// ```
pub struct RtpGenerator {
    // ---
    config: GeneratorConfig,
    lifecycle: Arc<Lifecycle>,
    queue: PayloadQueue,
    stats: Arc<GeneratorStats>,
    metrics: Option<MetricsContext>,
    make_packetizer: PacketizerFactory,
    worker: Option<JoinHandle<Result<()>>>,
}

impl RtpGenerator {
    // ---
    /// Creates an idle generator in the `Init` state.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        // ---
        config.validate()?;

        Ok(Self {
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            queue: PayloadQueue::new(),
            stats: Arc::new(GeneratorStats::new()),
            metrics: None,
            make_packetizer: Arc::new(|_: &GeneratorConfig| -> Box<dyn Packetizer> {
                Box::new(RtpSynth::new())
            }),
            worker: None,
        })
    }

    /// Mirrors emission counters into `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsContext) -> Self {
        // ---
        self.metrics = Some(metrics);
        self
    }

    /// Replaces the packetizer built for each new session.
    pub fn with_packetizer_factory(mut self, factory: PacketizerFactory) -> Self {
        // ---
        self.make_packetizer = factory;
        self
    }

    /// Packetization settings this generator was built with.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GeneratorState {
        // ---
        self.lifecycle.state()
    }

    /// Handle to the payload queue for producers running elsewhere.
    pub fn queue(&self) -> PayloadQueue {
        // ---
        self.queue.clone()
    }

    /// Queues `payload` for the next transmitted packet that has none.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) {
        // ---
        self.queue.enqueue(payload);
    }

    /// Emission counters, accumulated across every session.
    pub fn stats(&self) -> StatsSnapshot {
        // ---
        self.stats.snapshot()
    }

    /// Whether a spawned emission loop is still running.
    ///
    /// `false` while the state reads `Running` means the loop died on a
    /// fatal error; `stop()` collects it and resets the generator.
    pub fn is_worker_alive(&self) -> bool {
        // ---
        self.worker.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Starts, resumes or retargets the stream.
    ///
    /// - `Init`: spawns a new emission loop with a fresh ticker and
    ///   packetizer.
    /// - `Suspended`: resumes transmission at the next tick.
    /// - `Running`: switches to the new sink/destination at the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::NoRuntime`] when called outside a tokio
    /// runtime, and [`GeneratorError::InvalidStateTransition`] while an
    /// interrupted `stop()` is still pending (call `stop()` again to finish
    /// it). The state is left unchanged either way.
    pub fn start(
        &mut self,
        sink: Arc<dyn PacketSink>,
        destination: SocketAddr,
    ) -> Result<StartAction, GeneratorError> {
        // ---
        let runtime = Handle::try_current().map_err(|_| GeneratorError::NoRuntime)?;

        let action = self.lifecycle.begin_start(Target::new(sink, destination))?;
        match action {
            StartAction::Spawn => {
                let session = Session {
                    config: self.config,
                    packetizer: (self.make_packetizer)(&self.config),
                    queue: self.queue.clone(),
                    stats: Arc::clone(&self.stats),
                    metrics: self.metrics.clone(),
                };
                let lifecycle = Arc::clone(&self.lifecycle);
                self.worker = Some(runtime.spawn(run_emission_loop(lifecycle, session)));

                info!(
                    "Generator started: destination={}, ptime={}ms, {} samples/packet",
                    destination,
                    self.config.ptime_ms(),
                    self.config.samples_per_packet()
                );
            }
            StartAction::Resumed => info!("Generator resumed: destination={}", destination),
            StartAction::Retargeted => debug!("Generator retargeted: destination={}", destination),
        }

        if action != StartAction::Spawn && !self.is_worker_alive() {
            warn!("Emission loop is not running; call stop() to collect its result");
        }

        Ok(action)
    }

    /// Stops transmitting while keeping sequence/timestamp continuity.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidStateTransition`] unless the
    /// generator is `Running`; the state is left unchanged.
    pub fn suspend(&self) -> Result<(), GeneratorError> {
        // ---
        self.lifecycle.suspend()?;
        info!("Generator suspended");
        Ok(())
    }

    /// Stops the stream, waits for the emission loop to exit and returns
    /// to `Init`.
    ///
    /// A no-op from `Init`. The loop notices the request at its next tick,
    /// so this waits at most one packetization interval.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::Worker`] or
    /// [`GeneratorError::WorkerPanicked`] if the loop had already died;
    /// the generator is reset to `Init` either way.
    ///
    /// # Cancellation
    ///
    /// If this future is dropped before it completes, the worker handle is
    /// kept and the generator stays `Stopped`; the next `stop()` finishes
    /// the join.
    pub async fn stop(&mut self) -> Result<(), GeneratorError> {
        // ---
        let prior = self.lifecycle.request_stop();
        let mut outcome = Ok(());

        if let Some(handle) = self.worker.as_mut() {
            let joined = handle.await;
            self.worker = None;

            outcome = match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(GeneratorError::Worker(e)),
                Err(e) if e.is_panic() => Err(GeneratorError::WorkerPanicked),
                Err(e) => {
                    warn!("Emission loop was cancelled: {e}");
                    Ok(())
                }
            };
            info!("Generator stopped (was {})", prior);
        }

        self.lifecycle.clear_target();
        self.lifecycle.reset();
        outcome
    }
}

impl Drop for RtpGenerator {
    fn drop(&mut self) {
        // ---
        // The detached task sees Stopped at its next tick and exits.
        if self.worker.take().is_some() {
            self.lifecycle.request_stop();
        }
    }
}

/// Everything the emission loop owns for one session.
struct Session {
    config: GeneratorConfig,
    packetizer: Box<dyn Packetizer>,
    queue: PayloadQueue,
    stats: Arc<GeneratorStats>,
    metrics: Option<MetricsContext>,
}

impl Session {
    // ---
    /// Advances packetizer state by one interval without transmitting.
    fn advance_silently(&mut self) -> Result<()> {
        // ---
        self.packetizer
            .next_packet(self.config.samples_per_packet(), self.config.payload_type, None)
            .context("packetizer failed while suspended")?;

        self.stats.record_suppressed();
        if let Some(metrics) = &self.metrics {
            metrics.packets_suppressed_total.inc();
        }
        Ok(())
    }

    /// Emits one packet carrying the next queued payload, if any.
    fn transmit(&mut self, target: &Target) -> Result<()> {
        // ---
        let payload = self.queue.dequeue();
        let forwarded = payload.is_some();

        let packet = self
            .packetizer
            .next_packet(self.config.samples_per_packet(), self.config.payload_type, payload)
            .context("packetizer failed")?;

        target
            .sink
            .send_to(&packet, target.destination)
            .with_context(|| format!("failed to send packet seq={}", packet.sequence))?;

        let bytes = packet.wire_len();
        self.stats.record_sent(bytes, forwarded);
        if let Some(metrics) = &self.metrics {
            metrics.packets_sent_total.inc();
            metrics.bytes_sent_total.inc_by(bytes as u64);
            if forwarded {
                metrics.payloads_forwarded_total.inc();
            }
        }
        Ok(())
    }
}

async fn run_emission_loop(lifecycle: Arc<Lifecycle>, session: Session) -> Result<()> {
    // ---
    let result = emission_loop(&lifecycle, session).await;
    if let Err(e) = &result {
        error!("Emission loop terminated: {e:#}");
    }
    result
}

async fn emission_loop(lifecycle: &Lifecycle, mut session: Session) -> Result<()> {
    // ---
    let session_start = Instant::now();
    if !lifecycle.enter_run() {
        debug!("Stop requested before the emission loop ran");
        return Ok(());
    }

    let ptime = session.config.ptime;
    // Deadlines and interval indices share one origin.
    let mut ticker = Ticker::new(session_start, ptime);
    // Index of the first interval not yet emitted.
    let mut next_index: u64 = 0;

    loop {
        let (state, target) = lifecycle.snapshot();
        if state == GeneratorState::Stopped {
            break;
        }

        let elapsed = intervals_elapsed(session_start, Instant::now(), ptime);
        let due = (elapsed + 1).saturating_sub(next_index);
        if due > 1 {
            debug!("Catching up {} intervals ({})", due, state);
        }

        match state {
            GeneratorState::Suspended => {
                for _ in 0..due {
                    session.advance_silently()?;
                }
            }
            _ => {
                let target = target.context("no session target while running")?;
                for _ in 0..due {
                    session.transmit(&target)?;
                }
            }
        }

        session.stats.record_iteration(due);
        if let Some(metrics) = &session.metrics {
            if due > 1 {
                metrics.catchup_packets_total.inc_by(due - 1);
            }
            metrics.payload_queue_depth.set(session.queue.len() as i64);
        }
        next_index = elapsed + 1;

        let deadline = ticker.tick().await;
        if let Some(metrics) = &session.metrics {
            let lag = Instant::now().saturating_duration_since(deadline);
            metrics.tick_lag_seconds.observe(lag.as_secs_f64());
        }
    }

    debug!("Emission loop exited after {} intervals", next_index);
    Ok(())
}
