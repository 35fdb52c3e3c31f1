//! Integration tests for the generator lifecycle.
//!
//! Runs under tokio's paused clock, so interval arithmetic is exact and a
//! two-second call leg finishes instantly. Packets are captured with
//! [`RecordingSink`] instead of going to the network.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtpgen::{
    GeneratorConfig, GeneratorError, GeneratorState, PacketSink, Packetizer, PacketizerFactory,
    RecordingSink, RtpGenerator, RtpPacket, RtpSynth, StartAction,
};
use tokio::time::{sleep, timeout, Instant};

fn destination(port: u16) -> SocketAddr {
    // ---
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn generator() -> RtpGenerator {
    // ---
    RtpGenerator::new(GeneratorConfig::default()).expect("default config is valid")
}

/// Factory that numbers sessions through the SSRC: 1, 2, 3, ...
fn counting_factory(sessions: Arc<AtomicU32>) -> PacketizerFactory {
    // ---
    Arc::new(move |_: &GeneratorConfig| -> Box<dyn Packetizer> {
        let ssrc = sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(RtpSynth::with_initial_state(ssrc, 0, 0))
    })
}

/// Sink that records when each packet was handed over.
#[derive(Default)]
struct TimedSink {
    sent_at: Mutex<Vec<Instant>>,
}

impl PacketSink for TimedSink {
    fn send_to(&self, _packet: &RtpPacket, _destination: SocketAddr) -> anyhow::Result<()> {
        // ---
        self.sent_at.lock().expect("sink lock").push(Instant::now());
        Ok(())
    }
}

/// Full call leg: run 2s, suspend 1s, resume 2s, stop.
#[tokio::test(start_paused = true)]
async fn test_run_suspend_resume_stop() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    let action = generator
        .start(sink.clone(), destination(5004))
        .expect("start");
    assert_eq!(action, StartAction::Spawn);
    assert_eq!(generator.state(), GeneratorState::Running);

    sleep(Duration::from_millis(2000)).await;
    let sent_before_suspend = sink.count();
    assert!(
        (65..=67).contains(&sent_before_suspend),
        "sent {sent_before_suspend} packets in 2s"
    );

    generator.suspend().expect("suspend");
    assert_eq!(generator.state(), GeneratorState::Suspended);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(sink.count(), sent_before_suspend, "nothing sent while suspended");

    let action = generator
        .start(sink.clone(), destination(5004))
        .expect("resume");
    assert_eq!(action, StartAction::Resumed);
    assert_eq!(generator.state(), GeneratorState::Running);

    sleep(Duration::from_millis(2000)).await;
    let sent_after_resume = sink.count() - sent_before_suspend;
    assert!(
        (65..=68).contains(&sent_after_resume),
        "sent {sent_after_resume} packets after resume"
    );

    let stop_requested = Instant::now();
    generator.stop().await.expect("stop");
    assert!(stop_requested.elapsed() <= Duration::from_millis(30));
    assert_eq!(generator.state(), GeneratorState::Init);

    let stats = generator.stats();
    assert!(
        (32..=34).contains(&stats.packets_suppressed),
        "suppressed {} packets in 1s",
        stats.packets_suppressed
    );
    assert_eq!(stats.packets_sent, sink.count() as u64);
    assert_eq!(stats.catchup_packets, 0);

    // Suppressed intervals still consumed sequence numbers and timestamps.
    let packets = sink.packets();
    let last_before = &packets[sent_before_suspend - 1];
    let first_after = &packets[sent_before_suspend];
    let gap = stats.packets_suppressed as u16 + 1;
    assert_eq!(first_after.sequence, last_before.sequence.wrapping_add(gap));
    assert_eq!(
        first_after.timestamp,
        last_before.timestamp.wrapping_add(u32::from(gap) * 240)
    );

    // One stream throughout: same SSRC, marker only on the very first packet.
    let ssrc = packets[0].ssrc;
    assert!(packets.iter().all(|p| p.ssrc == ssrc));
    assert!(packets[0].marker);
    assert!(packets[1..].iter().all(|p| !p.marker));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_and_timestamp_are_contiguous() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(500)).await;
    generator.stop().await.expect("stop");

    let packets = sink.packets();
    assert!(packets.len() >= 16);
    for pair in packets.windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence.wrapping_add(1));
        assert_eq!(pair[1].timestamp, pair[0].timestamp.wrapping_add(240));
        assert_eq!(pair[1].payload_type, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_init_is_noop() {
    // ---
    let mut generator = generator();
    generator.stop().await.expect("stop from init");
    assert_eq!(generator.state(), GeneratorState::Init);
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(100)).await;

    generator.stop().await.expect("first stop");
    let sent = sink.count();

    generator.stop().await.expect("second stop");
    assert_eq!(generator.state(), GeneratorState::Init);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.count(), sent, "no packets after stop");
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_suspended() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(100)).await;
    generator.suspend().expect("suspend");

    generator.stop().await.expect("stop");
    assert_eq!(generator.state(), GeneratorState::Init);
    assert!(!generator.is_worker_alive());
}

#[tokio::test(start_paused = true)]
async fn test_suspend_rejected_unless_running() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    let err = generator.suspend().expect_err("suspend from init");
    assert!(matches!(
        err,
        GeneratorError::InvalidStateTransition {
            operation: "suspend",
            state: GeneratorState::Init,
        }
    ));
    assert_eq!(generator.state(), GeneratorState::Init);

    generator.start(sink.clone(), destination(5004)).expect("start");
    generator.suspend().expect("suspend from running");

    let err = generator.suspend().expect_err("suspend twice");
    assert_eq!(err.to_string(), "suspend() is not allowed in the suspended state");
    assert_eq!(generator.state(), GeneratorState::Suspended);

    generator.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn test_suspend_before_first_tick_sends_nothing() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    // The worker has not been polled yet when the suspend lands.
    generator.start(sink.clone(), destination(5004)).expect("start");
    generator.suspend().expect("suspend");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.count(), 0);
    assert!(generator.stats().packets_suppressed >= 1);
    assert_eq!(generator.state(), GeneratorState::Suspended);

    generator.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn test_late_wakeup_catches_up() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    tokio::task::yield_now().await;
    assert_eq!(sink.count(), 1);

    // Jump the clock ten intervals at once, as if the runtime stalled.
    tokio::time::advance(Duration::from_millis(300)).await;
    // Idle until the worker has handled the overdue tick.
    sleep(Duration::from_millis(1)).await;

    assert_eq!(sink.count(), 11);
    let stats = generator.stats();
    assert_eq!(stats.catchup_packets, 9);

    let packets = sink.packets();
    for pair in packets.windows(2) {
        assert_eq!(pair[1].sequence, pair[0].sequence.wrapping_add(1));
    }

    generator.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_retargets() {
    // ---
    let mut generator = generator();
    let first = Arc::new(RecordingSink::new());
    let second = Arc::new(RecordingSink::new());

    generator.start(first.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(100)).await;

    let action = generator
        .start(second.clone(), destination(6000))
        .expect("retarget");
    assert_eq!(action, StartAction::Retargeted);
    assert_eq!(generator.state(), GeneratorState::Running);

    let sent_to_first = first.count();
    sleep(Duration::from_millis(100)).await;
    generator.stop().await.expect("stop");

    assert_eq!(first.count(), sent_to_first);
    assert!(second.count() >= 3);
    assert!(first.destinations().iter().all(|d| d.port() == 5004));
    assert!(second.destinations().iter().all(|d| d.port() == 6000));

    // Same stream, new destination.
    let last_first = first.packets().pop().expect("packets to first sink");
    let first_second = &second.packets()[0];
    assert_eq!(first_second.ssrc, last_first.ssrc);
    assert_eq!(first_second.sequence, last_first.sequence.wrapping_add(1));
}

#[tokio::test(start_paused = true)]
async fn test_restart_builds_fresh_session() {
    // ---
    let sessions = Arc::new(AtomicU32::new(0));
    let mut generator = generator().with_packetizer_factory(counting_factory(sessions.clone()));
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(50)).await;
    generator.stop().await.expect("stop");
    let first_session = sink.count();

    let action = generator.start(sink.clone(), destination(5004)).expect("restart");
    assert_eq!(action, StartAction::Spawn);
    sleep(Duration::from_millis(50)).await;
    generator.stop().await.expect("stop");

    assert_eq!(sessions.load(Ordering::SeqCst), 2);

    let packets = sink.packets();
    let restarted = &packets[first_session];
    assert_eq!(packets[0].ssrc, 1);
    assert_eq!(restarted.ssrc, 2);
    assert_eq!(restarted.sequence, 0);
    assert!(restarted.marker);

    // Counters carry across sessions.
    assert_eq!(generator.stats().packets_sent, packets.len() as u64);
}

#[tokio::test(start_paused = true)]
async fn test_queue_fed_from_another_task() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());
    let queue = generator.queue();

    let producer = tokio::spawn(async move {
        for i in 0..5u8 {
            queue.enqueue(vec![i; 160]);
            sleep(Duration::from_millis(30)).await;
        }
    });

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(400)).await;
    producer.await.expect("producer task");
    generator.stop().await.expect("stop");

    let forwarded: Vec<u8> = sink
        .packets()
        .iter()
        .filter(|p| p.payload.len() == 160)
        .map(|p| p.payload[0])
        .collect();
    assert_eq!(forwarded, vec![0, 1, 2, 3, 4]);
    assert_eq!(generator.stats().payloads_forwarded, 5);
    assert!(generator.queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pcma_silence_filler() {
    // ---
    let config = GeneratorConfig {
        payload_type: 8,
        ..Default::default()
    };
    let mut generator = RtpGenerator::new(config).expect("generator");
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(10)).await;
    generator.stop().await.expect("stop");

    let packet = &sink.packets()[0];
    assert_eq!(packet.payload_type, 8);
    assert_eq!(packet.payload, vec![0xD5; 240]);
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_worker() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(100)).await;

    drop(generator);
    let sent = sink.count();

    sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.count(), sent);
}

#[tokio::test(start_paused = true)]
async fn test_stop_returns_within_one_interval() {
    // ---
    let config = GeneratorConfig {
        ptime: Duration::from_millis(200),
        ..Default::default()
    };
    let mut generator = RtpGenerator::new(config).expect("generator");
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(10)).await;

    let stop_requested = Instant::now();
    generator.stop().await.expect("stop");
    assert!(stop_requested.elapsed() <= Duration::from_millis(200));
    assert_eq!(sink.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_stop_blocks_restart_until_joined() {
    // ---
    let config = GeneratorConfig {
        ptime: Duration::from_millis(200),
        ..Default::default()
    };
    let mut generator = RtpGenerator::new(config).expect("generator");
    let sink = Arc::new(RecordingSink::new());

    generator.start(sink.clone(), destination(5004)).expect("start");
    sleep(Duration::from_millis(10)).await;

    // The worker sleeps until its next tick, so this gives up first.
    let interrupted = timeout(Duration::from_millis(1), generator.stop()).await;
    assert!(interrupted.is_err());
    assert_eq!(generator.state(), GeneratorState::Stopped);

    let err = generator
        .start(sink.clone(), destination(5004))
        .expect_err("start while the old worker is unjoined");
    assert!(matches!(
        err,
        GeneratorError::InvalidStateTransition {
            operation: "start",
            state: GeneratorState::Stopped,
        }
    ));

    generator.stop().await.expect("finish stop");
    assert_eq!(generator.state(), GeneratorState::Init);
    assert!(!generator.is_worker_alive());

    let before = sink.count();
    let action = generator.start(sink.clone(), destination(5004)).expect("restart");
    assert_eq!(action, StartAction::Spawn);
    sleep(Duration::from_millis(1000)).await;
    generator.stop().await.expect("stop");

    let after_restart = sink.count() - before;
    assert!(
        (5..=6).contains(&after_restart),
        "sent {after_restart} packets in 1s at 200ms ptime"
    );
}

#[tokio::test(start_paused = true)]
async fn test_spawn_latency_and_tick_lag_keep_one_packet_per_tick() {
    // ---
    let mut generator = generator();
    let sink = Arc::new(TimedSink::default());
    let origin = Instant::now();

    generator.start(sink.clone(), destination(5004)).expect("start");
    // The worker is first polled 5 ms after start().
    tokio::time::advance(Duration::from_millis(5)).await;

    // On-time ticks at 35, 65 and 95 ms.
    sleep(Duration::from_millis(100)).await;

    // Wake 6 ms late for the 125 ms tick.
    tokio::time::advance(Duration::from_millis(26)).await;
    sleep(Duration::from_millis(1)).await;

    // Back on the grid: 155, 185, 215 ms.
    sleep(Duration::from_millis(100)).await;
    generator.stop().await.expect("stop");

    let offsets: Vec<u64> = sink
        .sent_at
        .lock()
        .expect("sink lock")
        .iter()
        .map(|at| (*at - origin).as_millis() as u64)
        .collect();
    assert_eq!(offsets, vec![5, 35, 65, 95, 131, 155, 185, 215]);
    assert_eq!(generator.stats().catchup_packets, 0);
}
