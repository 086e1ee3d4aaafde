//! End-to-end tests driving the session broker the way the binary does:
//! samples in through the bounded handoff queue, control requests through the
//! control channel, results out through a registered viewer.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use repstream::classifier::StaticClassifier;
use repstream::session::{ControlRequest, SessionBroker, SessionConfig};
use repstream::types::{ExerciseLabel, Sample, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 500-sample trace: 100 quiet samples, five full oscillations of amplitude
/// 30 and period 60 on the z axis, then 100 quiet samples. Gaussian noise of
/// sigma 1 per axis, seeded for determinism.
fn five_rep_trace() -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 1.0).expect("valid distribution");
    let mut jitter = |base: f64| -> i32 { (base + noise.sample(&mut rng)).round() as i32 };

    (0..500)
        .map(|i| {
            let swing = if (100..400).contains(&i) {
                30.0 * (2.0 * std::f64::consts::PI * (i - 100) as f64 / 60.0).sin()
            } else {
                0.0
            };
            Sample::new(jitter(120.0), jitter(-80.0), jitter(4080.0 + swing))
        })
        .collect()
}

struct Harness {
    sample_tx: mpsc::Sender<Sample>,
    control_tx: mpsc::Sender<ControlRequest>,
    viewer_rx: mpsc::UnboundedReceiver<ServerMessage>,
    viewer: repstream::session::ViewerId,
    broker: tokio::task::JoinHandle<()>,
}

async fn start_session(label: ExerciseLabel, config: SessionConfig) -> Harness {
    let broker = SessionBroker::new(Arc::new(StaticClassifier::new(label)), config);
    let registry = broker.registry();
    let (sample_tx, sample_rx) = mpsc::channel(1000);
    let (control_tx, control_rx) = mpsc::channel(8);
    let broker = tokio::spawn(broker.run(sample_rx, control_rx));

    let (viewer, mut viewer_rx) = registry.register();
    control_tx
        .send(ControlRequest::Connected { viewer })
        .await
        .expect("broker alive");
    assert_eq!(viewer_rx.recv().await, Some(ServerMessage::Connected));

    Harness {
        sample_tx,
        control_tx,
        viewer_rx,
        viewer,
        broker,
    }
}

impl Harness {
    async fn feed(&self, samples: &[Sample]) {
        for s in samples {
            self.sample_tx.send(*s).await.expect("queue open");
        }
    }

    /// Collect messages until a status heartbeat for `sample_idx` arrives,
    /// which proves every earlier sample has been processed.
    async fn collect_until_status(&mut self, sample_idx: u64) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(10), self.viewer_rx.recv())
                .await
                .expect("timed out waiting for status")
                .expect("viewer stream ended early");
            let done = matches!(&msg, ServerMessage::Status { sample_idx: idx, .. } if *idx == sample_idx);
            messages.push(msg);
            if done {
                return messages;
            }
        }
    }
}

impl Harness {
    /// Classification results come from their own task, so they may trail the
    /// heartbeat that proved sample processing finished. Look in what we have,
    /// then keep listening.
    async fn exercise_detected(
        &mut self,
        messages: &[ServerMessage],
    ) -> (ExerciseLabel, u64, Option<String>) {
        let pick = |m: &ServerMessage| match m {
            ServerMessage::ExerciseDetected {
                exercise,
                rep_count,
                error,
            } => Some((*exercise, *rep_count, error.clone())),
            _ => None,
        };
        if let Some(found) = messages.iter().find_map(pick) {
            return found;
        }
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(10), self.viewer_rx.recv())
                .await
                .expect("timed out waiting for classification result")
                .expect("viewer stream ended early");
            if let Some(found) = pick(&msg) {
                return found;
            }
        }
    }
}

fn rep_events(messages: &[ServerMessage]) -> Vec<(u64, f64)> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Rep {
                rep_count,
                amplitude,
            } => Some((*rep_count, *amplitude)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn five_oscillations_broadcast_exactly_five_reps() {
    let mut session = start_session(ExerciseLabel::BicepCurl, SessionConfig::default()).await;

    session.feed(&five_rep_trace()).await;
    let messages = session.collect_until_status(500).await;

    let reps = rep_events(&messages);
    let counts: Vec<u64> = reps.iter().map(|(c, _)| *c).collect();
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    for (count, amplitude) in &reps {
        assert!(
            *amplitude > 21.0,
            "rep {} amplitude {} below threshold",
            count,
            amplitude
        );
    }

    // Heartbeats reflect processing order: rep_count never decreases.
    let mut last = 0;
    for msg in &messages {
        if let ServerMessage::Status { rep_count, .. } = msg {
            assert!(*rep_count >= last);
            last = *rep_count;
        }
    }

    drop(session.sample_tx);
    drop(session.control_tx);
    session.broker.await.expect("broker task panicked");
}

#[tokio::test]
async fn auto_detect_classifies_without_resetting_the_count() {
    let config = SessionConfig {
        auto_detect_samples: 30,
        ..SessionConfig::default()
    };
    let mut session = start_session(ExerciseLabel::ShoulderPress, config).await;

    session
        .control_tx
        .send(ControlRequest::StartAutoDetect {
            viewer: session.viewer,
        })
        .await
        .expect("broker alive");
    assert_eq!(
        session.viewer_rx.recv().await,
        Some(ServerMessage::AutoDetectStarted { samples_needed: 30 })
    );

    session.feed(&five_rep_trace()).await;
    let messages = session.collect_until_status(500).await;

    // The buffer filled during the quiet lead-in, so the snapshot count is 0;
    // reps counted afterwards are unaffected by classification.
    let detected = session.exercise_detected(&messages).await;
    assert_eq!(detected, (ExerciseLabel::ShoulderPress, 0, None));

    let counts: Vec<u64> = rep_events(&messages).iter().map(|(c, _)| *c).collect();
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn failed_classification_falls_back_with_error() {
    // Five samples is below the classifier's minimum, forcing the error path.
    let config = SessionConfig {
        auto_detect_samples: 5,
        status_interval: 10,
        ..SessionConfig::default()
    };
    let mut session = start_session(ExerciseLabel::ShoulderPress, config).await;

    session
        .control_tx
        .send(ControlRequest::StartAutoDetect {
            viewer: session.viewer,
        })
        .await
        .expect("broker alive");
    assert_eq!(
        session.viewer_rx.recv().await,
        Some(ServerMessage::AutoDetectStarted { samples_needed: 5 })
    );

    let quiet: Vec<Sample> = (0..10).map(|_| Sample::new(120, -80, 4080)).collect();
    session.feed(&quiet).await;
    let messages = session.collect_until_status(10).await;

    let (exercise, rep_count, error) = session.exercise_detected(&messages).await;
    assert_eq!(exercise, ExerciseLabel::BicepCurl);
    assert_eq!(rep_count, 0);
    assert!(error.is_some(), "error annotation expected on fallback");
}

#[tokio::test]
async fn reset_acks_and_restarts_the_sample_clock() {
    let config = SessionConfig {
        status_interval: 60,
        ..SessionConfig::default()
    };
    let mut session = start_session(ExerciseLabel::BicepCurl, config).await;

    let quiet: Vec<Sample> = (0..120).map(|_| Sample::new(120, -80, 4080)).collect();
    session.feed(&quiet).await;
    session.collect_until_status(120).await;

    session
        .control_tx
        .send(ControlRequest::Reset {
            viewer: session.viewer,
        })
        .await
        .expect("broker alive");
    assert_eq!(session.viewer_rx.recv().await, Some(ServerMessage::ResetAck));

    // The next heartbeat counts from zero again.
    session.feed(&quiet[..60]).await;
    let messages = session.collect_until_status(60).await;
    assert!(messages
        .iter()
        .all(|m| !matches!(m, ServerMessage::Status { sample_idx, .. } if *sample_idx > 60)));
}

#[tokio::test]
async fn full_queue_blocks_the_producer_and_loses_nothing() {
    let (tx, mut rx) = mpsc::channel::<Sample>(4);
    for i in 0..4 {
        tx.try_send(Sample::new(i, 0, 0)).expect("queue has room");
    }
    assert!(tx.try_send(Sample::new(99, 0, 0)).is_err(), "queue is full");

    // Policy: the producer thread parks in blocking_send until the consumer
    // frees a slot.
    let producer_tx = tx.clone();
    let producer = std::thread::spawn(move || {
        producer_tx
            .blocking_send(Sample::new(4, 0, 0))
            .expect("consumer receives");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!producer.is_finished(), "producer should still be blocked");

    drop(tx);
    let mut received = Vec::new();
    while let Some(sample) = rx.recv().await {
        received.push(sample.ax);
    }
    producer.join().expect("producer thread panicked");
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
}
