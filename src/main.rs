use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use repstream::classifier::StaticClassifier;
use repstream::detector::DetectorConfig;
use repstream::pipeline::PipelineConfig;
use repstream::session::{SessionBroker, SessionConfig};
use repstream::source::SampleSource;
use repstream::websocket::{handle_websocket, AppState};
use repstream::FALLBACK_LABEL;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Real-time rep counter: streams accelerometer samples through the online
/// pipeline and broadcasts results to WebSocket viewers.
#[derive(Parser, Debug)]
#[command(name = "repstream", version, about)]
struct Args {
    /// Serial device delivering raw samples
    #[arg(long, env = "REPSTREAM_SERIAL_PORT", default_value = "/dev/ttyACM0")]
    serial_port: String,

    /// Serial baud rate
    #[arg(long, env = "REPSTREAM_BAUD_RATE", default_value_t = 115200)]
    baud_rate: u32,

    /// Address for the viewer-facing WebSocket listener
    #[arg(long, env = "REPSTREAM_BIND", default_value = "0.0.0.0:8765")]
    bind: SocketAddr,

    /// Replay a captured trace file instead of reading the serial device
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Pacing between replayed samples, in milliseconds
    #[arg(long, default_value_t = 10)]
    replay_interval_ms: u64,

    /// Capacity of the source-to-consumer handoff queue
    #[arg(long, default_value_t = 1000)]
    queue_capacity: usize,

    /// Minimum peak-to-valley amplitude counted as a rep
    #[arg(long, default_value_t = 21.0)]
    amplitude_threshold: f64,

    /// Minimum sample spacing between counted reps
    #[arg(long, default_value_t = 20)]
    min_samples_between_reps: u64,

    /// Recent-sample window for the adaptive baseline
    #[arg(long, default_value_t = 50)]
    baseline_window: usize,

    /// Hysteresis margin confirming peak/valley turns
    #[arg(long, default_value_t = 3.0)]
    hysteresis: f64,

    /// Samples before PCA projection activates
    #[arg(long, default_value_t = 30)]
    pca_warmup: usize,

    /// EMA smoothing factor (lower is smoother)
    #[arg(long, default_value_t = 0.15)]
    smooth_alpha: f64,

    /// Samples collected per auto-detect classification
    #[arg(long, default_value_t = 200)]
    auto_detect_samples: usize,

    /// Status heartbeat interval, in samples
    #[arg(long, default_value_t = 50)]
    status_interval: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            pipeline: PipelineConfig {
                detector: DetectorConfig {
                    amplitude_threshold: self.amplitude_threshold,
                    min_samples_between_reps: self.min_samples_between_reps,
                    baseline_window: self.baseline_window,
                    hysteresis: self.hysteresis,
                },
                pca_warmup: self.pca_warmup,
                smooth_alpha: self.smooth_alpha,
            },
            auto_detect_samples: self.auto_detect_samples,
            status_interval: self.status_interval,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repstream=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("starting repstream");

    // Open the source first so startup fails fast on a bad device or trace.
    let source = match &args.replay {
        Some(path) => SampleSource::replay(
            path,
            Duration::from_millis(args.replay_interval_ms),
        )
        .with_context(|| format!("cannot replay trace {}", path.display()))?,
        None => SampleSource::serial(&args.serial_port, args.baud_rate)
            .with_context(|| format!("cannot open serial port {}", args.serial_port))?,
    };

    let (control_tx, control_rx) = mpsc::channel(32);
    let shutdown = Arc::new(AtomicBool::new(false));

    // No trained model is bundled; a real classifier plugs in through the
    // same trait.
    let broker = SessionBroker::new(
        Arc::new(StaticClassifier::new(FALLBACK_LABEL)),
        args.session_config(),
    );
    let state = AppState {
        registry: broker.registry(),
        control: control_tx,
    };
    let broker_handle = tokio::spawn(broker.start(
        source,
        control_rx,
        args.queue_capacity,
        shutdown.clone(),
    ));

    let app = Router::new()
        .route("/ws", get(handle_websocket))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("cannot bind {}", args.bind))?;
    info!("listening on {}", args.bind);
    info!("WebSocket endpoint: ws://{}/ws", args.bind);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the source at its next read opportunity, then tear down the
    // consumer loop.
    shutdown.store(true, Ordering::Relaxed);
    broker_handle.abort();

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to install ctrl-c handler: {}", e);
        return;
    }
    info!("shutdown requested");
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
