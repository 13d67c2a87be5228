// src/main.rs
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mythpvr::client::backend::{IdleEventSource, UnavailableTuner};
use mythpvr::client::http::HttpBackend;
use mythpvr::client::{PvrClient, PvrTransport};
use mythpvr::config::load_config;

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cfg = load_config();
    info!("backend: {}:{} (api {})", cfg.host, cfg.proto_port, cfg.wsapi_port);

    let control = match HttpBackend::new(&cfg) {
        Ok(control) => Arc::new(control),
        Err(err) => {
            error!("control link setup failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    let transport = PvrTransport {
        control,
        events: Box::new(IdleEventSource),
        tuner: Arc::new(UnavailableTuner),
    };

    let (signals_tx, signals_rx) = mpsc::channel();
    let client = match PvrClient::connect(cfg, transport, signals_tx) {
        Ok(client) => client,
        Err(err) => {
            error!("connect failed: {err}");
            error!("Hint: check host/wsapi_port/security_pin in config.json.");
            return ExitCode::FAILURE;
        }
    };

    info!("{} ({})", client.backend_name(), client.backend_version());
    info!("channels: {}", client.channel_count());
    for name in client.channel_group_names(false) {
        info!("  group: {name}");
    }
    info!(
        "recordings: {} ({} deleted)",
        client.recordings_count(),
        client.deleted_recordings_count()
    );
    info!("upcoming timers: {}", client.timer_count());
    if let Ok(space) = client.drive_space() {
        info!("drive space: {} / {} KiB used", space.used_kb, space.total_kb);
    }

    // Surface a short window of host signals, then shut down
    while let Ok(signal) = signals_rx.recv_timeout(Duration::from_secs(2)) {
        info!("signal: {signal:?}");
    }
    client.shutdown();
    ExitCode::SUCCESS
}
