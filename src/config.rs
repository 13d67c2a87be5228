// src/config.rs
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_PROTO_PORT: u16 = 6543;
pub const DEFAULT_WSAPI_PORT: u16 = 6544;
pub const DEFAULT_HOUSEKEEPING_SECS: u64 = 120;

/// What to do when the backend asks for a tuner the live session is holding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Cancel the conflicting scheduled recording outright.
    CancelRecording,
    /// Cancel only if a later showing exists, otherwise stop live TV.
    PreferLaterShowing,
    /// Always stop live TV.
    StopTv,
}

impl ConflictStrategy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "cancel_recording" | "cancelrec" => Some(Self::CancelRecording),
            "prefer_later" | "haslater" => Some(Self::PreferLaterShowing),
            "stop_tv" | "stoptv" => Some(Self::StopTv),
            _ => None,
        }
    }
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        Self::CancelRecording
    }
}

/// Grouping of host-facing recording listings into directories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupRecordings {
    Never,
    OnlySeries,
    Always,
}

impl GroupRecordings {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Some(Self::Never),
            "" | "series" | "only_series" => Some(Self::OnlySeries),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

impl Default for GroupRecordings {
    fn default() -> Self {
        Self::OnlySeries
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdlMode {
    Always,
    SceneMarkers,
    Never,
}

impl EdlMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "always" => Some(Self::Always),
            "scene" | "scene_markers" => Some(Self::SceneMarkers),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

impl Default for EdlMode {
    fn default() -> Self {
        Self::Always
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub proto_port: u16,
    pub wsapi_port: u16,
    pub security_pin: String,
    /// Hardware address for wake-on-LAN; empty disables wake attempts.
    pub wake_ether: String,
    pub conflict_strategy: ConflictStrategy,
    pub group_recordings: GroupRecordings,
    pub edl_mode: EdlMode,
    /// Include LiveTV recordings in host-facing listings and counts.
    pub livetv_recordings: bool,
    /// Present recordings at their original air date instead of capture time.
    pub use_airdate: bool,
    /// Colour tag wrapped around damaged recording titles; empty disables.
    pub damaged_color: String,
    /// Suggest deletion after a recording is marked fully watched.
    pub prompt_delete_at_end: bool,
    pub block_shutdown: bool,
    pub root_default_group: bool,
    pub tune_delay_secs: u32,
    pub limit_tune_attempts: bool,
    pub placeholder_path: Option<String>,
    pub housekeeping_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            proto_port: DEFAULT_PROTO_PORT,
            wsapi_port: DEFAULT_WSAPI_PORT,
            security_pin: "0000".into(),
            wake_ether: String::new(),
            conflict_strategy: ConflictStrategy::default(),
            group_recordings: GroupRecordings::default(),
            edl_mode: EdlMode::default(),
            livetv_recordings: true,
            use_airdate: false,
            damaged_color: "red".into(),
            prompt_delete_at_end: false,
            block_shutdown: false,
            root_default_group: true,
            tune_delay_secs: 5,
            limit_tune_attempts: true,
            placeholder_path: None,
            housekeeping_secs: DEFAULT_HOUSEKEEPING_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    host: Option<String>,
    proto_port: Option<u16>,
    wsapi_port: Option<u16>,
    security_pin: Option<String>,
    wake_ether: Option<String>,
    conflict_strategy: Option<String>,
    group_recordings: Option<String>,
    edl_mode: Option<String>,
    livetv_recordings: Option<bool>,
    use_airdate: Option<bool>,
    damaged_color: Option<String>,
    prompt_delete_at_end: Option<bool>,
    block_shutdown: Option<bool>,
    root_default_group: Option<bool>,
    tune_delay_secs: Option<u32>,
    limit_tune_attempts: Option<bool>,
    placeholder_path: Option<String>,
    housekeeping_secs: Option<u64>,
}

pub fn load_config() -> AppConfig {
    load_config_from(&PathBuf::from("config.json"))
}

pub fn load_config_from(cfg_path: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();

    match fs::read_to_string(cfg_path) {
        Ok(raw) => match serde_json::from_str::<RawConfig>(&raw) {
            Ok(parsed) => {
                if let Some(host) = parsed.host {
                    cfg.host = host;
                }
                if let Some(port) = parsed.proto_port {
                    cfg.proto_port = port;
                }
                if let Some(port) = parsed.wsapi_port {
                    cfg.wsapi_port = port;
                }
                if let Some(pin) = parsed.security_pin {
                    cfg.security_pin = pin;
                }
                if let Some(ether) = parsed.wake_ether {
                    cfg.wake_ether = ether;
                }
                if let Some(mode) = parsed.conflict_strategy {
                    match ConflictStrategy::from_str(&mode) {
                        Some(strategy) => cfg.conflict_strategy = strategy,
                        None => warn!(
                            "Unknown conflict_strategy `{mode}` in config.json; keeping cancel_recording."
                        ),
                    }
                }
                if let Some(mode) = parsed.group_recordings {
                    match GroupRecordings::from_str(&mode) {
                        Some(group) => cfg.group_recordings = group,
                        None => {
                            warn!("Unknown group_recordings `{mode}` in config.json; keeping series.")
                        }
                    }
                }
                if let Some(mode) = parsed.edl_mode {
                    match EdlMode::from_str(&mode) {
                        Some(edl) => cfg.edl_mode = edl,
                        None => warn!("Unknown edl_mode `{mode}` in config.json; keeping always."),
                    }
                }
                if let Some(v) = parsed.livetv_recordings {
                    cfg.livetv_recordings = v;
                }
                if let Some(v) = parsed.use_airdate {
                    cfg.use_airdate = v;
                }
                if let Some(v) = parsed.damaged_color {
                    cfg.damaged_color = v;
                }
                if let Some(v) = parsed.prompt_delete_at_end {
                    cfg.prompt_delete_at_end = v;
                }
                if let Some(v) = parsed.block_shutdown {
                    cfg.block_shutdown = v;
                }
                if let Some(v) = parsed.root_default_group {
                    cfg.root_default_group = v;
                }
                if let Some(v) = parsed.tune_delay_secs {
                    cfg.tune_delay_secs = v;
                }
                if let Some(v) = parsed.limit_tune_attempts {
                    cfg.limit_tune_attempts = v;
                }
                if parsed.placeholder_path.is_some() {
                    cfg.placeholder_path = parsed.placeholder_path;
                }
                if let Some(v) = parsed.housekeeping_secs {
                    cfg.housekeeping_secs = v.max(10);
                }
                info!("Loaded config from {}", cfg_path.display());
            }
            Err(err) => {
                warn!("Failed to parse config.json ({}). Using defaults.", err);
            }
        },
        Err(_) => {
            info!("No config.json found; using defaults");
        }
    }

    cfg
}
