// src/client/backend.rs
//! Seams towards the backend. The wire transport behind these traits is not
//! part of the synchronization core; `http.rs` ships a reference control
//! link and hosts may plug their own.

use std::time::Duration;

use crate::client::edl::EditMark;
use crate::client::errors::{BackendError, ConnectError};
use crate::client::types::{
    BackendEvent, Channel, ChannelId, DupMethod, MarkUnit, ProgramRef, RecStatus,
    RecordingRecord, SeekWhence, SignalSnapshot, TimerKind,
};

#[derive(Clone, Debug)]
pub struct VideoSource {
    pub source_id: u32,
    pub source_name: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DriveSpace {
    pub total_kb: i64,
    pub used_kb: i64,
}

/// One guide (EPG) entry as returned by the backend.
#[derive(Clone, Debug, Default)]
pub struct GuideEntry {
    pub channel_id: ChannelId,
    pub callsign: String,
    pub start_time: i64,
    pub end_time: i64,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub season: u32,
    pub episode: u32,
    pub series_id: String,
}

/// A scheduling rule as the backend stores it.
#[derive(Clone, Debug, Default)]
pub struct RuleSpec {
    /// Backend rule id; 0 before the rule exists.
    pub rule_id: u32,
    pub kind: TimerKind,
    /// Absent means the rule applies to all channels (EPG-text search).
    pub channel_id: Option<ChannelId>,
    pub callsign: String,
    /// Absent start/end means "any time".
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Non-empty enables EPG-text-search matching.
    pub search_text: String,
    pub priority: i32,
    pub expiration: u32,
    pub recording_group: u32,
    pub dup_method: DupMethod,
    pub inactive: bool,
    pub margin_start_mins: u32,
    pub margin_end_mins: u32,
}

/// One concrete occurrence produced by a rule.
#[derive(Clone, Debug, Default)]
pub struct Occurrence {
    pub rule_id: u32,
    pub channel_id: ChannelId,
    pub start_time: i64,
    pub end_time: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: RecStatus,
}

/// Synchronous control session towards the backend. Implementations must be
/// callable from any thread; calls may block on network I/O.
pub trait BackendControl: Send + Sync {
    /// Open (or reopen) the control session.
    fn open(&self) -> Result<(), ConnectError>;
    fn close(&self);

    /// Service API version, 0 when the API is unavailable.
    fn check_service(&self) -> u32;
    fn server_hostname(&self) -> String;
    fn backend_version(&self) -> String;

    /// True when the session went silently unresponsive since the last
    /// housekeeping pass.
    fn is_stale(&self) -> bool {
        false
    }
    fn clear_stale(&self) {}

    fn video_sources(&self) -> Result<Vec<VideoSource>, BackendError>;
    fn channels(&self, source_id: u32) -> Result<Vec<Channel>, BackendError>;

    fn recorded_list(&self) -> Result<Vec<RecordingRecord>, BackendError>;
    fn recorded_by_time(
        &self,
        channel_id: ChannelId,
        recording_start: i64,
    ) -> Result<RecordingRecord, BackendError>;
    fn recorded_by_id(&self, recorded_id: u32) -> Result<RecordingRecord, BackendError>;

    fn delete_recording(
        &self,
        rec: &RecordingRecord,
        force: bool,
        rerecord: bool,
    ) -> Result<(), BackendError>;
    fn undelete_recording(&self, rec: &RecordingRecord) -> Result<(), BackendError>;
    fn set_watched(&self, rec: &RecordingRecord, watched: bool) -> Result<(), BackendError>;

    fn set_bookmark(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
        value: i64,
    ) -> Result<(), BackendError>;
    /// Returns 0 when no bookmark is stored.
    fn bookmark(&self, rec: &RecordingRecord, unit: MarkUnit) -> Result<i64, BackendError>;

    fn program_guide(
        &self,
        channel_id: ChannelId,
        start: i64,
        end: i64,
    ) -> Result<Vec<GuideEntry>, BackendError>;

    fn comm_break_marks(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
    ) -> Result<Vec<EditMark>, BackendError>;
    fn cut_marks(&self, rec: &RecordingRecord, unit: MarkUnit)
        -> Result<Vec<EditMark>, BackendError>;

    fn schedule_rules(&self) -> Result<Vec<RuleSpec>, BackendError>;
    fn upcoming(&self) -> Result<Vec<Occurrence>, BackendError>;
    fn add_rule(&self, rule: &RuleSpec) -> Result<u32, BackendError>;
    fn update_rule(&self, rule: &RuleSpec) -> Result<(), BackendError>;
    fn remove_rule(&self, rule_id: u32) -> Result<(), BackendError>;
    /// Skip the next recording on the given capture card.
    fn cancel_next_recording(&self, card_id: u32) -> Result<(), BackendError>;

    fn free_space(&self) -> Result<DriveSpace, BackendError>;
    fn setting(&self, key: &str, host_bound: bool) -> Result<Option<String>, BackendError>;
    fn put_setting(&self, key: &str, value: &str, host_bound: bool) -> Result<(), BackendError>;

    fn block_shutdown(&self) -> Result<(), BackendError> {
        Ok(())
    }
    fn allow_shutdown(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Push-event subscription. Owned and polled by the supervisor's dedicated
/// event-reader thread; nothing else touches it.
pub trait EventSource: Send {
    /// Block up to `timeout` for the next event; `Ok(None)` on timeout.
    fn poll(&mut self, timeout: Duration) -> Result<Option<BackendEvent>, BackendError>;
    /// Tear down and reopen the subscription after silent staleness.
    fn reset(&mut self);
}

/// Event source for hosts without a push channel: never yields, so only the
/// synthesized housekeeping ticks drive the supervisor.
pub struct IdleEventSource;

impl EventSource for IdleEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<BackendEvent>, BackendError> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn reset(&mut self) {}
}

/// Handle on a spawned live-TV stream.
pub trait LiveStream: Send {
    fn card_id(&self) -> u32;
    fn is_playing(&self) -> bool;
    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn seek(&mut self, position: i64, whence: SeekWhence) -> i64;
    fn size(&self) -> i64;
    /// Current playback offset in stream bytes.
    fn position(&self) -> i64;
    /// Program currently carried by the tuned channel.
    fn program(&self) -> Option<ProgramRef>;
    /// Toggle preservation of the live buffer as a real recording.
    fn keep_recording(&mut self, keep: bool) -> bool;
    fn is_live_recording(&self) -> bool;
    fn signal(&self) -> Option<SignalSnapshot>;
    /// (live start, chained end) timestamps of the buffered window.
    fn time_window(&self) -> Option<(i64, i64)>;
}

/// Handle on an opened recorded stream.
pub trait RecordedStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn seek(&mut self, position: i64, whence: SeekWhence) -> i64;
    fn size(&self) -> i64;
    /// (frame rate, aspect) probed from the transport stream, when available.
    fn av_props(&self) -> Option<(f32, f32)> {
        None
    }
}

/// Spawns live and recorded streams. The heavy lifting (recorder allocation,
/// transfer sockets) lives behind this seam.
pub trait TunerSource: Send + Sync {
    /// Spawn live TV across the candidate channels, first-listed preferred.
    fn spawn_live(
        &self,
        channels: &[Channel],
        tune_delay_secs: u32,
        limit_tune_attempts: bool,
    ) -> Result<Box<dyn LiveStream>, BackendError>;

    fn open_recorded(&self, rec: &RecordingRecord) -> Result<Box<dyn RecordedStream>, BackendError>;
}

/// Tuner stub for headless hosts; every spawn fails, which exercises the
/// placeholder fallback.
pub struct UnavailableTuner;

impl TunerSource for UnavailableTuner {
    fn spawn_live(
        &self,
        _channels: &[Channel],
        _tune_delay_secs: u32,
        _limit_tune_attempts: bool,
    ) -> Result<Box<dyn LiveStream>, BackendError> {
        Err(BackendError::Rejected("no tuner transport configured".into()))
    }

    fn open_recorded(
        &self,
        _rec: &RecordingRecord,
    ) -> Result<Box<dyn RecordedStream>, BackendError> {
        Err(BackendError::Rejected("no tuner transport configured".into()))
    }
}
