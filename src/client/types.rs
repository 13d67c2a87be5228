// src/client/types.rs
use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Backend identifier of a single tuner-source channel entry.
pub type ChannelId = u32;
/// Identifier of a canonical (deduplicated) channel. By construction this is
/// the backend id of the first channel folded into the canonical entry.
pub type ChannelUid = u32;

pub const INTERVAL_DAY: i64 = 86_400;

// ---- channels ----

#[derive(Clone, Debug, Default)]
pub struct Channel {
    pub id: ChannelId,
    /// Display number string as the backend reports it, e.g. "2" or "2_1".
    pub number: String,
    pub callsign: String,
    pub name: String,
    pub number_major: u32,
    pub number_minor: u32,
    pub is_radio: bool,
    pub visible: bool,
    pub icon_path: String,
}

impl Channel {
    /// Composite dedup key: the same physical feed exposed by several tuner
    /// sources shares number and call-sign.
    pub fn dedup_key(&self) -> (String, String) {
        (self.number.clone(), self.callsign.clone())
    }
}

/// Host-facing canonical channel entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelItem {
    pub uid: ChannelUid,
    pub number_major: u32,
    pub number_minor: u32,
    pub is_radio: bool,
    pub hidden: bool,
}

// ---- recordings ----

/// Locally derived recording attributes, never overwritten by backend pushes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RecordingProps {
    /// Set when series grouping finds a second recording with the same
    /// (recording group, title) pair.
    pub series: bool,
    /// Filled lazily when a recorded stream is opened.
    pub frame_rate: Option<f32>,
    pub aspect: Option<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordingRecord {
    pub uid: String,
    pub recorded_id: u32,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub recording_group: String,
    pub season: u32,
    pub episode: u32,
    /// Original air date, unix seconds at date precision. 0 = unset.
    pub airdate: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub recording_start: i64,
    pub recording_end: i64,
    /// Seconds.
    pub duration: i64,
    pub visible: bool,
    pub deleted: bool,
    pub watched: bool,
    pub has_bookmark: bool,
    pub damaged: bool,
    pub is_live_tv: bool,
    pub hostname: String,
    pub props: RecordingProps,
}

impl RecordingRecord {
    /// Stable identity derived from channel and recording start time. Must
    /// match what the backend-id lookup path produces so cache merges work
    /// across reloads.
    pub fn make_uid(channel_id: ChannelId, recording_start: i64) -> String {
        format!("{channel_id}_{recording_start}")
    }

    pub fn same_program(&self, channel_id: ChannelId, start_time: i64) -> bool {
        self.channel_id == channel_id && self.start_time == start_time
    }
}

// ---- live session ----

#[derive(Clone, Debug)]
pub struct ProgramRef {
    pub channel_id: ChannelId,
    pub start_time: i64,
    pub title: String,
}

#[derive(Clone, Debug, Default)]
pub struct SignalSnapshot {
    pub card_id: u32,
    pub locked: bool,
    pub signal: u32,
    pub snr: u32,
    pub ber: u32,
    pub uncorrected: u32,
}

// ---- backend push events ----

#[derive(Clone, Debug)]
pub struct AskRecording {
    pub card_id: u32,
    /// Seconds until the scheduled recording needs the tuner. Negative means
    /// the conflict already passed.
    pub seconds_until: i32,
    pub has_recording: bool,
    pub has_later_showing: bool,
    pub title: String,
}

#[derive(Clone, Debug)]
pub enum RecordingChange {
    /// Full-reload sentinel.
    Reload,
    AddByTime { channel_id: ChannelId, recording_start: i64 },
    AddById { recorded_id: u32 },
    Update(Box<RecordingRecord>),
    DeleteByTime { channel_id: ChannelId, recording_start: i64 },
    DeleteById { recorded_id: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    NotConnected,
}

#[derive(Clone, Debug)]
pub enum BackendEvent {
    ScheduleChange,
    AskRecording(AskRecording),
    RecordingListChange(RecordingChange),
    ConnectionStatus(ConnectionStatus),
    /// Synthesized by the event-reader thread once per idle period.
    HousekeepingTick,
}

/// Connection-health state owned by the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Control session looked open but went unresponsive.
    Hanging,
}

// ---- signals to the controlling host ----

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostSignal {
    ChannelsChanged,
    ChannelGroupsChanged,
    TimersChanged,
    RecordingsChanged,
    ConnectionLost,
    ConnectionRestored,
    Warning(String),
    /// Deferred suggestion to delete a fully watched recording.
    PromptDelete { uid: String, title: String },
}

// ---- scheduling enums ----

/// Recording status reported by the backend scheduler for an occurrence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecStatus {
    Aborted,
    Missed,
    NotListed,
    Offline,
    Recording,
    Tuning,
    Recorded,
    WillRecord,
    Conflict,
    Failed,
    TunerBusy,
    LowDiskspace,
    Inactive,
    EarlierRecording,
    LaterShowing,
    CurrentRecording,
    PreviousRecording,
    TooManyRecordings,
    OtherShowing,
    Repeat,
    DontRecord,
    NeverRecord,
    Cancelled,
    #[default]
    Unknown,
}

impl RecStatus {
    /// Wire code used by the scheduler listings.
    pub fn from_code(code: i32) -> Self {
        match code {
            -10 => Self::Tuning,
            -9 => Self::Failed,
            -8 => Self::TunerBusy,
            -7 => Self::LowDiskspace,
            -6 => Self::Cancelled,
            -5 => Self::Missed,
            -4 => Self::Aborted,
            -3 => Self::Recorded,
            -2 => Self::Recording,
            -1 => Self::WillRecord,
            1 => Self::DontRecord,
            2 => Self::PreviousRecording,
            3 => Self::CurrentRecording,
            4 => Self::EarlierRecording,
            5 => Self::TooManyRecordings,
            6 => Self::NotListed,
            7 => Self::Conflict,
            8 => Self::LaterShowing,
            9 => Self::Repeat,
            10 => Self::Inactive,
            11 => Self::NeverRecord,
            12 => Self::Offline,
            13 => Self::OtherShowing,
            _ => Self::Unknown,
        }
    }
}

/// Host-facing timer state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerState {
    Aborted,
    Recording,
    Completed,
    #[default]
    Scheduled,
    ConflictNok,
    Error,
    Disabled,
    Cancelled,
}

/// Rule type tag, host-facing and backend-facing alike.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerKind {
    #[default]
    Single,
    Daily,
    Weekly,
    All,
    TextSearch,
    /// Override suppressing one showing of a parent rule.
    DontRecord,
}

/// Duplicate-handling policy of a rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DupMethod {
    #[default]
    CheckNone,
    CheckSubtitle,
    CheckDescription,
    CheckSubtitleAndDescription,
}

impl DupMethod {
    pub fn from_code(code: u32) -> Self {
        match code {
            2 => Self::CheckSubtitle,
            4 => Self::CheckDescription,
            6 => Self::CheckSubtitleAndDescription,
            _ => Self::CheckNone,
        }
    }

    pub const fn as_code(self) -> u32 {
        match self {
            Self::CheckNone => 1,
            Self::CheckSubtitle => 2,
            Self::CheckDescription => 4,
            Self::CheckSubtitleAndDescription => 6,
        }
    }
}

/// Unit of a stored mark or bookmark value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkUnit {
    Frames,
    Bytes,
    Milliseconds,
}

impl MarkUnit {
    pub const fn as_code(self) -> u8 {
        match self {
            Self::Frames => 0,
            Self::Bytes => 1,
            Self::Milliseconds => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Current,
    End,
}

// ---- category / genre table ----

static CATEGORY_GENRES: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("Movie", 0x10);
    m.insert("Film", 0x10);
    m.insert("Drama", 0x10);
    m.insert("News", 0x20);
    m.insert("Current affairs", 0x20);
    m.insert("Show", 0x30);
    m.insert("Game show", 0x30);
    m.insert("Talk", 0x33);
    m.insert("Sports", 0x40);
    m.insert("Children", 0x50);
    m.insert("Kids", 0x50);
    m.insert("Music", 0x60);
    m.insert("Arts", 0x70);
    m.insert("Culture", 0x70);
    m.insert("Social", 0x80);
    m.insert("Politics", 0x80);
    m.insert("Education", 0x90);
    m.insert("Science", 0x90);
    m.insert("Documentary", 0x23);
    m.insert("Leisure", 0xA0);
    m.insert("Hobbies", 0xA0);
    m
});

/// DVB-style genre code for a backend category string; 0 when unknown.
pub fn genre_for_category(category: &str) -> u8 {
    CATEGORY_GENRES.get(category.trim()).copied().unwrap_or(0)
}

/// Reverse lookup used when a host request carries only a genre code.
pub fn category_for_genre(genre: u8) -> &'static str {
    match genre & 0xF0 {
        0x10 => "Movie",
        0x20 => "News",
        0x30 => "Show",
        0x40 => "Sports",
        0x50 => "Children",
        0x60 => "Music",
        0x70 => "Arts",
        0x80 => "Social",
        0x90 => "Education",
        0xA0 => "Leisure",
        _ => "",
    }
}
