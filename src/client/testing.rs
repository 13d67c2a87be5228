// src/client/testing.rs
//! Shared test doubles: an in-memory backend and fake tuner streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::backend::{
    BackendControl, DriveSpace, GuideEntry, LiveStream, Occurrence, RecordedStream, RuleSpec,
    TunerSource, VideoSource,
};
use crate::client::channels::ChannelCatalog;
use crate::client::edl::EditMark;
use crate::client::errors::{BackendError, ConnectError};
use crate::client::types::{
    Channel, ChannelId, MarkUnit, ProgramRef, RecordingRecord, SeekWhence, SignalSnapshot,
};

#[derive(Default)]
struct MockState {
    sources: Vec<VideoSource>,
    channels: HashMap<u32, Vec<Channel>>,
    recordings: HashMap<String, RecordingRecord>,
    guide: HashMap<ChannelId, Vec<GuideEntry>>,
    rules: Vec<RuleSpec>,
    upcoming: Vec<Occurrence>,
    next_rule_id: u32,
    cancelled_cards: Vec<u32>,
    deleted_uids: Vec<String>,
    bookmarks: HashMap<(String, u8), i64>,
    settings: HashMap<String, String>,
    breaks: HashMap<String, Vec<EditMark>>,
    cuts: HashMap<String, Vec<EditMark>>,
    stale: bool,
    service_version: u32,
    open: bool,
    fail_open: Option<ConnectError>,
}

pub(crate) struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        let state = MockState { next_rule_id: 100, service_version: 85, ..MockState::default() };
        Self { state: Mutex::new(state) }
    }

    pub fn add_source(&self, source_id: u32, name: &str, channels: Vec<Channel>) {
        let mut state = self.state.lock().unwrap();
        state.sources.push(VideoSource { source_id, source_name: name.into() });
        state.channels.insert(source_id, channels);
    }

    pub fn put_recording(&self, rec: RecordingRecord) {
        self.state.lock().unwrap().recordings.insert(rec.uid.clone(), rec);
    }

    pub fn remove_recording(&self, uid: &str) {
        self.state.lock().unwrap().recordings.remove(uid);
    }

    pub fn put_guide(&self, channel_id: ChannelId, entries: Vec<GuideEntry>) {
        self.state.lock().unwrap().guide.insert(channel_id, entries);
    }

    pub fn put_rule(&self, rule: RuleSpec) {
        self.state.lock().unwrap().rules.push(rule);
    }

    pub fn put_upcoming(&self, occ: Occurrence) {
        self.state.lock().unwrap().upcoming.push(occ);
    }

    pub fn put_marks(&self, uid: &str, breaks: Vec<EditMark>, cuts: Vec<EditMark>) {
        let mut state = self.state.lock().unwrap();
        state.breaks.insert(uid.into(), breaks);
        state.cuts.insert(uid.into(), cuts);
    }

    pub fn rules(&self) -> Vec<RuleSpec> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn cancelled_cards(&self) -> Vec<u32> {
        self.state.lock().unwrap().cancelled_cards.clone()
    }

    pub fn deleted_uids(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_uids.clone()
    }

    pub fn stored_bookmark(&self, uid: &str, unit: MarkUnit) -> Option<i64> {
        self.state.lock().unwrap().bookmarks.get(&(uid.into(), unit.as_code())).copied()
    }

    pub fn set_bookmark_value(&self, uid: &str, unit: MarkUnit, value: i64) {
        self.state.lock().unwrap().bookmarks.insert((uid.into(), unit.as_code()), value);
    }

    pub fn set_stale(&self, stale: bool) {
        self.state.lock().unwrap().stale = stale;
    }

    pub fn set_service_version(&self, version: u32) {
        self.state.lock().unwrap().service_version = version;
    }

    pub fn set_fail_open(&self, err: Option<ConnectError>) {
        self.state.lock().unwrap().fail_open = err;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }
}

impl BackendControl for MockBackend {
    fn open(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_open {
            return Err(err);
        }
        state.open = true;
        Ok(())
    }

    fn close(&self) {
        self.state.lock().unwrap().open = false;
    }

    fn check_service(&self) -> u32 {
        self.state.lock().unwrap().service_version
    }

    fn server_hostname(&self) -> String {
        "mockbackend".into()
    }

    fn backend_version(&self) -> String {
        "30.0-mock".into()
    }

    fn is_stale(&self) -> bool {
        self.state.lock().unwrap().stale
    }

    fn clear_stale(&self) {
        self.state.lock().unwrap().stale = false;
    }

    fn video_sources(&self) -> Result<Vec<VideoSource>, BackendError> {
        Ok(self.state.lock().unwrap().sources.clone())
    }

    fn channels(&self, source_id: u32) -> Result<Vec<Channel>, BackendError> {
        Ok(self.state.lock().unwrap().channels.get(&source_id).cloned().unwrap_or_default())
    }

    fn recorded_list(&self) -> Result<Vec<RecordingRecord>, BackendError> {
        Ok(self.state.lock().unwrap().recordings.values().cloned().collect())
    }

    fn recorded_by_time(
        &self,
        channel_id: ChannelId,
        recording_start: i64,
    ) -> Result<RecordingRecord, BackendError> {
        let uid = RecordingRecord::make_uid(channel_id, recording_start);
        self.state.lock().unwrap().recordings.get(&uid).cloned().ok_or(BackendError::Missing)
    }

    fn recorded_by_id(&self, recorded_id: u32) -> Result<RecordingRecord, BackendError> {
        self.state
            .lock()
            .unwrap()
            .recordings
            .values()
            .find(|r| r.recorded_id == recorded_id)
            .cloned()
            .ok_or(BackendError::Missing)
    }

    fn delete_recording(
        &self,
        rec: &RecordingRecord,
        _force: bool,
        _rerecord: bool,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if !state.recordings.contains_key(&rec.uid) {
            return Err(BackendError::Missing);
        }
        state.deleted_uids.push(rec.uid.clone());
        Ok(())
    }

    fn undelete_recording(&self, rec: &RecordingRecord) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        match state.recordings.get_mut(&rec.uid) {
            Some(stored) => {
                stored.deleted = false;
                stored.visible = true;
                Ok(())
            }
            None => Err(BackendError::Missing),
        }
    }

    fn set_watched(&self, rec: &RecordingRecord, watched: bool) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        match state.recordings.get_mut(&rec.uid) {
            Some(stored) => {
                stored.watched = watched;
                Ok(())
            }
            None => Err(BackendError::Missing),
        }
    }

    fn set_bookmark(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
        value: i64,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.bookmarks.insert((rec.uid.clone(), unit.as_code()), value);
        Ok(())
    }

    fn bookmark(&self, rec: &RecordingRecord, unit: MarkUnit) -> Result<i64, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state.bookmarks.get(&(rec.uid.clone(), unit.as_code())).copied().unwrap_or(0))
    }

    fn program_guide(
        &self,
        channel_id: ChannelId,
        start: i64,
        end: i64,
    ) -> Result<Vec<GuideEntry>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .guide
            .get(&channel_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.start_time <= end && e.end_time >= start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn comm_break_marks(
        &self,
        rec: &RecordingRecord,
        _unit: MarkUnit,
    ) -> Result<Vec<EditMark>, BackendError> {
        Ok(self.state.lock().unwrap().breaks.get(&rec.uid).cloned().unwrap_or_default())
    }

    fn cut_marks(
        &self,
        rec: &RecordingRecord,
        _unit: MarkUnit,
    ) -> Result<Vec<EditMark>, BackendError> {
        Ok(self.state.lock().unwrap().cuts.get(&rec.uid).cloned().unwrap_or_default())
    }

    fn schedule_rules(&self) -> Result<Vec<RuleSpec>, BackendError> {
        Ok(self.state.lock().unwrap().rules.clone())
    }

    fn upcoming(&self) -> Result<Vec<Occurrence>, BackendError> {
        Ok(self.state.lock().unwrap().upcoming.clone())
    }

    fn add_rule(&self, rule: &RuleSpec) -> Result<u32, BackendError> {
        let mut state = self.state.lock().unwrap();
        let mut rule = rule.clone();
        state.next_rule_id += 1;
        rule.rule_id = state.next_rule_id;
        let id = rule.rule_id;
        state.rules.push(rule);
        Ok(id)
    }

    fn update_rule(&self, rule: &RuleSpec) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        match state.rules.iter_mut().find(|r| r.rule_id == rule.rule_id) {
            Some(stored) => {
                *stored = rule.clone();
                Ok(())
            }
            None => Err(BackendError::Missing),
        }
    }

    fn remove_rule(&self, rule_id: u32) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        let before = state.rules.len();
        state.rules.retain(|r| r.rule_id != rule_id);
        if state.rules.len() == before {
            return Err(BackendError::Missing);
        }
        Ok(())
    }

    fn cancel_next_recording(&self, card_id: u32) -> Result<(), BackendError> {
        self.state.lock().unwrap().cancelled_cards.push(card_id);
        Ok(())
    }

    fn free_space(&self) -> Result<DriveSpace, BackendError> {
        Ok(DriveSpace { total_kb: 1_000_000, used_kb: 250_000 })
    }

    fn setting(&self, key: &str, _host_bound: bool) -> Result<Option<String>, BackendError> {
        Ok(self.state.lock().unwrap().settings.get(key).cloned())
    }

    fn put_setting(&self, key: &str, value: &str, _host_bound: bool) -> Result<(), BackendError> {
        self.state.lock().unwrap().settings.insert(key.into(), value.into());
        Ok(())
    }
}

// ---- fake streams ----

pub(crate) struct FakeLiveStream {
    pub card: u32,
    pub program: ProgramRef,
    pub playing: bool,
    pub live_recording: bool,
    pub position: i64,
    pub keep_calls: Arc<Mutex<Vec<bool>>>,
    pub signal: Option<SignalSnapshot>,
}

impl FakeLiveStream {
    pub fn on_card(card: u32, channel_id: ChannelId, program_start: i64) -> Self {
        Self {
            card,
            program: ProgramRef { channel_id, start_time: program_start, title: "live".into() },
            playing: true,
            live_recording: false,
            position: 4096,
            keep_calls: Arc::new(Mutex::new(Vec::new())),
            signal: None,
        }
    }

    pub fn keep_calls(&self) -> Arc<Mutex<Vec<bool>>> {
        Arc::clone(&self.keep_calls)
    }

    pub fn set_live_recording(&mut self, on: bool) {
        self.live_recording = on;
    }
}

impl LiveStream for FakeLiveStream {
    fn card_id(&self) -> u32 {
        self.card
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        buf.fill(0x47);
        buf.len()
    }

    fn seek(&mut self, position: i64, _whence: SeekWhence) -> i64 {
        self.position = position;
        position
    }

    fn size(&self) -> i64 {
        1 << 20
    }

    fn position(&self) -> i64 {
        self.position
    }

    fn program(&self) -> Option<ProgramRef> {
        Some(self.program.clone())
    }

    fn keep_recording(&mut self, keep: bool) -> bool {
        self.keep_calls.lock().unwrap().push(keep);
        self.live_recording = keep;
        true
    }

    fn is_live_recording(&self) -> bool {
        self.live_recording
    }

    fn signal(&self) -> Option<SignalSnapshot> {
        self.signal.clone()
    }

    fn time_window(&self) -> Option<(i64, i64)> {
        Some((self.program.start_time, self.program.start_time + 1800))
    }
}

pub(crate) struct FakeRecordedStream {
    data: Vec<u8>,
    offset: usize,
    av: Option<(f32, f32)>,
}

impl RecordedStream for FakeRecordedStream {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.data.len() - self.offset);
        buf[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        n
    }

    fn seek(&mut self, position: i64, whence: SeekWhence) -> i64 {
        let target = match whence {
            SeekWhence::Set => position,
            SeekWhence::Current => self.offset as i64 + position,
            SeekWhence::End => self.data.len() as i64 + position,
        };
        if target < 0 || target > self.data.len() as i64 {
            return -1;
        }
        self.offset = target as usize;
        target
    }

    fn size(&self) -> i64 {
        self.data.len() as i64
    }

    fn av_props(&self) -> Option<(f32, f32)> {
        self.av
    }
}

enum TunerBehaviour {
    Live(Mutex<Option<FakeLiveStream>>),
    Recorded { data: Vec<u8>, av: Option<(f32, f32)> },
    Fail,
}

pub(crate) struct FakeTuner {
    behaviour: TunerBehaviour,
}

impl FakeTuner {
    /// Hands out the given live stream once; later spawns fail.
    pub fn with_stream(stream: FakeLiveStream) -> Self {
        Self { behaviour: TunerBehaviour::Live(Mutex::new(Some(stream))) }
    }

    pub fn with_recorded(data: Vec<u8>, av: Option<(f32, f32)>) -> Self {
        Self { behaviour: TunerBehaviour::Recorded { data, av } }
    }

    pub fn failing() -> Self {
        Self { behaviour: TunerBehaviour::Fail }
    }
}

impl TunerSource for FakeTuner {
    fn spawn_live(
        &self,
        _channels: &[Channel],
        _tune_delay_secs: u32,
        _limit_tune_attempts: bool,
    ) -> Result<Box<dyn LiveStream>, BackendError> {
        match &self.behaviour {
            TunerBehaviour::Live(slot) => slot
                .lock()
                .unwrap()
                .take()
                .map(|s| Box::new(s) as Box<dyn LiveStream>)
                .ok_or_else(|| BackendError::Rejected("no recorder free".into())),
            _ => Err(BackendError::Rejected("tuning failed".into())),
        }
    }

    fn open_recorded(
        &self,
        _rec: &RecordingRecord,
    ) -> Result<Box<dyn RecordedStream>, BackendError> {
        match &self.behaviour {
            TunerBehaviour::Recorded { data, av } => Ok(Box::new(FakeRecordedStream {
                data: data.clone(),
                offset: 0,
                av: *av,
            })),
            _ => Err(BackendError::Rejected("transfer failed".into())),
        }
    }
}

// ---- fixtures ----

pub(crate) fn recording(channel_id: ChannelId, start: i64, title: &str) -> RecordingRecord {
    RecordingRecord {
        uid: RecordingRecord::make_uid(channel_id, start),
        recorded_id: start as u32,
        channel_id,
        channel_name: "KTWO".into(),
        title: title.into(),
        recording_group: "Default".into(),
        start_time: start,
        end_time: start + 1800,
        recording_start: start,
        recording_end: start + 1800,
        duration: 1800,
        visible: true,
        ..RecordingRecord::default()
    }
}

/// One source holding one channel, already rebuilt into a catalog.
pub(crate) fn singleton_catalog(channel_id: ChannelId) -> (ChannelCatalog, MockBackend) {
    let backend = MockBackend::new();
    backend.add_source(
        1,
        "Antenna",
        vec![Channel {
            id: channel_id,
            number: "2".into(),
            callsign: "KTWO".into(),
            name: "KTWO".into(),
            number_major: 2,
            visible: true,
            ..Channel::default()
        }],
    );
    let catalog = ChannelCatalog::new();
    catalog.rebuild(&backend).unwrap();
    (catalog, backend)
}
