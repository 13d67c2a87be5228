// src/client/mod.rs
//! Synchronization core of the recording client: owns the backend control
//! session, the event subscription and the cached mirrors, and arbitrates
//! the live session against the scheduler.
//!
//! Locking: the live-session lock, the channel-catalog lock and the
//! recordings lock are independent and privately owned by their components.
//! Where the session lock and the recordings lock are both needed, the
//! session lock comes first; mirror mutations release the recordings lock
//! before any host notification so a synchronous re-query cannot deadlock
//! against the event thread.

pub mod backend;
pub mod channels;
pub mod edl;
pub mod errors;
pub mod http;
pub mod live;
pub mod playback;
pub mod recordings;
pub mod schedule;
pub mod tasks;
pub mod types;

pub(crate) mod util;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, EdlMode, GroupRecordings};

use backend::{BackendControl, DriveSpace, EventSource, GuideEntry, TunerSource};
use channels::ChannelCatalog;
use edl::EdlInterval;
use errors::{ConnectError, PvrError};
use live::{LiveSessionCoordinator, StreamTimes};
use recordings::RecordingCache;
use schedule::{ScheduleTranslator, TimerEntry, TimerHandle, TimerRequest};
use tasks::TaskQueue;
use types::{
    BackendEvent, ChannelItem, ChannelUid, ConnectionState, ConnectionStatus, HostSignal,
    MarkUnit, RecordingChange, RecordingRecord, SeekWhence, SignalSnapshot,
};

/// Transport implementations the host injects at connect time.
pub struct PvrTransport {
    pub control: Arc<dyn BackendControl>,
    pub events: Box<dyn EventSource>,
    pub tuner: Arc<dyn TunerSource>,
}

/// Host-facing view of one recording, with presentation fields derived from
/// configuration.
#[derive(Clone, Debug)]
pub struct RecordingView {
    pub record: RecordingRecord,
    pub display_title: String,
    /// Directory path grouping the listing, e.g. "group/title".
    pub directory: String,
    /// Air-date-based presentation time when configured, else capture time.
    pub presented_time: i64,
    pub channel_uid: Option<ChannelUid>,
}

fn now_ts() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

impl std::fmt::Debug for PvrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvrClient").finish_non_exhaustive()
    }
}

pub struct PvrClient {
    cfg: AppConfig,
    control: Arc<dyn BackendControl>,
    tuner: Arc<dyn TunerSource>,
    channels: ChannelCatalog,
    recordings: RecordingCache,
    schedule: ScheduleTranslator,
    live: LiveSessionCoordinator,
    tasks: TaskQueue,
    signals: Sender<HostSignal>,
    state: Mutex<ConnectionState>,
    power_saving: AtomicBool,
    stop: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl PvrClient {
    /// Open the control session and the event subscription. Fails without
    /// leaving a half-open session behind; a failed reach attempt fires a
    /// wake signal for the next try.
    pub fn connect(
        cfg: AppConfig,
        transport: PvrTransport,
        signals: Sender<HostSignal>,
    ) -> Result<Arc<Self>, ConnectError> {
        let PvrTransport { control, events, tuner } = transport;

        if let Err(err) = control.open() {
            warn!("failed to connect to backend on {}:{}", cfg.host, cfg.proto_port);
            if !cfg.wake_ether.is_empty() {
                // Wake the backend host for the next attempt
                if let Err(wake_err) = util::wake_on_lan(&cfg.wake_ether) {
                    debug!("wake signal failed: {wake_err}");
                }
            }
            return Err(err);
        }
        if control.check_service() == 0 {
            warn!(
                "backend on {}:{} has no usable service API",
                cfg.host, cfg.wsapi_port
            );
            control.close();
            return Err(ConnectError::ApiUnavailable);
        }
        if cfg.block_shutdown {
            let _ = control.block_shutdown();
        }

        let live = LiveSessionCoordinator::new(
            cfg.conflict_strategy,
            cfg.tune_delay_secs,
            cfg.limit_tune_attempts,
            cfg.placeholder_path.clone().map(Into::into),
        );
        let client = Arc::new(Self {
            recordings: RecordingCache::new(cfg.livetv_recordings),
            cfg,
            control,
            tuner,
            channels: ChannelCatalog::new(),
            schedule: ScheduleTranslator::new(),
            live,
            tasks: TaskQueue::new(),
            signals,
            state: Mutex::new(ConnectionState::Connected),
            power_saving: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        });

        client.refresh_full();
        client.start_reader(events);
        info!("connected to {}", client.backend_name());
        Ok(client)
    }

    fn start_reader(self: &Arc<Self>, mut events: Box<dyn EventSource>) {
        let weak = Arc::downgrade(self);
        let stop = Arc::clone(&self.stop);
        let tick = Duration::from_secs(self.cfg.housekeeping_secs);
        let handle = thread::Builder::new()
            .name("pvr-events".into())
            .spawn(move || {
                let mut last_tick = Instant::now();
                while !stop.load(Ordering::SeqCst) {
                    let remaining = tick.saturating_sub(last_tick.elapsed());
                    let step = remaining.min(Duration::from_millis(500));
                    match events.poll(step) {
                        Ok(Some(event)) => {
                            let Some(client) = weak.upgrade() else { break };
                            if client.dispatch(event) {
                                events.reset();
                            }
                        }
                        Ok(None) => {}
                        Err(err) => debug!("event poll failed: {err}"),
                    }
                    if last_tick.elapsed() >= tick {
                        last_tick = Instant::now();
                        let Some(client) = weak.upgrade() else { break };
                        if client.dispatch(BackendEvent::HousekeepingTick) {
                            events.reset();
                        }
                    }
                }
                debug!("event reader stopped");
            })
            .expect("spawn event reader");
        *self.reader.lock().unwrap() = Some(handle);
    }

    /// Stop the event thread and release the control session.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.live.close();
        self.live.close_recorded();
        self.control.close();
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    // ---- event dispatch ----

    /// Route one backend event. Returns true when the event subscription
    /// should be reset by the reader.
    pub(crate) fn dispatch(&self, event: BackendEvent) -> bool {
        match event {
            BackendEvent::ScheduleChange => {
                self.handle_schedule_change();
                false
            }
            BackendEvent::AskRecording(ask) => {
                self.live.handle_ask_recording(self.control.as_ref(), &ask, &self.signals);
                false
            }
            BackendEvent::RecordingListChange(change) => {
                self.handle_recording_change(change);
                false
            }
            BackendEvent::ConnectionStatus(status) => {
                self.handle_connection_status(status);
                false
            }
            BackendEvent::HousekeepingTick => self.run_housekeeping(),
        }
    }

    fn handle_schedule_change(&self) {
        match self.schedule.refresh(self.control.as_ref()) {
            Ok(()) => {
                let _ = self.signals.send(HostSignal::TimersChanged);
            }
            Err(err) => debug!("schedule refresh failed: {err}"),
        }
    }

    fn handle_recording_change(&self, change: RecordingChange) {
        let control = self.control.as_ref();
        match change {
            RecordingChange::Reload => {
                if let Err(err) = self.recordings.reload(control) {
                    debug!("recording reload failed: {err}");
                }
            }
            RecordingChange::AddByTime { channel_id, recording_start } => {
                self.recordings.apply_add_by_time(control, channel_id, recording_start);
            }
            RecordingChange::AddById { recorded_id } => {
                self.recordings.apply_add_by_id(control, recorded_id);
            }
            RecordingChange::Update(record) => self.recordings.apply_update(*record),
            RecordingChange::DeleteByTime { channel_id, recording_start } => {
                self.recordings.apply_delete_by_time(channel_id, recording_start);
            }
            RecordingChange::DeleteById { recorded_id } => {
                self.recordings.apply_delete_by_id(control, recorded_id);
            }
        }
    }

    fn handle_connection_status(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Disconnected => {
                let mut state = self.state.lock().unwrap();
                if *state == ConnectionState::Hanging {
                    // Already flagged; do not renotify the host
                    return;
                }
                *state = ConnectionState::Hanging;
                drop(state);
                self.control.close();
                warn!("connection to backend lost");
                let _ = self.signals.send(HostSignal::ConnectionLost);
            }
            ConnectionStatus::Connected => {
                let was_hanging = {
                    let mut state = self.state.lock().unwrap();
                    let hanging = *state == ConnectionState::Hanging;
                    *state = ConnectionState::Connected;
                    hanging
                };
                if was_hanging {
                    if let Err(err) = self.control.open() {
                        warn!("control session reopen failed: {err}");
                    }
                    info!("connection to backend restored");
                    let _ = self.signals.send(HostSignal::ConnectionRestored);
                }
                // Refreshing all
                self.refresh_full();
            }
            ConnectionStatus::NotConnected => {
                if !self.power_saving.load(Ordering::SeqCst) && !self.cfg.wake_ether.is_empty() {
                    if let Err(err) = util::wake_on_lan(&self.cfg.wake_ether) {
                        debug!("wake signal failed: {err}");
                    }
                }
            }
        }
    }

    fn refresh_full(&self) {
        match self.channels.rebuild(self.control.as_ref()) {
            Ok(count) => {
                debug!("catalog rebuilt with {count} channel(s)");
                let _ = self.signals.send(HostSignal::ChannelsChanged);
                let _ = self.signals.send(HostSignal::ChannelGroupsChanged);
            }
            Err(err) => debug!("channel rebuild failed: {err}"),
        }
        self.handle_schedule_change();
        if let Err(err) = self.recordings.reload(self.control.as_ref()) {
            debug!("recording reload failed: {err}");
        }
    }

    /// Periodic housekeeping: recover a silently stale event subscription
    /// and coalesce pending recording-change notifications into one signal.
    fn run_housekeeping(&self) -> bool {
        let mut reset = false;
        let hanging = self.connection_state() == ConnectionState::Hanging;
        if !hanging && self.control.is_stale() {
            info!("event subscription reset after silent staleness");
            self.control.clear_stale();
            reset = true;
        }
        if self.recordings.take_dirty() {
            let _ = self.signals.send(HostSignal::RecordingsChanged);
        }
        reset
    }

    // ---- channels ----

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self, radio: bool) -> Vec<ChannelItem> {
        self.channels.items(radio)
    }

    pub fn channel_group_names(&self, radio: bool) -> Vec<String> {
        self.channels.group_names(radio)
    }

    pub fn channel_group_members(&self, name: &str, radio: bool) -> Result<Vec<ChannelItem>, PvrError> {
        self.channels.group_members(name, radio)
    }

    /// Guide window for one canonical channel; bad entries are skipped.
    pub fn epg_for_channel(
        &self,
        uid: ChannelUid,
        start: i64,
        end: i64,
    ) -> Result<Vec<GuideEntry>, PvrError> {
        let mut entries = self.control.program_guide(uid, start, end)?;
        entries.retain(|e| e.end_time > e.start_time);
        Ok(entries)
    }

    // ---- recordings ----

    pub fn recordings_count(&self) -> usize {
        self.recordings.visible_count()
    }

    pub fn deleted_recordings_count(&self) -> usize {
        self.recordings.deleted_count()
    }

    pub fn recordings(&self, deleted: bool) -> Vec<RecordingView> {
        let grouping = if deleted { GroupRecordings::Never } else { self.cfg.group_recordings };
        self.recordings
            .list(deleted, grouping)
            .into_iter()
            .map(|rec| self.view_of(rec, deleted))
            .collect()
    }

    fn view_of(&self, record: RecordingRecord, deleted: bool) -> RecordingView {
        let display_title = if record.damaged && !self.cfg.damaged_color.is_empty() {
            format!("[COLOR {}]{}[/COLOR]", self.cfg.damaged_color, record.title)
        } else {
            util::make_program_title(&record.title, &record.subtitle)
        };
        let mut directory = String::new();
        if !deleted {
            if !self.cfg.root_default_group || record.recording_group != "Default" {
                directory.push_str(&record.recording_group);
            }
            let grouped = self.cfg.group_recordings == GroupRecordings::Always
                || (self.cfg.group_recordings == GroupRecordings::OnlySeries
                    && record.props.series);
            if grouped {
                directory.push('/');
                directory.push_str(&record.title);
            }
        }
        let presented_time =
            util::recording_time(record.airdate, record.recording_start, self.cfg.use_airdate);
        let channel_uid = self.channels.canonical_uid(record.channel_id);
        RecordingView { display_title, directory, presented_time, channel_uid, record }
    }

    pub fn delete_recording(&self, uid: &str) -> Result<(), PvrError> {
        self.delete_recording_impl(uid, false, false)
    }

    /// Delete and forget the recording history so it can record again.
    pub fn delete_and_rerecord(&self, uid: &str) -> Result<(), PvrError> {
        self.delete_recording_impl(uid, false, true)
    }

    fn delete_recording_impl(&self, uid: &str, force: bool, rerecord: bool) -> Result<(), PvrError> {
        let rec = self.recordings.get(uid).ok_or_else(|| {
            error!("recording {uid} does not exist");
            PvrError::NotFound
        })?;
        // Deleting the program behind the live session is prohibited; a
        // promoted live recording is released instead of deleted.
        if self.live.is_my_live_recording(&rec) {
            if rec.is_live_tv {
                return Err(PvrError::Conflict);
            }
            return self.live.keep_live_recording(false);
        }
        self.control.delete_recording(&rec, force, rerecord)?;
        debug!("deleted recording {uid}");
        Ok(())
    }

    pub fn undelete_recording(&self, uid: &str) -> Result<(), PvrError> {
        let rec = self.recordings.get(uid).ok_or(PvrError::NotFound)?;
        self.control.undelete_recording(&rec)?;
        Ok(())
    }

    pub fn purge_deleted_recordings(&self) -> Result<(), PvrError> {
        let mut failed = false;
        for rec in self.recordings.list(true, GroupRecordings::Never) {
            match self.control.delete_recording(&rec, false, false) {
                Ok(()) => debug!("purged recording {}", rec.uid),
                Err(err) => {
                    error!("failed to purge recording {}: {err}", rec.uid);
                    failed = true;
                }
            }
        }
        if failed {
            return Err(PvrError::OperationFailed);
        }
        Ok(())
    }

    pub fn set_watched(&self, uid: &str, watched: bool) -> Result<(), PvrError> {
        let rec = self.recordings.get(uid).ok_or(PvrError::NotFound)?;
        if let Err(err) = self.control.set_watched(&rec, watched) {
            debug!("failed setting watched state for {uid}: {err}");
        } else {
            self.recordings.force_update(self.control.as_ref(), uid);
        }
        if self.cfg.prompt_delete_at_end && watched {
            let signals = self.signals.clone();
            let uid = rec.uid.clone();
            let title = util::make_program_title(&rec.title, &rec.subtitle);
            self.tasks.schedule(Duration::from_millis(1000), move || {
                let _ = signals.send(HostSignal::PromptDelete { uid, title });
            });
        }
        Ok(())
    }

    /// Last played position in whole seconds, served from the single-entry
    /// bookmark cache when the host repeats itself.
    pub fn last_played_position(&self, uid: &str) -> Result<i64, PvrError> {
        let rec = self.recordings.get(uid).ok_or(PvrError::NotFound)?;
        let key = self.bookmark_key(&rec);
        if let Some(position) = self.recordings.cached_position(key.0, key.1) {
            debug!("returning cached bookmark for {uid}");
            return Ok(position);
        }
        let mut position = 0;
        if rec.has_bookmark {
            position = self.control.bookmark(&rec, MarkUnit::Milliseconds).unwrap_or(0) / 1000;
        }
        self.recordings.store_position(key.0, key.1, position);
        Ok(position)
    }

    pub fn set_last_played_position(&self, uid: &str, position_secs: i64) -> Result<(), PvrError> {
        let rec = self.recordings.get(uid).ok_or(PvrError::NotFound)?;
        match self.control.set_bookmark(&rec, MarkUnit::Milliseconds, position_secs * 1000) {
            Ok(()) => {
                let key = self.bookmark_key(&rec);
                self.recordings.store_position(key.0, key.1, position_secs);
            }
            // Surfacing this to the host gains nothing; the next read goes
            // to the backend again
            Err(err) => info!("setting bookmark failed for {uid}: {err}"),
        }
        Ok(())
    }

    fn bookmark_key(&self, rec: &RecordingRecord) -> (ChannelUid, i64) {
        let uid = self.channels.canonical_uid(rec.channel_id).unwrap_or(0);
        let time = util::recording_time(rec.airdate, rec.recording_start, self.cfg.use_airdate);
        (uid, time)
    }

    /// Skip list for a recording: commercial breaks and cuts merged into one
    /// bounded interval list.
    pub fn recording_edl(&self, uid: &str) -> Result<Vec<EdlInterval>, PvrError> {
        if self.cfg.edl_mode == EdlMode::Never {
            return Ok(Vec::new());
        }
        let rec = self.recordings.get(uid).ok_or(PvrError::NotFound)?;
        // Older service versions only keep frame-based marks, which need the
        // stream-probed frame rate to become times
        let (unit, rate) = if self.control.check_service() < 85 {
            let rate = rec.props.frame_rate.unwrap_or(0.0);
            if rate <= 0.0 {
                return Ok(Vec::new());
            }
            (MarkUnit::Frames, rate as f64)
        } else {
            (MarkUnit::Milliseconds, 1000.0)
        };
        let breaks = self.control.comm_break_marks(&rec, unit).unwrap_or_default();
        let cuts = self.control.cut_marks(&rec, unit).unwrap_or_default();
        debug!("found {} break(s) and {} cut(s) for {uid}", breaks.len(), cuts.len());
        Ok(edl::merge(
            &breaks,
            &cuts,
            rec.duration,
            rate,
            self.cfg.edl_mode == EdlMode::SceneMarkers,
        ))
    }

    // ---- timers ----

    pub fn timer_count(&self) -> usize {
        self.schedule.upcoming_count()
    }

    pub fn timers(&self) -> Vec<TimerEntry> {
        self.schedule.entries(&self.channels)
    }

    pub fn add_timer(&self, request: &TimerRequest) -> Result<(), PvrError> {
        // A request covering the in-progress live program promotes the live
        // view instead of creating an independent rule
        if let Some(result) =
            self.live.promote_quick_recording(self.control.as_ref(), &self.channels, request)
        {
            return result;
        }
        self.schedule.submit(self.control.as_ref(), &self.channels, request, now_ts())
    }

    pub fn update_timer(&self, request: &TimerRequest) -> Result<(), PvrError> {
        self.schedule.update(self.control.as_ref(), &self.channels, request, now_ts())
    }

    pub fn delete_timer(&self, handle: TimerHandle) -> Result<(), PvrError> {
        // Deleting the rule backing the live recording demotes the session
        if let Some(result) = self.live.demote_for_delete(&self.schedule, handle) {
            return result;
        }
        self.schedule.delete(self.control.as_ref(), handle)
    }

    // ---- live session ----

    pub fn open_live(&self, uid: ChannelUid) -> Result<(), PvrError> {
        self.live.open(&self.channels, self.tuner.as_ref(), uid, &self.signals)
    }

    pub fn close_live(&self) {
        self.live.close();
    }

    pub fn read_live(&self, buf: &mut [u8]) -> usize {
        self.live.read(buf)
    }

    pub fn seek_live(&self, position: i64, whence: SeekWhence) -> i64 {
        self.live.seek(position, whence)
    }

    pub fn live_length(&self) -> i64 {
        self.live.length()
    }

    pub fn is_playing(&self) -> bool {
        self.live.is_playing()
    }

    pub fn signal_status(&self) -> Result<SignalSnapshot, PvrError> {
        self.live.signal_status()
    }

    pub fn stream_times(&self) -> Result<StreamTimes, PvrError> {
        self.live.stream_times(now_ts())
    }

    // ---- recorded streams ----

    pub fn open_recorded(&self, uid: &str) -> Result<(), PvrError> {
        self.live.open_recorded(self.tuner.as_ref(), &self.recordings, uid)
    }

    pub fn close_recorded(&self) {
        self.live.close_recorded();
    }

    pub fn read_recorded(&self, buf: &mut [u8]) -> i64 {
        self.live.read_recorded(buf)
    }

    pub fn seek_recorded(&self, position: i64, whence: SeekWhence) -> i64 {
        self.live.seek_recorded(position, whence)
    }

    pub fn recorded_length(&self) -> i64 {
        self.live.length_recorded()
    }

    // ---- backend odds and ends ----

    pub fn drive_space(&self) -> Result<DriveSpace, PvrError> {
        Ok(self.control.free_space()?)
    }

    pub fn backend_name(&self) -> String {
        format!("MythTV ({})", self.control.server_hostname())
    }

    pub fn backend_version(&self) -> String {
        self.control.backend_version()
    }

    pub fn connection_string(&self) -> String {
        format!("http://{}:{}", self.cfg.host, self.cfg.wsapi_port)
    }

    pub fn service_version(&self) -> u32 {
        self.control.check_service()
    }

    pub fn live_tv_priority(&self) -> bool {
        matches!(
            self.control.setting("LiveTVPriority", true),
            Ok(Some(value)) if value == "1"
        )
    }

    pub fn set_live_tv_priority(&self, enabled: bool) {
        let value = if enabled { "1" } else { "0" };
        if let Err(err) = self.control.put_setting("LiveTVPriority", value, true) {
            debug!("putting LiveTVPriority failed: {err}");
        }
    }

    // ---- host power / GUI lifecycle ----

    pub fn on_sleep(&self) {
        self.control.close();
    }

    pub fn on_wake(&self) {
        if let Err(err) = self.control.open() {
            warn!("control session reopen on wake failed: {err}");
        }
    }

    pub fn on_gui_activated(&self) {
        if self.cfg.block_shutdown {
            let _ = self.control.block_shutdown();
        }
        self.power_saving.store(false, Ordering::SeqCst);
    }

    pub fn on_gui_deactivated(&self) {
        let _ = self.control.allow_shutdown();
        self.power_saving.store(true, Ordering::SeqCst);
    }
}

impl Drop for PvrClient {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::backend::{IdleEventSource, UnavailableTuner};
    use crate::client::testing::{recording, MockBackend};
    use crate::client::types::Channel;
    use std::sync::mpsc::{self, Receiver};

    fn transport(mock: &Arc<MockBackend>) -> PvrTransport {
        PvrTransport {
            control: Arc::clone(mock) as Arc<dyn BackendControl>,
            events: Box::new(IdleEventSource),
            tuner: Arc::new(UnavailableTuner),
        }
    }

    fn connected(
        mock: &Arc<MockBackend>,
        cfg: AppConfig,
    ) -> (Arc<PvrClient>, Receiver<HostSignal>) {
        let (tx, rx) = mpsc::channel();
        let client = PvrClient::connect(cfg, transport(mock), tx).unwrap();
        while rx.try_recv().is_ok() {} // drop the connect-time refresh signals
        (client, rx)
    }

    fn seeded_backend() -> Arc<MockBackend> {
        let mock = Arc::new(MockBackend::new());
        mock.add_source(
            1,
            "Antenna",
            vec![Channel {
                id: 1001,
                number: "2".into(),
                callsign: "KTWO".into(),
                name: "KTWO".into(),
                visible: true,
                ..Channel::default()
            }],
        );
        mock
    }

    fn drain(rx: &Receiver<HostSignal>) -> Vec<HostSignal> {
        let mut out = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            out.push(signal);
        }
        out
    }

    #[test]
    fn connect_failure_leaves_no_half_open_session() {
        let mock = Arc::new(MockBackend::new());
        mock.set_fail_open(Some(ConnectError::Unreachable));
        let (tx, _rx) = mpsc::channel();
        let err = PvrClient::connect(AppConfig::default(), transport(&mock), tx).unwrap_err();
        assert_eq!(err, ConnectError::Unreachable);
        assert!(!mock.is_open());
    }

    #[test]
    fn missing_service_api_closes_the_session() {
        let mock = Arc::new(MockBackend::new());
        mock.set_service_version(0);
        let (tx, _rx) = mpsc::channel();
        let err = PvrClient::connect(AppConfig::default(), transport(&mock), tx).unwrap_err();
        assert_eq!(err, ConnectError::ApiUnavailable);
        assert!(!mock.is_open());
    }

    #[test]
    fn connect_fills_the_mirrors() {
        let mock = seeded_backend();
        mock.put_recording(recording(1001, 100, "a"));
        let (tx, rx) = mpsc::channel();
        let client = PvrClient::connect(AppConfig::default(), transport(&mock), tx).unwrap();
        assert_eq!(client.channel_count(), 1);
        let signals = drain(&rx);
        assert!(signals.contains(&HostSignal::ChannelsChanged));
        assert!(signals.contains(&HostSignal::TimersChanged));
        // Recording reload is coalesced through housekeeping
        client.dispatch(BackendEvent::HousekeepingTick);
        assert!(drain(&rx).contains(&HostSignal::RecordingsChanged));
        assert_eq!(client.recordings_count(), 1);
        client.shutdown();
    }

    #[test]
    fn repeated_disconnect_notifies_once() {
        let mock = seeded_backend();
        let (client, rx) = connected(&mock, AppConfig::default());

        client.dispatch(BackendEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        assert_eq!(client.connection_state(), ConnectionState::Hanging);
        assert!(!mock.is_open());
        assert_eq!(drain(&rx), vec![HostSignal::ConnectionLost]);

        // Still hanging: a second status event stays silent
        client.dispatch(BackendEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        assert!(drain(&rx).is_empty());
        client.shutdown();
    }

    #[test]
    fn reconnect_restores_and_refreshes() {
        let mock = seeded_backend();
        let (client, rx) = connected(&mock, AppConfig::default());

        client.dispatch(BackendEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        drain(&rx);
        client.dispatch(BackendEvent::ConnectionStatus(ConnectionStatus::Connected));
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert!(mock.is_open());
        let signals = drain(&rx);
        assert_eq!(signals[0], HostSignal::ConnectionRestored);
        assert!(signals.contains(&HostSignal::ChannelsChanged));
        assert!(signals.contains(&HostSignal::TimersChanged));
        client.shutdown();
    }

    #[test]
    fn housekeeping_coalesces_recording_notifications() {
        let mock = seeded_backend();
        let (client, rx) = connected(&mock, AppConfig::default());
        client.dispatch(BackendEvent::HousekeepingTick); // settle connect-time reload
        drain(&rx);

        mock.put_recording(recording(1001, 100, "a"));
        mock.put_recording(recording(1001, 200, "b"));
        client.dispatch(BackendEvent::RecordingListChange(RecordingChange::AddByTime {
            channel_id: 1001,
            recording_start: 100,
        }));
        client.dispatch(BackendEvent::RecordingListChange(RecordingChange::AddByTime {
            channel_id: 1001,
            recording_start: 200,
        }));
        assert!(drain(&rx).is_empty(), "mutations alone must not notify");

        client.dispatch(BackendEvent::HousekeepingTick);
        assert_eq!(drain(&rx), vec![HostSignal::RecordingsChanged]);
        client.dispatch(BackendEvent::HousekeepingTick);
        assert!(drain(&rx).is_empty(), "nothing new to report");
        assert_eq!(client.recordings_count(), 2);
        client.shutdown();
    }

    #[test]
    fn housekeeping_resets_stale_subscription() {
        let mock = seeded_backend();
        let (client, _rx) = connected(&mock, AppConfig::default());
        mock.set_stale(true);
        assert!(client.dispatch(BackendEvent::HousekeepingTick));
        assert!(!mock.is_stale());
        // Hanging connections are left to the reconnect flow instead
        mock.set_stale(true);
        client.dispatch(BackendEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        assert!(!client.dispatch(BackendEvent::HousekeepingTick));
        client.shutdown();
    }

    #[test]
    fn add_timer_submits_rule_when_nothing_to_promote() {
        let mock = seeded_backend();
        let (client, _rx) = connected(&mock, AppConfig::default());
        let before = mock.rules().len();
        let request = TimerRequest {
            channel_uid: Some(1001),
            start_time: now_ts() + 3600,
            end_time: now_ts() + 5400,
            title: "future show".into(),
            ..TimerRequest::default()
        };
        client.add_timer(&request).unwrap();
        assert_eq!(mock.rules().len(), before + 1);
        client.shutdown();
    }

    #[test]
    fn recording_edl_uses_millisecond_marks_on_current_backends() {
        use crate::client::edl::{EdlKind, EditMark, MarkKind};

        let mock = seeded_backend();
        let rec = recording(1001, 100, "a");
        let uid = rec.uid.clone();
        mock.put_recording(rec);
        mock.put_marks(
            &uid,
            vec![
                EditMark::new(MarkKind::BreakStart, 10_000),
                EditMark::new(MarkKind::BreakEnd, 30_000),
            ],
            vec![],
        );
        let (client, _rx) = connected(&mock, AppConfig::default());
        let edl = client.recording_edl(&uid).unwrap();
        assert_eq!(edl.len(), 1);
        assert_eq!(edl[0].kind, EdlKind::CommercialBreak);
        assert_eq!((edl[0].start_ms, edl[0].end_ms), (10_000, 30_000));
        client.shutdown();
    }

    #[test]
    fn recording_edl_needs_frame_rate_on_old_backends() {
        let mock = seeded_backend();
        mock.set_service_version(79);
        let rec = recording(1001, 100, "a");
        let uid = rec.uid.clone();
        mock.put_recording(rec);
        let (client, _rx) = connected(&mock, AppConfig::default());
        // Frame rate never probed: no usable unit, empty list
        assert!(client.recording_edl(&uid).unwrap().is_empty());
        client.shutdown();
    }

    #[test]
    fn bookmark_round_trip_uses_cache() {
        let mock = seeded_backend();
        let mut rec = recording(1001, 100, "a");
        rec.has_bookmark = true;
        let uid = rec.uid.clone();
        mock.put_recording(rec);
        mock.set_bookmark_value(&uid, MarkUnit::Milliseconds, 90_000);
        let (client, _rx) = connected(&mock, AppConfig::default());

        assert_eq!(client.last_played_position(&uid).unwrap(), 90);
        // Backend value changes, but the cache still answers
        mock.set_bookmark_value(&uid, MarkUnit::Milliseconds, 10_000);
        assert_eq!(client.last_played_position(&uid).unwrap(), 90);

        client.set_last_played_position(&uid, 120).unwrap();
        assert_eq!(mock.stored_bookmark(&uid, MarkUnit::Milliseconds), Some(120_000));
        assert_eq!(client.last_played_position(&uid).unwrap(), 120);
        client.shutdown();
    }

    #[test]
    fn purge_walks_every_deleted_recording() {
        let mock = seeded_backend();
        let mut gone = recording(1001, 100, "gone");
        gone.visible = false;
        gone.deleted = true;
        mock.put_recording(gone);
        mock.put_recording(recording(1001, 200, "kept"));
        let (client, _rx) = connected(&mock, AppConfig::default());

        client.purge_deleted_recordings().unwrap();
        assert_eq!(mock.deleted_uids(), vec![RecordingRecord::make_uid(1001, 100)]);
        client.shutdown();
    }

    #[test]
    fn marking_watched_defers_a_delete_prompt() {
        let mock = seeded_backend();
        let rec = recording(1001, 100, "a");
        let uid = rec.uid.clone();
        mock.put_recording(rec);
        let cfg = AppConfig { prompt_delete_at_end: true, ..AppConfig::default() };
        let (client, rx) = connected(&mock, cfg);

        client.set_watched(&uid, true).unwrap();
        let prompt = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(prompt, HostSignal::PromptDelete { uid, title: "a".into() });
        client.shutdown();
    }

    #[test]
    fn delete_recording_rejects_unknown_uid() {
        let mock = seeded_backend();
        let (client, _rx) = connected(&mock, AppConfig::default());
        assert_eq!(client.delete_recording("1001_42"), Err(PvrError::NotFound));
        client.shutdown();
    }

    #[test]
    fn stale_timer_handle_is_rejected_after_refresh() {
        use crate::client::backend::RuleSpec;

        let mock = seeded_backend();
        mock.put_rule(RuleSpec { rule_id: 7, title: "rule".into(), ..RuleSpec::default() });
        let (client, _rx) = connected(&mock, AppConfig::default());
        client.dispatch(BackendEvent::ScheduleChange);
        let handle = client.timers()[0].handle;

        // A schedule change reissues every index
        client.dispatch(BackendEvent::ScheduleChange);
        assert_eq!(client.delete_timer(handle), Err(PvrError::NotFound));
        client.shutdown();
    }
}
