// src/client/live.rs
//! The single live-viewing session and its conflicts with the scheduler.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

use crate::client::backend::{BackendControl, LiveStream, RecordedStream, TunerSource};
use crate::client::channels::ChannelCatalog;
use crate::client::errors::PvrError;
use crate::client::playback::PlaceholderStream;
use crate::client::recordings::RecordingCache;
use crate::client::schedule::{ScheduleTranslator, TimerHandle, TimerRequest};
use crate::client::types::{
    AskRecording, ChannelUid, HostSignal, MarkUnit, RecordingRecord, SeekWhence, SignalSnapshot,
};
use crate::config::ConflictStrategy;

struct RecordedSession {
    stream: Box<dyn RecordedStream>,
    info: RecordingRecord,
}

#[derive(Default)]
struct LiveInner {
    stream: Option<Box<dyn LiveStream>>,
    placeholder: Option<PlaceholderStream>,
    recorded: Option<RecordedSession>,
    /// Deferred teardown flag; honoured on the next read so the session is
    /// never torn down mid-call.
    stop_requested: bool,
    signal_cache: Option<SignalSnapshot>,
}

/// Times of the currently playing stream, clamped to wall clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamTimes {
    /// Zero for recordings, live window start for live TV.
    pub start_time: i64,
    pub duration_secs: i64,
}

/// Owns the one live session (and the recorded stream sharing its lock
/// domain). Where this lock and the recordings lock are both needed, this
/// one comes first.
pub struct LiveSessionCoordinator {
    inner: Mutex<LiveInner>,
    strategy: ConflictStrategy,
    tune_delay_secs: u32,
    limit_tune_attempts: bool,
    placeholder_path: Option<PathBuf>,
}

impl LiveSessionCoordinator {
    pub fn new(
        strategy: ConflictStrategy,
        tune_delay_secs: u32,
        limit_tune_attempts: bool,
        placeholder_path: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Mutex::new(LiveInner::default()),
            strategy,
            tune_delay_secs,
            limit_tune_attempts,
            placeholder_path,
        }
    }

    /// True while any stream (live, placeholder or recorded) is open.
    pub fn is_playing(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.stream.is_some() || inner.placeholder.is_some() || inner.recorded.is_some()
    }

    /// Open live TV on a canonical channel, trying every backend channel
    /// folded into it, first-listed preferred. A tuning failure degrades to
    /// the placeholder clip; only a missing placeholder is a hard error.
    pub fn open(
        &self,
        catalog: &ChannelCatalog,
        tuner: &dyn TunerSource,
        uid: ChannelUid,
        signals: &Sender<HostSignal>,
    ) -> Result<(), PvrError> {
        let mut inner = self.inner.lock().unwrap();
        let candidates = catalog.merged_set(uid);
        if candidates.is_empty() {
            error!("invalid channel {uid}");
            return Err(PvrError::NotFound);
        }
        if inner.stream.as_ref().is_some_and(|s| s.is_playing()) {
            return Err(PvrError::Conflict);
        }
        match tuner.spawn_live(&candidates, self.tune_delay_secs, self.limit_tune_attempts) {
            Ok(stream) => {
                inner.signal_cache = None;
                inner.stream = Some(stream);
                Ok(())
            }
            Err(err) => {
                error!("failed to open live stream: {err}");
                inner.stream = None;
                let opened = self
                    .placeholder_path
                    .as_deref()
                    .and_then(|path| match PlaceholderStream::open(path) {
                        Ok(stream) => Some(stream),
                        Err(err) => {
                            warn!("placeholder unavailable: {err}");
                            None
                        }
                    });
                match opened {
                    Some(stream) => {
                        inner.placeholder = Some(stream);
                        Ok(())
                    }
                    None => {
                        let _ = signals.send(HostSignal::Warning("Channel unavailable".into()));
                        Err(PvrError::OperationFailed)
                    }
                }
            }
        }
    }

    /// Release the live session and the placeholder unconditionally.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stream = None;
        inner.placeholder = None;
        inner.signal_cache = None;
        inner.stop_requested = false;
    }

    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        if inner.stop_requested {
            // A conflict arbitration asked for teardown; do it now
            inner.stream = None;
            inner.placeholder = None;
            inner.stop_requested = false;
            return 0;
        }
        if let Some(stream) = inner.stream.as_mut() {
            return stream.read(buf);
        }
        if let Some(placeholder) = inner.placeholder.as_mut() {
            return placeholder.read(buf);
        }
        0
    }

    pub fn seek(&self, position: i64, whence: SeekWhence) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stream) = inner.stream.as_mut() {
            stream.seek(position, whence)
        } else if let Some(placeholder) = inner.placeholder.as_mut() {
            placeholder.seek(position, whence)
        } else {
            -1
        }
    }

    pub fn length(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        if let Some(stream) = inner.stream.as_ref() {
            stream.size()
        } else if let Some(placeholder) = inner.placeholder.as_ref() {
            placeholder.size()
        } else {
            -1
        }
    }

    /// Latest signal-quality snapshot of the live session. Falls back to the
    /// cached value when the recorder has no fresh report.
    pub fn signal_status(&self) -> Result<SignalSnapshot, PvrError> {
        let mut inner = self.inner.lock().unwrap();
        let (card_id, fresh) = {
            let stream = inner.stream.as_ref().ok_or(PvrError::OperationFailed)?;
            (stream.card_id(), stream.signal())
        };
        if let Some(snapshot) = fresh {
            inner.signal_cache = Some(snapshot.clone());
            return Ok(snapshot);
        }
        Ok(inner
            .signal_cache
            .clone()
            .unwrap_or(SignalSnapshot { card_id, ..SignalSnapshot::default() }))
    }

    pub fn stream_times(&self, now: i64) -> Result<StreamTimes, PvrError> {
        let inner = self.inner.lock().unwrap();
        if let Some(stream) = inner.stream.as_ref() {
            if !stream.is_playing() {
                return Err(PvrError::OperationFailed);
            }
            let (begin, end) = stream.time_window().ok_or(PvrError::OperationFailed)?;
            return Ok(StreamTimes { start_time: begin, duration_secs: end.min(now) - begin });
        }
        if let Some(recorded) = inner.recorded.as_ref() {
            let begin = recorded.info.recording_start;
            let end = recorded.info.recording_end;
            return Ok(StreamTimes { start_time: 0, duration_secs: end.min(now) - begin });
        }
        Err(PvrError::OperationFailed)
    }

    /// Backend asks for the tuner the live session holds. Applies only when
    /// the conflict is on our card and still ahead.
    pub fn handle_ask_recording(
        &self,
        control: &dyn BackendControl,
        ask: &AskRecording,
        signals: &Sender<HostSignal>,
    ) {
        info!(
            "ask-recording: card={} until={} rec={} later={} title={}",
            ask.card_id, ask.seconds_until, ask.has_recording, ask.has_later_showing, ask.title
        );
        if ask.seconds_until < 0 || ask.card_id == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(stream) = inner.stream.as_ref() else {
            return;
        };
        if stream.card_id() != ask.card_id {
            return;
        }
        if self.strategy == ConflictStrategy::CancelRecording
            || (self.strategy == ConflictStrategy::PreferLaterShowing && ask.has_later_showing)
        {
            let _ = signals
                .send(HostSignal::Warning(format!("Canceling conflicting recording: {}", ask.title)));
            if let Err(err) = control.cancel_next_recording(ask.card_id) {
                error!("cancel next recording failed: {err}");
            }
        } else {
            let _ = signals.send(HostSignal::Warning(format!(
                "Stopping Live TV due to conflicting recording: {}",
                ask.title
            )));
            // Closes the live stream on the next read
            inner.stop_requested = true;
        }
    }

    /// A new timer whose channel and window cover the in-progress live
    /// program is a quick recording: keep the live buffer instead of
    /// creating an independent rule. `None` means no promotion applies.
    pub fn promote_quick_recording(
        &self,
        control: &dyn BackendControl,
        catalog: &ChannelCatalog,
        request: &TimerRequest,
    ) -> Option<Result<(), PvrError>> {
        let req_uid = request.channel_uid?;
        let mut inner = self.inner.lock().unwrap();
        let stream = inner.stream.as_mut()?;
        if !stream.is_playing() {
            return None;
        }
        let program = stream.program()?;
        if catalog.canonical_uid(program.channel_id) != Some(req_uid)
            || request.start_time > program.start_time
        {
            return None;
        }
        debug!("timer is a quick recording of live tv; toggling record on");
        if stream.is_live_recording() {
            info!("record already on, retrying");
        } else {
            // Bookmark the current offset so playback of the kept recording
            // can resume where the viewer is
            let marker = RecordingRecord {
                uid: RecordingRecord::make_uid(program.channel_id, program.start_time),
                channel_id: program.channel_id,
                start_time: program.start_time,
                recording_start: program.start_time,
                ..RecordingRecord::default()
            };
            if let Err(err) = control.set_bookmark(&marker, MarkUnit::Bytes, stream.position()) {
                debug!("bookmark for quick recording failed: {err}");
            }
        }
        if !stream.keep_recording(true) {
            // The host deadlocks on an error from this path, so report
            // success either way
            warn!("failed to toggle record on");
        }
        Some(Ok(()))
    }

    /// Deleting the timer that backs the live recording demotes the session
    /// instead of touching the rule. `None` means the timer is unrelated.
    pub fn demote_for_delete(
        &self,
        schedule: &ScheduleTranslator,
        handle: TimerHandle,
    ) -> Option<Result<(), PvrError>> {
        let mut inner = self.inner.lock().unwrap();
        let stream = inner.stream.as_mut()?;
        if !stream.is_live_recording() {
            return None;
        }
        let rule_id = schedule.rule_id_for(handle)?;
        let program = stream.program()?;
        let mine = schedule
            .upcoming_for_rule(rule_id)
            .iter()
            .any(|occ| occ.channel_id == program.channel_id && occ.start_time == program.start_time);
        if !mine {
            return None;
        }
        debug!("timer backs the live recording; toggling record off");
        Some(if stream.keep_recording(false) { Ok(()) } else { Err(PvrError::OperationFailed) })
    }

    /// Does this record describe the program the live session is playing?
    pub fn is_my_live_recording(&self, rec: &RecordingRecord) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .stream
            .as_ref()
            .filter(|s| s.is_playing())
            .and_then(|s| s.program())
            .is_some_and(|p| rec.same_program(p.channel_id, p.start_time))
    }

    pub fn keep_live_recording(&self, keep: bool) -> Result<(), PvrError> {
        let mut inner = self.inner.lock().unwrap();
        let stream = inner.stream.as_mut().ok_or(PvrError::OperationFailed)?;
        if stream.keep_recording(keep) {
            Ok(())
        } else {
            Err(PvrError::OperationFailed)
        }
    }

    // ---- recorded stream (same lock domain) ----

    /// Open a recorded stream and fill the record's lazily probed AV props.
    pub fn open_recorded(
        &self,
        tuner: &dyn TunerSource,
        cache: &RecordingCache,
        uid: &str,
    ) -> Result<(), PvrError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.recorded.is_some() {
            warn!("recorded stream is busy");
            return Err(PvrError::Conflict);
        }
        let info = cache.get(uid).ok_or(PvrError::NotFound)?;
        let stream = tuner.open_recorded(&info)?;
        if let Some((fps, aspect)) = stream.av_props() {
            cache.set_av_props(uid, fps, aspect);
        }
        inner.recorded = Some(RecordedSession { stream, info });
        Ok(())
    }

    pub fn close_recorded(&self) {
        self.inner.lock().unwrap().recorded = None;
    }

    pub fn read_recorded(&self, buf: &mut [u8]) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        match inner.recorded.as_mut() {
            Some(session) => session.stream.read(buf) as i64,
            None => -1,
        }
    }

    pub fn seek_recorded(&self, position: i64, whence: SeekWhence) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.recorded.as_mut() else {
            return -1;
        };
        let result = session.stream.seek(position, whence);
        // Hosts expect zero when seeking beyond the end of real data
        if result < 0 && session.stream.size() > 0 {
            return 0;
        }
        result
    }

    pub fn length_recorded(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        inner.recorded.as_ref().map(|s| s.stream.size()).unwrap_or(-1)
    }

    pub fn recorded_uid(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.recorded.as_ref().map(|s| s.info.uid.clone())
    }
}
