// src/client/recordings.rs
//! UID-keyed mirror of the backend recording library, mutated in place by
//! push events and reloadable as a whole.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, error};

use crate::client::backend::BackendControl;
use crate::client::errors::{BackendError, PvrError};
use crate::client::types::{ChannelId, ChannelUid, RecordingRecord};
use crate::config::GroupRecordings;

/// Most-recently-used bookmark, keyed by channel uid and recording time.
/// Saves a round-trip on the repeated position queries hosts like to issue.
#[derive(Clone, Copy, Debug)]
struct CachedBookmark {
    channel_uid: ChannelUid,
    recording_time: i64,
    position_secs: i64,
}

#[derive(Default)]
struct CacheInner {
    records: HashMap<String, RecordingRecord>,
    /// Mutations since the last housekeeping pass; consumed for coalesced
    /// host notification.
    dirty: u32,
    visible_stale: bool,
    deleted_stale: bool,
    visible_count: usize,
    deleted_count: usize,
    bookmark: Option<CachedBookmark>,
}

pub struct RecordingCache {
    inner: Mutex<CacheInner>,
    include_live_tv: bool,
}

impl RecordingCache {
    pub fn new(include_live_tv: bool) -> Self {
        Self { inner: Mutex::new(CacheInner::default()), include_live_tv }
    }

    fn counted(&self, rec: &RecordingRecord) -> bool {
        self.include_live_tv || !rec.is_live_tv
    }

    /// Discard everything and repopulate from a full backend listing. Safe
    /// against concurrent queries, not against itself.
    pub fn reload(&self, control: &dyn BackendControl) -> Result<usize, PvrError> {
        let programs = control.recorded_list()?;
        let mut inner = self.inner.lock().unwrap();
        inner.records.clear();
        inner.visible_count = 0;
        inner.deleted_count = 0;
        let mut count = 0usize;
        for prog in programs {
            inner.records.insert(prog.uid.clone(), prog);
            count += 1;
        }
        inner.visible_stale = true;
        inner.deleted_stale = true;
        inner.dirty += 1;
        debug!("reloaded {count} recording(s)");
        Ok(count)
    }

    /// Insert a recording announced by channel and start time. The backend
    /// is known to repeat ADD events, so a UID already present is a no-op.
    pub fn apply_add_by_time(
        &self,
        control: &dyn BackendControl,
        channel_id: ChannelId,
        recording_start: i64,
    ) {
        match control.recorded_by_time(channel_id, recording_start) {
            Ok(prog) => self.insert_if_absent(prog),
            Err(err) => error!("add recording failed for {channel_id} {recording_start}: {err}"),
        }
    }

    pub fn apply_add_by_id(&self, control: &dyn BackendControl, recorded_id: u32) {
        match control.recorded_by_id(recorded_id) {
            Ok(prog) => self.insert_if_absent(prog),
            Err(err) => error!("add recording failed for {recorded_id}: {err}"),
        }
    }

    fn insert_if_absent(&self, prog: RecordingRecord) {
        let mut inner = self.inner.lock().unwrap();
        if inner.records.contains_key(&prog.uid) {
            return;
        }
        debug!("add recording {}", prog.uid);
        inner.records.insert(prog.uid.clone(), prog);
        inner.dirty += 1;
    }

    /// Replace a record in place, keeping the locally derived props and the
    /// original air date when the incoming record has none. Unknown UIDs are
    /// ignored: the record may be filtered out or not loaded yet.
    pub fn apply_update(&self, mut prog: RecordingRecord) {
        let mut inner = self.inner.lock().unwrap();
        let Some(existing) = inner.records.get(&prog.uid) else {
            return;
        };
        debug!("update recording {}", prog.uid);
        prog.props = existing.props;
        if prog.airdate == 0 {
            prog.airdate = existing.airdate;
        }
        inner.records.insert(prog.uid.clone(), prog);
        inner.dirty += 1;
    }

    /// Remove by announced channel and start time. The backend sends the
    /// delete twice (request, then confirmation); only the first finds the
    /// record, so the operation is naturally idempotent.
    pub fn apply_delete_by_time(&self, channel_id: ChannelId, recording_start: i64) {
        let uid = RecordingRecord::make_uid(channel_id, recording_start);
        self.remove_by_uid(&uid);
    }

    pub fn apply_delete_by_id(&self, control: &dyn BackendControl, recorded_id: u32) {
        match control.recorded_by_id(recorded_id) {
            Ok(prog) => self.remove_by_uid(&prog.uid),
            // Second delete event: the backend no longer knows the program
            Err(BackendError::Missing) => {}
            Err(err) => debug!("delete lookup failed for {recorded_id}: {err}"),
        }
    }

    fn remove_by_uid(&self, uid: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.records.remove(uid).is_some() {
            debug!("delete recording {uid}");
            inner.dirty += 1;
        }
    }

    /// Housekeeping hook: report and clear the dirty counter, flagging the
    /// cached counts for recomputation. Returns true when the host should be
    /// notified (at most once per pass).
    pub fn take_dirty(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.dirty == 0 {
            return false;
        }
        inner.dirty = 0;
        inner.visible_stale = true;
        inner.deleted_stale = true;
        true
    }

    /// Cached count of visible recordings; a linear scan on every poll would
    /// be wasted work, so it only reruns after mutations.
    pub fn visible_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        if inner.visible_stale {
            let count =
                inner.records.values().filter(|r| r.visible && self.counted(r)).count();
            inner.visible_count = count;
            inner.visible_stale = false;
        }
        inner.visible_count
    }

    pub fn deleted_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        if inner.deleted_stale {
            let count =
                inner.records.values().filter(|r| r.deleted && self.counted(r)).count();
            inner.deleted_count = count;
            inner.deleted_stale = false;
        }
        inner.deleted_count
    }

    pub fn get(&self, uid: &str) -> Option<RecordingRecord> {
        self.inner.lock().unwrap().records.get(uid).cloned()
    }

    pub fn find_program(&self, channel_id: ChannelId, start_time: i64) -> Option<RecordingRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .records
            .values()
            .find(|r| r.same_program(channel_id, start_time))
            .cloned()
    }

    /// Snapshot of the visible (or deleted) records, with the series flag
    /// derived when grouping asks for it: a (recording group, title) pair
    /// seen more than once marks all its members.
    pub fn list(&self, deleted: bool, grouping: GroupRecordings) -> Vec<RecordingRecord> {
        let mut inner = self.inner.lock().unwrap();
        if grouping == GroupRecordings::OnlySeries && !deleted {
            let mut first_seen: HashMap<(String, String), String> = HashMap::new();
            let mut series: Vec<String> = Vec::new();
            for rec in inner.records.values() {
                if !rec.visible || !self.counted(rec) {
                    continue;
                }
                let key = (rec.recording_group.clone(), rec.title.clone());
                match first_seen.get(&key) {
                    Some(first) => {
                        series.push(first.clone());
                        series.push(rec.uid.clone());
                    }
                    None => {
                        first_seen.insert(key, rec.uid.clone());
                    }
                }
            }
            for uid in series {
                if let Some(rec) = inner.records.get_mut(&uid) {
                    rec.props.series = true;
                }
            }
        }
        inner
            .records
            .values()
            .filter(|r| if deleted { r.deleted } else { r.visible })
            .filter(|r| self.counted(r))
            .cloned()
            .collect()
    }

    /// Refetch one record after a backend-side mutation, keeping local props.
    pub fn force_update(&self, control: &dyn BackendControl, uid: &str) {
        let fetched = {
            let inner = self.inner.lock().unwrap();
            let Some(existing) = inner.records.get(uid) else {
                return;
            };
            (existing.channel_id, existing.recording_start)
        };
        if let Ok(mut prog) = control.recorded_by_time(fetched.0, fetched.1) {
            let mut inner = self.inner.lock().unwrap();
            if let Some(existing) = inner.records.get(uid) {
                prog.props = existing.props;
                inner.records.insert(prog.uid.clone(), prog);
                inner.dirty += 1;
            }
        }
    }

    pub fn set_av_props(&self, uid: &str, frame_rate: f32, aspect: f32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(rec) = inner.records.get_mut(uid) {
            rec.props.frame_rate = Some(frame_rate);
            rec.props.aspect = Some(aspect);
        }
    }

    pub fn cached_position(&self, channel_uid: ChannelUid, recording_time: i64) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .bookmark
            .filter(|b| b.channel_uid == channel_uid && b.recording_time == recording_time)
            .map(|b| b.position_secs)
    }

    pub fn store_position(&self, channel_uid: ChannelUid, recording_time: i64, position_secs: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.bookmark = Some(CachedBookmark { channel_uid, recording_time, position_secs });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MockBackend;

    fn rec(channel_id: u32, start: i64, title: &str) -> RecordingRecord {
        RecordingRecord {
            uid: RecordingRecord::make_uid(channel_id, start),
            channel_id,
            recorded_id: start as u32,
            title: title.into(),
            recording_group: "Default".into(),
            start_time: start,
            recording_start: start,
            visible: true,
            ..RecordingRecord::default()
        }
    }

    fn cache_uids(cache: &RecordingCache) -> Vec<String> {
        let mut uids: Vec<String> =
            cache.inner.lock().unwrap().records.keys().cloned().collect();
        uids.sort();
        uids
    }

    #[test]
    fn replayed_events_converge_to_reload() {
        let backend = MockBackend::new();
        backend.put_recording(rec(1, 100, "a"));
        backend.put_recording(rec(1, 200, "b"));

        let replayed = RecordingCache::new(true);
        replayed.apply_add_by_time(&backend, 1, 100);
        replayed.apply_add_by_time(&backend, 1, 200);
        replayed.apply_add_by_time(&backend, 1, 200); // duplicate ADD
        backend.put_recording(rec(1, 300, "c"));
        replayed.apply_add_by_time(&backend, 1, 300);
        backend.remove_recording(&RecordingRecord::make_uid(1, 100));
        replayed.apply_delete_by_time(1, 100);

        let reloaded = RecordingCache::new(true);
        reloaded.reload(&backend).unwrap();
        assert_eq!(cache_uids(&replayed), cache_uids(&reloaded));
    }

    #[test]
    fn duplicate_add_is_a_noop() {
        let backend = MockBackend::new();
        backend.put_recording(rec(1, 100, "a"));
        let cache = RecordingCache::new(true);
        cache.apply_add_by_time(&backend, 1, 100);
        assert!(cache.take_dirty());
        cache.apply_add_by_time(&backend, 1, 100);
        assert_eq!(cache.visible_count(), 1);
        assert!(!cache.take_dirty());
    }

    #[test]
    fn delete_is_idempotent() {
        let backend = MockBackend::new();
        backend.put_recording(rec(1, 100, "a"));
        let cache = RecordingCache::new(true);
        cache.reload(&backend).unwrap();
        cache.apply_delete_by_time(1, 100);
        cache.apply_delete_by_time(1, 100);
        assert_eq!(cache.visible_count(), 0);
        assert!(cache.get(&RecordingRecord::make_uid(1, 100)).is_none());
    }

    #[test]
    fn update_preserves_props_and_airdate() {
        let backend = MockBackend::new();
        let mut original = rec(1, 100, "a");
        original.airdate = 1_600_000_000;
        backend.put_recording(original);
        let cache = RecordingCache::new(true);
        cache.reload(&backend).unwrap();
        cache.set_av_props(&RecordingRecord::make_uid(1, 100), 25.0, 1.78);

        let mut update = rec(1, 100, "a (renamed)");
        update.airdate = 0;
        cache.apply_update(update);

        let stored = cache.get(&RecordingRecord::make_uid(1, 100)).unwrap();
        assert_eq!(stored.title, "a (renamed)");
        assert_eq!(stored.airdate, 1_600_000_000);
        assert_eq!(stored.props.frame_rate, Some(25.0));
    }

    #[test]
    fn update_for_unknown_uid_is_ignored() {
        let cache = RecordingCache::new(true);
        cache.apply_update(rec(9, 900, "ghost"));
        assert_eq!(cache.visible_count(), 0);
        assert!(!cache.take_dirty());
    }

    #[test]
    fn counts_skip_live_tv_when_configured() {
        let backend = MockBackend::new();
        let mut live = rec(1, 100, "live");
        live.is_live_tv = true;
        backend.put_recording(live);
        backend.put_recording(rec(1, 200, "normal"));

        let cache = RecordingCache::new(false);
        cache.reload(&backend).unwrap();
        assert_eq!(cache.visible_count(), 1);
    }

    #[test]
    fn series_flag_derived_for_repeated_titles() {
        let backend = MockBackend::new();
        backend.put_recording(rec(1, 100, "Nova"));
        backend.put_recording(rec(1, 200, "Nova"));
        backend.put_recording(rec(1, 300, "One-off"));
        let cache = RecordingCache::new(true);
        cache.reload(&backend).unwrap();

        let list = cache.list(false, GroupRecordings::OnlySeries);
        let series: Vec<bool> = list
            .iter()
            .filter(|r| r.title == "Nova")
            .map(|r| r.props.series)
            .collect();
        assert_eq!(series, vec![true, true]);
        assert!(!list.iter().find(|r| r.title == "One-off").unwrap().props.series);
    }

    #[test]
    fn bookmark_cache_keeps_last_entry_only() {
        let cache = RecordingCache::new(true);
        cache.store_position(10, 100, 30);
        assert_eq!(cache.cached_position(10, 100), Some(30));
        cache.store_position(11, 200, 60);
        assert_eq!(cache.cached_position(10, 100), None);
        assert_eq!(cache.cached_position(11, 200), Some(60));
    }
}
