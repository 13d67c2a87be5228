// src/client/http.rs
//! Reference control link speaking the backend's JSON service API over
//! HTTP. Pure pass-through plumbing: every method is a request, a decode
//! and a field map, with no synchronization logic of its own.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::backend::{
    BackendControl, DriveSpace, GuideEntry, Occurrence, RuleSpec, VideoSource,
};
use crate::client::edl::{EditMark, MarkKind};
use crate::client::errors::{BackendError, ConnectError};
use crate::client::types::{
    Channel, ChannelId, DupMethod, MarkUnit, RecStatus, RecordingRecord, TimerKind,
};
use crate::config::AppConfig;

/// Oldest service API this client can drive.
const MIN_SERVICE_VERSION: u32 = 75;

const FL_BOOKMARK: u64 = 0x0000_0010;
const FL_WATCHED: u64 = 0x0000_0200;
const VID_DAMAGED: u64 = 0x0000_0400;

pub struct HttpBackend {
    base: String,
    pin: String,
    client: Client,
    open: AtomicBool,
    stale: AtomicBool,
    service_version: AtomicU32,
    hostname: Mutex<String>,
    version: Mutex<String>,
}

impl HttpBackend {
    pub fn new(cfg: &AppConfig) -> Result<Self, String> {
        let client = Client::builder()
            .user_agent("mythpvr/control")
            .timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| format!("http client: {e}"))?;
        Ok(Self {
            base: format!("http://{}:{}", cfg.host, cfg.wsapi_port),
            pin: cfg.security_pin.clone(),
            client,
            open: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            service_version: AtomicU32::new(0),
            hostname: Mutex::new(String::new()),
            version: Mutex::new(String::new()),
        })
    }

    fn request(&self, service: &str, params: &[(&str, String)]) -> Result<Value, BackendError> {
        let mut url = format!("{}/{}", self.base, service);
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .chain(std::iter::once(format!("Pin={}", urlencoding::encode(&self.pin))))
            .join("&");
        url.push('?');
        url.push_str(&query);
        let response = self.client.get(&url).send().inspect_err(|err| {
            if err.is_timeout() {
                // Flag for the housekeeping staleness probe
                self.stale.store(true, Ordering::SeqCst);
            }
        })?;
        let response = response.error_for_status()?;
        Ok(response.json::<Value>()?)
    }
}

// ---- json field helpers ----

fn field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    Some(cursor)
}

fn text(value: &Value, path: &[&str]) -> String {
    field(value, path).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Numbers arrive either bare or as quoted strings depending on the backend
/// version; accept both.
fn number(value: &Value, path: &[&str]) -> i64 {
    match field(value, path) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn boolean(value: &Value, path: &[&str]) -> bool {
    match field(value, path) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "1",
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

fn timestamp(value: &Value, path: &[&str]) -> i64 {
    field(value, path)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

fn iso_time(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

fn items<'a>(value: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    field(value, path).and_then(Value::as_array).map(|a| a.iter().collect()).unwrap_or_default()
}

fn offset_type(unit: MarkUnit) -> String {
    match unit {
        MarkUnit::Frames => "Frames".into(),
        MarkUnit::Bytes => "Position".into(),
        MarkUnit::Milliseconds => "Duration".into(),
    }
}

// ---- wire decoding ----

fn decode_channel(v: &Value) -> Channel {
    Channel {
        id: number(v, &["ChanId"]) as ChannelId,
        number: text(v, &["ChanNum"]),
        callsign: text(v, &["CallSign"]),
        name: text(v, &["ChannelName"]),
        number_major: number(v, &["ATSCMajorChan"]) as u32,
        number_minor: number(v, &["ATSCMinorChan"]) as u32,
        is_radio: boolean(v, &["Radio"]),
        visible: boolean(v, &["Visible"]),
        icon_path: text(v, &["IconURL"]),
    }
}

fn decode_recording(v: &Value) -> RecordingRecord {
    let channel_id = number(v, &["Channel", "ChanId"]) as ChannelId;
    let recording_start = timestamp(v, &["Recording", "StartTs"]);
    let recording_end = timestamp(v, &["Recording", "EndTs"]);
    let group = text(v, &["Recording", "RecGroup"]);
    let flags = number(v, &["ProgramFlags"]) as u64;
    let video_props = number(v, &["VideoProps"]) as u64;
    let deleted = group == "Deleted";
    RecordingRecord {
        uid: RecordingRecord::make_uid(channel_id, recording_start),
        recorded_id: number(v, &["Recording", "RecordedId"]) as u32,
        channel_id,
        channel_name: text(v, &["Channel", "ChannelName"]),
        title: text(v, &["Title"]),
        subtitle: text(v, &["SubTitle"]),
        description: text(v, &["Description"]),
        category: text(v, &["Category"]),
        recording_group: group.clone(),
        season: number(v, &["Season"]) as u32,
        episode: number(v, &["Episode"]) as u32,
        airdate: timestamp(v, &["Airdate"]),
        start_time: timestamp(v, &["StartTime"]),
        end_time: timestamp(v, &["EndTime"]),
        recording_start,
        recording_end,
        duration: (recording_end - recording_start).max(0),
        visible: !deleted,
        deleted,
        watched: flags & FL_WATCHED != 0,
        has_bookmark: flags & FL_BOOKMARK != 0,
        damaged: video_props & VID_DAMAGED != 0,
        is_live_tv: group == "LiveTV",
        hostname: text(v, &["HostName"]),
        props: Default::default(),
    }
}

fn decode_guide_entry(v: &Value) -> GuideEntry {
    GuideEntry {
        channel_id: number(v, &["Channel", "ChanId"]) as ChannelId,
        callsign: text(v, &["Channel", "CallSign"]),
        start_time: timestamp(v, &["StartTime"]),
        end_time: timestamp(v, &["EndTime"]),
        title: text(v, &["Title"]),
        subtitle: text(v, &["SubTitle"]),
        description: text(v, &["Description"]),
        category: text(v, &["Category"]),
        season: number(v, &["Season"]) as u32,
        episode: number(v, &["Episode"]) as u32,
        series_id: text(v, &["SeriesId"]),
    }
}

fn decode_mark(v: &Value) -> Option<EditMark> {
    let kind = match number(v, &["Type"]) {
        4 => MarkKind::BreakStart,
        5 => MarkKind::BreakEnd,
        1 => MarkKind::CutStart,
        0 => MarkKind::CutEnd,
        _ => return None,
    };
    Some(EditMark::new(kind, number(v, &["Offset"])))
}

fn rule_type_name(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Single => "Single Record",
        TimerKind::Daily => "Record Daily",
        TimerKind::Weekly => "Record Weekly",
        TimerKind::All => "Record All",
        TimerKind::TextSearch => "Record All",
        TimerKind::DontRecord => "Do not Record",
    }
}

fn rule_kind(type_name: &str, search: &str) -> TimerKind {
    if !search.is_empty() {
        return TimerKind::TextSearch;
    }
    match type_name {
        "Record Daily" => TimerKind::Daily,
        "Record Weekly" => TimerKind::Weekly,
        "Record All" => TimerKind::All,
        "Do not Record" | "Override Record" => TimerKind::DontRecord,
        _ => TimerKind::Single,
    }
}

fn decode_rule(v: &Value) -> RuleSpec {
    let search = text(v, &["Description"]);
    let search_type = text(v, &["SearchType"]);
    let keyword = if search_type == "Keyword Search" { search } else { String::new() };
    let channel_id = number(v, &["ChanId"]) as ChannelId;
    RuleSpec {
        rule_id: number(v, &["Id"]) as u32,
        kind: rule_kind(&text(v, &["Type"]), &keyword),
        channel_id: (channel_id != 0).then_some(channel_id),
        callsign: text(v, &["CallSign"]),
        start_time: Some(timestamp(v, &["StartTime"])).filter(|t| *t > 0),
        end_time: Some(timestamp(v, &["EndTime"])).filter(|t| *t > 0),
        title: text(v, &["Title"]),
        description: text(v, &["Description"]),
        category: text(v, &["Category"]),
        search_text: keyword,
        priority: number(v, &["RecPriority"]) as i32,
        expiration: number(v, &["AutoExpire"]) as u32,
        recording_group: number(v, &["RecGroupId"]) as u32,
        dup_method: DupMethod::from_code(number(v, &["DupMethod"]) as u32),
        inactive: boolean(v, &["Inactive"]),
        margin_start_mins: number(v, &["StartOffset"]) as u32,
        margin_end_mins: number(v, &["EndOffset"]) as u32,
    }
}

fn encode_rule(rule: &RuleSpec) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = vec![
        ("Type", rule_type_name(rule.kind).into()),
        ("Title", rule.title.clone()),
        ("Description", rule.description.clone()),
        ("Category", rule.category.clone()),
        ("Station", rule.callsign.clone()),
        ("RecPriority", rule.priority.to_string()),
        ("AutoExpire", rule.expiration.to_string()),
        ("RecGroupId", rule.recording_group.to_string()),
        ("DupMethod", rule.dup_method.as_code().to_string()),
        ("Inactive", rule.inactive.to_string()),
        ("StartOffset", rule.margin_start_mins.to_string()),
        ("EndOffset", rule.margin_end_mins.to_string()),
    ];
    if let Some(channel_id) = rule.channel_id {
        params.push(("ChanId", channel_id.to_string()));
    }
    if let Some(start) = rule.start_time {
        params.push(("StartTime", iso_time(start)));
    }
    if let Some(end) = rule.end_time {
        params.push(("EndTime", iso_time(end)));
    }
    if !rule.search_text.is_empty() {
        params.push(("SearchType", "Keyword Search".into()));
        params.push(("Keyword", rule.search_text.clone()));
    }
    params
}

fn decode_upcoming(v: &Value) -> Occurrence {
    Occurrence {
        rule_id: number(v, &["Recording", "RecordId"]) as u32,
        channel_id: number(v, &["Channel", "ChanId"]) as ChannelId,
        start_time: timestamp(v, &["StartTime"]),
        end_time: timestamp(v, &["EndTime"]),
        title: text(v, &["Title"]),
        description: text(v, &["Description"]),
        category: text(v, &["Category"]),
        status: RecStatus::from_code(number(v, &["Recording", "Status"]) as i32),
    }
}

impl BackendControl for HttpBackend {
    fn open(&self) -> Result<(), ConnectError> {
        let host = match self.request("Myth/GetHostName", &[]) {
            Ok(v) => text(&v, &["String"]),
            Err(err) => {
                debug!("backend probe failed: {err}");
                return Err(ConnectError::Unreachable);
            }
        };
        let version = self
            .request("Myth/GetBackendInfo", &[])
            .map(|v| text(&v, &["BackendInfo", "Build", "Version"]))
            .unwrap_or_default();
        let service = self
            .request("Dvr/version", &[])
            .map(|v| number(&v, &["String"]) as u32)
            .unwrap_or(0);
        if service > 0 && service < MIN_SERVICE_VERSION {
            warn!("backend service version {service} is below {MIN_SERVICE_VERSION}");
            return Err(ConnectError::UnsupportedVersion);
        }
        *self.hostname.lock().unwrap() = host;
        *self.version.lock().unwrap() = version;
        self.service_version.store(service, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn check_service(&self) -> u32 {
        self.service_version.load(Ordering::SeqCst)
    }

    fn server_hostname(&self) -> String {
        self.hostname.lock().unwrap().clone()
    }

    fn backend_version(&self) -> String {
        self.version.lock().unwrap().clone()
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn clear_stale(&self) {
        self.stale.store(false, Ordering::SeqCst);
    }

    fn video_sources(&self) -> Result<Vec<VideoSource>, BackendError> {
        let v = self.request("Channel/GetVideoSourceList", &[])?;
        Ok(items(&v, &["VideoSourceList", "VideoSources"])
            .into_iter()
            .map(|s| VideoSource {
                source_id: number(s, &["Id"]) as u32,
                source_name: text(s, &["SourceName"]),
            })
            .collect())
    }

    fn channels(&self, source_id: u32) -> Result<Vec<Channel>, BackendError> {
        let v = self.request(
            "Channel/GetChannelInfoList",
            &[("SourceID", source_id.to_string()), ("Details", "true".into())],
        )?;
        Ok(items(&v, &["ChannelInfoList", "ChannelInfos"])
            .into_iter()
            .map(decode_channel)
            .collect())
    }

    fn recorded_list(&self) -> Result<Vec<RecordingRecord>, BackendError> {
        let v = self.request("Dvr/GetRecordedList", &[])?;
        Ok(items(&v, &["ProgramList", "Programs"]).into_iter().map(decode_recording).collect())
    }

    fn recorded_by_time(
        &self,
        channel_id: ChannelId,
        recording_start: i64,
    ) -> Result<RecordingRecord, BackendError> {
        let v = self.request(
            "Dvr/GetRecorded",
            &[("ChanId", channel_id.to_string()), ("StartTime", iso_time(recording_start))],
        )?;
        let program = field(&v, &["Program"]).ok_or(BackendError::Missing)?;
        let rec = decode_recording(program);
        if rec.channel_id == 0 {
            return Err(BackendError::Missing);
        }
        Ok(rec)
    }

    fn recorded_by_id(&self, recorded_id: u32) -> Result<RecordingRecord, BackendError> {
        let v = self.request("Dvr/GetRecorded", &[("RecordedId", recorded_id.to_string())])?;
        let program = field(&v, &["Program"]).ok_or(BackendError::Missing)?;
        let rec = decode_recording(program);
        if rec.channel_id == 0 {
            return Err(BackendError::Missing);
        }
        Ok(rec)
    }

    fn delete_recording(
        &self,
        rec: &RecordingRecord,
        force: bool,
        rerecord: bool,
    ) -> Result<(), BackendError> {
        let v = self.request(
            "Dvr/DeleteRecording",
            &[
                ("ChanId", rec.channel_id.to_string()),
                ("StartTime", iso_time(rec.recording_start)),
                ("ForceDelete", force.to_string()),
                ("AllowRerecord", rerecord.to_string()),
            ],
        )?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("DeleteRecording returned false".into()))
        }
    }

    fn undelete_recording(&self, rec: &RecordingRecord) -> Result<(), BackendError> {
        let v = self.request(
            "Dvr/UnDeleteRecording",
            &[("ChanId", rec.channel_id.to_string()), ("StartTime", iso_time(rec.recording_start))],
        )?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("UnDeleteRecording returned false".into()))
        }
    }

    fn set_watched(&self, rec: &RecordingRecord, watched: bool) -> Result<(), BackendError> {
        let v = self.request(
            "Dvr/UpdateRecordedWatchedStatus",
            &[("RecordedId", rec.recorded_id.to_string()), ("Watched", watched.to_string())],
        )?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("UpdateRecordedWatchedStatus returned false".into()))
        }
    }

    fn set_bookmark(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
        value: i64,
    ) -> Result<(), BackendError> {
        let v = self.request(
            "Dvr/SetSavedBookmark",
            &[
                ("RecordedId", rec.recorded_id.to_string()),
                ("OffsetType", offset_type(unit)),
                ("Offset", value.to_string()),
            ],
        )?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("SetSavedBookmark returned false".into()))
        }
    }

    fn bookmark(&self, rec: &RecordingRecord, unit: MarkUnit) -> Result<i64, BackendError> {
        let v = self.request(
            "Dvr/GetSavedBookmark",
            &[("RecordedId", rec.recorded_id.to_string()), ("OffsetType", offset_type(unit))],
        )?;
        Ok(number(&v, &["long"]))
    }

    fn program_guide(
        &self,
        channel_id: ChannelId,
        start: i64,
        end: i64,
    ) -> Result<Vec<GuideEntry>, BackendError> {
        let v = self.request(
            "Guide/GetProgramList",
            &[
                ("ChanId", channel_id.to_string()),
                ("StartTime", iso_time(start)),
                ("EndTime", iso_time(end)),
                ("Details", "true".into()),
            ],
        )?;
        Ok(items(&v, &["ProgramList", "Programs"]).into_iter().map(decode_guide_entry).collect())
    }

    fn comm_break_marks(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
    ) -> Result<Vec<EditMark>, BackendError> {
        let v = self.request(
            "Dvr/GetRecordedCommBreak",
            &[("RecordedId", rec.recorded_id.to_string()), ("OffsetType", offset_type(unit))],
        )?;
        Ok(items(&v, &["CutList", "Cuttings"]).into_iter().filter_map(decode_mark).collect())
    }

    fn cut_marks(
        &self,
        rec: &RecordingRecord,
        unit: MarkUnit,
    ) -> Result<Vec<EditMark>, BackendError> {
        let v = self.request(
            "Dvr/GetRecordedCutList",
            &[("RecordedId", rec.recorded_id.to_string()), ("OffsetType", offset_type(unit))],
        )?;
        Ok(items(&v, &["CutList", "Cuttings"]).into_iter().filter_map(decode_mark).collect())
    }

    fn schedule_rules(&self) -> Result<Vec<RuleSpec>, BackendError> {
        let v = self.request("Dvr/GetRecordScheduleList", &[])?;
        Ok(items(&v, &["RecRuleList", "RecRules"]).into_iter().map(decode_rule).collect())
    }

    fn upcoming(&self) -> Result<Vec<Occurrence>, BackendError> {
        let v = self.request("Dvr/GetUpcomingList", &[("ShowAll", "true".into())])?;
        Ok(items(&v, &["ProgramList", "Programs"]).into_iter().map(decode_upcoming).collect())
    }

    fn add_rule(&self, rule: &RuleSpec) -> Result<u32, BackendError> {
        let params = encode_rule(rule);
        let v = self.request("Dvr/AddRecordSchedule", &params)?;
        let id = number(&v, &["uint"]) as u32;
        if id == 0 {
            return Err(BackendError::Rejected("AddRecordSchedule returned 0".into()));
        }
        Ok(id)
    }

    fn update_rule(&self, rule: &RuleSpec) -> Result<(), BackendError> {
        let mut params = encode_rule(rule);
        params.push(("RecordId", rule.rule_id.to_string()));
        let v = self.request("Dvr/UpdateRecordSchedule", &params)?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("UpdateRecordSchedule returned false".into()))
        }
    }

    fn remove_rule(&self, rule_id: u32) -> Result<(), BackendError> {
        let v =
            self.request("Dvr/RemoveRecordSchedule", &[("RecordId", rule_id.to_string())])?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("RemoveRecordSchedule returned false".into()))
        }
    }

    fn cancel_next_recording(&self, card_id: u32) -> Result<(), BackendError> {
        let v = self.request(
            "Dvr/CancelNextRecording",
            &[("CardId", card_id.to_string()), ("Cancel", "true".into())],
        )?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("CancelNextRecording returned false".into()))
        }
    }

    fn free_space(&self) -> Result<DriveSpace, BackendError> {
        let v = self.request("Myth/GetFreeSpaceSummary", &[])?;
        Ok(DriveSpace {
            total_kb: number(&v, &["FreeSpaceSummary", "TotalKB"]),
            used_kb: number(&v, &["FreeSpaceSummary", "UsedKB"]),
        })
    }

    fn setting(&self, key: &str, host_bound: bool) -> Result<Option<String>, BackendError> {
        let mut params = vec![("Key", key.to_string())];
        if host_bound {
            params.push(("HostName", self.server_hostname()));
        }
        let v = self.request("Myth/GetSetting", &params)?;
        let value = text(&v, &["String"]);
        Ok((!value.is_empty()).then_some(value))
    }

    fn put_setting(&self, key: &str, value: &str, host_bound: bool) -> Result<(), BackendError> {
        let mut params = vec![("Key", key.to_string()), ("Value", value.to_string())];
        if host_bound {
            params.push(("HostName", self.server_hostname()));
        }
        let v = self.request("Myth/PutSetting", &params)?;
        if boolean(&v, &["bool"]) {
            Ok(())
        } else {
            Err(BackendError::Rejected("PutSetting returned false".into()))
        }
    }

    fn block_shutdown(&self) -> Result<(), BackendError> {
        self.request("Myth/BlockShutdown", &[]).map(|_| ())
    }

    fn allow_shutdown(&self) -> Result<(), BackendError> {
        self.request("Myth/AllowShutdown", &[]).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_recording_fields_and_flags() {
        let v = json!({
            "Title": "Nova",
            "SubTitle": "Black Holes",
            "Category": "Documentary",
            "StartTime": "2024-03-01T20:00:00Z",
            "EndTime": "2024-03-01T21:00:00Z",
            "Airdate": "2020-01-10T00:00:00Z",
            "ProgramFlags": (FL_WATCHED | FL_BOOKMARK).to_string(),
            "VideoProps": VID_DAMAGED,
            "HostName": "backend1",
            "Channel": {"ChanId": 1084, "ChannelName": "KTWO"},
            "Recording": {
                "RecordedId": 42,
                "StartTs": "2024-03-01T19:58:00Z",
                "EndTs": "2024-03-01T21:02:00Z",
                "RecGroup": "Default"
            }
        });
        let rec = decode_recording(&v);
        assert_eq!(rec.uid, format!("1084_{}", rec.recording_start));
        assert_eq!(rec.recorded_id, 42);
        assert_eq!(rec.duration, 3840);
        assert!(rec.watched && rec.has_bookmark && rec.damaged);
        assert!(rec.visible && !rec.deleted && !rec.is_live_tv);
    }

    #[test]
    fn deleted_group_marks_record_invisible() {
        let v = json!({
            "Channel": {"ChanId": 1},
            "Recording": {"StartTs": "2024-03-01T19:58:00Z", "RecGroup": "Deleted"}
        });
        let rec = decode_recording(&v);
        assert!(rec.deleted && !rec.visible);
    }

    #[test]
    fn decodes_rule_search_mode() {
        let v = json!({
            "Id": 12,
            "Type": "Record All",
            "SearchType": "Keyword Search",
            "Description": "star trek",
            "ChanId": 0,
            "Title": "search rule"
        });
        let rule = decode_rule(&v);
        assert_eq!(rule.kind, TimerKind::TextSearch);
        assert_eq!(rule.search_text, "star trek");
        assert_eq!(rule.channel_id, None);
    }

    #[test]
    fn encodes_rule_window_and_search() {
        let rule = RuleSpec {
            kind: TimerKind::All,
            channel_id: Some(1084),
            start_time: Some(1_700_000_000),
            search_text: "news".into(),
            title: "t".into(),
            ..RuleSpec::default()
        };
        let params = encode_rule(&rule);
        let get = |k: &str| params.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone());
        assert_eq!(get("ChanId").as_deref(), Some("1084"));
        assert_eq!(get("SearchType").as_deref(), Some("Keyword Search"));
        assert!(get("StartTime").unwrap().ends_with('Z'));
        assert_eq!(get("EndTime"), None);
    }

    #[test]
    fn upcoming_status_maps_through_wire_codes() {
        let v = json!({
            "Title": "show",
            "StartTime": "2024-03-01T20:00:00Z",
            "EndTime": "2024-03-01T21:00:00Z",
            "Channel": {"ChanId": 1084},
            "Recording": {"RecordId": 12, "Status": -1}
        });
        let occ = decode_upcoming(&v);
        assert_eq!(occ.status, RecStatus::WillRecord);
        assert_eq!(occ.rule_id, 12);
    }

    #[test]
    fn numbers_decode_from_strings_too() {
        let v = json!({"A": "123", "B": 45, "C": "x"});
        assert_eq!(number(&v, &["A"]), 123);
        assert_eq!(number(&v, &["B"]), 45);
        assert_eq!(number(&v, &["C"]), 0);
    }
}
