// src/client/schedule.rs
//! Translation between the host's generic timer model and the backend's
//! rule-based scheduler, including EPG resolution of ambiguous requests.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::client::backend::{BackendControl, Occurrence, RuleSpec};
use crate::client::channels::ChannelCatalog;
use crate::client::errors::PvrError;
use crate::client::types::{
    genre_for_category, ChannelUid, DupMethod, RecStatus, TimerKind, TimerState, INTERVAL_DAY,
};
use crate::client::util::{combine_local, zero_seconds};

/// Reference to a guide entry: the canonical channel plus the instant the
/// program airs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpgRef {
    pub channel_uid: ChannelUid,
    pub start_time: i64,
}

/// Client-visible timer identity. The index is only meaningful within the
/// listing generation that issued it; a full schedule refresh reissues both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    pub generation: u32,
    pub index: u32,
}

/// Host-facing view of one rule or one occurrence.
#[derive(Clone, Debug)]
pub struct TimerEntry {
    pub handle: TimerHandle,
    /// Index of the generating rule; 0 for standalone entries and rules.
    pub parent_index: u32,
    pub channel_uid: Option<ChannelUid>,
    pub start_time: i64,
    pub end_time: i64,
    pub first_day: i64,
    pub state: TimerState,
    pub kind: TimerKind,
    pub title: String,
    pub description: String,
    pub search_text: String,
    /// Reserved by the host surface; never set.
    pub full_text_search: bool,
    pub priority: i32,
    pub expiration: u32,
    pub recording_group: u32,
    pub epg_ref: Option<EpgRef>,
    pub margin_start_mins: u32,
    pub margin_end_mins: u32,
    pub dup_method: DupMethod,
    pub genre: u8,
    pub is_rule: bool,
}

/// A timer create/update/delete request as the host hands it over.
#[derive(Clone, Debug, Default)]
pub struct TimerRequest {
    pub handle: Option<TimerHandle>,
    pub channel_uid: Option<ChannelUid>,
    pub start_time: i64,
    pub end_time: i64,
    pub first_day: i64,
    pub state: TimerState,
    pub kind: TimerKind,
    pub title: String,
    pub description: String,
    pub search_text: String,
    pub priority: i32,
    pub expiration: u32,
    pub recording_group: u32,
    pub epg_ref: Option<EpgRef>,
    pub margin_start_mins: u32,
    pub margin_end_mins: u32,
    pub dup_method: DupMethod,
    pub genre: u8,
}

#[derive(Default)]
struct ScheduleInner {
    generation: u32,
    /// (index, rule), indices reissued per refresh.
    rules: Vec<(u32, RuleSpec)>,
    /// (index, parent rule index, occurrence).
    upcoming: Vec<(u32, u32, Occurrence)>,
    /// Fields the host does not round-trip, keyed by index of the last
    /// listing handed out.
    memo: HashMap<u32, Option<EpgRef>>,
}

pub struct ScheduleTranslator {
    inner: Mutex<ScheduleInner>,
}

impl ScheduleTranslator {
    pub fn new() -> Self {
        Self { inner: Mutex::new(ScheduleInner::default()) }
    }

    /// Pull rules and upcoming occurrences from the backend and reissue all
    /// client indices under a new generation.
    pub fn refresh(&self, control: &dyn BackendControl) -> Result<(), PvrError> {
        let rules = control.schedule_rules()?;
        let upcoming = control.upcoming()?;

        let mut inner = self.inner.lock().unwrap();
        inner.generation = inner.generation.wrapping_add(1);
        inner.rules.clear();
        inner.upcoming.clear();
        inner.memo.clear();

        let mut index = 0u32;
        let mut index_by_rule: HashMap<u32, u32> = HashMap::new();
        for rule in rules {
            index += 1;
            index_by_rule.insert(rule.rule_id, index);
            inner.rules.push((index, rule));
        }
        for occ in upcoming {
            index += 1;
            let parent = index_by_rule.get(&occ.rule_id).copied().unwrap_or(0);
            inner.upcoming.push((index, parent, occ));
        }
        debug!(
            "schedule generation {}: {} rule(s), {} upcoming",
            inner.generation,
            inner.rules.len(),
            inner.upcoming.len()
        );
        Ok(())
    }

    pub fn upcoming_count(&self) -> usize {
        self.inner.lock().unwrap().upcoming.len()
    }

    /// Host-facing listing. Occurrences whose channel does not fold into a
    /// canonical channel are dropped; rules survive since a channel-less
    /// rule legitimately applies to all channels.
    pub fn entries(&self, catalog: &ChannelCatalog) -> Vec<TimerEntry> {
        let mut inner = self.inner.lock().unwrap();
        let generation = inner.generation;
        inner.memo.clear();
        let mut out = Vec::with_capacity(inner.rules.len() + inner.upcoming.len());

        for (index, rule) in &inner.rules {
            let entry = TimerEntry {
                handle: TimerHandle { generation, index: *index },
                parent_index: 0,
                channel_uid: rule.channel_id.and_then(|id| catalog.canonical_uid(id)),
                start_time: rule.start_time.unwrap_or(0),
                end_time: rule.end_time.unwrap_or(0),
                first_day: rule.start_time.unwrap_or(0),
                state: if rule.inactive { TimerState::Disabled } else { TimerState::Scheduled },
                kind: rule.kind,
                title: rule.title.clone(),
                description: rule.description.clone(),
                search_text: rule.search_text.clone(),
                full_text_search: false,
                priority: rule.priority,
                expiration: rule.expiration,
                recording_group: rule.recording_group,
                epg_ref: None,
                margin_start_mins: rule.margin_start_mins,
                margin_end_mins: rule.margin_end_mins,
                dup_method: rule.dup_method,
                genre: genre_for_category(&rule.category),
                is_rule: true,
            };
            out.push(entry);
        }

        let rules_by_id: HashMap<u32, RuleSpec> =
            inner.rules.iter().map(|(_, r)| (r.rule_id, r.clone())).collect();
        for (index, parent, occ) in &inner.upcoming {
            let Some(channel_uid) = catalog.canonical_uid(occ.channel_id) else {
                debug!("dropping upcoming on unmapped channel {}", occ.channel_id);
                continue;
            };
            let rule = rules_by_id.get(&occ.rule_id);
            let inactive = rule.map(|r| r.inactive).unwrap_or(false);
            let epg_ref = Some(EpgRef { channel_uid, start_time: occ.start_time });
            out.push(TimerEntry {
                handle: TimerHandle { generation, index: *index },
                parent_index: *parent,
                channel_uid: Some(channel_uid),
                start_time: occ.start_time,
                end_time: occ.end_time,
                first_day: occ.start_time,
                state: host_state(occ.status, inactive),
                kind: rule.map(|r| r.kind).unwrap_or_default(),
                title: occ.title.clone(),
                description: occ.description.clone(),
                search_text: rule.map(|r| r.search_text.clone()).unwrap_or_default(),
                full_text_search: false,
                priority: rule.map(|r| r.priority).unwrap_or(0),
                expiration: rule.map(|r| r.expiration).unwrap_or(0),
                recording_group: rule.map(|r| r.recording_group).unwrap_or(0),
                epg_ref,
                margin_start_mins: rule.map(|r| r.margin_start_mins).unwrap_or(0),
                margin_end_mins: rule.map(|r| r.margin_end_mins).unwrap_or(0),
                dup_method: rule.map(|r| r.dup_method).unwrap_or_default(),
                genre: genre_for_category(&occ.category),
                is_rule: false,
            });
        }

        for entry in &out {
            inner.memo.insert(entry.handle.index, entry.epg_ref);
        }
        out
    }

    /// Create a new backend rule from a host request.
    pub fn submit(
        &self,
        control: &dyn BackendControl,
        catalog: &ChannelCatalog,
        request: &TimerRequest,
        now: i64,
    ) -> Result<(), PvrError> {
        let spec = to_rule(request, catalog, control, true, now);
        info!("submitting rule for `{}`", spec.title);
        control.add_rule(&spec)?;
        // Completion is signalled by a schedule-change event; no refresh here
        Ok(())
    }

    /// Update the rule behind an existing listing entry. The EPG reference
    /// discarded by the host round-trip is restored from the memo.
    pub fn update(
        &self,
        control: &dyn BackendControl,
        catalog: &ChannelCatalog,
        request: &TimerRequest,
        now: i64,
    ) -> Result<(), PvrError> {
        let handle = request.handle.ok_or(PvrError::NotFound)?;
        let (rule_id, epg_ref) = {
            let inner = self.inner.lock().unwrap();
            if handle.generation != inner.generation {
                return Err(PvrError::NotFound);
            }
            let epg_ref = *inner.memo.get(&handle.index).ok_or(PvrError::NotFound)?;
            (resolve_rule_id(&inner, handle.index).ok_or(PvrError::NotFound)?, epg_ref)
        };
        if rule_id == 0 {
            // Occurrence with no editable parent rule
            return Err(PvrError::Unsupported);
        }
        let mut request = request.clone();
        request.epg_ref = epg_ref;
        let mut spec = to_rule(&request, catalog, control, true, now);
        spec.rule_id = rule_id;
        control.update_rule(&spec)?;
        Ok(())
    }

    /// Delete a rule, or suppress a single occurrence of its parent rule
    /// with a don't-record override.
    pub fn delete(
        &self,
        control: &dyn BackendControl,
        handle: TimerHandle,
    ) -> Result<(), PvrError> {
        enum Target {
            Rule(u32),
            Override(Box<Occurrence>),
        }
        let target = {
            let inner = self.inner.lock().unwrap();
            if handle.generation != inner.generation {
                return Err(PvrError::NotFound);
            }
            if let Some((_, rule)) = inner.rules.iter().find(|(i, _)| *i == handle.index) {
                Target::Rule(rule.rule_id)
            } else if let Some((_, _, occ)) =
                inner.upcoming.iter().find(|(i, _, _)| *i == handle.index)
            {
                Target::Override(Box::new(occ.clone()))
            } else {
                return Err(PvrError::NotFound);
            }
        };
        match target {
            Target::Rule(rule_id) => {
                info!("deleting rule {rule_id}");
                control.remove_rule(rule_id)?;
            }
            Target::Override(occ) => {
                info!("suppressing showing of `{}` at {}", occ.title, occ.start_time);
                let spec = RuleSpec {
                    kind: TimerKind::DontRecord,
                    channel_id: Some(occ.channel_id),
                    start_time: Some(occ.start_time),
                    end_time: Some(occ.end_time),
                    title: occ.title.clone(),
                    description: occ.description.clone(),
                    category: occ.category.clone(),
                    ..RuleSpec::default()
                };
                control.add_rule(&spec)?;
            }
        }
        Ok(())
    }

    /// Backend rule id behind a listing index, if the handle is current.
    pub fn rule_id_for(&self, handle: TimerHandle) -> Option<u32> {
        let inner = self.inner.lock().unwrap();
        if handle.generation != inner.generation {
            return None;
        }
        resolve_rule_id(&inner, handle.index)
    }

    pub fn upcoming_for_rule(&self, rule_id: u32) -> Vec<Occurrence> {
        let inner = self.inner.lock().unwrap();
        inner
            .upcoming
            .iter()
            .filter(|(_, _, occ)| occ.rule_id == rule_id)
            .map(|(_, _, occ)| occ.clone())
            .collect()
    }
}

impl Default for ScheduleTranslator {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_rule_id(inner: &ScheduleInner, index: u32) -> Option<u32> {
    if let Some((_, rule)) = inner.rules.iter().find(|(i, _)| *i == index) {
        return Some(rule.rule_id);
    }
    inner
        .upcoming
        .iter()
        .find(|(i, _, _)| *i == index)
        .map(|(_, _, occ)| occ.rule_id)
}

/// Fixed mapping of backend recording status onto the host timer state.
pub(crate) fn host_state(status: RecStatus, inactive: bool) -> TimerState {
    use RecStatus::*;
    match status {
        Aborted | Missed | NotListed | Offline => TimerState::Aborted,
        Recording | Tuning => TimerState::Recording,
        Recorded => TimerState::Completed,
        WillRecord => TimerState::Scheduled,
        Conflict => TimerState::ConflictNok,
        Failed | TunerBusy | LowDiskspace => TimerState::Error,
        Inactive | EarlierRecording | LaterShowing | CurrentRecording | PreviousRecording
        | TooManyRecordings | OtherShowing | Repeat | DontRecord | NeverRecord => {
            TimerState::Disabled
        }
        Cancelled => TimerState::Cancelled,
        Unknown => {
            if inactive {
                TimerState::Disabled
            } else {
                TimerState::Scheduled
            }
        }
    }
}

/// Normalize a host request into a concrete backend rule.
///
/// Order: time-slot normalization first, then EPG resolution (which, when it
/// succeeds, overrides the window), then explicit channel fallback.
pub(crate) fn to_rule(
    request: &TimerRequest,
    catalog: &ChannelCatalog,
    control: &dyn BackendControl,
    resolve_epg: bool,
    now: i64,
) -> RuleSpec {
    let mut spec = RuleSpec::default();
    let mut has_epg = resolve_epg && request.epg_ref.is_some();
    let has_channel = request.channel_uid.is_some();

    let mut st = request.start_time;
    let mut et = request.end_time;
    let fd = request.first_day;

    // Start of zero with a far-out end is the host's way of saying "now"
    if st == 0 && et > INTERVAL_DAY {
        st = now;
    }
    // A start near the epoch is the sentinel for "any time"
    let mut has_timeslot = st >= INTERVAL_DAY;
    if !has_timeslot {
        st = 0;
        et = 0;
    } else {
        if fd > st {
            // Recurring rule: anchor on the first day, keep the times of day
            st = combine_local(fd, st);
            et = combine_local(fd, et);
        } else {
            st = zero_seconds(st);
            et = zero_seconds(et);
        }
        if et < st {
            // Over-midnight window
            et = combine_local(st + INTERVAL_DAY, et);
        }
    }

    if let Some(eref) = request.epg_ref {
        if has_epg {
            // The host may have picked a different channel than the guide entry
            let lookup = request.channel_uid.unwrap_or(eref.channel_uid);
            let guide = control
                .program_guide(lookup, eref.start_time, eref.start_time)
                .unwrap_or_default();
            // Among everything airing at that instant, take the latest start,
            // tie-broken by the latest end
            match guide.iter().max_by_key(|g| (g.start_time, g.end_time)) {
                Some(entry) => {
                    spec.channel_id = Some(entry.channel_id);
                    spec.callsign = entry.callsign.clone();
                    st = entry.start_time;
                    et = entry.end_time;
                    has_timeslot = true;
                    info!("selected EPG program `{}` on {}", entry.title, entry.channel_id);
                }
                None => {
                    info!("EPG program not found at {} on {}", eref.start_time, lookup);
                    has_epg = false;
                }
            }
        }
    }
    if !has_epg && has_channel {
        match request.channel_uid.and_then(|uid| catalog.find_by_id(uid)) {
            Some(channel) => {
                spec.channel_id = Some(channel.id);
                spec.callsign = channel.callsign;
            }
            None => {
                // Fall through to a channel-less rule (applies to all
                // channels, used for EPG-text searches)
                debug!("channel {:?} not found", request.channel_uid);
            }
        }
    }

    if has_timeslot {
        spec.start_time = Some(st);
        spec.end_time = Some(et);
    }
    spec.search_text = request.search_text.trim_start().to_string();
    spec.kind = request.kind;
    spec.title = request.title.clone();
    spec.description = request.description.clone();
    spec.category = crate::client::types::category_for_genre(request.genre).to_string();
    spec.priority = request.priority;
    spec.expiration = request.expiration;
    spec.recording_group = request.recording_group;
    spec.dup_method = request.dup_method;
    spec.margin_start_mins = request.margin_start_mins;
    spec.margin_end_mins = request.margin_end_mins;
    spec.inactive = if request.kind == TimerKind::DontRecord {
        request.state != TimerState::Disabled
    } else {
        request.state == TimerState::Disabled
    };
    spec
}
