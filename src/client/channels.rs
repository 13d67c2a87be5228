// src/client/channels.rs
//! Canonical channel tables. Several tuner sources usually expose the same
//! physical feed; without folding them the host would list duplicates.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use itertools::Itertools;
use tracing::debug;

use crate::client::backend::BackendControl;
use crate::client::errors::PvrError;
use crate::client::types::{Channel, ChannelId, ChannelItem, ChannelUid};

#[derive(Default)]
struct CatalogInner {
    /// Canonical entries in first-seen order.
    items: Vec<ChannelItem>,
    /// Source name -> canonical members, in source listing order.
    groups: Vec<(String, Vec<ChannelItem>)>,
    /// Every backend channel id -> the canonical uid it folds into.
    uid_by_id: HashMap<ChannelId, ChannelUid>,
    /// Full backend channel records by id.
    by_id: HashMap<ChannelId, Channel>,
}

/// Channel catalog behind its own lock; no iterator ever leaves the lock.
#[derive(Default)]
pub struct ChannelCatalog {
    inner: Mutex<CatalogInner>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query all tuner sources and rebuild the canonical tables. The first
    /// channel seen for a (number, call-sign) key becomes canonical; later
    /// ones fold into it and only join its source group. Returns the
    /// canonical channel count.
    pub fn rebuild(&self, control: &dyn BackendControl) -> Result<usize, PvrError> {
        let sources = control.video_sources()?;

        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
        inner.groups.clear();
        inner.uid_by_id.clear();
        inner.by_id.clear();

        let mut identifiers: HashMap<(String, String), ChannelItem> = HashMap::new();
        let mut count = 0usize;

        for source in &sources {
            // One bad source should not abort the whole rebuild
            let channels = match control.channels(source.source_id) {
                Ok(list) => list,
                Err(err) => {
                    debug!("skipping source {} ({err})", source.source_name);
                    continue;
                }
            };
            let mut members: Vec<ChannelItem> = Vec::new();
            let mut member_uids: HashSet<ChannelUid> = HashSet::new();
            for channel in channels {
                let key = channel.dedup_key();
                let id = channel.id;
                match identifiers.get(&key) {
                    Some(item) => {
                        debug!("folding channel {id} into {}", item.uid);
                        inner.uid_by_id.insert(id, item.uid);
                        if member_uids.insert(item.uid) {
                            members.push(*item);
                        }
                    }
                    None => {
                        let item = ChannelItem {
                            uid: id,
                            number_major: channel.number_major,
                            number_minor: channel.number_minor,
                            is_radio: channel.is_radio,
                            hidden: !channel.visible,
                        };
                        count += 1;
                        inner.items.push(item);
                        identifiers.insert(key, item);
                        inner.uid_by_id.insert(id, id);
                        if member_uids.insert(id) {
                            members.push(item);
                        }
                    }
                }
                inner.by_id.insert(id, channel);
            }
            inner.groups.push((source.source_name.clone(), members));
        }

        debug!("loaded {count} channel(s) in {} group(s)", inner.groups.len());
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_id(&self, id: ChannelId) -> Option<Channel> {
        self.inner.lock().unwrap().by_id.get(&id).cloned()
    }

    pub fn canonical_uid(&self, id: ChannelId) -> Option<ChannelUid> {
        self.inner.lock().unwrap().uid_by_id.get(&id).copied()
    }

    /// All backend channels folding into `uid`, canonical entry first. Used
    /// to hand the tuner every physical candidate for one logical channel.
    pub fn merged_set(&self, uid: ChannelUid) -> Vec<Channel> {
        let inner = self.inner.lock().unwrap();
        inner
            .uid_by_id
            .iter()
            .filter(|(_, canonical)| **canonical == uid)
            .filter_map(|(id, _)| inner.by_id.get(id).cloned())
            .sorted_by_key(|c| (c.id != uid, c.id))
            .collect()
    }

    pub fn items(&self, radio: bool) -> Vec<ChannelItem> {
        let inner = self.inner.lock().unwrap();
        inner.items.iter().filter(|i| i.is_radio == radio).copied().collect()
    }

    /// Name of every group holding at least one channel of the given kind.
    pub fn group_names(&self, radio: bool) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m.is_radio == radio))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn group_members(&self, name: &str, radio: bool) -> Result<Vec<ChannelItem>, PvrError> {
        let inner = self.inner.lock().unwrap();
        let (_, members) = inner
            .groups
            .iter()
            .find(|(group, _)| group.as_str() == name)
            .ok_or(PvrError::NotFound)?;
        Ok(members.iter().filter(|m| m.is_radio == radio).copied().collect())
    }
}
