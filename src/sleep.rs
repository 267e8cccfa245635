/// Sleeping groups: durable snapshots of closed tab groups
///
/// Sleeping a group saves url/title/favicon per tab and closes the real
/// tabs (the host deletes the emptied group on its own). The snapshot can
/// be woken later to recreate the tabs and re-group them under the stored
/// title and color.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::colors::GroupColor;
use crate::store::{KvStore, StorageScope, kv_load_or, kv_save};
use crate::tab_data::{GroupId, GroupInfo, SavedTab, TabInfo, WindowId};

pub(crate) const SLEEPING_KEY: &str = "sleepingGroups";
const ID_PREFIX: &str = "sleep-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepingGroup {
    pub id: String,
    pub title: String,
    pub color: GroupColor,
    pub tabs: Vec<SavedTab>,
    pub sleeped_at: u64,
    pub original_window_id: WindowId,
    #[serde(default)]
    pub is_manual: bool,
}

impl SleepingGroup {
    pub fn snapshot(group: &GroupInfo, tabs: &[TabInfo], now: u64, is_manual: bool) -> Self {
        let title = if group.title.is_empty() {
            "Unnamed Group".to_string()
        } else {
            group.title.clone()
        };
        SleepingGroup {
            id: format!("{ID_PREFIX}{now}-{}", Uuid::new_v4().as_simple()),
            title,
            color: group.color,
            tabs: tabs
                .iter()
                .map(|tab| SavedTab {
                    url: tab.url.clone(),
                    title: if tab.title.is_empty() {
                        tab.url.clone()
                    } else {
                        tab.title.clone()
                    },
                    fav_icon_url: tab.fav_icon_url.clone(),
                })
                .collect(),
            sleeped_at: now,
            original_window_id: group.window_id,
            is_manual,
        }
    }

    /// An entry is usable only with its id prefix and at least one tab
    /// with a non-empty URL
    pub fn is_valid(&self) -> bool {
        self.id.starts_with(ID_PREFIX)
            && !self.tabs.is_empty()
            && self.tabs.iter().all(|tab| !tab.url.is_empty())
    }
}

/// Only real host groups can sleep: not the "Other" bucket, not a ghost
pub fn can_sleep(group_id: GroupId) -> bool {
    group_id > 0
}

#[derive(Debug, Default)]
pub struct SleepingStore {
    entries: HashMap<String, SleepingGroup>,
}

impl SleepingStore {
    pub fn new() -> Self {
        SleepingStore::default()
    }

    pub async fn load<K: KvStore>(kv: &K) -> Self {
        let stored: Vec<(String, SleepingGroup)> =
            kv_load_or(kv, StorageScope::Durable, SLEEPING_KEY).await;
        let mut entries = HashMap::new();
        for (id, entry) in stored {
            if entry.is_valid() {
                entries.insert(id, entry);
            } else {
                log::warn!("dropping invalid sleeping group {id}");
            }
        }
        SleepingStore { entries }
    }

    pub async fn save<K: KvStore>(&self, kv: &K) {
        let snapshot = self.to_persist();
        kv_save(kv, StorageScope::Durable, SLEEPING_KEY, &snapshot).await;
    }

    /// Persistable snapshot, oldest-first
    pub fn to_persist(&self) -> Vec<(String, SleepingGroup)> {
        let mut stored: Vec<(String, SleepingGroup)> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        stored.sort_by(|a, b| a.1.sleeped_at.cmp(&b.1.sleeped_at).then(a.0.cmp(&b.0)));
        stored
    }

    pub fn insert(&mut self, entry: SleepingGroup) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<SleepingGroup> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&SleepingGroup> {
        self.entries.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest-first, the order the UI lists them
    pub fn all(&self) -> Vec<&SleepingGroup> {
        let mut entries: Vec<&SleepingGroup> = self.entries.values().collect();
        entries.sort_by(|a, b| a.sleeped_at.cmp(&b.sleeped_at).then(a.id.cmp(&b.id)));
        entries
    }
}
