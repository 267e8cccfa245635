/// Ghost groups: transient compensation for host-dissolved groups
///
/// The host deletes a group as soon as it empties, and dropping to a
/// single tab usually means the group is about to vanish. The tracker
/// diffs membership snapshots between reconciliation passes and keeps a
/// short-lived entry for the surviving tab so it can still render as
/// grouped, until the entry expires or the tab closes.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::colors::GroupColor;
use crate::store::{KvStore, StorageScope, kv_load_or, kv_save};
use crate::tab_data::{GroupId, GroupInfo, TabId, TabInfo};

/// Lifetime of a ghost entry
pub const GHOST_GROUP_SECONDS: u64 = 15;

pub(crate) const GHOSTS_KEY: &str = "ghostGroups";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostEntry {
    pub title: String,
    pub color: GroupColor,
    pub original_group_id: GroupId,
    #[serde(default)]
    pub position_index: u32,
    pub expires_at: u64,
}

impl GhostEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Remaining whole seconds, for the countdown display
    pub fn remaining_seconds(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now).div_ceil(1000)
    }
}

/// How a tab should render given its ghost state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostStatus {
    Ungrouped,
    Ghost,
    Grouped,
}

#[derive(Debug, Clone)]
struct Membership {
    tabs: HashSet<TabId>,
    title: String,
    color: GroupColor,
}

#[derive(Debug, Default)]
pub struct GhostTracker {
    entries: HashMap<TabId, GhostEntry>,
    memberships: HashMap<GroupId, Membership>,
}

impl GhostTracker {
    pub fn new() -> Self {
        GhostTracker::default()
    }

    pub async fn load<K: KvStore>(kv: &K) -> Self {
        let stored: Vec<(TabId, GhostEntry)> =
            kv_load_or(kv, StorageScope::Session, GHOSTS_KEY).await;
        GhostTracker {
            entries: stored.into_iter().collect(),
            memberships: HashMap::new(),
        }
    }

    pub async fn save<K: KvStore>(&self, kv: &K) {
        let snapshot = self.to_persist();
        kv_save(kv, StorageScope::Session, GHOSTS_KEY, &snapshot).await;
    }

    /// Persistable snapshot of the entries, in stable order
    pub fn to_persist(&self) -> Vec<(TabId, GhostEntry)> {
        let mut stored: Vec<(TabId, GhostEntry)> = self
            .entries
            .iter()
            .map(|(tab_id, ghost)| (*tab_id, ghost.clone()))
            .collect();
        stored.sort_by_key(|(tab_id, _)| *tab_id);
        stored
    }

    pub fn entry(&self, tab_id: TabId) -> Option<&GhostEntry> {
        self.entries.get(&tab_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tab closed: its ghost goes with it, regardless of remaining time
    pub fn forget_tab(&mut self, tab_id: TabId) -> bool {
        self.entries.remove(&tab_id).is_some()
    }

    /// Remove and return every expired entry's tab id; callers must
    /// actively ungroup those tabs from wherever the host left them
    pub fn take_expired(&mut self, now: u64) -> Vec<TabId> {
        let expired: Vec<TabId> = self
            .entries
            .iter()
            .filter(|(_, ghost)| ghost.is_expired(now))
            .map(|(tab_id, _)| *tab_id)
            .collect();
        for tab_id in &expired {
            self.entries.remove(tab_id);
        }
        expired
    }

    /// Diff the previous membership snapshot against current state and
    /// create ghost entries for surviving tabs. Two triggers:
    /// (a) a group shrank from 2+ members to exactly 1;
    /// (b) a group with 2+ members vanished entirely and one of its
    ///     former tabs is now ungrouped.
    /// Returns true when any entry was created.
    pub fn observe(&mut self, tabs: &[TabInfo], groups: &[GroupInfo], now: u64) -> bool {
        let mut current: HashMap<GroupId, Membership> = groups
            .iter()
            .map(|group| {
                (
                    group.id,
                    Membership {
                        tabs: HashSet::new(),
                        title: group.title.clone(),
                        color: group.color,
                    },
                )
            })
            .collect();
        for tab in tabs {
            if let Some(group_id) = tab.group_id
                && let Some(membership) = current.get_mut(&group_id)
            {
                membership.tabs.insert(tab.id);
            }
        }

        // Self-heal: an entry for a tab the host no longer knows is dropped
        let live: HashSet<TabId> = tabs.iter().map(|t| t.id).collect();
        let before = self.entries.len();
        self.entries.retain(|tab_id, _| live.contains(tab_id));
        let mut changed = before != self.entries.len();

        let previous = std::mem::take(&mut self.memberships);
        for (group_id, old) in &previous {
            if old.tabs.len() < 2 {
                continue;
            }
            match current.get(group_id) {
                Some(new) if new.tabs.len() == 1 => {
                    if let Some(&survivor) = new.tabs.iter().next() {
                        changed |= self.add_entry(survivor, *group_id, old, now);
                    }
                }
                Some(_) => {}
                None => {
                    for tab_id in &old.tabs {
                        let now_ungrouped = tabs
                            .iter()
                            .any(|t| t.id == *tab_id && t.group_id.is_none());
                        if now_ungrouped {
                            changed |= self.add_entry(*tab_id, *group_id, old, now);
                        }
                    }
                }
            }
        }

        self.memberships = current;
        changed
    }

    fn add_entry(&mut self, tab_id: TabId, group_id: GroupId, old: &Membership, now: u64) -> bool {
        if self.entries.contains_key(&tab_id) {
            return false;
        }
        log::debug!("ghost for tab {tab_id} from dissolved group '{}'", old.title);
        self.entries.insert(
            tab_id,
            GhostEntry {
                title: old.title.clone(),
                color: old.color,
                original_group_id: group_id,
                position_index: 0,
                expires_at: now + GHOST_GROUP_SECONDS * 1000,
            },
        );
        true
    }

    /// A tab holding a ghost entry renders as ghost even when the host
    /// has silently re-grouped it elsewhere
    pub fn status_of(&self, tab: &TabInfo) -> GhostStatus {
        match (self.entries.get(&tab.id), tab.group_id) {
            (Some(_), None) => GhostStatus::Ghost,
            (Some(ghost), Some(group_id)) if group_id != ghost.original_group_id => {
                GhostStatus::Ghost
            }
            (Some(_), Some(_)) => GhostStatus::Grouped,
            (None, None) => GhostStatus::Ungrouped,
            (None, Some(_)) => GhostStatus::Grouped,
        }
    }
}
