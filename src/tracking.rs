/// Registry of engine-created ("auto") and user-curated ("manual") groups
///
/// Group ids are only meaningful for the host session, so both sets live
/// in session-scoped storage and start empty after a restart. A group id
/// is never in both sets at once.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{extract_domain, short_name};
use crate::store::{KvStore, StorageScope, TabQuery, TabStore, kv_load_or, kv_save};
use crate::tab_data::GroupId;

pub(crate) const AUTO_KEY: &str = "autoGroupIds";
pub(crate) const MANUAL_KEY: &str = "manualGroupIds";

/// Outcome of re-deriving a group's auto status from live state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStatus {
    /// At least two tabs, one shared domain, title matches its short name
    Auto,
    /// Live, but not an auto-shaped group
    NotAuto,
    /// The group vanished
    Gone,
}

/// Inspect a group's live tabs and derive its auto status
pub async fn assess_auto_status<S: TabStore>(store: &S, group_id: GroupId) -> AutoStatus {
    let group = match store.get_group(group_id).await {
        Ok(group) => group,
        Err(_) => return AutoStatus::Gone,
    };
    let tabs = match store.query_tabs(TabQuery::group(group_id)).await {
        Ok(tabs) => tabs,
        Err(_) => return AutoStatus::Gone,
    };

    if tabs.len() < 2 {
        return AutoStatus::NotAuto;
    }

    let Some(first_domain) = extract_domain(&tabs[0].url) else {
        return AutoStatus::NotAuto;
    };
    let uniform = tabs
        .iter()
        .all(|t| extract_domain(&t.url).as_deref() == Some(first_domain.as_str()));

    if uniform && group.title == short_name(&first_domain) {
        AutoStatus::Auto
    } else {
        AutoStatus::NotAuto
    }
}

#[derive(Debug, Default)]
pub struct AutoGroupRegistry {
    auto: HashSet<GroupId>,
    manual: HashSet<GroupId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct IdList(Vec<GroupId>);

impl AutoGroupRegistry {
    pub fn new() -> Self {
        AutoGroupRegistry::default()
    }

    pub async fn load<K: KvStore>(kv: &K) -> Self {
        let auto: IdList = kv_load_or(kv, StorageScope::Session, AUTO_KEY).await;
        let manual: IdList = kv_load_or(kv, StorageScope::Session, MANUAL_KEY).await;
        AutoGroupRegistry {
            auto: auto.0.into_iter().collect(),
            manual: manual.0.into_iter().collect(),
        }
    }

    pub async fn save<K: KvStore>(&self, kv: &K) {
        let (auto, manual) = self.to_persist();
        kv_save(kv, StorageScope::Session, AUTO_KEY, &IdList(auto)).await;
        kv_save(kv, StorageScope::Session, MANUAL_KEY, &IdList(manual)).await;
    }

    /// Persistable snapshots of both sets, in stable order
    pub fn to_persist(&self) -> (Vec<GroupId>, Vec<GroupId>) {
        let mut auto: Vec<GroupId> = self.auto.iter().copied().collect();
        let mut manual: Vec<GroupId> = self.manual.iter().copied().collect();
        auto.sort_unstable();
        manual.sort_unstable();
        (auto, manual)
    }

    /// Apply an assessed status to the registry
    pub fn apply_status(&mut self, group_id: GroupId, status: AutoStatus) -> bool {
        match status {
            AutoStatus::Auto => {
                self.mark_auto(group_id);
                true
            }
            AutoStatus::NotAuto => {
                self.unmark_auto(group_id);
                false
            }
            AutoStatus::Gone => {
                self.forget(group_id);
                false
            }
        }
    }

    pub fn is_auto(&self, group_id: GroupId) -> bool {
        self.auto.contains(&group_id)
    }

    pub fn is_manual(&self, group_id: GroupId) -> bool {
        self.manual.contains(&group_id)
    }

    pub fn mark_auto(&mut self, group_id: GroupId) {
        self.auto.insert(group_id);
        self.manual.remove(&group_id);
    }

    pub fn mark_manual(&mut self, group_id: GroupId) {
        self.manual.insert(group_id);
        self.auto.remove(&group_id);
    }

    pub fn unmark_auto(&mut self, group_id: GroupId) -> bool {
        self.auto.remove(&group_id)
    }

    /// Drop a group id from both sets (group removed by the host)
    pub fn forget(&mut self, group_id: GroupId) -> bool {
        let was_auto = self.auto.remove(&group_id);
        let was_manual = self.manual.remove(&group_id);
        was_auto || was_manual
    }

    /// Re-derive a group's auto status from its live tabs. Called whenever
    /// group membership shrinks, to keep the registry truthful without a
    /// full rescan.
    pub async fn revalidate<S: TabStore>(&mut self, store: &S, group_id: GroupId) -> bool {
        let status = assess_auto_status(store, group_id).await;
        self.apply_status(group_id, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::GroupColor;
    use crate::testutil::FakeTabStore;
    use futures::executor::block_on;

    #[test]
    fn test_revalidate_against_live_tabs() {
        let store = FakeTabStore::new();
        let group_id = store.add_group(1, "github", GroupColor::Blue);
        let a = store.add_tab_in_group(1, "https://github.com/a", Some(group_id));
        store.add_tab_in_group(1, "https://gist.github.com/b", Some(group_id));

        let mut registry = AutoGroupRegistry::new();
        assert!(block_on(registry.revalidate(&store, group_id)));
        assert!(registry.is_auto(group_id));

        // One member left: no longer an auto group
        block_on(store.close_tabs(&[a])).unwrap();
        assert!(!block_on(registry.revalidate(&store, group_id)));
        assert!(!registry.is_auto(group_id));
    }

    #[test]
    fn test_revalidate_title_mismatch_unmarks() {
        let store = FakeTabStore::new();
        let group_id = store.add_group(1, "Projects", GroupColor::Blue);
        store.add_tab_in_group(1, "https://github.com/a", Some(group_id));
        store.add_tab_in_group(1, "https://github.com/b", Some(group_id));

        let mut registry = AutoGroupRegistry::new();
        registry.mark_auto(group_id);
        assert!(!block_on(registry.revalidate(&store, group_id)));
        assert!(!registry.is_auto(group_id));
    }

    #[test]
    fn test_revalidate_vanished_group_forgets() {
        let store = FakeTabStore::new();
        let mut registry = AutoGroupRegistry::new();
        registry.mark_auto(77);
        assert!(!block_on(registry.revalidate(&store, 77)));
        assert!(!registry.is_auto(77));
    }

    #[test]
    fn test_mark_auto_and_manual_are_exclusive() {
        let mut registry = AutoGroupRegistry::new();

        registry.mark_auto(5);
        assert!(registry.is_auto(5));
        assert!(!registry.is_manual(5));

        registry.mark_manual(5);
        assert!(!registry.is_auto(5));
        assert!(registry.is_manual(5));

        registry.mark_auto(5);
        assert!(registry.is_auto(5));
        assert!(!registry.is_manual(5));
    }

    #[test]
    fn test_unmark_and_forget() {
        let mut registry = AutoGroupRegistry::new();
        registry.mark_auto(1);
        registry.mark_manual(2);

        assert!(registry.unmark_auto(1));
        assert!(!registry.unmark_auto(1));

        assert!(registry.forget(2));
        assert!(!registry.is_manual(2));
        assert!(!registry.forget(3));
    }
}
