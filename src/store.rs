/// Capability interfaces to the host's tab store and key-value storage
///
/// The tab store is an external, asynchronously mutating resource: a read
/// is stale the moment it returns, and a write can fail because the
/// referenced tab or group vanished in between. Callers treat those
/// failures per the `is_stale` class.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::colors::GroupColor;
use crate::tab_data::{GroupId, GroupInfo, TabId, TabInfo, WindowId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("tab {0} no longer exists")]
    TabVanished(TabId),

    #[error("group {0} no longer exists")]
    GroupVanished(GroupId),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("host error: {0}")]
    Host(String),
}

impl StoreError {
    /// Stale-reference failures are expected churn and never fatal to a batch
    pub fn is_stale(&self) -> bool {
        matches!(self, StoreError::TabVanished(_) | StoreError::GroupVanished(_))
    }
}

/// Tab query filters, combinable
#[derive(Debug, Clone, Copy, Default)]
pub struct TabQuery {
    pub window_id: Option<WindowId>,
    pub group_id: Option<GroupId>,
    pub active: Option<bool>,
}

impl TabQuery {
    pub fn window(window_id: WindowId) -> Self {
        TabQuery {
            window_id: Some(window_id),
            ..TabQuery::default()
        }
    }

    pub fn group(group_id: GroupId) -> Self {
        TabQuery {
            group_id: Some(group_id),
            ..TabQuery::default()
        }
    }

    pub fn active_in(window_id: WindowId) -> Self {
        TabQuery {
            window_id: Some(window_id),
            active: Some(true),
            ..TabQuery::default()
        }
    }
}

/// Partial update for a live group
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub color: Option<GroupColor>,
    pub collapsed: Option<bool>,
}

impl GroupUpdate {
    pub fn titled(title: impl Into<String>, color: GroupColor) -> Self {
        GroupUpdate {
            title: Some(title.into()),
            color: Some(color),
            collapsed: None,
        }
    }

    pub fn recolored(color: GroupColor) -> Self {
        GroupUpdate {
            color: Some(color),
            ..GroupUpdate::default()
        }
    }
}

/// Host events the engine reconciles against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TabEvent {
    TabCreated { tab: TabInfo },
    TabRemoved { tab_id: TabId },
    /// `complete` is true once the tab finished loading its URL
    TabUpdated { tab: TabInfo, complete: bool },
    TabMoved { tab_id: TabId },
    TabActivated { tab_id: TabId, window_id: WindowId },
    GroupCreated { group: GroupInfo },
    GroupRemoved { group_id: GroupId },
    GroupUpdated { group: GroupInfo },
}

/// The host's tab/group store. Single-threaded host, so no Send bounds.
#[allow(async_fn_in_trait)]
pub trait TabStore {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, StoreError>;
    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError>;
    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<(), StoreError>;
    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError>;
    async fn duplicate_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError>;
    async fn create_tab(&self, url: &str, window_id: WindowId, active: bool)
    -> Result<TabInfo, StoreError>;

    /// Add tabs to a group, or create a new group when `group_id` is `None`.
    /// Returns the id of the group the tabs ended up in.
    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> Result<GroupId, StoreError>;
    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError>;

    async fn get_group(&self, group_id: GroupId) -> Result<GroupInfo, StoreError>;
    async fn query_groups(&self, window_id: Option<WindowId>) -> Result<Vec<GroupInfo>, StoreError>;
    async fn update_group(&self, group_id: GroupId, update: GroupUpdate)
    -> Result<(), StoreError>;

    async fn current_window(&self) -> Result<WindowId, StoreError>;
    async fn all_windows(&self) -> Result<Vec<WindowId>, StoreError>;
}

/// Storage scopes: session-lifetime vs. durable vs. settings-synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Cleared on host restart (auto-group set, ghost entries)
    Session,
    /// Survives restarts (sleeping groups)
    Durable,
    /// Synced across the user's profile (settings)
    Synced,
}

/// Generic async key-value store over JSON values
#[allow(async_fn_in_trait)]
pub trait KvStore {
    async fn get(&self, scope: StorageScope, key: &str)
    -> Result<Option<serde_json::Value>, StoreError>;
    async fn set(
        &self,
        scope: StorageScope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;
    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StoreError>;
}

/// Load a typed value, falling back to `T::default()` on a missing key,
/// decode failure, or storage failure. Storage problems are logged; the
/// in-memory state stays authoritative for the rest of the session.
pub async fn kv_load_or<K: KvStore, T: DeserializeOwned + Default>(
    kv: &K,
    scope: StorageScope,
    key: &str,
) -> T {
    match kv.get(scope, key).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|err| {
            log::warn!("discarding undecodable {key}: {err}");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(err) => {
            log::warn!("failed to load {key}: {err}");
            T::default()
        }
    }
}

/// Persist a typed value; failures are logged and the write is retried
/// naturally on the next mutation of the same state.
pub async fn kv_save<K: KvStore, T: Serialize>(
    kv: &K,
    scope: StorageScope,
    key: &str,
    value: &T,
) {
    let encoded = match serde_json::to_value(value) {
        Ok(encoded) => encoded,
        Err(err) => {
            log::warn!("failed to encode {key}: {err}");
            return;
        }
    };
    if let Err(err) = kv.set(scope, key, encoded).await {
        log::warn!("failed to save {key}: {err}");
    }
}

/// Millisecond timestamps, injected so expiry and debounce logic is
/// testable without a live event loop
pub trait Clock {
    fn now_ms(&self) -> u64;
}
