/// Browser glue: chrome.* backed implementations of the host interfaces
/// plus the host object the background script drives.
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::engine::GroupingEngine;
use crate::settings::Settings;
use crate::store::{
    Clock, GroupUpdate, KvStore, StorageScope, StoreError, TabEvent, TabQuery, TabStore,
};
use crate::tab_data::{GroupId, GroupInfo, TabId, TabInfo, WindowId};

// Import JS bridge functions
#[wasm_bindgen(module = "/js/bridge.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn queryTabs(query: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getTab(tab_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn moveTab(tab_id: i32, index: i32) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn closeTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn duplicateTab(tab_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn createTab(url: &str, window_id: i32, active: bool) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn groupTabs(tab_ids: JsValue, group_id: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn ungroupTabs(tab_ids: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn getGroup(group_id: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryGroups(window_id: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn updateGroup(group_id: i32, update: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn currentWindowId() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn allWindowIds() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageGet(area: &str, key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageSet(area: &str, key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn storageRemove(area: &str, key: &str) -> Result<(), JsValue>;
}

fn js_message(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            js_sys::Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{err:?}"))
}

fn trailing_id(message: &str, prefix: &str) -> Option<i32> {
    message
        .strip_prefix(prefix)?
        .trim_start_matches([':', ' '])
        .trim_end_matches('.')
        .parse()
        .ok()
}

/// Map a host rejection onto the error taxonomy; vanished-reference
/// messages become the stale class
fn store_error(context: &str, err: JsValue) -> StoreError {
    let message = js_message(&err);
    if let Some(id) = trailing_id(&message, "No tab with id") {
        return StoreError::TabVanished(id);
    }
    if let Some(id) = trailing_id(&message, "No group with id") {
        return StoreError::GroupVanished(id);
    }
    StoreError::Host(format!("{context}: {message}"))
}

fn decode<T: serde::de::DeserializeOwned>(context: &str, value: JsValue) -> Result<T, StoreError> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|err| StoreError::Host(format!("{context}: {err}")))
}

fn encode<T: serde::Serialize>(context: &str, value: &T) -> Result<JsValue, StoreError> {
    // Maps must cross the boundary as plain objects, not JS Maps
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|err| StoreError::Host(format!("{context}: {err}")))
}

pub struct BrowserTabStore;

impl TabStore for BrowserTabStore {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, StoreError> {
        let mut filter = serde_json::Map::new();
        if let Some(window_id) = query.window_id {
            filter.insert("windowId".to_string(), window_id.into());
        }
        if let Some(group_id) = query.group_id {
            filter.insert("groupId".to_string(), group_id.into());
        }
        if let Some(active) = query.active {
            filter.insert("active".to_string(), active.into());
        }
        let filter = encode("query filter", &serde_json::Value::Object(filter))?;
        let tabs = queryTabs(filter)
            .await
            .map_err(|err| store_error("query tabs", err))?;
        decode("tabs", tabs)
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError> {
        let tab = getTab(tab_id)
            .await
            .map_err(|err| store_error("get tab", err))?;
        decode("tab", tab)
    }

    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<(), StoreError> {
        moveTab(tab_id, index)
            .await
            .map_err(|err| store_error("move tab", err))
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        let ids = encode("tab ids", &tab_ids)?;
        closeTabs(ids)
            .await
            .map_err(|err| store_error("close tabs", err))
    }

    async fn duplicate_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError> {
        let tab = duplicateTab(tab_id)
            .await
            .map_err(|err| store_error("duplicate tab", err))?;
        decode("tab", tab)
    }

    async fn create_tab(
        &self,
        url: &str,
        window_id: WindowId,
        active: bool,
    ) -> Result<TabInfo, StoreError> {
        let tab = createTab(url, window_id, active)
            .await
            .map_err(|err| store_error("create tab", err))?;
        decode("tab", tab)
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> Result<GroupId, StoreError> {
        let ids = encode("tab ids", &tab_ids)?;
        let target = match group_id {
            Some(id) => JsValue::from(id),
            None => JsValue::NULL,
        };
        let created = groupTabs(ids, target)
            .await
            .map_err(|err| store_error("group tabs", err))?;
        created
            .as_f64()
            .map(|id| id as GroupId)
            .ok_or_else(|| StoreError::Host("group tabs: non-numeric group id".to_string()))
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        let ids = encode("tab ids", &tab_ids)?;
        ungroupTabs(ids)
            .await
            .map_err(|err| store_error("ungroup tabs", err))
    }

    async fn get_group(&self, group_id: GroupId) -> Result<GroupInfo, StoreError> {
        let group = getGroup(group_id)
            .await
            .map_err(|err| store_error("get group", err))?;
        decode("group", group)
    }

    async fn query_groups(
        &self,
        window_id: Option<WindowId>,
    ) -> Result<Vec<GroupInfo>, StoreError> {
        let filter = match window_id {
            Some(id) => JsValue::from(id),
            None => JsValue::NULL,
        };
        let groups = queryGroups(filter)
            .await
            .map_err(|err| store_error("query groups", err))?;
        decode("groups", groups)
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        update: GroupUpdate,
    ) -> Result<(), StoreError> {
        let mut fields = serde_json::Map::new();
        if let Some(title) = update.title {
            fields.insert("title".to_string(), title.into());
        }
        if let Some(color) = update.color {
            fields.insert(
                "color".to_string(),
                serde_json::to_value(color)
                    .map_err(|err| StoreError::Host(format!("color: {err}")))?,
            );
        }
        if let Some(collapsed) = update.collapsed {
            fields.insert("collapsed".to_string(), collapsed.into());
        }
        let fields = encode("group update", &serde_json::Value::Object(fields))?;
        updateGroup(group_id, fields)
            .await
            .map_err(|err| store_error("update group", err))
    }

    async fn current_window(&self) -> Result<WindowId, StoreError> {
        let id = currentWindowId()
            .await
            .map_err(|err| store_error("current window", err))?;
        id.as_f64()
            .map(|id| id as WindowId)
            .ok_or_else(|| StoreError::Host("current window: non-numeric id".to_string()))
    }

    async fn all_windows(&self) -> Result<Vec<WindowId>, StoreError> {
        let ids = allWindowIds()
            .await
            .map_err(|err| store_error("all windows", err))?;
        decode("window ids", ids)
    }
}

/// chrome.storage areas behind the generic KV interface
pub struct BrowserKv;

fn area_name(scope: StorageScope) -> &'static str {
    match scope {
        StorageScope::Session => "session",
        StorageScope::Durable => "local",
        StorageScope::Synced => "sync",
    }
}

impl KvStore for BrowserKv {
    async fn get(
        &self,
        scope: StorageScope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let value = storageGet(area_name(scope), key)
            .await
            .map_err(|err| store_error("storage get", err))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        decode("stored value", value).map(Some)
    }

    async fn set(
        &self,
        scope: StorageScope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let value = encode("stored value", &value)?;
        storageSet(area_name(scope), key, value)
            .await
            .map_err(|err| store_error("storage set", err))
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StoreError> {
        storageRemove(area_name(scope), key)
            .await
            .map_err(|err| store_error("storage remove", err))
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

type BrowserEngine = GroupingEngine<BrowserTabStore, BrowserKv, SystemClock>;

/// The object the background script holds; every method returns a Promise
#[wasm_bindgen]
pub struct ShepherdHost {
    engine: Rc<BrowserEngine>,
}

/// Build a host with settings and derived state loaded from storage
#[wasm_bindgen]
pub async fn boot_host() -> ShepherdHost {
    web_sys::console::log_1(&JsValue::from_str("tab-shepherd core loaded"));
    let engine = GroupingEngine::bootstrap(BrowserTabStore, BrowserKv, SystemClock).await;
    ShepherdHost {
        engine: Rc::new(engine),
    }
}

#[wasm_bindgen]
impl ShepherdHost {
    /// Feed one host event into the engine
    pub fn handle_event(&self, event: JsValue) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            match serde_wasm_bindgen::from_value::<TabEvent>(event) {
                Ok(event) => engine.handle_event(event).await,
                Err(err) => log::warn!("unrecognized tab event: {err}"),
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Drive ghost expiry, auto-ordering and the debounced reconciliation;
    /// resolves to true when the sidebar should re-render
    pub fn tick(&self) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            Ok(JsValue::from_bool(engine.tick().await))
        })
    }

    pub fn refresh_all(&self) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            if let Err(err) = engine.refresh_all().await {
                log::warn!("refresh failed: {err}");
            }
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn sleep_group(&self, group_id: i32) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            match engine.sleep_group(group_id).await {
                Ok(slept) => Ok(JsValue::from_bool(slept)),
                Err(err) => {
                    log::warn!("sleep failed for group {group_id}: {err}");
                    Ok(JsValue::from_bool(false))
                }
            }
        })
    }

    pub fn wake_group(&self, entry_id: String) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            match engine.wake_group(&entry_id).await {
                Ok(woken) => Ok(JsValue::from_bool(woken)),
                Err(err) => {
                    log::warn!("wake failed for {entry_id}: {err}");
                    Ok(JsValue::from_bool(false))
                }
            }
        })
    }

    pub fn delete_sleeping(&self, entry_id: String) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            Ok(JsValue::from_bool(engine.delete_sleeping(&entry_id).await))
        })
    }

    pub fn is_auto_group(&self, group_id: i32) -> bool {
        self.engine.is_auto_group(group_id)
    }

    /// The classified view (grouped / ungrouped / ghost / sleeping) for
    /// the sidebar
    pub fn view(&self) -> js_sys::Promise {
        let engine = self.engine.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            match engine.classified_view().await {
                Ok(view) => serde_wasm_bindgen::to_value(&view)
                    .map_err(|err| JsValue::from_str(&err.to_string())),
                Err(err) => {
                    log::warn!("view failed: {err}");
                    Ok(JsValue::NULL)
                }
            }
        })
    }

    pub fn update_settings(&self, settings: JsValue) {
        match serde_wasm_bindgen::from_value::<Settings>(settings) {
            Ok(settings) => self.engine.update_settings(settings),
            Err(err) => log::warn!("rejecting malformed settings: {err}"),
        }
    }
}
