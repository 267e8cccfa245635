/// In-memory doubles for the host interfaces
///
/// `FakeTabStore` mimics the host's observable behavior: batch mutations
/// fail atomically on a vanished reference, and a group is deleted the
/// moment it has no tabs left.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::colors::GroupColor;
use crate::store::{Clock, GroupUpdate, KvStore, StorageScope, StoreError, TabQuery, TabStore};
use crate::tab_data::{GroupId, GroupInfo, TabId, TabInfo, WindowId};

#[derive(Default)]
struct World {
    tabs: Vec<TabInfo>,
    groups: Vec<GroupInfo>,
    next_tab_id: TabId,
    next_group_id: GroupId,
    current_window: WindowId,
}

pub struct FakeTabStore {
    world: RefCell<World>,
    mutations: Cell<usize>,
}

impl FakeTabStore {
    pub fn new() -> Self {
        FakeTabStore {
            world: RefCell::new(World {
                tabs: Vec::new(),
                groups: Vec::new(),
                next_tab_id: 1,
                next_group_id: 100,
                current_window: 1,
            }),
            mutations: Cell::new(0),
        }
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.get()
    }

    fn bump(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }

    pub fn add_tab(&self, window_id: WindowId, url: &str) -> TabId {
        self.add_tab_in_group(window_id, url, None)
    }

    pub fn add_tab_in_group(
        &self,
        window_id: WindowId,
        url: &str,
        group_id: Option<GroupId>,
    ) -> TabId {
        let mut world = self.world.borrow_mut();
        let id = world.next_tab_id;
        world.next_tab_id += 1;
        world.tabs.push(TabInfo {
            id,
            url: url.to_string(),
            title: url.to_string(),
            fav_icon_url: None,
            group_id,
            window_id,
            index: 0,
            active: false,
        });
        reindex(&mut world);
        id
    }

    pub fn add_group(&self, window_id: WindowId, title: &str, color: GroupColor) -> GroupId {
        let mut world = self.world.borrow_mut();
        let id = world.next_group_id;
        world.next_group_id += 1;
        world.groups.push(GroupInfo {
            id,
            title: title.to_string(),
            color,
            collapsed: false,
            window_id,
        });
        id
    }

    pub fn set_active(&self, tab_id: TabId) {
        let mut world = self.world.borrow_mut();
        for tab in &mut world.tabs {
            tab.active = tab.id == tab_id;
        }
    }

    pub fn tab_snapshot(&self, tab_id: TabId) -> Option<TabInfo> {
        self.world
            .borrow()
            .tabs
            .iter()
            .find(|t| t.id == tab_id)
            .cloned()
    }

    pub fn group_snapshot(&self, group_id: GroupId) -> Option<GroupInfo> {
        self.world
            .borrow()
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .cloned()
    }

    pub fn all_groups(&self) -> Vec<GroupInfo> {
        self.world.borrow().groups.clone()
    }

    pub fn all_tabs(&self) -> Vec<TabInfo> {
        self.world.borrow().tabs.clone()
    }
}

fn reindex(world: &mut World) {
    let mut counters: HashMap<WindowId, i32> = HashMap::new();
    for tab in &mut world.tabs {
        let counter = counters.entry(tab.window_id).or_insert(0);
        tab.index = *counter;
        *counter += 1;
    }
}

/// Groups vanish as soon as their last tab does
fn drop_empty_groups(world: &mut World) {
    let tabs = &world.tabs;
    world
        .groups
        .retain(|group| tabs.iter().any(|t| t.group_id == Some(group.id)));
}

impl TabStore for FakeTabStore {
    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<TabInfo>, StoreError> {
        let world = self.world.borrow();
        Ok(world
            .tabs
            .iter()
            .filter(|t| query.window_id.is_none_or(|w| t.window_id == w))
            .filter(|t| query.group_id.is_none_or(|g| t.group_id == Some(g)))
            .filter(|t| query.active.is_none_or(|a| t.active == a))
            .cloned()
            .collect())
    }

    async fn get_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError> {
        self.tab_snapshot(tab_id)
            .ok_or(StoreError::TabVanished(tab_id))
    }

    async fn move_tab(&self, tab_id: TabId, index: i32) -> Result<(), StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        let pos = world
            .tabs
            .iter()
            .position(|t| t.id == tab_id)
            .ok_or(StoreError::TabVanished(tab_id))?;
        let tab = world.tabs.remove(pos);

        let mut target = world.tabs.len();
        let mut seen = 0;
        for (i, t) in world.tabs.iter().enumerate() {
            if t.window_id == tab.window_id {
                if seen == index {
                    target = i;
                    break;
                }
                seen += 1;
            }
        }
        world.tabs.insert(target, tab);
        reindex(&mut world);
        Ok(())
    }

    async fn close_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        for tab_id in tab_ids {
            if !world.tabs.iter().any(|t| t.id == *tab_id) {
                return Err(StoreError::TabVanished(*tab_id));
            }
        }
        world.tabs.retain(|t| !tab_ids.contains(&t.id));
        drop_empty_groups(&mut world);
        reindex(&mut world);
        Ok(())
    }

    async fn duplicate_tab(&self, tab_id: TabId) -> Result<TabInfo, StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        let pos = world
            .tabs
            .iter()
            .position(|t| t.id == tab_id)
            .ok_or(StoreError::TabVanished(tab_id))?;
        let mut copy = world.tabs[pos].clone();
        copy.id = world.next_tab_id;
        copy.active = false;
        world.next_tab_id += 1;
        world.tabs.insert(pos + 1, copy.clone());
        reindex(&mut world);
        Ok(copy)
    }

    async fn create_tab(
        &self,
        url: &str,
        window_id: WindowId,
        active: bool,
    ) -> Result<TabInfo, StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        let id = world.next_tab_id;
        world.next_tab_id += 1;
        let tab = TabInfo {
            id,
            url: url.to_string(),
            title: url.to_string(),
            fav_icon_url: None,
            group_id: None,
            window_id,
            index: 0,
            active,
        };
        world.tabs.push(tab);
        reindex(&mut world);
        Ok(world.tabs.last().unwrap().clone())
    }

    async fn group_tabs(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> Result<GroupId, StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        // Whole batch fails when any reference is stale, like the host
        for tab_id in tab_ids {
            if !world.tabs.iter().any(|t| t.id == *tab_id) {
                return Err(StoreError::TabVanished(*tab_id));
            }
        }

        let target = match group_id {
            Some(id) => {
                if !world.groups.iter().any(|g| g.id == id) {
                    return Err(StoreError::GroupVanished(id));
                }
                id
            }
            None => {
                let id = world.next_group_id;
                world.next_group_id += 1;
                let window_id = world
                    .tabs
                    .iter()
                    .find(|t| t.id == tab_ids[0])
                    .map(|t| t.window_id)
                    .unwrap_or(world.current_window);
                world.groups.push(GroupInfo {
                    id,
                    title: String::new(),
                    color: GroupColor::Grey,
                    collapsed: false,
                    window_id,
                });
                id
            }
        };

        for tab in &mut world.tabs {
            if tab_ids.contains(&tab.id) {
                tab.group_id = Some(target);
            }
        }
        drop_empty_groups(&mut world);
        Ok(target)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        for tab_id in tab_ids {
            if !world.tabs.iter().any(|t| t.id == *tab_id) {
                return Err(StoreError::TabVanished(*tab_id));
            }
        }
        for tab in &mut world.tabs {
            if tab_ids.contains(&tab.id) {
                tab.group_id = None;
            }
        }
        drop_empty_groups(&mut world);
        Ok(())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<GroupInfo, StoreError> {
        self.group_snapshot(group_id)
            .ok_or(StoreError::GroupVanished(group_id))
    }

    async fn query_groups(
        &self,
        window_id: Option<WindowId>,
    ) -> Result<Vec<GroupInfo>, StoreError> {
        let world = self.world.borrow();
        Ok(world
            .groups
            .iter()
            .filter(|g| window_id.is_none_or(|w| g.window_id == w))
            .cloned()
            .collect())
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        update: GroupUpdate,
    ) -> Result<(), StoreError> {
        self.bump();
        let mut world = self.world.borrow_mut();
        let group = world
            .groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or(StoreError::GroupVanished(group_id))?;
        if let Some(title) = update.title {
            group.title = title;
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        Ok(())
    }

    async fn current_window(&self) -> Result<WindowId, StoreError> {
        Ok(self.world.borrow().current_window)
    }

    async fn all_windows(&self) -> Result<Vec<WindowId>, StoreError> {
        let world = self.world.borrow();
        let mut windows = vec![world.current_window];
        for tab in &world.tabs {
            if !windows.contains(&tab.window_id) {
                windows.push(tab.window_id);
            }
        }
        Ok(windows)
    }
}

#[derive(Default)]
pub struct MemoryKv {
    data: RefCell<HashMap<(StorageScope, String), serde_json::Value>>,
}

impl MemoryKv {
    pub fn raw(&self, scope: StorageScope, key: &str) -> Option<serde_json::Value> {
        self.data.borrow().get(&(scope, key.to_string())).cloned()
    }
}

impl KvStore for MemoryKv {
    async fn get(
        &self,
        scope: StorageScope,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.raw(scope, key))
    }

    async fn set(
        &self,
        scope: StorageScope,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.data
            .borrow_mut()
            .insert((scope, key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StoreError> {
        self.data.borrow_mut().remove(&(scope, key.to_string()));
        Ok(())
    }
}

pub struct FakeClock {
    now: Cell<u64>,
}

impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            now: Cell::new(1_000_000),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}
