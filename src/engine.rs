/// The grouping engine: decides group membership for tabs and keeps the
/// derived state (auto registry, ghosts, sleeping groups) consistent with
/// the host's tab store.
///
/// Every mutating path runs under the mutation lock, and every decision
/// re-reads authoritative state first: the store changes underneath us
/// between any two awaits.
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::colors::{GroupColor, pick_color};
use crate::domain::{extract_domain, hostname_of, short_name, should_ignore};
use crate::ghost::{GHOSTS_KEY, GhostTracker};
use crate::lock::MutationLock;
use crate::rules::{CustomRule, match_rule};
use crate::settings::Settings;
use crate::sleep::{SLEEPING_KEY, SleepingGroup, SleepingStore, can_sleep};
use crate::store::{
    Clock, GroupUpdate, KvStore, StorageScope, StoreError, TabEvent, TabQuery, TabStore,
    kv_load_or, kv_save,
};
use crate::tab_data::{GroupId, GroupInfo, TabId, TabInfo, WindowId};
use crate::tracking::{AUTO_KEY, AutoGroupRegistry, MANUAL_KEY, assess_auto_status};
use crate::view::{self, ClassifiedView};

/// Quiet period before a burst of host events becomes one reconciliation
pub const RENDER_DEBOUNCE_MS: u64 = 300;

/// Title and color of the uncategorized bucket when it exists as a real group
const OTHER_TITLE: &str = "Other";

const SETTINGS_KEY: &str = "settings";

/// Treat stale-reference failures as "no visible change occurred"
fn ignore_stale<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_stale() => Ok(None),
        Err(err) => Err(err),
    }
}

pub struct GroupingEngine<S, K, C> {
    store: S,
    kv: K,
    clock: C,
    lock: MutationLock,
    settings: RefCell<Settings>,
    registry: RefCell<AutoGroupRegistry>,
    ghosts: RefCell<GhostTracker>,
    sleeping: RefCell<SleepingStore>,
    activation_times: RefCell<HashMap<TabId, u64>>,
    dirty_since: Cell<Option<u64>>,
}

impl<S: TabStore, K: KvStore, C: Clock> GroupingEngine<S, K, C> {
    pub fn new(store: S, kv: K, clock: C, settings: Settings) -> Self {
        GroupingEngine {
            store,
            kv,
            clock,
            lock: MutationLock::new(),
            settings: RefCell::new(settings.sanitized()),
            registry: RefCell::new(AutoGroupRegistry::new()),
            ghosts: RefCell::new(GhostTracker::new()),
            sleeping: RefCell::new(SleepingStore::new()),
            activation_times: RefCell::new(HashMap::new()),
            dirty_since: Cell::new(None),
        }
    }

    /// Construct with settings and derived state loaded from storage
    pub async fn bootstrap(store: S, kv: K, clock: C) -> Self {
        let settings: Settings = kv_load_or(&kv, StorageScope::Synced, SETTINGS_KEY).await;
        let registry = AutoGroupRegistry::load(&kv).await;
        let ghosts = GhostTracker::load(&kv).await;
        let sleeping = SleepingStore::load(&kv).await;

        let engine = GroupingEngine::new(store, kv, clock, settings);
        *engine.registry.borrow_mut() = registry;
        *engine.ghosts.borrow_mut() = ghosts;
        *engine.sleeping.borrow_mut() = sleeping;
        engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn settings(&self) -> Settings {
        self.settings.borrow().clone()
    }

    pub fn update_settings(&self, settings: Settings) {
        *self.settings.borrow_mut() = settings.sanitized();
    }

    pub fn is_auto_group(&self, group_id: GroupId) -> bool {
        self.registry.borrow().is_auto(group_id)
    }

    // ------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------

    /// React to one host event. Failures degrade to "nothing happened";
    /// nothing propagates to the UI layer.
    pub async fn handle_event(&self, event: TabEvent) {
        match event {
            TabEvent::TabUpdated { tab, complete } => {
                if complete && !should_ignore(&tab.url) {
                    if let Err(err) = self.group_one_tab(&tab).await {
                        log::warn!("grouping tab {} failed: {err}", tab.id);
                    }
                }
                self.mark_dirty();
            }
            TabEvent::TabCreated { .. } | TabEvent::TabMoved { .. } => self.mark_dirty(),
            TabEvent::TabRemoved { tab_id } => {
                self.activation_times.borrow_mut().remove(&tab_id);
                if self.ghosts.borrow_mut().forget_tab(tab_id) {
                    self.persist_ghosts().await;
                }
                // Membership diff runs before the debounce window so a
                // 2-to-1 shrink is caught while the survivor still exists
                self.observe_memberships().await;
                self.mark_dirty();
            }
            TabEvent::TabActivated { tab_id, window_id } => {
                self.on_activated(tab_id, window_id).await;
                self.mark_dirty();
            }
            TabEvent::GroupRemoved { group_id } => {
                if self.registry.borrow_mut().forget(group_id) {
                    self.persist_registry().await;
                }
                self.mark_dirty();
            }
            TabEvent::GroupCreated { .. } | TabEvent::GroupUpdated { .. } => self.mark_dirty(),
        }
    }

    /// Periodic driver for ghost expiry, auto-ordering and the debounced
    /// reconciliation. Returns true when the UI should re-render.
    pub async fn tick(&self) -> bool {
        let now = self.clock.now_ms();
        let mut render = false;

        let expired = self.ghosts.borrow_mut().take_expired(now);
        if !expired.is_empty() {
            self.persist_ghosts().await;
            // Expiry actively restores the tab to the uncategorized view,
            // wherever the host may have silently placed it
            self.lock
                .with_lock(|| async move {
                    for tab_id in &expired {
                        if let Err(err) = self.store.ungroup_tabs(&[*tab_id]).await
                            && !err.is_stale()
                        {
                            log::warn!("failed to ungroup expired ghost tab {tab_id}: {err}");
                        }
                    }
                })
                .await;
            render = true;
        }

        let auto_ordering = self.settings.borrow().auto_ordering;
        if auto_ordering
            && let Ok(window_id) = self.store.current_window().await
            && let Ok(active) = self.store.query_tabs(TabQuery::active_in(window_id)).await
            && let Some(active) = active.first()
        {
            self.check_auto_ordering(active.id).await;
        }

        if let Some(since) = self.dirty_since.get()
            && now >= since + RENDER_DEBOUNCE_MS
        {
            self.dirty_since.set(None);
            self.observe_memberships().await;
            render = true;
        }

        render
    }

    fn mark_dirty(&self) {
        self.dirty_since.set(Some(self.clock.now_ms()));
    }

    // ------------------------------------------------------------------
    // Grouping decisions
    // ------------------------------------------------------------------

    /// Decide and apply group membership for a single tab
    pub async fn group_one_tab(&self, tab: &TabInfo) -> Result<(), StoreError> {
        self.lock.with_lock(|| self.group_single_tab(tab)).await
    }

    /// Re-run grouping over every eligible tab
    pub async fn refresh_all(&self) -> Result<(), StoreError> {
        self.lock.with_lock(|| self.apply_to_all()).await?;
        self.observe_memberships().await;
        Ok(())
    }

    async fn group_single_tab(&self, tab: &TabInfo) -> Result<(), StoreError> {
        if should_ignore(&tab.url) {
            return Ok(());
        }
        let Some(domain) = extract_domain(&tab.url) else {
            return Ok(());
        };

        // The event payload is stale by now; act on live state
        let current = match self.store.get_tab(tab.id).await {
            Ok(current) => current,
            Err(err) if err.is_stale() => return Ok(()),
            Err(err) => return Err(err),
        };

        let settings = self.settings.borrow().clone();
        let hostname = hostname_of(&tab.url);

        // 1. Custom rules take priority
        if settings.custom_grouping
            && let Some(hostname) = hostname.as_deref()
            && let Some(rule) = match_rule(hostname, &settings.custom_groups)
        {
            match self
                .find_group_by_title_and_color(current.window_id, &rule.name, rule.color)
                .await?
            {
                Some(group) => {
                    if current.group_id != Some(group.id) {
                        ignore_stale(self.store.group_tabs(&[current.id], Some(group.id)).await)?;
                    }
                }
                None => {
                    self.ensure_color_for_custom_group(
                        current.window_id,
                        &rule.name,
                        rule.color,
                        &settings,
                    )
                    .await?;
                    if let Some(group_id) =
                        ignore_stale(self.store.group_tabs(&[current.id], None).await)?
                    {
                        ignore_stale(
                            self.store
                                .update_group(group_id, GroupUpdate::titled(&rule.name, rule.color))
                                .await,
                        )?;
                    }
                }
            }
            return Ok(());
        }

        // 2. Domain auto-grouping
        if settings.auto_grouping {
            if let Some(group) = self
                .find_auto_group_for_domain(current.window_id, &domain)
                .await?
            {
                if current.group_id != Some(group.id) {
                    ignore_stale(self.store.group_tabs(&[current.id], Some(group.id)).await)?;
                }
                return Ok(());
            }

            // No group yet: one only materializes with 2+ same-domain tabs
            let all_tabs = self
                .store
                .query_tabs(TabQuery::window(current.window_id))
                .await?;
            let mut ids: Vec<TabId> = vec![current.id];
            ids.extend(
                all_tabs
                    .iter()
                    .filter(|t| {
                        t.id != current.id
                            && t.group_id.is_none()
                            && extract_domain(&t.url).as_deref() == Some(domain.as_str())
                    })
                    .map(|t| t.id),
            );

            if ids.len() >= 2 {
                if let Some(group_id) = self.group_batch_tolerant(&ids, None).await? {
                    let color = self
                        .next_available_color(current.window_id, &settings)
                        .await?;
                    ignore_stale(
                        self.store
                            .update_group(group_id, GroupUpdate::titled(short_name(&domain), color))
                            .await,
                    )?;
                    self.registry.borrow_mut().mark_auto(group_id);
                    self.persist_registry().await;
                }
                return Ok(());
            }
        }

        // 3. The tab fits nothing; maybe it is the odd one out of its group
        if let Some(group_id) = current.group_id {
            let group_tabs = self.store.query_tabs(TabQuery::group(group_id)).await?;
            let others: Vec<&TabInfo> =
                group_tabs.iter().filter(|t| t.id != current.id).collect();

            if !others.is_empty() {
                let other_domains: HashSet<Option<String>> =
                    others.iter().map(|t| extract_domain(&t.url)).collect();
                if other_domains.len() > 1 {
                    // Mixed-domain siblings mean the user curated this
                    // group; leave the tab where they put it
                    if self.registry.borrow_mut().unmark_auto(group_id) {
                        self.persist_registry().await;
                    }
                    return Ok(());
                }
            }

            ignore_stale(self.store.ungroup_tabs(&[current.id]).await)?;
            if others.len() >= 2 {
                self.revalidate_group(group_id).await;
            }
        }
        Ok(())
    }

    async fn apply_to_all(&self) -> Result<(), StoreError> {
        let settings = self.settings.borrow().clone();
        if !settings.auto_grouping && !settings.custom_grouping {
            return Ok(());
        }

        let windows = if settings.all_windows {
            self.store.all_windows().await?
        } else {
            vec![self.store.current_window().await?]
        };
        for window_id in windows {
            self.apply_to_window(window_id, &settings).await?;
        }
        Ok(())
    }

    async fn apply_to_window(
        &self,
        window_id: WindowId,
        settings: &Settings,
    ) -> Result<(), StoreError> {
        let tabs = self.store.query_tabs(TabQuery::window(window_id)).await?;
        let groups = self.store.query_groups(Some(window_id)).await?;

        let other_group_id = groups
            .iter()
            .find(|g| g.title == OTHER_TITLE && g.color == GroupColor::Grey)
            .map(|g| g.id);

        let matches_rule = |url: &str| {
            hostname_of(url)
                .is_some_and(|h| match_rule(&h, &settings.custom_groups).is_some())
        };

        // Dry-run and batching over the snapshot, before any mutation
        let (has_work, custom_batches) = {
            let registry = self.registry.borrow();
            // Eligible for a custom group: ungrouped, in "Other", or in a
            // group this engine created; never a tab the user grouped
            let eligible_for_custom = |tab: &TabInfo| match tab.group_id {
                None => true,
                Some(group_id) => Some(group_id) == other_group_id || registry.is_auto(group_id),
            };

            let mut has_work = false;
            if settings.custom_grouping {
                has_work = tabs.iter().any(|tab| {
                    eligible_for_custom(tab)
                        && !should_ignore(&tab.url)
                        && matches_rule(&tab.url)
                });
            }
            if !has_work && settings.auto_grouping {
                let mut domain_counts: BTreeMap<String, usize> = BTreeMap::new();
                for tab in &tabs {
                    if tab.group_id.is_some() && tab.group_id != other_group_id {
                        continue;
                    }
                    if should_ignore(&tab.url) {
                        continue;
                    }
                    let Some(domain) = extract_domain(&tab.url) else {
                        continue;
                    };
                    if settings.custom_grouping && matches_rule(&tab.url) {
                        continue;
                    }
                    *domain_counts.entry(domain).or_insert(0) += 1;
                }
                has_work = domain_counts.iter().any(|(domain, count)| {
                    *count >= 2 || groups.iter().any(|g| g.title == short_name(domain))
                });
            }

            let mut batches: Vec<(&CustomRule, Vec<TabId>)> = Vec::new();
            if settings.custom_grouping {
                for tab in &tabs {
                    if !eligible_for_custom(tab) || should_ignore(&tab.url) {
                        continue;
                    }
                    let Some(hostname) = hostname_of(&tab.url) else {
                        continue;
                    };
                    let Some(rule) = match_rule(&hostname, &settings.custom_groups) else {
                        continue;
                    };
                    match batches
                        .iter_mut()
                        .find(|(r, _)| r.name == rule.name && r.color == rule.color)
                    {
                        Some((_, ids)) => ids.push(tab.id),
                        None => batches.push((rule, vec![tab.id])),
                    }
                }
            }
            (has_work, batches)
        };

        if !has_work {
            return Ok(());
        }

        // Pass 1: custom groups, one membership mutation per batch
        for (rule, tab_ids) in custom_batches {
            match self
                .find_group_by_title_and_color(window_id, &rule.name, rule.color)
                .await?
            {
                Some(group) => {
                    self.group_batch_tolerant(&tab_ids, Some(group.id)).await?;
                }
                None => {
                    self.ensure_color_for_custom_group(window_id, &rule.name, rule.color, settings)
                        .await?;
                    if let Some(group_id) = self.group_batch_tolerant(&tab_ids, None).await? {
                        ignore_stale(
                            self.store
                                .update_group(group_id, GroupUpdate::titled(&rule.name, rule.color))
                                .await,
                        )?;
                    }
                }
            }
        }

        // Pass 2: domain auto-groups over a fresh read, pass 1 moved tabs
        if settings.auto_grouping {
            let updated = self.store.query_tabs(TabQuery::window(window_id)).await?;
            let mut domain_map: BTreeMap<String, Vec<TabInfo>> = BTreeMap::new();
            for tab in updated {
                if tab.group_id.is_some() && tab.group_id != other_group_id {
                    continue;
                }
                if should_ignore(&tab.url) {
                    continue;
                }
                let Some(domain) = extract_domain(&tab.url) else {
                    continue;
                };
                if settings.custom_grouping && matches_rule(&tab.url) {
                    continue;
                }
                domain_map.entry(domain).or_default().push(tab);
            }

            for (domain, domain_tabs) in domain_map {
                match self.find_auto_group_for_domain(window_id, &domain).await? {
                    Some(group) => {
                        let to_add: Vec<TabId> = domain_tabs
                            .iter()
                            .filter(|t| t.group_id != Some(group.id))
                            .map(|t| t.id)
                            .collect();
                        if !to_add.is_empty() {
                            self.group_batch_tolerant(&to_add, Some(group.id)).await?;
                        }
                    }
                    None if domain_tabs.len() >= 2 => {
                        let ids: Vec<TabId> = domain_tabs.iter().map(|t| t.id).collect();
                        if let Some(group_id) = self.group_batch_tolerant(&ids, None).await? {
                            let color = self.next_available_color(window_id, settings).await?;
                            ignore_stale(
                                self.store
                                    .update_group(
                                        group_id,
                                        GroupUpdate::titled(short_name(&domain), color),
                                    )
                                    .await,
                            )?;
                            self.registry.borrow_mut().mark_auto(group_id);
                            self.persist_registry().await;
                        }
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    /// Issue one grouping mutation for a batch, dropping any tab the host
    /// reports as gone and retrying with the remainder
    async fn group_batch_tolerant(
        &self,
        tab_ids: &[TabId],
        group_id: Option<GroupId>,
    ) -> Result<Option<GroupId>, StoreError> {
        let mut remaining = tab_ids.to_vec();
        while !remaining.is_empty() {
            match self.store.group_tabs(&remaining, group_id).await {
                Ok(group_id) => return Ok(Some(group_id)),
                Err(StoreError::TabVanished(gone)) => remaining.retain(|id| *id != gone),
                Err(err) if err.is_stale() => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    async fn close_batch_tolerant(&self, tab_ids: &[TabId]) -> Result<(), StoreError> {
        let mut remaining = tab_ids.to_vec();
        while !remaining.is_empty() {
            match self.store.close_tabs(&remaining).await {
                Ok(()) => return Ok(()),
                Err(StoreError::TabVanished(gone)) => remaining.retain(|id| *id != gone),
                Err(err) if err.is_stale() => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Group lookup and colors
    // ------------------------------------------------------------------

    async fn find_group_by_title_and_color(
        &self,
        window_id: WindowId,
        title: &str,
        color: GroupColor,
    ) -> Result<Option<GroupInfo>, StoreError> {
        let groups = self.store.query_groups(Some(window_id)).await?;
        Ok(groups
            .into_iter()
            .find(|g| g.title == title && g.color == color))
    }

    /// Auto groups are found by title alone; their color drifts with the
    /// palette
    async fn find_auto_group_for_domain(
        &self,
        window_id: WindowId,
        domain: &str,
    ) -> Result<Option<GroupInfo>, StoreError> {
        let expected = short_name(domain);
        let groups = self.store.query_groups(Some(window_id)).await?;
        Ok(groups.into_iter().find(|g| g.title == expected))
    }

    async fn next_available_color(
        &self,
        window_id: WindowId,
        settings: &Settings,
    ) -> Result<GroupColor, StoreError> {
        let groups = self.store.query_groups(Some(window_id)).await?;
        let used: HashSet<GroupColor> = groups.iter().map(|g| g.color).collect();
        Ok(pick_color(&used, &settings.reserved_colors()))
    }

    /// Keep a custom rule's configured color stable: if another group in
    /// the window holds it under a different title, move that group to a
    /// freshly picked color first
    async fn ensure_color_for_custom_group(
        &self,
        window_id: WindowId,
        title: &str,
        desired: GroupColor,
        settings: &Settings,
    ) -> Result<(), StoreError> {
        let groups = self.store.query_groups(Some(window_id)).await?;
        let Some(conflicting) = groups
            .iter()
            .find(|g| g.color == desired && g.title != title)
        else {
            return Ok(());
        };

        let mut used: HashSet<GroupColor> = groups.iter().map(|g| g.color).collect();
        used.insert(desired);
        let replacement = pick_color(&used, &settings.reserved_colors());
        if replacement != desired {
            log::debug!(
                "swapping color of '{}' to free {desired:?} for '{title}'",
                conflicting.title
            );
            ignore_stale(
                self.store
                    .update_group(conflicting.id, GroupUpdate::recolored(replacement))
                    .await,
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Auto-group registry maintenance
    // ------------------------------------------------------------------

    async fn revalidate_group(&self, group_id: GroupId) {
        let status = assess_auto_status(&self.store, group_id).await;
        self.registry.borrow_mut().apply_status(group_id, status);
        self.persist_registry().await;
    }

    // ------------------------------------------------------------------
    // Ghost maintenance
    // ------------------------------------------------------------------

    /// Diff group memberships against the last snapshot and persist any
    /// ghost entries that appeared
    async fn observe_memberships(&self) {
        let (tabs, groups) = match self.fetch_scoped().await {
            Ok(state) => state,
            Err(err) => {
                log::debug!("skipping membership diff: {err}");
                return;
            }
        };
        let now = self.clock.now_ms();
        if self.ghosts.borrow_mut().observe(&tabs, &groups, now) {
            self.persist_ghosts().await;
        }
    }

    async fn fetch_scoped(&self) -> Result<(Vec<TabInfo>, Vec<GroupInfo>), StoreError> {
        let all_windows = self.settings.borrow().all_windows;
        if all_windows {
            Ok((
                self.store.query_tabs(TabQuery::default()).await?,
                self.store.query_groups(None).await?,
            ))
        } else {
            let window_id = self.store.current_window().await?;
            Ok((
                self.store.query_tabs(TabQuery::window(window_id)).await?,
                self.store.query_groups(Some(window_id)).await?,
            ))
        }
    }

    // ------------------------------------------------------------------
    // Auto-ordering
    // ------------------------------------------------------------------

    async fn on_activated(&self, tab_id: TabId, window_id: WindowId) {
        let auto_ordering = self.settings.borrow().auto_ordering;
        if auto_ordering && let Ok(tabs) = self.store.query_tabs(TabQuery::window(window_id)).await
        {
            for tab in tabs.iter().filter(|t| t.id != tab_id) {
                self.check_auto_ordering(tab.id).await;
            }
        }
        self.activation_times
            .borrow_mut()
            .insert(tab_id, self.clock.now_ms());
    }

    /// Move a tab that has been active long enough to the front of its
    /// group
    async fn check_auto_ordering(&self, tab_id: TabId) {
        let threshold_ms = {
            let settings = self.settings.borrow();
            if !settings.auto_ordering {
                return;
            }
            u64::from(settings.auto_ordering_seconds) * 1000
        };
        let Some(started) = self.activation_times.borrow().get(&tab_id).copied() else {
            return;
        };
        if self.clock.now_ms().saturating_sub(started) < threshold_ms {
            return;
        }

        let result = self
            .lock
            .with_lock(|| async move {
                let tab = match self.store.get_tab(tab_id).await {
                    Ok(tab) => tab,
                    Err(_) => return Ok(()),
                };
                let Some(group_id) = tab.group_id else {
                    return Ok(());
                };
                let mut group_tabs = self.store.query_tabs(TabQuery::group(group_id)).await?;
                if group_tabs.len() < 2 {
                    return Ok(());
                }
                group_tabs.sort_by_key(|t| t.index);
                let first = &group_tabs[0];
                if tab.id != first.id {
                    let front = first.index;
                    ignore_stale(self.store.move_tab(tab.id, front).await)?;
                    // Moving detaches the tab from its group on some hosts
                    ignore_stale(self.store.group_tabs(&[tab.id], Some(group_id)).await)?;
                }
                Ok::<(), StoreError>(())
            })
            .await;
        if let Err(err) = result {
            log::warn!("auto-ordering tab {tab_id} failed: {err}");
        }
    }

    // ------------------------------------------------------------------
    // Sleeping groups
    // ------------------------------------------------------------------

    /// Snapshot a live group into durable storage and close its tabs.
    /// Returns false when the group cannot be slept (pseudo-group, or it
    /// vanished first).
    pub async fn sleep_group(&self, group_id: GroupId) -> Result<bool, StoreError> {
        if !can_sleep(group_id) {
            return Ok(false);
        }
        self.lock
            .with_lock(|| async move {
                let group = match self.store.get_group(group_id).await {
                    Ok(group) => group,
                    Err(err) if err.is_stale() => return Ok(false),
                    Err(err) => return Err(err),
                };
                let tabs = self.store.query_tabs(TabQuery::group(group_id)).await?;
                if tabs.is_empty() {
                    return Ok(false);
                }

                let is_manual = !self.registry.borrow().is_auto(group_id);
                let entry = SleepingGroup::snapshot(&group, &tabs, self.clock.now_ms(), is_manual);
                self.sleeping.borrow_mut().insert(entry);
                self.persist_sleeping().await;

                // The group deletes itself once its last tab closes
                let ids: Vec<TabId> = tabs.iter().map(|t| t.id).collect();
                self.close_batch_tolerant(&ids).await?;
                Ok(true)
            })
            .await
    }

    /// Recreate a sleeping group's tabs and re-group them under the
    /// stored title and color. Waking an unknown (already woken) entry is
    /// a no-op.
    pub async fn wake_group(&self, entry_id: &str) -> Result<bool, StoreError> {
        self.lock
            .with_lock(|| async move {
                let Some(entry) = self.sleeping.borrow_mut().remove(entry_id) else {
                    return Ok(false);
                };
                self.persist_sleeping().await;

                let window_id = self.store.current_window().await?;
                let mut created: Vec<TabId> = Vec::new();
                for saved in &entry.tabs {
                    match self.store.create_tab(&saved.url, window_id, false).await {
                        Ok(tab) => created.push(tab.id),
                        Err(err) => log::warn!("failed to recreate tab {}: {err}", saved.url),
                    }
                }
                if created.is_empty() {
                    return Ok(true);
                }

                if let Some(group_id) = self.group_batch_tolerant(&created, None).await? {
                    ignore_stale(
                        self.store
                            .update_group(group_id, GroupUpdate::titled(&entry.title, entry.color))
                            .await,
                    )?;
                    if entry.is_manual {
                        // A woken manual group must stay out of auto-grouping's reach
                        self.registry.borrow_mut().mark_manual(group_id);
                        self.persist_registry().await;
                    }
                }
                Ok(true)
            })
            .await
    }

    pub async fn delete_sleeping(&self, entry_id: &str) -> bool {
        let removed = self.sleeping.borrow_mut().remove(entry_id).is_some();
        if removed {
            self.persist_sleeping().await;
        }
        removed
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    /// The current classified view of tabs for the rendering layer.
    /// Read-only: tolerates the store changing underneath it.
    pub async fn classified_view(&self) -> Result<ClassifiedView, StoreError> {
        let window_id = self.store.current_window().await?;
        let (tabs, groups) = self.fetch_scoped().await?;
        let now = self.clock.now_ms();
        let ghosts = self.ghosts.borrow();
        let sleeping = self.sleeping.borrow();
        Ok(view::classify(
            &tabs, &groups, &ghosts, &sleeping, window_id, now,
        ))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn persist_ghosts(&self) {
        let snapshot = self.ghosts.borrow().to_persist();
        kv_save(&self.kv, StorageScope::Session, GHOSTS_KEY, &snapshot).await;
    }

    async fn persist_registry(&self) {
        let (auto, manual) = self.registry.borrow().to_persist();
        kv_save(&self.kv, StorageScope::Session, AUTO_KEY, &auto).await;
        kv_save(&self.kv, StorageScope::Session, MANUAL_KEY, &manual).await;
    }

    async fn persist_sleeping(&self) {
        let snapshot = self.sleeping.borrow().to_persist();
        kv_save(&self.kv, StorageScope::Durable, SLEEPING_KEY, &snapshot).await;
    }
}
