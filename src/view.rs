/// The classified view of tabs handed to the rendering layer
///
/// Pure assembly over already-fetched state; building a view never
/// mutates the tab store.
use std::collections::HashMap;

use serde::Serialize;

use crate::colors::GroupColor;
use crate::ghost::{GhostStatus, GhostTracker};
use crate::sleep::{SleepingGroup, SleepingStore};
use crate::tab_data::{GroupId, GroupInfo, TabInfo, WindowId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub info: GroupInfo,
    pub tabs: Vec<TabInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostView {
    pub tab: TabInfo,
    pub title: String,
    pub color: GroupColor,
    pub original_group_id: GroupId,
    pub remaining_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedView {
    pub window_id: WindowId,
    /// Live groups in first-appearance order of their tabs
    pub groups: Vec<GroupView>,
    /// The uncategorized "Other" bucket
    pub ungrouped: Vec<TabInfo>,
    pub ghosts: Vec<GhostView>,
    pub sleeping: Vec<SleepingGroup>,
}

pub fn classify(
    tabs: &[TabInfo],
    groups: &[GroupInfo],
    ghosts: &GhostTracker,
    sleeping: &SleepingStore,
    window_id: WindowId,
    now: u64,
) -> ClassifiedView {
    let group_infos: HashMap<GroupId, &GroupInfo> = groups.iter().map(|g| (g.id, g)).collect();

    let mut grouped: HashMap<GroupId, Vec<TabInfo>> = HashMap::new();
    let mut group_order: Vec<GroupId> = Vec::new();
    let mut ungrouped = Vec::new();
    let mut ghost_views = Vec::new();

    for tab in tabs {
        let ghost = ghosts.entry(tab.id).filter(|g| !g.is_expired(now));
        let status = if ghost.is_some() {
            ghosts.status_of(tab)
        } else {
            GhostStatus::Ungrouped
        };

        if let Some(ghost) = ghost
            && status == GhostStatus::Ghost
        {
            ghost_views.push(GhostView {
                tab: tab.clone(),
                title: ghost.title.clone(),
                color: ghost.color,
                original_group_id: ghost.original_group_id,
                remaining_seconds: ghost.remaining_seconds(now),
            });
            continue;
        }

        match tab.group_id {
            Some(group_id) if group_infos.contains_key(&group_id) => {
                grouped
                    .entry(group_id)
                    .or_insert_with(|| {
                        group_order.push(group_id);
                        Vec::new()
                    })
                    .push(tab.clone());
            }
            _ => ungrouped.push(tab.clone()),
        }
    }

    ClassifiedView {
        window_id,
        groups: group_order
            .into_iter()
            .map(|group_id| GroupView {
                info: (*group_infos[&group_id]).clone(),
                tabs: grouped.remove(&group_id).unwrap_or_default(),
            })
            .collect(),
        ungrouped,
        ghosts: ghost_views,
        sleeping: sleeping.all().into_iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: i32, group_id: Option<GroupId>) -> TabInfo {
        TabInfo {
            id,
            url: format!("https://site{id}.example"),
            title: format!("Tab {id}"),
            fav_icon_url: None,
            group_id,
            window_id: 1,
            index: id,
            active: false,
        }
    }

    fn group(id: GroupId, title: &str) -> GroupInfo {
        GroupInfo {
            id,
            title: title.to_string(),
            color: GroupColor::Green,
            collapsed: false,
            window_id: 1,
        }
    }

    #[test]
    fn test_classify_buckets() {
        let tabs = vec![tab(1, Some(10)), tab(2, None), tab(3, Some(10)), tab(4, None)];
        let groups = vec![group(10, "work")];
        let mut ghosts = GhostTracker::new();
        // Put tab 4 through a group dissolution so it carries a ghost entry
        ghosts.observe(&[tab(4, Some(20)), tab(5, Some(20))], &[group(20, "gone")], 0);
        ghosts.observe(&tabs, &groups, 0);

        let view = classify(&tabs, &groups, &ghosts, &SleepingStore::new(), 1, 0);

        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].info.title, "work");
        assert_eq!(view.groups[0].tabs.len(), 2);
        assert_eq!(view.ungrouped.len(), 1);
        assert_eq!(view.ungrouped[0].id, 2);
        assert_eq!(view.ghosts.len(), 1);
        assert_eq!(view.ghosts[0].tab.id, 4);
        assert_eq!(view.ghosts[0].title, "gone");
        assert!(view.sleeping.is_empty());
    }

    #[test]
    fn test_expired_ghost_renders_ungrouped() {
        let tabs = vec![tab(1, None)];
        let mut ghosts = GhostTracker::new();
        ghosts.observe(&[tab(1, Some(20)), tab(2, Some(20))], &[group(20, "gone")], 0);
        ghosts.observe(&tabs, &[], 0);
        assert!(ghosts.entry(1).is_some());

        // Past the expiry window the entry is ignored even if not yet pruned
        let view = classify(&tabs, &[], &ghosts, &SleepingStore::new(), 1, 16_000);
        assert!(view.ghosts.is_empty());
        assert_eq!(view.ungrouped.len(), 1);
    }

    #[test]
    fn test_tab_in_unknown_group_degrades_to_ungrouped() {
        let tabs = vec![tab(1, Some(99))];
        let view = classify(&tabs, &[], &GhostTracker::new(), &SleepingStore::new(), 1, 0);
        assert!(view.groups.is_empty());
        assert_eq!(view.ungrouped.len(), 1);
    }
}
