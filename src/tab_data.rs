/// Data structures shared across the grouping engine
use serde::{Deserialize, Serialize};

use crate::colors::GroupColor;

pub type TabId = i32;
pub type GroupId = i32;
pub type WindowId = i32;

/// Information about a browser tab, as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    /// `None` means ungrouped; the host encodes that as -1 on the wire
    #[serde(with = "group_id_wire", default)]
    pub group_id: Option<GroupId>,
    pub window_id: WindowId,
    pub index: i32,
    #[serde(default)]
    pub active: bool,
}

/// Information about a live tab group, as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: GroupId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
    pub window_id: WindowId,
}

/// A tab snapshot inside a sleeping group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTab {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

/// The host reports "no group" as -1; keep that on the wire, use Option in Rust
mod group_id_wire {
    use super::GroupId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<GroupId>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(v.unwrap_or(-1))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<GroupId>, D::Error> {
        let raw = Option::<GroupId>::deserialize(d)?;
        Ok(raw.filter(|id| *id >= 0))
    }
}

impl TabInfo {
    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }
}
