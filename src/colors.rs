/// Host tab-group color palette and color allocation
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The host's fixed group color palette, in allocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

pub const PALETTE: [GroupColor; 9] = [
    GroupColor::Grey,
    GroupColor::Blue,
    GroupColor::Red,
    GroupColor::Yellow,
    GroupColor::Green,
    GroupColor::Pink,
    GroupColor::Purple,
    GroupColor::Cyan,
    GroupColor::Orange,
];

/// Fallback when every palette color is taken
pub const FALLBACK_COLOR: GroupColor = GroupColor::Grey;

impl Default for GroupColor {
    fn default() -> Self {
        FALLBACK_COLOR
    }
}

impl GroupColor {
    /// Hex code for rendering
    pub fn hex(self) -> &'static str {
        match self {
            GroupColor::Grey => "#5f6368",
            GroupColor::Blue => "#1a73e8",
            GroupColor::Red => "#d93025",
            GroupColor::Yellow => "#f9ab00",
            GroupColor::Green => "#1e8e3e",
            GroupColor::Pink => "#d01884",
            GroupColor::Purple => "#9334e6",
            GroupColor::Cyan => "#007b83",
            GroupColor::Orange => "#e8710a",
        }
    }
}

/// Pick the first palette color in neither set; if every color is used or
/// reserved, fall back to the first not merely used; grey when exhausted.
pub fn pick_color(used: &HashSet<GroupColor>, reserved: &HashSet<GroupColor>) -> GroupColor {
    if let Some(color) = PALETTE
        .iter()
        .find(|c| !used.contains(*c) && !reserved.contains(*c))
    {
        return *color;
    }
    if let Some(color) = PALETTE.iter().find(|c| !used.contains(*c)) {
        return *color;
    }
    FALLBACK_COLOR
}
