//! Child layout
//!
//! Positioning hints are resolved first, then fill hints, since how much
//! room is left to fill depends on where each child ended up.

use super::WindowTree;
use crate::protocol::{Rect, WinId};

/// Placement hints of a child relative to a sibling or its parent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutHints {
    pub left_of: bool,
    pub right_of: bool,
    pub above: bool,
    pub below: bool,
    /// Centre horizontally in the parent
    pub center_h: bool,
    /// Centre vertically in the parent
    pub center_v: bool,
    /// Stretch to the parent's right edge
    pub fill_width: bool,
    /// Stretch to the parent's bottom edge
    pub fill_height: bool,
    /// Sibling the directional hints refer to
    pub relative_to: Option<WinId>,
    /// Gap kept to the sibling and to the parent's edges when filling
    pub margin: i32,
}

impl LayoutHints {
    pub fn is_empty(&self) -> bool {
        *self == LayoutHints::default()
    }
}

impl WindowTree {
    /// Lay out the children of `id`, then their children, and notify every
    /// child of its resulting geometry
    pub fn layout(&mut self, id: WinId) {
        let Some(parent) = self.get(id).map(|w| w.rect) else {
            return;
        };
        let children = self.children_of(id);

        for &child in &children {
            let Some((hints, rect)) = self.get(child).map(|c| (c.layout, c.rect)) else {
                continue;
            };
            let sibling = hints
                .relative_to
                .and_then(|s| self.get(s))
                .filter(|s| s.parent == Some(id))
                .map(|s| s.rect);
            let placed = position(rect, &hints, sibling, parent);
            if let Some(c) = self.get_mut(child) {
                c.rect = placed;
            }
        }

        for &child in &children {
            let Some((hints, rect)) = self.get(child).map(|c| (c.layout, c.rect)) else {
                continue;
            };
            let filled = fill(rect, &hints, parent);
            if let Some(c) = self.get_mut(child) {
                c.rect = filled;
            }
        }

        for child in children {
            self.notify_size(child);
            if self.get(child).map_or(false, |c| !c.children().is_empty()) {
                self.layout(child);
            }
        }
    }
}

fn position(mut rect: Rect, hints: &LayoutHints, sibling: Option<Rect>, parent: Rect) -> Rect {
    let m = hints.margin;
    if let Some(s) = sibling {
        if hints.left_of {
            rect.x = s.x - rect.w as i32 - m;
        }
        if hints.right_of {
            rect.x = s.right() + m;
        }
        if hints.above {
            rect.y = s.y - rect.h as i32 - m;
        }
        if hints.below {
            rect.y = s.bottom() + m;
        }
    }
    if hints.center_h {
        rect.x = (parent.w as i32 - rect.w as i32) / 2;
    }
    if hints.center_v {
        rect.y = (parent.h as i32 - rect.h as i32) / 2;
    }
    rect
}

fn fill(mut rect: Rect, hints: &LayoutHints, parent: Rect) -> Rect {
    if hints.fill_width {
        rect.w = (parent.w as i32 - rect.x - hints.margin).max(0) as u32;
    }
    if hints.fill_height {
        rect.h = (parent.h as i32 - rect.y - hints.margin).max(0) as u32;
    }
    rect
}
