//! Menu navigation state machine
//!
//! A closed menu has no open levels. Opening a top-level item shows its
//! frame with nothing highlighted; UP/DOWN or the pointer then highlight a
//! row. Keyboard and pointer paths both end in [`MenuBar::select`]'s
//! internals, so either way the same item resolves to the same handler.

use super::{
    item_at, item_at_mut, Activation, MenuBar, MenuFlags, MenuItem, MenuItemKind, MenuMetrics,
    MenuSelection, BAR_BACKGROUND, MENU_BACKGROUND, MENU_CHECK, MENU_DIVIDER, MENU_HIGHLIGHT,
};
use crate::error::ClientResult;
use crate::protocol::keys::*;
use crate::protocol::{KeyModifiers, KeyPress, Rect, WinId};

/// Window operations the menu needs from its owner
pub trait MenuHost {
    /// Display the frame of one menu level at `rect`, relative to the owner
    /// window. `cached` is the frame shown for this level before, if any.
    fn show_frame(&mut self, owner: WinId, cached: Option<WinId>, rect: Rect) -> ClientResult<WinId>;

    fn hide_frame(&mut self, frame: WinId);

    /// Fill rectangles on a window's canvas
    fn paint(&mut self, window: WinId, fills: &[(Rect, u32)]);
}

/// Result of feeding an input event to a menu
#[derive(Debug)]
pub enum MenuOutcome {
    /// Not for the menu; dispatch it normally
    Ignored,
    /// Consumed
    Handled,
    /// An item was chosen and the menu closed
    Selected(Activation),
}

impl MenuOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, MenuOutcome::Ignored)
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, MenuOutcome::Handled)
    }
}

/// One displayed level: the item whose children it shows, and its frame
#[derive(Debug, Clone)]
pub(super) struct Level {
    path: Vec<usize>,
    frame: WinId,
    /// Relative to the owner window
    rect: Rect,
    highlighted: Option<usize>,
}

#[derive(Debug, Clone)]
pub(super) struct OpenMenu {
    top: usize,
    levels: Vec<Level>,
}

fn child_path(path: &[usize], i: usize) -> Vec<usize> {
    let mut p = path.to_vec();
    p.push(i);
    p
}

fn row_height(m: &MenuMetrics, item: &MenuItem) -> u32 {
    if item.is_divider() {
        m.divider_height
    } else {
        m.row_height
    }
}

fn row_top(m: &MenuMetrics, items: &[MenuItem], idx: usize) -> i32 {
    items.iter().take(idx).map(|i| row_height(m, i) as i32).sum()
}

fn row_at(m: &MenuMetrics, items: &[MenuItem], y: i32) -> Option<usize> {
    if y < 0 {
        return None;
    }
    let mut top = 0;
    for (i, item) in items.iter().enumerate() {
        let bottom = top + row_height(m, item) as i32;
        if y < bottom {
            return Some(i);
        }
        top = bottom;
    }
    None
}

fn text_width(m: &MenuMetrics, text: &str) -> u32 {
    text.chars().count() as u32 * m.glyph_width
}

/// Frame size fitting the longest title plus shortcut label
fn frame_size(m: &MenuMetrics, items: &[MenuItem]) -> (u32, u32) {
    let content = items
        .iter()
        .filter(|i| !i.is_divider())
        .map(|i| {
            let mut w = text_width(m, &i.title);
            if let Some(label) = i.shortcut_label() {
                w += m.shortcut_gap + text_width(m, &label);
            }
            if i.has_submenu() {
                w += m.glyph_width * 2;
            }
            w
        })
        .max()
        .unwrap_or(0);
    let height: u32 = items.iter().map(|i| row_height(m, i)).sum();
    (content + m.padding * 2, height.max(m.divider_height))
}

fn bar_entry_width(m: &MenuMetrics, item: &MenuItem) -> u32 {
    text_width(m, &item.title) + m.padding * 2
}

fn bar_entry_rect(m: &MenuMetrics, items: &[MenuItem], idx: usize) -> Option<Rect> {
    let item = items.get(idx)?;
    let x: u32 = items.iter().take(idx).map(|i| bar_entry_width(m, i)).sum();
    Some(Rect::new(x as i32, 0, bar_entry_width(m, item), m.row_height))
}

fn bar_item_at(m: &MenuMetrics, items: &[MenuItem], x: i32, y: i32) -> Option<usize> {
    if y < 0 || y >= m.row_height as i32 || x < 0 {
        return None;
    }
    let mut left = 0;
    for (i, item) in items.iter().enumerate() {
        let right = left + bar_entry_width(m, item) as i32;
        if x < right {
            return Some(i);
        }
        left = right;
    }
    None
}

impl MenuBar {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Id of the top-level menu currently shown
    pub fn open_menu(&self) -> Option<u8> {
        self.open
            .as_ref()
            .and_then(|o| self.items.get(o.top))
            .map(|i| i.id)
    }

    /// Number of displayed levels
    pub fn depth(&self) -> usize {
        self.open.as_ref().map_or(0, |o| o.levels.len())
    }

    /// Highlighted item of the deepest displayed level
    pub fn highlighted(&self) -> Option<u8> {
        let level = self.open.as_ref()?.levels.last()?;
        let path = child_path(&level.path, level.highlighted?);
        item_at(&self.items, &path).map(|i| i.id)
    }

    /// Frames currently displayed, outermost first
    pub fn displayed_frames(&self) -> Vec<WinId> {
        self.open
            .as_ref()
            .map(|o| o.levels.iter().map(|l| l.frame).collect())
            .unwrap_or_default()
    }

    /// The bar strip across the top of the owner window
    pub fn bar_rect(&self) -> Rect {
        let m = &self.metrics;
        let width: u32 = self.items.iter().map(|i| bar_entry_width(m, i)).sum();
        Rect::new(0, 0, width, m.row_height)
    }

    /// Bar entry of top-level menu `id`, in owner coordinates
    pub fn bar_entry(&self, id: u8) -> Option<Rect> {
        let idx = self.items.iter().position(|i| i.id == id)?;
        bar_entry_rect(&self.metrics, &self.items, idx)
    }

    /// Frame and frame-local row of a displayed item
    pub fn row_rect(&self, id: u8) -> Option<(WinId, Rect)> {
        let path = self.path_of(id)?;
        let (last, parent) = path.split_last()?;
        let level = self
            .open
            .as_ref()?
            .levels
            .iter()
            .find(|l| l.path.as_slice() == parent)?;
        let siblings = &item_at(&self.items, parent)?.children;
        let top = row_top(&self.metrics, siblings, *last);
        let h = row_height(&self.metrics, siblings.get(*last)?);
        Some((level.frame, Rect::new(0, top, level.rect.w, h)))
    }

    fn level(&self, k: usize) -> Option<&Level> {
        self.open.as_ref()?.levels.get(k)
    }

    fn show_level(&mut self, path: Vec<usize>, rect: Rect, host: &mut dyn MenuHost) -> Option<Level> {
        let cached = item_at(&self.items, &path)?.frame;
        match host.show_frame(self.owner, cached, rect) {
            Ok(frame) => {
                if let Some(item) = item_at_mut(&mut self.items, &path) {
                    item.frame = Some(frame);
                }
                let level = Level {
                    path,
                    frame,
                    rect,
                    highlighted: None,
                };
                self.paint_level(&level, host);
                Some(level)
            }
            Err(e) => {
                log::warn!("Cannot show menu frame for {}: {}", self.owner, e);
                None
            }
        }
    }

    fn paint_level(&self, level: &Level, host: &mut dyn MenuHost) {
        let Some(item) = item_at(&self.items, &level.path) else {
            return;
        };
        let m = &self.metrics;
        let w = level.rect.w;
        let mut fills = vec![(Rect::new(0, 0, w, level.rect.h), MENU_BACKGROUND)];
        let mut y = 0;
        for (i, child) in item.children.iter().enumerate() {
            let h = row_height(m, child);
            if child.is_divider() {
                let inset = (m.padding / 2) as i32;
                fills.push((
                    Rect::new(inset, y + h as i32 / 2, w.saturating_sub(m.padding), 1),
                    MENU_DIVIDER,
                ));
            } else {
                if level.highlighted == Some(i) {
                    fills.push((Rect::new(0, y, w, h), MENU_HIGHLIGHT));
                }
                if child.is_checked() {
                    fills.push((Rect::new(4, y + (h as i32 - 8) / 2, 8, 8), MENU_CHECK));
                }
            }
            y += h as i32;
        }
        host.paint(level.frame, &fills);
    }

    /// Redraw the bar strip on the owner's canvas
    pub fn paint_bar(&self, host: &mut dyn MenuHost) {
        let mut fills = vec![(self.bar_rect(), BAR_BACKGROUND)];
        if let Some(open) = &self.open {
            if let Some(entry) = bar_entry_rect(&self.metrics, &self.items, open.top) {
                fills.push((entry, MENU_HIGHLIGHT));
            }
        }
        host.paint(self.owner, &fills);
    }

    fn set_item_flag(&mut self, path: &[usize], flag: MenuFlags, on: bool) {
        if let Some(item) = item_at_mut(&mut self.items, path) {
            item.flags.set(flag, on);
        }
    }

    /// Show top-level item `top`, closing whatever was open
    fn open_top(&mut self, top: usize, host: &mut dyn MenuHost) -> bool {
        self.close(host);
        let m = self.metrics;
        let Some(item) = self.items.get(top) else {
            return false;
        };
        if !item.is_selectable() {
            return false;
        }
        let Some(entry) = bar_entry_rect(&m, &self.items, top) else {
            return false;
        };
        let (w, h) = frame_size(&m, &item.children);
        let rect = Rect::new(entry.x, entry.bottom(), w, h);
        match self.show_level(vec![top], rect, host) {
            Some(level) => {
                log::debug!("Opened menu {} of {}", top, self.owner);
                self.open = Some(OpenMenu {
                    top,
                    levels: vec![level],
                });
                self.paint_bar(host);
                true
            }
            None => false,
        }
    }

    /// Close every displayed level, deepest first
    pub fn close(&mut self, host: &mut dyn MenuHost) {
        let Some(open) = self.open.take() else {
            return;
        };
        for level in open.levels.iter().rev() {
            if let Some(i) = level.highlighted {
                self.set_item_flag(&child_path(&level.path, i), MenuFlags::HIGHLIGHTED, false);
            }
            host.hide_frame(level.frame);
        }
        self.paint_bar(host);
        log::debug!("Closed menu of {}", self.owner);
    }

    /// Close levels deeper than `depth`
    fn truncate(&mut self, depth: usize, host: &mut dyn MenuHost) {
        let removed = match self.open.as_mut() {
            Some(open) if open.levels.len() > depth => open.levels.split_off(depth),
            _ => return,
        };
        for level in removed.iter().rev() {
            if let Some(i) = level.highlighted {
                self.set_item_flag(&child_path(&level.path, i), MenuFlags::HIGHLIGHTED, false);
            }
            host.hide_frame(level.frame);
        }
    }

    fn set_highlight(&mut self, k: usize, idx: Option<usize>, host: &mut dyn MenuHost) {
        let Some(level) = self.open.as_mut().and_then(|o| o.levels.get_mut(k)) else {
            return;
        };
        let old = level.highlighted;
        if old == idx {
            return;
        }
        level.highlighted = idx;
        let level = level.clone();
        if let Some(i) = old {
            self.set_item_flag(&child_path(&level.path, i), MenuFlags::HIGHLIGHTED, false);
        }
        if let Some(i) = idx {
            self.set_item_flag(&child_path(&level.path, i), MenuFlags::HIGHLIGHTED, true);
        }
        self.paint_level(&level, host);
    }

    /// Open the submenu of the highlighted item of level `k`
    fn push_level(&mut self, k: usize, host: &mut dyn MenuHost) -> bool {
        self.truncate(k + 1, host);
        let Some(level) = self.level(k).cloned() else {
            return false;
        };
        let Some(i) = level.highlighted else {
            return false;
        };
        let path = child_path(&level.path, i);
        let m = self.metrics;
        let Some(item) = item_at(&self.items, &path) else {
            return false;
        };
        if !item.has_submenu() || !item.is_selectable() {
            return false;
        }
        let (w, h) = frame_size(&m, &item.children);
        let top = item_at(&self.items, &level.path)
            .map(|p| row_top(&m, &p.children, i))
            .unwrap_or(0);
        let rect = Rect::new(level.rect.right(), level.rect.y + top, w, h);
        match self.show_level(path, rect, host) {
            Some(new) => {
                if let Some(open) = self.open.as_mut() {
                    open.levels.push(new);
                }
                true
            }
            None => false,
        }
    }

    fn move_highlight(&mut self, down: bool, host: &mut dyn MenuHost) {
        let Some(k) = self.depth().checked_sub(1) else {
            return;
        };
        let Some(level) = self.level(k) else {
            return;
        };
        let count = item_at(&self.items, &level.path).map_or(0, |i| i.children.len());
        if count == 0 {
            return;
        }
        let next = match (level.highlighted, down) {
            (None, true) => 0,
            (None, false) => count - 1,
            (Some(i), true) => (i + 1) % count,
            (Some(i), false) => (i + count - 1) % count,
        };
        self.set_highlight(k, Some(next), host);
    }

    /// Switch to the next openable top-level menu in either direction
    fn cycle(&mut self, forward: bool, host: &mut dyn MenuHost) {
        let Some(cur) = self.open.as_ref().map(|o| o.top) else {
            return;
        };
        let n = self.items.len();
        for step in 1..n {
            let idx = if forward {
                (cur + step) % n
            } else {
                (cur + n - step) % n
            };
            let item = &self.items[idx];
            if item.is_selectable() && !item.children.is_empty() {
                self.open_top(idx, host);
                return;
            }
        }
    }

    /// Act on row `i` of level `k` as ENTER or a click would
    fn activate(&mut self, k: usize, i: usize, host: &mut dyn MenuHost) -> MenuOutcome {
        let Some(level) = self.level(k) else {
            return MenuOutcome::Handled;
        };
        let path = child_path(&level.path, i);
        let Some(item) = item_at(&self.items, &path) else {
            return MenuOutcome::Handled;
        };
        if !item.is_selectable() {
            log::trace!("Ignoring activation of inert menu row {}", item.id);
            return MenuOutcome::Handled;
        }
        if item.has_submenu() {
            self.set_highlight(k, Some(i), host);
            self.push_level(k, host);
            return MenuOutcome::Handled;
        }
        match self.select_path(&path, host) {
            Some(activation) => MenuOutcome::Selected(activation),
            None => MenuOutcome::Handled,
        }
    }

    fn activate_top(&mut self, top: usize, host: &mut dyn MenuHost) -> MenuOutcome {
        let Some(item) = self.items.get(top) else {
            return MenuOutcome::Ignored;
        };
        if !item.is_selectable() {
            return MenuOutcome::Handled;
        }
        if item.children.is_empty() {
            return match self.select_path(&[top], host) {
                Some(activation) => MenuOutcome::Selected(activation),
                None => MenuOutcome::Handled,
            };
        }
        self.open_top(top, host);
        MenuOutcome::Handled
    }

    /// Choose item `id`: update its check state, close the menu and
    /// resolve the handler. Dividers, disabled items and submenus are never
    /// selected.
    pub fn select(&mut self, id: u8, host: &mut dyn MenuHost) -> Option<Activation> {
        let path = self.path_of(id)?;
        self.select_path(&path, host)
    }

    fn select_path(&mut self, path: &[usize], host: &mut dyn MenuHost) -> Option<Activation> {
        let item = item_at(&self.items, path)?;
        if !item.is_selectable() || item.has_submenu() {
            return None;
        }
        let item_id = item.id;
        let kind = item.kind;
        let checked = item.is_checked();
        match kind {
            MenuItemKind::Checkable => {
                self.set_item_flag(path, MenuFlags::CHECKED, !checked);
            }
            MenuItemKind::Toggleable => {
                let (last, parent) = path.split_last()?;
                let siblings = if parent.is_empty() {
                    &mut self.items[..]
                } else {
                    &mut item_at_mut(&mut self.items, parent)?.children[..]
                };
                for s in siblings.iter_mut().filter(|s| s.kind == MenuItemKind::Toggleable) {
                    s.flags.remove(MenuFlags::CHECKED);
                }
                if let Some(s) = siblings.get_mut(*last) {
                    s.flags.insert(MenuFlags::CHECKED);
                }
            }
            MenuItemKind::Plain | MenuItemKind::Submenu => {}
        }

        let menu_id = self.items.get(*path.first()?)?.id;
        let handler = (1..=path.len())
            .rev()
            .find_map(|n| item_at(&self.items, &path[..n]).and_then(|i| i.handler.clone()));
        self.close(host);
        log::debug!("Selected menu {} item {} of {}", menu_id, item_id, self.owner);
        Some(Activation {
            owner: self.owner,
            selection: MenuSelection { menu_id, item_id },
            handler,
        })
    }

    fn top_for_accel(&self, c: char) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.accel == Some(c) && i.is_selectable())
    }

    fn child_for_accel(&self, k: usize, c: char) -> Option<usize> {
        let level = self.level(k)?;
        item_at(&self.items, &level.path)?
            .children
            .iter()
            .position(|i| i.accel == Some(c) && i.is_selectable())
    }

    /// Keyboard input while the owner has focus
    pub fn key_press(&mut self, key: &KeyPress, host: &mut dyn MenuHost) -> MenuOutcome {
        let alt = key.modifiers.contains(KeyModifiers::ALT);
        let depth = self.depth();
        if depth == 0 {
            if alt {
                if let Some(top) = key.as_char().and_then(|c| self.top_for_accel(c)) {
                    return self.activate_top(top, host);
                }
            }
            if key.code == KEY_F10 && key.modifiers.is_empty() {
                let first = self
                    .items
                    .iter()
                    .position(|i| i.is_selectable() && !i.children.is_empty());
                if let Some(top) = first {
                    self.open_top(top, host);
                    return MenuOutcome::Handled;
                }
            }
            return MenuOutcome::Ignored;
        }

        let k = depth - 1;
        match key.code {
            KEY_ESC => self.close(host),
            KEY_LEFT if depth > 1 => self.truncate(k, host),
            KEY_LEFT => self.cycle(false, host),
            KEY_RIGHT => {
                if !self.push_level(k, host) {
                    self.cycle(true, host);
                }
            }
            KEY_UP => self.move_highlight(false, host),
            KEY_DOWN => self.move_highlight(true, host),
            KEY_ENTER => {
                return match self.level(k).and_then(|l| l.highlighted) {
                    Some(i) => self.activate(k, i, host),
                    None => MenuOutcome::Handled,
                };
            }
            _ => {
                if let Some(c) = key.as_char() {
                    if alt {
                        if let Some(top) = self.top_for_accel(c) {
                            return self.activate_top(top, host);
                        }
                    } else if let Some(i) = self.child_for_accel(k, c) {
                        self.set_highlight(k, Some(i), host);
                        return self.activate(k, i, host);
                    }
                }
            }
        }
        MenuOutcome::Handled
    }

    /// Pointer sample over the owner window, in owner coordinates
    pub fn bar_mouse(&mut self, x: i32, y: i32, pressed: bool, host: &mut dyn MenuHost) -> MenuOutcome {
        let open_top = self.open.as_ref().map(|o| o.top);
        match bar_item_at(&self.metrics, &self.items, x, y) {
            None => {
                if pressed && open_top.is_some() {
                    self.close(host);
                }
                if self.bar_rect().contains(x, y) {
                    MenuOutcome::Handled
                } else {
                    MenuOutcome::Ignored
                }
            }
            Some(i) if pressed => {
                if open_top == Some(i) {
                    self.close(host);
                    MenuOutcome::Handled
                } else {
                    self.activate_top(i, host)
                }
            }
            Some(i) => {
                if open_top.is_some() && open_top != Some(i) && !self.items[i].children.is_empty() {
                    self.open_top(i, host);
                }
                MenuOutcome::Handled
            }
        }
    }

    /// Pointer sample over one of this menu's frames, in frame coordinates
    pub fn frame_mouse(
        &mut self,
        frame: WinId,
        x: i32,
        y: i32,
        pressed: bool,
        host: &mut dyn MenuHost,
    ) -> MenuOutcome {
        let Some(k) = self
            .open
            .as_ref()
            .and_then(|o| o.levels.iter().position(|l| l.frame == frame))
        else {
            return MenuOutcome::Ignored;
        };
        let Some(level) = self.level(k).cloned() else {
            return MenuOutcome::Ignored;
        };
        if x < 0 || x >= level.rect.w as i32 {
            return MenuOutcome::Handled;
        }
        let row = item_at(&self.items, &level.path).and_then(|p| row_at(&self.metrics, &p.children, y));
        let Some(i) = row else {
            return MenuOutcome::Handled;
        };
        if pressed {
            return self.activate(k, i, host);
        }
        if level.highlighted != Some(i) {
            self.truncate(k + 1, host);
            self.set_highlight(k, Some(i), host);
            self.push_level(k, host);
        }
        MenuOutcome::Handled
    }

    /// Input focus moved to `focus`. Anything but the owner or one of the
    /// displayed frames closes the menu.
    pub fn focus_changed(&mut self, focus: WinId, host: &mut dyn MenuHost) {
        let Some(open) = &self.open else {
            return;
        };
        if focus == self.owner || open.levels.iter().any(|l| l.frame == focus) {
            return;
        }
        self.close(host);
    }
}
