//! Menus
//!
//! A menu bar is a tree of [`MenuItem`]s owned by one top-level window. It
//! is separate from the window tree: only the levels currently displayed
//! have a popup window ("menu frame"), created on first display and cached
//! on the item afterwards. Navigation lives in [`state`].

mod state;

pub use state::{MenuHost, MenuOutcome};

use crate::error::{ClientError, ClientResult};
use crate::protocol::types::define_flags;
use crate::protocol::{KeyModifiers, KeyPress, WinId};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};
use std::sync::Arc;

pub const MENU_BACKGROUND: u32 = 0xffe8_e8e8;
pub const MENU_HIGHLIGHT: u32 = 0xff30_60c0;
pub const MENU_DIVIDER: u32 = 0xff90_9090;
pub const MENU_CHECK: u32 = 0xff20_2020;
pub const BAR_BACKGROUND: u32 = 0xffd4_d4d4;

/// Fixed-cell menu geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuMetrics {
    pub glyph_width: u32,
    pub row_height: u32,
    pub divider_height: u32,
    /// Horizontal padding on each side of a row or bar entry
    pub padding: u32,
    /// Space between a title and its shortcut label
    pub shortcut_gap: u32,
}

impl Default for MenuMetrics {
    fn default() -> Self {
        MenuMetrics {
            glyph_width: 8,
            row_height: 20,
            divider_height: 6,
            padding: 16,
            shortcut_gap: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItemKind {
    Plain,
    /// Opens a nested level
    Submenu,
    /// Toggles its own check mark
    Checkable,
    /// One of a group of siblings of which at most one is checked
    Toggleable,
}

define_flags!(
    /// Menu item state
    MenuFlags {
        DISABLED = 1 << 0,
        CHECKED = 1 << 1,
        HIGHLIGHTED = 1 << 2,
        DIVIDER = 1 << 3,
    }
);

/// What a selection resolves to: the top-level menu and the chosen item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuSelection {
    pub menu_id: u8,
    pub item_id: u8,
}

pub type MenuHandler = Arc<dyn Fn(WinId, MenuSelection) + Send + Sync>;

/// A key combination bound to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuShortcut {
    pub key: KeyPress,
    pub item: u8,
}

/// A resolved selection waiting to be handed to its handler. Built while
/// the menu is borrowed, fired after it has been put back.
pub struct Activation {
    pub owner: WinId,
    pub selection: MenuSelection,
    handler: Option<MenuHandler>,
}

impl Activation {
    /// Run the handler. Returns false when no item on the path had one.
    pub fn fire(self) -> bool {
        match self.handler {
            Some(handler) => {
                handler(self.owner, self.selection);
                true
            }
            None => {
                log::debug!(
                    "No handler for menu {} item {}",
                    self.selection.menu_id,
                    self.selection.item_id
                );
                false
            }
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("owner", &self.owner)
            .field("selection", &self.selection)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

pub struct MenuItem {
    pub id: u8,
    /// Title with the accelerator marker removed
    pub title: String,
    /// Lowercase accelerator character
    pub accel: Option<char>,
    pub kind: MenuItemKind,
    pub flags: MenuFlags,
    /// Resource id of the icon
    pub icon: Option<u32>,
    pub shortcut: Option<KeyPress>,
    pub children: Vec<MenuItem>,
    /// Cached popup showing `children`
    pub frame: Option<WinId>,
    handler: Option<MenuHandler>,
}

impl MenuItem {
    fn new(id: u8, raw_title: &str, kind: MenuItemKind) -> Self {
        let (title, accel) = parse_title(raw_title);
        MenuItem {
            id,
            title,
            accel,
            kind,
            flags: MenuFlags::NONE,
            icon: None,
            shortcut: None,
            children: Vec::new(),
            frame: None,
            handler: None,
        }
    }

    pub fn is_divider(&self) -> bool {
        self.flags.contains(MenuFlags::DIVIDER)
    }

    pub fn is_disabled(&self) -> bool {
        self.flags.contains(MenuFlags::DISABLED)
    }

    pub fn is_checked(&self) -> bool {
        self.flags.contains(MenuFlags::CHECKED)
    }

    /// Neither a divider nor disabled
    pub fn is_selectable(&self) -> bool {
        !self.is_divider() && !self.is_disabled()
    }

    pub fn has_submenu(&self) -> bool {
        self.kind == MenuItemKind::Submenu && !self.children.is_empty()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// "Ctrl+Shift+S" style label of the shortcut
    pub fn shortcut_label(&self) -> Option<String> {
        self.shortcut.map(|key| shortcut_label(&key))
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("children", &self.children)
            .finish()
    }
}

/// Split `&` accelerator markers out of a title. `&&` is a literal `&`.
pub fn parse_title(raw: &str) -> (String, Option<char>) {
    let mut title = String::with_capacity(raw.len());
    let mut accel = None;
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '&' {
            title.push(c);
            continue;
        }
        match chars.next() {
            Some('&') => title.push('&'),
            Some(next) => {
                if accel.is_none() {
                    accel = Some(next.to_ascii_lowercase());
                }
                title.push(next);
            }
            None => {}
        }
    }
    (title, accel)
}

fn shortcut_label(key: &KeyPress) -> String {
    use crate::protocol::keys::*;
    let mut label = String::new();
    for (flag, name) in [
        (KeyModifiers::CTRL, "Ctrl+"),
        (KeyModifiers::ALT, "Alt+"),
        (KeyModifiers::SHIFT, "Shift+"),
        (KeyModifiers::SUPER, "Super+"),
    ] {
        if key.modifiers.contains(flag) {
            label.push_str(name);
        }
    }
    match key.code {
        KEY_ENTER => label.push_str("Enter"),
        KEY_ESC => label.push_str("Esc"),
        KEY_TAB => label.push_str("Tab"),
        KEY_SPACE => label.push_str("Space"),
        KEY_BACKSPACE => label.push_str("Backspace"),
        KEY_F10 => label.push_str("F10"),
        code => match char::from_u32(code) {
            Some(c) if c.is_ascii_graphic() => label.push(c.to_ascii_uppercase()),
            _ => label.push_str(&format!("{:#x}", code)),
        },
    }
    label
}

pub(crate) fn item_at<'a>(items: &'a [MenuItem], path: &[usize]) -> Option<&'a MenuItem> {
    let (first, rest) = path.split_first()?;
    let mut item = items.get(*first)?;
    for &i in rest {
        item = item.children.get(i)?;
    }
    Some(item)
}

pub(crate) fn item_at_mut<'a>(items: &'a mut [MenuItem], path: &[usize]) -> Option<&'a mut MenuItem> {
    let (first, rest) = path.split_first()?;
    let mut item = items.get_mut(*first)?;
    for &i in rest {
        item = item.children.get_mut(i)?;
    }
    Some(item)
}

fn find_path(items: &[MenuItem], id: u8, path: &mut Vec<usize>) -> bool {
    for (i, item) in items.iter().enumerate() {
        path.push(i);
        if item.id == id || find_path(&item.children, id, path) {
            return true;
        }
        path.pop();
    }
    false
}

fn collect_frames(items: &[MenuItem], out: &mut Vec<WinId>) {
    for item in items {
        if let Some(frame) = item.frame {
            out.push(frame);
        }
        collect_frames(&item.children, out);
    }
}

/// The menu tree of one top-level window
pub struct MenuBar {
    owner: WinId,
    items: Vec<MenuItem>,
    shortcuts: Vec<MenuShortcut>,
    metrics: MenuMetrics,
    next_id: u8,
    open: Option<state::OpenMenu>,
    generation: u64,
}

impl MenuBar {
    pub fn new(owner: WinId) -> Self {
        MenuBar::with_metrics(owner, MenuMetrics::default())
    }

    pub fn with_metrics(owner: WinId, metrics: MenuMetrics) -> Self {
        MenuBar {
            owner,
            items: Vec::new(),
            shortcuts: Vec::new(),
            metrics,
            next_id: 1,
            open: None,
            generation: 0,
        }
    }

    pub fn owner(&self) -> WinId {
        self.owner
    }

    pub fn metrics(&self) -> &MenuMetrics {
        &self.metrics
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Ids come from an 8-bit counter. Running out is an error, never a
    /// silent wrap onto ids already in use.
    fn alloc_id(&mut self) -> ClientResult<u8> {
        if self.next_id == 0 {
            log::error!("Menu ids exhausted for {}", self.owner);
            return Err(ClientError::MenuIdsExhausted);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    /// Append a top-level menu. Returns its id.
    pub fn add_menu(&mut self, title: &str) -> ClientResult<u8> {
        let id = self.alloc_id()?;
        self.items.push(MenuItem::new(id, title, MenuItemKind::Submenu));
        Ok(id)
    }

    /// Append an item to the submenu of `parent`. Returns its id.
    pub fn add_item(&mut self, parent: u8, title: &str, kind: MenuItemKind) -> ClientResult<u8> {
        self.add_child(parent, MenuItem::new(0, title, kind))
    }

    pub fn add_divider(&mut self, parent: u8) -> ClientResult<u8> {
        let mut divider = MenuItem::new(0, "", MenuItemKind::Plain);
        divider.flags.insert(MenuFlags::DIVIDER);
        self.add_child(parent, divider)
    }

    fn add_child(&mut self, parent: u8, mut item: MenuItem) -> ClientResult<u8> {
        let path = self
            .path_of(parent)
            .ok_or(ClientError::NoSuchMenuItem(parent))?;
        item.id = self.alloc_id()?;
        let id = item.id;
        if let Some(p) = item_at_mut(&mut self.items, &path) {
            if p.kind == MenuItemKind::Plain {
                p.kind = MenuItemKind::Submenu;
            }
            p.children.push(item);
        }
        Ok(id)
    }

    pub fn item(&self, id: u8) -> Option<&MenuItem> {
        let path = self.path_of(id)?;
        item_at(&self.items, &path)
    }

    pub fn item_mut(&mut self, id: u8) -> Option<&mut MenuItem> {
        let path = self.path_of(id)?;
        item_at_mut(&mut self.items, &path)
    }

    pub fn set_handler<F>(&mut self, id: u8, handler: F) -> bool
    where
        F: Fn(WinId, MenuSelection) + Send + Sync + 'static,
    {
        match self.item_mut(id) {
            Some(item) => {
                item.handler = Some(Arc::new(handler));
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, id: u8, enabled: bool) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.flags.set(MenuFlags::DISABLED, !enabled);
                true
            }
            None => false,
        }
    }

    pub fn set_checked(&mut self, id: u8, checked: bool) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.flags.set(MenuFlags::CHECKED, checked);
                true
            }
            None => false,
        }
    }

    pub fn set_icon(&mut self, id: u8, resource: Option<u32>) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.icon = resource;
                true
            }
            None => false,
        }
    }

    /// Bind `key` to item `id`, replacing an earlier binding of the same key
    pub fn set_shortcut(&mut self, id: u8, key: KeyPress) -> bool {
        let Some(item) = self.item_mut(id) else {
            return false;
        };
        item.shortcut = Some(key);
        self.shortcuts.retain(|s| s.key != key);
        self.shortcuts.push(MenuShortcut { key, item: id });
        true
    }

    pub fn shortcuts(&self) -> &[MenuShortcut] {
        &self.shortcuts
    }

    /// Item bound to exactly this key and modifier combination
    pub fn shortcut_for(&self, key: &KeyPress) -> Option<u8> {
        let code = key
            .as_char()
            .map(|c| c as u32)
            .unwrap_or(key.code);
        self.shortcuts
            .iter()
            .find(|s| s.key.modifiers == key.modifiers && (s.key.code == key.code || s.key.code == code))
            .map(|s| s.item)
    }

    /// Index path of item `id`, found by walking the tree from the root list
    pub fn path_of(&self, id: u8) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        if find_path(&self.items, id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// Every frame created for this menu so far
    pub fn frame_ids(&self) -> Vec<WinId> {
        let mut out = Vec::new();
        collect_frames(&self.items, &mut out);
        out
    }
}

impl fmt::Debug for MenuBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuBar")
            .field("owner", &self.owner)
            .field("items", &self.items)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Menu bars by owning window, plus the reverse map from frames to owners.
///
/// A bar taken out with [`MenuRegistry::take`] stays registered by its
/// generation. Removing or replacing it while it is out retires that
/// generation, and [`MenuRegistry::put`] hands the stale bar back instead
/// of reinstalling it.
#[derive(Debug, Default)]
pub struct MenuRegistry {
    bars: HashMap<WinId, MenuBar>,
    frames: HashMap<WinId, WinId>,
    live: HashMap<WinId, u64>,
    next_generation: u64,
}

impl MenuRegistry {
    pub fn new() -> Self {
        MenuRegistry::default()
    }

    /// Install a bar, returning the one it replaces if it was not out
    pub fn insert(&mut self, mut bar: MenuBar) -> Option<MenuBar> {
        let owner = bar.owner();
        let old = self.remove(owner);
        self.next_generation += 1;
        bar.generation = self.next_generation;
        self.live.insert(owner, bar.generation);
        self.attach(bar);
        old
    }

    /// Take a bar out to operate on it without holding the registry
    pub fn take(&mut self, owner: WinId) -> Option<MenuBar> {
        self.bars.remove(&owner)
    }

    /// Put a bar back after [`MenuRegistry::take`], refreshing its frames.
    /// A bar removed or replaced while it was out comes back as `Some`.
    pub fn put(&mut self, bar: MenuBar) -> Option<MenuBar> {
        if self.live.get(&bar.owner()) != Some(&bar.generation) {
            log::debug!("Discarding retired menu bar of {}", bar.owner());
            return Some(bar);
        }
        self.attach(bar);
        None
    }

    fn attach(&mut self, bar: MenuBar) {
        let owner = bar.owner();
        for frame in bar.frame_ids() {
            self.frames.insert(frame, owner);
        }
        self.bars.insert(owner, bar);
    }

    /// Remove a bar and its frame entries for good. A bar that is out is
    /// retired and returned by its [`MenuRegistry::put`].
    pub fn remove(&mut self, owner: WinId) -> Option<MenuBar> {
        self.frames.retain(|_, o| *o != owner);
        self.live.remove(&owner);
        self.bars.remove(&owner)
    }

    pub fn get(&self, owner: WinId) -> Option<&MenuBar> {
        self.bars.get(&owner)
    }

    pub fn contains(&self, owner: WinId) -> bool {
        self.bars.contains_key(&owner)
    }

    pub fn owner_of_frame(&self, frame: WinId) -> Option<WinId> {
        self.frames.get(&frame).copied()
    }

    pub fn owners(&self) -> Vec<WinId> {
        self.bars.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
