//! Window/widget composition tree
//!
//! Every on-screen element is a node in one process-wide registry keyed by
//! [`WinId`]. A parent owns its children through an ordered child list
//! (insertion order is both paint order and tab order). The active, hover
//! and tracked children are plain ids, looked up again on every use, so a
//! destroyed node is only ever "not found".

pub mod canvas;
mod keyboard;
mod layout;
mod mouse;
pub mod widget;

pub use canvas::{Canvas, HeapShm, PosixShm, Segment, SharedMemory};
pub use layout::LayoutHints;
pub use widget::{Container, Label, PaintContext, PointerEvent, Widget};

use crate::error::{ClientError, ClientResult};
use crate::pool::{List, Pools, RectList};
use crate::protocol::{Rect, WinId, WindowFlags, WindowKind};
use std::collections::HashMap;
use std::sync::Arc;

/// One node of the composition tree
pub struct Window {
    pub id: WinId,
    pub kind: WindowKind,
    /// Geometry relative to the parent (screen position for server windows)
    pub rect: Rect,
    pub flags: WindowFlags,
    pub parent: Option<WinId>,
    /// Top-level window (or the desktop) this window belongs to
    pub owner: WinId,
    pub title: String,
    pub layout: LayoutHints,
    pub canvas: Option<Canvas>,
    pub active_child: Option<WinId>,
    pub hover_child: Option<WinId>,
    pub tracked_child: Option<WinId>,
    pub last_buttons: crate::protocol::MouseButtons,
    children: Box<List<WinId>>,
    dirty: Box<RectList>,
    widget: Box<dyn Widget>,
}

impl Window {
    pub fn children(&self) -> &[WinId] {
        &self.children.items
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(WindowFlags::VISIBLE)
    }

    pub fn is_focusable(&self) -> bool {
        self.is_visible() && !self.flags.contains(WindowFlags::NO_FOCUS)
    }

    pub fn widget_mut(&mut self) -> &mut dyn Widget {
        self.widget.as_mut()
    }

    /// Pending dirty rectangles, in canvas coordinates
    pub fn dirty(&self) -> &[Rect] {
        self.dirty.rects()
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("rect", &self.rect)
            .field("flags", &self.flags)
            .field("parent", &self.parent)
            .field("children", &self.children.items)
            .finish()
    }
}

/// The process-wide window registry
pub struct WindowTree {
    nodes: HashMap<WinId, Window>,
    pools: Arc<Pools>,
}

impl WindowTree {
    pub fn new(pools: Arc<Pools>) -> Self {
        WindowTree {
            nodes: HashMap::new(),
            pools,
        }
    }

    /// Build an unregistered node, taking its containers from the pools
    pub fn new_window(
        &self,
        id: WinId,
        kind: WindowKind,
        rect: Rect,
        flags: WindowFlags,
        owner: WinId,
        widget: Box<dyn Widget>,
    ) -> Window {
        Window {
            id,
            kind,
            rect,
            flags,
            parent: None,
            owner,
            title: String::new(),
            layout: LayoutHints::default(),
            canvas: None,
            active_child: None,
            hover_child: None,
            tracked_child: None,
            last_buttons: Default::default(),
            children: self.pools.lists.get(),
            dirty: self.pools.rects.get(),
            widget,
        }
    }

    /// Register a root node (top-level, dialog or menu frame)
    pub fn insert(&mut self, window: Window) {
        log::debug!("Registered {:?} {}", window.kind, window.id);
        self.nodes.insert(window.id, window);
    }

    /// Register `window` as the last child of `parent`
    pub fn insert_child(&mut self, parent: WinId, mut window: Window) -> ClientResult<()> {
        let Some(p) = self.nodes.get_mut(&parent) else {
            self.release(window);
            return Err(ClientError::NoSuchWindow(parent));
        };
        p.children.push(window.id);
        window.parent = Some(parent);
        if window.owner.is_root() {
            window.owner = if p.kind.has_canvas() { p.id } else { p.owner };
        }
        self.nodes.insert(window.id, window);
        Ok(())
    }

    /// Unregister `id` and all its descendants. Descendants come first in
    /// the returned list, `id` last. Weak references held by the remaining
    /// tree are cleared.
    pub fn remove_subtree(&mut self, id: WinId) -> Vec<Window> {
        let mut removed = Vec::new();
        if !self.nodes.contains_key(&id) {
            return removed;
        }
        self.collect_post_order(id, &mut removed);

        if let Some(parent) = removed.last().and_then(|w| w.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.remove(&id);
            }
        }
        for node in self.nodes.values_mut() {
            for w in &removed {
                clear_weak(node, w.id);
            }
        }
        removed
    }

    fn collect_post_order(&mut self, id: WinId, out: &mut Vec<Window>) {
        let children = match self.nodes.get(&id) {
            Some(w) => w.children.items.clone(),
            None => return,
        };
        for child in children {
            self.collect_post_order(child, out);
        }
        if let Some(w) = self.nodes.remove(&id) {
            out.push(w);
        }
    }

    /// Hand a removed node's containers back to the pools
    pub fn release(&self, window: Window) {
        let Window {
            children, dirty, ..
        } = window;
        self.pools.lists.put(children);
        self.pools.rects.put(dirty);
    }

    pub fn get(&self, id: WinId) -> Option<&Window> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: WinId) -> Option<&mut Window> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: WinId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every registered node without a parent
    pub fn roots(&self) -> Vec<WinId> {
        self.nodes
            .values()
            .filter(|w| w.parent.is_none())
            .map(|w| w.id)
            .collect()
    }

    /// Copy of the child list of `id`
    pub fn children_of(&self, id: WinId) -> Vec<WinId> {
        self.nodes
            .get(&id)
            .map(|w| w.children.items.clone())
            .unwrap_or_default()
    }

    /// The nearest node at or above `id` that owns a canvas
    pub fn canvas_root(&self, id: WinId) -> Option<WinId> {
        let mut cur = self.nodes.get(&id)?;
        loop {
            if cur.kind.has_canvas() {
                return Some(cur.id);
            }
            cur = self.nodes.get(&cur.parent?)?;
        }
    }

    /// `id`'s rectangle in its canvas root's coordinates
    pub fn canvas_rect(&self, id: WinId) -> Option<Rect> {
        let node = self.nodes.get(&id)?;
        if node.kind.has_canvas() {
            return Some(Rect::new(0, 0, node.rect.w, node.rect.h));
        }
        let parent = self.canvas_rect(node.parent?)?;
        Some(Rect::new(
            parent.x + node.rect.x,
            parent.y + node.rect.y,
            node.rect.w,
            node.rect.h,
        ))
    }

    /// Mark `rect` (local to `id`) for the next flush
    pub fn invalidate(&mut self, id: WinId, local: Rect) {
        let (Some(root), Some(abs)) = (self.canvas_root(id), self.canvas_rect(id)) else {
            return;
        };
        let rect = Rect::new(abs.x + local.x, abs.y + local.y, local.w, local.h);
        if let Some(node) = self.nodes.get_mut(&root) {
            node.dirty.add(rect);
        }
    }

    /// Take the pending dirty rectangles of a canvas root
    pub fn take_dirty(&mut self, id: WinId) -> Vec<Rect> {
        self.nodes
            .get_mut(&id)
            .map(|w| w.dirty.take())
            .unwrap_or_default()
    }

    /// Paint `id` and its visible descendants in list order, then mark the
    /// painted area dirty
    pub fn repaint(&mut self, id: WinId) {
        let Some(root) = self.canvas_root(id) else {
            return;
        };
        let Some(area) = self.canvas_rect(id) else {
            return;
        };
        let mut canvas = self.nodes.get_mut(&root).and_then(|w| w.canvas.take());
        self.paint_node(id, area, &mut canvas);
        if let Some(node) = self.nodes.get_mut(&root) {
            node.canvas = canvas;
            node.dirty.add(area);
        }
    }

    fn paint_node(&mut self, id: WinId, area: Rect, canvas: &mut Option<Canvas>) {
        let children = {
            let Some(node) = self.nodes.get_mut(&id) else {
                return;
            };
            if !node.is_visible() && !node.kind.has_canvas() {
                return;
            }
            let mut ctx = PaintContext {
                canvas: canvas.as_mut(),
                rect: area,
                focused: node.flags.contains(WindowFlags::FOCUSED),
            };
            node.widget.repaint(&mut ctx);
            node.children.items.clone()
        };
        for child in children {
            let Some(rect) = self.nodes.get(&child).map(|w| w.rect) else {
                continue;
            };
            let child_area = Rect::new(area.x + rect.x, area.y + rect.y, rect.w, rect.h);
            self.paint_node(child, child_area, canvas);
        }
    }

    /// Make `child` the active (focused) child of `parent`, unfocusing the
    /// previous one first
    pub fn set_active(&mut self, parent: WinId, child: WinId) {
        let prev = match self.nodes.get(&parent) {
            Some(p) => p.active_child,
            None => return,
        };
        if prev == Some(child) {
            return;
        }
        if let Some(old) = prev.and_then(|old| self.nodes.get_mut(&old)) {
            old.flags.remove(WindowFlags::FOCUSED);
            old.widget.unfocus();
        }
        if let Some(new) = self.nodes.get_mut(&child) {
            new.flags.insert(WindowFlags::FOCUSED);
            new.widget.focus();
        }
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.active_child = Some(child);
        }
    }

    /// Notify `id` of its current geometry
    pub fn notify_size(&mut self, id: WinId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            let rect = node.rect;
            node.widget.size_changed(rect);
        }
    }
}

fn clear_weak(node: &mut Window, gone: WinId) {
    for slot in [
        &mut node.active_child,
        &mut node.hover_child,
        &mut node.tracked_child,
    ] {
        if *slot == Some(gone) {
            *slot = None;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::protocol::{CanvasInfo, KeyPress};
    use std::sync::Mutex;

    /// Widget that records every hook invocation
    pub(crate) struct Recorder {
        pub name: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, event));
        }
    }

    impl Widget for Recorder {
        fn mouse_over(&mut self, ev: &PointerEvent) {
            self.push(format!("over({},{})", ev.x, ev.y));
        }
        fn mouse_down(&mut self, ev: &PointerEvent) {
            self.push(format!("down({},{})", ev.x, ev.y));
        }
        fn mouse_up(&mut self, ev: &PointerEvent) {
            self.push(format!("up({},{})", ev.x, ev.y));
        }
        fn mouse_exit(&mut self) {
            self.push("exit".to_string());
        }
        fn focus(&mut self) {
            self.push("focus".to_string());
        }
        fn unfocus(&mut self) {
            self.push("unfocus".to_string());
        }
        fn key_press(&mut self, key: &KeyPress) -> bool {
            self.push(format!("key({:#x})", key.code));
            key.code == u32::from(b'x')
        }
        fn size_changed(&mut self, rect: Rect) {
            self.push(format!("size({},{},{},{})", rect.x, rect.y, rect.w, rect.h));
        }
    }

    pub(crate) fn tree() -> WindowTree {
        WindowTree::new(Arc::new(Pools::new(&ClientConfig::testing())))
    }

    pub(crate) fn add_top(tree: &mut WindowTree, id: u32, rect: Rect) -> WinId {
        let id = WinId::new(1, id);
        let mut w = tree.new_window(
            id,
            WindowKind::TopLevel,
            rect,
            WindowFlags::VISIBLE,
            WinId::ROOT,
            Box::new(Container),
        );
        let info = CanvasInfo {
            handle: 1,
            size: rect.w * rect.h * 4,
            stride: rect.w * 4,
        };
        w.canvas = Some(Canvas::attach(&HeapShm, &info, rect.w, rect.h).unwrap());
        tree.insert(w);
        id
    }

    pub(crate) fn add_child(
        tree: &mut WindowTree,
        parent: WinId,
        id: u32,
        rect: Rect,
        widget: Box<dyn Widget>,
    ) -> WinId {
        let id = WinId::new(1, id);
        let w = tree.new_window(
            id,
            WindowKind::Widget,
            rect,
            WindowFlags::VISIBLE,
            WinId::ROOT,
            widget,
        );
        tree.insert_child(parent, w).unwrap();
        id
    }

    pub(crate) fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Widget> {
        Box::new(Recorder {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn test_remove_subtree_descendants_first() {
        let mut tree = tree();
        let top = add_top(&mut tree, 1, Rect::new(0, 0, 100, 100));
        let a = add_child(&mut tree, top, 2, Rect::new(0, 0, 50, 50), Box::new(Container));
        let b = add_child(&mut tree, a, 3, Rect::new(0, 0, 10, 10), Box::new(Container));
        let c = add_child(&mut tree, top, 4, Rect::new(50, 0, 50, 50), Box::new(Container));
        tree.get_mut(top).unwrap().hover_child = Some(a);

        let removed = tree.remove_subtree(a);
        let ids: Vec<_> = removed.iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(tree.children_of(top), vec![c]);
        assert_eq!(tree.get(top).unwrap().hover_child, None);
        for w in removed {
            tree.release(w);
        }
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_release_restores_pools() {
        let mut tree = tree();
        let before = tree.pools.available();
        let top = add_top(&mut tree, 1, Rect::new(0, 0, 10, 10));
        add_child(&mut tree, top, 2, Rect::new(0, 0, 5, 5), Box::new(Container));
        for w in tree.remove_subtree(top) {
            tree.release(w);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.pools.available(), before);
        assert_eq!(tree.pools.outstanding().lists, 0);
    }

    #[test]
    fn test_insert_child_under_missing_parent() {
        let mut tree = tree();
        let w = tree.new_window(
            WinId::new(1, 9),
            WindowKind::Widget,
            Rect::new(0, 0, 1, 1),
            WindowFlags::VISIBLE,
            WinId::ROOT,
            Box::new(Container),
        );
        assert!(matches!(
            tree.insert_child(WinId::new(1, 1), w),
            Err(ClientError::NoSuchWindow(_))
        ));
        assert_eq!(tree.pools.outstanding().lists, 0);
    }

    #[test]
    fn test_repaint_paints_children_in_canvas_coordinates() {
        let mut tree = tree();
        let top = add_top(&mut tree, 1, Rect::new(200, 200, 40, 40));
        let panel = add_child(&mut tree, top, 2, Rect::new(10, 10, 20, 20), Box::new(Container));
        add_child(
            &mut tree,
            panel,
            3,
            Rect::new(5, 5, 4, 4),
            Box::new(Label::new("x", 0xffff0000)),
        );
        assert_eq!(tree.canvas_rect(WinId::new(1, 3)), Some(Rect::new(15, 15, 4, 4)));

        tree.repaint(top);
        let canvas = tree.get(top).unwrap().canvas.as_ref().unwrap();
        assert_eq!(canvas.pixel(15, 15), Some(0xffff0000));
        assert_eq!(canvas.pixel(19, 19), Some(0));
        assert_eq!(tree.take_dirty(top), vec![Rect::new(0, 0, 40, 40)]);
    }

    #[test]
    fn test_set_active_unfocuses_previous() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let top = add_top(&mut tree, 1, Rect::new(0, 0, 40, 40));
        let a = add_child(&mut tree, top, 2, Rect::new(0, 0, 10, 10), recorder("a", &log));
        let b = add_child(&mut tree, top, 3, Rect::new(10, 0, 10, 10), recorder("b", &log));
        tree.set_active(top, a);
        tree.set_active(top, a);
        tree.set_active(top, b);
        assert_eq!(*log.lock().unwrap(), vec!["a:focus", "a:unfocus", "b:focus"]);
        assert!(tree.get(b).unwrap().flags.contains(WindowFlags::FOCUSED));
        assert!(!tree.get(a).unwrap().flags.contains(WindowFlags::FOCUSED));
    }
}
