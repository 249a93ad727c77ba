//! Mouse dispatch
//!
//! Hit-testing walks the child list of a window in order, recursing into the
//! first visible child that contains the point. A button press establishes
//! a capture: until every button is released, samples go to the captured
//! child no matter where the pointer is.

use super::{PointerEvent, WindowTree};
use crate::protocol::{MouseButtons, WinId};

/// Button edges of one pointer sample
#[derive(Debug, Clone, Copy)]
struct Edges {
    buttons: MouseButtons,
    pressed: MouseButtons,
    released: MouseButtons,
}

impl WindowTree {
    /// Deliver a pointer sample at window-local `(x, y)` to `id` or the
    /// descendant under the pointer. Returns the node whose own hook ran,
    /// or `None` when `id` is unknown.
    pub fn dispatch_mouse(
        &mut self,
        id: WinId,
        x: i32,
        y: i32,
        buttons: MouseButtons,
    ) -> Option<WinId> {
        let prev = self.get(id)?.last_buttons;
        let edges = Edges {
            buttons,
            pressed: buttons & !prev,
            released: prev & !buttons,
        };
        self.route(id, x, y, edges)
    }

    fn route(&mut self, id: WinId, x: i32, y: i32, edges: Edges) -> Option<WinId> {
        let node = self.get(id)?;
        let tracked = node.tracked_child;
        let hover = node.hover_child;

        // Capture fast path
        if let Some(child) = tracked {
            match self.get(child).filter(|c| c.parent == Some(id)).map(|c| c.rect) {
                Some(rect) => {
                    if edges.buttons.is_empty() && edges.pressed.is_empty() {
                        log::trace!("Releasing capture of {} by {}", id, child);
                        if let Some(node) = self.get_mut(id) {
                            node.tracked_child = None;
                        }
                    }
                    let target = self.route(child, x - rect.x, y - rect.y, edges);
                    self.finish(id, edges);
                    return target;
                }
                None => {
                    log::warn!("Stale capture {} on {}", child, id);
                    if let Some(node) = self.get_mut(id) {
                        node.tracked_child = None;
                    }
                }
            }
        }

        let target = match self.hit_child(id, x, y) {
            Some((child, cx, cy)) => {
                if hover != Some(child) {
                    if let Some(old) = hover {
                        self.exit_chain(old);
                    }
                    if let Some(node) = self.get_mut(id) {
                        node.hover_child = Some(child);
                    }
                }
                if !edges.pressed.is_empty() {
                    self.set_active(id, child);
                    if let Some(node) = self.get_mut(id) {
                        node.tracked_child = Some(child);
                    }
                }
                self.route(child, cx, cy, edges)
            }
            None => {
                if let Some(old) = hover {
                    self.exit_chain(old);
                    if let Some(node) = self.get_mut(id) {
                        node.hover_child = None;
                    }
                }
                self.deliver(id, x, y, edges);
                Some(id)
            }
        };
        self.finish(id, edges);
        target
    }

    /// First visible child containing the point, with the point translated
    /// into that child's coordinates
    fn hit_child(&self, id: WinId, x: i32, y: i32) -> Option<(WinId, i32, i32)> {
        let node = self.get(id)?;
        node.children().iter().find_map(|&child| {
            let c = self.get(child)?;
            if c.is_visible() && c.rect.contains(x, y) {
                Some((child, x - c.rect.x, y - c.rect.y))
            } else {
                None
            }
        })
    }

    fn deliver(&mut self, id: WinId, x: i32, y: i32, edges: Edges) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        let ev = PointerEvent {
            x,
            y,
            buttons: edges.buttons,
            pressed: edges.pressed,
            released: edges.released,
        };
        let widget = node.widget_mut();
        if !ev.pressed.is_empty() {
            widget.mouse_down(&ev);
        } else if !ev.released.is_empty() {
            widget.mouse_up(&ev);
        } else {
            widget.mouse_over(&ev);
        }
    }

    fn finish(&mut self, id: WinId, edges: Edges) {
        if let Some(node) = self.get_mut(id) {
            node.last_buttons = edges.buttons;
        }
    }

    /// Tell `id` and its hovered descendants that the pointer left
    pub fn exit_chain(&mut self, id: WinId) {
        let mut cur = Some(id);
        while let Some(w) = cur {
            let Some(node) = self.get_mut(w) else {
                break;
            };
            cur = node.hover_child.take();
            node.widget_mut().mouse_exit();
        }
    }

    /// The pointer is no longer over any child of `id`
    pub fn leave_children(&mut self, id: WinId) {
        let hover = self.get_mut(id).and_then(|w| w.hover_child.take());
        if let Some(child) = hover {
            self.exit_chain(child);
        }
    }

    /// The pointer left the window `id` entirely
    pub fn mouse_left(&mut self, id: WinId) {
        self.leave_children(id);
        if let Some(node) = self.get_mut(id) {
            node.widget_mut().mouse_exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{add_child, add_top, recorder, tree};
    use super::super::Container;
    use crate::protocol::{MouseButtons, Rect, WindowFlags};
    use std::sync::{Arc, Mutex};

    fn drain(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn test_capture_follows_press_until_release() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let w = add_top(&mut tree, 1, Rect::new(0, 0, 100, 100));
        let a = add_child(&mut tree, w, 2, Rect::new(0, 0, 20, 20), recorder("a", &log));
        let b = add_child(&mut tree, w, 3, Rect::new(20, 0, 20, 20), recorder("b", &log));

        assert_eq!(tree.dispatch_mouse(w, 10, 10, MouseButtons::LEFT), Some(a));
        assert_eq!(drain(&log), vec!["a:focus", "a:down(10,10)"]);

        // Dragged over B with the button held: still A
        assert_eq!(tree.dispatch_mouse(w, 25, 5, MouseButtons::LEFT), Some(a));
        assert_eq!(drain(&log), vec!["a:over(25,5)"]);

        // Release over B: A gets it and the capture ends
        assert_eq!(tree.dispatch_mouse(w, 25, 5, MouseButtons::NONE), Some(a));
        assert_eq!(drain(&log), vec!["a:up(25,5)"]);
        assert_eq!(tree.get(w).unwrap().tracked_child, None);

        assert_eq!(tree.dispatch_mouse(w, 25, 5, MouseButtons::NONE), Some(b));
        assert_eq!(drain(&log), vec!["a:exit", "b:over(5,5)"]);
    }

    #[test]
    fn test_nested_children_take_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let w = add_top(&mut tree, 1, Rect::new(0, 0, 100, 100));
        let panel = add_child(&mut tree, w, 2, Rect::new(10, 10, 50, 50), recorder("panel", &log));
        let inner = add_child(&mut tree, panel, 3, Rect::new(5, 5, 10, 10), recorder("inner", &log));

        assert_eq!(tree.dispatch_mouse(w, 16, 17, MouseButtons::NONE), Some(inner));
        assert_eq!(drain(&log), vec!["inner:over(1,2)"]);

        assert_eq!(tree.dispatch_mouse(w, 40, 40, MouseButtons::NONE), Some(panel));
        assert_eq!(drain(&log), vec!["inner:exit", "panel:over(30,30)"]);
    }

    #[test]
    fn test_miss_goes_to_window_and_invisible_children_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree();
        let w = add_top(&mut tree, 1, Rect::new(0, 0, 100, 100));
        let hidden = add_child(&mut tree, w, 2, Rect::new(0, 0, 50, 50), recorder("hidden", &log));
        tree.get_mut(hidden).unwrap().flags.remove(WindowFlags::VISIBLE);

        assert_eq!(tree.dispatch_mouse(w, 5, 5, MouseButtons::NONE), Some(w));
        assert_eq!(tree.dispatch_mouse(w, -50, 500, MouseButtons::RIGHT), Some(w));
        assert!(drain(&log).is_empty());
        assert_eq!(tree.get(w).unwrap().last_buttons, MouseButtons::RIGHT);
    }

    #[test]
    fn test_capture_cleared_when_child_destroyed() {
        let mut tree = tree();
        let w = add_top(&mut tree, 1, Rect::new(0, 0, 100, 100));
        let a = add_child(&mut tree, w, 2, Rect::new(0, 0, 20, 20), Box::new(Container));
        tree.dispatch_mouse(w, 5, 5, MouseButtons::LEFT);
        assert_eq!(tree.get(w).unwrap().tracked_child, Some(a));

        for node in tree.remove_subtree(a) {
            tree.release(node);
        }
        let top = tree.get(w).unwrap();
        assert_eq!(top.tracked_child, None);
        assert_eq!(top.active_child, None);
        assert_eq!(tree.dispatch_mouse(w, 5, 5, MouseButtons::LEFT), Some(w));
    }
}
