//! Keyboard dispatch and tab focus

use super::WindowTree;
use crate::protocol::keys::KEY_TAB;
use crate::protocol::{KeyModifiers, KeyPress, WinId};

impl WindowTree {
    /// Offer a key to the active-child chain of `id`, deepest node first,
    /// then to `id` itself. An unconsumed TAB press moves focus among the
    /// children of `id`. Returns true when something handled the key.
    pub fn dispatch_key(&mut self, id: WinId, key: &KeyPress, pressed: bool) -> bool {
        let mut chain = vec![id];
        let mut cur = id;
        while let Some(next) = self.get(cur).and_then(|w| w.active_child) {
            if !self.contains(next) || chain.contains(&next) {
                break;
            }
            chain.push(next);
            cur = next;
        }

        for &node in chain.iter().rev() {
            let Some(w) = self.get_mut(node) else {
                continue;
            };
            let widget = w.widget_mut();
            let consumed = if pressed {
                widget.key_press(key)
            } else {
                widget.key_release(key)
            };
            if consumed {
                return true;
            }
        }

        if pressed && key.code == KEY_TAB {
            let reverse = key.modifiers.contains(KeyModifiers::SHIFT);
            return self.cycle_focus(id, reverse).is_some();
        }
        false
    }

    /// Focus the next focusable child of `id` in insertion order, wrapping
    /// around. Returns the newly focused child.
    pub fn focus_next(&mut self, id: WinId) -> Option<WinId> {
        self.cycle_focus(id, false)
    }

    /// Focus the previous focusable child of `id`
    pub fn focus_prev(&mut self, id: WinId) -> Option<WinId> {
        self.cycle_focus(id, true)
    }

    fn cycle_focus(&mut self, id: WinId, reverse: bool) -> Option<WinId> {
        let node = self.get(id)?;
        let focusable: Vec<WinId> = node
            .children()
            .iter()
            .copied()
            .filter(|c| self.get(*c).map_or(false, |w| w.is_focusable()))
            .collect();
        if focusable.is_empty() {
            return None;
        }
        let n = focusable.len();
        let current = node
            .active_child
            .and_then(|a| focusable.iter().position(|c| *c == a));
        let next = match (current, reverse) {
            (Some(i), false) => (i + 1) % n,
            (Some(i), true) => (i + n - 1) % n,
            (None, false) => 0,
            (None, true) => n - 1,
        };
        let target = focusable[next];
        self.set_active(id, target);
        Some(target)
    }
}
