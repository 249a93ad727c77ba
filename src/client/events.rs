//! Event dispatch
//!
//! Routes server notifications into the window tree and the menu bars.
//! Menu bars are borrowed out of the registry while they handle input, and
//! any resulting handler runs only after the bar is back in place, so a
//! handler may freely call back into the client.

use super::Client;
use crate::error::ClientResult;
use crate::menu::{MenuBar, MenuHost, MenuOutcome};
use crate::protocol::*;

impl Client {
    /// Dequeue the next application event. Internal replies are skipped.
    pub fn next_event(&self, wait: bool) -> ClientResult<Option<Message>> {
        self.check_open()?;
        self.conn.next(None, SEQ_ANY, wait).map_err(|e| self.fail(e))
    }

    /// Dequeue the next event and dispatch it. The event is returned so the
    /// caller can react to it as well.
    pub fn process_event(&self, wait: bool) -> ClientResult<Option<Message>> {
        let msg = self.next_event(wait)?;
        if let Some(msg) = &msg {
            self.dispatch(msg);
        }
        Ok(msg)
    }

    /// Apply one server notification to local state
    pub fn dispatch(&self, msg: &Message) {
        let target = msg.dest;
        match msg.kind {
            MessageKind::MouseMotion | MessageKind::MouseEnter => {
                if let Some(m) = msg.mouse() {
                    self.dispatch_pointer(target, m);
                }
            }
            MessageKind::MouseExit => self.tree.lock().mouse_left(target),
            MessageKind::KeyPress => {
                if let Some(k) = msg.key() {
                    self.dispatch_key_press(target, KeyPress::new(k.code, k.modifiers));
                }
            }
            MessageKind::KeyRelease => {
                if let Some(k) = msg.key() {
                    let key = KeyPress::new(k.code, k.modifiers);
                    self.tree.lock().dispatch_key(target, &key, false);
                }
            }
            MessageKind::ResizeOffer => {
                if let Some(win) = msg.window() {
                    if let Err(e) = self.resize(target, win.rect) {
                        log::warn!("Resize of {} to {:?} failed: {}", target, win.rect, e);
                    }
                }
            }
            MessageKind::PositionChanged => {
                if let Some(win) = msg.window() {
                    if let Some(w) = self.tree.lock().get_mut(target) {
                        w.rect.x = win.rect.x;
                        w.rect.y = win.rect.y;
                    }
                }
            }
            MessageKind::WinShown => {
                if let Some(w) = self.tree.lock().get_mut(target) {
                    w.flags.insert(WindowFlags::VISIBLE);
                }
            }
            MessageKind::WinHidden => {
                if let Some(w) = self.tree.lock().get_mut(target) {
                    w.flags.remove(WindowFlags::VISIBLE);
                }
                self.close_menu(target);
            }
            MessageKind::WinLowered | MessageKind::WinClosing => self.close_menu(target),
            MessageKind::FocusGained => {
                if let Some(w) = self.tree.lock().get_mut(target) {
                    w.flags.insert(WindowFlags::FOCUSED);
                }
                self.focus_moved(target);
            }
            MessageKind::FocusLost => {
                if let Some(w) = self.tree.lock().get_mut(target) {
                    w.flags.remove(WindowFlags::FOCUSED);
                }
                // src names the window that received focus
                self.focus_moved(msg.src);
            }
            MessageKind::WinState => {
                if let Some(win) = msg.window() {
                    if let Some(w) = self.tree.lock().get_mut(target) {
                        let local = w.flags & WindowFlags::LOCAL_MASK;
                        w.rect = win.rect;
                        w.flags = WindowFlags(WindowFlags(win.flags).wire_bits()) | local;
                    }
                }
            }
            MessageKind::MenuSelected => {
                if let Some(m) = msg.menu() {
                    self.menu_selected(target, m.entry_id);
                }
            }
            MessageKind::Error => {
                log::warn!(
                    "Server error {:?} for {}",
                    msg.error_code(),
                    target
                );
            }
            kind => log::trace!("Ignoring {} for {}", kind, target),
        }
    }

    fn dispatch_pointer(&self, target: WinId, m: &MousePayload) {
        let Some((prev, captured)) =
            self.with_window(target, |w| (w.last_buttons, w.tracked_child.is_some()))
        else {
            log::debug!("Pointer event for unknown window {}", target);
            return;
        };
        // A captured drag belongs to the child until its release arrives
        if captured {
            self.tree.lock().dispatch_mouse(target, m.x, m.y, m.buttons);
            return;
        }
        let pressed = m.buttons.contains(MouseButtons::LEFT) && !prev.contains(MouseButtons::LEFT);

        let frame_owner = self.menus.lock().owner_of_frame(target);
        let outcome = match frame_owner {
            Some(owner) => self.menu_input(owner, |bar, host| {
                bar.frame_mouse(target, m.x, m.y, pressed, host)
            }),
            None => self.menu_input(target, |bar, host| bar.bar_mouse(m.x, m.y, pressed, host)),
        };
        if !outcome.is_ignored() {
            let mut tree = self.tree.lock();
            tree.leave_children(target);
            if let Some(w) = tree.get_mut(target) {
                w.last_buttons = m.buttons;
            }
            return;
        }
        self.tree.lock().dispatch_mouse(target, m.x, m.y, m.buttons);
    }

    /// Shortcuts first, then menu navigation, then the focused chain
    fn dispatch_key_press(&self, target: WinId, key: KeyPress) {
        let owner = self.menus.lock().owner_of_frame(target).unwrap_or(target);

        let shortcut = self.menus.lock().get(owner).and_then(|bar| bar.shortcut_for(&key));
        if let Some(item) = shortcut {
            if let Some(Some(activation)) = self.with_menu(owner, |bar, host| bar.select(item, host)) {
                activation.fire();
                return;
            }
        }

        let outcome = self.menu_input(owner, |bar, host| bar.key_press(&key, host));
        if !outcome.is_ignored() {
            return;
        }
        self.tree.lock().dispatch_key(owner, &key, true);
    }

    fn menu_selected(&self, target: WinId, entry_id: u32) {
        let Ok(item) = u8::try_from(entry_id) else {
            log::warn!("Menu entry {} out of range", entry_id);
            return;
        };
        let owner = self.menus.lock().owner_of_frame(target).unwrap_or(target);
        if let Some(Some(activation)) = self.with_menu(owner, |bar, host| bar.select(item, host)) {
            activation.fire();
        }
    }

    /// Feed input to the bar of `owner`, firing any selection once the bar
    /// is back in the registry
    fn menu_input(
        &self,
        owner: WinId,
        f: impl FnOnce(&mut MenuBar, &mut dyn MenuHost) -> MenuOutcome,
    ) -> MenuOutcome {
        match self.with_menu(owner, f) {
            Some(MenuOutcome::Selected(activation)) => {
                activation.fire();
                MenuOutcome::Handled
            }
            Some(outcome) => outcome,
            None => MenuOutcome::Ignored,
        }
    }

    /// Close the open menu of `owner`, if any
    pub fn close_menu(&self, owner: WinId) {
        self.with_menu(owner, |bar, host| bar.close(host));
    }

    fn focus_moved(&self, focus: WinId) {
        let owners = self.menus.lock().owners();
        for owner in owners {
            self.with_menu(owner, |bar, host| bar.focus_changed(focus, host));
        }
    }
}
