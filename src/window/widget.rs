//! Widget behaviour
//!
//! Every node of the window tree carries one [`Widget`]. Hooks default to
//! no-ops, which is how a node declares it does not handle an event.

use super::canvas::Canvas;
use crate::protocol::{KeyPress, MouseButtons, Rect};

/// A pointer sample in node-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub x: i32,
    pub y: i32,
    /// Buttons held now
    pub buttons: MouseButtons,
    /// Buttons that went down with this sample
    pub pressed: MouseButtons,
    /// Buttons that went up with this sample
    pub released: MouseButtons,
}

/// Where a node paints: its rectangle in canvas coordinates
pub struct PaintContext<'a> {
    pub canvas: Option<&'a mut Canvas>,
    pub rect: Rect,
    pub focused: bool,
}

impl PaintContext<'_> {
    /// Fill the node's whole rectangle
    pub fn fill(&mut self, argb: u32) {
        let rect = self.rect;
        if let Some(canvas) = self.canvas.as_deref_mut() {
            canvas.fill_rect(rect, argb);
        }
    }

    /// Fill a rectangle given in node-local coordinates, clipped to the node
    pub fn fill_local(&mut self, local: Rect, argb: u32) {
        let bounds = Rect::new(0, 0, self.rect.w, self.rect.h);
        let x = self.rect.x.saturating_add(local.x.max(0));
        let y = self.rect.y.saturating_add(local.y.max(0));
        let w = local.right().min(bounds.right()).saturating_sub(local.x.max(0)).max(0) as u32;
        let h = local.bottom().min(bounds.bottom()).saturating_sub(local.y.max(0)).max(0) as u32;
        if let Some(canvas) = self.canvas.as_deref_mut() {
            canvas.fill_rect(Rect::new(x, y, w, h), argb);
        }
    }
}

/// Per-node behaviour hooks
pub trait Widget: Send {
    fn repaint(&mut self, _ctx: &mut PaintContext<'_>) {}

    /// Pointer moved over the node (or dragged while it holds the capture)
    fn mouse_over(&mut self, _ev: &PointerEvent) {}

    fn mouse_down(&mut self, _ev: &PointerEvent) {}

    fn mouse_up(&mut self, _ev: &PointerEvent) {}

    /// Pointer left the node
    fn mouse_exit(&mut self) {}

    fn focus(&mut self) {}

    fn unfocus(&mut self) {}

    /// Returns true when the key was consumed
    fn key_press(&mut self, _key: &KeyPress) -> bool {
        false
    }

    fn key_release(&mut self, _key: &KeyPress) -> bool {
        false
    }

    /// The node's geometry changed through layout or a resize
    fn size_changed(&mut self, _rect: Rect) {}

    fn destroy(&mut self) {}
}

/// A node with no behaviour of its own, only children
#[derive(Debug, Default)]
pub struct Container;

impl Widget for Container {}

/// A solid background with a caption
#[derive(Debug, Clone)]
pub struct Label {
    pub text: String,
    pub background: u32,
}

impl Label {
    pub fn new<S: Into<String>>(text: S, background: u32) -> Self {
        Label {
            text: text.into(),
            background,
        }
    }
}

impl Widget for Label {
    fn repaint(&mut self, ctx: &mut PaintContext<'_>) {
        ctx.fill(self.background);
    }
}
