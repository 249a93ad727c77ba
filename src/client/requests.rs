//! Server-side window operations, grabs, resources and the clipboard

use super::{window_payload, Client};
use crate::error::{ClientError, ClientResult};
use crate::protocol::*;
use byteorder::{ByteOrder, NativeEndian};

/// Geometry and flags of a window as the server sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub rect: Rect,
    pub flags: WindowFlags,
}

impl Client {
    fn set_visible_flag(&self, id: WinId, visible: bool) {
        if let Some(w) = self.tree.lock().get_mut(id) {
            w.flags.set(WindowFlags::VISIBLE, visible);
        }
    }

    fn require_window(&self, id: WinId) -> ClientResult<()> {
        if self.tree.lock().contains(id) {
            Ok(())
        } else {
            Err(self.fail(ClientError::NoSuchWindow(id)))
        }
    }

    pub fn show(&self, id: WinId) -> ClientResult<()> {
        self.require_window(id)?;
        self.send_oneway(MessageKind::WinShow, id, Payload::Empty)?;
        self.set_visible_flag(id, true);
        Ok(())
    }

    /// Hide a window. An open menu on it is closed.
    pub fn hide(&self, id: WinId) -> ClientResult<()> {
        self.require_window(id)?;
        self.close_menu(id);
        self.send_oneway(MessageKind::WinHide, id, Payload::Empty)?;
        self.set_visible_flag(id, false);
        Ok(())
    }

    pub fn raise(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinRaise, id, Payload::Empty)
    }

    pub fn maximize(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinMaximize, id, Payload::Empty)
    }

    pub fn minimize(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinMinimize, id, Payload::Empty)
    }

    pub fn restore(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinRestore, id, Payload::Empty)
    }

    pub fn set_position(&self, id: WinId, x: i32, y: i32) -> ClientResult<()> {
        let rect = self
            .with_window(id, |w| w.rect)
            .ok_or_else(|| self.fail(ClientError::NoSuchWindow(id)))?;
        let moved = Rect::new(x, y, rect.w, rect.h);
        let payload = Payload::Window(WindowPayload {
            rect: moved,
            ..Default::default()
        });
        self.send_oneway(MessageKind::WinSetPosition, id, payload)?;
        if let Some(w) = self.tree.lock().get_mut(id) {
            w.rect = moved;
        }
        Ok(())
    }

    pub fn set_title(&self, id: WinId, title: &str) -> ClientResult<()> {
        self.require_window(id)?;
        self.send_oneway_with_data(
            MessageKind::WinSetTitle,
            id,
            Payload::Empty,
            title.as_bytes().to_vec(),
        )?;
        if let Some(w) = self.tree.lock().get_mut(id) {
            w.title = title.to_string();
        }
        Ok(())
    }

    /// Set the window icon from `width` x `height` ARGB pixels
    pub fn set_icon(&self, id: WinId, width: u32, height: u32, argb: &[u32]) -> ClientResult<()> {
        let declared = width
            .checked_mul(height)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX);
        if argb.len() != declared {
            return Err(self.fail(ClientError::Protocol(ProtocolError::BadLength {
                declared,
                available: argb.len(),
            })));
        }
        let mut data = vec![0u8; argb.len() * 4];
        NativeEndian::write_u32_into(argb, &mut data);
        let payload = Payload::Window(WindowPayload {
            rect: Rect::new(0, 0, width, height),
            ..Default::default()
        });
        self.send_oneway_with_data(MessageKind::WinSetIcon, id, payload, data)
    }

    /// Push window flags to the server. Local-only bits are kept locally.
    pub fn set_attributes(&self, id: WinId, flags: WindowFlags) -> ClientResult<()> {
        let rect = self
            .with_window(id, |w| w.rect)
            .ok_or_else(|| self.fail(ClientError::NoSuchWindow(id)))?;
        let payload = Payload::Window(WindowPayload {
            rect,
            flags: flags.wire_bits(),
            canvas: CanvasInfo::default(),
        });
        self.send_oneway(MessageKind::WinSetAttribs, id, payload)?;
        if let Some(w) = self.tree.lock().get_mut(id) {
            let local = w.flags & WindowFlags::LOCAL_MASK;
            w.flags = WindowFlags(flags.wire_bits()) | local;
        }
        Ok(())
    }

    pub fn get_attributes(&self, id: WinId) -> ClientResult<WindowAttributes> {
        let reply = self.request(MessageKind::WinGetAttribs, id, Payload::Empty, Vec::new())?;
        let win = window_payload(&reply, MessageKind::WinAttribs).map_err(|e| self.fail(e))?;
        Ok(WindowAttributes {
            rect: win.rect,
            flags: WindowFlags(win.flags),
        })
    }

    /// Mark `local` (relative to `id`) as needing a flush
    pub fn invalidate(&self, id: WinId, local: Rect) {
        self.tree.lock().invalidate(id, local);
    }

    /// Send the dirty rectangles of `id`'s canvas to the server
    pub fn flush(&self, id: WinId) -> ClientResult<()> {
        let (root, dirty) = {
            let mut tree = self.tree.lock();
            let Some(root) = tree.canvas_root(id) else {
                return Err(self.fail(ClientError::NoSuchWindow(id)));
            };
            (root, tree.take_dirty(root))
        };
        for rect in dirty {
            let payload = Payload::Window(WindowPayload {
                rect,
                ..Default::default()
            });
            self.send_oneway(MessageKind::WinInvalidate, root, payload)?;
        }
        Ok(())
    }

    /// Repaint `id` and its subtree and flush the result
    pub fn repaint(&self, id: WinId) -> ClientResult<()> {
        self.tree.lock().repaint(id);
        self.flush(id)
    }

    /// Re-run layout on `id`'s children and repaint
    pub fn layout(&self, id: WinId) -> ClientResult<()> {
        self.tree.lock().layout(id);
        self.repaint(id)
    }

    /// Ask the server for a fresh canvas of the current size
    pub fn new_canvas(&self, id: WinId) -> ClientResult<()> {
        let rect = self
            .with_window(id, |w| w.rect)
            .ok_or_else(|| self.fail(ClientError::NoSuchWindow(id)))?;
        let payload = Payload::Window(WindowPayload {
            rect,
            ..Default::default()
        });
        let reply = self.request(MessageKind::WinNewCanvas, id, payload, Vec::new())?;
        let win = window_payload(&reply, MessageKind::NewCanvas).map_err(|e| self.fail(e))?;
        self.apply_canvas(id, &win).map_err(|e| self.fail(e))?;
        self.flush(id)
    }

    pub fn enter_fullscreen(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinEnterFullscreen, id, Payload::Empty)
    }

    pub fn exit_fullscreen(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::WinExitFullscreen, id, Payload::Empty)
    }

    pub fn grab_mouse(&self, id: WinId) -> ClientResult<()> {
        self.request(MessageKind::MouseGrab, id, Payload::Empty, Vec::new())
            .map(|_| ())
    }

    pub fn ungrab_mouse(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::MouseUngrab, id, Payload::Empty)
    }

    pub fn grab_keyboard(&self, id: WinId) -> ClientResult<()> {
        self.request(MessageKind::KeyboardGrab, id, Payload::Empty, Vec::new())
            .map(|_| ())
    }

    pub fn ungrab_keyboard(&self, id: WinId) -> ClientResult<()> {
        self.send_oneway(MessageKind::KeyboardUngrab, id, Payload::Empty)
    }

    /// Load a server resource by path. Returns its id.
    pub fn load_resource(&self, path: &str) -> ClientResult<u32> {
        let reply = self.request(
            MessageKind::ResourceLoad,
            WinId::ROOT,
            Payload::Resource(ResourcePayload::default()),
            path.as_bytes().to_vec(),
        )?;
        let res = *reply.resource().ok_or_else(|| {
            self.fail(ClientError::UnexpectedReply {
                expected: MessageKind::ResourceLoaded,
                got: reply.kind,
            })
        })?;
        self.resources.lock().track_resource(res.id, path, res.size);
        log::debug!("Loaded resource {} as {} ({} bytes)", path, res.id, res.size);
        Ok(res.id)
    }

    /// Fetch the contents of a loaded resource
    pub fn get_resource(&self, id: u32) -> ClientResult<Vec<u8>> {
        let payload = Payload::Resource(ResourcePayload { id, size: 0 });
        let reply = self.request(MessageKind::ResourceGet, WinId::ROOT, payload, Vec::new())?;
        Ok(reply.data)
    }

    pub fn unload_resource(&self, id: u32) -> ClientResult<()> {
        let payload = Payload::Resource(ResourcePayload { id, size: 0 });
        self.send_oneway(MessageKind::ResourceUnload, WinId::ROOT, payload)?;
        if !self.resources.lock().untrack_resource(id) {
            log::debug!("Unloaded untracked resource {}", id);
        }
        Ok(())
    }

    /// Place `data` on the clipboard in `format`
    pub fn clipboard_set(&self, format: u32, data: &[u8]) -> ClientResult<()> {
        let payload = Payload::Clipboard(ClipboardPayload {
            format,
            size: data.len() as u32,
        });
        self.request(MessageKind::ClipboardSet, WinId::ROOT, payload, data.to_vec())
            .map(|_| ())
    }

    /// Whether the clipboard holds data in `format`
    pub fn clipboard_query(&self, format: u32) -> ClientResult<bool> {
        let payload = Payload::Clipboard(ClipboardPayload { format, size: 0 });
        let reply = self.request(MessageKind::ClipboardQuery, WinId::ROOT, payload, Vec::new())?;
        Ok(reply.clipboard().is_some_and(|c| c.size != 0))
    }

    pub fn clipboard_get(&self, format: u32) -> ClientResult<Vec<u8>> {
        let payload = Payload::Clipboard(ClipboardPayload { format, size: 0 });
        let reply = self.request(MessageKind::ClipboardGet, WinId::ROOT, payload, Vec::new())?;
        Ok(reply.data)
    }

    /// The server's colour palette as ARGB entries
    pub fn color_palette(&self) -> ClientResult<Vec<u32>> {
        let reply = self.request(MessageKind::ColorPaletteGet, WinId::ROOT, Payload::Empty, Vec::new())?;
        let mut colors = vec![0u32; reply.data.len() / 4];
        NativeEndian::read_u32_into(&reply.data[..colors.len() * 4], &mut colors);
        Ok(colors)
    }
}
