//! The client runtime
//!
//! A [`Client`] holds everything one connection needs: the message queue,
//! the window registry, menu bars, pools and the resource tracker. It runs
//! no threads of its own. Every method takes `&self`, so one client can be
//! shared between the application's threads; each shared structure has its
//! own spin lock, and no lock is held while waiting for the server.

mod dialog;
mod events;
mod requests;

pub use dialog::{Dialog, DialogEnd};
pub use requests::WindowAttributes;

use crate::config::ClientConfig;
use crate::connection::{Connection, Transport, UnixTransport};
use crate::error::{ClientError, ClientResult};
use crate::menu::{MenuBar, MenuHost, MenuRegistry};
use crate::pool::Pools;
use crate::protocol::*;
use crate::resources::{CleanupRequest, ResourceTracker};
use crate::sync::SpinLock;
use crate::window::{
    Canvas, Container, LayoutHints, PosixShm, SharedMemory, Widget, Window, WindowTree,
};
use nix::errno::Errno;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

pub struct Client {
    config: ClientConfig,
    conn: Connection,
    pools: Arc<Pools>,
    tree: SpinLock<WindowTree>,
    shm: Box<dyn SharedMemory>,
    menus: SpinLock<MenuRegistry>,
    resources: SpinLock<ResourceTracker>,
    pid: u32,
    next_counter: AtomicU32,
    last_error: AtomicI32,
    closed: AtomicBool,
}

impl Client {
    /// Connect to the server at `config.socket_path`, mapping canvases from
    /// POSIX shared memory
    pub fn connect(config: ClientConfig) -> ClientResult<Client> {
        let transport = UnixTransport::connect(&config.socket_path)?;
        let shm = PosixShm::new(config.shm_prefix.clone());
        Ok(Client::with_transport(config, Box::new(transport), Box::new(shm)))
    }

    /// Build a client over an existing transport and shared-memory backend
    pub fn with_transport(
        config: ClientConfig,
        transport: Box<dyn Transport>,
        shm: Box<dyn SharedMemory>,
    ) -> Client {
        let pools = Arc::new(Pools::new(&config));
        let conn = Connection::new(
            transport,
            pools.clone(),
            config.poll_interval,
            config.reply_timeout,
        );
        Client {
            tree: SpinLock::new(WindowTree::new(pools.clone())),
            conn,
            pools,
            shm,
            menus: SpinLock::new(MenuRegistry::new()),
            resources: SpinLock::new(ResourceTracker::new()),
            pid: std::process::id(),
            next_counter: AtomicU32::new(1),
            last_error: AtomicI32::new(0),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn pools(&self) -> &Arc<Pools> {
        &self.pools
    }

    /// errno of the most recent failed operation
    pub fn last_error(&self) -> Option<Errno> {
        match self.last_error.load(Ordering::Relaxed) {
            0 => None,
            code => Some(Errno::from_raw(code)),
        }
    }

    /// Record `e` as the last error and hand it back
    fn fail(&self, e: ClientError) -> ClientError {
        self.last_error.store(e.errno() as i32, Ordering::Relaxed);
        e
    }

    fn check_open(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.fail(ClientError::NotConnected));
        }
        Ok(())
    }

    fn next_id(&self) -> WinId {
        WinId::new(self.pid, self.next_counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a request that expects no reply
    fn send_oneway(&self, kind: MessageKind, window: WinId, payload: Payload) -> ClientResult<()> {
        self.send_oneway_with_data(kind, window, payload, Vec::new())
    }

    fn send_oneway_with_data(
        &self,
        kind: MessageKind,
        window: WinId,
        payload: Payload,
        data: Vec<u8>,
    ) -> ClientResult<()> {
        self.check_open()?;
        let mut msg = Message::new(kind, window, WinId::ROOT, payload).with_data(data);
        self.conn.send(&mut msg).map(|_| ()).map_err(|e| self.fail(e))
    }

    /// Send a request and block for its reply
    fn request(
        &self,
        kind: MessageKind,
        window: WinId,
        payload: Payload,
        data: Vec<u8>,
    ) -> ClientResult<Message> {
        self.check_open()?;
        let mut msg = Message::new(kind, window, WinId::ROOT, payload).with_data(data);
        self.conn.request(&mut msg).map_err(|e| self.fail(e))
    }

    /// Create a top-level window. The server may adjust the geometry.
    pub fn create_window(&self, title: &str, rect: Rect, flags: WindowFlags) -> ClientResult<WinId> {
        self.create_window_with(title, rect, flags, Box::new(Container))
    }

    /// Create a top-level window whose root node runs `widget`
    pub fn create_window_with(
        &self,
        title: &str,
        rect: Rect,
        flags: WindowFlags,
        widget: Box<dyn Widget>,
    ) -> ClientResult<WinId> {
        self.create(
            WindowKind::TopLevel,
            MessageKind::WinCreate,
            WinId::ROOT,
            title,
            rect,
            flags,
            widget,
        )
    }

    pub(crate) fn create_menu_frame(&self, owner: WinId, rect: Rect) -> ClientResult<WinId> {
        self.create(
            WindowKind::MenuFrame,
            MessageKind::MenuFrameCreate,
            owner,
            "",
            rect,
            WindowFlags::NO_DECORATION | WindowFlags::ALWAYS_ON_TOP | WindowFlags::SKIP_TASKBAR,
            Box::new(Container),
        )
    }

    /// Register the node, ask the server for it and attach the canvas from
    /// the reply. On any failure the node is removed again.
    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        kind: WindowKind,
        request: MessageKind,
        owner: WinId,
        title: &str,
        rect: Rect,
        flags: WindowFlags,
        widget: Box<dyn Widget>,
    ) -> ClientResult<WinId> {
        self.check_open()?;
        let id = self.next_id();
        {
            let mut tree = self.tree.lock();
            let mut window = tree.new_window(id, kind, rect, flags, owner, widget);
            window.title = title.to_string();
            tree.insert(window);
        }

        let payload = Payload::Window(WindowPayload {
            rect,
            flags: flags.wire_bits(),
            canvas: CanvasInfo::default(),
        });
        let mut msg = Message::new(request, id, owner, payload).with_data(title.as_bytes().to_vec());
        let expected = request.reply_kind().unwrap_or(MessageKind::WinCreated);
        let attached = self.conn.request(&mut msg).and_then(|reply| {
            let win = window_payload(&reply, expected)?;
            let canvas = Canvas::attach(self.shm.as_ref(), &win.canvas, win.rect.w, win.rect.h)?;
            Ok((win, canvas))
        });

        match attached {
            Ok((win, canvas)) => {
                {
                    let mut tree = self.tree.lock();
                    if let Some(w) = tree.get_mut(id) {
                        w.rect = win.rect;
                        w.canvas = Some(canvas);
                    }
                    tree.repaint(id);
                }
                if kind != WindowKind::MenuFrame {
                    self.resources.lock().track_window(id);
                }
                log::info!("Created {:?} {} at {:?}", kind, id, win.rect);
                Ok(id)
            }
            Err(e) => {
                log::warn!("Creating {:?} {} failed: {}", kind, id, e);
                let mut tree = self.tree.lock();
                for w in tree.remove_subtree(id) {
                    tree.release(w);
                }
                Err(self.fail(e))
            }
        }
    }

    /// Add a widget node under `parent`
    pub fn add_widget(
        &self,
        parent: WinId,
        rect: Rect,
        flags: WindowFlags,
        hints: LayoutHints,
        widget: Box<dyn Widget>,
    ) -> ClientResult<WinId> {
        let id = self.next_id();
        let mut tree = self.tree.lock();
        let mut window = tree.new_window(id, WindowKind::Widget, rect, flags, WinId::ROOT, widget);
        window.layout = hints;
        tree.insert_child(parent, window).map_err(|e| self.fail(e))?;
        Ok(id)
    }

    /// Destroy `id` and everything under it. Best effort: never fails.
    pub fn destroy(&self, id: WinId) {
        let removed = self.tree.lock().remove_subtree(id);
        if removed.is_empty() {
            log::debug!("destroy: {} is not registered", id);
            return;
        }
        for mut window in removed {
            window.widget_mut().destroy();
            if window.kind.has_canvas() {
                self.teardown_server_window(&mut window);
            }
            self.tree.lock().release(window);
        }
    }

    fn teardown_server_window(&self, window: &mut Window) {
        let id = window.id;
        if let Some(canvas) = window.canvas.take() {
            let info = *canvas.info();
            drop(canvas);
            let payload = Payload::Window(WindowPayload {
                rect: window.rect,
                flags: 0,
                canvas: info,
            });
            if let Err(e) = self.send_oneway(MessageKind::WinDestroyCanvas, id, payload) {
                log::debug!("Discarding canvas of {}: {}", id, e);
            }
        }
        if let Err(e) = self.send_oneway(MessageKind::WinDestroy, id, Payload::Empty) {
            log::debug!("Destroying {}: {}", id, e);
        }
        self.resources.lock().untrack_window(id);

        let bar = self.menus.lock().remove(id);
        if let Some(bar) = bar {
            for frame in bar.frame_ids() {
                self.destroy(frame);
            }
        }
        log::info!("Destroyed {:?} {}", window.kind, id);
    }

    /// Run `f` on a node of the registry
    pub fn with_window<R>(&self, id: WinId, f: impl FnOnce(&Window) -> R) -> Option<R> {
        self.tree.lock().get(id).map(f)
    }

    pub fn window_count(&self) -> usize {
        self.tree.lock().len()
    }

    /// Resize `id`: accept (blocking), migrate the canvas, finalize
    pub fn resize(&self, id: WinId, rect: Rect) -> ClientResult<()> {
        let is_server_window = self
            .with_window(id, |w| w.kind.has_canvas())
            .ok_or_else(|| self.fail(ClientError::NoSuchWindow(id)))?;
        if !is_server_window {
            let mut tree = self.tree.lock();
            if let Some(w) = tree.get_mut(id) {
                w.rect = rect;
            }
            tree.notify_size(id);
            tree.layout(id);
            return Ok(());
        }

        let payload = Payload::Window(WindowPayload {
            rect,
            flags: 0,
            canvas: CanvasInfo::default(),
        });
        let reply = self.request(MessageKind::WinResizeAccept, id, payload, Vec::new())?;
        let win = window_payload(&reply, MessageKind::ResizeConfirm).map_err(|e| self.fail(e))?;
        self.apply_canvas(id, &win).map_err(|e| self.fail(e))?;
        self.send_oneway(MessageKind::WinResizeFinalize, id, Payload::Window(win))?;
        self.flush(id)
    }

    /// Install the canvas and geometry from a server reply. A new handle is
    /// attached before the old segment is released; the same handle is
    /// never attached twice.
    fn apply_canvas(&self, id: WinId, win: &WindowPayload) -> ClientResult<()> {
        let current = self
            .with_window(id, |w| w.canvas.as_ref().map(|c| c.handle()))
            .ok_or(ClientError::NoSuchWindow(id))?;
        let fresh = if current != Some(win.canvas.handle) {
            Some(Canvas::attach(
                self.shm.as_ref(),
                &win.canvas,
                win.rect.w,
                win.rect.h,
            )?)
        } else {
            None
        };

        let old = {
            let mut tree = self.tree.lock();
            let Some(w) = tree.get_mut(id) else {
                return Err(ClientError::NoSuchWindow(id));
            };
            w.rect = win.rect;
            let old = match fresh {
                Some(canvas) => w.canvas.replace(canvas),
                None => {
                    if let Some(canvas) = w.canvas.as_mut() {
                        canvas.reshape(&win.canvas, win.rect.w, win.rect.h);
                    }
                    None
                }
            };
            tree.notify_size(id);
            tree.layout(id);
            tree.repaint(id);
            old
        };
        if let Some(old) = old {
            log::debug!("Canvas of {}: {} -> {}", id, old.handle(), win.canvas.handle);
        }
        Ok(())
    }

    /// Install a menu bar on its owner window, closing and discarding the
    /// bar it replaces
    pub fn set_menu(&self, bar: MenuBar) -> ClientResult<()> {
        let owner = bar.owner();
        if !self.tree.lock().contains(owner) {
            return Err(self.fail(ClientError::NoSuchWindow(owner)));
        }
        let replaced = self.menus.lock().insert(bar);
        if let Some(old) = replaced {
            self.discard_menu(old);
        }
        self.with_menu(owner, |bar, host| bar.paint_bar(host));
        Ok(())
    }

    /// Remove the menu bar of `owner`, closing it first
    pub fn remove_menu(&self, owner: WinId) -> Option<MenuBar> {
        let mut bar = self.menus.lock().remove(owner)?;
        bar.close(&mut ClientMenuHost { client: self });
        Some(bar)
    }

    /// Run `f` on the menu bar of `owner`
    pub fn update_menu<R>(&self, owner: WinId, f: impl FnOnce(&mut MenuBar) -> R) -> Option<R> {
        self.with_menu(owner, |bar, _| f(bar))
    }

    /// Take the bar of `owner` out of the registry, run `f` without any
    /// lock held, and put it back. A bar whose owner was destroyed or whose
    /// menu was replaced meanwhile is discarded instead.
    fn with_menu<R>(
        &self,
        owner: WinId,
        f: impl FnOnce(&mut MenuBar, &mut dyn MenuHost) -> R,
    ) -> Option<R> {
        let mut bar = self.menus.lock().take(owner)?;
        let result = f(&mut bar, &mut ClientMenuHost { client: self });
        let retired = self.menus.lock().put(bar);
        if let Some(bar) = retired {
            self.discard_menu(bar);
        }
        Some(result)
    }

    /// Close a bar that left the registry and destroy its frames
    fn discard_menu(&self, mut bar: MenuBar) {
        bar.close(&mut ClientMenuHost { client: self });
        for frame in bar.frame_ids() {
            self.destroy(frame);
        }
    }

    /// Fill rectangles on a window's canvas and push them to the server
    fn fill(&self, window: WinId, fills: &[(Rect, u32)]) {
        {
            let mut tree = self.tree.lock();
            let Some(w) = tree.get_mut(window) else {
                return;
            };
            if let Some(canvas) = w.canvas.as_mut() {
                for (rect, argb) in fills {
                    canvas.fill_rect(*rect, *argb);
                }
            }
            for (rect, _) in fills {
                tree.invalidate(window, *rect);
            }
        }
        if let Err(e) = self.flush(window) {
            log::debug!("Flushing {}: {}", window, e);
        }
    }

    /// Destroy every window, unload tracked resources and drop queued
    /// messages. Further requests fail with [`ClientError::NotConnected`].
    pub fn shutdown(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let cleanup = self.resources.lock().release_all();
        for request in cleanup {
            match request {
                CleanupRequest::DestroyWindow(id) => self.destroy(id),
                CleanupRequest::UnloadResource(id) => {
                    let payload = Payload::Resource(ResourcePayload { id, size: 0 });
                    if let Err(e) = self.send_oneway(MessageKind::ResourceUnload, WinId::ROOT, payload) {
                        log::debug!("Unloading resource {}: {}", id, e);
                    }
                }
            }
        }
        let leftovers = self.tree.lock().roots();
        for id in leftovers {
            self.destroy(id);
        }
        self.closed.store(true, Ordering::Release);
        let dropped = self.conn.drain();
        log::info!("Client shut down ({} queued messages dropped)", dropped);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Geometry carried by a reply of kind `expected`
fn window_payload(reply: &Message, expected: MessageKind) -> ClientResult<WindowPayload> {
    match reply.window() {
        Some(win) if reply.kind == expected => Ok(*win),
        _ => Err(ClientError::UnexpectedReply {
            expected,
            got: reply.kind,
        }),
    }
}

/// Menu frames as real server windows
struct ClientMenuHost<'a> {
    client: &'a Client,
}

impl MenuHost for ClientMenuHost<'_> {
    fn show_frame(&mut self, owner: WinId, cached: Option<WinId>, rect: Rect) -> ClientResult<WinId> {
        let client = self.client;
        let origin = client
            .with_window(owner, |w| (w.rect.x, w.rect.y))
            .ok_or(ClientError::NoSuchWindow(owner))?;
        let screen = Rect::new(origin.0 + rect.x, origin.1 + rect.y, rect.w, rect.h);

        let cached = cached.and_then(|f| client.with_window(f, |w| (f, w.rect)));
        let frame = match cached {
            Some((frame, current)) => {
                if (current.w, current.h) != (rect.w, rect.h) {
                    client.resize(frame, screen)?;
                }
                frame
            }
            None => client.create_menu_frame(owner, screen)?,
        };

        let payload = Payload::Window(WindowPayload {
            rect: screen,
            flags: 0,
            canvas: CanvasInfo::default(),
        });
        client.send_oneway(MessageKind::MenuFrameShow, frame, payload)?;
        if let Some(w) = client.tree.lock().get_mut(frame) {
            w.rect = screen;
            w.flags.insert(WindowFlags::VISIBLE);
        }
        Ok(frame)
    }

    fn hide_frame(&mut self, frame: WinId) {
        if let Err(e) = self.client.send_oneway(MessageKind::MenuFrameHide, frame, Payload::Empty) {
            log::debug!("Hiding menu frame {}: {}", frame, e);
        }
        if let Some(w) = self.client.tree.lock().get_mut(frame) {
            w.flags.remove(WindowFlags::VISIBLE);
        }
    }

    fn paint(&mut self, window: WinId, fills: &[(Rect, u32)]) {
        self.client.fill(window, fills);
    }
}
