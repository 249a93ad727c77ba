//! Shared test harness: an in-process display server on the far end of a
//! datagram socket pair, and a shared-memory backend that records attach
//! and detach order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::net::UnixDatagram;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use byteorder::{ByteOrder, NativeEndian};
use wsclient::connection::UnixTransport;
use wsclient::error::ClientResult;
use wsclient::protocol::*;
use wsclient::window::{PointerEvent, Segment, SharedMemory, Widget};
use wsclient::{Client, ClientConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Knobs the tests turn on the fake server
#[derive(Debug, Default)]
pub struct Behaviour {
    /// Answer the next creation request with an invalid reply carrying
    /// this errno
    pub fail_next_create: Option<i32>,
    /// Keep the current segment handle when accepting a resize
    pub resize_keeps_handle: bool,
    pub palette: Vec<u32>,
}

#[derive(Default)]
struct ServerState {
    next_handle: u32,
    next_resource: u32,
    handles: HashMap<WinId, u32>,
    rects: HashMap<WinId, Rect>,
    clipboard: HashMap<u32, Vec<u8>>,
}

pub struct FakeServer {
    socket: Arc<UnixDatagram>,
    requests: Arc<Mutex<Vec<Message>>>,
    pub behaviour: Arc<Mutex<Behaviour>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeServer {
    fn spawn(socket: UnixDatagram) -> FakeServer {
        socket
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let socket = Arc::new(socket);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let behaviour = Arc::new(Mutex::new(Behaviour::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let socket = socket.clone();
            let requests = requests.clone();
            let behaviour = behaviour.clone();
            let stop = stop.clone();
            thread::spawn(move || serve(&socket, &requests, &behaviour, &stop))
        };

        FakeServer {
            socket,
            requests,
            behaviour,
            stop,
            handle: Some(handle),
        }
    }

    /// Push an event to the client
    pub fn send(&self, msg: &Message) {
        self.socket.send(&msg.encode().unwrap()).unwrap();
    }

    /// Request kinds received so far
    pub fn kinds(&self) -> Vec<MessageKind> {
        self.requests.lock().unwrap().iter().map(|m| m.kind).collect()
    }

    pub fn requests(&self) -> Vec<Message> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait until `done` holds for the received requests
    pub fn wait_for<F: Fn(&[Message]) -> bool>(&self, done: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done(&self.requests.lock().unwrap()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(
    socket: &UnixDatagram,
    requests: &Mutex<Vec<Message>>,
    behaviour: &Mutex<Behaviour>,
    stop: &AtomicBool,
) {
    let mut state = ServerState {
        next_handle: 1,
        next_resource: 1,
        ..Default::default()
    };
    let mut buf = vec![0u8; MAX_MESSAGE_LEN];
    while !stop.load(Ordering::Acquire) {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(_) => continue,
        };
        let Ok(request) = Message::decode(&buf[..len]) else {
            continue;
        };
        requests.lock().unwrap().push(request.clone());
        if let Some(reply) = answer(&request, &mut state, behaviour) {
            let _ = socket.send(&reply.encode().unwrap());
        }
    }
}

fn canvas_for(rect: Rect, handle: u32) -> CanvasInfo {
    CanvasInfo {
        handle,
        size: rect.w * rect.h * 4,
        stride: rect.w * 4,
    }
}

fn answer(request: &Message, state: &mut ServerState, behaviour: &Mutex<Behaviour>) -> Option<Message> {
    let reply_kind = request.kind.reply_kind()?;
    let mut reply = Message::reply_to(request, reply_kind, Payload::Empty);
    let id = request.src;

    match request.kind {
        MessageKind::WinCreate | MessageKind::DialogCreate | MessageKind::MenuFrameCreate => {
            if let Some(errno) = behaviour.lock().unwrap().fail_next_create.take() {
                reply.valid = false;
                reply.payload = Payload::Error(errno);
                return Some(reply);
            }
            let win = *request.window()?;
            let handle = state.next_handle;
            state.next_handle += 1;
            state.handles.insert(id, handle);
            state.rects.insert(id, win.rect);
            reply.payload = Payload::Window(WindowPayload {
                rect: win.rect,
                flags: win.flags,
                canvas: canvas_for(win.rect, handle),
            });
        }
        MessageKind::WinResizeAccept | MessageKind::WinNewCanvas => {
            let win = *request.window()?;
            let keep = request.kind == MessageKind::WinResizeAccept
                && behaviour.lock().unwrap().resize_keeps_handle;
            let handle = match state.handles.get(&id) {
                Some(&handle) if keep => handle,
                _ => {
                    let handle = state.next_handle;
                    state.next_handle += 1;
                    handle
                }
            };
            state.handles.insert(id, handle);
            state.rects.insert(id, win.rect);
            reply.payload = Payload::Window(WindowPayload {
                rect: win.rect,
                flags: 0,
                canvas: canvas_for(win.rect, handle),
            });
        }
        MessageKind::WinGetAttribs => {
            let rect = state.rects.get(&id).copied().unwrap_or_default();
            reply.payload = Payload::Window(WindowPayload {
                rect,
                flags: WindowFlags::VISIBLE.bits(),
                canvas: CanvasInfo::default(),
            });
        }
        MessageKind::ResourceLoad => {
            let id = state.next_resource;
            state.next_resource += 1;
            reply.payload = Payload::Resource(ResourcePayload {
                id,
                size: request.data.len() as u32,
            });
        }
        MessageKind::ResourceGet => {
            let res = *request.resource()?;
            reply.payload = Payload::Resource(res);
            reply.data = format!("resource-{}", res.id).into_bytes();
        }
        MessageKind::ClipboardSet => {
            let clip = *request.clipboard()?;
            state.clipboard.insert(clip.format, request.data.clone());
            reply.payload = Payload::Clipboard(clip);
        }
        MessageKind::ClipboardQuery | MessageKind::ClipboardGet => {
            let clip = *request.clipboard()?;
            let data = state.clipboard.get(&clip.format).cloned().unwrap_or_default();
            reply.payload = Payload::Clipboard(ClipboardPayload {
                format: clip.format,
                size: data.len() as u32,
            });
            if request.kind == MessageKind::ClipboardGet {
                reply.data = data;
            }
        }
        MessageKind::ColorPaletteGet => {
            let palette = behaviour.lock().unwrap().palette.clone();
            let mut data = vec![0u8; palette.len() * 4];
            NativeEndian::write_u32_into(&palette, &mut data);
            reply.data = data;
        }
        _ => {}
    }
    Some(reply)
}

/// Shared memory backed by the heap, logging "attach N" / "detach N"
#[derive(Clone, Default)]
pub struct RecordingShm {
    pub log: Arc<Mutex<Vec<String>>>,
}

struct RecordingSegment {
    handle: u32,
    bytes: Vec<u8>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Segment for RecordingSegment {
    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for RecordingSegment {
    fn drop(&mut self) {
        self.log.lock().unwrap().push(format!("detach {}", self.handle));
    }
}

impl SharedMemory for RecordingShm {
    fn attach(&self, info: &CanvasInfo) -> ClientResult<Box<dyn Segment>> {
        self.log.lock().unwrap().push(format!("attach {}", info.handle));
        Ok(Box::new(RecordingSegment {
            handle: info.handle,
            bytes: vec![0u8; info.size as usize],
            log: self.log.clone(),
        }))
    }
}

impl RecordingShm {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// A client wired to a fresh fake server
pub fn connect() -> (Client, FakeServer, RecordingShm) {
    init_logging();
    let (ours, theirs) = UnixDatagram::pair().unwrap();
    let server = FakeServer::spawn(theirs);
    let shm = RecordingShm::default();
    let transport = UnixTransport::from_socket(ours).unwrap();
    let client = Client::with_transport(
        ClientConfig::testing(),
        Box::new(transport),
        Box::new(shm.clone()),
    );
    (client, server, shm)
}

/// Widget logging its pointer and focus hooks as "name:event"
pub struct Recorder {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn boxed(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Widget> {
        Box::new(Recorder {
            name,
            log: log.clone(),
        })
    }

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
        false
    }
    fn destroy(&mut self) {
        self.push("destroy".to_string());
    }
}

/// A pointer sample addressed to `window`
pub fn pointer(window: WinId, x: i32, y: i32, buttons: MouseButtons) -> Message {
    Message::new(
        MessageKind::MouseMotion,
        WinId::ROOT,
        window,
        Payload::Mouse(MousePayload {
            x,
            y,
            buttons,
            modifiers: KeyModifiers::NONE,
        }),
    )
}

pub fn key(window: WinId, code: u32, modifiers: KeyModifiers) -> Message {
    Message::new(
        MessageKind::KeyPress,
        WinId::ROOT,
        window,
        Payload::Key(KeyPayload { code, modifiers }),
    )
}
