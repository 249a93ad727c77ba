//! Message codec
//!
//! Every message shares a 32-byte header and a 48-byte payload union. The
//! variable-length form appends a `u32` length and that many bytes; the
//! receiver tells the two apart by datagram length.

use super::*;
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Window geometry, flags and canvas descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowPayload {
    pub rect: Rect,
    pub flags: u32,
    pub canvas: CanvasInfo,
}

/// Shared-memory canvas descriptor as sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanvasInfo {
    /// Segment handle, 0 when no canvas is attached
    pub handle: u32,
    /// Segment size in bytes
    pub size: u32,
    /// Bytes per row
    pub stride: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MousePayload {
    pub x: i32,
    pub y: i32,
    pub buttons: MouseButtons,
    pub modifiers: KeyModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPayload {
    pub code: u32,
    pub modifiers: KeyModifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuPayload {
    pub menu_id: u32,
    pub entry_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourcePayload {
    pub id: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClipboardPayload {
    pub format: u32,
    pub size: u32,
}

/// Payload union. The active member is determined by the message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Window(WindowPayload),
    Mouse(MousePayload),
    Key(KeyPayload),
    Menu(MenuPayload),
    Resource(ResourcePayload),
    Clipboard(ClipboardPayload),
    Error(i32),
}

/// One protocol message, request or event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub seqid: u32,
    pub src: WinId,
    pub dest: WinId,
    pub valid: bool,
    pub payload: Payload,
    /// Trailing buffer of the variable-length form (titles, icons, blobs)
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageKind, src: WinId, dest: WinId, payload: Payload) -> Self {
        Message {
            kind,
            seqid: SEQ_NONE,
            src,
            dest,
            valid: true,
            payload,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Reply to `request`, carrying its sequence id back
    pub fn reply_to(request: &Message, kind: MessageKind, payload: Payload) -> Self {
        Message {
            kind,
            seqid: request.seqid,
            src: request.dest,
            dest: request.src,
            valid: true,
            payload,
            data: Vec::new(),
        }
    }

    /// Error reply to `request` in the explicit form
    pub fn error_reply(request: &Message, code: i32) -> Self {
        Message::reply_to(request, MessageKind::Error, Payload::Error(code))
    }

    /// Whether the general-purpose event loop must skip this message
    pub fn is_internal(&self) -> bool {
        self.kind.is_internal() || (self.kind == MessageKind::Error && self.seqid != SEQ_NONE)
    }

    /// Error code if this message is an error in either form
    pub fn error_code(&self) -> Option<i32> {
        match self.payload {
            Payload::Error(code) if self.kind == MessageKind::Error || !self.valid => Some(code),
            _ => None,
        }
    }

    /// Rewrite an implicitly-invalid reply into the explicit error kind
    pub fn normalize(&mut self) {
        if !self.valid {
            let code = self.error_code().unwrap_or(0);
            self.kind = MessageKind::Error;
            self.payload = Payload::Error(code);
            self.valid = true;
        }
    }

    pub fn window(&self) -> Option<&WindowPayload> {
        match &self.payload {
            Payload::Window(w) => Some(w),
            _ => None,
        }
    }

    pub fn mouse(&self) -> Option<&MousePayload> {
        match &self.payload {
            Payload::Mouse(m) => Some(m),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&KeyPayload> {
        match &self.payload {
            Payload::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn menu(&self) -> Option<&MenuPayload> {
        match &self.payload {
            Payload::Menu(m) => Some(m),
            _ => None,
        }
    }

    pub fn resource(&self) -> Option<&ResourcePayload> {
        match &self.payload {
            Payload::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn clipboard(&self) -> Option<&ClipboardPayload> {
        match &self.payload {
            Payload::Clipboard(c) => Some(c),
            _ => None,
        }
    }

    /// Encoded length in bytes
    pub fn wire_len(&self) -> usize {
        if self.data.is_empty() {
            FIXED_MESSAGE_LEN
        } else {
            FIXED_MESSAGE_LEN + 4 + self.data.len()
        }
    }

    /// Encode to wire format
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        if self.wire_len() > MAX_MESSAGE_LEN {
            return Err(ProtocolError::TooLarge {
                len: self.data.len(),
            });
        }

        let mut buffer = Vec::with_capacity(self.wire_len());
        // Writes into a Vec cannot fail.
        let _ = self.write_fixed(&mut buffer);
        if !self.data.is_empty() {
            let _ = buffer.write_u32::<NativeEndian>(self.data.len() as u32);
            buffer.extend_from_slice(&self.data);
        }
        Ok(buffer)
    }

    fn write_fixed<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<NativeEndian>(self.kind as u32)?;
        w.write_u32::<NativeEndian>(self.seqid)?;
        w.write_u64::<NativeEndian>(self.src.get())?;
        w.write_u64::<NativeEndian>(self.dest.get())?;
        w.write_i32::<NativeEndian>(if self.valid { 1 } else { 0 })?;
        w.write_u32::<NativeEndian>(0)?; // Reserved

        let mut payload = [0u8; PAYLOAD_LEN];
        let mut p = Cursor::new(&mut payload[..]);
        match &self.payload {
            Payload::Empty => {}
            Payload::Window(win) => {
                p.write_i32::<NativeEndian>(win.rect.x)?;
                p.write_i32::<NativeEndian>(win.rect.y)?;
                p.write_u32::<NativeEndian>(win.rect.w)?;
                p.write_u32::<NativeEndian>(win.rect.h)?;
                p.write_u32::<NativeEndian>(win.flags)?;
                p.write_u32::<NativeEndian>(win.canvas.handle)?;
                p.write_u32::<NativeEndian>(win.canvas.size)?;
                p.write_u32::<NativeEndian>(win.canvas.stride)?;
            }
            Payload::Mouse(m) => {
                p.write_i32::<NativeEndian>(m.x)?;
                p.write_i32::<NativeEndian>(m.y)?;
                p.write_u32::<NativeEndian>(m.buttons.bits())?;
                p.write_u32::<NativeEndian>(m.modifiers.bits())?;
            }
            Payload::Key(k) => {
                p.write_u32::<NativeEndian>(k.code)?;
                p.write_u32::<NativeEndian>(k.modifiers.bits())?;
            }
            Payload::Menu(m) => {
                p.write_u32::<NativeEndian>(m.menu_id)?;
                p.write_u32::<NativeEndian>(m.entry_id)?;
            }
            Payload::Resource(r) => {
                p.write_u32::<NativeEndian>(r.id)?;
                p.write_u32::<NativeEndian>(r.size)?;
            }
            Payload::Clipboard(c) => {
                p.write_u32::<NativeEndian>(c.format)?;
                p.write_u32::<NativeEndian>(c.size)?;
            }
            Payload::Error(code) => {
                p.write_i32::<NativeEndian>(*code)?;
            }
        }
        w.write_all(&payload)
    }

    /// Decode one datagram
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Message> {
        if bytes.len() < FIXED_MESSAGE_LEN {
            return Err(ProtocolError::ShortMessage { len: bytes.len() });
        }
        let short = |_| ProtocolError::ShortMessage { len: bytes.len() };

        let mut r = Cursor::new(bytes);
        let raw_kind = r.read_u32::<NativeEndian>().map_err(short)?;
        let kind = MessageKind::from_u32(raw_kind).ok_or(ProtocolError::UnknownKind(raw_kind))?;
        let seqid = r.read_u32::<NativeEndian>().map_err(short)?;
        let src = WinId(r.read_u64::<NativeEndian>().map_err(short)?);
        let dest = WinId(r.read_u64::<NativeEndian>().map_err(short)?);
        let valid = r.read_i32::<NativeEndian>().map_err(short)? != 0;
        let _reserved = r.read_u32::<NativeEndian>().map_err(short)?;

        let mut raw_payload = [0u8; PAYLOAD_LEN];
        r.read_exact(&mut raw_payload).map_err(short)?;
        let payload = if valid {
            decode_payload(kind.payload_shape(), &raw_payload).map_err(short)?
        } else {
            decode_payload(PayloadShape::Error, &raw_payload).map_err(short)?
        };

        let mut data = Vec::new();
        if bytes.len() > FIXED_MESSAGE_LEN {
            let declared = r.read_u32::<NativeEndian>().map_err(|_| ProtocolError::BadLength {
                declared: 4,
                available: bytes.len() - FIXED_MESSAGE_LEN,
            })? as usize;
            let available = bytes.len() - FIXED_MESSAGE_LEN - 4;
            if declared > available {
                return Err(ProtocolError::BadLength {
                    declared,
                    available,
                });
            }
            data = vec![0u8; declared];
            r.read_exact(&mut data).map_err(short)?;
        }

        Ok(Message {
            kind,
            seqid,
            src,
            dest,
            valid,
            payload,
            data,
        })
    }
}

fn decode_payload(shape: PayloadShape, raw: &[u8; PAYLOAD_LEN]) -> std::io::Result<Payload> {
    let mut p = Cursor::new(&raw[..]);
    Ok(match shape {
        PayloadShape::Empty => Payload::Empty,
        PayloadShape::Window => {
            let x = p.read_i32::<NativeEndian>()?;
            let y = p.read_i32::<NativeEndian>()?;
            let w = p.read_u32::<NativeEndian>()?;
            let h = p.read_u32::<NativeEndian>()?;
            let flags = p.read_u32::<NativeEndian>()?;
            let canvas = CanvasInfo {
                handle: p.read_u32::<NativeEndian>()?,
                size: p.read_u32::<NativeEndian>()?,
                stride: p.read_u32::<NativeEndian>()?,
            };
            Payload::Window(WindowPayload {
                rect: Rect::new(x, y, w, h),
                flags,
                canvas,
            })
        }
        PayloadShape::Mouse => Payload::Mouse(MousePayload {
            x: p.read_i32::<NativeEndian>()?,
            y: p.read_i32::<NativeEndian>()?,
            buttons: MouseButtons(p.read_u32::<NativeEndian>()?),
            modifiers: KeyModifiers(p.read_u32::<NativeEndian>()?),
        }),
        PayloadShape::Key => Payload::Key(KeyPayload {
            code: p.read_u32::<NativeEndian>()?,
            modifiers: KeyModifiers(p.read_u32::<NativeEndian>()?),
        }),
        PayloadShape::Menu => Payload::Menu(MenuPayload {
            menu_id: p.read_u32::<NativeEndian>()?,
            entry_id: p.read_u32::<NativeEndian>()?,
        }),
        PayloadShape::Resource => Payload::Resource(ResourcePayload {
            id: p.read_u32::<NativeEndian>()?,
            size: p.read_u32::<NativeEndian>()?,
        }),
        PayloadShape::Clipboard => Payload::Clipboard(ClipboardPayload {
            format: p.read_u32::<NativeEndian>()?,
            size: p.read_u32::<NativeEndian>()?,
        }),
        PayloadShape::Error => Payload::Error(p.read_i32::<NativeEndian>()?),
    })
}
