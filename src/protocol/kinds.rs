//! Message kinds
//!
//! Requests flow from the client to the server, events flow the other way.
//! Both share one numbering space; direction is implied by the kind.

/// Shape of the payload union for a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Empty,
    Window,
    Mouse,
    Key,
    Menu,
    Resource,
    Clipboard,
    Error,
}

macro_rules! define_kinds {
    ($($name:ident = $code:literal => $shape:ident,)*) => {
        /// Message kind codes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum MessageKind {
            $($name = $code,)*
        }

        impl MessageKind {
            pub fn from_u32(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(MessageKind::$name),)*
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MessageKind::$name => stringify!($name),)*
                }
            }

            /// Which member of the payload union is active for this kind
            pub fn payload_shape(&self) -> PayloadShape {
                match self {
                    $(MessageKind::$name => PayloadShape::$shape,)*
                }
            }
        }
    };
}

define_kinds! {
    // Requests
    WinCreate = 0x001 => Window,
    WinDestroy = 0x002 => Empty,
    WinShow = 0x003 => Empty,
    WinHide = 0x004 => Empty,
    WinRaise = 0x005 => Empty,
    WinMaximize = 0x006 => Empty,
    WinMinimize = 0x007 => Empty,
    WinRestore = 0x008 => Empty,
    WinResize = 0x009 => Window,
    WinResizeAccept = 0x00a => Window,
    WinResizeFinalize = 0x00b => Window,
    WinSetPosition = 0x00c => Window,
    WinSetTitle = 0x00d => Empty,
    WinSetIcon = 0x00e => Window,
    WinSetAttribs = 0x00f => Window,
    WinGetAttribs = 0x010 => Empty,
    WinInvalidate = 0x011 => Window,
    WinNewCanvas = 0x012 => Window,
    WinDestroyCanvas = 0x013 => Window,
    WinEnterFullscreen = 0x014 => Empty,
    WinExitFullscreen = 0x015 => Empty,
    MouseGrab = 0x020 => Empty,
    MouseUngrab = 0x021 => Empty,
    KeyboardGrab = 0x022 => Empty,
    KeyboardUngrab = 0x023 => Empty,
    MenuFrameCreate = 0x030 => Window,
    MenuFrameShow = 0x031 => Window,
    MenuFrameHide = 0x032 => Empty,
    DialogCreate = 0x040 => Window,
    DialogShow = 0x041 => Empty,
    DialogHide = 0x042 => Empty,
    ResourceLoad = 0x050 => Resource,
    ResourceGet = 0x051 => Resource,
    ResourceUnload = 0x052 => Resource,
    ClipboardSet = 0x060 => Clipboard,
    ClipboardGet = 0x061 => Clipboard,
    ClipboardQuery = 0x062 => Clipboard,
    ColorPaletteGet = 0x070 => Empty,

    // Events
    WinCreated = 0x101 => Window,
    DialogCreated = 0x102 => Window,
    MenuFrameCreated = 0x103 => Window,
    WinShown = 0x104 => Empty,
    WinHidden = 0x105 => Empty,
    WinRaised = 0x106 => Empty,
    WinLowered = 0x107 => Empty,
    ResizeOffer = 0x108 => Window,
    ResizeConfirm = 0x109 => Window,
    PositionChanged = 0x10a => Window,
    FocusGained = 0x10b => Empty,
    FocusLost = 0x10c => Empty,
    WinClosing = 0x10d => Empty,
    WinAttribs = 0x10e => Window,
    WinState = 0x10f => Window,
    NewCanvas = 0x110 => Window,
    MouseMotion = 0x120 => Mouse,
    MouseEnter = 0x121 => Mouse,
    MouseExit = 0x122 => Mouse,
    KeyPress = 0x130 => Key,
    KeyRelease = 0x131 => Key,
    MenuSelected = 0x140 => Menu,
    ResourceLoaded = 0x150 => Resource,
    ResourceData = 0x151 => Resource,
    GrabAck = 0x160 => Empty,
    ClipboardSetAck = 0x170 => Clipboard,
    ClipboardData = 0x171 => Clipboard,
    ClipboardHasData = 0x172 => Clipboard,
    ColorPaletteData = 0x180 => Empty,
    Error = 0x1ff => Error,
}

impl MessageKind {
    /// Client-to-server kinds
    pub fn is_request(&self) -> bool {
        (*self as u32) < 0x100
    }

    /// Replies consumed by library internals. These are hidden from the
    /// general-purpose event loop and only handed out to a caller that
    /// names their sequence id.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            MessageKind::WinCreated
                | MessageKind::DialogCreated
                | MessageKind::MenuFrameCreated
                | MessageKind::ResizeConfirm
                | MessageKind::WinAttribs
                | MessageKind::NewCanvas
                | MessageKind::ResourceLoaded
                | MessageKind::ResourceData
                | MessageKind::GrabAck
                | MessageKind::ClipboardSetAck
                | MessageKind::ClipboardData
                | MessageKind::ClipboardHasData
                | MessageKind::ColorPaletteData
        )
    }

    /// The reply kind a blocking request waits for
    pub fn reply_kind(&self) -> Option<MessageKind> {
        match self {
            MessageKind::WinCreate => Some(MessageKind::WinCreated),
            MessageKind::DialogCreate => Some(MessageKind::DialogCreated),
            MessageKind::MenuFrameCreate => Some(MessageKind::MenuFrameCreated),
            MessageKind::WinResizeAccept => Some(MessageKind::ResizeConfirm),
            MessageKind::WinGetAttribs => Some(MessageKind::WinAttribs),
            MessageKind::WinNewCanvas => Some(MessageKind::NewCanvas),
            MessageKind::ResourceLoad => Some(MessageKind::ResourceLoaded),
            MessageKind::ResourceGet => Some(MessageKind::ResourceData),
            MessageKind::MouseGrab | MessageKind::KeyboardGrab => Some(MessageKind::GrabAck),
            MessageKind::ClipboardSet => Some(MessageKind::ClipboardSetAck),
            MessageKind::ClipboardGet => Some(MessageKind::ClipboardData),
            MessageKind::ClipboardQuery => Some(MessageKind::ClipboardHasData),
            MessageKind::ColorPaletteGet => Some(MessageKind::ColorPaletteData),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_round_trip() {
        assert_eq!(MessageKind::from_u32(0x101), Some(MessageKind::WinCreated));
        assert_eq!(MessageKind::from_u32(0xdead), None);
    }

    #[test]
    fn test_every_reply_kind_is_internal() {
        for code in 0..0x100 {
            if let Some(request) = MessageKind::from_u32(code) {
                assert!(request.is_request());
                if let Some(reply) = request.reply_kind() {
                    assert!(reply.is_internal(), "{} should be internal", reply);
                }
            }
        }
    }

    #[test]
    fn test_notifications_are_not_internal() {
        assert!(!MessageKind::MouseMotion.is_internal());
        assert!(!MessageKind::ResizeOffer.is_internal());
        assert!(!MessageKind::MenuSelected.is_internal());
        assert!(!MessageKind::Error.is_internal());
    }
}
