//! Core protocol types
//!
//! These types represent the fundamental values carried by window server
//! messages. They are kept minimal and close to the wire protocol.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Window identifier: owning process id in the high half, a per-client
/// counter in the low half. Globally unique across clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct WinId(pub u64);

impl WinId {
    /// The desktop. Used as the owner of top-level windows.
    pub const ROOT: WinId = WinId(0);

    pub fn new(pid: u32, counter: u32) -> Self {
        WinId(((pid as u64) << 32) | counter as u64)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn pid(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn counter(&self) -> u32 {
        self.0 as u32
    }

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid(), self.counter())
    }
}

/// Rectangle in parent-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Rect { x, y, w, h }
    }

    /// Exclusive right edge, clamped to `i32::MAX`
    pub fn right(&self) -> i32 {
        self.x.saturating_add(i32::try_from(self.w).unwrap_or(i32::MAX))
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(i32::try_from(self.h).unwrap_or(i32::MAX))
    }

    /// Point containment, half-open on the right and bottom edges
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(x, y, r.abs_diff(x), b.abs_diff(y))
    }
}

macro_rules! define_flags {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $value:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name($value);)*

            pub fn bits(&self) -> u32 {
                self.0
            }

            pub fn contains(&self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(&self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: $name, on: bool) {
                if on {
                    self.insert(other)
                } else {
                    self.remove(other)
                }
            }
        }

        impl BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }

        impl Not for $name {
            type Output = $name;
            fn not(self) -> $name {
                $name(!self.0)
            }
        }
    };
}

pub(crate) use define_flags;

define_flags!(
    /// Window flags shared with the server
    WindowFlags {
        VISIBLE = 1 << 0,
        NO_DECORATION = 1 << 1,
        NO_RESIZE = 1 << 2,
        ALWAYS_ON_TOP = 1 << 3,
        SKIP_TASKBAR = 1 << 4,
        NO_MINIMIZE = 1 << 5,
        NO_MAXIMIZE = 1 << 6,
        FULLSCREEN = 1 << 7,
        MAXIMIZED = 1 << 8,
        MINIMIZED = 1 << 9,
        /// Excluded from the tab cycle. Never sent to the server.
        NO_FOCUS = 1 << 16,
        /// Local focus state. Never sent to the server.
        FOCUSED = 1 << 17,
    }
);

define_flags!(
    /// Pointer button bitmask
    MouseButtons {
        LEFT = 1 << 0,
        RIGHT = 1 << 1,
        MIDDLE = 1 << 2,
    }
);

define_flags!(
    /// Keyboard modifier mask
    KeyModifiers {
        SHIFT = 1 << 0,
        CTRL = 1 << 1,
        ALT = 1 << 2,
        SUPER = 1 << 3,
    }
);

impl WindowFlags {
    /// Bits that only have meaning inside this process
    pub const LOCAL_MASK: WindowFlags = WindowFlags(Self::NO_FOCUS.0 | Self::FOCUSED.0);

    pub fn wire_bits(&self) -> u32 {
        self.0 & !Self::LOCAL_MASK.0
    }
}

/// Kind of a node in the window tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    TopLevel,
    Dialog,
    MenuFrame,
    Widget,
}

impl WindowKind {
    /// Whether the server knows about this node and backs it with a canvas
    pub fn has_canvas(&self) -> bool {
        !matches!(self, WindowKind::Widget)
    }
}

/// Key codes understood by the dispatch layer. Printable keys use their
/// lowercase ASCII value.
pub mod keys {
    pub const KEY_BACKSPACE: u32 = 0x08;
    pub const KEY_TAB: u32 = 0x09;
    pub const KEY_ENTER: u32 = 0x0d;
    pub const KEY_ESC: u32 = 0x1b;
    pub const KEY_SPACE: u32 = 0x20;
    pub const KEY_UP: u32 = 0x100;
    pub const KEY_DOWN: u32 = 0x101;
    pub const KEY_LEFT: u32 = 0x102;
    pub const KEY_RIGHT: u32 = 0x103;
    pub const KEY_HOME: u32 = 0x104;
    pub const KEY_END: u32 = 0x105;
    pub const KEY_F10: u32 = 0x11a;
}

/// A key event as seen by widgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub code: u32,
    pub modifiers: KeyModifiers,
}

impl KeyPress {
    pub fn new(code: u32, modifiers: KeyModifiers) -> Self {
        KeyPress { code, modifiers }
    }

    pub fn plain(code: u32) -> Self {
        KeyPress::new(code, KeyModifiers::NONE)
    }

    /// Lowercase character for printable keys
    pub fn as_char(&self) -> Option<char> {
        char::from_u32(self.code)
            .filter(|c| c.is_ascii_graphic())
            .map(|c| c.to_ascii_lowercase())
    }
}
