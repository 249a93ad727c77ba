/// wsclient - client runtime for a shared-memory window server
///
/// This library speaks the fixed-format datagram protocol of the display
/// server, keeps the composition tree of windows and widgets, maps their
/// shared-memory canvases, and drives pointer, keyboard and menu input.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod menu;
pub mod pool;
pub mod protocol;
pub mod resources;
pub mod sync;
pub mod window;

pub use client::{Client, Dialog, DialogEnd, WindowAttributes};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use menu::{MenuBar, MenuItemKind, MenuSelection};
pub use protocol::{Message, MessageKind, Rect, WinId, WindowFlags};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
