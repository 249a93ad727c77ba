//! Modal dialogs
//!
//! A dialog is a server window with an owner. [`Client::run_dialog`] pumps
//! only the dialog's own messages until the server closes it or another
//! thread trips its [`CloseSignal`].

use super::Client;
use crate::error::ClientResult;
use crate::protocol::*;
use crate::sync::CloseSignal;
use crate::window::{Container, Widget};
use std::sync::Arc;

/// Handle to a created dialog
#[derive(Debug, Clone)]
pub struct Dialog {
    pub id: WinId,
    pub owner: WinId,
    signal: Arc<CloseSignal>,
}

impl Dialog {
    /// Signal another thread can use to end [`Client::run_dialog`]
    pub fn closer(&self) -> Arc<CloseSignal> {
        self.signal.clone()
    }
}

/// Why a dialog loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogEnd {
    /// The server sent `WinClosing` for the dialog
    Closed,
    /// The close signal was tripped
    Signalled,
}

impl Client {
    pub fn create_dialog(
        &self,
        owner: WinId,
        title: &str,
        rect: Rect,
        flags: WindowFlags,
    ) -> ClientResult<Dialog> {
        self.create_dialog_with(owner, title, rect, flags, Box::new(Container))
    }

    pub fn create_dialog_with(
        &self,
        owner: WinId,
        title: &str,
        rect: Rect,
        flags: WindowFlags,
        widget: Box<dyn Widget>,
    ) -> ClientResult<Dialog> {
        let id = self.create(
            WindowKind::Dialog,
            MessageKind::DialogCreate,
            owner,
            title,
            rect,
            flags,
            widget,
        )?;
        Ok(Dialog {
            id,
            owner,
            signal: Arc::new(CloseSignal::new()),
        })
    }

    /// Show the dialog and re-arm its close signal for the next
    /// [`Client::run_dialog`]
    pub fn show_dialog(&self, dialog: &Dialog) -> ClientResult<()> {
        self.send_oneway(MessageKind::DialogShow, dialog.id, Payload::Empty)?;
        dialog.signal.reset();
        if let Some(w) = self.tree.lock().get_mut(dialog.id) {
            w.flags.insert(WindowFlags::VISIBLE);
        }
        Ok(())
    }

    pub fn hide_dialog(&self, dialog: &Dialog) -> ClientResult<()> {
        self.send_oneway(MessageKind::DialogHide, dialog.id, Payload::Empty)?;
        if let Some(w) = self.tree.lock().get_mut(dialog.id) {
            w.flags.remove(WindowFlags::VISIBLE);
        }
        Ok(())
    }

    /// Dispatch the dialog's messages until it is closed
    pub fn run_dialog(&self, dialog: &Dialog) -> ClientResult<DialogEnd> {
        loop {
            if dialog.signal.is_closed() {
                return Ok(DialogEnd::Signalled);
            }
            let msg = self
                .conn
                .next(Some(dialog.id), SEQ_ANY, false)
                .map_err(|e| self.fail(e))?;
            match msg {
                Some(msg) if msg.kind == MessageKind::WinClosing => {
                    log::debug!("Dialog {} closed by the server", dialog.id);
                    return Ok(DialogEnd::Closed);
                }
                Some(msg) => self.dispatch(&msg),
                None => {
                    dialog.signal.wait_timeout(self.config.poll_interval);
                }
            }
        }
    }

    /// Destroy the dialog window
    pub fn close_dialog(&self, dialog: Dialog) {
        dialog.signal.close();
        self.destroy(dialog.id);
    }
}
