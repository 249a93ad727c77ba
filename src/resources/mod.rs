//! Resource tracking
//!
//! Remembers the server-side objects this client created (top-level
//! windows, dialogs and loaded resources) so they can be released in order
//! when the client shuts down.

use crate::protocol::WinId;
use std::collections::HashMap;

/// A loaded resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub name: String,
    pub size: u32,
}

/// Teardown action produced when releasing everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupRequest {
    DestroyWindow(WinId),
    UnloadResource(u32),
}

/// Tracks server-side objects created by this client
#[derive(Debug, Default)]
pub struct ResourceTracker {
    /// Root windows in creation order
    windows: Vec<WinId>,

    /// Loaded resources by id
    resources: HashMap<u32, ResourceEntry>,
}

impl ResourceTracker {
    /// Create a new resource tracker
    pub fn new() -> Self {
        ResourceTracker::default()
    }

    /// Record a root window after the server acknowledged it
    pub fn track_window(&mut self, id: WinId) {
        if !self.windows.contains(&id) {
            self.windows.push(id);
        }
    }

    /// Forget a destroyed window. Returns whether it was tracked.
    pub fn untrack_window(&mut self, id: WinId) -> bool {
        match self.windows.iter().position(|w| *w == id) {
            Some(pos) => {
                self.windows.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Record a resource returned by a load request
    pub fn track_resource(&mut self, id: u32, name: &str, size: u32) {
        let previous = self.resources.insert(
            id,
            ResourceEntry {
                name: name.to_string(),
                size,
            },
        );
        if let Some(previous) = previous {
            log::warn!("Resource {} reloaded (was {})", id, previous.name);
        }
    }

    /// Forget an unloaded resource. Returns whether it was tracked.
    pub fn untrack_resource(&mut self, id: u32) -> bool {
        self.resources.remove(&id).is_some()
    }

    /// Get a tracked resource
    pub fn resource(&self, id: u32) -> Option<&ResourceEntry> {
        self.resources.get(&id)
    }

    /// Root windows in creation order
    pub fn windows(&self) -> &[WinId] {
        &self.windows
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty() && self.resources.is_empty()
    }

    /// Everything still alive, as cleanup requests: windows newest first,
    /// then resources by id. The tracker is left empty.
    pub fn release_all(&mut self) -> Vec<CleanupRequest> {
        let mut cleanup_requests: Vec<CleanupRequest> = self
            .windows
            .drain(..)
            .rev()
            .map(CleanupRequest::DestroyWindow)
            .collect();

        let mut ids: Vec<u32> = self.resources.drain().map(|(id, _)| id).collect();
        ids.sort_unstable();
        cleanup_requests.extend(ids.into_iter().map(CleanupRequest::UnloadResource));

        cleanup_requests
    }
}
