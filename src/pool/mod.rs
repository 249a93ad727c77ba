//! Object pools
//!
//! Fixed-capacity free-lists of list nodes, list headers and rectangle
//! lists. Released containers are cleared and kept for reuse (their backing
//! storage included) instead of being freed, so steady-state operation
//! allocates nothing. A pool only allocates when its free-list is empty.

use crate::config::ClientConfig;
use crate::protocol::{Message, Rect, WinId};
use crate::sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Containers that can be cleared for reuse
pub trait Recycle {
    fn recycle(&mut self);
}

/// A free-list of boxed containers
pub struct Pool<T> {
    name: &'static str,
    free: SpinLock<Vec<Box<T>>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl<T: Default + Recycle> Pool<T> {
    pub fn new(name: &'static str, capacity: usize, prefill: usize) -> Self {
        let prefill = prefill.min(capacity);
        let free = (0..prefill).map(|_| Box::<T>::default()).collect::<Vec<_>>();
        Pool {
            name,
            free: SpinLock::new(free),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Take a cleared container, allocating only if the free-list is empty
    pub fn get(&self) -> Box<T> {
        let item = self.free.lock().pop();
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        item.unwrap_or_else(|| {
            log::trace!("pool {}: free-list empty, allocating", self.name);
            Box::default()
        })
    }

    /// Return a container to the free-list
    pub fn put(&self, mut item: Box<T>) {
        item.recycle();
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        } else {
            log::trace!("pool {}: at capacity, dropping entry", self.name);
        }
    }

    /// Entries sitting in the free-list
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Entries handed out and not yet returned
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Queue entry owning one message
#[derive(Debug)]
pub struct ListNode<T> {
    pub value: Option<T>,
}

impl<T> Default for ListNode<T> {
    fn default() -> Self {
        ListNode { value: None }
    }
}

impl<T> Recycle for ListNode<T> {
    fn recycle(&mut self) {
        self.value = None;
    }
}

/// Ordered list header
#[derive(Debug)]
pub struct List<T> {
    pub items: Vec<T>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        List { items: Vec::new() }
    }
}

impl<T> Recycle for List<T> {
    fn recycle(&mut self) {
        self.items.clear();
    }
}

impl<T: PartialEq> List<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Remove `item`, keeping the order of the rest
    pub fn remove(&mut self, item: &T) -> bool {
        match self.items.iter().position(|i| i == item) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

/// Dirty-rectangle list. Overlapping rectangles are merged on insert.
#[derive(Debug, Default)]
pub struct RectList {
    rects: Vec<Rect>,
}

impl Recycle for RectList {
    fn recycle(&mut self) {
        self.rects.clear();
    }
}

impl RectList {
    pub fn add(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut merged = rect;
        loop {
            match self.rects.iter().position(|r| r.intersects(&merged)) {
                Some(pos) => {
                    let r = self.rects.swap_remove(pos);
                    merged = merged.union(&r);
                }
                None => break,
            }
        }
        self.rects.push(merged);
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Move all rectangles out, leaving the list empty
    pub fn take(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.rects)
    }
}

/// Free-list population at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub nodes: usize,
    pub lists: usize,
    pub rects: usize,
}

/// The three process-wide pools
pub struct Pools {
    pub nodes: Pool<ListNode<Message>>,
    pub lists: Pool<List<WinId>>,
    pub rects: Pool<RectList>,
}

impl Pools {
    pub fn new(config: &ClientConfig) -> Self {
        Pools {
            nodes: Pool::new("nodes", config.pool_capacity, config.pool_prefill),
            lists: Pool::new("lists", config.pool_capacity, config.pool_prefill),
            rects: Pool::new("rects", config.pool_capacity, config.pool_prefill),
        }
    }

    /// Free-list sizes
    pub fn available(&self) -> PoolStats {
        PoolStats {
            nodes: self.nodes.available(),
            lists: self.lists.available(),
            rects: self.rects.available(),
        }
    }

    /// Entries currently handed out
    pub fn outstanding(&self) -> PoolStats {
        PoolStats {
            nodes: self.nodes.outstanding(),
            lists: self.lists.outstanding(),
            rects: self.rects.outstanding(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_put_reuse_entries() {
        let pool: Pool<List<WinId>> = Pool::new("test", 4, 2);
        assert_eq!(pool.available(), 2);

        let mut a = pool.get();
        a.push(WinId(1));
        let b = pool.get();
        let c = pool.get(); // free-list empty, fresh allocation
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.outstanding(), 3);

        pool.put(a);
        pool.put(b);
        pool.put(c);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.outstanding(), 0);

        // Recycled entries come back cleared
        assert!(pool.get().is_empty());
    }

    #[test]
    fn test_capacity_bounds_free_list() {
        let pool: Pool<RectList> = Pool::new("test", 1, 1);
        let a = pool.get();
        let b = pool.get();
        pool.put(a);
        pool.put(b);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_list_remove_keeps_order() {
        let mut list = List::default();
        for i in 1..=4 {
            list.push(WinId(i));
        }
        assert!(list.remove(&WinId(2)));
        assert!(!list.remove(&WinId(9)));
        assert_eq!(list.items, vec![WinId(1), WinId(3), WinId(4)]);
    }

    #[test]
    fn test_rect_list_merges_overlaps() {
        let mut dirty = RectList::default();
        dirty.add(Rect::new(0, 0, 10, 10));
        dirty.add(Rect::new(50, 50, 5, 5));
        dirty.add(Rect::new(5, 5, 10, 10));
        dirty.add(Rect::new(0, 0, 0, 10));
        assert_eq!(dirty.rects().len(), 2);
        assert!(dirty.rects().contains(&Rect::new(0, 0, 15, 15)));

        let taken = dirty.take();
        assert_eq!(taken.len(), 2);
        assert!(dirty.is_empty());
    }
}
