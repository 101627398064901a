//! Interior (router) nodes (spec.md §3 "Interior node", §4.5 C5).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::key::KeySlice;
use crate::node::{Node, NodeHeader, NodePtr};

pub const INTERIOR_CAPACITY: usize = 15;
const CHILD_CAPACITY: usize = INTERIOR_CAPACITY + 1;

pub struct InteriorNode {
    pub header: NodeHeader,
    count: UnsafeCell<usize>,
    keys: UnsafeCell<[(u64, u8); INTERIOR_CAPACITY]>,
    children: [AtomicPtr<Node>; CHILD_CAPACITY],
}

// SAFETY: `count`/`keys` are mutated only by the lock holder; `children` is
// a fixed array of atomics, so concurrent reads are always well-defined.
unsafe impl Sync for InteriorNode {}

impl InteriorNode {
    /// Build a fresh interior node with a single key and two children —
    /// used both for ordinary splits and for the new root created by a
    /// root split (spec.md §4.5 "Root-split creates a new root interior
    /// with two children").
    pub fn new_with_one_key(
        is_root: bool,
        slice: u64,
        len: u8,
        left: NodePtr,
        right: NodePtr,
    ) -> InteriorNode {
        let node = InteriorNode {
            header: NodeHeader::new(false, is_root),
            count: UnsafeCell::new(1),
            keys: UnsafeCell::new(std::array::from_fn(|i| if i == 0 { (slice, len) } else { (0, 0) })),
            children: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
        };
        node.children[0].store(left, Ordering::Release);
        node.children[1].store(right, Ordering::Release);
        node
    }

    #[inline]
    pub fn count(&self) -> usize {
        // SAFETY: plain read, re-validated by the caller against the
        // version word around any multi-step traversal.
        unsafe { *self.count.get() }
    }

    fn key_at(&self, idx: usize) -> (u64, u8) {
        // SAFETY: idx < count, validated by caller.
        unsafe { (*self.keys.get())[idx] }
    }

    /// Reader-side child lookup by binary search (spec.md §4.5
    /// `locate_child`). No lock required; caller brackets this with a
    /// stable-version check before trusting the result.
    pub fn locate_child(&self, slice: KeySlice) -> NodePtr {
        let count = self.count();
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (ks, kl) = self.key_at(mid);
            if (slice.slice, slice.len) < (ks, kl) {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.children[lo].load(Ordering::Acquire)
    }

    pub fn child_at(&self, idx: usize) -> NodePtr {
        self.children[idx].load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= INTERIOR_CAPACITY
    }

    /// Find the index of `child` among the current children, for re-deriving
    /// an insertion point during `insert_child`.
    fn find_child_index(&self, child: NodePtr) -> Option<usize> {
        let n = self.count() + 1;
        (0..n).find(|&i| self.children[i].load(Ordering::Acquire) == child)
    }

    /// Insert `slice`/`len` as a new routing key, with `right_child` becoming
    /// the child immediately to its right (spec.md §4.5 `insert_child`).
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn insert_child(
        &self,
        left_child: NodePtr,
        slice: u64,
        len: u8,
        right_child: NodePtr,
    ) {
        let left_idx = self
            .find_child_index(left_child)
            .expect("left_child must already be a child of this node");
        let count = *self.count.get();
        let keys = &mut *self.keys.get();
        for i in (left_idx..count).rev() {
            keys[i + 1] = keys[i];
        }
        keys[left_idx] = (slice, len);
        for i in (left_idx + 1..=count).rev() {
            let moved = self.children[i].load(Ordering::Relaxed);
            self.children[i + 1].store(moved, Ordering::Relaxed);
        }
        self.children[left_idx + 1].store(right_child, Ordering::Release);
        *self.count.get() = count + 1;
        self.header.version.begin_insert();
    }

    /// Split this (full) interior node in two, moving the upper half of its
    /// `(key, child)` pairs into a freshly built `InteriorNode`. Returns the
    /// new right node and the key promoted into the parent.
    ///
    /// # Safety
    /// Caller holds this node's writer lock. The returned node is not yet
    /// reachable from the tree; the caller publishes it into the parent.
    pub unsafe fn split(&self) -> (InteriorNode, u64, u8) {
        let count = self.count();
        let split_at = count / 2;
        let (promoted_slice, promoted_len) = self.key_at(split_at);

        let right = InteriorNode {
            header: NodeHeader::new(false, false),
            count: UnsafeCell::new(count - split_at - 1),
            keys: UnsafeCell::new(std::array::from_fn(|i| {
                if i + split_at + 1 < count {
                    self.key_at(i + split_at + 1)
                } else {
                    (0, 0)
                }
            })),
            children: std::array::from_fn(|i| {
                AtomicPtr::new(if i <= count - split_at - 1 {
                    self.children[i + split_at + 1].load(Ordering::Relaxed)
                } else {
                    std::ptr::null_mut()
                })
            }),
        };

        *self.count.get() = split_at;
        self.header.version.begin_split();

        (right, promoted_slice, promoted_len)
    }

    pub fn first_key(&self) -> Option<(u64, u8)> {
        if self.count() == 0 {
            None
        } else {
            Some(self.key_at(0))
        }
    }

    /// All current routing keys in order, for `display()`'s debug dump.
    pub fn keys(&self) -> Vec<(u64, u8)> {
        (0..self.count()).map(|i| self.key_at(i)).collect()
    }

    pub fn has_child(&self, child: NodePtr) -> bool {
        self.find_child_index(child).is_some()
    }

    /// Overwrite the child pointer at array index `idx` in place, without
    /// touching the routing keys — used when a collapsed child is replaced
    /// by its sole surviving grandchild (spec.md §4.8 "cascade up").
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn set_child_unchecked(&self, idx: usize, new: NodePtr) {
        self.children[idx].store(new, Ordering::Release);
    }

    /// Remove `child` (and the routing key that bounded it) from this
    /// node. Returns the sole remaining child if this leaves the node with
    /// zero routing keys, so the caller can splice that child directly
    /// into this node's place (spec.md §4.8 "an interior that loses its
    /// last child is removed similarly").
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn remove_child(&self, child: NodePtr) -> Option<NodePtr> {
        let count = self.count();
        let total = count + 1;
        let idx = self
            .find_child_index(child)
            .expect("child must be present to be removed");
        let keys = &mut *self.keys.get();
        let removed_key_idx = if idx == 0 { 0 } else { idx - 1 };
        for i in removed_key_idx..count.saturating_sub(1) {
            keys[i] = keys[i + 1];
        }
        for i in idx..total - 1 {
            let moved = self.children[i + 1].load(Ordering::Relaxed);
            self.children[i].store(moved, Ordering::Relaxed);
        }
        self.children[total - 1].store(std::ptr::null_mut(), Ordering::Relaxed);
        *self.count.get() = count - 1;
        self.header.version.begin_insert();
        if count - 1 == 0 {
            Some(self.children[0].load(Ordering::Acquire))
        } else {
            None
        }
    }
}
