//! Tree instance (spec.md §4.6 C6): the atomic root pointer and the
//! version-validated descent loop shared by every operation in
//! [`crate::ops`].

use crate::key::{KeySlice, SLICE_LEN};
use crate::border::FindResult;
use crate::link_or_value::LayerRoot;
use crate::node::{Node, NodePtr};
use crate::status::{CoreError, CoreResult};

/// Bounds the number of times a whole descent restarts from the root before
/// giving up (spec.md §5 "suspension points: none" — bounded spins only).
pub const MAX_DESCENT_RESTARTS: usize = 1 << 16;

/// Where [`Tree::descend`] landed.
pub enum Descent {
    /// The tree has no root at all.
    Empty,
    /// `border` is the node responsible for `key` at `layer_offset`
    /// (the key's slice at that offset is either absent from `border` or
    /// held there as a value, never as a next-layer pointer — descent
    /// already followed any such pointer).
    AtBorder { border: NodePtr, layer_offset: usize },
}

pub struct Tree {
    root_cell: LayerRoot,
}

impl Tree {
    pub fn new() -> Tree {
        Tree {
            root_cell: LayerRoot::empty(),
        }
    }

    /// The cell anchoring this tree's top-level root. A fresh root node's
    /// `anchor` is set to point back at this cell (never boxed separately,
    /// unlike a promoted layer's [`LayerRoot`]) so that [`crate::ops`] can
    /// treat the whole-tree root and any nested layer root uniformly
    /// through [`Node::anchor`](crate::node::Node::anchor).
    #[inline]
    pub fn root_cell(&self) -> &LayerRoot {
        &self.root_cell
    }

    #[inline]
    pub fn root(&self) -> NodePtr {
        self.root_cell.load()
    }

    /// Install `new` as the root, but only if it is still `old` — used both
    /// for root splits and for the CAS-to-null when the last key is removed
    /// (spec.md §4.6 `replace_root`).
    pub fn cas_root(&self, old: NodePtr, new: NodePtr) -> bool {
        self.root_cell.cas(old, new)
    }

    /// Force the root pointer, used only during `init`/teardown when no
    /// concurrent access is possible.
    pub fn force_root(&self, new: NodePtr) {
        self.root_cell.store(new);
    }

    /// Lock-free descent to the border responsible for `key` (spec.md §4.6
    /// "Descent algorithm"). Crosses interior nodes via `locate_child` and
    /// crosses layers via next-layer pointers found in border slots, each
    /// time re-validating `vsplit` across the read; a mismatch restarts the
    /// whole descent from the root.
    pub fn descend(&self, key: &[u8]) -> CoreResult<Descent> {
        let mut restarts = 0usize;
        'restart: loop {
            if restarts >= MAX_DESCENT_RESTARTS {
                return Err(CoreError::RetriesExceeded);
            }
            let mut layer_offset = 0usize;
            let mut cur = self.root();
            if cur.is_null() {
                return Ok(Descent::Empty);
            }
            loop {
                // SAFETY: `cur` was read under acquire ordering either from
                // the tree root or from a validated parent/sibling edge; it
                // is kept alive for the session's epoch by the reclaimer
                // never freeing anything a live session could still reach.
                let node = unsafe { &*cur };
                match node {
                    Node::Interior(interior) => {
                        let v1 = node
                            .version()
                            .stable_snapshot()
                            .ok_or(CoreError::RetriesExceeded)?;
                        let slice = KeySlice::at(key, layer_offset);
                        let child = interior.locate_child(slice);
                        let v2 = node
                            .version()
                            .stable_snapshot()
                            .ok_or(CoreError::RetriesExceeded)?;
                        if v1.vsplit() != v2.vsplit() {
                            restarts += 1;
                            continue 'restart;
                        }
                        cur = child;
                    }
                    Node::Border(border) => {
                        let v1 = node
                            .version()
                            .stable_snapshot()
                            .ok_or(CoreError::RetriesExceeded)?;
                        let find = border.stable_find(key, layer_offset);
                        let next_layer = match find {
                            FindResult::Matched { slot_index, .. } => {
                                let (_, _, _, lv) = border.get_lv(slot_index);
                                lv.as_next()
                            }
                            FindResult::NotFound { .. } | FindResult::Collision { .. } => None,
                        };
                        let v2 = node
                            .version()
                            .stable_snapshot()
                            .ok_or(CoreError::RetriesExceeded)?;
                        if v1.vsplit() != v2.vsplit() {
                            restarts += 1;
                            continue 'restart;
                        }
                        match next_layer {
                            Some(cell) => {
                                // SAFETY: the cell outlives the slot that
                                // names it; the slot only stops naming it
                                // once the whole layer has been removed,
                                // which cannot race a live descent that
                                // just observed the slot.
                                let next_root = unsafe { (*cell).load() };
                                layer_offset += SLICE_LEN;
                                cur = next_root;
                                continue;
                            }
                            None => {
                                return Ok(Descent::AtBorder {
                                    border: cur,
                                    layer_offset,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}
