//! Common node plumbing shared by [`crate::border::BorderNode`] and
//! [`crate::interior::InteriorNode`] (spec.md §4, DESIGN NOTES "virtual
//! dispatch between border/interior").
//!
//! Nodes are independent heap allocations (`Box::into_raw`), never an arena
//! slab: this tree's nodes come and go one at a time under epoch
//! reclamation, so a slab with a free list would just reimplement what the
//! allocator already does. Parent links are non-owning back-references (an
//! `AtomicPtr`, never
//! touched by `Drop`); child/sibling/root links are the owning edges and are
//! the only things the epoch reclaimer ever frees (DESIGN NOTES "cyclic
//! parent/child pointers").

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::border::BorderNode;
use crate::interior::InteriorNode;
use crate::link_or_value::LayerRoot;
use crate::version::NodeVersion;

/// A raw, non-owning handle to a node. Dereferencing it is only sound while
/// the current session's epoch has not advanced past the node's retirement
/// epoch (spec.md §4.7); every module that stores a `NodePtr` documents the
/// reasoning for why the pointer is still valid at the point it dereferences
/// it.
pub type NodePtr = *mut Node;

pub enum Node {
    Border(BorderNode),
    Interior(InteriorNode),
}

impl Node {
    #[inline]
    pub fn version(&self) -> &NodeVersion {
        match self {
            Node::Border(b) => &b.header.version,
            Node::Interior(i) => &i.header.version,
        }
    }

    #[inline]
    pub fn parent_slot(&self) -> &AtomicPtr<Node> {
        match self {
            Node::Border(b) => &b.header.parent,
            Node::Interior(i) => &i.header.parent,
        }
    }

    pub fn parent(&self) -> NodePtr {
        self.parent_slot().load(Ordering::Acquire)
    }

    pub fn set_parent(&self, parent: NodePtr) {
        self.parent_slot().store(parent, Ordering::Release);
    }

    #[inline]
    fn anchor_slot(&self) -> &AtomicPtr<LayerRoot> {
        match self {
            Node::Border(b) => &b.header.anchor,
            Node::Interior(i) => &i.header.anchor,
        }
    }

    /// Valid only while this node `is_root` for its layer: the
    /// [`LayerRoot`] cell (or a `Tree`'s embedded one) that currently names
    /// this node, so a root-level split or collapse can repoint it in
    /// place (spec.md §4.5 "atomically swaps the tree root pointer",
    /// generalized to nested layers).
    pub fn anchor(&self) -> *mut LayerRoot {
        self.anchor_slot().load(Ordering::Acquire)
    }

    pub fn set_anchor(&self, cell: *mut LayerRoot) {
        self.anchor_slot().store(cell, Ordering::Release);
    }

    pub fn as_border(&self) -> Option<&BorderNode> {
        match self {
            Node::Border(b) => Some(b),
            Node::Interior(_) => None,
        }
    }

    pub fn as_border_mut(&mut self) -> Option<&mut BorderNode> {
        match self {
            Node::Border(b) => Some(b),
            Node::Interior(_) => None,
        }
    }

    pub fn as_interior(&self) -> Option<&InteriorNode> {
        match self {
            Node::Interior(i) => Some(i),
            Node::Border(_) => None,
        }
    }

    pub fn as_interior_mut(&mut self) -> Option<&mut InteriorNode> {
        match self {
            Node::Interior(i) => Some(i),
            Node::Border(_) => None,
        }
    }
}

/// Header shared by both node kinds.
pub struct NodeHeader {
    pub version: NodeVersion,
    /// Non-owning. Used solely to ascend under lock (spec.md §4.6
    /// "writers ... must re-check ... by re-reading parent version words").
    pub parent: AtomicPtr<Node>,
    /// Non-owning, meaningful only while `version.is_root()`. See
    /// [`Node::anchor`].
    pub anchor: AtomicPtr<LayerRoot>,
}

impl NodeHeader {
    pub fn new(border: bool, root: bool) -> NodeHeader {
        NodeHeader {
            version: NodeVersion::new(border, root),
            parent: AtomicPtr::new(std::ptr::null_mut()),
            anchor: AtomicPtr::new(std::ptr::null_mut()),
        }
    }
}

/// Allocate a node on the heap and return an owning raw pointer. The caller
/// becomes responsible for eventually retiring it through
/// [`crate::epoch`].
pub fn alloc_node(node: Node) -> NodePtr {
    Box::into_raw(Box::new(node))
}

/// Free a node's heap allocation immediately. Only safe to call once no
/// session can still observe `ptr` — i.e. from the epoch reclaimer, or from
/// a teardown path (`destroy`/`delete_storage`) that holds exclusive access.
///
/// This does not recurse into next-layer subtrees reachable from border
/// slots: at the point a node is individually retired its slots have
/// already been emptied or moved-from (split/delete), so no live subtree
/// pointer is expected to remain in a singly-retired node's slots. Bulk
/// teardown instead walks the tree explicitly and frees depth-first.
pub unsafe fn free_node(ptr: NodePtr) {
    drop(Box::from_raw(ptr));
}
