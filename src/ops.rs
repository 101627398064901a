//! Put/get/remove/scan (spec.md §4.8 C9 "Operations"), built on the
//! version-validated descent in [`crate::tree`] and the same
//! optimistic-lock-coupling idiom that descent itself uses: lock
//! bottom-up, re-derive position under the lock, restart the whole
//! operation on any mismatch rather than trying to patch up a half-valid
//! traversal.

use std::sync::atomic::Ordering;

use crate::border::{BorderNode, FindResult};
use crate::epoch::Reclaimer;
use crate::interior::InteriorNode;
use crate::key::{compare_keys, KeySlice, SLICE_LEN};
use crate::link_or_value::{free_layer_root, LayerRoot, LinkOrValue, ValueBuf};
use crate::node::{alloc_node, free_node, Node, NodePtr};
use crate::permutation::BORDER_CAPACITY;
use crate::status::{CoreError, CoreResult, ScanEndpoint};
use crate::tree::{Descent, Tree, MAX_DESCENT_RESTARTS};
use crate::version::VersionBody;

/// Result of a successful [`put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Replaced,
    /// `allow_insert` forbade overwriting an existing key.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

pub struct ScanEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One border this scan read from, for phantom-read detection by a caller
/// that wants to re-scan and compare (spec.md §4.8 `out_versions`).
pub struct BorderVersionStamp {
    pub border: Option<NodePtr>,
    pub version: VersionBody,
}

pub struct ScanResult {
    pub entries: Vec<ScanEntry>,
    pub versions: Vec<BorderVersionStamp>,
}

// ---------------------------------------------------------------------
// get
// ---------------------------------------------------------------------

/// Read-only lookup. Never takes a lock; retries the whole descent if a
/// concurrent promotion or split is caught mid-flight (spec.md §4.8 `Get`).
pub fn get(tree: &Tree, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
    let mut restarts = 0usize;
    loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        let (border, layer_offset) = match tree.descend(key)? {
            Descent::Empty => return Ok(None),
            Descent::AtBorder { border, layer_offset } => (border, layer_offset),
        };
        // SAFETY: `border` was just returned by a validated descent, so it
        // is reachable and kept alive for this thread's in-flight read.
        let node = unsafe { &*border };
        let v1 = match node.version().stable_snapshot() {
            Some(v) => v,
            None => {
                restarts += 1;
                continue;
            }
        };
        let b = node.as_border().expect("Descent::AtBorder always lands on a border");
        let find = b.stable_find(key, layer_offset);
        // `is_next` tracks a concurrent put that promoted this slot to a
        // next layer since `descend` last looked: `value` is moot then and
        // we must restart rather than report a stale absence.
        let (value, is_next) = match find {
            FindResult::Matched { slot_index, .. } => {
                let (_, _, _, lv) = b.get_lv(slot_index);
                match lv {
                    LinkOrValue::Value(v) => (Some(v.as_slice().to_vec()), false),
                    LinkOrValue::Next(_) => (None, true),
                    LinkOrValue::Empty => (None, false),
                }
            }
            FindResult::NotFound { .. } | FindResult::Collision { .. } => (None, false),
        };
        let v2 = match node.version().stable_snapshot() {
            Some(v) => v,
            None => {
                restarts += 1;
                continue;
            }
        };
        if v1.vsplit() != v2.vsplit() || v1.vinsert() != v2.vinsert() {
            restarts += 1;
            continue;
        }
        if is_next {
            restarts += 1;
            continue;
        }
        return Ok(value);
    }
}

// ---------------------------------------------------------------------
// shared descent/locking helpers
// ---------------------------------------------------------------------

/// Structural-only descent within a single layer: crosses interior nodes
/// via `locate_child` but never follows a border's next-layer pointer
/// (that decision belongs to the caller once the slot is locked and
/// inspected). Used by [`remove_layer`] and by the start-of-range search in
/// [`scan_forward`]/[`scan_subtree`].
fn descend_within_layer(start: NodePtr, key: &[u8], layer_offset: usize) -> CoreResult<NodePtr> {
    let mut restarts = 0usize;
    'restart: loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        let mut cur = start;
        loop {
            // SAFETY: `start` is a layer root kept alive by the caller's own
            // held lock or by virtue of being the tree's current root.
            let node = unsafe { &*cur };
            match node {
                Node::Border(_) => return Ok(cur),
                Node::Interior(interior) => {
                    let v1 = match node.version().stable_snapshot() {
                        Some(v) => v,
                        None => {
                            restarts += 1;
                            continue 'restart;
                        }
                    };
                    let slice = KeySlice::at(key, layer_offset);
                    let child = interior.locate_child(slice);
                    let v2 = match node.version().stable_snapshot() {
                        Some(v) => v,
                        None => {
                            restarts += 1;
                            continue 'restart;
                        }
                    };
                    if v1.vsplit() != v2.vsplit() {
                        restarts += 1;
                        continue 'restart;
                    }
                    cur = child;
                }
            }
        }
    }
}

/// Lock `candidate` and re-validate it is still the right border for `key`
/// at `layer_offset`, moving right along the sibling chain if a concurrent
/// split pushed the key's position past it (spec.md §4.8 "Re-validate that
/// the border still covers the key"). Returns `None` if `candidate` was
/// found deleted, asking the caller to redo the structural descent.
fn lock_candidate(candidate: NodePtr, key: &[u8], layer_offset: usize) -> CoreResult<Option<(NodePtr, usize)>> {
    // SAFETY: `candidate` was just returned by a validated descent.
    let node = unsafe { &*candidate };
    node.version().lock();
    if node.version().load().deleted() {
        node.version().unlock();
        return Ok(None);
    }
    let b = node
        .as_border()
        .expect("structural descent within a layer always lands on a border");
    if let FindResult::NotFound { rank } = b.stable_find(key, layer_offset) {
        if rank == b.count() {
            let next = b.next.load(Ordering::Acquire);
            if !next.is_null() {
                // SAFETY: a border's sibling is only retired after being
                // unthreaded under this border's own lock, which we hold.
                let next_node = unsafe { &*next };
                let next_b = next_node.as_border().expect("siblings are always borders");
                if let Some(min_tail) = next_b.min_key_tail() {
                    if compare_keys(&key[layer_offset..], &min_tail) != std::cmp::Ordering::Less {
                        node.version().unlock();
                        return lock_candidate(next, key, layer_offset);
                    }
                }
            }
        }
    }
    Ok(Some((candidate, layer_offset)))
}

fn lock_in_layer(layer_root: NodePtr, key: &[u8], layer_offset: usize) -> CoreResult<(NodePtr, usize)> {
    let mut restarts = 0usize;
    loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        let candidate = descend_within_layer(layer_root, key, layer_offset)?;
        match lock_candidate(candidate, key, layer_offset)? {
            Some(x) => return Ok(x),
            None => restarts += 1,
        }
    }
}

/// Cross-tree version of [`lock_in_layer`]: descends from the tree root
/// (crossing layers transparently) and locks the border it lands on.
/// Returns `Ok(None)` only when the tree has no root at all yet.
fn lock_and_validate(tree: &Tree, key: &[u8]) -> CoreResult<Option<(NodePtr, usize)>> {
    let mut restarts = 0usize;
    loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        match tree.descend(key)? {
            Descent::Empty => return Ok(None),
            Descent::AtBorder { border, layer_offset } => match lock_candidate(border, key, layer_offset)? {
                Some(x) => return Ok(x),
                None => restarts += 1,
            },
        }
    }
}

// ---------------------------------------------------------------------
// put
// ---------------------------------------------------------------------

enum TryPutResult {
    Done(PutOutcome),
    Retry(ValueBuf),
}

/// Insert or overwrite `key`. `allow_insert = false` rejects overwriting an
/// existing key instead of replacing it (spec.md §6 `put(..., allow_insert)`
/// — the "unique restriction" path).
pub fn put(tree: &Tree, key: &[u8], value: ValueBuf, allow_insert: bool, reclaimer: &Reclaimer) -> CoreResult<PutOutcome> {
    let mut value = value;
    let mut restarts = 0usize;
    loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        match try_put(tree, key, value, allow_insert, reclaimer)? {
            TryPutResult::Done(outcome) => return Ok(outcome),
            TryPutResult::Retry(v) => {
                value = v;
                restarts += 1;
            }
        }
    }
}

fn try_put(tree: &Tree, key: &[u8], value: ValueBuf, allow_insert: bool, reclaimer: &Reclaimer) -> CoreResult<TryPutResult> {
    let (border, layer_offset) = match lock_and_validate(tree, key)? {
        Some(x) => x,
        None => return Ok(create_root_border(tree, key, value)),
    };
    // SAFETY: locked by `lock_and_validate`; unlocked on every path below.
    let node = unsafe { &*border };
    let b = node.as_border().unwrap();
    let find = b.stable_find(key, layer_offset);
    match find {
        FindResult::Matched { slot_index, .. } => {
            let (_, _, _, lv) = b.get_lv(slot_index);
            match lv {
                LinkOrValue::Value(_) => {
                    if !allow_insert {
                        node.version().unlock();
                        return Ok(TryPutResult::Done(PutOutcome::Rejected));
                    }
                    let old = unsafe { b.replace_value(slot_index, value) };
                    node.version().unlock();
                    if let LinkOrValue::Value(v) = old {
                        reclaimer.retire_value(v);
                    }
                    Ok(TryPutResult::Done(PutOutcome::Replaced))
                }
                LinkOrValue::Next(_) => {
                    // The slot was promoted to a next layer since `descend`
                    // last inspected it; restart the whole put.
                    node.version().unlock();
                    Ok(TryPutResult::Retry(value))
                }
                LinkOrValue::Empty => unreachable!("a Matched slot is never Empty"),
            }
        }
        FindResult::Collision { slot_index, .. } => {
            unsafe { promote_and_seed(b, slot_index, &key[layer_offset..], value) };
            node.version().unlock();
            Ok(TryPutResult::Done(PutOutcome::Created))
        }
        FindResult::NotFound { rank } => {
            if b.is_full() {
                let outcome = split_and_insert(border, layer_offset, key, value);
                node.version().unlock();
                Ok(TryPutResult::Done(outcome))
            } else {
                let key_tail = &key[layer_offset..];
                unsafe {
                    b.insert_value_slot(rank, key_tail, value)
                        .expect("is_full() already checked")
                };
                node.version().unlock();
                Ok(TryPutResult::Done(PutOutcome::Created))
            }
        }
    }
}

/// Build the very first border of an empty tree and install it as the root
/// via `cas_root`, recovering the value for a retry if a concurrent put won
/// the race (spec.md §4.6 "an empty tree's first insert allocates a root
/// border directly").
fn create_root_border(tree: &Tree, key: &[u8], value: ValueBuf) -> TryPutResult {
    let node = alloc_node(Node::Border(BorderNode::new(true)));
    // SAFETY: `node` is freshly allocated and not yet reachable from any
    // other thread, so locking it is uncontended bookkeeping.
    unsafe {
        let n = &*node;
        n.version().lock();
        n.set_anchor(tree.root_cell() as *const LayerRoot as *mut LayerRoot);
        let b = n.as_border().unwrap();
        b.insert_value_slot(0, key, value)
            .expect("a fresh border always has room for its first entry");
        n.version().unlock();
    }
    if tree.cas_root(std::ptr::null_mut(), node) {
        return TryPutResult::Done(PutOutcome::Created);
    }
    // Lost the race to install the first root: recover the value we
    // already stored and discard this never-published node.
    let value = unsafe {
        let n = &*node;
        n.version().lock();
        let b = n.as_border().unwrap();
        let mut taken = b.take_all();
        n.version().unlock();
        let (_, slot) = taken.pop().expect("we inserted exactly one slot above");
        match slot.lv {
            LinkOrValue::Value(v) => v,
            _ => unreachable!("the one slot we inserted was always a value"),
        }
    };
    unsafe { free_node(node) };
    TryPutResult::Retry(value)
}

/// Insert `key_tail` into a border not yet reachable by any other session
/// (a freshly allocated layer root being seeded with its first one or two
/// entries), recursing through further promotions if it collides again.
///
/// # Safety
/// Caller holds `node`'s writer lock (or `node` is not yet published).
unsafe fn insert_value(node: &BorderNode, key_tail: &[u8], value: ValueBuf) {
    match node.stable_find(key_tail, 0) {
        FindResult::NotFound { rank } => {
            node.insert_value_slot(rank, key_tail, value)
                .expect("a border being seeded with at most two entries always has room");
        }
        FindResult::Collision { slot_index, .. } => {
            promote_and_seed(node, slot_index, key_tail, value);
        }
        FindResult::Matched { .. } => {
            unreachable!("insert_value is only ever called with a key known to be absent")
        }
    }
}

/// Promote `slot_index` (which collides with `key_tail` on its full 8-byte
/// slice) to a next-layer pointer, then seed that layer with both the
/// displaced old value and the new one (spec.md §4.4 "layer promotion").
///
/// # Safety
/// Caller holds `node`'s writer lock (or `node` is not yet published).
unsafe fn promote_and_seed(node: &BorderNode, slot_index: usize, key_tail: &[u8], value: ValueBuf) {
    let deeper = alloc_node(Node::Border(BorderNode::new(true)));
    let dn = &*deeper;
    dn.version().lock();
    let (cell, old_value, old_suffix) = promote(node, slot_index, deeper);
    dn.set_anchor(cell);
    let old_tail = old_suffix.map(|s| s.to_vec()).unwrap_or_default();
    let deeper_border = dn.as_border().unwrap();
    insert_value(deeper_border, &old_tail, old_value);
    insert_value(deeper_border, &key_tail[SLICE_LEN..], value);
    dn.version().unlock();
}

/// Thin wrapper around [`BorderNode::promote_to_next_layer`] that also
/// surfaces the [`LayerRoot`] cell it allocated, so the caller can set the
/// new layer root's `anchor` back to it.
unsafe fn promote(node: &BorderNode, slot_index: usize, next_layer_root: NodePtr) -> (*mut LayerRoot, ValueBuf, Option<Box<[u8]>>) {
    let (old_value, old_suffix) = node.promote_to_next_layer(slot_index, next_layer_root);
    // SAFETY: `promote_to_next_layer` always installs a `LinkOrValue::Next`
    // into this exact slot; re-reading it back out is just bookkeeping.
    let (_, _, _, lv) = node.get_lv(slot_index);
    let cell = lv.as_next().expect("promote_to_next_layer always leaves behind a Next slot");
    (cell, old_value, old_suffix)
}

/// Split a full border node, inserting `key`/`value` into whichever half it
/// now belongs to, and link the promoted separator into the parent
/// (creating or splitting interior nodes as needed).
///
/// # Safety / locking
/// Caller holds `border`'s writer lock; this function unlocks neither
/// `border` nor `right` until it returns (both stay locked while the
/// parent/grandparent chain is updated, per spec.md §5's bottom-up
/// ordering), but it does unlock `right`'s own lock itself before
/// returning — the caller only needs to unlock `border`.
fn split_and_insert(border: NodePtr, layer_offset: usize, key: &[u8], value: ValueBuf) -> PutOutcome {
    // SAFETY: caller holds `border`'s writer lock.
    let bn = unsafe { &*border };
    let b = bn.as_border().unwrap();
    let mut entries = unsafe { b.take_all() };
    debug_assert_eq!(entries.len(), BORDER_CAPACITY);
    let right_entries = entries.split_off(BORDER_CAPACITY / 2 + 1);
    let promoted_tail = right_entries[0].0.clone();
    let (promoted_slice, promoted_len) = (right_entries[0].1.slice, right_entries[0].1.len);

    for (rank, (_, slot)) in entries.into_iter().enumerate() {
        unsafe { b.append_taken(rank, slot) };
    }

    let right = alloc_node(Node::Border(BorderNode::new(false)));
    // SAFETY: `right` is freshly allocated, not yet reachable.
    let rn = unsafe { &*right };
    rn.version().lock();
    {
        let rb = rn.as_border().unwrap();
        for (rank, (_, slot)) in right_entries.into_iter().enumerate() {
            unsafe { rb.append_taken(rank, slot) };
        }
    }

    let old_next = b.next.load(Ordering::Acquire);
    if !old_next.is_null() {
        // SAFETY: the existing right sibling is only retired while holding
        // its own lock, which we now take to fix up its `prev`.
        let on = unsafe { &*old_next };
        on.version().lock();
        on.as_border().unwrap().prev.store(right, Ordering::Release);
        on.version().unlock();
    }
    rn.as_border().unwrap().next.store(old_next, Ordering::Release);
    rn.as_border().unwrap().prev.store(border, Ordering::Release);
    b.next.store(right, Ordering::Release);

    let key_tail = &key[layer_offset..];
    let target_is_right = compare_keys(key_tail, &promoted_tail) != std::cmp::Ordering::Less;
    if target_is_right {
        unsafe { insert_value(rn.as_border().unwrap(), key_tail, value) };
    } else {
        unsafe { insert_value(b, key_tail, value) };
    }
    rn.version().unlock();
    bn.version().begin_split();

    let parent = bn.parent();
    if parent.is_null() {
        promote_new_root(border, promoted_slice, promoted_len, right);
    } else {
        attach_child(parent, promoted_slice, promoted_len, border, right);
    }
    PutOutcome::Created
}

/// Install a fresh interior root above `left`/`right`, transferring `left`'s
/// anchor cell to it (spec.md §4.5 "Root-split creates a new root
/// interior"). Used both for a border's first-ever split and for an
/// interior split that has no grandparent.
fn promote_new_root(left: NodePtr, promoted_slice: u64, promoted_len: u8, right: NodePtr) {
    // SAFETY: `left` is locked by the caller and `left.is_root()` holds, so
    // its anchor cell is stable and exclusively ours to repoint.
    let ln = unsafe { &*left };
    let cell = ln.anchor();
    let new_root = InteriorNode::new_with_one_key(true, promoted_slice, promoted_len, left, right);
    let new_root_ptr = alloc_node(Node::Interior(new_root));
    unsafe {
        (&*new_root_ptr).set_anchor(cell);
        (&*cell).store(new_root_ptr);
        (&*right).set_parent(new_root_ptr);
    }
    ln.version().set_root(false);
    ln.set_parent(new_root_ptr);
}

/// Attach a newly-split child pair (`left_child`, `right_child`, separated
/// by `promoted_slice`/`promoted_len`) into `parent`, splitting `parent`
/// itself (and cascading further upward) if it is already full (spec.md
/// §4.5/§4.8, generalizing the border-split path to interior nodes).
fn attach_child(parent: NodePtr, promoted_slice: u64, promoted_len: u8, left_child: NodePtr, right_child: NodePtr) {
    // SAFETY: `left_child`'s own lock (held throughout by an ancestor frame
    // of this call) keeps its parent pointer stable, so locking `parent`
    // here follows the same leaf-to-root ordering as everywhere else.
    let pn = unsafe { &*parent };
    pn.version().lock();
    let interior = pn.as_interior().unwrap();
    if !interior.is_full() {
        unsafe { interior.insert_child(left_child, promoted_slice, promoted_len, right_child) };
        unsafe { (&*right_child).set_parent(parent) };
        pn.version().unlock();
        return;
    }

    let (right_interior, up_slice, up_len) = unsafe { interior.split() };
    let right_ptr = alloc_node(Node::Interior(right_interior));
    // SAFETY: `right_ptr` is freshly allocated and not yet reachable; fix
    // up the parent pointers of the children it just inherited.
    unsafe {
        let ri = (&*right_ptr).as_interior().unwrap();
        for i in 0..=ri.count() {
            let c = ri.child_at(i);
            if !c.is_null() {
                (&*c).set_parent(right_ptr);
            }
        }
    }

    let target_is_right = unsafe { (&*right_ptr).as_interior().unwrap().has_child(left_child) };
    if target_is_right {
        unsafe {
            (&*right_ptr)
                .as_interior()
                .unwrap()
                .insert_child(left_child, promoted_slice, promoted_len, right_child)
        };
        unsafe { (&*right_child).set_parent(right_ptr) };
    } else {
        unsafe { interior.insert_child(left_child, promoted_slice, promoted_len, right_child) };
        unsafe { (&*right_child).set_parent(parent) };
    }

    let grandparent = pn.parent();
    if grandparent.is_null() {
        promote_new_root(parent, up_slice, up_len, right_ptr);
    } else {
        attach_child(grandparent, up_slice, up_len, parent, right_ptr);
    }
    pn.version().unlock();
}

// ---------------------------------------------------------------------
// remove
// ---------------------------------------------------------------------

/// Remove `key` if present. Recurses across layers, holding each
/// descending layer's border lock before locking the next layer's root
/// (spec.md §5), so a cascading collapse of an emptied deeper layer is
/// applied atomically from the point of view of the layer above it.
pub fn remove(tree: &Tree, key: &[u8], reclaimer: &Reclaimer) -> CoreResult<RemoveOutcome> {
    remove_layer(tree.root_cell(), key, 0, reclaimer)
}

fn remove_layer(cell: &LayerRoot, key: &[u8], layer_offset: usize, reclaimer: &Reclaimer) -> CoreResult<RemoveOutcome> {
    let root = cell.load();
    if root.is_null() {
        return Ok(RemoveOutcome::NotFound);
    }
    let (border, layer_offset) = lock_in_layer(root, key, layer_offset)?;
    // SAFETY: locked by `lock_in_layer`; unlocked on every path below.
    let node = unsafe { &*border };
    let b = node.as_border().unwrap();
    match b.stable_find(key, layer_offset) {
        FindResult::NotFound { .. } | FindResult::Collision { .. } => {
            node.version().unlock();
            Ok(RemoveOutcome::NotFound)
        }
        FindResult::Matched { rank, slot_index } => {
            let (_, _, _, lv) = b.get_lv(slot_index);
            if let Some(next_cell) = lv.as_next() {
                let next_offset = layer_offset + SLICE_LEN;
                // SAFETY: the cell outlives the slot naming it for as long
                // as we hold this border's lock, since a layer can only be
                // torn down by whoever holds that same lock.
                let outcome = remove_layer(unsafe { &*next_cell }, key, next_offset, reclaimer)?;
                if matches!(outcome, RemoveOutcome::Removed) && unsafe { (*next_cell).load() }.is_null() {
                    let old = unsafe { b.delete_rank(rank) };
                    debug_assert!(matches!(old, LinkOrValue::Next(_)));
                    unsafe { free_layer_root(next_cell) };
                    collapse_if_empty(cell, border, reclaimer);
                }
                node.version().unlock();
                return Ok(outcome);
            }
            let old = unsafe { b.delete_rank(rank) };
            if let LinkOrValue::Value(v) = old {
                reclaimer.retire_value(v);
            }
            collapse_if_empty(cell, border, reclaimer);
            node.version().unlock();
            Ok(RemoveOutcome::Removed)
        }
    }
}

/// If `border` (already locked, just had an entry removed) is now entirely
/// empty, remove it from the tree: either null out the layer's root cell
/// (it was the whole layer) or unthread it from its siblings and parent,
/// cascading the collapse upward through any interior that loses its last
/// child (spec.md §4.8 "cascading deletion... no merge/rebalance").
fn collapse_if_empty(cell: &LayerRoot, border: NodePtr, reclaimer: &Reclaimer) {
    // SAFETY: caller holds `border`'s writer lock.
    let node = unsafe { &*border };
    let b = node.as_border().unwrap();
    if b.count() != 0 {
        return;
    }
    if node.version().load().is_root() {
        cell.store(std::ptr::null_mut());
        node.version().mark_deleted();
        reclaimer.retire_node(border);
        return;
    }
    let prev = b.prev.load(Ordering::Acquire);
    let next = b.next.load(Ordering::Acquire);
    if !prev.is_null() {
        // SAFETY: a live sibling is only retired under its own lock.
        let pn = unsafe { &*prev };
        pn.version().lock();
        pn.as_border().unwrap().next.store(next, Ordering::Release);
        pn.version().unlock();
    }
    if !next.is_null() {
        // SAFETY: same as above.
        let nn = unsafe { &*next };
        nn.version().lock();
        nn.as_border().unwrap().prev.store(prev, Ordering::Release);
        nn.version().unlock();
    }
    let parent = node.parent();
    remove_child_from_parent(parent, border, reclaimer);
    node.version().mark_deleted();
    reclaimer.retire_node(border);
}

/// Remove `child` from `parent`'s routing table, splicing `parent` itself
/// out (replaced by its one remaining child) if that empties it, cascading
/// upward through further collapses as needed.
fn remove_child_from_parent(parent: NodePtr, child: NodePtr, reclaimer: &Reclaimer) {
    // SAFETY: `child`'s own lock (held by the caller up the call chain)
    // keeps its parent pointer — and therefore `parent`'s identity —
    // stable while we lock and inspect it.
    let pn = unsafe { &*parent };
    pn.version().lock();
    let interior = pn.as_interior().unwrap();
    let sole = unsafe { interior.remove_child(child) };
    match sole {
        None => {
            pn.version().unlock();
        }
        Some(sole_child) => {
            if pn.version().load().is_root() {
                let cell = pn.anchor();
                unsafe {
                    (&*sole_child).set_parent(std::ptr::null_mut());
                    (&*sole_child).version().set_root(true);
                    (&*sole_child).set_anchor(cell);
                    (&*cell).store(sole_child);
                }
            } else {
                let grandparent = pn.parent();
                unsafe { (&*sole_child).set_parent(grandparent) };
                replace_child_in_parent(grandparent, parent, sole_child);
            }
            pn.version().mark_deleted();
            reclaimer.retire_node(parent);
            pn.version().unlock();
        }
    }
}

fn replace_child_in_parent(grandparent: NodePtr, old_child: NodePtr, new_child: NodePtr) {
    // SAFETY: same bottom-up locking discipline as `remove_child_from_parent`.
    let gp = unsafe { &*grandparent };
    gp.version().lock();
    let interior = gp.as_interior().unwrap();
    if let Some(idx) = (0..=interior.count()).find(|&i| interior.child_at(i) == old_child) {
        unsafe { interior.set_child_unchecked(idx, new_child) };
    }
    gp.version().unlock();
}

// ---------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------

/// Range scan (spec.md §4.8 `Scan`, §6). A reverse scan is only supported
/// for `max == 1` with an unbounded upper endpoint — "give me the greatest
/// key" — everything else is a forward scan.
#[allow(clippy::too_many_arguments)]
pub fn scan(
    tree: &Tree,
    begin: &[u8],
    begin_ep: ScanEndpoint,
    end: &[u8],
    end_ep: ScanEndpoint,
    max: usize,
    reverse: bool,
) -> CoreResult<ScanResult> {
    validate_scan_args(begin_ep, end_ep, begin, end, max, reverse)?;
    if reverse {
        return scan_reverse_max1(tree);
    }
    scan_forward(tree, begin, begin_ep, end, end_ep, max)
}

fn validate_scan_args(
    begin_ep: ScanEndpoint,
    end_ep: ScanEndpoint,
    begin: &[u8],
    end: &[u8],
    max: usize,
    reverse: bool,
) -> CoreResult<()> {
    if reverse {
        if end_ep != ScanEndpoint::Inf || max != 1 {
            return Err(CoreError::BadScanArgs(
                "reverse scan requires max == 1 and an unbounded upper endpoint",
            ));
        }
        return Ok(());
    }
    if begin_ep == ScanEndpoint::Exclusive && end_ep == ScanEndpoint::Exclusive && begin == end {
        return Err(CoreError::BadScanArgs("exclusive bounds on the same key admit no keys"));
    }
    Ok(())
}

fn key_in_range(key: &[u8], begin: &[u8], begin_ep: ScanEndpoint, end: &[u8], end_ep: ScanEndpoint) -> bool {
    let after_begin = match begin_ep {
        ScanEndpoint::Inf => true,
        ScanEndpoint::Inclusive => compare_keys(key, begin) != std::cmp::Ordering::Less,
        ScanEndpoint::Exclusive => compare_keys(key, begin) == std::cmp::Ordering::Greater,
    };
    let before_end = match end_ep {
        ScanEndpoint::Inf => true,
        ScanEndpoint::Inclusive => compare_keys(key, end) != std::cmp::Ordering::Greater,
        ScanEndpoint::Exclusive => compare_keys(key, end) == std::cmp::Ordering::Less,
    };
    after_begin && before_end
}

fn scan_forward(
    tree: &Tree,
    begin: &[u8],
    begin_ep: ScanEndpoint,
    end: &[u8],
    end_ep: ScanEndpoint,
    max: usize,
) -> CoreResult<ScanResult> {
    let mut entries = Vec::new();
    let mut versions = Vec::new();
    let root = tree.root();
    if root.is_null() {
        versions.push(BorderVersionStamp {
            border: None,
            version: VersionBody::EMPTY,
        });
        return Ok(ScanResult { entries, versions });
    }
    let start = descend_within_layer(root, begin, 0)?;
    walk_borders_forward(start, Vec::new(), begin, begin_ep, end, end_ep, max, &mut entries, &mut versions)?;
    Ok(ScanResult { entries, versions })
}

fn scan_subtree(
    root: NodePtr,
    prefix: Vec<u8>,
    begin: &[u8],
    begin_ep: ScanEndpoint,
    end: &[u8],
    end_ep: ScanEndpoint,
    max: usize,
    entries: &mut Vec<ScanEntry>,
    versions: &mut Vec<BorderVersionStamp>,
) -> CoreResult<()> {
    let start = descend_within_layer(root, &[], 0)?;
    walk_borders_forward(start, prefix, begin, begin_ep, end, end_ep, max, entries, versions)
}

#[allow(clippy::too_many_arguments)]
fn walk_borders_forward(
    mut border: NodePtr,
    prefix: Vec<u8>,
    begin: &[u8],
    begin_ep: ScanEndpoint,
    end: &[u8],
    end_ep: ScanEndpoint,
    max: usize,
    entries: &mut Vec<ScanEntry>,
    versions: &mut Vec<BorderVersionStamp>,
) -> CoreResult<()> {
    loop {
        // SAFETY: `border` came from a validated structural descent or a
        // live sibling pointer read from one.
        let node = unsafe { &*border };
        let b = node.as_border().unwrap();
        let mut restarts = 0usize;
        let (slots, v1, next_sibling) = loop {
            if restarts >= MAX_DESCENT_RESTARTS {
                return Err(CoreError::RetriesExceeded);
            }
            let v1 = match node.version().stable_snapshot() {
                Some(v) => v,
                None => {
                    restarts += 1;
                    continue;
                }
            };
            let snapshot = b.snapshot_entries();
            let next_sibling = b.next.load(Ordering::Acquire);
            let v2 = match node.version().stable_snapshot() {
                Some(v) => v,
                None => {
                    restarts += 1;
                    continue;
                }
            };
            if v1.vsplit() != v2.vsplit() || v1.vinsert() != v2.vinsert() {
                restarts += 1;
                continue;
            }
            break (snapshot, v1, next_sibling);
        };
        versions.push(BorderVersionStamp {
            border: Some(border),
            version: v1,
        });

        for (tail, slot) in slots {
            let mut full_key = prefix.clone();
            full_key.extend_from_slice(&tail);
            if end_ep != ScanEndpoint::Inf && compare_keys(&full_key, end) == std::cmp::Ordering::Greater {
                return Ok(());
            }
            match slot.lv {
                LinkOrValue::Value(v) => {
                    if key_in_range(&full_key, begin, begin_ep, end, end_ep) {
                        entries.push(ScanEntry {
                            key: full_key,
                            value: v.as_slice().to_vec(),
                        });
                        if max != 0 && entries.len() >= max {
                            return Ok(());
                        }
                    }
                }
                LinkOrValue::Next(cell) => {
                    // SAFETY: the cell is kept alive by the same reasoning
                    // as `Tree::descend`'s layer crossing.
                    let next_root = unsafe { (*cell).load() };
                    if !next_root.is_null() {
                        scan_subtree(next_root, full_key, begin, begin_ep, end, end_ep, max, entries, versions)?;
                        if max != 0 && entries.len() >= max {
                            return Ok(());
                        }
                    }
                }
                LinkOrValue::Empty => {}
            }
        }

        if next_sibling.is_null() {
            return Ok(());
        }
        border = next_sibling;
    }
}

/// "Give me the greatest key": descend the rightmost child/sibling chain
/// all the way down, following a final next-layer pointer if the maximum
/// entry at the bottom layer is itself a promoted subtree (spec.md §8 S6).
fn scan_reverse_max1(tree: &Tree) -> CoreResult<ScanResult> {
    let mut versions = Vec::new();
    let root = tree.root();
    if root.is_null() {
        versions.push(BorderVersionStamp {
            border: None,
            version: VersionBody::EMPTY,
        });
        return Ok(ScanResult {
            entries: Vec::new(),
            versions,
        });
    }
    let entry = find_max(root, Vec::new(), &mut versions)?;
    Ok(ScanResult {
        entries: entry.into_iter().collect(),
        versions,
    })
}

fn find_max(start: NodePtr, prefix: Vec<u8>, versions: &mut Vec<BorderVersionStamp>) -> CoreResult<Option<ScanEntry>> {
    let mut cur = start;
    let mut restarts = 0usize;
    'restart: loop {
        // SAFETY: `cur` is kept alive by the same reasoning as elsewhere in
        // this module's descent helpers.
        let node = unsafe { &*cur };
        match node {
            Node::Interior(interior) => {
                if restarts >= MAX_DESCENT_RESTARTS {
                    return Err(CoreError::RetriesExceeded);
                }
                let v1 = match node.version().stable_snapshot() {
                    Some(v) => v,
                    None => {
                        restarts += 1;
                        continue 'restart;
                    }
                };
                let last = interior.child_at(interior.count());
                let v2 = match node.version().stable_snapshot() {
                    Some(v) => v,
                    None => {
                        restarts += 1;
                        continue 'restart;
                    }
                };
                if v1.vsplit() != v2.vsplit() {
                    restarts += 1;
                    continue 'restart;
                }
                cur = last;
            }
            Node::Border(_) => break,
        }
    }
    find_max_from_border(cur, prefix, versions)
}

fn find_max_from_border(border: NodePtr, prefix: Vec<u8>, versions: &mut Vec<BorderVersionStamp>) -> CoreResult<Option<ScanEntry>> {
    // SAFETY: `border` was reached by a validated descent/sibling walk.
    let node = unsafe { &*border };
    let b = node.as_border().unwrap();
    let mut restarts = 0usize;
    let (snapshot, v1, next) = loop {
        if restarts >= MAX_DESCENT_RESTARTS {
            return Err(CoreError::RetriesExceeded);
        }
        let v1 = match node.version().stable_snapshot() {
            Some(v) => v,
            None => {
                restarts += 1;
                continue;
            }
        };
        let snapshot = b.snapshot_entries();
        let next = b.next.load(Ordering::Acquire);
        let v2 = match node.version().stable_snapshot() {
            Some(v) => v,
            None => {
                restarts += 1;
                continue;
            }
        };
        if v1.vsplit() != v2.vsplit() || v1.vinsert() != v2.vinsert() {
            restarts += 1;
            continue;
        }
        break (snapshot, v1, next);
    };
    // A concurrent split may have moved the true maximum into a right
    // sibling that this border's parent doesn't know about yet.
    if !next.is_null() {
        return find_max_from_border(next, prefix, versions);
    }
    versions.push(BorderVersionStamp {
        border: Some(border),
        version: v1,
    });
    match snapshot.into_iter().last() {
        None => Ok(None),
        Some((tail, slot)) => {
            let mut full_key = prefix;
            full_key.extend_from_slice(&tail);
            match slot.lv {
                LinkOrValue::Value(v) => Ok(Some(ScanEntry {
                    key: full_key,
                    value: v.as_slice().to_vec(),
                })),
                LinkOrValue::Next(cell) => {
                    // SAFETY: see `walk_borders_forward`'s Next arm.
                    let next_root = unsafe { (*cell).load() };
                    find_max(next_root, full_key, versions)
                }
                LinkOrValue::Empty => Ok(None),
            }
        }
    }
}

// ---------------------------------------------------------------------
// teardown
// ---------------------------------------------------------------------

/// Recursively free every node, value, and nested [`LayerRoot`] cell
/// reachable from `root`. Only safe when no session can still reach any
/// part of this tree — full-storage teardown (`destroy`/`delete_storage`),
/// never a live, concurrently-accessed tree.
///
/// # Safety
/// No concurrent session may hold a reference into this tree.
pub unsafe fn free_subtree(root: NodePtr) {
    if root.is_null() {
        return;
    }
    let node = &*root;
    match node {
        Node::Interior(interior) => {
            for i in 0..=interior.count() {
                free_subtree(interior.child_at(i));
            }
        }
        Node::Border(b) => {
            let perm = b.perm.load();
            for r in 0..perm.count() {
                let idx = perm.index_at_rank(r);
                let (_, _, _, lv) = b.get_lv(idx);
                if let Some(cell) = lv.as_next() {
                    free_subtree((*cell).load());
                    free_layer_root(cell);
                }
            }
        }
    }
    free_node(root);
}
