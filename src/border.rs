//! Border (leaf) nodes (spec.md §3 "Border node", §4.4 C4).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::key::{KeySlice, SLICE_LEN};
use crate::link_or_value::{LayerRoot, LinkOrValue, ValueBuf};
use crate::node::{Node, NodeHeader, NodePtr};
use crate::permutation::{PermState, Permutation, BORDER_CAPACITY};
use crate::version::VersionBody;

/// One occupied-or-not slot in a border node. Occupancy and ordering are
/// tracked out-of-band by the [`Permutation`]; a slot not named by any rank
/// of the current permutation is logically absent even if its fields are
/// stale leftovers from a prior tenant.
#[derive(Default)]
pub struct Slot {
    pub slice: u64,
    /// Meaningful bytes packed into `slice`: 0..=8. `8` means the chunk is
    /// entirely full; whether that implies "more bytes live inline in
    /// `suffix`" or "more bytes live in a deeper layer" is decided by `lv`.
    pub len: u8,
    /// Only ever `Some` when `len == 8` and `lv` is `Value`: the key's bytes
    /// beyond this slice, stored inline because (so far) no other key
    /// collides on the same 9-byte prefix (spec.md §4.4 policy: promote to
    /// a next layer only once a second key forces disambiguation).
    pub suffix: Option<Box<[u8]>>,
    pub lv: LinkOrValue,
}

impl Slot {
    /// Whether `key[layer_offset..]` matches this slot's `(slice, len,
    /// suffix)` exactly (i.e. this is the same key, not merely a same-slice
    /// collision that needs deeper disambiguation).
    fn matches(&self, key: &[u8], layer_offset: usize) -> bool {
        let rest = &key[layer_offset..];
        if self.len < 8 {
            return rest.len() == self.len as usize && KeySlice::from_bytes(rest).slice == self.slice;
        }
        // len == 8: either an inline long key (suffix present/absent) or a
        // next-layer pointer, which the caller handles before calling
        // `matches` for equality purposes. Here we only check the inline
        // case.
        if rest.len() < SLICE_LEN {
            return false;
        }
        let chunk = KeySlice::from_bytes(&rest[..SLICE_LEN]);
        if chunk.slice != self.slice {
            return false;
        }
        match &self.suffix {
            Some(suf) => rest[SLICE_LEN..] == **suf,
            None => rest.len() == SLICE_LEN,
        }
    }
}

pub struct BorderNode {
    pub header: NodeHeader,
    pub perm: Permutation,
    slots: UnsafeCell<[Slot; BORDER_CAPACITY]>,
    pub prev: AtomicPtr<Node>,
    pub next: AtomicPtr<Node>,
}

// SAFETY: all mutation of `slots` happens while the caller holds
// `header.version`'s writer lock; all reads happen after validating a
// stable version snapshot bracketing the read (spec.md §4.4).
unsafe impl Sync for BorderNode {}

/// Outcome of [`BorderNode::stable_find`].
pub enum FindResult {
    /// No slot at or after `rank` matches; `rank` is the sorted insertion
    /// point for a new key.
    NotFound { rank: usize },
    /// An exact match, whether it stores a value or a next-layer pointer.
    Matched { rank: usize, slot_index: usize },
    /// A different key shares this slot's full 8-byte slice (and, if one is
    /// already present, the same `suffix`'s leading 8 bytes do not continue
    /// matching) — this slot must be promoted to a next-layer pointer
    /// before the new key can be inserted (spec.md §4.4 "layer promotion").
    Collision { rank: usize, slot_index: usize },
}

impl BorderNode {
    pub fn new(is_root: bool) -> BorderNode {
        BorderNode {
            header: NodeHeader::new(true, is_root),
            perm: Permutation::new(),
            slots: UnsafeCell::new(std::array::from_fn(|_| Slot::default())),
            prev: AtomicPtr::new(std::ptr::null_mut()),
            next: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    #[inline]
    unsafe fn slot_ref(&self, idx: usize) -> &Slot {
        &(*self.slots.get())[idx]
    }

    /// # Safety
    /// Caller must hold `header.version`'s writer lock.
    #[inline]
    unsafe fn slot_mut(&self, idx: usize) -> &mut Slot {
        &mut (*self.slots.get())[idx]
    }

    /// Reader-side lookup: no lock required. Scans the permutation-ordered
    /// slots comparing against `key[layer_offset..]` (spec.md §4.4
    /// `stable_find`). The caller is expected to have already taken a
    /// stable version snapshot before calling this, and to re-validate
    /// afterwards.
    pub fn stable_find(&self, key: &[u8], layer_offset: usize) -> FindResult {
        let perm = self.perm.load();
        let target = KeySlice::at(key, layer_offset);
        for rank in 0..perm.count() {
            let idx = perm.index_at_rank(rank);
            // SAFETY: reader access; caller re-validates the version word
            // around the whole stable_find call.
            let slot = unsafe { self.slot_ref(idx) };
            match (slot.slice, slot.len).cmp(&(target.slice, target.len)) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Greater => return FindResult::NotFound { rank },
                std::cmp::Ordering::Equal => {
                    if slot.len < 8 || slot.lv.as_next().is_some() || slot.matches(key, layer_offset) {
                        return FindResult::Matched {
                            rank,
                            slot_index: idx,
                        };
                    }
                    return FindResult::Collision {
                        rank,
                        slot_index: idx,
                    };
                }
            }
        }
        FindResult::NotFound {
            rank: perm.count(),
        }
    }

    pub fn get_lv(&self, slot_index: usize) -> (u64, u8, Option<&[u8]>, &LinkOrValue) {
        // SAFETY: called only after the caller has validated the slot is
        // still present under a stable version snapshot.
        let slot = unsafe { self.slot_ref(slot_index) };
        (
            slot.slice,
            slot.len,
            slot.suffix.as_deref(),
            &slot.lv,
        )
    }

    pub fn count(&self) -> usize {
        self.perm.load().count()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= BORDER_CAPACITY
    }

    /// Find a free (unoccupied per the permutation) slot array index.
    fn free_slot_index(&self, perm: PermState) -> Option<usize> {
        let occupied: Vec<bool> = {
            let mut occ = [false; BORDER_CAPACITY];
            for r in 0..perm.count() {
                occ[perm.index_at_rank(r)] = true;
            }
            occ.to_vec()
        };
        occupied.iter().position(|&o| !o)
    }

    /// Insert a brand new value slot. Requires the caller to hold the lock;
    /// marks `inserting` so readers retry, then the caller must `unlock()`
    /// to publish (spec.md §4.4 `insert_slot`).
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn insert_value_slot(
        &self,
        rank: usize,
        key_tail: &[u8],
        value: ValueBuf,
    ) -> Result<(), ()> {
        let perm = self.perm.load();
        if perm.count() >= BORDER_CAPACITY {
            return Err(());
        }
        let idx = self.free_slot_index(perm).ok_or(())?;
        let (chunk, suffix): (KeySlice, Option<Box<[u8]>>) = if key_tail.len() <= SLICE_LEN {
            (KeySlice::from_bytes(key_tail), None)
        } else {
            (
                KeySlice::from_bytes(&key_tail[..SLICE_LEN]),
                Some(key_tail[SLICE_LEN..].to_vec().into_boxed_slice()),
            )
        };
        let slot = self.slot_mut(idx);
        slot.slice = chunk.slice;
        slot.len = chunk.len;
        slot.suffix = suffix;
        slot.lv = LinkOrValue::Value(value);
        self.header.version.begin_insert();
        self.perm.publish(perm.insert_rank(rank, idx));
        Ok(())
    }

    /// Replace the value of an existing slot in place (spec.md §4.8 `Put`
    /// step 3). Returns the retired old value so the caller can hand it to
    /// the epoch reclaimer.
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn replace_value(&self, slot_index: usize, value: ValueBuf) -> LinkOrValue {
        let slot = self.slot_mut(slot_index);
        let old = std::mem::replace(&mut slot.lv, LinkOrValue::Value(value));
        self.header.version.begin_insert();
        old
    }

    /// Promote an existing value slot (which collides with a new key on a
    /// 9-byte prefix) into a next-layer pointer, returning the old value so
    /// both it and the new key can be reinserted into the new layer
    /// (spec.md §4.4 "layer promotion").
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn promote_to_next_layer(
        &self,
        slot_index: usize,
        next_layer_root: NodePtr,
    ) -> (ValueBuf, Option<Box<[u8]>>) {
        let slot = self.slot_mut(slot_index);
        let old_suffix = slot.suffix.take();
        let cell = LayerRoot::alloc(next_layer_root);
        let old = std::mem::replace(&mut slot.lv, LinkOrValue::Next(cell));
        self.header.version.begin_insert();
        let value = match old {
            LinkOrValue::Value(v) => v,
            _ => unreachable!("promote_to_next_layer called on a non-value slot"),
        };
        (value, old_suffix)
    }

    /// Mark a slot empty (spec.md §4.4 `delete_slot`). Returns the retired
    /// payload.
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn delete_rank(&self, rank: usize) -> LinkOrValue {
        let perm = self.perm.load();
        let idx = perm.index_at_rank(rank);
        let slot = self.slot_mut(idx);
        slot.suffix = None;
        let old = slot.lv.take();
        self.header.version.begin_insert();
        self.perm.publish(perm.delete_rank(rank));
        old
    }

    /// Copy every occupied slot, in sorted order, as owned `(key_tail,
    /// LinkOrValue)` pairs without disturbing this node — used to build the
    /// split plan.
    pub fn snapshot_entries(&self) -> Vec<(Vec<u8>, Slot)> {
        let perm = self.perm.load();
        let mut out = Vec::with_capacity(perm.count());
        for r in 0..perm.count() {
            let idx = perm.index_at_rank(r);
            // SAFETY: caller holds the lock while snapshotting for a split.
            let slot = unsafe { self.slot_ref(idx) };
            let mut tail = slot.slice.to_be_bytes()[..slot.len as usize].to_vec();
            if let Some(suf) = &slot.suffix {
                tail.extend_from_slice(suf);
            }
            out.push((
                tail,
                Slot {
                    slice: slot.slice,
                    len: slot.len,
                    suffix: slot.suffix.clone(),
                    lv: match &slot.lv {
                        LinkOrValue::Value(v) => LinkOrValue::Value(
                            ValueBuf::alloc(v.as_slice(), v.align())
                                .expect("re-allocating with a previously-valid alignment cannot fail"),
                        ),
                        LinkOrValue::Next(p) => LinkOrValue::Next(*p),
                        LinkOrValue::Empty => LinkOrValue::Empty,
                    },
                },
            ));
        }
        out
    }

    /// Move ownership of every occupied slot out of this node, clearing it
    /// to empty, for use by `split` (avoids the double-allocation that
    /// `snapshot_entries` (used for read-only debug dumps) would cause).
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock.
    pub unsafe fn take_all(&self) -> Vec<(Vec<u8>, Slot)> {
        let perm = self.perm.load();
        let mut out = Vec::with_capacity(perm.count());
        for r in 0..perm.count() {
            let idx = perm.index_at_rank(r);
            let slot = self.slot_mut(idx);
            let mut tail = slot.slice.to_be_bytes()[..slot.len as usize].to_vec();
            if let Some(suf) = &slot.suffix {
                tail.extend_from_slice(suf);
            }
            let taken = Slot {
                slice: slot.slice,
                len: slot.len,
                suffix: slot.suffix.take(),
                lv: slot.lv.take(),
            };
            out.push((tail, taken));
        }
        self.perm.publish(PermState::EMPTY);
        out
    }

    /// Append a previously-taken slot at the next free array index, at
    /// sorted rank `rank`. Used when rebuilding a node from a split plan.
    ///
    /// # Safety
    /// Caller holds `header.version`'s writer lock and guarantees `rank` is
    /// consistent with insertion order (entries must be appended in
    /// ascending sorted order).
    pub unsafe fn append_taken(&self, rank: usize, slot: Slot) {
        let perm = self.perm.load();
        let idx = self.free_slot_index(perm).expect("node not full during rebuild");
        *self.slot_mut(idx) = slot;
        self.perm.publish(perm.insert_rank(rank, idx));
    }

    pub fn min_key_tail(&self) -> Option<Vec<u8>> {
        let perm = self.perm.load();
        if perm.count() == 0 {
            return None;
        }
        let idx = perm.index_at_rank(0);
        // SAFETY: reader snapshot use only (tests/debug); races are
        // acceptable there.
        let slot = unsafe { self.slot_ref(idx) };
        let mut tail = slot.slice.to_be_bytes()[..slot.len as usize].to_vec();
        if let Some(suf) = &slot.suffix {
            tail.extend_from_slice(suf);
        }
        Some(tail)
    }

    pub fn version_snapshot(&self) -> VersionBody {
        self.header.version.load()
    }
}
