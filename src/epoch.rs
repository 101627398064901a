//! Epoch-based reclamation (spec.md §4.7 C7).
//!
//! Each session publishes the current global epoch into its slot on
//! `enter`; retired nodes are stamped with the global epoch at retirement
//! time and only freed once every active session has advanced past that
//! stamp. The background tick and `run_gc_once` use a coarse timer instead
//! of a CAS loop, modeled on `examples/original_source/src/clock.h`'s
//! `sleepMs`/`check_clock_span` pair (SPEC_FULL.md §3 item 3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::trace;

use crate::link_or_value::ValueBuf;
use crate::node::{free_node, NodePtr};
use crate::session::SessionTable;

/// What was retired: a node (freed via `free_node`) or a value buffer
/// (freed by ordinary `Drop`, once no reader can still hold a `&[u8]`
/// derived from it). Both need the same epoch-deferred treatment: a reader
/// copies bytes out of a `ValueBuf` only inside a stable-snapshot bracket,
/// but the bracket check happens after the copy, so the buffer must outlive
/// every session that could have started such a copy before the replace
/// (spec.md §5 "ownership transfers ... retirement transfers ownership to
/// the session's garbage list").
enum Retired {
    Node(NodePtr),
    Value(ValueBuf),
}

struct Garbage {
    item: Retired,
    retired_epoch: u64,
}

// SAFETY: a `Garbage` entry is only ever touched by the reclaimer while
// holding `Reclaimer::garbage`'s mutex, and a `Node` pointer is never
// dereferenced until `free_node` is called on it under that same lock;
// `Value` is a `ValueBuf`, itself `Send`.
unsafe impl Send for Garbage {}

/// Global epoch counter plus the per-session retirement queue.
pub struct Reclaimer {
    global_epoch: AtomicU64,
    garbage: Mutex<Vec<Garbage>>,
    tick: Duration,
    last_tick: Mutex<Instant>,
}

impl Reclaimer {
    pub fn new(tick: Duration) -> Reclaimer {
        Reclaimer {
            global_epoch: AtomicU64::new(0),
            garbage: Mutex::new(Vec::new()),
            tick,
            last_tick: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn current_epoch(&self) -> u64 {
        self.global_epoch.load(Ordering::Acquire)
    }

    /// Advance the global epoch if at least one tick interval has elapsed
    /// since the last advance. Called opportunistically by callers (e.g. on
    /// `enter`) as well as by a background thread, per spec.md §4.7's
    /// allowance for callers to piggyback the advance.
    pub fn maybe_tick(&self) {
        let mut last = self.last_tick.lock().unwrap();
        if last.elapsed() >= self.tick {
            let next = self.global_epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *last = Instant::now();
            trace!("epoch advanced to {next}");
        }
    }

    /// Hand a retired node to the reclaimer, stamped with the current
    /// global epoch.
    pub fn retire_node(&self, ptr: NodePtr) {
        let epoch = self.current_epoch();
        self.garbage.lock().unwrap().push(Garbage {
            item: Retired::Node(ptr),
            retired_epoch: epoch,
        });
    }

    /// Hand a retired value buffer to the reclaimer (a replaced or deleted
    /// slot's old value), stamped with the current global epoch.
    pub fn retire_value(&self, value: ValueBuf) {
        let epoch = self.current_epoch();
        self.garbage.lock().unwrap().push(Garbage {
            item: Retired::Value(value),
            retired_epoch: epoch,
        });
    }

    /// Free every retired node whose stamp is older than every active
    /// session's epoch. Safe to call from any thread holding no node locks;
    /// used both by the background thread and by `Context::run_gc_once` for
    /// deterministic test-driven reclamation (SPEC_FULL.md §3 item 3).
    pub fn collect(&self, sessions: &SessionTable) {
        let safe = sessions.min_active_epoch().unwrap_or(self.current_epoch());
        let mut garbage = self.garbage.lock().unwrap();
        let (to_free, keep): (Vec<Garbage>, Vec<Garbage>) =
            garbage.drain(..).partition(|g| g.retired_epoch < safe);
        *garbage = keep;
        drop(garbage);
        let freed = to_free.len();
        for g in to_free {
            match g.item {
                // SAFETY: no session with epoch <= g.retired_epoch remains
                // active, so no reader can still hold a pointer derived
                // from a descent that observed this node.
                Retired::Node(ptr) => unsafe { free_node(ptr) },
                // A plain Rust drop: safe for the same reason (no session
                // could still be copying out of it).
                Retired::Value(_) => {}
            }
        }
        if freed > 0 {
            trace!("reclaimed {freed} node(s), safe epoch = {safe}");
        }
    }

    pub fn pending_garbage(&self) -> usize {
        self.garbage.lock().unwrap().len()
    }
}
