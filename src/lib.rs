//! stratokv - an in-memory, concurrent, ordered key-value index.
//!
//! A layered B+-tree ("Masstree"-style trie of fixed-width 8-byte key
//! slices): optimistic lock coupling on a per-node version word, node
//! split/merge, cross-layer descent on key collisions, and epoch-based
//! reclamation of retired nodes. The core concurrency algorithm lives in
//! [`tree`]/[`ops`]; this module is the thin process-level facade (config,
//! session table, storage registry, background reclaimer) around it,
//! keeping the engine and its surrounding plumbing split apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;

use crate::epoch::Reclaimer;
use crate::link_or_value::ValueBuf;
use crate::ops::{BorderVersionStamp, PutOutcome, RemoveOutcome, ScanEntry};
use crate::session::SessionTable;
use crate::status::{ScanEndpoint, Status};
use crate::storage::StorageRegistry;

pub mod border;
pub mod debug;
pub mod epoch;
pub mod interior;
pub mod key;
pub mod link_or_value;
pub mod node;
pub mod ops;
pub mod permutation;
pub mod session;
pub mod status;
pub mod storage;
pub mod tree;
pub mod version;

pub use session::Token;
pub use status::{ScanEndpoint as Endpoint, Status as KvStatus};

/// Runtime configuration, passed to [`Context::init`] (SPEC_FULL.md §2.3).
/// Replaces the original implementation's compile-time constants
/// (`KVS_MAX_PARALLEL_THREADS`, a ~40ms GC tick) with fields on a config
/// struct.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the session/token table.
    pub max_sessions: usize,
    /// Minimum spacing between global epoch advances.
    pub epoch_tick: Duration,
    /// How often the background reclaimer thread wakes to tick the epoch
    /// and sweep garbage.
    pub gc_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_sessions: 128,
            epoch_tick: Duration::from_millis(40),
            gc_interval: Duration::from_millis(40),
        }
    }
}

struct Inner {
    registry: StorageRegistry,
    sessions: SessionTable,
    reclaimer: Reclaimer,
}

/// The process-level context bundling the storage registry, session table,
/// and reclaimer (spec.md §4.9 DESIGN NOTES "bundle global mutable state
/// into a single context object instead of true globals"). Obtained from
/// [`Context::init`], released with [`Context::fin`].
pub struct Context {
    inner: Arc<Inner>,
    stop: Arc<AtomicBool>,
    gc_thread: Option<JoinHandle<()>>,
}

impl Context {
    /// Initialize registries and start the background reclaimer thread
    /// (spec.md §6 `init()`).
    pub fn init(config: Config) -> Context {
        let inner = Arc::new(Inner {
            registry: StorageRegistry::new(),
            sessions: SessionTable::new(config.max_sessions),
            reclaimer: Reclaimer::new(config.epoch_tick),
        });
        let stop = Arc::new(AtomicBool::new(false));
        let thread_inner = inner.clone();
        let thread_stop = stop.clone();
        let gc_interval = config.gc_interval;
        let gc_thread = std::thread::Builder::new()
            .name("stratokv-reclaimer".to_string())
            .spawn(move || {
                info!("reclaimer thread started");
                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::sleep(gc_interval);
                    thread_inner.reclaimer.maybe_tick();
                    thread_inner.reclaimer.collect(&thread_inner.sessions);
                }
                info!("reclaimer thread stopped");
            })
            .expect("failed to spawn reclaimer thread");
        Context {
            inner,
            stop,
            gc_thread: Some(gc_thread),
        }
    }

    /// Quiesce the reclaimer thread and free every storage (spec.md §6
    /// `fin()`).
    pub fn fin(mut self) -> Status {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.gc_thread.take() {
            let _ = handle.join();
        }
        self.destroy()
    }

    pub fn enter(&self) -> (Status, Option<Token>) {
        match self.inner.sessions.enter(self.inner.reclaimer.current_epoch()) {
            Ok(token) => (Status::Ok, Some(token)),
            Err(status) => (status, None),
        }
    }

    pub fn leave(&self, token: Token) -> Status {
        self.inner.sessions.leave(token)
    }

    pub fn create_storage(&self, name: &str) -> Status {
        self.inner.registry.create_storage(name)
    }

    pub fn delete_storage(&self, name: &str) -> Status {
        self.inner.registry.delete_storage(name)
    }

    pub fn find_storage(&self, name: &str) -> Status {
        if self.inner.registry.find_storage(name).is_some() {
            Status::Ok
        } else {
            Status::WarnStorageNotExist
        }
    }

    /// spec.md §6 `put(token, storage, key, value, alignment?, allow_insert?)`.
    pub fn put(
        &self,
        token: Token,
        storage: &str,
        key: &[u8],
        value: &[u8],
        alignment: usize,
        allow_insert: bool,
    ) -> Status {
        if !self.inner.sessions.is_active(token) {
            return Status::WarnInvalidToken;
        }
        let tree = match self.inner.registry.find_storage(storage) {
            Some(t) => t,
            None => return Status::WarnStorageNotExist,
        };
        let value_buf = match ValueBuf::alloc(value, alignment) {
            Ok(v) => v,
            Err(e) => return e.into(),
        };
        self.inner.sessions.refresh(token, self.inner.reclaimer.current_epoch());
        match ops::put(&tree, key, value_buf, allow_insert, &self.inner.reclaimer) {
            Ok(PutOutcome::Created) | Ok(PutOutcome::Replaced) => Status::Ok,
            Ok(PutOutcome::Rejected) => Status::WarnUniqueRestriction,
            Err(e) => e.into(),
        }
    }

    /// spec.md §6 `get(storage, key, &out)`.
    pub fn get(&self, storage: &str, key: &[u8]) -> (Status, Option<Vec<u8>>) {
        let tree = match self.inner.registry.find_storage(storage) {
            Some(t) => t,
            None => return (Status::WarnStorageNotExist, None),
        };
        match ops::get(&tree, key) {
            Ok(Some(v)) => (Status::Ok, Some(v)),
            Ok(None) => (Status::WarnNotExist, None),
            Err(e) => (e.into(), None),
        }
    }

    /// spec.md §6 `remove(token, storage, key)`.
    pub fn remove(&self, token: Token, storage: &str, key: &[u8]) -> Status {
        if !self.inner.sessions.is_active(token) {
            return Status::WarnInvalidToken;
        }
        let tree = match self.inner.registry.find_storage(storage) {
            Some(t) => t,
            None => return Status::WarnStorageNotExist,
        };
        self.inner.sessions.refresh(token, self.inner.reclaimer.current_epoch());
        match ops::remove(&tree, key, &self.inner.reclaimer) {
            Ok(RemoveOutcome::Removed) => Status::Ok,
            Ok(RemoveOutcome::NotFound) => Status::OkNotFound,
            Err(e) => e.into(),
        }
    }

    /// spec.md §6 `scan(storage, begin, begin_ep, end, end_ep, out_tuples,
    /// out_versions?, max, reverse)`.
    #[allow(clippy::too_many_arguments)]
    pub fn scan(
        &self,
        storage: &str,
        begin: &[u8],
        begin_ep: ScanEndpoint,
        end: &[u8],
        end_ep: ScanEndpoint,
        max: usize,
        reverse: bool,
    ) -> (Status, Vec<ScanEntry>, Vec<BorderVersionStamp>) {
        let tree = match self.inner.registry.find_storage(storage) {
            Some(t) => t,
            None => return (Status::WarnStorageNotExist, Vec::new(), Vec::new()),
        };
        match ops::scan(&tree, begin, begin_ep, end, end_ep, max, reverse) {
            Ok(result) => (Status::Ok, result.entries, result.versions),
            Err(e) => (e.into(), Vec::new(), Vec::new()),
        }
    }

    /// spec.md §6 `destroy()`: tear down every storage, freeing all nodes.
    pub fn destroy(&self) -> Status {
        for tree in self.inner.registry.drain() {
            // SAFETY: the tree has just been removed from the registry, so
            // no new operation can start on it; `destroy`/`fin` are
            // documented as not being called concurrently with in-flight
            // operations on the storages being destroyed.
            unsafe { ops::free_subtree(tree.root()) };
        }
        Status::OkDestroyAll
    }

    /// SPEC_FULL.md §3 item 1: debug dump of a storage's tree structure.
    pub fn display(&self, storage: &str) -> (Status, String) {
        match self.inner.registry.find_storage(storage) {
            Some(tree) => (Status::Ok, debug::display_tree(&tree)),
            None => (Status::WarnStorageNotExist, String::new()),
        }
    }

    /// SPEC_FULL.md §3 item 3: deterministic reclamation for tests, without
    /// waiting on the background thread's clock.
    pub fn run_gc_once(&self) {
        self.inner.reclaimer.maybe_tick();
        self.inner.reclaimer.collect(&self.inner.sessions);
    }

    pub fn active_session_count(&self) -> usize {
        self.inner.sessions.active_count()
    }

    pub fn pending_garbage(&self) -> usize {
        self.inner.reclaimer.pending_garbage()
    }
}
