//! Session/token registry (spec.md §4.7 C8).
//!
//! A bounded table of slots; each active session publishes the epoch it
//! last observed so the reclaimer can compute a safe reclamation point.
//! Sized by `Config::max_sessions`, grounded in
//! `examples/original_source/test/include/global_variables_decralation.h`'s
//! implied fixed `KVS_MAX_PARALLEL_THREADS` (SPEC_FULL.md §3 item 4).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, warn};

use crate::status::Status;

/// Opaque session identity, handed back by [`SessionTable::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub(crate) usize);

struct Slot {
    active: AtomicBool,
    epoch: AtomicU64,
}

pub struct SessionTable {
    slots: Vec<Slot>,
    /// Guards slot acquisition so two `enter` calls never race onto the
    /// same free slot.
    admission: Mutex<()>,
}

impl SessionTable {
    pub fn new(max_sessions: usize) -> SessionTable {
        let slots = (0..max_sessions)
            .map(|_| Slot {
                active: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            })
            .collect();
        SessionTable {
            slots,
            admission: Mutex::new(()),
        }
    }

    /// Admit a new session, publishing `epoch` into its slot.
    pub fn enter(&self, epoch: u64) -> Result<Token, Status> {
        let _guard = self.admission.lock().unwrap();
        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.active.load(Ordering::Relaxed) {
                slot.epoch.store(epoch, Ordering::Release);
                slot.active.store(true, Ordering::Release);
                debug!("session {idx} entered at epoch {epoch}");
                return Ok(Token(idx));
            }
        }
        warn!("session table full ({} slots)", self.slots.len());
        Err(Status::WarnMaxSessions)
    }

    pub fn leave(&self, token: Token) -> Status {
        match self.slots.get(token.0) {
            Some(slot) if slot.active.load(Ordering::Relaxed) => {
                slot.active.store(false, Ordering::Release);
                debug!("session {} left", token.0);
                Status::Ok
            }
            _ => {
                warn!("leave() with invalid token {}", token.0);
                Status::WarnInvalidToken
            }
        }
    }

    /// Republish the current global epoch into an active session's slot, so
    /// the reclaimer does not treat a long-lived idle session as pinning
    /// ancient garbage forever once it re-enters an operation.
    pub fn refresh(&self, token: Token, epoch: u64) {
        if let Some(slot) = self.slots.get(token.0) {
            if slot.active.load(Ordering::Relaxed) {
                slot.epoch.store(epoch, Ordering::Release);
            }
        }
    }

    pub fn is_active(&self, token: Token) -> bool {
        self.slots
            .get(token.0)
            .is_some_and(|s| s.active.load(Ordering::Relaxed))
    }

    /// The minimum epoch across all active sessions, i.e. the epoch below
    /// which every retired node is unreachable. `None` when no session is
    /// active (the reclaimer then treats the current epoch as safe).
    pub fn min_active_epoch(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter(|s| s.active.load(Ordering::Relaxed))
            .map(|s| s.epoch.load(Ordering::Acquire))
            .min()
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.active.load(Ordering::Relaxed))
            .count()
    }
}
