//! External status codes and internal core errors.
//!
//! The facade (`put`/`get`/`scan`/...) is specified as a C-style status
//! return rather than `Result<T, E>` — see spec.md §6/§7. `Status` is that
//! contract. `CoreError` is the internal plumbing error the tree/ops layer
//! uses; the facade collapses it onto `Status` at the boundary.

use thiserror::Error;

/// Endpoint kind for a scan bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEndpoint {
    /// No bound on this side.
    Inf,
    Inclusive,
    Exclusive,
}

/// Status codes returned by facade operations (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Status {
    #[error("ok")]
    Ok,
    #[error("ok: key not found")]
    OkNotFound,
    #[error("ok: all storages destroyed")]
    OkDestroyAll,
    #[error("warn: key does not exist")]
    WarnNotExist,
    #[error("warn: storage does not exist")]
    WarnStorageNotExist,
    #[error("warn: storage already exists")]
    WarnExist,
    #[error("warn: unique restriction violated")]
    WarnUniqueRestriction,
    #[error("warn: maximum number of sessions reached")]
    WarnMaxSessions,
    #[error("warn: invalid session token")]
    WarnInvalidToken,
    #[error("error: contradictory arguments")]
    ErrBadUsage,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok | Status::OkNotFound | Status::OkDestroyAll)
    }
}

/// Internal error used by the core tree/operations layer.
#[derive(Debug, Error)]
pub(crate) enum CoreError {
    #[error("node arena exhausted")]
    ArenaExhausted,
    #[error("optimistic descent exceeded its retry budget")]
    RetriesExceeded,
    #[error("scan arguments are contradictory: {0}")]
    BadScanArgs(&'static str),
    #[error("value buffer alignment must be a power of two")]
    BadAlignment,
}

impl From<CoreError> for Status {
    fn from(e: CoreError) -> Status {
        match e {
            CoreError::ArenaExhausted | CoreError::RetriesExceeded => Status::ErrBadUsage,
            CoreError::BadScanArgs(_) => Status::ErrBadUsage,
            CoreError::BadAlignment => Status::ErrBadUsage,
        }
    }
}

pub(crate) type CoreResult<T> = Result<T, CoreError>;
