use thiserror::Error;

use post_tracker_state_store::StoreError;

#[derive(Clone, Debug, Error)]
pub enum LedgerError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("baseline request not delivered: {0}")]
    Bridge(String),
    #[error("baseline request superseded")]
    Superseded,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
