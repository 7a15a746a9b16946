use playertrack_core::error::CoreError;
use playertrack_core::lookup::RefreshRefusal;
use playertrack_core::types::DbId;
use playertrack_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Player {0} not found")]
    PlayerNotFound(DbId),

    #[error("Lookup {0} not found")]
    LookupNotFound(DbId),

    #[error("Refresh refused: {0:?}")]
    RefreshRefused(RefreshRefusal),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
