use sphgrid_core::SphError;
use sphgrid_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Sph(#[from] SphError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no snapshot found in {0}")]
    NoSnapshot(String),
}
