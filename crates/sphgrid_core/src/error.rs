use thiserror::Error;

use crate::constants::BITONIC_BLOCK_SIZE;

/// Failures surfaced by configuration and compute devices.
///
/// Numerical edge cases never show up here; kernel math clamps them.
#[derive(Debug, Error)]
pub enum SphError {
    #[error(
        "particle count {0} is not a power-of-two multiple of the {BITONIC_BLOCK_SIZE}-element sort block"
    )]
    InvalidParticleCount(u32),

    #[error("invalid mesh bounds: {0}")]
    InvalidBounds(String),

    #[error("grid needs {cells} cells, limit is {limit}")]
    GridTooLarge { cells: u32, limit: u32 },

    #[error("device allocation failed: {0}")]
    Allocation(String),

    #[error("buffer readback failed: {0}")]
    Readback(String),

    #[error("compute device has no particle buffers configured")]
    NotConfigured,
}

pub type SphResult<T> = Result<T, SphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SphError::InvalidParticleCount(1000);
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("512"));

        let e = SphError::GridTooLarge {
            cells: 40_000,
            limit: 32_768,
        };
        assert_eq!(e.to_string(), "grid needs 40000 cells, limit is 32768");
    }
}
