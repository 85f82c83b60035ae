//! On-disk formats: OFF-like point exports and bincode simulation snapshots.

pub mod error;
pub mod export;
pub mod snapshot;

pub use error::StorageError;
pub use export::{ExportFilter, ExportSummary, PointSet, export_to_dir, save_points, write_points};
pub use snapshot::{SimulationSnapshot, find_latest_snapshot, load_snapshot, save_snapshot};
