use serde::{Deserialize, Serialize};
use sphgrid_core::{GpuParticle, MeshBounds, SimConfig};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StorageError;

pub const SNAPSHOT_EXTENSION: &str = "bin";

/// Everything needed to resume a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub id: Uuid,
    pub frame: u64,
    /// Reseed counter, so a reset after loading gives the same cloud it would have
    pub reseeds: u64,
    pub settings: SimConfig,
    pub bounds: MeshBounds,
    pub particles: Vec<GpuParticle>,
}

impl SimulationSnapshot {
    pub fn new(frame: u64, settings: SimConfig, bounds: MeshBounds, particles: Vec<GpuParticle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            frame,
            reseeds: 0,
            settings,
            bounds,
            particles,
        }
    }

    pub fn with_reseeds(mut self, reseeds: u64) -> Self {
        self.reseeds = reseeds;
        self
    }

    pub fn file_name(&self) -> String {
        format!("snapshot-{:08}-{}.{SNAPSHOT_EXTENSION}", self.frame, self.id)
    }
}

/// Save a snapshot into `dir` as bincode, returning the file path
pub fn save_snapshot(dir: &Path, snapshot: &SimulationSnapshot) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
    let path = dir.join(snapshot.file_name());
    let data = bincode::serialize(snapshot)?;
    fs::write(&path, data).map_err(|e| StorageError::io(&path, e))?;
    Ok(path)
}

/// Load a snapshot from disk
pub fn load_snapshot(path: &Path) -> Result<SimulationSnapshot, StorageError> {
    let data = fs::read(path).map_err(|e| StorageError::io(path, e))?;
    Ok(bincode::deserialize(&data)?)
}

/// Most recently modified snapshot in `dir`, if any
pub fn find_latest_snapshot(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION))
        .max_by_key(|e| e.metadata().and_then(|m| m.modified()).ok())
        .map(|e| e.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphgrid_core::ParticleCount;

    #[test]
    fn test_snapshot_save_and_load() {
        let dir = std::env::temp_dir().join(format!("sphgrid-snapshot-{}", Uuid::new_v4()));
        let settings = SimConfig {
            particle_count: ParticleCount::K32,
            speed: 2.5,
            ..SimConfig::default()
        };
        let particles = vec![
            GpuParticle::with_density([1.0, 2.0, 3.0], 900.0),
            GpuParticle::with_density([-1.0, 0.0, 0.5], 12.0),
        ];
        let snapshot =
            SimulationSnapshot::new(42, settings, MeshBounds::default(), particles).with_reseeds(3);

        let path = save_snapshot(&dir, &snapshot).unwrap();
        assert_eq!(find_latest_snapshot(&dir), Some(path.clone()));
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.reseeds, 3);
        assert_eq!(loaded, snapshot);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_snapshot() {
        let path = std::env::temp_dir().join(format!("missing-{}.bin", Uuid::new_v4()));
        assert!(matches!(load_snapshot(&path), Err(StorageError::Io { .. })));
        assert_eq!(find_latest_snapshot(&path), None);
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = std::env::temp_dir().join(format!("sphgrid-corrupt-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.bin");
        fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(load_snapshot(&path), Err(StorageError::Encode(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
