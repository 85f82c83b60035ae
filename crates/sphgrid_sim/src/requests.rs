use bevy::prelude::*;
use sphgrid_storage::PointSet;
use std::path::PathBuf;

/// Actions requested by the GUI. Applied between frames, before the tick.
#[derive(Event, Debug, Clone, PartialEq)]
pub enum SimRequest {
    TogglePause,
    Reset,
    InvertNormals,
    /// Switch to the next legal particle count
    CycleParticleCount,
    SetKernelScale(f32),
    SetSpeed(f32),
    SetSurfaceThreshold(f32),
    /// Offset control moved; pauses until `EndScrub`
    ScrubOffset([f32; 3]),
    EndScrub,
    Export(PointSet),
    SaveSnapshot,
    LoadLatestSnapshot,
    /// Visualization settings changed
    MarkFieldDirty,
}

/// Emitted once after a frame whose field-dirty flag was set
#[derive(Event, Debug, Clone, Copy)]
pub struct FieldRebuildRequested {
    pub frame: u64,
}

/// Last user-facing message (export path, rejected setting, ...)
#[derive(Resource, Debug, Default)]
pub struct SimStatus {
    pub message: String,
}

impl SimStatus {
    pub fn set(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }
}

/// Where exports and snapshots are written
#[derive(Resource, Debug, Clone)]
pub struct OutputDirs {
    pub exports: PathBuf,
    pub snapshots: PathBuf,
}

impl Default for OutputDirs {
    fn default() -> Self {
        Self {
            exports: PathBuf::from("exports"),
            snapshots: PathBuf::from("snapshots"),
        }
    }
}
