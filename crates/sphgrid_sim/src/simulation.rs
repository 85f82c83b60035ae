use bevy::prelude::*;
use sphgrid_core::{
    ComputeDevice, GpuParticle, MeshBounds, SimConfig, SimStage, SimulationConfig, SphResult,
};
use sphgrid_physics::CpuDevice;
use sphgrid_physics::particle::{average_density, seed_particles_from};
use sphgrid_storage::{
    ExportFilter, ExportSummary, PointSet, SimulationSnapshot, export_to_dir, find_latest_snapshot,
    load_snapshot, save_snapshot,
};
use std::path::{Path, PathBuf};

use crate::error::SimError;

/// Explicit simulation state owned by the orchestrator
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub settings: SimConfig,
    pub bounds: MeshBounds,
    pub config: SimulationConfig,
    /// Stage currently executing; `Idle` between frames
    pub stage: SimStage,
    /// Frames fully advanced since the last reseed
    pub frame: u64,
    /// User pause
    pub paused: bool,
    /// An offset control is being dragged; frames are skipped until released
    pub scrubbing: bool,
    /// Visualization settings changed; reported once, never touches the passes
    pub field_dirty: bool,
    /// Reseeds so far, mixed into the spawn seed so each reset differs
    pub reseeds: u64,
}

impl SimulationState {
    pub fn is_paused(&self) -> bool {
        self.paused || self.scrubbing
    }
}

/// Result of one call to [`FluidSimulation::advance_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// False when the frame was skipped because the simulation is paused
    pub advanced: bool,
    /// The visualization field should be rebuilt by the render side
    pub field_rebuild: bool,
    pub frame: u64,
}

/// The orchestrator: sequences hash, sort, index build, rearrange and the
/// SPH passes on a compute device, and applies configuration between frames.
#[derive(Resource)]
pub struct FluidSimulation {
    state: SimulationState,
    device: Box<dyn ComputeDevice>,
    /// Mean density of the last host readback
    last_average_density: Option<f32>,
}

impl FluidSimulation {
    pub fn new(
        settings: SimConfig,
        bounds: MeshBounds,
        device: Box<dyn ComputeDevice>,
    ) -> Result<Self, SimError> {
        let config = SimulationConfig::derive(&settings, &bounds)?;
        let particles = seed_particles_from(&config, settings.seed);
        Self::from_config(settings, bounds, config, particles, device)
    }

    /// Start on the rayon device
    pub fn with_cpu(settings: SimConfig, bounds: MeshBounds) -> Result<Self, SimError> {
        Self::new(settings, bounds, Box::new(CpuDevice::new()))
    }

    /// Start from an explicit configuration and particle set.
    pub fn from_config(
        settings: SimConfig,
        bounds: MeshBounds,
        config: SimulationConfig,
        particles: Vec<GpuParticle>,
        mut device: Box<dyn ComputeDevice>,
    ) -> Result<Self, SimError> {
        device.configure(&config, &particles)?;
        Ok(Self {
            state: SimulationState {
                settings,
                bounds,
                config,
                stage: SimStage::Idle,
                frame: 0,
                paused: false,
                scrubbing: false,
                field_dirty: false,
                reseeds: 0,
            },
            device,
            last_average_density: None,
        })
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn settings(&self) -> &SimConfig {
        &self.state.settings
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.state.config
    }

    pub fn device_name(&self) -> &'static str {
        self.device.name()
    }

    pub fn last_average_density(&self) -> Option<f32> {
        self.last_average_density
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.state.paused = !self.state.paused;
    }

    pub fn mark_field_dirty(&mut self) {
        self.state.field_dirty = true;
    }

    /// Run one full frame, or skip it entirely while paused.
    pub fn advance_frame(&mut self) -> SphResult<FrameReport> {
        let field_rebuild = std::mem::take(&mut self.state.field_dirty);
        if self.state.is_paused() {
            return Ok(FrameReport {
                advanced: false,
                field_rebuild,
                frame: self.state.frame,
            });
        }

        let mut stage = SimStage::Idle.next();
        while stage != SimStage::Idle {
            self.state.stage = stage;
            if let Err(e) = self.run_stage(stage) {
                self.state.stage = SimStage::Idle;
                return Err(e);
            }
            stage = stage.next();
        }
        self.state.stage = SimStage::Idle;
        self.device.submit()?;
        self.state.frame += 1;

        Ok(FrameReport {
            advanced: true,
            field_rebuild,
            frame: self.state.frame,
        })
    }

    fn run_stage(&mut self, stage: SimStage) -> SphResult<()> {
        match stage {
            SimStage::Idle => Ok(()),
            SimStage::Hashing => self.device.hash_particles(),
            SimStage::Sorting => self.device.sort_keys(),
            SimStage::IndexBuilding => self.device.build_grid_indices(),
            SimStage::Rearranging => self.device.rearrange_particles(),
            SimStage::Evaluating => {
                self.device.evaluate_velocity()?;
                self.device.evaluate_density()
            }
        }
    }

    /// Build a configuration, seed it and hand both to the device. State is
    /// only committed once the device accepted the new buffers.
    fn reconfigure(
        &mut self,
        settings: SimConfig,
        bounds: MeshBounds,
        reseeds: u64,
    ) -> Result<(), SimError> {
        let config = SimulationConfig::derive(&settings, &bounds)?;
        let particles = seed_particles_from(&config, settings.seed.wrapping_add(reseeds));
        self.device.configure(&config, &particles)?;

        info!(
            "Reconfigured on {}: {} particles, grid {:?}, h = {:.5}",
            self.device.name(),
            config.particle_count,
            config.grid.dims,
            config.smoothing_length
        );
        self.state.settings = settings;
        self.state.bounds = bounds;
        self.state.config = config;
        self.state.reseeds = reseeds;
        self.state.frame = 0;
        Ok(())
    }

    /// Carry the running particles over to a new smoothing length. The grid
    /// follows `h`, so the device is configured again; frame and seed stay.
    fn regrid(&mut self, settings: SimConfig) -> Result<(), SimError> {
        let config = SimulationConfig::derive(&settings, &self.state.bounds)?;
        let particles = self.device.read_particles()?;
        self.device.configure(&config, &particles)?;

        debug!(
            "Kernel scale {} -> {}: h = {:.5}, grid {:?}",
            self.state.settings.kernel_scale,
            settings.kernel_scale,
            config.smoothing_length,
            config.grid.dims
        );
        self.state.settings = settings;
        self.state.config = config;
        Ok(())
    }

    /// Apply new settings between frames. Structural changes reallocate and
    /// reseed, a kernel scale change regrids the current particles, and
    /// speed, threshold and stiffness only refresh constants.
    pub fn apply_settings(&mut self, settings: SimConfig) -> Result<(), SimError> {
        if self.state.settings.requires_reseed(&settings) {
            let reseeds = self.state.reseeds;
            return self.reconfigure(settings, self.state.bounds, reseeds);
        }
        if self.state.settings.requires_regrid(&settings) {
            return self.regrid(settings);
        }
        let mut config = self.state.config.clone();
        config.apply_constants(&settings);
        self.device.update_constants(&config)?;
        self.state.config = config;
        self.state.settings = settings;
        Ok(())
    }

    /// New mesh bounds from the mesh-loading side
    pub fn set_bounds(&mut self, bounds: MeshBounds) -> Result<(), SimError> {
        let settings = self.state.settings.clone();
        let reseeds = self.state.reseeds;
        self.reconfigure(settings, bounds, reseeds)
    }

    /// Scatter a fresh particle cloud with the current settings.
    pub fn reset_particles(&mut self) -> Result<(), SimError> {
        let settings = self.state.settings.clone();
        let reseeds = self.state.reseeds + 1;
        self.reconfigure(settings, self.state.bounds, reseeds)
    }

    pub fn invert_normals(&mut self) -> Result<(), SimError> {
        let mut settings = self.state.settings.clone();
        settings.inverted_normals = !settings.inverted_normals;
        self.apply_settings(settings)
    }

    /// Move the spawn point while the offset control is held. Frames stay
    /// skipped until [`end_scrub`](Self::end_scrub).
    pub fn scrub_offset(&mut self, offset: [f32; 3]) -> Result<(), SimError> {
        self.state.scrubbing = true;
        let mut settings = self.state.settings.clone();
        settings.spawn_offset = offset;
        self.apply_settings(settings)
    }

    pub fn end_scrub(&mut self) {
        self.state.scrubbing = false;
    }

    /// Swap to another device carrying the current particles over. The old
    /// device stays in charge if the new one cannot be configured.
    pub fn replace_device(&mut self, mut device: Box<dyn ComputeDevice>) -> Result<(), SimError> {
        let particles = self.device.read_particles()?;
        device.configure(&self.state.config, &particles)?;
        info!("Compute device: {} -> {}", self.device.name(), device.name());
        self.device = device;
        Ok(())
    }

    /// Drain the device and copy the particles to the host. Blocks.
    pub fn read_particles(&mut self) -> SphResult<Vec<GpuParticle>> {
        let particles = self.device.read_particles()?;
        self.last_average_density = Some(average_density(&particles));
        Ok(particles)
    }

    /// Latest particle state available without stalling the device
    pub fn preview(&mut self) -> Option<&[GpuParticle]> {
        self.device.preview()
    }

    /// "save points" / "save surface points"
    pub fn export_points(&mut self, dir: &Path, set: PointSet) -> Result<ExportSummary, SimError> {
        let particles = self.read_particles()?;
        let filter = match set {
            PointSet::All => ExportFilter::All,
            PointSet::Surface => ExportFilter::MinDensity(self.state.config.surface_density),
        };
        Ok(export_to_dir(dir, set, &particles, filter)?)
    }

    pub fn save_snapshot(&mut self, dir: &Path) -> Result<PathBuf, SimError> {
        let particles = self.read_particles()?;
        let snapshot = SimulationSnapshot::new(
            self.state.frame,
            self.state.settings.clone(),
            self.state.bounds,
            particles,
        )
        .with_reseeds(self.state.reseeds);
        Ok(save_snapshot(dir, &snapshot)?)
    }

    /// Restore settings, bounds and particles from a snapshot file. A drag of
    /// the offset control in progress is dropped.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<(), SimError> {
        let snapshot = load_snapshot(path)?;
        let config = SimulationConfig::derive(&snapshot.settings, &snapshot.bounds)?;
        self.device.configure(&config, &snapshot.particles)?;

        self.state.settings = snapshot.settings;
        self.state.bounds = snapshot.bounds;
        self.state.config = config;
        self.state.frame = snapshot.frame;
        self.state.reseeds = snapshot.reseeds;
        self.state.scrubbing = false;
        self.state.stage = SimStage::Idle;
        Ok(())
    }

    pub fn load_latest_snapshot(&mut self, dir: &Path) -> Result<PathBuf, SimError> {
        let path = find_latest_snapshot(dir)
            .ok_or_else(|| SimError::NoSnapshot(dir.display().to_string()))?;
        self.load_snapshot(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphgrid_core::{ParticleCount, SphError};

    fn small_settings() -> SimConfig {
        SimConfig {
            particle_count: ParticleCount::K8,
            ..SimConfig::default()
        }
    }

    fn simulation() -> FluidSimulation {
        FluidSimulation::with_cpu(small_settings(), MeshBounds::default()).unwrap()
    }

    #[test]
    fn test_frame_advances_and_returns_to_idle() {
        let mut sim = simulation();
        let report = sim.advance_frame().unwrap();
        assert!(report.advanced);
        assert_eq!(report.frame, 1);
        assert_eq!(sim.state().stage, SimStage::Idle);
    }

    #[test]
    fn test_paused_frame_leaves_particles_untouched() {
        let mut sim = simulation();
        sim.advance_frame().unwrap();
        let before = sim.read_particles().unwrap();

        sim.set_paused(true);
        let report = sim.advance_frame().unwrap();
        assert!(!report.advanced);
        assert_eq!(report.frame, 1);
        assert_eq!(sim.read_particles().unwrap(), before);

        sim.toggle_pause();
        assert!(sim.advance_frame().unwrap().advanced);
    }

    #[test]
    fn test_field_dirty_reported_once_without_skipping() {
        let mut sim = simulation();
        sim.mark_field_dirty();
        let first = sim.advance_frame().unwrap();
        assert!(first.advanced && first.field_rebuild);
        let second = sim.advance_frame().unwrap();
        assert!(second.advanced && !second.field_rebuild);
    }

    #[test]
    fn test_density_written_after_frame() {
        let mut sim = simulation();
        sim.advance_frame().unwrap();
        let particles = sim.read_particles().unwrap();
        let floor = sim.config().self_density() * 0.999;
        assert!(particles.iter().all(|p| p.density >= floor));
        assert!(sim.last_average_density().unwrap() > sim.config().self_density());
    }

    #[test]
    fn test_constant_change_keeps_particles() {
        let mut sim = simulation();
        let before = sim.read_particles().unwrap();
        let settings = SimConfig {
            speed: 4.0,
            surface_threshold: 0.3,
            ..sim.settings().clone()
        };
        sim.apply_settings(settings).unwrap();
        assert_eq!(sim.read_particles().unwrap(), before);
        assert!((sim.config().time_step - 0.03).abs() < 1e-6);
        assert!((sim.config().surface_density - 300.0).abs() < 1e-2);
    }

    #[test]
    fn test_kernel_scale_change_keeps_running_state() {
        let mut sim = simulation();
        for _ in 0..3 {
            sim.advance_frame().unwrap();
        }
        let before = sim.read_particles().unwrap();
        let h = sim.config().smoothing_length;

        let settings = SimConfig {
            kernel_scale: 1.5,
            ..sim.settings().clone()
        };
        sim.apply_settings(settings).unwrap();
        assert_eq!(sim.state().frame, 3);
        assert_eq!(sim.state().reseeds, 0);
        assert_eq!(sim.read_particles().unwrap(), before);
        assert!((sim.config().smoothing_length - 0.75 * h).abs() < 1e-6);
        assert!(sim.config().grid.cell_size >= sim.config().smoothing_length);

        let report = sim.advance_frame().unwrap();
        assert!(report.advanced);
        assert_eq!(report.frame, 4);
    }

    #[test]
    fn test_snapshot_restores_reseeds_and_ends_scrub() {
        let dir =
            std::env::temp_dir().join(format!("sphgrid-sim-snapshot-{}", uuid::Uuid::new_v4()));
        let mut sim = simulation();
        sim.reset_particles().unwrap();
        sim.reset_particles().unwrap();
        sim.advance_frame().unwrap();
        sim.save_snapshot(&dir).unwrap();

        let mut other = simulation();
        other.scrub_offset([0.25, 0.0, 0.0]).unwrap();
        assert!(other.state().is_paused());
        other.load_latest_snapshot(&dir).unwrap();
        assert_eq!(other.state().reseeds, 2);
        assert_eq!(other.state().frame, 1);
        assert!(!other.state().scrubbing);
        assert!(other.advance_frame().unwrap().advanced);

        sim.reset_particles().unwrap();
        other.reset_particles().unwrap();
        assert_eq!(other.read_particles().unwrap(), sim.read_particles().unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_particle_count_change_reallocates() {
        let mut sim = simulation();
        sim.advance_frame().unwrap();
        let settings = SimConfig {
            particle_count: ParticleCount::K16,
            ..sim.settings().clone()
        };
        sim.apply_settings(settings).unwrap();
        assert_eq!(sim.read_particles().unwrap().len(), 16 * 1024);
        assert_eq!(sim.state().frame, 0);
    }

    #[test]
    fn test_failed_reconfiguration_keeps_last_config() {
        let mut sim = simulation();
        let before = sim.read_particles().unwrap();
        let err = sim
            .set_bounds(MeshBounds::new([0.0; 3], [1.0, -1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, SimError::Sph(SphError::InvalidBounds(_))));
        assert_eq!(sim.state().bounds, MeshBounds::default());
        assert_eq!(sim.read_particles().unwrap(), before);
    }

    #[test]
    fn test_reset_and_normals_reseed() {
        let mut sim = simulation();
        let before = sim.read_particles().unwrap();
        sim.reset_particles().unwrap();
        let after = sim.read_particles().unwrap();
        assert_ne!(before, after);

        sim.advance_frame().unwrap();
        sim.invert_normals().unwrap();
        assert_eq!(sim.config().normal_scale, -1.0);
        assert_eq!(sim.state().frame, 0);
        assert_eq!(sim.read_particles().unwrap(), after);
    }

    #[test]
    fn test_scrubbing_pauses_until_released() {
        let mut sim = simulation();
        sim.scrub_offset([0.5, 0.0, 0.0]).unwrap();
        assert!(!sim.advance_frame().unwrap().advanced);
        let center = sim.config().spawn_center;
        assert!((center[0] - 0.5).abs() < 1e-6);

        sim.end_scrub();
        assert!(sim.advance_frame().unwrap().advanced);
    }

    #[test]
    fn test_unconfigurable_device_is_not_adopted() {
        struct Broken;
        impl ComputeDevice for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn configure(&mut self, _: &SimulationConfig, _: &[GpuParticle]) -> SphResult<()> {
                Err(SphError::Allocation("out of memory".into()))
            }
            fn update_constants(&mut self, _: &SimulationConfig) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn hash_particles(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn sort_keys(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn build_grid_indices(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn rearrange_particles(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn evaluate_velocity(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn evaluate_density(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn submit(&mut self) -> SphResult<()> {
                Err(SphError::NotConfigured)
            }
            fn read_particles(&mut self) -> SphResult<Vec<GpuParticle>> {
                Err(SphError::NotConfigured)
            }
            fn preview(&mut self) -> Option<&[GpuParticle]> {
                None
            }
        }

        let mut sim = simulation();
        assert!(sim.replace_device(Box::new(Broken)).is_err());
        assert_eq!(sim.device_name(), "cpu");
        assert!(sim.advance_frame().unwrap().advanced);

        let err = FluidSimulation::new(small_settings(), MeshBounds::default(), Box::new(Broken));
        assert!(matches!(err, Err(SimError::Sph(SphError::Allocation(_)))));
    }
}
