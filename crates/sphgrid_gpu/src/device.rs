use bevy::log::{debug, info};
use bevy::render::render_resource::*;
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bytemuck::Pod;
use sphgrid_core::{
    ComputeDevice, GpuParticle, GridKey, GridRange, SimulationConfig, SphError, SphResult,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::buffers::{ParticleBuffers, ReadbackBuffer};
use super::context::GpuContext;
use super::dispatch;

const PREVIEW_IDLE: u8 = 0;
const PREVIEW_PENDING: u8 = 1;
const PREVIEW_READY: u8 = 2;
const PREVIEW_FAILED: u8 = 3;

/// Non-blocking copy of the particle buffer for display. A new copy is
/// requested only once the previous one has been consumed.
#[derive(Default)]
struct Preview {
    state: Arc<AtomicU8>,
    particles: Vec<GpuParticle>,
}

/// `ComputeDevice` on Bevy's render device. Passes are recorded into one
/// command encoder per frame and submitted together.
pub struct GpuDevice {
    device: RenderDevice,
    queue: RenderQueue,
    context: GpuContext,
    buffers: Option<ParticleBuffers>,
    encoder: Option<CommandEncoder>,
    preview: Preview,
}

impl GpuDevice {
    pub fn new(device: RenderDevice, queue: RenderQueue) -> Self {
        let context = GpuContext::new(&device);
        Self {
            device,
            queue,
            context,
            buffers: None,
            encoder: None,
            preview: Preview::default(),
        }
    }

    /// Record one stage into the frame encoder.
    fn record(
        &mut self,
        encode: fn(&mut CommandEncoder, &GpuContext, &ParticleBuffers),
    ) -> SphResult<()> {
        let buffers = self.buffers.as_ref().ok_or(SphError::NotConfigured)?;
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("sph_frame_encoder"),
            })
        });
        encode(encoder, &self.context, buffers);
        Ok(())
    }

    /// Copy `source` into `staging`, wait for the device and cast the bytes.
    fn blocking_read<T: Pod>(&self, source: &Buffer, staging: &ReadbackBuffer) -> SphResult<Vec<T>> {
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging.staging, 0, staging.size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        self.device.map_buffer(&slice, MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        // Drains every submission, including the frame passes
        self.device.poll(Maintain::Wait);

        rx.recv()
            .map_err(|e| SphError::Readback(e.to_string()))?
            .map_err(|e| SphError::Readback(e.to_string()))?;

        let values = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&data[..]).to_vec()
        };
        staging.staging.unmap();
        Ok(values)
    }

    /// Sorted grid keys as of the last submitted frame. Blocks.
    pub fn read_keys(&mut self) -> SphResult<Vec<GridKey>> {
        self.submit()?;
        let buffers = self.buffers.as_ref().ok_or(SphError::NotConfigured)?;
        let staging = ReadbackBuffer::with_size(&self.device, "key_readback", buffers.keys.size());
        self.blocking_read(&buffers.keys, &staging)
    }

    /// Per-cell ranges as of the last submitted frame. Blocks.
    pub fn read_ranges(&mut self) -> SphResult<Vec<GridRange>> {
        self.submit()?;
        let buffers = self.buffers.as_ref().ok_or(SphError::NotConfigured)?;
        let staging =
            ReadbackBuffer::with_size(&self.device, "range_readback", buffers.ranges.size());
        self.blocking_read(&buffers.ranges, &staging)
    }

    fn poll_preview(&mut self) {
        let Some(buffers) = self.buffers.as_ref() else {
            return;
        };
        self.device.poll(Maintain::Poll);

        match self.preview.state.load(Ordering::Acquire) {
            PREVIEW_READY => {
                let slice = buffers.preview.staging.slice(..);
                {
                    let data = slice.get_mapped_range();
                    self.preview.particles.clear();
                    self.preview
                        .particles
                        .extend_from_slice(bytemuck::cast_slice(&data[..]));
                }
                buffers.preview.staging.unmap();
                self.preview.state.store(PREVIEW_IDLE, Ordering::Release);
            }
            PREVIEW_FAILED => {
                debug!("Particle preview mapping failed, retrying");
                self.preview.state.store(PREVIEW_IDLE, Ordering::Release);
            }
            PREVIEW_IDLE => {
                let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
                    label: Some("preview_copy_encoder"),
                });
                dispatch::encode_particle_copy(
                    &mut encoder,
                    buffers,
                    &buffers.preview.staging,
                    buffers.preview.size,
                );
                self.queue.submit(std::iter::once(encoder.finish()));

                self.preview.state.store(PREVIEW_PENDING, Ordering::Release);
                let state = Arc::clone(&self.preview.state);
                let slice = buffers.preview.staging.slice(..);
                self.device.map_buffer(&slice, MapMode::Read, move |result| {
                    let next = if result.is_ok() {
                        PREVIEW_READY
                    } else {
                        PREVIEW_FAILED
                    };
                    state.store(next, Ordering::Release);
                });
            }
            _ => {}
        }
    }
}

impl ComputeDevice for GpuDevice {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn configure(&mut self, config: &SimulationConfig, particles: &[GpuParticle]) -> SphResult<()> {
        let fresh = ParticleBuffers::new(
            &self.device,
            (&self.context.sim_layout, &self.context.sort_layout),
            config,
            particles,
        )?;
        // Work recorded against the old buffers is dropped with them.
        self.encoder = None;
        self.buffers = Some(fresh);
        self.preview = Preview::default();
        info!(
            "GPU buffers ready: {} particles, {} cells",
            config.particle_count,
            config.grid.cell_count()
        );
        Ok(())
    }

    fn update_constants(&mut self, config: &SimulationConfig) -> SphResult<()> {
        let buffers = self.buffers.as_ref().ok_or(SphError::NotConfigured)?;
        self.queue
            .write_buffer(&buffers.params, 0, bytemuck::bytes_of(&config.sim_params()));
        Ok(())
    }

    fn hash_particles(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_hash)
    }

    fn sort_keys(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_sort)
    }

    fn build_grid_indices(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_grid_indices)
    }

    fn rearrange_particles(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_rearrange)
    }

    fn evaluate_velocity(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_velocity)
    }

    fn evaluate_density(&mut self) -> SphResult<()> {
        self.record(dispatch::encode_density)
    }

    fn submit(&mut self) -> SphResult<()> {
        if self.buffers.is_none() {
            return Err(SphError::NotConfigured);
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn read_particles(&mut self) -> SphResult<Vec<GpuParticle>> {
        self.submit()?;
        let buffers = self.buffers.as_ref().ok_or(SphError::NotConfigured)?;
        self.blocking_read(&buffers.particles, &buffers.readback)
    }

    fn preview(&mut self) -> Option<&[GpuParticle]> {
        self.poll_preview();
        if self.preview.particles.is_empty() {
            None
        } else {
            Some(&self.preview.particles)
        }
    }
}
