//! Bitonic sort network over `GridKey` records.
//!
//! The keys are viewed as a matrix of `n / 512` rows by 512 columns. Merge
//! levels up to 512 sort each row independently. Every larger level is a
//! transpose, a column sort, a transpose back and a row sort, so that every
//! compare-exchange stays inside one 512-element block.

use rayon::prelude::*;
use sphgrid_core::{
    BITONIC_BLOCK_SIZE, GridKey, SortParams, SphError, SphResult, validate_sort_len,
};

/// Which of the two key buffers a step touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBuffer {
    Keys,
    Scratch,
}

impl SortBuffer {
    pub fn other(self) -> Self {
        match self {
            Self::Keys => Self::Scratch,
            Self::Scratch => Self::Keys,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStep {
    /// In-place bitonic merge of every 512-element block of `target`
    Bitonic { target: SortBuffer, params: SortParams },
    /// `source` (height rows x width columns) transposed into the other buffer
    Transpose { source: SortBuffer, params: SortParams },
}

impl SortStep {
    pub fn params(&self) -> SortParams {
        match *self {
            Self::Bitonic { params, .. } | Self::Transpose { params, .. } => params,
        }
    }
}

/// Fixed sequence of steps sorting `len` keys. Shared by the CPU executor and
/// the GPU encoder so both run the identical network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPlan {
    len: u32,
    steps: Vec<SortStep>,
}

impl SortPlan {
    pub fn new(len: u32) -> SphResult<Self> {
        validate_sort_len(len)?;

        let width = BITONIC_BLOCK_SIZE;
        let height = len / width;
        let mut steps = Vec::new();

        let mut level = 2;
        while level <= width {
            steps.push(SortStep::Bitonic {
                target: SortBuffer::Keys,
                params: SortParams {
                    level,
                    level_mask: level,
                    width,
                    height,
                },
            });
            level <<= 1;
        }

        while level <= len {
            let column = SortParams {
                level: level / width,
                level_mask: (level & !len) / width,
                width,
                height,
            };
            let row = SortParams {
                level: width,
                level_mask: level,
                width: height,
                height: width,
            };
            steps.push(SortStep::Transpose {
                source: SortBuffer::Keys,
                params: column,
            });
            steps.push(SortStep::Bitonic {
                target: SortBuffer::Scratch,
                params: column,
            });
            steps.push(SortStep::Transpose {
                source: SortBuffer::Scratch,
                params: row,
            });
            steps.push(SortStep::Bitonic {
                target: SortBuffer::Keys,
                params: row,
            });
            level <<= 1;
        }

        Ok(Self { len, steps })
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn steps(&self) -> &[SortStep] {
        &self.steps
    }

    /// Run the plan over `keys`, using `scratch` for the transposed matrix.
    pub fn execute(&self, keys: &mut [GridKey], scratch: &mut [GridKey]) -> SphResult<()> {
        let n = self.len as usize;
        if keys.len() != n || scratch.len() != n {
            return Err(SphError::InvalidParticleCount(keys.len() as u32));
        }
        for step in &self.steps {
            match *step {
                SortStep::Bitonic { target, params } => match target {
                    SortBuffer::Keys => bitonic_pass(keys, params),
                    SortBuffer::Scratch => bitonic_pass(scratch, params),
                },
                SortStep::Transpose { source, params } => match source {
                    SortBuffer::Keys => transpose(keys, scratch, params.width, params.height),
                    SortBuffer::Scratch => transpose(scratch, keys, params.width, params.height),
                },
            }
        }
        Ok(())
    }
}

/// Sort `keys` ascending by `(cell, particle)`.
pub fn sort_keys(keys: &mut [GridKey]) -> SphResult<()> {
    let plan = SortPlan::new(keys.len() as u32)?;
    let mut scratch = vec![GridKey::default(); keys.len()];
    plan.execute(keys, &mut scratch)
}

/// One bitonic merge level applied to each 512-element block.
///
/// Within a block the compare distance halves from `level / 2` to 1. A pair is
/// ordered descending when `level_mask` has a bit set in the pair's global
/// index, ascending otherwise.
pub fn bitonic_pass(data: &mut [GridKey], params: SortParams) {
    let block = BITONIC_BLOCK_SIZE as usize;
    data.par_chunks_mut(block)
        .enumerate()
        .for_each(|(b, chunk)| {
            let base = b * block;
            let mut j = (params.level >> 1) as usize;
            while j > 0 {
                for t in 0..chunk.len() / 2 {
                    let lo = (t / j) * 2 * j + t % j;
                    let hi = lo + j;
                    let descending = params.level_mask & (base + lo) as u32 != 0;
                    if (chunk[lo].sort_key() > chunk[hi].sort_key()) != descending {
                        chunk.swap(lo, hi);
                    }
                }
                j >>= 1;
            }
        });
}

/// `dst[c * height + r] = src[r * width + c]`
pub fn transpose(src: &[GridKey], dst: &mut [GridKey], width: u32, height: u32) {
    let (width, height) = (width as usize, height as usize);
    dst.par_chunks_mut(height)
        .enumerate()
        .for_each(|(c, column)| {
            for (r, slot) in column.iter_mut().enumerate() {
                *slot = src[r * width + c];
            }
        });
}
