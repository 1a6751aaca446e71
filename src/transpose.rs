//! Reordering visibilities between the by-baseline and by-frequency layouts.
//!
//! Both layouts hold the same elements, indexed by baseline, fine channel,
//! polarisation and complex component. Polarisation and component are always
//! the fastest two axes; the layouts differ only in which of baseline and fine
//! channel is outermost.

use ndarray::{ArrayView3, ArrayViewMut3};

use crate::{constants::NUM_COMPLEX_COMPONENTS, gpubox_files::GpuboxError};

/// The order of a visibility buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisLayout {
    /// `[baseline][fine chan][pol][re, im]`. Native to MWAX.
    ByBaseline,
    /// `[fine chan][baseline][pol][re, im]`. Native to the legacy correlator.
    ByFrequency,
}

/// The dimensions of the visibilities of one timestep and coarse channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisShape {
    /// Baselines, autocorrelations included
    pub num_baselines: usize,
    /// Fine channels in the coarse channel
    pub num_fine_chans: usize,
    /// Polarisation products per baseline
    pub num_visibility_pols: usize,
}

impl VisShape {
    /// Total floats in a buffer of this shape.
    pub fn num_floats(&self) -> usize {
        self.num_baselines * self.num_fine_chans * self.num_visibility_pols * NUM_COMPLEX_COMPONENTS
    }

    fn floats_per_vis(&self) -> usize {
        self.num_visibility_pols * NUM_COMPLEX_COMPONENTS
    }

    /// Outer, middle and inner axis lengths of `layout`.
    fn dims(&self, layout: VisLayout) -> (usize, usize, usize) {
        match layout {
            VisLayout::ByBaseline => (self.num_baselines, self.num_fine_chans, self.floats_per_vis()),
            VisLayout::ByFrequency => {
                (self.num_fine_chans, self.num_baselines, self.floats_per_vis())
            }
        }
    }

    /// The index of one float in a buffer of `layout`.
    pub fn offset(
        &self,
        layout: VisLayout,
        baseline: usize,
        fine_chan: usize,
        pol: usize,
        component: usize,
    ) -> usize {
        let inner = pol * NUM_COMPLEX_COMPONENTS + component;
        match layout {
            VisLayout::ByBaseline => {
                (baseline * self.num_fine_chans + fine_chan) * self.floats_per_vis() + inner
            }
            VisLayout::ByFrequency => {
                (fine_chan * self.num_baselines + baseline) * self.floats_per_vis() + inner
            }
        }
    }
}

/// Copy `src`, held in `src_layout`, into `dst` in `dst_layout`.
///
/// Every element of `src` lands in `dst` exactly once; values are untouched.
///
/// # Errors
///
/// [`GpuboxError::BufferSizeMismatch`] unless both buffers hold exactly
/// [`VisShape::num_floats`] floats.
pub fn transpose(
    shape: &VisShape,
    src: &[f32],
    src_layout: VisLayout,
    dst: &mut [f32],
    dst_layout: VisLayout,
) -> Result<(), GpuboxError> {
    let expected = shape.num_floats();
    for got in [src.len(), dst.len()] {
        if got != expected {
            return Err(GpuboxError::BufferSizeMismatch { expected, got });
        }
    }

    if src_layout == dst_layout {
        dst.copy_from_slice(src);
        return Ok(());
    }

    let size_mismatch = |_| GpuboxError::BufferSizeMismatch {
        expected,
        got: expected,
    };
    let src_view = ArrayView3::from_shape(shape.dims(src_layout), src).map_err(size_mismatch)?;
    let mut dst_view =
        ArrayViewMut3::from_shape(shape.dims(dst_layout), dst).map_err(size_mismatch)?;
    dst_view.assign(&src_view.permuted_axes([1, 0, 2]));
    Ok(())
}
