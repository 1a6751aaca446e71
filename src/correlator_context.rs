//! The main interface for reading an observation: a metafits file plus its
//! gpubox files.

use std::{
    fmt,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use fitsio::FitsFile;
use log::{debug, trace};

use crate::{
    error::GpufitsError,
    gpubox_files::{determine_gpubox_batches, read_gpubox_descriptor, GpuboxError, GpuboxFile},
    metadata::Metadata,
    metafits::MetafitsContext,
    transpose::{transpose, VisLayout},
    validation::{validate_observation, CoverageMap},
};

/// An open gpubox file.
///
/// `fitsio::FitsFile` owns a raw cfitsio pointer and so isn't `Send`. A
/// `GpuboxHandle` only ever lives inside one `Mutex` of a [`CorrelatorContext`]
/// and is only touched through that lock, so it is used by one thread at a
/// time. cfitsio keeps no state shared between distinct `fitsfile` pointers
/// when built reentrant, which moving a handle to another thread relies on.
struct GpuboxHandle(FitsFile);

// SAFETY: see above; access is serialised by the `Mutex` holding the handle.
unsafe impl Send for GpuboxHandle {}

/// An opened observation.
///
/// Every gpubox file stays open until [`CorrelatorContext::close`] is called or
/// the context is dropped. Reads take `&self` and may run concurrently from
/// many threads; reads of the same file are serialised.
///
/// # Examples
///
/// ```rust,no_run
/// use gpufits::CorrelatorContext;
///
/// let context = CorrelatorContext::new(
///     "1297526432.metafits",
///     &["1297526432_20210216160014_ch117_000.fits"],
/// )
/// .unwrap();
/// let metadata = context.metadata();
/// let timestep_index = metadata.common_timestep_indices[0];
/// let coarse_chan_index = metadata.common_coarse_chan_indices[0];
/// let vis = context
///     .read_by_baseline(timestep_index, coarse_chan_index)
///     .unwrap();
/// assert_eq!(vis.len(), metadata.num_timestep_coarse_chan_floats);
/// ```
pub struct CorrelatorContext {
    metadata: Metadata,
    metafits_context: MetafitsContext,
    gpubox_files: Vec<GpuboxFile>,
    coverage: CoverageMap,
    /// One handle per gpubox file, in the order of `gpubox_files`. `None` once
    /// closed.
    handles: Option<Vec<Mutex<GpuboxHandle>>>,
}

impl CorrelatorContext {
    /// Open an observation, validating every gpubox file against the metafits
    /// file.
    ///
    /// Either every file is opened and the observation is consistent, or an
    /// error is returned and nothing stays open.
    ///
    /// # Errors
    ///
    /// - [`GpufitsError::Metafits`] if the metafits file is missing,
    ///   unreadable, malformed or of an unsupported version
    /// - [`GpufitsError::Gpubox`] if the gpubox files are missing, unreadable,
    ///   malformed or inconsistent with the metafits file or each other
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        metafits: P,
        gpubox_paths: &[Q],
    ) -> Result<Self, GpufitsError> {
        let metafits_context = MetafitsContext::new(metafits)?;
        let (gpubox_files, corr_version) = determine_gpubox_batches(gpubox_paths)?;
        debug!(
            "opening {} {} gpubox files for obsid {}",
            gpubox_files.len(),
            corr_version,
            metafits_context.obsid
        );

        let mut handles = Vec::with_capacity(gpubox_files.len());
        let mut descriptors = Vec::with_capacity(gpubox_files.len());
        for file in &gpubox_files {
            let (fptr, descriptor) = read_gpubox_descriptor(file, corr_version)?;
            handles.push(Mutex::new(GpuboxHandle(fptr)));
            descriptors.push(descriptor);
        }

        let observation = validate_observation(&metafits_context, corr_version, &descriptors)?;
        let metadata = Metadata::new(
            &metafits_context,
            corr_version,
            &observation,
            gpubox_files.len(),
        );

        Ok(Self {
            metadata,
            metafits_context,
            gpubox_files,
            coverage: observation.coverage,
            handles: Some(handles),
        })
    }

    /// The observation's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The values read from the metafits file.
    pub fn metafits_context(&self) -> &MetafitsContext {
        &self.metafits_context
    }

    /// The gpubox files, in the order they were opened.
    pub fn gpubox_files(&self) -> &[GpuboxFile] {
        &self.gpubox_files
    }

    /// Whether [`CorrelatorContext::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.handles.is_none()
    }

    /// Release every file handle. Closing twice is not an error. Metadata
    /// stays available; reads fail with [`GpufitsError::AlreadyClosed`].
    pub fn close(&mut self) {
        if let Some(handles) = self.handles.take() {
            debug!(
                "closing {} gpubox files for obsid {}",
                handles.len(),
                self.metadata.obsid
            );
        }
    }

    /// Read the visibilities of one timestep and coarse channel, ordered
    /// `[baseline][fine chan][pol][re, im]`.
    ///
    /// # Errors
    ///
    /// See [`CorrelatorContext::read_by_baseline_into_buffer`].
    pub fn read_by_baseline(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
    ) -> Result<Vec<f32>, GpufitsError> {
        let mut buffer = vec![0.0; self.metadata.num_timestep_coarse_chan_floats];
        self.read_into(timestep_index, coarse_chan_index, &mut buffer, VisLayout::ByBaseline)?;
        Ok(buffer)
    }

    /// Read the visibilities of one timestep and coarse channel, ordered
    /// `[fine chan][baseline][pol][re, im]`.
    ///
    /// # Errors
    ///
    /// See [`CorrelatorContext::read_by_frequency_into_buffer`].
    pub fn read_by_frequency(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
    ) -> Result<Vec<f32>, GpufitsError> {
        let mut buffer = vec![0.0; self.metadata.num_timestep_coarse_chan_floats];
        self.read_into(timestep_index, coarse_chan_index, &mut buffer, VisLayout::ByFrequency)?;
        Ok(buffer)
    }

    /// Like [`CorrelatorContext::read_by_baseline`], into a caller-supplied
    /// buffer of exactly `num_timestep_coarse_chan_floats` floats.
    ///
    /// # Errors
    ///
    /// Checked in this order:
    ///
    /// - [`GpufitsError::AlreadyClosed`] after [`CorrelatorContext::close`]
    /// - [`GpuboxError::BufferSizeMismatch`] for a buffer of the wrong length
    /// - [`GpuboxError::InvalidTimeStepIndex`] or
    ///   [`GpuboxError::InvalidCoarseChanIndex`] for an index out of range
    /// - [`GpuboxError::NoDataForTimeStepCoarseChannel`] for a gap
    /// - [`GpuboxError::Fits`] if the read itself fails
    pub fn read_by_baseline_into_buffer(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
    ) -> Result<(), GpufitsError> {
        self.read_into(timestep_index, coarse_chan_index, buffer, VisLayout::ByBaseline)
    }

    /// Like [`CorrelatorContext::read_by_frequency`], into a caller-supplied
    /// buffer of exactly `num_timestep_coarse_chan_floats` floats.
    ///
    /// # Errors
    ///
    /// As for [`CorrelatorContext::read_by_baseline_into_buffer`].
    pub fn read_by_frequency_into_buffer(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
    ) -> Result<(), GpufitsError> {
        self.read_into(timestep_index, coarse_chan_index, buffer, VisLayout::ByFrequency)
    }

    fn read_into(
        &self,
        timestep_index: usize,
        coarse_chan_index: usize,
        buffer: &mut [f32],
        layout: VisLayout,
    ) -> Result<(), GpufitsError> {
        let handles = self.handles.as_ref().ok_or(GpufitsError::AlreadyClosed)?;

        let expected = self.metadata.num_timestep_coarse_chan_floats;
        if buffer.len() != expected {
            return Err(GpuboxError::BufferSizeMismatch {
                expected,
                got: buffer.len(),
            }
            .into());
        }
        if timestep_index >= self.metadata.num_timesteps {
            return Err(GpuboxError::InvalidTimeStepIndex(self.metadata.num_timesteps).into());
        }
        if coarse_chan_index >= self.metadata.num_coarse_chans {
            return Err(GpuboxError::InvalidCoarseChanIndex(self.metadata.num_coarse_chans).into());
        }
        let &(file_index, hdu_index) = self
            .coverage
            .get(&(timestep_index, coarse_chan_index))
            .ok_or(GpuboxError::NoDataForTimeStepCoarseChannel {
                timestep_index,
                coarse_chan_index,
            })?;

        trace!(
            "reading timestep {} coarse chan {} from {} hdu {}",
            timestep_index,
            coarse_chan_index,
            self.gpubox_files[file_index].filename.display(),
            hdu_index
        );
        let native = self.metadata.corr_version.native_layout();
        let mut guard = self.lock(handles, file_index)?;
        let fptr = &mut guard.0;
        let hdu = fits_open_hdu!(fptr, hdu_index).map_err(GpuboxError::from)?;
        if native == layout {
            get_fits_float_image_into_buffer!(fptr, &hdu, buffer).map_err(GpuboxError::from)?;
        } else {
            let mut scratch = vec![0.0; expected];
            get_fits_float_image_into_buffer!(fptr, &hdu, &mut scratch)
                .map_err(GpuboxError::from)?;
            drop(guard);
            transpose(&self.metadata.vis_shape(), &scratch, native, buffer, layout)?;
        }
        Ok(())
    }

    fn lock<'a>(
        &self,
        handles: &'a [Mutex<GpuboxHandle>],
        file_index: usize,
    ) -> Result<MutexGuard<'a, GpuboxHandle>, GpuboxError> {
        handles[file_index]
            .lock()
            .map_err(|_| GpuboxError::PoisonedFile {
                gpubox_filename: self.gpubox_files[file_index].filename.clone(),
            })
    }
}

impl fmt::Display for CorrelatorContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let m = &self.metadata;
        writeln!(f, "{}", self.metafits_context)?;
        writeln!(f, "CorrelatorContext (")?;
        writeln!(f, "    correlator version:       {}", m.corr_version)?;
        writeln!(f, "    open:                     {}", !self.is_closed())?;
        writeln!(f, "    gpubox files:             {}", m.num_gpubox_files)?;
        writeln!(f, "    timesteps:                {}", m.num_timesteps)?;
        writeln!(f, "    coarse channels:          {}", m.num_coarse_chans)?;
        writeln!(f, "    provided timesteps:       {:?}", m.provided_timestep_indices)?;
        writeln!(f, "    provided coarse channels: {:?}", m.provided_coarse_chan_indices)?;
        writeln!(f, "    common timesteps:         {:?}", m.common_timestep_indices)?;
        writeln!(f, "    common coarse channels:   {:?}", m.common_coarse_chan_indices)?;
        writeln!(f, "    common good timesteps:    {:?}", m.common_good_timestep_indices)?;
        writeln!(f, "    floats per read:          {}", m.num_timestep_coarse_chan_floats)?;
        writeln!(f, "    bytes per read:           {}", m.num_timestep_coarse_chan_bytes)?;
        for file in &self.gpubox_files {
            writeln!(
                f,
                "    gpubox batch {:03} ch {:03}: {}",
                file.batch_number,
                file.channel_identifier,
                file.filename.display()
            )?;
        }
        write!(f, ")")
    }
}
