//! Errors associated with reading gpubox files.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::{LEGACY_CORR_VER, MWAX_CORR_VER};

#[derive(Error, Debug)]
/// Errors from reading, validating and serving gpubox files
pub enum GpuboxError {
    #[error("Invalid timestep index provided. The timestep index must be less than {0}")]
    /// A timestep index beyond the observation
    InvalidTimeStepIndex(usize),

    #[error("Invalid coarse chan index provided. The coarse chan index must be less than {0}")]
    /// A coarse channel index beyond the observation
    InvalidCoarseChanIndex(usize),

    #[error("No gpubox / mwax fits files were supplied")]
    /// An empty list of gpubox files
    NoGpuboxes,

    #[error("There are a mixture of gpubox filename types!")]
    /// Legacy and MWAX filenames in the one observation
    Mixture,

    #[error("Could not identify the gpubox filename structure for {0:?}")]
    /// A filename matching none of the known gpubox patterns
    Unrecognised(String),

    #[error(r#"OBSID {gpubox_obsid} from {gpubox_filename:?} does not match expected value of obs_id from metafits file {obsid}
maybe you have a mix of different files?"#)]
    /// A gpubox file from another observation
    ObsidMismatch {
        /// The metafits observation id
        obsid: u32,
        /// The offending file
        gpubox_filename: PathBuf,
        /// The `OBSID` the file carries
        gpubox_obsid: u32,
    },

    #[error("Correlator version mismatch: gpubox filenames indicate OldLegacy or Legacy but {gpubox_filename:?} has CORR_VER = {gpu_corr_version_value}")]
    /// A legacy named file with a non legacy `CORR_VER`
    CorrVerMismatch {
        /// The offending file
        gpubox_filename: PathBuf,
        /// The `CORR_VER` the file carries
        gpu_corr_version_value: u8,
    },

    #[error("{gpubox_filename:?} has CORR_VER = {corr_ver}, only {LEGACY_CORR_VER} (legacy) and {MWAX_CORR_VER} (MWAX) are supported")]
    /// A `CORR_VER` belonging to no known correlator
    UnsupportedCorrVer {
        /// The offending file
        gpubox_filename: PathBuf,
        /// The `CORR_VER` the file carries
        corr_ver: u8,
    },

    #[error("Failed to read key CORR_VER from MWAX gpubox file {0:?}")]
    /// An MWAX named file without `CORR_VER`
    MwaxCorrVerMissing(PathBuf),

    #[error("MWAX gpubox file {0:?} had a CORR_VER not equal to 2")]
    /// An MWAX named file with a non MWAX `CORR_VER`
    MwaxCorrVerMismatch(PathBuf),

    #[error("The gpubox file {gpubox_filename:?} has no data HDUs")]
    /// A gpubox file holding only a primary HDU
    NoDataHDUsInGpuboxFile {
        /// The offending file
        gpubox_filename: PathBuf,
    },

    #[error("The MWAX gpubox file {gpubox_filename:?} has {num_data_hdus} data HDUs, expected visibility and weights HDUs in pairs")]
    /// An MWAX file whose HDUs aren't visibility / weights pairs
    OddMwaxHduCount {
        /// The offending file
        gpubox_filename: PathBuf,
        /// HDUs after the primary
        num_data_hdus: usize,
    },

    #[error("NINPUTS {gpubox_num_rf_inputs} in {gpubox_filename:?} does not match NINPUTS {metafits_num_rf_inputs} in the metafits")]
    /// A gpubox file correlating a different number of inputs
    NinputsMismatch {
        /// The offending file
        gpubox_filename: PathBuf,
        /// `NINPUTS` in the gpubox file
        gpubox_num_rf_inputs: usize,
        /// `NINPUTS` in the metafits file
        metafits_num_rf_inputs: usize,
    },

    #[error("{gpubox_filename:?} HDU {hdu_num} is {naxis1}x{naxis2} (NAXIS1 x NAXIS2), expected {expected_naxis1}x{expected_naxis2} from metafits baselines [{metafits_baselines}], fine chans per coarse [{metafits_fine_chans_per_coarse}] and pols [{visibility_pols}] * 2 [r,i]")]
    /// An image HDU whose shape doesn't fit the metafits counts
    NaxisMismatch {
        /// The offending file
        gpubox_filename: PathBuf,
        /// The offending HDU
        hdu_num: usize,
        /// `NAXIS1` read
        naxis1: usize,
        /// `NAXIS2` read
        naxis2: usize,
        /// `NAXIS1` the metafits implies
        expected_naxis1: usize,
        /// `NAXIS2` the metafits implies
        expected_naxis2: usize,
        /// Baselines from the metafits
        metafits_baselines: usize,
        /// Fine channels per coarse channel from the metafits
        metafits_fine_chans_per_coarse: usize,
        /// Visibility polarisations
        visibility_pols: usize,
    },

    #[error("{gpubox_filename:?} holds gpubox channel {channel_identifier}, which is not one of the metafits coarse channels {expected}")]
    /// A gpubox file for a coarse channel the metafits doesn't list
    UnknownChannel {
        /// The offending file
        gpubox_filename: PathBuf,
        /// The channel number from the filename
        channel_identifier: usize,
        /// The gpubox numbers the metafits implies
        expected: String,
    },

    #[error("Timestep at UNIX {unix_time_ms} ms for gpubox channel {channel_identifier} is in both {first_filename:?} HDU {first_hdu} and {second_filename:?} HDU {second_hdu}")]
    /// Two HDUs claiming the same timestep and coarse channel
    DuplicateCoverage {
        /// UNIX time of the HDUs
        unix_time_ms: u64,
        /// The channel number from the filenames
        channel_identifier: usize,
        /// The first claimant
        first_filename: PathBuf,
        /// HDU index in the first file
        first_hdu: usize,
        /// The second claimant
        second_filename: PathBuf,
        /// HDU index in the second file
        second_hdu: usize,
    },

    #[error("No data exists for the provided timestep {timestep_index} and coarse channel {coarse_chan_index}.")]
    /// A gap in the observation
    NoDataForTimeStepCoarseChannel {
        /// Requested timestep index
        timestep_index: usize,
        /// Requested coarse channel index
        coarse_chan_index: usize,
    },

    #[error("Buffer of {got} floats supplied, a timestep / coarse channel needs exactly {expected}")]
    /// A caller buffer of the wrong length
    BufferSizeMismatch {
        /// Floats in one timestep and coarse channel
        expected: usize,
        /// Length of the supplied buffer
        got: usize,
    },

    #[error("The file handle for {gpubox_filename:?} is unusable after an earlier failure")]
    /// A file handle whose lock was poisoned by a panicking reader
    PoisonedFile {
        /// The unusable file
        gpubox_filename: PathBuf,
    },

    /// An error derived from `FitsError`.
    #[error("{0}")]
    Fits(#[from] crate::fits_read::FitsError),
}
