//! Errors that can occur in gpufits

use thiserror::Error;

use crate::{
    constants::MAX_ERROR_MESSAGE_LEN, fits_read::FitsError, gpubox_files::GpuboxError,
    metafits::MetafitsError,
};

/// Why a set of files was rejected as not being one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    /// A gpubox `OBSID` differs from the metafits `GPSTIME`.
    ObsId,
    /// Antenna, baseline or channel counts disagree.
    Count,
    /// Two files (or two HDUs) claim the same timestep and coarse channel.
    DuplicateCoverage,
    /// A gpubox file holds a coarse channel the metafits doesn't declare.
    UndeclaredCoverage,
    /// Mixed filename families, or a `CORR_VER` that contradicts them.
    Version,
}

/// The machine-distinguishable category of a [`GpufitsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A path that doesn't exist.
    FileNotFound,
    /// A file that exists but isn't a readable FITS file.
    Unreadable,
    /// A header key that is missing, unparsable or nonsensical.
    MalformedHeader,
    /// A metafits format version or gpubox `CORR_VER` this crate can't read.
    UnsupportedVersion,
    /// The files don't describe one consistent observation.
    ObservationMismatch(MismatchReason),
    /// A timestep or coarse channel index beyond the observation.
    IndexOutOfRange,
    /// A timestep and coarse channel that no gpubox file covers.
    MissingDataForIndex,
    /// A read on a closed context.
    AlreadyClosed,
    /// cfitsio failed while reading data, or a file handle became unusable.
    IOFailure,
    /// A caller supplied argument is unusable (no gpubox files, wrong buffer size).
    InvalidArgument,
}

#[derive(Error, Debug)]
/// All the errors that can occur in gpufits
pub enum GpufitsError {
    #[error("{0}")]
    /// Error derived from [`MetafitsError`]
    Metafits(#[from] MetafitsError),

    #[error("{0}")]
    /// Error derived from [`GpuboxError`]
    Gpubox(#[from] GpuboxError),

    #[error("The correlator context has already been closed")]
    /// A read was attempted after [`crate::CorrelatorContext::close`]
    AlreadyClosed,
}

fn fits_error_kind(e: &FitsError) -> ErrorKind {
    match e {
        FitsError::NotFound { .. } => ErrorKind::FileNotFound,
        FitsError::Open { .. } => ErrorKind::Unreadable,
        FitsError::MissingKey { .. }
        | FitsError::Parse { .. }
        | FitsError::LongString { .. }
        | FitsError::NotImage { .. }
        | FitsError::Column { .. } => ErrorKind::MalformedHeader,
        FitsError::Fitsio { .. } => ErrorKind::IOFailure,
    }
}

impl GpufitsError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        use ErrorKind::*;
        use MismatchReason::*;
        match self {
            Self::AlreadyClosed => AlreadyClosed,
            Self::Metafits(e) => match e {
                MetafitsError::Fits(fe) => fits_error_kind(fe),
                MetafitsError::UnsupportedVersion { .. } => UnsupportedVersion,
                MetafitsError::OddInputs { .. }
                | MetafitsError::NoChannels { .. }
                | MetafitsError::InvalidChannel { .. }
                | MetafitsError::ChannelFrequency { .. }
                | MetafitsError::InvalidListEntry { .. }
                | MetafitsError::TileData { .. }
                | MetafitsError::FineChanWidth { .. }
                | MetafitsError::BadDuration { .. } => MalformedHeader,
            },
            Self::Gpubox(e) => match e {
                GpuboxError::Fits(fe) => fits_error_kind(fe),
                GpuboxError::InvalidTimeStepIndex(_) | GpuboxError::InvalidCoarseChanIndex(_) => {
                    IndexOutOfRange
                }
                GpuboxError::NoDataForTimeStepCoarseChannel { .. } => MissingDataForIndex,
                GpuboxError::NoGpuboxes | GpuboxError::BufferSizeMismatch { .. } => {
                    InvalidArgument
                }
                GpuboxError::PoisonedFile { .. } => IOFailure,
                GpuboxError::UnsupportedCorrVer { .. } => UnsupportedVersion,
                GpuboxError::Unrecognised(_)
                | GpuboxError::MwaxCorrVerMissing(_)
                | GpuboxError::NoDataHDUsInGpuboxFile { .. }
                | GpuboxError::OddMwaxHduCount { .. } => MalformedHeader,
                GpuboxError::ObsidMismatch { .. } => ObservationMismatch(ObsId),
                GpuboxError::NinputsMismatch { .. } | GpuboxError::NaxisMismatch { .. } => {
                    ObservationMismatch(Count)
                }
                GpuboxError::DuplicateCoverage { .. } => {
                    ObservationMismatch(MismatchReason::DuplicateCoverage)
                }
                GpuboxError::UnknownChannel { .. } => ObservationMismatch(UndeclaredCoverage),
                GpuboxError::Mixture
                | GpuboxError::CorrVerMismatch { .. }
                | GpuboxError::MwaxCorrVerMismatch(_) => ObservationMismatch(Version),
            },
        }
    }

    /// The error message, truncated on a character boundary to at most
    /// [`MAX_ERROR_MESSAGE_LEN`] bytes.
    pub fn bounded_message(&self) -> String {
        bound_message(self.to_string())
    }
}

pub(crate) fn bound_message(mut message: String) -> String {
    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut end = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}
