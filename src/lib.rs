#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! gpufits reads the metafits and gpubox files written by the Murchison Widefield Array (MWA)
//! correlators, legacy and MWAX, and presents the visibilities of an observation in a single,
//! validated layout.
//!
//! # Examples
//!
//! Here's how to open an observation and read one timestep of one coarse channel
//!
//! ```rust,no_run
//! use gpufits::{CorrelatorContext, ErrorKind};
//!
//! let metafits_path = "1297526432.metafits";
//! let gpufits_paths = vec![
//!     "1297526432_20210216160014_ch117_000.fits",
//!     "1297526432_20210216160014_ch118_000.fits",
//! ];
//!
//! // Validates every file against the metafits; nothing is left open on failure.
//! let context = CorrelatorContext::new(&metafits_path, &gpufits_paths).unwrap();
//! let metadata = context.metadata();
//!
//! // [baseline][fine chan][pol][re, im]
//! let by_baseline = context.read_by_baseline(0, 0).unwrap();
//! // [fine chan][baseline][pol][re, im]
//! let by_frequency = context.read_by_frequency(0, 0).unwrap();
//! assert_eq!(by_baseline.len(), metadata.num_timestep_coarse_chan_floats);
//! assert_eq!(by_frequency.len(), by_baseline.len());
//!
//! // Gaps in the observation are errors, never zeros.
//! if let Err(e) = context.read_by_baseline(metadata.num_timesteps - 1, 1) {
//!     assert_eq!(e.kind(), ErrorKind::MissingDataForIndex);
//! }
//! ```
//!
//! # Details
//!
//! Files are read with [`fitsio`], calling into cfitsio directly where `fitsio` has no wrapper.
//! Each gpubox file keeps one open handle behind a mutex, so a [`CorrelatorContext`] can be shared
//! between threads.

#[macro_use]
pub mod fits_read;

pub mod antenna;
pub mod baseline;
pub mod coarse_channel;
pub mod constants;
pub mod correlator_context;
pub mod error;
pub mod gpubox_files;
pub mod metadata;
pub mod metafits;
pub mod rf_input;
pub mod timestep;
pub mod transpose;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
pub(crate) mod test_common;

pub use antenna::Antenna;
pub use baseline::Baseline;
pub use coarse_channel::CoarseChannel;
pub use correlator_context::CorrelatorContext;
pub use error::{ErrorKind, GpufitsError, MismatchReason};
pub use fits_read::FitsError;
pub use gpubox_files::{CorrelatorVersion, GpuboxError, GpuboxFile};
pub use metadata::Metadata;
pub use metafits::{MetafitsContext, MetafitsError};
pub use rf_input::{Pol, RFInput};
pub use timestep::TimeStep;
pub use transpose::{transpose, VisLayout, VisShape};

// re-exports
pub use fitsio;
pub use hifitime;
pub use ndarray;
