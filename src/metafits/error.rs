//! Errors associated with reading metafits files.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
/// Errors that can occur interpreting the primary header of a metafits file
pub enum MetafitsError {
    /// The metafits `VERSION` is not one we understand
    #[error("{fits_filename:?} has metafits VERSION {version}, only versions 1 and 2 are supported")]
    UnsupportedVersion {
        /// The major version read from the file
        version: u32,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// `NINPUTS` must describe whole dual-polarisation antennas
    #[error("{fits_filename:?} NINPUTS = {num_rf_inputs}, expected a positive even number")]
    OddInputs {
        /// The value of `NINPUTS`
        num_rf_inputs: usize,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// `CHANNELS` lists no coarse channels
    #[error("{fits_filename:?} CHANNELS does not list any coarse channels")]
    NoChannels {
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// An entry in `CHANNELS` isn't a receiver channel number (1 to 255)
    #[error("{fits_filename:?} CHANNELS entry {value:?} is not a receiver channel number (1 to 255)")]
    InvalidChannel {
        /// The offending entry
        value: String,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// A receiver channel whose frequency can't be represented in Hz
    #[error("{fits_filename:?} receiver channel {rec_chan_number} with {coarse_chan_width_hz} Hz coarse channels is beyond any representable frequency")]
    ChannelFrequency {
        /// The highest receiver channel
        rec_chan_number: usize,
        /// Coarse channel width (BANDWDTH / number of CHANNELS)
        coarse_chan_width_hz: u32,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// An entry in a comma separated list key that isn't a number
    #[error("{fits_filename:?} {key} entry {value:?} is not a number")]
    InvalidListEntry {
        /// The header keyword
        key: String,
        /// The offending entry
        value: String,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// The TILEDATA table doesn't describe the RF inputs
    #[error("{fits_filename:?} TILEDATA: {reason}")]
    TileData {
        /// What is wrong with the table
        reason: String,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// The fine channel width doesn't evenly divide the coarse channel width
    #[error("{fits_filename:?} fine channel width {fine_chan_width_hz} Hz does not divide coarse channel width {coarse_chan_width_hz} Hz")]
    FineChanWidth {
        /// Coarse channel width (BANDWDTH / number of CHANNELS)
        coarse_chan_width_hz: u32,
        /// Fine channel width (FINECHAN)
        fine_chan_width_hz: u32,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    /// A time or duration key that can't describe an observation
    #[error("{fits_filename:?} {key} = {value} is not a usable time")]
    BadDuration {
        /// The header keyword
        key: String,
        /// The value read
        value: f64,
        /// The metafits filename
        fits_filename: PathBuf,
    },

    #[error("{0}")]
    /// Error derived from [`crate::fits_read::FitsError`]
    Fits(#[from] crate::fits_read::FitsError),
}
