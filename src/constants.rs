//! Useful constants.

/// Velocity factor of the electrical cable used in the MWA. Used to convert
/// cable lengths to electrical lengths.
pub const COAX_V_FACTOR: f64 = 1.204;

/// The maximum length of an error message in bytes. Longer messages are
/// truncated on a character boundary by [`crate::GpufitsError::bounded_message`].
pub const MAX_ERROR_MESSAGE_LEN: usize = 1024;

/// MWA antennas always have an X and a Y polarisation.
pub const NUM_ANTENNA_POLS: usize = 2;

/// Every baseline carries XX, XY, YX and YY.
pub const NUM_VISIBILITY_POLS: usize = NUM_ANTENNA_POLS * NUM_ANTENNA_POLS;

/// Real and imaginary.
pub const NUM_COMPLEX_COMPONENTS: usize = 2;

/// Metafits format major versions this crate knows how to read.
pub const SUPPORTED_METAFITS_VERSIONS: [u32; 2] = [1, 2];

/// `CORR_VER` written by the legacy correlator (when it writes one at all).
pub const LEGACY_CORR_VER: u8 = 1;

/// `CORR_VER` written by the MWAX correlator.
pub const MWAX_CORR_VER: u8 = 2;

/// MWA receivers digitise 256 coarse channels; channel 0 is never observed.
pub const MAX_RECEIVER_CHANNEL: usize = 255;

/// Receiver channel numbers above this are stored in reverse order by the
/// legacy correlator.
pub const LEGACY_REVERSE_CHAN_THRESHOLD: usize = 128;

/// The metafits HDU holding the TILEDATA table.
pub const TILEDATA_HDU_INDEX: usize = 1;

/// cfitsio status for a keyword that doesn't exist in the header.
pub(crate) const FITS_KEY_NO_EXIST: i32 = 202;

/// cfitsio status for a keyword with no value.
pub(crate) const FITS_VALUE_UNDEFINED: i32 = 204;
