//! Errors that can occur when reading FITS files.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
/// All the errors that can occur while reading headers or images from a FITS
/// file.
pub enum FitsError {
    /// The file does not exist.
    #[error("{source_file}:{source_line}\n{fits_filename} does not exist")]
    NotFound {
        /// The path that was given
        fits_filename: PathBuf,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// Error when opening a fits file.
    #[error("{source_file}:{source_line}\nCouldn't open {fits_filename}: {fits_error}")]
    Open {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A key that couldn't be found in a fits header.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: Couldn't find key {key}")]
    MissingKey {
        /// The header keyword
        key: String,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The HDU the key was expected in
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A HDU that couldn't be used as an image.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: Tried to use as an image, but not an image")]
    NotImage {
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The offending HDU
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// Failure to read a long (CONTINUE) string.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: Couldn't read a long string from {key}")]
    LongString {
        /// The header keyword
        key: String,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The HDU the key was read from
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A table column that couldn't be read.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: Couldn't read column {column}: {fits_error}")]
    Column {
        /// The column name
        column: String,
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The HDU holding the table
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A generic error associated with the fitsio crate.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: {fits_error}")]
    Fitsio {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The HDU being read when the error occurred
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A header value that couldn't be parsed into the requested type.
    #[error("{source_file}:{source_line}\nCouldn't parse {key} in {fits_filename} HDU {hdu_num}")]
    Parse {
        /// The header keyword
        key: String,
        /// The filename of the fits file
        fits_filename: PathBuf,
        /// The HDU the key was read from
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },
}
