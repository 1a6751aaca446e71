//! Helpers for reading FITS headers and images.
//!
//! Every helper comes in two flavours: a function taking the caller's source
//! location (`_open_fits`, `_get_required_fits_key`, ...) and a macro of the
//! same name without the leading underscore that fills in `file!()` and
//! `line!()`, so that errors point at the code that asked for the value.

pub mod error;

use std::{
    ffi::{CStr, CString},
    path::Path,
    ptr,
};

use fitsio::{hdu::FitsHdu, hdu::HduInfo, tables::ReadsCol, FitsFile};
use log::trace;

pub use error::FitsError;

use crate::constants::{FITS_KEY_NO_EXIST, FITS_VALUE_UNDEFINED};

/// Open a fits file.
///
/// # Errors
///
/// - [`FitsError::NotFound`] if nothing exists at `file`
/// - [`FitsError::Open`] if cfitsio could not open it, or the path isn't UTF-8
pub fn _open_fits<P: AsRef<Path>>(
    file: P,
    source_file: &'static str,
    source_line: u32,
) -> Result<FitsFile, FitsError> {
    let path = file.as_ref();
    if !path.exists() {
        return Err(FitsError::NotFound {
            fits_filename: path.to_path_buf(),
            source_file,
            source_line,
        });
    }
    // cfitsio takes a C string; fitsio panics on paths that aren't UTF-8
    if path.to_str().is_none() {
        return Err(FitsError::Open {
            fits_error: fitsio::errors::Error::Message(format!(
                "{} is not a UTF-8 path",
                path.display()
            )),
            fits_filename: path.to_path_buf(),
            source_file,
            source_line,
        });
    }
    match FitsFile::open(path) {
        Ok(fptr) => {
            trace!("_open_fits() opened {}", path.display());
            Ok(fptr)
        }
        Err(fits_error) => Err(FitsError::Open {
            fits_error,
            fits_filename: path.to_path_buf(),
            source_file,
            source_line,
        }),
    }
}

/// Open the HDU with index `hdu_num` (0 is the primary HDU).
///
/// # Errors
///
/// [`FitsError::Fitsio`] if the HDU doesn't exist or can't be read.
pub fn _open_hdu(
    fits_fptr: &mut FitsFile,
    hdu_num: usize,
    source_file: &'static str,
    source_line: u32,
) -> Result<FitsHdu, FitsError> {
    fits_fptr.hdu(hdu_num).map_err(|fits_error| FitsError::Fitsio {
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num,
        source_file,
        source_line,
    })
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
///
/// # Errors
///
/// - [`FitsError::Fitsio`] for any cfitsio failure other than a missing key
/// - [`FitsError::Parse`] if the value doesn't parse into `T`
pub fn _get_optional_fits_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    source_file: &'static str,
    source_line: u32,
) -> Result<Option<T>, FitsError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(fitsio::errors::Error::Fits(fe))
            if fe.status == FITS_KEY_NO_EXIST || fe.status == FITS_VALUE_UNDEFINED =>
        {
            return Ok(None)
        }
        Err(fits_error) => {
            return Err(FitsError::Fitsio {
                fits_error,
                fits_filename: fits_fptr.file_path().to_path_buf(),
                hdu_num: hdu.number,
                source_file,
                source_line,
            })
        }
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(FitsError::Parse {
            key: keyword.to_string(),
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
            source_file,
            source_line,
        }),
    }
}

/// Like [`_get_optional_fits_key`], but a missing key is an error.
///
/// # Errors
///
/// [`FitsError::MissingKey`] when the key is absent, otherwise as for
/// [`_get_optional_fits_key`].
pub fn _get_required_fits_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    source_file: &'static str,
    source_line: u32,
) -> Result<T, FitsError> {
    match _get_optional_fits_key(fits_fptr, hdu, keyword, source_file, source_line)? {
        Some(value) => Ok(value),
        None => Err(FitsError::MissingKey {
            key: keyword.to_string(),
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
            source_file,
            source_line,
        }),
    }
}

/// Read a string keyword that may span several CONTINUE cards.
///
/// # Errors
///
/// - [`FitsError::LongString`] if cfitsio couldn't read the value
/// - [`FitsError::Fitsio`] if `hdu` couldn't be made current
pub fn _get_optional_fits_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    source_file: &'static str,
    source_line: u32,
) -> Result<Option<String>, FitsError> {
    let long_string_error = |fits_fptr: &FitsFile| FitsError::LongString {
        key: keyword.to_string(),
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
        source_file,
        source_line,
    };
    let keyword_ffi = match CString::new(keyword) {
        Ok(k) => k,
        Err(_) => return Err(long_string_error(fits_fptr)),
    };
    // ffgkls reads from whichever HDU is current.
    _open_hdu(fits_fptr, hdu.number, source_file, source_line)?;

    let mut status = 0;
    let mut long_string_ptr = ptr::null_mut();
    // Safety: cfitsio allocates the string and we free it below with fffree.
    unsafe {
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fits_fptr.as_raw(),
            keyword_ffi.as_ptr(),
            &mut long_string_ptr,
            ptr::null_mut(),
            &mut status,
        );
    }
    match status {
        0 => {
            let long_string = unsafe {
                let value = CStr::from_ptr(long_string_ptr)
                    .to_str()
                    .map(ToString::to_string);
                // fffree = fits_free_memory
                fitsio_sys::fffree(long_string_ptr.cast(), &mut 0);
                value
            };
            long_string
                .map(Some)
                .map_err(|_| long_string_error(fits_fptr))
        }
        FITS_KEY_NO_EXIST | FITS_VALUE_UNDEFINED => Ok(None),
        _ => Err(long_string_error(fits_fptr)),
    }
}

/// Like [`_get_optional_fits_key_long_string`], but a missing key is an error.
///
/// # Errors
///
/// [`FitsError::MissingKey`] when the key is absent.
pub fn _get_required_fits_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
    source_file: &'static str,
    source_line: u32,
) -> Result<String, FitsError> {
    match _get_optional_fits_key_long_string(fits_fptr, hdu, keyword, source_file, source_line)? {
        Some(value) => Ok(value),
        None => Err(FitsError::MissingKey {
            key: keyword.to_string(),
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
            source_file,
            source_line,
        }),
    }
}

/// Count the HDUs in a fits file, primary included.
///
/// # Errors
///
/// [`FitsError::Fitsio`] if cfitsio fails.
pub fn _get_fits_num_hdus(
    fits_fptr: &mut FitsFile,
    source_file: &'static str,
    source_line: u32,
) -> Result<usize, FitsError> {
    let mut status = 0;
    let mut num_hdus = 0;
    // Safety: fptr is a valid, open fitsfile for the life of this call.
    unsafe {
        // ffthdu = fits_get_num_hdus
        fitsio_sys::ffthdu(fits_fptr.as_raw(), &mut num_hdus, &mut status);
    }
    fitsio::errors::check_status(status).map_err(|fits_error| FitsError::Fitsio {
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: 0,
        source_file,
        source_line,
    })?;
    Ok(num_hdus as usize)
}

/// The shape of an image HDU, slowest axis first (`[NAXIS2, NAXIS1]`).
///
/// # Errors
///
/// [`FitsError::NotImage`] if `hdu` is a table.
pub fn _get_hdu_image_shape(
    fits_fptr: &FitsFile,
    hdu: &FitsHdu,
    source_file: &'static str,
    source_line: u32,
) -> Result<Vec<usize>, FitsError> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => Ok(shape.clone()),
        _ => Err(FitsError::NotImage {
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
            source_file,
            source_line,
        }),
    }
}

/// Read a float image directly into `buffer`, which must be exactly as long as
/// the image.
///
/// # Errors
///
/// - [`FitsError::NotImage`] if `hdu` is not an image
/// - [`FitsError::Fitsio`] if cfitsio fails to read
pub fn _get_fits_float_image_into_buffer(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    buffer: &mut [f32],
    source_file: &'static str,
    source_line: u32,
) -> Result<(), FitsError> {
    _get_hdu_image_shape(fits_fptr, hdu, source_file, source_line)?;
    // ffgpv reads from whichever HDU is current.
    _open_hdu(fits_fptr, hdu.number, source_file, source_line)?;

    let mut status = 0;
    // Safety: buffer is a valid, exclusively borrowed slice of buffer.len()
    // floats, and cfitsio writes at most that many.
    unsafe {
        // ffgpv = fits_read_img
        fitsio_sys::ffgpv(
            fits_fptr.as_raw(),
            fitsio_sys::TFLOAT as _,
            1,
            buffer.len() as i64,
            ptr::null_mut(),
            buffer.as_mut_ptr().cast(),
            ptr::null_mut(),
            &mut status,
        );
    }
    fitsio::errors::check_status(status).map_err(|fits_error| FitsError::Fitsio {
        fits_error,
        fits_filename: fits_fptr.file_path().to_path_buf(),
        hdu_num: hdu.number,
        source_file,
        source_line,
    })
}

/// Read every row of a table column.
///
/// # Errors
///
/// [`FitsError::Column`] if the column is absent, `hdu` isn't a table, or the
/// values can't be read as `T`.
pub fn _get_fits_col<T: ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    column: &str,
    source_file: &'static str,
    source_line: u32,
) -> Result<Vec<T>, FitsError> {
    hdu.read_col(fits_fptr, column)
        .map_err(|fits_error| FitsError::Column {
            column: column.to_string(),
            fits_error,
            fits_filename: fits_fptr.file_path().to_path_buf(),
            hdu_num: hdu.number,
            source_file,
            source_line,
        })
}

/// Open a fits file, recording the caller's location in any error.
#[macro_export]
macro_rules! fits_open {
    ($fits_filename:expr) => {
        $crate::fits_read::_open_fits($fits_filename, file!(), line!())
    };
}

/// Open a HDU by index, recording the caller's location in any error.
#[macro_export]
macro_rules! fits_open_hdu {
    ($fits_fptr:expr, $hdu_num:expr) => {
        $crate::fits_read::_open_hdu($fits_fptr, $hdu_num, file!(), line!())
    };
}

/// Read and parse a keyword that may be absent.
#[macro_export]
macro_rules! get_optional_fits_key {
    ($fits_fptr:expr, $hdu:expr, $keyword:expr) => {
        $crate::fits_read::_get_optional_fits_key($fits_fptr, $hdu, $keyword, file!(), line!())
    };
}

/// Read and parse a keyword that must be present.
#[macro_export]
macro_rules! get_required_fits_key {
    ($fits_fptr:expr, $hdu:expr, $keyword:expr) => {
        $crate::fits_read::_get_required_fits_key($fits_fptr, $hdu, $keyword, file!(), line!())
    };
}

/// Read a long string keyword that may be absent.
#[macro_export]
macro_rules! get_optional_fits_key_long_string {
    ($fits_fptr:expr, $hdu:expr, $keyword:expr) => {
        $crate::fits_read::_get_optional_fits_key_long_string(
            $fits_fptr,
            $hdu,
            $keyword,
            file!(),
            line!(),
        )
    };
}

/// Read a long string keyword that must be present.
#[macro_export]
macro_rules! get_required_fits_key_long_string {
    ($fits_fptr:expr, $hdu:expr, $keyword:expr) => {
        $crate::fits_read::_get_required_fits_key_long_string(
            $fits_fptr,
            $hdu,
            $keyword,
            file!(),
            line!(),
        )
    };
}

/// Count the HDUs in a fits file.
#[macro_export]
macro_rules! get_fits_num_hdus {
    ($fits_fptr:expr) => {
        $crate::fits_read::_get_fits_num_hdus($fits_fptr, file!(), line!())
    };
}

/// The `[NAXIS2, NAXIS1]` shape of an image HDU.
#[macro_export]
macro_rules! get_hdu_image_shape {
    ($fits_fptr:expr, $hdu:expr) => {
        $crate::fits_read::_get_hdu_image_shape($fits_fptr, $hdu, file!(), line!())
    };
}

/// Read a float image HDU into a caller supplied buffer.
#[macro_export]
macro_rules! get_fits_float_image_into_buffer {
    ($fits_fptr:expr, $hdu:expr, $buffer:expr) => {
        $crate::fits_read::_get_fits_float_image_into_buffer(
            $fits_fptr,
            $hdu,
            $buffer,
            file!(),
            line!(),
        )
    };
}

/// Read every row of a table column.
#[macro_export]
macro_rules! get_fits_col {
    ($fits_fptr:expr, $hdu:expr, $column:expr) => {
        $crate::fits_read::_get_fits_col($fits_fptr, $hdu, $column, file!(), line!())
    };
}
