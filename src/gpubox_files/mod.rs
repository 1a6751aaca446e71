//! Identifying gpubox files by name, and reading the structure out of their
//! headers.

pub mod error;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use fitsio::FitsFile;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{trace, warn};
use regex::Regex;

pub use error::GpuboxError;

use crate::{transpose::VisLayout, FitsError};

lazy_static! {
    static ref RE_MWAX: Regex =
        Regex::new(r"^\d{10}_\d{14}_ch(?P<channel>\d{3})_(?P<batch>\d{3})\.fits$").unwrap();
    static ref RE_LEGACY_BATCH: Regex =
        Regex::new(r"^\d{10}_\d{14}_gpubox(?P<channel>\d{2})_(?P<batch>\d{2})\.fits$").unwrap();
    static ref RE_OLD_LEGACY_FORMAT: Regex =
        Regex::new(r"^\d{10}_\d{14}_gpubox(?P<channel>\d{2})\.fits$").unwrap();
}

/// The correlator generation that wrote a set of gpubox files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelatorVersion {
    /// MWAX correlator (`CORR_VER` 2)
    V2,
    /// Legacy correlator, batched filenames
    Legacy,
    /// Legacy correlator, before files were split into batches
    OldLegacy,
}

impl CorrelatorVersion {
    /// The order visibilities are stored in on disk.
    pub fn native_layout(self) -> VisLayout {
        match self {
            Self::V2 => VisLayout::ByBaseline,
            Self::Legacy | Self::OldLegacy => VisLayout::ByFrequency,
        }
    }
}

impl fmt::Display for CorrelatorVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::V2 => "v2 MWAX",
                Self::Legacy => "v1 Legacy",
                Self::OldLegacy => "v1 Legacy (no file indices)",
            }
        )
    }
}

/// A gpubox file, identified from its name alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuboxFile {
    /// Path to the file
    pub filename: PathBuf,
    /// `gpuboxNN` for legacy files, the receiver channel `chNNN` for MWAX
    pub channel_identifier: usize,
    /// Which batch of files in time this file belongs to
    pub batch_number: usize,
}

/// Work out which correlator wrote `gpubox_paths` from their names, and which
/// channel and batch each file holds.
///
/// Uneven batches are reported as a warning; the coverage index represents
/// whatever is missing as gaps.
///
/// # Errors
///
/// - [`GpuboxError::NoGpuboxes`] for an empty list
/// - [`GpuboxError::Unrecognised`] for a name matching no known pattern
/// - [`GpuboxError::Mixture`] for names from more than one correlator
pub fn determine_gpubox_batches<P: AsRef<Path>>(
    gpubox_paths: &[P],
) -> Result<(Vec<GpuboxFile>, CorrelatorVersion), GpuboxError> {
    if gpubox_paths.is_empty() {
        return Err(GpuboxError::NoGpuboxes);
    }

    let mut corr_version: Option<CorrelatorVersion> = None;
    let mut gpubox_files = Vec::with_capacity(gpubox_paths.len());
    for path in gpubox_paths {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GpuboxError::Unrecognised(path.display().to_string()))?;

        let (this_version, caps) = if let Some(caps) = RE_MWAX.captures(name) {
            (CorrelatorVersion::V2, caps)
        } else if let Some(caps) = RE_LEGACY_BATCH.captures(name) {
            (CorrelatorVersion::Legacy, caps)
        } else if let Some(caps) = RE_OLD_LEGACY_FORMAT.captures(name) {
            (CorrelatorVersion::OldLegacy, caps)
        } else {
            return Err(GpuboxError::Unrecognised(path.display().to_string()));
        };

        match corr_version {
            Some(v) if v != this_version => return Err(GpuboxError::Mixture),
            _ => corr_version = Some(this_version),
        }

        let parse = |group: &str| -> Result<usize, GpuboxError> {
            caps.name(group)
                .map_or(Ok(0), |m| m.as_str().parse())
                .map_err(|_| GpuboxError::Unrecognised(path.display().to_string()))
        };
        gpubox_files.push(GpuboxFile {
            filename: path.to_path_buf(),
            channel_identifier: parse("channel")?,
            batch_number: parse("batch")?,
        });
    }

    let corr_version = corr_version.ok_or(GpuboxError::NoGpuboxes)?;
    check_batches(&gpubox_files);
    Ok((gpubox_files, corr_version))
}

/// Warn when batches hold different numbers of files, or a batch is missing.
fn check_batches(gpubox_files: &[GpuboxFile]) {
    let counts = gpubox_files.iter().counts_by(|g| g.batch_number);
    let batches: Vec<usize> = counts.keys().copied().sorted().collect();
    for (expected, &got) in batches.iter().enumerate() {
        if expected != got {
            warn!(
                "gpubox batch {} is missing (next batch present is {})",
                expected, got
            );
            break;
        }
    }
    if let Some((min, max)) = counts.values().minmax().into_option() {
        if min != max {
            warn!(
                "There are an uneven number of files in the gpubox batches ({} vs {})",
                min, max
            );
        }
    }
}

/// One image HDU holding the visibilities of one timestep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuboxHdu {
    /// Index of the HDU in its file (the primary HDU is 0)
    pub hdu_index: usize,
    /// UNIX time of the HDU, `TIME` and `MILLITIM`
    pub unix_time_ms: u64,
    /// Length of the fastest axis
    pub naxis1: usize,
    /// Length of the slowest axis
    pub naxis2: usize,
}

/// The structure of one gpubox file, read from its headers.
#[derive(Clone, Debug)]
pub struct GpuboxDescriptor {
    /// What the filename says
    pub file: GpuboxFile,
    /// `OBSID` from the primary HDU
    pub obsid: u32,
    /// `CORR_VER` from the primary HDU, if present
    pub corr_ver: Option<u8>,
    /// `NINPUTS` from the primary HDU, if present
    pub num_rf_inputs: Option<usize>,
    /// The visibility HDUs, in file order
    pub hdus: Vec<GpuboxHdu>,
}

/// Open a gpubox file and read its structure. No visibilities are read.
///
/// MWAX files interleave a weights HDU after each visibility HDU; only the
/// visibility HDUs are described.
///
/// # Errors
///
/// - [`GpuboxError::Fits`] if the file can't be opened or a required key is
///   missing
/// - [`GpuboxError::NoDataHDUsInGpuboxFile`] for a file with only a primary HDU
/// - [`GpuboxError::OddMwaxHduCount`] for an MWAX file with unpaired HDUs
pub fn read_gpubox_descriptor(
    file: &GpuboxFile,
    corr_version: CorrelatorVersion,
) -> Result<(FitsFile, GpuboxDescriptor), GpuboxError> {
    trace!("read_gpubox_descriptor({})", file.filename.display());
    let mut fptr = fits_open!(&file.filename)?;
    let primary_hdu = fits_open_hdu!(&mut fptr, 0)?;

    let obsid: u32 = get_required_fits_key!(&mut fptr, &primary_hdu, "OBSID")?;
    let corr_ver: Option<u8> = get_optional_fits_key!(&mut fptr, &primary_hdu, "CORR_VER")?;
    let num_rf_inputs: Option<usize> =
        get_optional_fits_key!(&mut fptr, &primary_hdu, "NINPUTS")?;

    let num_data_hdus = get_fits_num_hdus!(&mut fptr)?.saturating_sub(1);
    if num_data_hdus == 0 {
        return Err(GpuboxError::NoDataHDUsInGpuboxFile {
            gpubox_filename: file.filename.clone(),
        });
    }
    let hdu_step = match corr_version {
        CorrelatorVersion::V2 if num_data_hdus % 2 != 0 => {
            return Err(GpuboxError::OddMwaxHduCount {
                gpubox_filename: file.filename.clone(),
                num_data_hdus,
            })
        }
        CorrelatorVersion::V2 => 2,
        CorrelatorVersion::Legacy | CorrelatorVersion::OldLegacy => 1,
    };

    let hdus = (1..=num_data_hdus)
        .step_by(hdu_step)
        .map(|hdu_index| -> Result<GpuboxHdu, FitsError> {
            let hdu = fits_open_hdu!(&mut fptr, hdu_index)?;
            let time: u64 = get_required_fits_key!(&mut fptr, &hdu, "TIME")?;
            let millitime: u64 = get_required_fits_key!(&mut fptr, &hdu, "MILLITIM")?;
            let shape = get_hdu_image_shape!(&fptr, &hdu)?;
            let (naxis2, naxis1) = match shape.as_slice() {
                [naxis2, naxis1] => (*naxis2, *naxis1),
                // anything else can't match the expected shape
                _ => (0, shape.iter().product()),
            };
            Ok(GpuboxHdu {
                hdu_index,
                unix_time_ms: time * 1000 + millitime,
                naxis1,
                naxis2,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((
        fptr,
        GpuboxDescriptor {
            file: file.clone(),
            obsid,
            corr_ver,
            num_rf_inputs,
            hdus,
        },
    ))
}

/// Every visibility HDU of a set of gpubox files, keyed by UNIX time and then
/// by channel identifier, valued by the index of the file in the set and the
/// HDU index within that file.
pub type GpuboxTimeMap = BTreeMap<u64, BTreeMap<usize, (usize, usize)>>;

/// Build the [`GpuboxTimeMap`] of a set of descriptors.
///
/// # Errors
///
/// [`GpuboxError::DuplicateCoverage`] if two HDUs claim the same time and
/// channel, naming both.
pub fn create_time_map(descriptors: &[GpuboxDescriptor]) -> Result<GpuboxTimeMap, GpuboxError> {
    let mut time_map = GpuboxTimeMap::new();
    for (file_index, descriptor) in descriptors.iter().enumerate() {
        let channel = descriptor.file.channel_identifier;
        for hdu in &descriptor.hdus {
            let chans = time_map.entry(hdu.unix_time_ms).or_default();
            if let Some(&(first_file, first_hdu)) = chans.get(&channel) {
                return Err(GpuboxError::DuplicateCoverage {
                    unix_time_ms: hdu.unix_time_ms,
                    channel_identifier: channel,
                    first_filename: descriptors[first_file].file.filename.clone(),
                    first_hdu,
                    second_filename: descriptor.file.filename.clone(),
                    second_hdu: hdu.hdu_index,
                });
            }
            chans.insert(channel, (file_index, hdu.hdu_index));
        }
    }
    Ok(time_map)
}
