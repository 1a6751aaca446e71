//! Synthetic metafits and gpubox files for tests and benchmarks.
//!
//! Only depends on `fitsio`, so that integration tests and benches can
//! include it with `#[path]`.
#![allow(dead_code)]

use std::{
    ffi::CString,
    path::{Path, PathBuf},
    ptr,
};

use fitsio::{
    errors::check_status,
    images::{ImageDescription, ImageType},
    tables::{ColumnDataDescription, ColumnDataType, ConcreteColumnDescription},
    FitsFile,
};

const COARSE_CHAN_WIDTH_MHZ: f64 = 1.28;
const DATETIME: &str = "20210216160014";

/// A header value to write.
#[derive(Clone, Debug)]
pub enum KeyValue {
    Int(i64),
    Float(f64),
    Str(String),
    /// Written with CONTINUE cards if necessary
    LongStr(String),
}

/// Which correlator the synthetic gpubox files pretend to come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestCorr {
    Legacy,
    Mwax,
}

/// The parameters of a synthetic observation.
#[derive(Clone, Debug)]
pub struct TestObs {
    pub corr: TestCorr,
    pub version: f64,
    pub obsid: u32,
    pub num_rf_inputs: usize,
    pub int_time_s: f64,
    pub fine_chan_width_khz: f64,
    pub receiver_channels: Vec<usize>,
    pub exposure_s: f64,
    pub quack_time_s: f64,
    /// Scheduled start, UNIX seconds
    pub sched_start_unix_s: u64,
}

impl TestObs {
    /// 4 antennas, 4 fine channels, 2 coarse channels, 4 timesteps
    pub fn mwax_small() -> Self {
        Self {
            corr: TestCorr::Mwax,
            version: 2.0,
            obsid: 1_297_526_432,
            num_rf_inputs: 8,
            int_time_s: 0.5,
            fine_chan_width_khz: 320.,
            receiver_channels: vec![118, 117],
            exposure_s: 2.,
            quack_time_s: 0.5,
            sched_start_unix_s: 1_613_491_214,
        }
    }

    /// 4 antennas, 4 fine channels, 4 coarse channels straddling receiver
    /// channel 128, 4 timesteps
    pub fn legacy_small() -> Self {
        Self {
            corr: TestCorr::Legacy,
            version: 1.0,
            obsid: 1_065_880_128,
            num_rf_inputs: 8,
            int_time_s: 0.5,
            fine_chan_width_khz: 320.,
            receiver_channels: vec![127, 128, 129, 130],
            exposure_s: 2.,
            quack_time_s: 0.5,
            sched_start_unix_s: 1_381_844_910,
        }
    }

    /// 128 antennas, 128 fine channels, 1 coarse channel, 1 timestep
    pub fn mwax_128t() -> Self {
        Self {
            corr: TestCorr::Mwax,
            version: 2.0,
            obsid: 1_297_526_432,
            num_rf_inputs: 256,
            int_time_s: 1.,
            fine_chan_width_khz: 10.,
            receiver_channels: vec![109],
            exposure_s: 1.,
            quack_time_s: 0.,
            sched_start_unix_s: 1_613_491_214,
        }
    }

    pub fn num_antennas(&self) -> usize {
        self.num_rf_inputs / 2
    }

    pub fn num_baselines(&self) -> usize {
        self.num_antennas() * (self.num_antennas() + 1) / 2
    }

    pub fn num_fine_chans(&self) -> usize {
        (COARSE_CHAN_WIDTH_MHZ * 1e3 / self.fine_chan_width_khz).round() as usize
    }

    pub fn num_floats(&self) -> usize {
        self.num_baselines() * self.num_fine_chans() * 4 * 2
    }

    pub fn scheduled_unix_times_ms(&self) -> Vec<u64> {
        let start = self.sched_start_unix_s * 1000;
        let step = (self.int_time_s * 1e3).round() as u64;
        let num = (self.exposure_s / self.int_time_s).round() as u64;
        (0..num).map(|i| start + i * step).collect()
    }

    /// The gpubox number the correlator would name a receiver channel's files
    /// with.
    pub fn gpubox_number(&self, receiver_chan: usize) -> usize {
        match self.corr {
            TestCorr::Mwax => receiver_chan,
            TestCorr::Legacy => {
                let mut sorted = self.receiver_channels.clone();
                sorted.sort_unstable();
                let idx = sorted.iter().position(|&r| r == receiver_chan).unwrap();
                let first_reversed = sorted
                    .iter()
                    .position(|&r| r > 128)
                    .unwrap_or(sorted.len());
                if idx < first_reversed {
                    idx + 1
                } else {
                    sorted.len() - (idx - first_reversed)
                }
            }
        }
    }
}

/// The primary header of a metafits file for `obs`.
pub fn metafits_keys(obs: &TestObs) -> Vec<(&'static str, KeyValue)> {
    let channels = obs
        .receiver_channels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    vec![
        ("VERSION", KeyValue::Float(obs.version)),
        ("GPSTIME", KeyValue::Int(obs.obsid as i64)),
        ("FILENAME", KeyValue::Str("gpufits_test".to_string())),
        ("PROJECT", KeyValue::Str("G0000".to_string())),
        ("MODE", KeyValue::Str("HW_LFILES".to_string())),
        ("RA", KeyValue::Float(30.25)),
        ("DEC", KeyValue::Float(-26.75)),
        ("AZIMUTH", KeyValue::Float(0.)),
        ("ALTITUDE", KeyValue::Float(90.)),
        (
            "RECVRS",
            KeyValue::Str(
                (1..=(obs.num_antennas() + 7) / 8)
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        ),
        ("DELAYS", KeyValue::Str(vec!["0"; 16].join(","))),
        ("NINPUTS", KeyValue::Int(obs.num_rf_inputs as i64)),
        ("INTTIME", KeyValue::Float(obs.int_time_s)),
        ("FINECHAN", KeyValue::Float(obs.fine_chan_width_khz)),
        (
            "BANDWDTH",
            KeyValue::Float(COARSE_CHAN_WIDTH_MHZ * obs.receiver_channels.len() as f64),
        ),
        ("CHANNELS", KeyValue::LongStr(channels)),
        ("EXPOSURE", KeyValue::Float(obs.exposure_s)),
        ("QUACKTIM", KeyValue::Float(obs.quack_time_s)),
        (
            "GOODTIME",
            KeyValue::Float(obs.sched_start_unix_s as f64 + obs.quack_time_s),
        ),
    ]
}

/// Write a long string keyword with cfitsio's CONTINUE convention.
pub fn write_long_string_key(
    fptr: &mut FitsFile,
    keyword: &str,
    value: &str,
) -> Result<(), fitsio::errors::Error> {
    let keyword = CString::new(keyword).expect("keyword has no NUL");
    let value = CString::new(value).expect("value has no NUL");
    let mut status = 0;
    unsafe {
        // ffpkls = fits_write_key_longstr
        fitsio_sys::ffpkls(
            fptr.as_raw(),
            keyword.as_ptr(),
            value.as_ptr(),
            ptr::null(),
            &mut status,
        );
    }
    check_status(status)
}

/// Write a float keyword in fixed point, so that large values like UNIX times
/// keep their fractional part.
fn write_fixed_float_key(
    fptr: &mut FitsFile,
    keyword: &str,
    value: f64,
) -> Result<(), fitsio::errors::Error> {
    let keyword = CString::new(keyword).expect("keyword has no NUL");
    let mut status = 0;
    unsafe {
        // ffpkyg = fits_write_key_fixdbl
        fitsio_sys::ffpkyg(
            fptr.as_raw(),
            keyword.as_ptr(),
            value,
            6,
            ptr::null(),
            &mut status,
        );
    }
    check_status(status)
}

fn write_keys(
    fptr: &mut FitsFile,
    keys: &[(&'static str, KeyValue)],
) -> Result<(), fitsio::errors::Error> {
    let hdu = fptr.primary_hdu()?;
    for (key, value) in keys {
        match value {
            KeyValue::Int(i) => hdu.write_key(fptr, key, *i)?,
            KeyValue::Float(f) => write_fixed_float_key(fptr, key, *f)?,
            KeyValue::Str(s) => hdu.write_key(fptr, key, s.clone())?,
            KeyValue::LongStr(s) => write_long_string_key(fptr, key, s)?,
        }
    }
    Ok(())
}

/// One row of a metafits TILEDATA table.
#[derive(Clone, Debug)]
pub struct TestTile {
    pub input: i32,
    pub ant: i32,
    pub tile: i32,
    pub tile_name: String,
    pub pol: String,
    pub rx: i32,
    pub slot: i32,
    pub flag: i32,
    pub length: String,
    pub north: f32,
    pub east: f32,
    pub height: f32,
}

/// TILEDATA rows for `num_rf_inputs` inputs. Like a real metafits, the rows
/// aren't in correlator order: they run from the last antenna's Y input down
/// to the first antenna's X input. Antenna `a` is tile `11 + a`, named
/// `TileNNN`; even antennas give electrical lengths, odd ones physical.
pub fn test_tiles(num_rf_inputs: usize) -> Vec<TestTile> {
    (0..num_rf_inputs)
        .map(|row| {
            let rf = (num_rf_inputs - 1 - row) as i32;
            let ant = rf / 2;
            let tile = 11 + ant;
            TestTile {
                input: row as i32,
                ant,
                tile,
                tile_name: format!("Tile{:03}", tile),
                pol: if rf % 2 == 0 { "X" } else { "Y" }.to_string(),
                rx: ant / 8 + 1,
                slot: (ant % 8) * 2 + rf % 2,
                flag: (ant == 1) as i32,
                length: if ant % 2 == 0 {
                    format!("EL_{}", 100 + ant)
                } else {
                    format!("{}", 100 + ant)
                },
                north: ant as f32,
                east: -ant as f32,
                height: 377.,
            }
        })
        .collect()
}

fn write_tile_data(fptr: &mut FitsFile, tiles: &[TestTile]) -> Result<(), fitsio::errors::Error> {
    let column = |name: &str, data_type: ColumnDataDescription| ConcreteColumnDescription {
        name: name.to_string(),
        data_type,
    };
    let int = || ColumnDataDescription::scalar(ColumnDataType::Int);
    let float = || ColumnDataDescription::scalar(ColumnDataType::Float);
    let hdu = fptr.create_table(
        "TILEDATA".to_string(),
        &[
            column("Input", int()),
            column("Antenna", int()),
            column("Tile", int()),
            column("TileName", ColumnDataDescription::vector(ColumnDataType::String, 8)),
            column("Pol", ColumnDataDescription::vector(ColumnDataType::String, 1)),
            column("Rx", int()),
            column("Slot", int()),
            column("Flag", int()),
            column("Length", ColumnDataDescription::vector(ColumnDataType::String, 14)),
            column("North", float()),
            column("East", float()),
            column("Height", float()),
        ],
    )?;
    let ints: [(&str, Vec<i32>); 6] = [
        ("Input", tiles.iter().map(|t| t.input).collect()),
        ("Antenna", tiles.iter().map(|t| t.ant).collect()),
        ("Tile", tiles.iter().map(|t| t.tile).collect()),
        ("Rx", tiles.iter().map(|t| t.rx).collect()),
        ("Slot", tiles.iter().map(|t| t.slot).collect()),
        ("Flag", tiles.iter().map(|t| t.flag).collect()),
    ];
    let strings: [(&str, Vec<String>); 3] = [
        ("TileName", tiles.iter().map(|t| t.tile_name.clone()).collect()),
        ("Pol", tiles.iter().map(|t| t.pol.clone()).collect()),
        ("Length", tiles.iter().map(|t| t.length.clone()).collect()),
    ];
    let floats: [(&str, Vec<f32>); 3] = [
        ("North", tiles.iter().map(|t| t.north).collect()),
        ("East", tiles.iter().map(|t| t.east).collect()),
        ("Height", tiles.iter().map(|t| t.height).collect()),
    ];
    for (name, data) in &ints {
        hdu.write_col(fptr, *name, data)?;
    }
    for (name, data) in &strings {
        hdu.write_col(fptr, *name, data)?;
    }
    for (name, data) in &floats {
        hdu.write_col(fptr, *name, data)?;
    }
    Ok(())
}

/// Write a metafits file with exactly `keys` in its primary header and
/// `tiles` in a TILEDATA table. No table is written when `tiles` is empty.
pub fn write_metafits_with_tiles(
    path: &Path,
    keys: &[(&'static str, KeyValue)],
    tiles: &[TestTile],
) -> Result<(), fitsio::errors::Error> {
    let mut fptr = FitsFile::create(path).overwrite().open()?;
    write_keys(&mut fptr, keys)?;
    if !tiles.is_empty() {
        write_tile_data(&mut fptr, tiles)?;
    }
    Ok(())
}

/// Write a metafits file with exactly `keys` in its primary header, and the
/// [`test_tiles`] for its `NINPUTS`.
pub fn write_metafits_with_keys(
    path: &Path,
    keys: &[(&'static str, KeyValue)],
) -> Result<(), fitsio::errors::Error> {
    let num_rf_inputs = keys.iter().find_map(|(key, value)| match (key, value) {
        (&"NINPUTS", KeyValue::Int(n)) if *n > 0 => Some(*n as usize),
        _ => None,
    });
    let tiles = num_rf_inputs.map(test_tiles).unwrap_or_default();
    write_metafits_with_tiles(path, keys, &tiles)
}

/// Write `<obsid>.metafits` for `obs` into `dir`.
pub fn write_test_metafits(dir: &Path, obs: &TestObs) -> Result<PathBuf, fitsio::errors::Error> {
    let path = dir.join(format!("{}.metafits", obs.obsid));
    write_metafits_with_keys(&path, &metafits_keys(obs))?;
    Ok(path)
}

/// Small enough that `offset + seed` stays an exact f32 for the largest
/// synthetic observation.
pub fn test_seed(unix_time_ms: u64, receiver_chan: usize) -> u32 {
    ((unix_time_ms / 500) % 97) as u32 + receiver_chan as u32
}

/// The by-baseline visibilities of one synthetic timestep and coarse channel.
/// Every float is distinct and exactly representable.
pub fn expected_by_baseline(obs: &TestObs, unix_time_ms: u64, receiver_chan: usize) -> Vec<f32> {
    let seed = test_seed(unix_time_ms, receiver_chan);
    (0..obs.num_floats() as u32).map(|i| (i + seed) as f32).collect()
}

/// The by-frequency equivalent of [`expected_by_baseline`].
pub fn expected_by_frequency(obs: &TestObs, unix_time_ms: u64, receiver_chan: usize) -> Vec<f32> {
    let by_baseline = expected_by_baseline(obs, unix_time_ms, receiver_chan);
    let (num_bl, num_ch, inner) = (obs.num_baselines(), obs.num_fine_chans(), 4 * 2);
    let mut by_frequency = Vec::with_capacity(by_baseline.len());
    for ch in 0..num_ch {
        for bl in 0..num_bl {
            let start = (bl * num_ch + ch) * inner;
            by_frequency.extend_from_slice(&by_baseline[start..start + inner]);
        }
    }
    by_frequency
}

/// One synthetic gpubox file.
#[derive(Clone, Debug)]
pub struct TestGpubox {
    pub receiver_chan: usize,
    pub batch: usize,
    pub timesteps_unix_ms: Vec<u64>,
    pub obsid: u32,
    pub corr_ver: Option<i64>,
    pub num_rf_inputs: Option<i64>,
    /// Write image HDUs this many fine channels wide instead
    pub num_fine_chans: Option<usize>,
    pub filename: Option<String>,
}

impl TestGpubox {
    pub fn new(obs: &TestObs, receiver_chan: usize, batch: usize, timesteps_unix_ms: Vec<u64>) -> Self {
        Self {
            receiver_chan,
            batch,
            timesteps_unix_ms,
            obsid: obs.obsid,
            corr_ver: match obs.corr {
                TestCorr::Mwax => Some(2),
                TestCorr::Legacy => None,
            },
            num_rf_inputs: Some(obs.num_rf_inputs as i64),
            num_fine_chans: None,
            filename: None,
        }
    }

    pub fn filename(&self, obs: &TestObs) -> String {
        match (&self.filename, obs.corr) {
            (Some(filename), _) => filename.clone(),
            (None, TestCorr::Mwax) => format!(
                "{}_{}_ch{:03}_{:03}.fits",
                obs.obsid, DATETIME, self.receiver_chan, self.batch
            ),
            (None, TestCorr::Legacy) => format!(
                "{}_{}_gpubox{:02}_{:02}.fits",
                obs.obsid,
                DATETIME,
                obs.gpubox_number(self.receiver_chan),
                self.batch
            ),
        }
    }
}

/// Write a gpubox file into `dir`, visibilities in the correlator's native
/// order: by baseline for MWAX (each followed by a weights HDU), by frequency
/// for legacy.
pub fn write_test_gpubox(
    dir: &Path,
    obs: &TestObs,
    gpubox: &TestGpubox,
) -> Result<PathBuf, fitsio::errors::Error> {
    let path = dir.join(gpubox.filename(obs));
    let mut fptr = FitsFile::create(&path).overwrite().open()?;

    let mut keys = vec![("OBSID", KeyValue::Int(gpubox.obsid as i64))];
    if let Some(corr_ver) = gpubox.corr_ver {
        keys.push(("CORR_VER", KeyValue::Int(corr_ver)));
    }
    if let Some(num_rf_inputs) = gpubox.num_rf_inputs {
        keys.push(("NINPUTS", KeyValue::Int(num_rf_inputs)));
    }
    write_keys(&mut fptr, &keys)?;

    let num_fine_chans = gpubox.num_fine_chans.unwrap_or_else(|| obs.num_fine_chans());
    let num_baselines = obs.num_baselines();
    let dimensions = match obs.corr {
        TestCorr::Mwax => [num_baselines, num_fine_chans * 4 * 2],
        TestCorr::Legacy => [num_fine_chans, num_baselines * 4 * 2],
    };
    for &unix_time_ms in &gpubox.timesteps_unix_ms {
        let data = if gpubox.num_fine_chans.is_some() {
            vec![0.0; dimensions[0] * dimensions[1]]
        } else {
            match obs.corr {
                TestCorr::Mwax => expected_by_baseline(obs, unix_time_ms, gpubox.receiver_chan),
                TestCorr::Legacy => {
                    expected_by_frequency(obs, unix_time_ms, gpubox.receiver_chan)
                }
            }
        };
        let hdu = fptr.create_image(
            "VIS".to_string(),
            &ImageDescription {
                data_type: ImageType::Float,
                dimensions: &dimensions,
            },
        )?;
        hdu.write_key(&mut fptr, "TIME", (unix_time_ms / 1000) as i64)?;
        hdu.write_key(&mut fptr, "MILLITIM", (unix_time_ms % 1000) as i64)?;
        hdu.write_image(&mut fptr, &data)?;

        if obs.corr == TestCorr::Mwax {
            let weights = vec![1.0_f32; num_baselines * 4];
            let hdu = fptr.create_image(
                "WEIGHTS".to_string(),
                &ImageDescription {
                    data_type: ImageType::Float,
                    dimensions: &[num_baselines, 4],
                },
            )?;
            hdu.write_key(&mut fptr, "TIME", (unix_time_ms / 1000) as i64)?;
            hdu.write_key(&mut fptr, "MILLITIM", (unix_time_ms % 1000) as i64)?;
            hdu.write_image(&mut fptr, &weights)?;
        }
    }
    Ok(path)
}

/// Write a metafits file and one gpubox file per receiver channel covering
/// every scheduled timestep. Returns the metafits path and the gpubox paths.
pub fn write_test_observation(
    dir: &Path,
    obs: &TestObs,
) -> Result<(PathBuf, Vec<PathBuf>), fitsio::errors::Error> {
    let metafits_path = write_test_metafits(dir, obs)?;
    let times = obs.scheduled_unix_times_ms();
    let gpubox_paths = obs
        .receiver_channels
        .iter()
        .map(|&rec| write_test_gpubox(dir, obs, &TestGpubox::new(obs, rec, 0, times.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((metafits_path, gpubox_paths))
}
