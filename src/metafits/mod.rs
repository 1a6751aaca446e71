//! Reading the observation metadata held in a metafits file.

pub mod error;

use std::{
    fmt,
    path::{Path, PathBuf},
};

use hifitime::Epoch;
use log::trace;

pub use error::MetafitsError;

use crate::{
    antenna::Antenna,
    baseline::Baseline,
    constants::{
        COAX_V_FACTOR, MAX_RECEIVER_CHANNEL, NUM_ANTENNA_POLS, NUM_VISIBILITY_POLS,
        SUPPORTED_METAFITS_VERSIONS, TILEDATA_HDU_INDEX,
    },
    rf_input::RFInput,
};

/// The structure of an observation as described by its metafits file.
#[derive(Clone, Debug)]
pub struct MetafitsContext {
    /// Where the metafits file was read from
    pub metafits_filename: PathBuf,
    /// Major version of the metafits format
    pub version: u32,
    /// Observation id (the GPS start time, `GPSTIME`)
    pub obsid: u32,
    /// Observation name (`FILENAME`), if recorded
    pub obs_name: Option<String>,
    /// Project id (`PROJECT`), if recorded
    pub project_id: Option<String>,
    /// Velocity factor of the electrical cable
    pub coax_v_factor: f64,

    /// Observing mode (`MODE`), if recorded
    pub mode: Option<String>,
    /// RA of the tile pointing centre (`RA`)
    pub ra_tile_pointing_degrees: Option<f64>,
    /// Dec of the tile pointing centre (`DEC`)
    pub dec_tile_pointing_degrees: Option<f64>,
    /// Azimuth of the pointing (`AZIMUTH`)
    pub azimuth_degrees: Option<f64>,
    /// Elevation of the pointing (`ALTITUDE`)
    pub altitude_degrees: Option<f64>,
    /// Receivers used (`RECVRS`)
    pub receivers: Vec<usize>,
    /// Beamformer delays (`DELAYS`)
    pub delays: Vec<u32>,

    /// Number of RF inputs (`NINPUTS`)
    pub num_rf_inputs: usize,
    /// RF inputs in correlator output order, from TILEDATA
    pub rf_inputs: Vec<RFInput>,
    /// Antennas in correlator output order
    pub antennas: Vec<Antenna>,
    /// Baselines in correlator output order
    pub baselines: Vec<Baseline>,
    /// Number of antennas, two RF inputs each
    pub num_antennas: usize,
    /// Number of polarisations per antenna
    pub num_antenna_pols: usize,
    /// Number of polarisation products per baseline
    pub num_visibility_pols: usize,
    /// Number of baselines, autocorrelations included
    pub num_baselines: usize,

    /// Correlator integration time
    pub integration_time_ms: u64,
    /// Total observed bandwidth
    pub obs_bandwidth_hz: u32,
    /// Width of a coarse channel
    pub coarse_chan_width_hz: u32,
    /// Width of a fine channel
    pub fine_chan_width_hz: u32,
    /// Fine channels in each coarse channel
    pub num_fine_chans_per_coarse: usize,
    /// Receiver channel numbers in the order `CHANNELS` lists them
    pub receiver_channels: Vec<usize>,

    /// Scheduled start as a UNIX time
    pub sched_start_unix_time_ms: u64,
    /// Scheduled end as a UNIX time
    pub sched_end_unix_time_ms: u64,
    /// Scheduled start as a GPS time
    pub sched_start_gps_time_ms: u64,
    /// Scheduled end as a GPS time
    pub sched_end_gps_time_ms: u64,
    /// Scheduled duration
    pub sched_duration_ms: u64,
    /// Time flagged at the start of the observation
    pub quack_time_duration_ms: u64,
    /// First good UNIX time, after the quack time
    pub good_time_unix_ms: u64,
}

fn seconds_to_ms(
    key: &str,
    value: f64,
    fits_filename: &Path,
) -> Result<u64, MetafitsError> {
    if value.is_finite() && value >= 0. {
        Ok((value * 1000.).round() as u64)
    } else {
        Err(MetafitsError::BadDuration {
            key: key.to_string(),
            value,
            fits_filename: fits_filename.to_path_buf(),
        })
    }
}

fn parse_list<T: std::str::FromStr>(
    key: &str,
    list: &str,
    fits_filename: &Path,
) -> Result<Vec<T>, MetafitsError> {
    list.replace(&['\'', '&'][..], "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| MetafitsError::InvalidListEntry {
                key: key.to_string(),
                value: s.to_string(),
                fits_filename: fits_filename.to_path_buf(),
            })
        })
        .collect()
}

fn parse_receiver_channels(
    channels: &str,
    fits_filename: &Path,
) -> Result<Vec<usize>, MetafitsError> {
    let receiver_channels = channels
        .replace(&['\'', '&'][..], "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse() {
            Ok(rec_chan) if (1..=MAX_RECEIVER_CHANNEL).contains(&rec_chan) => Ok(rec_chan),
            _ => Err(MetafitsError::InvalidChannel {
                value: s.to_string(),
                fits_filename: fits_filename.to_path_buf(),
            }),
        })
        .collect::<Result<Vec<usize>, _>>()?;
    if receiver_channels.is_empty() {
        return Err(MetafitsError::NoChannels {
            fits_filename: fits_filename.to_path_buf(),
        });
    }
    Ok(receiver_channels)
}

impl MetafitsContext {
    /// Read the primary HDU of the metafits file at `metafits`.
    ///
    /// # Errors
    ///
    /// - [`MetafitsError::Fits`] if the file can't be opened, or a required key
    ///   is missing or unparsable
    /// - [`MetafitsError::UnsupportedVersion`] for a metafits `VERSION` other
    ///   than 1 or 2
    /// - other [`MetafitsError`]s when the keys present don't describe a
    ///   sensible observation
    pub fn new<P: AsRef<Path>>(metafits: P) -> Result<Self, MetafitsError> {
        let metafits_filename = metafits.as_ref().to_path_buf();
        trace!("MetafitsContext::new({})", metafits_filename.display());

        let mut metafits_fptr = fits_open!(&metafits_filename)?;
        let metafits_hdu = fits_open_hdu!(&mut metafits_fptr, 0)?;

        let version = {
            let v: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "VERSION")?;
            v.trunc() as u32
        };
        if !SUPPORTED_METAFITS_VERSIONS.contains(&version) {
            return Err(MetafitsError::UnsupportedVersion {
                version,
                fits_filename: metafits_filename,
            });
        }

        let obsid: u32 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "GPSTIME")?;
        let obs_name: Option<String> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "FILENAME")?;
        let project_id: Option<String> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "PROJECT")?;

        let num_rf_inputs: usize =
            get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "NINPUTS")?;
        if num_rf_inputs == 0 || num_rf_inputs % NUM_ANTENNA_POLS != 0 {
            return Err(MetafitsError::OddInputs {
                num_rf_inputs,
                fits_filename: metafits_filename,
            });
        }
        let num_antennas = num_rf_inputs / NUM_ANTENNA_POLS;
        let num_baselines = (num_antennas * (num_antennas + 1)) / 2;

        if get_fits_num_hdus!(&mut metafits_fptr)? <= TILEDATA_HDU_INDEX {
            return Err(MetafitsError::TileData {
                reason: "no TILEDATA HDU".to_string(),
                fits_filename: metafits_filename,
            });
        }
        let tile_hdu = fits_open_hdu!(&mut metafits_fptr, TILEDATA_HDU_INDEX)?;
        let rf_inputs = RFInput::populate_rf_inputs(
            num_rf_inputs,
            &mut metafits_fptr,
            &tile_hdu,
            COAX_V_FACTOR,
            &metafits_filename,
        )?;
        let antennas = Antenna::populate_antennas(&rf_inputs);
        let baselines = Baseline::populate_baselines(num_antennas);

        let mode: Option<String> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "MODE")?;
        let ra_tile_pointing_degrees: Option<f64> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "RA")?;
        let dec_tile_pointing_degrees: Option<f64> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "DEC")?;
        let azimuth_degrees: Option<f64> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "AZIMUTH")?;
        let altitude_degrees: Option<f64> =
            get_optional_fits_key!(&mut metafits_fptr, &metafits_hdu, "ALTITUDE")?;
        let receivers = match get_optional_fits_key_long_string!(
            &mut metafits_fptr,
            &metafits_hdu,
            "RECVRS"
        )? {
            Some(list) => parse_list("RECVRS", &list, &metafits_filename)?,
            None => vec![],
        };
        let delays = match get_optional_fits_key_long_string!(
            &mut metafits_fptr,
            &metafits_hdu,
            "DELAYS"
        )? {
            Some(list) => parse_list("DELAYS", &list, &metafits_filename)?,
            None => vec![],
        };

        let integration_time_ms = {
            let it: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "INTTIME")?;
            match seconds_to_ms("INTTIME", it, &metafits_filename)? {
                0 => {
                    return Err(MetafitsError::BadDuration {
                        key: "INTTIME".to_string(),
                        value: it,
                        fits_filename: metafits_filename,
                    })
                }
                ms => ms,
            }
        };

        // FINECHAN is in kHz, BANDWDTH in MHz.
        let fine_chan_width_hz: u32 = {
            let fc: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "FINECHAN")?;
            (fc * 1e3).round() as _
        };
        let obs_bandwidth_hz: u32 = {
            let bw: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "BANDWDTH")?;
            (bw * 1e6).round() as _
        };

        let receiver_channels = parse_receiver_channels(
            &get_required_fits_key_long_string!(&mut metafits_fptr, &metafits_hdu, "CHANNELS")?,
            &metafits_filename,
        )?;
        let coarse_chan_width_hz = obs_bandwidth_hz / receiver_channels.len() as u32;
        if fine_chan_width_hz == 0
            || coarse_chan_width_hz == 0
            || coarse_chan_width_hz % fine_chan_width_hz != 0
        {
            return Err(MetafitsError::FineChanWidth {
                coarse_chan_width_hz,
                fine_chan_width_hz,
                fits_filename: metafits_filename,
            });
        }
        let num_fine_chans_per_coarse = (coarse_chan_width_hz / fine_chan_width_hz) as usize;
        // every channel edge must be a u32 frequency
        if let Some(&highest) = receiver_channels.iter().max() {
            let top_edge_hz = (highest as u32)
                .checked_mul(coarse_chan_width_hz)
                .and_then(|centre| centre.checked_add(coarse_chan_width_hz / 2));
            if top_edge_hz.is_none() {
                return Err(MetafitsError::ChannelFrequency {
                    rec_chan_number: highest,
                    coarse_chan_width_hz,
                    fits_filename: metafits_filename,
                });
            }
        }

        let sched_duration_ms = {
            let ex: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "EXPOSURE")?;
            seconds_to_ms("EXPOSURE", ex, &metafits_filename)?
        };
        let quack_time_duration_ms = {
            let qt: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "QUACKTIM")?;
            seconds_to_ms("QUACKTIM", qt, &metafits_filename)?
        };
        let (good_time_unix_ms, sched_start_unix_time_ms) = {
            let gt: f64 = get_required_fits_key!(&mut metafits_fptr, &metafits_hdu, "GOODTIME")?;
            let good_time_unix_ms = seconds_to_ms("GOODTIME", gt, &metafits_filename)?;
            match good_time_unix_ms.checked_sub(quack_time_duration_ms) {
                Some(start) => (good_time_unix_ms, start),
                None => {
                    return Err(MetafitsError::BadDuration {
                        key: "GOODTIME".to_string(),
                        value: gt,
                        fits_filename: metafits_filename,
                    })
                }
            }
        };
        let sched_end_unix_time_ms = sched_start_unix_time_ms + sched_duration_ms;
        let sched_start_gps_time_ms = obsid as u64 * 1000;
        let sched_end_gps_time_ms = sched_start_gps_time_ms + sched_duration_ms;

        Ok(Self {
            metafits_filename,
            version,
            obsid,
            obs_name,
            project_id,
            coax_v_factor: COAX_V_FACTOR,
            mode,
            ra_tile_pointing_degrees,
            dec_tile_pointing_degrees,
            azimuth_degrees,
            altitude_degrees,
            receivers,
            delays,
            num_rf_inputs,
            rf_inputs,
            antennas,
            baselines,
            num_antennas,
            num_antenna_pols: NUM_ANTENNA_POLS,
            num_visibility_pols: NUM_VISIBILITY_POLS,
            num_baselines,
            integration_time_ms,
            obs_bandwidth_hz,
            coarse_chan_width_hz,
            fine_chan_width_hz,
            num_fine_chans_per_coarse,
            receiver_channels,
            sched_start_unix_time_ms,
            sched_end_unix_time_ms,
            sched_start_gps_time_ms,
            sched_end_gps_time_ms,
            sched_duration_ms,
            quack_time_duration_ms,
            good_time_unix_ms,
        })
    }

    /// Convert a UNIX time into a GPS time, relative to this observation.
    ///
    /// The observation id is the scheduled start in GPS seconds, so this is
    /// exact for any time within the observation.
    pub fn unix_to_gps_ms(&self, unix_time_ms: u64) -> u64 {
        (self.sched_start_gps_time_ms + unix_time_ms).saturating_sub(self.sched_start_unix_time_ms)
    }
}

/// Render a UNIX time as a UTC date and MJD.
pub(crate) fn fmt_unix_ms(unix_time_ms: u64) -> String {
    let epoch = Epoch::from_unix_seconds(unix_time_ms as f64 / 1e3);
    format!("{} (MJD {:.6})", epoch, epoch.to_mjd_utc_days())
}

impl fmt::Display for MetafitsContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sched_start_gps_s = self.sched_start_gps_time_ms as f64 / 1e3;
        writeln!(f, "MetafitsContext (")?;
        writeln!(f, "    metafits filename:        {}", self.metafits_filename.display())?;
        writeln!(f, "    metafits version:         {}", self.version)?;
        writeln!(f, "    obsid:                    {}", self.obsid)?;
        if let Some(obs_name) = &self.obs_name {
            writeln!(f, "    observation name:         {}", obs_name)?;
        }
        if let Some(project_id) = &self.project_id {
            writeln!(f, "    project:                  {}", project_id)?;
        }
        writeln!(
            f,
            "    scheduled start (UNIX):   {:.3}",
            self.sched_start_unix_time_ms as f64 / 1e3
        )?;
        writeln!(
            f,
            "    scheduled end (UNIX):     {:.3}",
            self.sched_end_unix_time_ms as f64 / 1e3
        )?;
        writeln!(f, "    scheduled start (GPS):    {:.3}", sched_start_gps_s)?;
        writeln!(
            f,
            "    scheduled start (UTC):    {}",
            fmt_unix_ms(self.sched_start_unix_time_ms)
        )?;
        writeln!(
            f,
            "    scheduled duration:       {:.3} s",
            self.sched_duration_ms as f64 / 1e3
        )?;
        writeln!(
            f,
            "    quack time:               {:.3} s",
            self.quack_time_duration_ms as f64 / 1e3
        )?;
        writeln!(
            f,
            "    good UNIX start time:     {:.3}",
            self.good_time_unix_ms as f64 / 1e3
        )?;
        if let Some(mode) = &self.mode {
            writeln!(f, "    mode:                     {}", mode)?;
        }
        if let (Some(ra), Some(dec)) = (
            self.ra_tile_pointing_degrees,
            self.dec_tile_pointing_degrees,
        ) {
            writeln!(f, "    tile pointing RA, Dec:    {:.4}, {:.4} deg", ra, dec)?;
        }
        if let (Some(az), Some(alt)) = (self.azimuth_degrees, self.altitude_degrees) {
            writeln!(f, "    tile pointing Az, Alt:    {:.4}, {:.4} deg", az, alt)?;
        }
        writeln!(f, "    receivers:                {:?}", self.receivers)?;
        writeln!(f, "    delays:                   {:?}", self.delays)?;
        writeln!(f, "    RF inputs:                {}", self.num_rf_inputs)?;
        writeln!(f, "    antennas:                 {}", self.num_antennas)?;
        match (self.antennas.first(), self.antennas.last()) {
            (Some(first), Some(last)) if self.antennas.len() > 1 => {
                writeln!(f, "    tiles:                    [{} .. {}]", first, last)?
            }
            (Some(first), _) => writeln!(f, "    tiles:                    [{}]", first)?,
            _ => {}
        }
        writeln!(f, "    baselines:                {}", self.num_baselines)?;
        writeln!(
            f,
            "    integration time:         {:.2} s",
            self.integration_time_ms as f64 / 1e3
        )?;
        writeln!(
            f,
            "    bandwidth:                {:.2} MHz",
            self.obs_bandwidth_hz as f64 / 1e6
        )?;
        writeln!(
            f,
            "    coarse channel width:     {:.2} MHz",
            self.coarse_chan_width_hz as f64 / 1e6
        )?;
        writeln!(
            f,
            "    fine channel width:       {:.2} kHz",
            self.fine_chan_width_hz as f64 / 1e3
        )?;
        writeln!(
            f,
            "    fine chans per coarse:    {}",
            self.num_fine_chans_per_coarse
        )?;
        writeln!(f, "    receiver channels:        {:?}", self.receiver_channels)?;
        writeln!(f, "    coax v factor:            {}", self.coax_v_factor)?;
        write!(f, ")")
    }
}
