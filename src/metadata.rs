//! The immutable description of an opened observation.

use std::path::PathBuf;

use crate::{
    coarse_channel::CoarseChannel,
    metafits::MetafitsContext,
    timestep::TimeStep,
    transpose::VisShape,
    validation::{CoverageMap, ValidatedObservation},
    CorrelatorVersion,
};

/// Everything known about an observation once its files have been validated.
///
/// Built once when a [`crate::CorrelatorContext`] is opened and never changed.
#[derive(Clone, Debug)]
pub struct Metadata {
    /// The metafits file this was read from
    pub metafits_filename: PathBuf,
    /// Major version of the metafits format
    pub metafits_version: u32,
    /// Observation id
    pub obsid: u32,
    /// Correlator generation that wrote the gpubox files
    pub corr_version: CorrelatorVersion,
    /// Velocity factor of the electrical cable
    pub coax_v_factor: f64,

    /// Start of the first provided timestep
    pub start_unix_time_ms: u64,
    /// End of the last provided timestep
    pub end_unix_time_ms: u64,
    /// `end_unix_time_ms - start_unix_time_ms`
    pub duration_ms: u64,
    /// Start of the first provided timestep, GPS
    pub start_gps_time_ms: u64,
    /// End of the last provided timestep, GPS
    pub end_gps_time_ms: u64,
    /// Scheduled start
    pub sched_start_unix_time_ms: u64,
    /// Scheduled end
    pub sched_end_unix_time_ms: u64,
    /// Scheduled duration
    pub sched_duration_ms: u64,
    /// First good UNIX time, after the quack time
    pub good_time_unix_ms: u64,
    /// Start of the first common timestep (0 if there is none)
    pub common_start_unix_time_ms: u64,
    /// End of the last common timestep (0 if there is none)
    pub common_end_unix_time_ms: u64,
    /// `common_end_unix_time_ms - common_start_unix_time_ms`
    pub common_duration_ms: u64,
    /// Bandwidth of the common coarse channels
    pub common_bandwidth_hz: u32,

    /// Number of timesteps, scheduled or provided
    pub num_timesteps: usize,
    /// Number of antennas
    pub num_antennas: usize,
    /// Number of baselines, autocorrelations included
    pub num_baselines: usize,
    /// Number of RF inputs
    pub num_rf_inputs: usize,
    /// Polarisations per antenna
    pub num_antenna_pols: usize,
    /// Polarisation products per baseline
    pub num_visibility_pols: usize,
    /// Number of coarse channels in the metafits
    pub num_coarse_chans: usize,
    /// Fine channels in each coarse channel
    pub num_fine_chans_per_coarse: usize,
    /// Bytes in the visibilities of one timestep and coarse channel
    pub num_timestep_coarse_chan_bytes: usize,
    /// Floats in the visibilities of one timestep and coarse channel
    pub num_timestep_coarse_chan_floats: usize,
    /// Correlator integration time
    pub integration_time_ms: u64,
    /// Width of a fine channel
    pub fine_chan_width_hz: u32,
    /// Total observed bandwidth
    pub obs_bandwidth_hz: u32,
    /// Width of a coarse channel
    pub coarse_chan_width_hz: u32,
    /// Number of gpubox files opened
    pub num_gpubox_files: usize,

    /// All timesteps, in time order
    pub timesteps: Vec<TimeStep>,
    /// All coarse channels, by receiver channel
    pub coarse_chans: Vec<CoarseChannel>,
    /// Timesteps with data for at least one coarse channel
    pub provided_timestep_indices: Vec<usize>,
    /// Coarse channels with data for at least one timestep
    pub provided_coarse_chan_indices: Vec<usize>,
    /// Timesteps with data for every provided coarse channel
    pub common_timestep_indices: Vec<usize>,
    /// Provided coarse channels present in every common timestep
    pub common_coarse_chan_indices: Vec<usize>,
    /// Common timesteps at or after the good time
    pub common_good_timestep_indices: Vec<usize>,
}

impl Metadata {
    pub(crate) fn new(
        metafits_context: &MetafitsContext,
        corr_version: CorrelatorVersion,
        observation: &ValidatedObservation,
        num_gpubox_files: usize,
    ) -> Self {
        let ValidatedObservation {
            coarse_chans,
            timesteps,
            coverage,
        } = observation;
        let int_time_ms = metafits_context.integration_time_ms;

        let provided_timestep_indices = provided_indices(coverage, |&(t, _)| t);
        let provided_coarse_chan_indices = provided_indices(coverage, |&(_, c)| c);

        let common_timestep_indices: Vec<usize> = provided_timestep_indices
            .iter()
            .copied()
            .filter(|&t| {
                provided_coarse_chan_indices
                    .iter()
                    .all(|&c| coverage.contains_key(&(t, c)))
            })
            .collect();
        let common_coarse_chan_indices = if common_timestep_indices.is_empty() {
            vec![]
        } else {
            provided_coarse_chan_indices.clone()
        };
        let common_good_timestep_indices: Vec<usize> = common_timestep_indices
            .iter()
            .copied()
            .filter(|&t| timesteps[t].unix_time_ms >= metafits_context.good_time_unix_ms)
            .collect();

        let span = |indices: &[usize]| match (indices.first(), indices.last()) {
            (Some(&first), Some(&last)) => (
                timesteps[first].unix_time_ms,
                timesteps[last].unix_time_ms + int_time_ms,
            ),
            _ => (0, 0),
        };
        let (start_unix_time_ms, end_unix_time_ms) = span(&provided_timestep_indices);
        let (common_start_unix_time_ms, common_end_unix_time_ms) = span(&common_timestep_indices);

        let shape = VisShape {
            num_baselines: metafits_context.num_baselines,
            num_fine_chans: metafits_context.num_fine_chans_per_coarse,
            num_visibility_pols: metafits_context.num_visibility_pols,
        };
        let num_timestep_coarse_chan_floats = shape.num_floats();

        Self {
            metafits_filename: metafits_context.metafits_filename.clone(),
            metafits_version: metafits_context.version,
            obsid: metafits_context.obsid,
            corr_version,
            coax_v_factor: metafits_context.coax_v_factor,
            start_unix_time_ms,
            end_unix_time_ms,
            duration_ms: end_unix_time_ms - start_unix_time_ms,
            start_gps_time_ms: metafits_context.unix_to_gps_ms(start_unix_time_ms),
            end_gps_time_ms: metafits_context.unix_to_gps_ms(end_unix_time_ms),
            sched_start_unix_time_ms: metafits_context.sched_start_unix_time_ms,
            sched_end_unix_time_ms: metafits_context.sched_end_unix_time_ms,
            sched_duration_ms: metafits_context.sched_duration_ms,
            good_time_unix_ms: metafits_context.good_time_unix_ms,
            common_start_unix_time_ms,
            common_end_unix_time_ms,
            common_duration_ms: common_end_unix_time_ms - common_start_unix_time_ms,
            common_bandwidth_hz: common_coarse_chan_indices.len() as u32
                * metafits_context.coarse_chan_width_hz,
            num_timesteps: timesteps.len(),
            num_antennas: metafits_context.num_antennas,
            num_baselines: metafits_context.num_baselines,
            num_rf_inputs: metafits_context.num_rf_inputs,
            num_antenna_pols: metafits_context.num_antenna_pols,
            num_visibility_pols: metafits_context.num_visibility_pols,
            num_coarse_chans: coarse_chans.len(),
            num_fine_chans_per_coarse: metafits_context.num_fine_chans_per_coarse,
            num_timestep_coarse_chan_bytes: num_timestep_coarse_chan_floats
                * std::mem::size_of::<f32>(),
            num_timestep_coarse_chan_floats,
            integration_time_ms: int_time_ms,
            fine_chan_width_hz: metafits_context.fine_chan_width_hz,
            obs_bandwidth_hz: metafits_context.obs_bandwidth_hz,
            coarse_chan_width_hz: metafits_context.coarse_chan_width_hz,
            num_gpubox_files,
            timesteps: timesteps.clone(),
            coarse_chans: coarse_chans.clone(),
            provided_timestep_indices,
            provided_coarse_chan_indices,
            common_timestep_indices,
            common_coarse_chan_indices,
            common_good_timestep_indices,
        }
    }

    /// The shape of one timestep and coarse channel of visibilities.
    pub fn vis_shape(&self) -> VisShape {
        VisShape {
            num_baselines: self.num_baselines,
            num_fine_chans: self.num_fine_chans_per_coarse,
            num_visibility_pols: self.num_visibility_pols,
        }
    }
}

fn provided_indices(coverage: &CoverageMap, key: impl Fn(&(usize, usize)) -> usize) -> Vec<usize> {
    let mut indices: Vec<usize> = coverage.keys().map(key).collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_common::{write_test_metafits, TestObs};
    use tempfile::tempdir;

    fn metadata_for(coverage: &[(usize, usize)]) -> Metadata {
        let tmp_dir = tempdir().unwrap();
        let obs = TestObs::mwax_small();
        let path = write_test_metafits(tmp_dir.path(), &obs).unwrap();
        let metafits_context = MetafitsContext::new(&path).unwrap();
        let observation = ValidatedObservation {
            coarse_chans: CoarseChannel::populate_coarse_channels(
                CorrelatorVersion::V2,
                &metafits_context.receiver_channels,
                metafits_context.coarse_chan_width_hz,
            ),
            timesteps: TimeStep::populate_timesteps(&metafits_context, &Default::default()),
            coverage: coverage
                .iter()
                .enumerate()
                .map(|(i, &tc)| (tc, (i, 1)))
                .collect(),
        };
        Metadata::new(&metafits_context, CorrelatorVersion::V2, &observation, 2)
    }

    #[test]
    fn test_metadata_counts() {
        let metadata = metadata_for(&[(0, 0), (0, 1)]);
        assert_eq!(metadata.obsid, 1_297_526_432);
        assert_eq!(metadata.num_antennas, 4);
        assert_eq!(
            metadata.num_baselines,
            metadata.num_antennas * (metadata.num_antennas + 1) / 2
        );
        assert_eq!(metadata.num_timesteps, 4);
        assert_eq!(metadata.num_coarse_chans, 2);
        assert_eq!(metadata.num_timestep_coarse_chan_floats, 10 * 4 * 4 * 2);
        assert_eq!(metadata.num_timestep_coarse_chan_bytes, 10 * 4 * 4 * 2 * 4);
        assert_eq!(metadata.num_gpubox_files, 2);
        assert_eq!(metadata.vis_shape().num_floats(), 320);
    }

    #[test]
    fn test_metadata_common_and_provided() {
        // chan 0 everywhere but timestep 3, chan 1 only on timesteps 1 and 2
        let metadata = metadata_for(&[(0, 0), (1, 0), (2, 0), (1, 1), (2, 1)]);
        assert_eq!(metadata.provided_timestep_indices, vec![0, 1, 2]);
        assert_eq!(metadata.provided_coarse_chan_indices, vec![0, 1]);
        assert_eq!(metadata.common_timestep_indices, vec![1, 2]);
        assert_eq!(metadata.common_coarse_chan_indices, vec![0, 1]);
        // good time is half a second (one timestep) after the start
        assert_eq!(metadata.common_good_timestep_indices, vec![1, 2]);

        assert_eq!(metadata.start_unix_time_ms, 1_613_491_214_000);
        assert_eq!(metadata.end_unix_time_ms, 1_613_491_215_500);
        assert_eq!(metadata.duration_ms, 1_500);
        assert_eq!(metadata.start_gps_time_ms, 1_297_526_432_000);
        assert_eq!(metadata.common_start_unix_time_ms, 1_613_491_214_500);
        assert_eq!(metadata.common_end_unix_time_ms, 1_613_491_215_500);
        assert_eq!(metadata.common_duration_ms, 1_000);
        assert_eq!(metadata.common_bandwidth_hz, 2_560_000);
    }

    #[test]
    fn test_metadata_no_common_timesteps() {
        let metadata = metadata_for(&[(0, 0), (1, 1)]);
        assert!(metadata.common_timestep_indices.is_empty());
        assert!(metadata.common_coarse_chan_indices.is_empty());
        assert_eq!(metadata.common_duration_ms, 0);
        assert_eq!(metadata.common_bandwidth_hz, 0);
        assert_eq!(metadata.duration_ms, 1_000);
    }
}
