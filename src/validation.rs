//! Cross-checking a metafits file against its gpubox files.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::{
    coarse_channel::CoarseChannel,
    constants::{LEGACY_CORR_VER, MWAX_CORR_VER, NUM_COMPLEX_COMPONENTS},
    gpubox_files::{create_time_map, GpuboxDescriptor, GpuboxError},
    metafits::MetafitsContext,
    timestep::TimeStep,
    CorrelatorVersion,
};

/// Maps a (timestep index, coarse channel index) pair to the index of the
/// gpubox file holding it and the HDU within that file. Pairs without an entry
/// are gaps.
pub type CoverageMap = BTreeMap<(usize, usize), (usize, usize)>;

/// The observation's channels and times, with the location of every HDU.
#[derive(Debug)]
pub struct ValidatedObservation {
    /// All coarse channels in the metafits, by receiver channel
    pub coarse_chans: Vec<CoarseChannel>,
    /// All timesteps, scheduled or provided
    pub timesteps: Vec<TimeStep>,
    /// Where each provided (timestep, coarse channel) lives
    pub coverage: CoverageMap,
}

fn check_corr_ver(
    descriptor: &GpuboxDescriptor,
    corr_version: CorrelatorVersion,
) -> Result<(), GpuboxError> {
    let gpubox_filename = || descriptor.file.filename.clone();
    if let Some(corr_ver) = descriptor.corr_ver {
        if corr_ver != LEGACY_CORR_VER && corr_ver != MWAX_CORR_VER {
            return Err(GpuboxError::UnsupportedCorrVer {
                gpubox_filename: gpubox_filename(),
                corr_ver,
            });
        }
    }
    match (corr_version, descriptor.corr_ver) {
        (CorrelatorVersion::V2, Some(MWAX_CORR_VER)) => Ok(()),
        (CorrelatorVersion::V2, Some(_)) => Err(GpuboxError::MwaxCorrVerMismatch(gpubox_filename())),
        (CorrelatorVersion::V2, None) => Err(GpuboxError::MwaxCorrVerMissing(gpubox_filename())),
        (_, None) | (_, Some(LEGACY_CORR_VER)) => Ok(()),
        (_, Some(gpu_corr_version_value)) => Err(GpuboxError::CorrVerMismatch {
            gpubox_filename: gpubox_filename(),
            gpu_corr_version_value,
        }),
    }
}

/// Confirm every gpubox file belongs to the observation the metafits
/// describes, then index which file and HDU holds each timestep and coarse
/// channel.
///
/// # Errors
///
/// The first inconsistency found, naming the offending file:
/// - [`GpuboxError::ObsidMismatch`] for a file from another observation
/// - [`GpuboxError::UnsupportedCorrVer`] for a `CORR_VER` no correlator writes
/// - [`GpuboxError::CorrVerMismatch`], [`GpuboxError::MwaxCorrVerMismatch`] or
///   [`GpuboxError::MwaxCorrVerMissing`] for a `CORR_VER` contradicting the
///   filenames
/// - [`GpuboxError::NinputsMismatch`] or [`GpuboxError::NaxisMismatch`] for
///   counts disagreeing with the metafits
/// - [`GpuboxError::UnknownChannel`] for a channel the metafits doesn't list
/// - [`GpuboxError::DuplicateCoverage`] for a timestep and channel claimed
///   twice
pub fn validate_observation(
    metafits_context: &MetafitsContext,
    corr_version: CorrelatorVersion,
    descriptors: &[GpuboxDescriptor],
) -> Result<ValidatedObservation, GpuboxError> {
    let coarse_chans = CoarseChannel::populate_coarse_channels(
        corr_version,
        &metafits_context.receiver_channels,
        metafits_context.coarse_chan_width_hz,
    );
    let chan_index_by_gpubox: BTreeMap<usize, usize> = coarse_chans
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.gpubox_number, idx))
        .collect();

    let floats_per_vis = metafits_context.num_visibility_pols * NUM_COMPLEX_COMPONENTS;
    let (expected_naxis1, expected_naxis2) = match corr_version {
        CorrelatorVersion::V2 => (
            metafits_context.num_fine_chans_per_coarse * floats_per_vis,
            metafits_context.num_baselines,
        ),
        CorrelatorVersion::Legacy | CorrelatorVersion::OldLegacy => (
            metafits_context.num_baselines * floats_per_vis,
            metafits_context.num_fine_chans_per_coarse,
        ),
    };

    for descriptor in descriptors {
        let gpubox_filename = &descriptor.file.filename;
        if descriptor.obsid != metafits_context.obsid {
            return Err(GpuboxError::ObsidMismatch {
                obsid: metafits_context.obsid,
                gpubox_filename: gpubox_filename.clone(),
                gpubox_obsid: descriptor.obsid,
            });
        }

        check_corr_ver(descriptor, corr_version)?;

        match descriptor.num_rf_inputs {
            Some(gpubox_num_rf_inputs)
                if gpubox_num_rf_inputs != metafits_context.num_rf_inputs =>
            {
                return Err(GpuboxError::NinputsMismatch {
                    gpubox_filename: gpubox_filename.clone(),
                    gpubox_num_rf_inputs,
                    metafits_num_rf_inputs: metafits_context.num_rf_inputs,
                })
            }
            _ => {}
        }

        if !chan_index_by_gpubox.contains_key(&descriptor.file.channel_identifier) {
            return Err(GpuboxError::UnknownChannel {
                gpubox_filename: gpubox_filename.clone(),
                channel_identifier: descriptor.file.channel_identifier,
                expected: format!("{:?}", chan_index_by_gpubox.keys().collect::<Vec<_>>()),
            });
        }

        if let Some(hdu) = descriptor
            .hdus
            .iter()
            .find(|hdu| hdu.naxis1 != expected_naxis1 || hdu.naxis2 != expected_naxis2)
        {
            return Err(GpuboxError::NaxisMismatch {
                gpubox_filename: gpubox_filename.clone(),
                hdu_num: hdu.hdu_index,
                naxis1: hdu.naxis1,
                naxis2: hdu.naxis2,
                expected_naxis1,
                expected_naxis2,
                metafits_baselines: metafits_context.num_baselines,
                metafits_fine_chans_per_coarse: metafits_context.num_fine_chans_per_coarse,
                visibility_pols: metafits_context.num_visibility_pols,
            });
        }
    }

    let time_map = create_time_map(descriptors)?;
    let provided_times: BTreeSet<u64> = time_map.keys().copied().collect();
    let timesteps = TimeStep::populate_timesteps(metafits_context, &provided_times);

    let mut coverage = CoverageMap::new();
    for (unix_time_ms, chans) in &time_map {
        // every provided time is one of the timesteps
        let timestep_index = timesteps
            .binary_search_by_key(unix_time_ms, |t| t.unix_time_ms)
            .unwrap_or_else(|idx| idx);
        for (channel_identifier, &location) in chans {
            coverage.insert(
                (timestep_index, chan_index_by_gpubox[channel_identifier]),
                location,
            );
        }
    }
    debug!(
        "{} timesteps x {} coarse channels, {} provided",
        timesteps.len(),
        coarse_chans.len(),
        coverage.len()
    );

    Ok(ValidatedObservation {
        coarse_chans,
        timesteps,
        coverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gpubox_files::{GpuboxFile, GpuboxHdu},
        test_common::{write_test_metafits, TestObs},
    };
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn mwax_metafits() -> (tempfile::TempDir, MetafitsContext, TestObs) {
        let tmp_dir = tempdir().unwrap();
        let obs = TestObs::mwax_small();
        let path = write_test_metafits(tmp_dir.path(), &obs).unwrap();
        let context = MetafitsContext::new(&path).unwrap();
        (tmp_dir, context, obs)
    }

    fn descriptor(obs: &TestObs, channel: usize, batch: usize, times: &[u64]) -> GpuboxDescriptor {
        GpuboxDescriptor {
            file: GpuboxFile {
                filename: PathBuf::from(format!(
                    "{}_20210216160014_ch{:03}_{:03}.fits",
                    obs.obsid, channel, batch
                )),
                channel_identifier: channel,
                batch_number: batch,
            },
            obsid: obs.obsid,
            corr_ver: Some(2),
            num_rf_inputs: Some(obs.num_rf_inputs),
            hdus: times
                .iter()
                .enumerate()
                .map(|(i, &unix_time_ms)| GpuboxHdu {
                    hdu_index: 2 * i + 1,
                    unix_time_ms,
                    naxis1: 4 * 4 * 2,
                    naxis2: 10,
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_builds_coverage_with_gaps() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();
        let descriptors = [
            descriptor(&obs, 117, 0, &times[0..2]),
            descriptor(&obs, 118, 0, &times[1..3]),
        ];
        let validated =
            validate_observation(&context, CorrelatorVersion::V2, &descriptors).unwrap();

        assert_eq!(validated.timesteps.len(), 4);
        assert_eq!(validated.coarse_chans.len(), 2);
        assert_eq!(validated.coarse_chans[0].rec_chan_number, 117);
        assert_eq!(validated.coverage.len(), 4);
        assert_eq!(validated.coverage[&(0, 0)], (0, 1));
        assert_eq!(validated.coverage[&(1, 0)], (0, 3));
        assert_eq!(validated.coverage[&(1, 1)], (1, 1));
        assert_eq!(validated.coverage[&(2, 1)], (1, 3));
        assert!(!validated.coverage.contains_key(&(0, 1)));
        assert!(!validated.coverage.contains_key(&(3, 0)));
    }

    #[test]
    fn test_validate_obsid_mismatch() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();
        let mut bad = descriptor(&obs, 118, 0, &times);
        bad.obsid += 8;
        let descriptors = [descriptor(&obs, 117, 0, &times), bad];
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &descriptors),
            Err(GpuboxError::ObsidMismatch { gpubox_obsid, .. }) if gpubox_obsid == obs.obsid + 8
        ));
    }

    #[test]
    fn test_validate_corr_ver() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();

        let mut missing = descriptor(&obs, 117, 0, &times);
        missing.corr_ver = None;
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &[missing]),
            Err(GpuboxError::MwaxCorrVerMissing(_))
        ));

        let mut legacy = descriptor(&obs, 117, 0, &times);
        legacy.corr_ver = Some(1);
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &[legacy]),
            Err(GpuboxError::MwaxCorrVerMismatch(_))
        ));
    }

    #[test]
    fn test_check_corr_ver_legacy() {
        let obs = TestObs::mwax_small();
        let mut legacy = descriptor(&obs, 1, 0, &[]);
        legacy.corr_ver = None;
        assert!(check_corr_ver(&legacy, CorrelatorVersion::Legacy).is_ok());
        legacy.corr_ver = Some(1);
        assert!(check_corr_ver(&legacy, CorrelatorVersion::OldLegacy).is_ok());
        legacy.corr_ver = Some(2);
        assert!(matches!(
            check_corr_ver(&legacy, CorrelatorVersion::Legacy),
            Err(GpuboxError::CorrVerMismatch {
                gpu_corr_version_value: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_check_corr_ver_unsupported() {
        let obs = TestObs::mwax_small();
        let mut future = descriptor(&obs, 117, 0, &[]);
        future.corr_ver = Some(3);
        assert!(matches!(
            check_corr_ver(&future, CorrelatorVersion::V2),
            Err(GpuboxError::UnsupportedCorrVer { corr_ver: 3, .. })
        ));
        future.corr_ver = Some(0);
        assert!(matches!(
            check_corr_ver(&future, CorrelatorVersion::Legacy),
            Err(GpuboxError::UnsupportedCorrVer { corr_ver: 0, .. })
        ));
    }

    #[test]
    fn test_validate_count_mismatches() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();

        let mut ninputs = descriptor(&obs, 117, 0, &times);
        ninputs.num_rf_inputs = Some(256);
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &[ninputs]),
            Err(GpuboxError::NinputsMismatch {
                gpubox_num_rf_inputs: 256,
                metafits_num_rf_inputs: 8,
                ..
            })
        ));

        let mut naxis = descriptor(&obs, 117, 0, &times);
        naxis.hdus[2].naxis2 = 36;
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &[naxis]),
            Err(GpuboxError::NaxisMismatch {
                hdu_num: 5,
                naxis2: 36,
                expected_naxis1: 32,
                expected_naxis2: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_unknown_channel() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();
        let descriptors = [descriptor(&obs, 119, 0, &times)];
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &descriptors),
            Err(GpuboxError::UnknownChannel {
                channel_identifier: 119,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_duplicate_across_files() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let times = obs.scheduled_unix_times_ms();
        let descriptors = [
            descriptor(&obs, 117, 0, &times[0..2]),
            descriptor(&obs, 117, 1, &times[1..4]),
        ];
        assert!(matches!(
            validate_observation(&context, CorrelatorVersion::V2, &descriptors),
            Err(GpuboxError::DuplicateCoverage { .. })
        ));
    }

    #[test]
    fn test_validate_time_outside_schedule() {
        let (_tmp_dir, context, obs) = mwax_metafits();
        let mut times = obs.scheduled_unix_times_ms();
        let late = context.sched_end_unix_time_ms + 500;
        times.push(late);
        let descriptors = [descriptor(&obs, 117, 0, &times)];
        let validated =
            validate_observation(&context, CorrelatorVersion::V2, &descriptors).unwrap();
        assert_eq!(validated.timesteps.len(), 5);
        assert_eq!(validated.timesteps[4].unix_time_ms, late);
        assert_eq!(validated.coverage[&(4, 0)], (0, 9));
    }
}
