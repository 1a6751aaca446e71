//! Timesteps of an observation.

use std::{collections::BTreeSet, fmt};

use crate::metafits::MetafitsContext;

/// One correlator integration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeStep {
    /// UNIX time at the start of the integration
    pub unix_time_ms: u64,
    /// GPS time at the start of the integration
    pub gps_time_ms: u64,
}

impl TimeStep {
    /// Every scheduled integration of the observation, merged with any times
    /// the gpubox files provide outside of the schedule, in time order.
    pub fn populate_timesteps(
        metafits_context: &MetafitsContext,
        provided_unix_times_ms: &BTreeSet<u64>,
    ) -> Vec<Self> {
        let scheduled = (metafits_context.sched_start_unix_time_ms
            ..metafits_context.sched_end_unix_time_ms)
            .step_by(metafits_context.integration_time_ms as usize);

        scheduled
            .chain(provided_unix_times_ms.iter().copied())
            .collect::<BTreeSet<u64>>()
            .into_iter()
            .map(|unix_time_ms| TimeStep {
                unix_time_ms,
                gps_time_ms: metafits_context.unix_to_gps_ms(unix_time_ms),
            })
            .collect()
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unix={:.3}, gps={:.3}",
            self.unix_time_ms as f64 / 1e3,
            self.gps_time_ms as f64 / 1e3
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_common::{write_test_metafits, TestObs};
    use tempfile::tempdir;

    #[test]
    fn test_scheduled_timesteps_only() {
        let tmp_dir = tempdir().unwrap();
        let path = write_test_metafits(tmp_dir.path(), &TestObs::mwax_small()).unwrap();
        let metafits_context = MetafitsContext::new(&path).unwrap();

        let timesteps = TimeStep::populate_timesteps(&metafits_context, &BTreeSet::new());
        assert_eq!(timesteps.len(), 4);
        assert_eq!(timesteps[0].unix_time_ms, 1_613_491_214_000);
        assert_eq!(timesteps[0].gps_time_ms, 1_297_526_432_000);
        assert_eq!(timesteps[3].unix_time_ms, 1_613_491_215_500);
        assert_eq!(timesteps[3].gps_time_ms, 1_297_526_433_500);
    }

    #[test]
    fn test_provided_times_extend_schedule() {
        let tmp_dir = tempdir().unwrap();
        let path = write_test_metafits(tmp_dir.path(), &TestObs::mwax_small()).unwrap();
        let metafits_context = MetafitsContext::new(&path).unwrap();

        // one inside the schedule (no new timestep), one after it
        let provided: BTreeSet<u64> = [1_613_491_214_500, 1_613_491_216_000].into();
        let timesteps = TimeStep::populate_timesteps(&metafits_context, &provided);
        assert_eq!(timesteps.len(), 5);
        assert_eq!(timesteps[4].unix_time_ms, 1_613_491_216_000);
        assert_eq!(timesteps[4].gps_time_ms, 1_297_526_434_000);
        assert!(timesteps.windows(2).all(|w| w[0] < w[1]));
    }
}
