//! Coarse channels, and how each correlator generation numbers them.

use std::fmt;

use crate::{constants::LEGACY_REVERSE_CHAN_THRESHOLD, CorrelatorVersion};

/// One coarse channel of the observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoarseChannel {
    /// Index of the channel in the correlator output
    pub corr_chan_number: usize,
    /// Receiver channel number (`CHANNELS` in the metafits)
    pub rec_chan_number: usize,
    /// The number that names the channel's gpubox files. `gpuboxNN` for the
    /// legacy correlator, `chNNN` for MWAX
    pub gpubox_number: usize,
    /// Width of the channel
    pub chan_width_hz: u32,
    /// Lowest frequency of the channel
    pub chan_start_hz: u32,
    /// Centre frequency of the channel
    pub chan_centre_hz: u32,
    /// Highest frequency of the channel
    pub chan_end_hz: u32,
}

impl CoarseChannel {
    fn new(
        corr_chan_number: usize,
        rec_chan_number: usize,
        gpubox_number: usize,
        chan_width_hz: u32,
    ) -> Self {
        // metafits channels are range checked; saturate for anything else
        let chan_centre_hz = u32::try_from(rec_chan_number)
            .unwrap_or(u32::MAX)
            .saturating_mul(chan_width_hz);
        Self {
            corr_chan_number,
            rec_chan_number,
            gpubox_number,
            chan_width_hz,
            chan_start_hz: chan_centre_hz.saturating_sub(chan_width_hz / 2),
            chan_centre_hz,
            chan_end_hz: chan_centre_hz.saturating_add(chan_width_hz / 2),
        }
    }

    /// Build the coarse channels of an observation from its receiver channel
    /// numbers, sorted by receiver channel.
    ///
    /// The legacy correlator writes receiver channels above 128 in reverse
    /// order, so their correlator (and gpubox) numbers count down from the
    /// top. MWAX names each gpubox file after its receiver channel.
    pub fn populate_coarse_channels(
        corr_version: CorrelatorVersion,
        receiver_channels: &[usize],
        coarse_chan_width_hz: u32,
    ) -> Vec<Self> {
        let mut receiver_channels = receiver_channels.to_vec();
        receiver_channels.sort_unstable();
        receiver_channels.dedup();

        let num_chans = receiver_channels.len();
        let first_reversed = receiver_channels
            .iter()
            .position(|&rec| rec > LEGACY_REVERSE_CHAN_THRESHOLD)
            .unwrap_or(num_chans);

        receiver_channels
            .into_iter()
            .enumerate()
            .map(|(idx, rec)| match corr_version {
                CorrelatorVersion::V2 => CoarseChannel::new(idx, rec, rec, coarse_chan_width_hz),
                CorrelatorVersion::Legacy | CorrelatorVersion::OldLegacy => {
                    let corr = if idx < first_reversed {
                        idx
                    } else {
                        (num_chans - 1) - (idx - first_reversed)
                    };
                    CoarseChannel::new(corr, rec, corr + 1, coarse_chan_width_hz)
                }
            })
            .collect()
    }
}

impl fmt::Display for CoarseChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "gpu={} corr={} rec={} @ {:.3} MHz",
            self.gpubox_number,
            self.corr_chan_number,
            self.rec_chan_number,
            self.chan_centre_hz as f64 / 1e6
        )
    }
}
