//! Baselines in correlator output order.

/// A pair of antennas, by index into the observation's antennas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Baseline {
    /// The first antenna
    pub ant1_index: usize,
    /// The second antenna, never less than the first
    pub ant2_index: usize,
}

impl Baseline {
    /// Every baseline of `num_antennas` antennas, autocorrelations included, in
    /// the order the correlator writes them: `(0, 0), (0, 1), .., (1, 1), ..`.
    pub fn populate_baselines(num_antennas: usize) -> Vec<Self> {
        (0..num_antennas)
            .flat_map(|ant1_index| {
                (ant1_index..num_antennas).map(move |ant2_index| Baseline {
                    ant1_index,
                    ant2_index,
                })
            })
            .collect()
    }

    /// Whether both antennas are the same.
    pub fn is_auto(&self) -> bool {
        self.ant1_index == self.ant2_index
    }
}
