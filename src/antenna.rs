//! Antennas (tiles), each the pair of an X and a Y RF input.

use std::fmt;

use crate::rf_input::RFInput;

/// One antenna of the array.
#[derive(Clone, Debug, PartialEq)]
pub struct Antenna {
    /// `Antenna` in TILEDATA; also the antenna's index in the correlator output
    pub ant: u32,
    /// The tile's id number
    pub tile_id: u32,
    /// The tile's name
    pub tile_name: String,
    /// The X polarisation input
    pub rfinput_x: RFInput,
    /// The Y polarisation input
    pub rfinput_y: RFInput,
}

impl Antenna {
    /// Pair up RF inputs already in correlator output order (X then Y for each
    /// antenna).
    pub fn populate_antennas(rf_inputs: &[RFInput]) -> Vec<Self> {
        rf_inputs
            .chunks_exact(2)
            .map(|pair| Antenna {
                ant: pair[0].ant,
                tile_id: pair[0].tile_id,
                tile_name: pair[0].tile_name.clone(),
                rfinput_x: pair[0].clone(),
                rfinput_y: pair[1].clone(),
            })
            .collect()
    }
}

impl fmt::Display for Antenna {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tile_name)
    }
}
