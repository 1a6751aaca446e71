//! The RF inputs of the array, read from the metafits TILEDATA table.

use std::{fmt, path::Path};

use fitsio::{hdu::FitsHdu, FitsFile};

use crate::metafits::MetafitsError;

/// Prefix of a TILEDATA `Length` already given as an electrical length.
const ELECTRICAL_LENGTH_PREFIX: &str = "EL_";

/// Polarisation of an RF input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pol {
    /// East-west dipoles
    X,
    /// North-south dipoles
    Y,
}

impl fmt::Display for Pol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Pol::X => "X",
                Pol::Y => "Y",
            }
        )
    }
}

/// One polarisation of one tile, as the receivers and correlator see it.
#[derive(Clone, Debug, PartialEq)]
pub struct RFInput {
    /// `Input` in TILEDATA
    pub input: u32,
    /// `Antenna` in TILEDATA
    pub ant: u32,
    /// `Tile`, the tile's id number
    pub tile_id: u32,
    /// `TileName`
    pub tile_name: String,
    /// `Pol`
    pub pol: Pol,
    /// Electrical length of the cable, metres
    pub electrical_length_m: f64,
    /// Tile position north of the array centre, metres
    pub north_m: f64,
    /// Tile position east of the array centre, metres
    pub east_m: f64,
    /// Tile height above sea level, metres
    pub height_m: f64,
    /// `Flag`, non-zero when the input is flagged
    pub flagged: bool,
    /// `Rx`, the receiver the input is plugged into
    pub rec_number: u32,
    /// `Slot` on that receiver
    pub rec_slot_number: u32,
    /// Position of the input in the correlator output
    pub subfile_order: u32,
}

/// Parse a TILEDATA `Length`: `EL_<metres>` is already electrical, anything
/// else is a physical length scaled by the cable's velocity factor.
fn parse_electrical_length_m(length: &str, coax_v_factor: f64) -> Option<f64> {
    let length = length.trim();
    match length.strip_prefix(ELECTRICAL_LENGTH_PREFIX) {
        Some(electrical) => electrical.parse().ok(),
        None => length.parse::<f64>().ok().map(|l| l * coax_v_factor),
    }
}

fn tile_data_error(reason: String, fits_filename: &Path) -> MetafitsError {
    MetafitsError::TileData {
        reason,
        fits_filename: fits_filename.to_path_buf(),
    }
}

impl RFInput {
    /// Read the TILEDATA table, returning the inputs in correlator output
    /// order.
    ///
    /// # Errors
    ///
    /// - [`MetafitsError::Fits`] if a column is missing or unreadable
    /// - [`MetafitsError::TileData`] if the table doesn't hold exactly
    ///   `num_rf_inputs` rows, or its rows don't pair X and Y inputs of each
    ///   tile into a complete correlator order
    pub fn populate_rf_inputs(
        num_rf_inputs: usize,
        metafits_fptr: &mut FitsFile,
        tile_hdu: &FitsHdu,
        coax_v_factor: f64,
        metafits_filename: &Path,
    ) -> Result<Vec<Self>, MetafitsError> {
        let inputs: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Input")?;
        let ants: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Antenna")?;
        let tiles: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Tile")?;
        let tile_names: Vec<String> = get_fits_col!(metafits_fptr, tile_hdu, "TileName")?;
        let pols: Vec<String> = get_fits_col!(metafits_fptr, tile_hdu, "Pol")?;
        let rxs: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Rx")?;
        let slots: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Slot")?;
        let flags: Vec<i32> = get_fits_col!(metafits_fptr, tile_hdu, "Flag")?;
        let lengths: Vec<String> = get_fits_col!(metafits_fptr, tile_hdu, "Length")?;
        let norths: Vec<f32> = get_fits_col!(metafits_fptr, tile_hdu, "North")?;
        let easts: Vec<f32> = get_fits_col!(metafits_fptr, tile_hdu, "East")?;
        let heights: Vec<f32> = get_fits_col!(metafits_fptr, tile_hdu, "Height")?;

        if inputs.len() != num_rf_inputs {
            return Err(tile_data_error(
                format!("{} rows, but NINPUTS is {}", inputs.len(), num_rf_inputs),
                metafits_filename,
            ));
        }

        let non_negative = |column: &str, row: usize, value: i32| {
            u32::try_from(value).map_err(|_| {
                tile_data_error(
                    format!("row {} has {} = {}", row, column, value),
                    metafits_filename,
                )
            })
        };

        let mut rf_inputs = Vec::with_capacity(num_rf_inputs);
        for row in 0..num_rf_inputs {
            let pol = match pols[row].trim() {
                "X" => Pol::X,
                "Y" => Pol::Y,
                other => {
                    return Err(tile_data_error(
                        format!("row {} has Pol = {:?}", row, other),
                        metafits_filename,
                    ))
                }
            };
            let ant = non_negative("Antenna", row, ants[row])?;
            let electrical_length_m = parse_electrical_length_m(&lengths[row], coax_v_factor)
                .ok_or_else(|| {
                    tile_data_error(
                        format!("row {} has Length = {:?}", row, lengths[row]),
                        metafits_filename,
                    )
                })?;
            rf_inputs.push(RFInput {
                input: non_negative("Input", row, inputs[row])?,
                ant,
                tile_id: non_negative("Tile", row, tiles[row])?,
                tile_name: tile_names[row].trim().to_string(),
                pol,
                electrical_length_m,
                north_m: norths[row] as f64,
                east_m: easts[row] as f64,
                height_m: heights[row] as f64,
                flagged: flags[row] != 0,
                rec_number: non_negative("Rx", row, rxs[row])?,
                rec_slot_number: non_negative("Slot", row, slots[row])?,
                subfile_order: ant
                    .saturating_mul(2)
                    .saturating_add(if pol == Pol::Y { 1 } else { 0 }),
            });
        }

        rf_inputs.sort_by_key(|rf| rf.subfile_order);
        for (position, rf) in rf_inputs.iter().enumerate() {
            if rf.subfile_order as usize != position {
                return Err(tile_data_error(
                    format!(
                        "Antenna/Pol don't give each of the {} correlator inputs exactly once (input {} is {}{})",
                        num_rf_inputs, rf.input, rf.ant, rf.pol
                    ),
                    metafits_filename,
                ));
            }
        }
        for pair in rf_inputs.chunks_exact(2) {
            if pair[0].tile_id != pair[1].tile_id {
                return Err(tile_data_error(
                    format!(
                        "antenna {} pairs tile {} with tile {}",
                        pair[0].ant, pair[0].tile_id, pair[1].tile_id
                    ),
                    metafits_filename,
                ));
            }
        }
        Ok(rf_inputs)
    }
}

impl fmt::Display for RFInput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.tile_name, self.pol)
    }
}
