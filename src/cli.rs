//! Command line interface for summing the visibilities of an observation.

use crate::{
    constants::NUM_COMPLEX_COMPONENTS,
    error::ErrorKind,
    gpubox_files::{determine_gpubox_batches, read_gpubox_descriptor, GpuboxError},
    metafits::fmt_unix_ms,
    CorrelatorContext, GpufitsError,
};
use clap::{arg, command, ValueHint::FilePath};
use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace, warn};
use prettytable::{cell, format as prettyformat, row, table};
use rayon::prelude::*;
use std::{
    ffi::OsString,
    fmt::{self, Debug, Display},
    path::PathBuf,
};
use thiserror::Error;

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match GIT_HEAD_REF {
        Some(hr) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                GIT_COMMIT_HASH.unwrap_or("<unknown>"),
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        None => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

/// Errors from the command line tool.
#[derive(Error, Debug)]
pub enum CliError {
    /// clap could not parse the arguments, or was asked for help or the version
    #[error(transparent)]
    ClapError(#[from] clap::Error),

    /// An argument clap accepted makes no sense together with the others
    #[error("Invalid command line argument --{option}. Expected {expected}, received {received}")]
    InvalidCommandLineArgument {
        /// The option name
        option: String,
        /// What was expected
        expected: String,
        /// What was received
        received: String,
    },

    /// The observation could not be opened or read
    #[error(transparent)]
    Gpufits(#[from] GpufitsError),

    /// A required field of [`SumContext`] was never set
    #[error(transparent)]
    Builder(#[from] SumContextBuilderError),
}

/// How to read the visibilities being summed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SumMode {
    /// [`CorrelatorContext::read_by_baseline`]
    ByBaseline,
    /// [`CorrelatorContext::read_by_frequency`]
    ByFrequency,
    /// Every visibility HDU of every gpubox file, without validating the
    /// observation.
    Direct,
}

impl Display for SumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                SumMode::ByBaseline => "by baseline",
                SumMode::ByFrequency => "by frequency",
                SumMode::Direct => "direct",
            }
        )
    }
}

/// The result of summing in one [`SumMode`].
#[derive(Clone, Debug)]
pub struct SumReport {
    /// How the visibilities were read
    pub mode: SumMode,
    /// Sum of every float read, accumulated in f64
    pub sum: f64,
    /// Number of floats read
    pub count: u64,
    /// Number of HDUs read
    pub num_reads: usize,
    /// (timestep, coarse channel) pairs with no data
    pub num_gaps: usize,
    /// The first floats of the first read, if asked for
    pub first_floats: Vec<f32>,
}

impl Display for SumReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sum {}: {}; Count: {}; HDUs: {}",
            self.mode, self.sum, self.count, self.num_reads
        )?;
        if self.num_gaps > 0 {
            write!(f, "; Gaps: {}", self.num_gaps)?;
        }
        if !self.first_floats.is_empty() {
            write!(
                f,
                "\nFirst {} floats: {:?}",
                self.first_floats.len(),
                self.first_floats
            )?;
        }
        Ok(())
    }
}

/// Options for summing an observation.
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct SumContext {
    /// The opened observation. Only [`SumMode::Direct`] works without one.
    #[builder(default)]
    pub corr_ctx: Option<CorrelatorContext>,
    /// The gpubox files, as given
    pub gpubox_paths: Vec<PathBuf>,
    /// Modes to sum in, in order
    #[builder(default = "vec![SumMode::ByBaseline]")]
    pub modes: Vec<SumMode>,
    /// Keep this many floats from the start of the first read
    #[builder(default)]
    pub num_first_floats: Option<usize>,
    /// Draw progress bars on stderr
    #[builder(default = "true")]
    pub draw_progress: bool,
}

impl Display for SumContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        let modes = self.modes.iter().map(ToString::to_string).collect::<Vec<_>>();
        writeln!(f, "Will sum:             {}", modes.join(", "))?;

        let corr_ctx = match &self.corr_ctx {
            Some(corr_ctx) => corr_ctx,
            None => {
                return writeln!(
                    f,
                    "No metafits given, {} gpubox files will be summed directly",
                    self.gpubox_paths.len()
                )
            }
        };
        let metadata = corr_ctx.metadata();
        let metafits_context = corr_ctx.metafits_context();

        writeln!(
            f,
            "observation name:     {}",
            metafits_context.obs_name.as_deref().unwrap_or("<unknown>")
        )?;
        writeln!(f, "Correlator version:   {}", metadata.corr_version)?;
        writeln!(
            f,
            "Scheduled start:      {}, unix={:.3}, gps={:.3}",
            fmt_unix_ms(metadata.sched_start_unix_time_ms),
            metadata.sched_start_unix_time_ms as f64 / 1e3,
            metafits_context.sched_start_gps_time_ms as f64 / 1e3,
        )?;
        let int_time_s = metadata.integration_time_ms as f64 / 1e3;
        let sched_duration_s = metadata.sched_duration_ms as f64 / 1e3;
        writeln!(
            f,
            "Scheduled duration:   {:.3}s = {:3} * {:.3}s",
            sched_duration_s,
            (sched_duration_s / int_time_s).ceil(),
            int_time_s
        )?;
        writeln!(
            f,
            "Scheduled Bandwidth:  {:.3}MHz = {:3} * {:3} * {:.3}kHz",
            metadata.obs_bandwidth_hz as f64 / 1e6,
            metadata.num_coarse_chans,
            metadata.num_fine_chans_per_coarse,
            metadata.fine_chan_width_hz as f64 / 1e3
        )?;

        let mut timestep_table = table!(["", "UTC", "unix [s]", "gps [s]", "p", "c", "g"]);
        timestep_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (timestep_idx, timestep) in metadata.timesteps.iter().enumerate() {
            let provided = metadata.provided_timestep_indices.contains(&timestep_idx);
            let common = metadata.common_timestep_indices.contains(&timestep_idx);
            let good = metadata
                .common_good_timestep_indices
                .contains(&timestep_idx);
            let row = row![r =>
                format!("ts{}:", timestep_idx),
                fmt_unix_ms(timestep.unix_time_ms),
                format!("{:.3}", timestep.unix_time_ms as f64 / 1e3),
                format!("{:.3}", timestep.gps_time_ms as f64 / 1e3),
                if provided {"p"} else {""},
                if common {"c"} else {""},
                if good {"g"} else {""}
            ];
            timestep_table.add_row(row);
        }
        writeln!(
            f,
            "Timestep details (all={}, provided={}, common={}, good={}):\n{}",
            metadata.num_timesteps,
            metadata.provided_timestep_indices.len(),
            metadata.common_timestep_indices.len(),
            metadata.common_good_timestep_indices.len(),
            timestep_table
        )?;

        let mut coarse_chan_table = table!(["", "gpu", "corr", "rec", "cen [MHz]", "p", "c"]);
        coarse_chan_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (chan_idx, chan) in metadata.coarse_chans.iter().enumerate() {
            let provided = metadata.provided_coarse_chan_indices.contains(&chan_idx);
            let common = metadata.common_coarse_chan_indices.contains(&chan_idx);
            let row = row![r =>
                format!("cc{}:", chan_idx),
                chan.gpubox_number,
                chan.corr_chan_number,
                chan.rec_chan_number,
                format!("{:.4}", chan.chan_centre_hz as f64 / 1e6),
                if provided {"p"} else {""},
                if common {"c"} else {""}
            ];
            coarse_chan_table.add_row(row);
        }
        writeln!(
            f,
            "Coarse channel details (metafits={}, provided={}, common={}):\n{}",
            metadata.num_coarse_chans,
            metadata.provided_coarse_chan_indices.len(),
            metadata.common_coarse_chan_indices.len(),
            coarse_chan_table
        )?;

        writeln!(
            f,
            "Read size:            {} floats = {} bl * {} ch * {} pol * {}",
            metadata.num_timestep_coarse_chan_floats,
            metadata.num_baselines,
            metadata.num_fine_chans_per_coarse,
            metadata.num_visibility_pols,
            NUM_COMPLEX_COMPONENTS
        )
    }
}

fn progress_bar(len: u64, message: String, draw_progress: bool) -> ProgressBar {
    let draw_target = if draw_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let progress = ProgressBar::with_draw_target(Some(len), draw_target);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg:16}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {percent:3}% ({eta:5})")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message(message);
    progress
}

impl SumContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, CliError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Sum the visibilities of Murchison Widefield Array gpubox files.")
            .args(&[
                arg!(-m --metafits <PATH> "Metadata file for the observation")
                    .required(false)
                    .required_unless_present("direct")
                    .value_hint(FilePath)
                    .help_heading("INPUT"),
                arg!(fits_paths: <PATHS>... "GPUBox files to sum")
                    .help_heading("INPUT")
                    .value_hint(FilePath)
                    .required(true),
                arg!(--"by-baseline" "Sum visibilities read by baseline (the default)")
                    .help_heading("MODE"),
                arg!(--"by-frequency" "Sum visibilities read by frequency")
                    .help_heading("MODE"),
                arg!(--direct "Sum every visibility HDU directly, without validating the observation")
                    .help_heading("MODE"),
                arg!(-f --floats <N> "Show the first <N> floats of the first read")
                    .required(false),
                arg!(--"no-draw-progress" "do not show progress bars"),
            ]);
        app.try_get_matches_from(args).map_err(CliError::from)
    }

    /// Parse command line arguments and open the observation.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - [`CliError::ClapError`] if clap cannot parse `args`
    /// - [`CliError::InvalidCommandLineArgument`] if the arguments are invalid
    /// - [`CliError::Gpufits`] if the observation can't be opened
    pub fn from_args<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let gpubox_paths: Vec<PathBuf> = matches
            .values_of("fits_paths")
            .map(|values| values.map(PathBuf::from).collect())
            .unwrap_or_default();

        let mut modes = vec![];
        if matches.is_present("by-baseline") {
            modes.push(SumMode::ByBaseline);
        }
        if matches.is_present("by-frequency") {
            modes.push(SumMode::ByFrequency);
        }
        if matches.is_present("direct") {
            modes.push(SumMode::Direct);
        }
        if modes.is_empty() {
            modes.push(SumMode::ByBaseline);
        }

        let corr_ctx = match matches.value_of("metafits") {
            Some(metafits) => {
                let corr_ctx = CorrelatorContext::new(metafits, &gpubox_paths)?;
                debug!("correlator context:\n{}", &corr_ctx);
                Some(corr_ctx)
            }
            None if modes.iter().all(|&mode| mode == SumMode::Direct) => None,
            None => {
                return Err(CliError::InvalidCommandLineArgument {
                    option: "metafits".into(),
                    expected: "a metafits file unless only --direct is given".into(),
                    received: "nothing".into(),
                })
            }
        };

        let num_first_floats = match matches.value_of("floats") {
            Some(floats) => Some(floats.parse::<usize>().map_err(|_| {
                CliError::InvalidCommandLineArgument {
                    option: "floats".into(),
                    expected: "a non-negative integer".into(),
                    received: floats.into(),
                }
            })?),
            None => None,
        };

        let result = SumContextBuilder::default()
            .corr_ctx(corr_ctx)
            .gpubox_paths(gpubox_paths)
            .modes(modes)
            .num_first_floats(num_first_floats)
            .draw_progress(!matches.is_present("no-draw-progress"))
            .build()?;

        info!("{}", &result);

        Ok(result)
    }

    /// Sum in every requested mode.
    ///
    /// # Errors
    ///
    /// Any read error other than a gap in the observation.
    pub fn run(&self) -> Result<Vec<SumReport>, CliError> {
        self.modes
            .iter()
            .map(|&mode| match mode {
                SumMode::Direct => self.sum_direct(),
                mode => self.sum_context(mode),
            })
            .collect()
    }

    fn sum_context(&self, mode: SumMode) -> Result<SumReport, CliError> {
        let corr_ctx = self
            .corr_ctx
            .as_ref()
            .ok_or_else(|| CliError::InvalidCommandLineArgument {
                option: "metafits".into(),
                expected: format!("a metafits file to sum {}", mode),
                received: "nothing".into(),
            })?;
        let metadata = corr_ctx.metadata();
        let coarse_chan_idxs = &metadata.provided_coarse_chan_indices;
        let num_floats = metadata.num_timestep_coarse_chan_floats;

        let progress = progress_bar(
            (metadata.provided_timestep_indices.len() * coarse_chan_idxs.len()) as u64,
            format!("sum {}", mode),
            self.draw_progress,
        );

        // one partial sum per timestep: (sum, count, reads, gaps)
        let partials = metadata
            .provided_timestep_indices
            .par_iter()
            .map(|&timestep_idx| -> Result<(f64, u64, usize, usize), GpufitsError> {
                let mut buffer = vec![0.0_f32; num_floats];
                let mut partial = (0.0, 0, 0, 0);
                for &coarse_chan_idx in coarse_chan_idxs {
                    let result = match mode {
                        SumMode::ByFrequency => corr_ctx.read_by_frequency_into_buffer(
                            timestep_idx,
                            coarse_chan_idx,
                            &mut buffer,
                        ),
                        _ => corr_ctx.read_by_baseline_into_buffer(
                            timestep_idx,
                            coarse_chan_idx,
                            &mut buffer,
                        ),
                    };
                    progress.inc(1);
                    match result {
                        Ok(()) => {
                            partial.0 += buffer.iter().map(|&v| v as f64).sum::<f64>();
                            partial.1 += buffer.len() as u64;
                            partial.2 += 1;
                        }
                        Err(e) if e.kind() == ErrorKind::MissingDataForIndex => {
                            trace!("{}", e);
                            partial.3 += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(partial)
            })
            .collect::<Result<Vec<_>, _>>()?;
        progress.finish();

        let mut report = SumReport {
            mode,
            sum: 0.0,
            count: 0,
            num_reads: 0,
            num_gaps: 0,
            first_floats: vec![],
        };
        for (sum, count, num_reads, num_gaps) in partials {
            report.sum += sum;
            report.count += count;
            report.num_reads += num_reads;
            report.num_gaps += num_gaps;
        }
        if report.num_gaps > 0 {
            warn!(
                "{} timestep and coarse channel pairs have no data",
                report.num_gaps
            );
        }

        if let Some(n) = self.num_first_floats {
            if let (Some(&t), Some(&c)) = (
                metadata.common_timestep_indices.first(),
                metadata.common_coarse_chan_indices.first(),
            ) {
                let first = match mode {
                    SumMode::ByFrequency => corr_ctx.read_by_frequency(t, c)?,
                    _ => corr_ctx.read_by_baseline(t, c)?,
                };
                report.first_floats = first.into_iter().take(n).collect();
            }
        }
        Ok(report)
    }

    fn sum_direct(&self) -> Result<SumReport, CliError> {
        let (gpubox_files, corr_version) =
            determine_gpubox_batches(&self.gpubox_paths).map_err(GpufitsError::from)?;

        let progress = progress_bar(
            gpubox_files.len() as u64,
            "sum direct".into(),
            self.draw_progress,
        );
        let mut report = SumReport {
            mode: SumMode::Direct,
            sum: 0.0,
            count: 0,
            num_reads: 0,
            num_gaps: 0,
            first_floats: vec![],
        };
        for file in &gpubox_files {
            let (mut fptr, descriptor) =
                read_gpubox_descriptor(file, corr_version).map_err(GpufitsError::from)?;
            let mut file_sum = 0.0;
            for gpubox_hdu in &descriptor.hdus {
                let hdu = fits_open_hdu!(&mut fptr, gpubox_hdu.hdu_index)
                    .map_err(|e| GpufitsError::from(GpuboxError::Fits(e)))?;
                let mut buffer = vec![0.0_f32; gpubox_hdu.naxis1 * gpubox_hdu.naxis2];
                get_fits_float_image_into_buffer!(&mut fptr, &hdu, &mut buffer)
                    .map_err(|e| GpufitsError::from(GpuboxError::Fits(e)))?;

                if report.num_reads == 0 {
                    if let Some(n) = self.num_first_floats {
                        report.first_floats = buffer.iter().copied().take(n).collect();
                    }
                }
                file_sum += buffer.iter().map(|&v| v as f64).sum::<f64>();
                report.count += buffer.len() as u64;
                report.num_reads += 1;
            }
            debug!("{} sums to {}", file.filename.display(), file_sum);
            report.sum += file_sum;
            progress.inc(1);
        }
        progress.finish();
        Ok(report)
    }
}
