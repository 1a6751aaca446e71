use clap::ErrorKind::{DisplayHelp, DisplayVersion};
use gpufits::cli::{CliError::ClapError, SumContext};
use log::{info, trace};
use std::{env, ffi::OsString, fmt::Debug, time::Instant};

#[cfg(test)]
#[path = "../test_common.rs"]
mod test_common;

fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    I: Debug,
{
    let sum_ctx = match SumContext::from_args(args) {
        Ok(sum_ctx) => sum_ctx,
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    let start = Instant::now();
    match sum_ctx.run() {
        Ok(reports) => {
            for report in &reports {
                println!("{}", report);
            }
            info!("total duration: {:?}", start.elapsed());
            0
        }
        Err(e) => {
            eprintln!("error summing visibilities: {e}");
            1
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    trace!("start main");
    let retcode = main_with_args(env::args());
    trace!("end main");
    std::process::exit(retcode);
}
