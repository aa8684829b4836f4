use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "pyflame",
    version,
    about = "Sampling profiler for running CPython processes",
    disable_version_flag = true
)]
pub struct Args {
    /// Show the version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// How many seconds to run for
    #[arg(short, long, default_value_t = 1.0, value_parser = parse_seconds)]
    pub seconds: f64,

    /// Sample rate, as a fractional value of seconds
    #[arg(short, long, default_value_t = 0.001, value_parser = parse_rate)]
    pub rate: f64,

    /// Exclude idle time from statistics
    #[arg(short = 'x', long = "exclude-idle")]
    pub exclude_idle: bool,

    /// Include timestamps for each stacktrace
    #[arg(short = 't', long = "timestamp")]
    pub timestamp: bool,

    /// Process ID of the interpreter to profile
    pub pid: i32,
}

/// Parse the command line, exiting the process on help, version, or a usage
/// error. Usage errors exit with status 1.
pub fn parse() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            process::exit(code);
        }
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let seconds: f64 = s
        .parse()
        .map_err(|_| format!("`{}` is not a number of seconds", s))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("seconds must be non-negative, got {}", s));
    }
    Ok(seconds)
}

fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s
        .parse()
        .map_err(|_| format!("`{}` is not a number of seconds", s))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("rate must be positive, got {}", s));
    }
    Ok(rate)
}
