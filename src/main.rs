use anyhow::Result;
use pyflame::aggregator::{Aggregator, Mode};
use pyflame::{cli, report, sampler::Sampler};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::io::{self, Write};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn setup_term_flag() -> Result<Arc<AtomicBool>, anyhow::Error> {
    let term = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&term))?;
    flag::register(SIGTERM, Arc::clone(&term))?;
    Ok(term)
}

fn main() {
    env_logger::init();
    let args = cli::parse();

    let mode = if args.seconds == 0.0 {
        Mode::Single
    } else if args.timestamp {
        Mode::Trace
    } else {
        Mode::Histogram
    };
    let mut agg = Aggregator::new(mode, !args.exclude_idle, args.timestamp);

    let term = match setup_term_flag() {
        Ok(term) => term,
        Err(err) => {
            eprintln!("pyflame: {err}");
            process::exit(1);
        }
    };

    let sampler = Sampler::new(args.pid, args.seconds, args.rate);
    if let Err(err) = sampler.run(|sample| agg.record(sample), &term) {
        eprintln!("pyflame: {err}");
        process::exit(1);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = report::write_report(&agg, &mut out).and_then(|()| out.flush()) {
        eprintln!("pyflame: {err}");
        process::exit(1);
    }
}
