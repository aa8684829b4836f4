use crate::error::{Error, Result};
use crate::frame::FrameDecoder;
use crate::namespace::Namespace;
use crate::ptrace::TracedProcess;
use crate::tstate::Interpreter;
use crate::types::Sample;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Drives the attach, read, detach, sleep cycle against one target.
///
/// The target is stopped only for the read phase of each sample; it runs
/// freely during the inter-sample sleep. A `seconds` of zero takes exactly
/// one sample.
pub struct Sampler {
    pid: i32,
    seconds: f64,
    rate: f64,
}

impl Sampler {
    pub fn new(pid: i32, seconds: f64, rate: f64) -> Sampler {
        Sampler { pid, seconds, rate }
    }

    /// Run the sampling loop, feeding every captured sample to `sink`.
    ///
    /// `stop` is polled at iteration boundaries; raising it ends the run
    /// early with the target detached. Samples that hit an unmapped page
    /// mid-walk are logged and dropped rather than partially emitted; every
    /// other failure aborts the run.
    pub fn run<F>(&self, mut sink: F, stop: &AtomicBool) -> Result<()>
    where
        F: FnMut(Sample),
    {
        let interval = Duration::from_micros((self.rate * 1e6).round() as u64);
        let started = Instant::now();
        let deadline = started + Duration::from_micros((self.seconds * 1e6).round() as u64);
        // Timestamps combine the wall clock captured once with the monotonic
        // clock, so a stepped system clock cannot reorder the trace.
        let epoch_base = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| Error::Decode(format!("system clock before Unix epoch: {}", err)))?
            .as_micros() as u64;

        let ns = Namespace::new(self.pid);
        let mut tracee = TracedProcess::attach(self.pid)?;
        let interp = Interpreter::locate(&tracee, &ns)?;
        let mut decoder = FrameDecoder::new(interp.layout);

        let mut taken = 0u64;
        loop {
            let timestamp_us = epoch_base + started.elapsed().as_micros() as u64;
            // Losing the thread state itself is fatal; losing a page during
            // the walk only costs this sample.
            let frame_addr = decoder.current_frame(&tracee, interp.tstate_addr)?;
            let stack = if frame_addr == 0 {
                Ok(Vec::new())
            } else {
                decoder.walk(&tracee, frame_addr)
            };
            match stack {
                Ok(stack) => {
                    taken += 1;
                    sink(Sample {
                        timestamp_us,
                        stack,
                    });
                }
                Err(err @ Error::ReadFault { .. }) => {
                    warn!("discarding sample: {}", err);
                }
                Err(err) => return Err(err),
            }

            if self.seconds == 0.0 || stop.load(Ordering::Relaxed) {
                break;
            }
            if Instant::now() + interval >= deadline {
                break;
            }

            tracee.detach()?;
            thread::sleep(interval);
            tracee = TracedProcess::attach(self.pid)?;
        }
        tracee.detach()?;
        debug!("took {} samples from pid {}", taken, self.pid);
        Ok(())
    }
}
