use crate::types::{Sample, Stack};
use std::collections::HashMap;

/// What the run produces on stdout, decided once before sampling starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Identical stacks folded into counts, flame-graph style.
    Histogram,
    /// Every sample kept with its timestamp, in capture order.
    Trace,
    /// One sample printed as a plain stack block.
    Single,
}

/// Collects samples for one run.
///
/// Histogram mode folds stacks into a bucket map and counts idle samples
/// separately; trace and single modes keep samples verbatim.
pub struct Aggregator {
    mode: Mode,
    include_idle: bool,
    timestamps: bool,
    buckets: HashMap<Stack, u64>,
    idle: u64,
    samples: Vec<Sample>,
}

impl Aggregator {
    pub fn new(mode: Mode, include_idle: bool, timestamps: bool) -> Aggregator {
        Aggregator {
            mode,
            include_idle,
            timestamps,
            buckets: HashMap::new(),
            idle: 0,
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, sample: Sample) {
        match self.mode {
            Mode::Histogram => {
                if sample.stack.is_empty() {
                    if self.include_idle {
                        self.idle += 1;
                    }
                } else {
                    *self.buckets.entry(sample.stack).or_insert(0) += 1;
                }
            }
            Mode::Trace | Mode::Single => self.samples.push(sample),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn buckets(&self) -> &HashMap<Stack, u64> {
        &self.buckets
    }

    pub fn idle(&self) -> u64 {
        self.idle
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}
