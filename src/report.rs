use crate::aggregator::{Aggregator, Mode};
use crate::types::Stack;
use std::io::{self, Write};

/// Write the run's report to `out`.
///
/// Histogram lines are `outer;...;inner count`, preceded by `(idle) N` when
/// idle samples were counted. Trace mode prints each sample's timestamp (in
/// microseconds since the Unix epoch) on its own line followed by the folded
/// stack, or `(idle)` for an empty one. Single mode prints one stack block,
/// one frame per line, outermost first.
pub fn write_report<W: Write>(agg: &Aggregator, out: &mut W) -> io::Result<()> {
    match agg.mode() {
        Mode::Histogram => write_histogram(agg, out),
        Mode::Trace => write_trace(agg, out),
        Mode::Single => write_single(agg, out),
    }
}

fn write_histogram<W: Write>(agg: &Aggregator, out: &mut W) -> io::Result<()> {
    if agg.idle() > 0 {
        writeln!(out, "(idle) {}", agg.idle())?;
    }
    for (stack, count) in agg.buckets() {
        writeln!(out, "{} {}", collapse(stack), count)?;
    }
    Ok(())
}

fn write_trace<W: Write>(agg: &Aggregator, out: &mut W) -> io::Result<()> {
    for sample in agg.samples() {
        writeln!(out, "{}", sample.timestamp_us)?;
        if sample.stack.is_empty() {
            writeln!(out, "(idle)")?;
        } else {
            writeln!(out, "{}", collapse(&sample.stack))?;
        }
    }
    Ok(())
}

fn write_single<W: Write>(agg: &Aggregator, out: &mut W) -> io::Result<()> {
    for sample in agg.samples() {
        if agg.timestamps() {
            writeln!(out, "{}", sample.timestamp_us)?;
        }
        if sample.stack.is_empty() {
            writeln!(out, "(idle)")?;
        } else {
            for frame in sample.stack.iter().rev() {
                writeln!(out, "{}", frame)?;
            }
        }
    }
    Ok(())
}

/// Fold a stack into one line, outermost frame to innermost.
fn collapse(stack: &Stack) -> String {
    let rendered: Vec<String> = stack.iter().rev().map(|frame| frame.to_string()).collect();
    rendered.join(";")
}
