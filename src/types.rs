use std::fmt;

/// One decoded interpreter frame. All fields are owned values; nothing here
/// refers back into the target's address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub filename: String,
    pub name: String,
    /// Source line, or 0 when the line could not be determined.
    pub line: u32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.name, self.line)
    }
}

/// A captured call stack, innermost frame first. Empty means the interpreter
/// was idle at the instant of the sample.
pub type Stack = Vec<Frame>;

#[derive(Debug, Clone)]
pub struct Sample {
    /// Microseconds since the Unix epoch.
    pub timestamp_us: u64,
    pub stack: Stack,
}
