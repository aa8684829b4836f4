use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure conditions surfaced by the profiler. Every fatal path ends up as
/// one of these, rendered as a single-line diagnostic on stderr.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Usage(String),

    #[error("permission denied attaching to process {0} (check kernel.yama.ptrace_scope)")]
    PermissionDenied(i32),

    #[error("no such process: {0}")]
    NoSuchProcess(i32),

    #[error("process {pid} is already traced by process {tracer}")]
    AlreadyTraced { pid: i32, tracer: i32 },

    #[error("unsupported interpreter: {0}")]
    UnsupportedInterpreter(String),

    #[error("interpreter in process {0} has not initialized threading yet")]
    InterpreterNotReady(i32),

    #[error("failed to read {len} bytes at {addr:#x}: {errno}")]
    ReadFault {
        addr: u64,
        len: usize,
        errno: nix::Error,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{soname} is not mapped in process {pid}")]
    NotMapped { pid: i32, soname: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
