use crate::error::{Error, Result};
use crate::interp::{Layout, Version};
use crate::maps::{self, Mapping};
use crate::namespace::Namespace;
use crate::ptrace::TracedProcess;
use log::{debug, info};
use object::{Object, ObjectKind, ObjectSymbol};
use std::fs;
use std::path::PathBuf;

/// The interpreter's global pointing at the running thread state. Present in
/// CPython up to 3.6; later releases folded it into the runtime struct.
pub const THREAD_STATE_SYMBOL: &str = "_PyThreadState_Current";

/// Everything the frame walker needs about the target interpreter, computed
/// once at startup and immutable for the rest of the run.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    pub version: Version,
    pub layout: Layout,
    /// Remote address of the current thread-state struct.
    pub tstate_addr: u64,
}

impl Interpreter {
    /// Locate the interpreter's thread state inside an attached target.
    ///
    /// Walks the target's memory map to pick the image holding the
    /// interpreter globals (the libpython shared object when present, the
    /// main executable otherwise), looks the symbol up in that image's ELF
    /// tables, rebases it, and dereferences it once through the stopped
    /// target.
    pub fn locate(tracee: &TracedProcess, ns: &Namespace) -> Result<Interpreter> {
        let pid = tracee.pid();
        let mappings = maps::read_maps(pid)?;
        let image = choose_image(pid, &mappings, ns)?;
        debug!(
            "interpreter image {} loaded at {:#x}",
            image.path.display(),
            image.base
        );

        let file = fs::File::open(&image.path)?;
        let data = unsafe { memmap2::Mmap::map(&file)? };
        let object = object::File::parse(&*data).map_err(|err| {
            Error::UnsupportedInterpreter(format!(
                "{}: not a readable ELF image: {}",
                image.path.display(),
                err
            ))
        })?;

        let symbol = find_symbol(&object, THREAD_STATE_SYMBOL).ok_or_else(|| {
            Error::UnsupportedInterpreter(format!(
                "{} has no {} symbol",
                image.path.display(),
                THREAD_STATE_SYMBOL
            ))
        })?;
        // Fixed-position executables carry absolute symbol addresses; shared
        // objects and PIE executables are rebased by the loader.
        let runtime_addr = match object.kind() {
            ObjectKind::Executable => symbol,
            _ => image.base + symbol,
        };

        let tstate_addr = tracee.peek_word(runtime_addr)?;
        if tstate_addr == 0 {
            return Err(Error::InterpreterNotReady(pid));
        }

        let version = detect_version(&image, &object)?;
        let layout = Layout::for_version(version)?;
        info!(
            "pid {} runs Python {}, thread state at {:#x}",
            pid, version, tstate_addr
        );
        Ok(Interpreter {
            version,
            layout,
            tstate_addr,
        })
    }
}

struct InterpreterImage {
    path: PathBuf,
    /// Basename as it appears in the target's maps.
    name: String,
    base: u64,
}

fn choose_image(pid: i32, mappings: &[Mapping], ns: &Namespace) -> Result<InterpreterImage> {
    // A dynamically linked interpreter keeps its globals in libpython; a
    // statically linked one keeps them in the executable itself.
    if let Some(lib) = mappings
        .iter()
        .find(|m| m.basename().starts_with("libpython"))
    {
        let name = lib.basename().to_string();
        let path = ns.lib_path(&name)?;
        let base = maps::load_base(mappings, &lib.pathname).ok_or_else(|| {
            Error::Decode(format!("no load base for {} in pid {}", lib.pathname, pid))
        })?;
        return Ok(InterpreterImage { path, name, base });
    }

    let path = ns.exe_path()?;
    let exe = fs::read_link(format!("/proc/{}/exe", pid))?;
    let exe = exe.to_string_lossy();
    let mapping = mappings
        .iter()
        .find(|m| m.pathname == exe)
        .ok_or_else(|| Error::Decode(format!("executable {} not in maps of pid {}", exe, pid)))?;
    let name = mapping.basename().to_string();
    let base = maps::load_base(mappings, &mapping.pathname)
        .ok_or_else(|| Error::Decode(format!("no load base for {} in pid {}", exe, pid)))?;
    Ok(InterpreterImage { path, name, base })
}

/// Symbol value, preferring the dynamic table and falling back to the full
/// table for images that do not export it.
fn find_symbol(object: &object::File, name: &str) -> Option<u64> {
    object
        .dynamic_symbols()
        .chain(object.symbols())
        .find(|sym| sym.name().map_or(false, |n| n == name))
        .map(|sym| sym.address())
}

/// Interpreter version, preferably from the image name. When the name does
/// not pin a minor version, the symbol table still distinguishes the major:
/// only 2.x exports the str-object constructors. A bare "python3" with no
/// recoverable minor version is refused rather than guessed, since the 3.x
/// line-table convention changed mid-series.
fn detect_version(image: &InterpreterImage, object: &object::File) -> Result<Version> {
    if let Some(version) = Version::from_image_name(&image.name) {
        return Ok(version);
    }
    let has_symbol = |name: &str| find_symbol(object, name).is_some();
    if has_symbol("PyString_FromString") {
        // The 2.x series ended at 2.7 and shares one layout with 2.6.
        return Ok(Version { major: 2, minor: 7 });
    }
    if has_symbol("PyBytes_FromString") {
        return Err(Error::UnsupportedInterpreter(format!(
            "{}: Python 3 with undetectable minor version",
            image.name
        )));
    }
    Err(Error::UnsupportedInterpreter(format!(
        "{}: not a recognizable CPython image",
        image.name
    )))
}
