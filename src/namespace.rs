use crate::error::{Error, Result};
use crate::maps;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves paths inside the target's mount namespace.
///
/// A containerized target sees different files than the profiler does. The
/// kernel exposes the target's view under /proc/<pid>/root, so any path taken
/// from the target (its executable, its loaded libraries) is re-rooted there
/// when that view is accessible.
pub struct Namespace {
    pid: i32,
}

impl Namespace {
    pub fn new(pid: i32) -> Namespace {
        Namespace { pid }
    }

    /// Path to the target's main executable, openable by the profiler.
    pub fn exe_path(&self) -> Result<PathBuf> {
        let exe = fs::read_link(format!("/proc/{}/exe", self.pid))?;
        Ok(self.resolve(&exe))
    }

    /// Path to a shared object loaded by the target, by basename. Consults
    /// the target's maps, so the library must actually be mapped.
    pub fn lib_path(&self, soname: &str) -> Result<PathBuf> {
        let mappings = maps::read_maps(self.pid)?;
        for mapping in &mappings {
            if mapping.basename().starts_with(soname) {
                return Ok(self.resolve(Path::new(&mapping.pathname)));
            }
        }
        Err(Error::NotMapped {
            pid: self.pid,
            soname: soname.to_string(),
        })
    }

    /// Re-root `path` under the target's filesystem view when possible.
    /// Falls back to the raw path if /proc/<pid>/root is not traversable
    /// (same namespace, or insufficient privilege).
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let rooted = PathBuf::from(format!("/proc/{}/root", self.pid))
            .join(path.strip_prefix("/").unwrap_or(path));
        if rooted.exists() {
            rooted
        } else {
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exe_path_of_self_is_openable() {
        let ns = Namespace::new(std::process::id() as i32);
        let exe = ns.exe_path().unwrap();
        assert!(exe.exists());
    }

    #[test]
    fn lib_path_of_unmapped_soname_errors() {
        let ns = Namespace::new(std::process::id() as i32);
        let err = ns.lib_path("libdefinitely-not-mapped.so").unwrap_err();
        match err {
            Error::NotMapped { soname, .. } => {
                assert_eq!(soname, "libdefinitely-not-mapped.so");
            }
            other => panic!("expected NotMapped, got {:?}", other),
        }
    }
}
