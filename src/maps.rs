use crate::error::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One file-backed region of the target's address space, as listed in
/// /proc/<pid>/maps.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub pathname: String,
}

impl Mapping {
    /// Final component of the backing file's path.
    pub fn basename(&self) -> &str {
        Path::new(&self.pathname)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.pathname)
    }
}

/// All file-backed mappings of the target, in kernel order. Anonymous
/// mappings carry no pathname and are skipped.
pub fn read_maps(pid: i32) -> Result<Vec<Mapping>> {
    let file = File::open(format!("/proc/{}/maps", pid))?;
    let reader = BufReader::new(file);

    let mut mappings = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(mapping) = parse_map_line(&line) {
            mappings.push(mapping);
        }
    }
    Ok(mappings)
}

/// Runtime load base of the image backed by `pathname`.
///
/// The mapping with file offset zero covers the image's ELF header; its start
/// is what the loader added to every virtual address. Position-independent
/// images get a randomized base, so this must come from the map, never be
/// assumed zero.
pub fn load_base(mappings: &[Mapping], pathname: &str) -> Option<u64> {
    let image: Vec<&Mapping> = mappings
        .iter()
        .filter(|m| m.pathname == pathname)
        .collect();
    if let Some(head) = image.iter().find(|m| m.offset == 0) {
        return Some(head.start);
    }
    image.iter().map(|m| m.start.saturating_sub(m.offset)).min()
}

// Each line reads: range perms offset dev inode pathname, e.g.
//   55e8c0000000-55e8c0021000 r-xp 00002000 08:01 400200  /usr/bin/python2.7
fn parse_map_line(line: &str) -> Option<Mapping> {
    let mut fields = line.split_whitespace();
    let (start, end) = fields.next()?.split_once('-')?;
    let perms = fields.next()?;
    let offset = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    // The pathname may itself contain spaces; anonymous regions have none
    // and cannot hold the interpreter image, so they are dropped here.
    let pathname = fields.collect::<Vec<&str>>().join(" ");
    if pathname.is_empty() {
        return None;
    }

    Some(Mapping {
        start: u64::from_str_radix(start, 16).ok()?,
        end: u64::from_str_radix(end, 16).ok()?,
        perms: perms.to_string(),
        offset: u64::from_str_radix(offset, 16).ok()?,
        pathname,
    })
}
