use crate::error::{Error, Result};
use crate::interp::Layout;
use crate::ptrace::TracedProcess;
use crate::types::{Frame, Stack};
use std::collections::HashMap;

/// Upper bound on the f_back chain. A healthy interpreter stack is far
/// shallower; hitting this means the chain is corrupt or cyclic.
const MAX_FRAMES: usize = 4096;

/// Longest function name or filename worth copying out of the target.
const MAX_STRING: usize = 4096;

/// Longest plausible packed line table. co_lnotab grows two bytes per
/// bytecode line boundary, so even generated modules stay far below this.
const MAX_LNOTAB: usize = 1 << 20;

/// Decoded code object, cached per remote address for the whole run. Code
/// objects are immutable in the target, so entries never go stale within a
/// process lifetime.
#[derive(Debug, Clone)]
struct CodeInfo {
    name: String,
    filename: String,
    first_line: i32,
    lnotab: Vec<u8>,
}

/// Walks the frame list of a stopped target and decodes each frame into an
/// owned record.
pub struct FrameDecoder {
    layout: Layout,
    cache: HashMap<u64, CodeInfo>,
}

impl FrameDecoder {
    pub fn new(layout: Layout) -> FrameDecoder {
        FrameDecoder {
            layout,
            cache: HashMap::new(),
        }
    }

    /// Remote address of the currently executing frame, or zero when the
    /// thread is idle.
    pub fn current_frame(&self, tracee: &TracedProcess, tstate_addr: u64) -> Result<u64> {
        tracee.peek_word(tstate_addr + self.layout.tstate_frame)
    }

    /// Capture the stack starting at `frame_addr`, innermost frame first.
    /// Frames with no code object are skipped.
    pub fn walk(&mut self, tracee: &TracedProcess, frame_addr: u64) -> Result<Stack> {
        let mut stack = Stack::new();
        let mut addr = frame_addr;
        while addr != 0 {
            if stack.len() >= MAX_FRAMES {
                return Err(Error::Decode(format!(
                    "frame chain at {:#x} exceeds {} frames",
                    frame_addr, MAX_FRAMES
                )));
            }
            let code_addr = tracee.peek_word(addr + self.layout.frame_code)?;
            let lasti = tracee.peek_i32(addr + self.layout.frame_lasti)?;
            let back = tracee.peek_word(addr + self.layout.frame_back)?;
            if code_addr != 0 {
                let code = self.code_info(tracee, code_addr)?;
                let line = translate_line(
                    &code.lnotab,
                    code.first_line,
                    lasti,
                    self.layout.signed_line_deltas,
                );
                stack.push(Frame {
                    filename: code.filename,
                    name: code.name,
                    line,
                });
            }
            addr = back;
        }
        Ok(stack)
    }

    fn code_info(&mut self, tracee: &TracedProcess, code_addr: u64) -> Result<CodeInfo> {
        if let Some(info) = self.cache.get(&code_addr) {
            return Ok(info.clone());
        }
        let info = self.decode_code(tracee, code_addr)?;
        self.cache.insert(code_addr, info.clone());
        Ok(info)
    }

    fn decode_code(&self, tracee: &TracedProcess, code_addr: u64) -> Result<CodeInfo> {
        let layout = &self.layout;
        let name_addr = tracee.peek_word(code_addr + layout.code_name)?;
        let filename_addr = tracee.peek_word(code_addr + layout.code_filename)?;
        let first_line = tracee.peek_i32(code_addr + layout.code_firstlineno)?;
        let name = sanitize(tracee.peek_string(name_addr + layout.text_data, MAX_STRING)?);
        let filename = sanitize(tracee.peek_string(filename_addr + layout.text_data, MAX_STRING)?);
        let lnotab = self.read_lnotab(tracee, code_addr)?;
        Ok(CodeInfo {
            name,
            filename,
            first_line,
            lnotab,
        })
    }

    fn read_lnotab(&self, tracee: &TracedProcess, code_addr: u64) -> Result<Vec<u8>> {
        let layout = &self.layout;
        let lnotab_addr = tracee.peek_word(code_addr + layout.code_lnotab)?;
        if lnotab_addr == 0 {
            return Ok(Vec::new());
        }
        let size = tracee.peek_word(lnotab_addr + layout.bytes_size)? as i64;
        if size < 0 || size as usize > MAX_LNOTAB {
            return Err(Error::Decode(format!(
                "implausible line table size {} in code object {:#x}",
                size, code_addr
            )));
        }
        tracee.peek_bytes(lnotab_addr + layout.bytes_data, size as usize)
    }
}

/// Map a bytecode offset to a source line via the packed line table.
///
/// The table is a sequence of (byte_delta, line_delta) pairs. The cursor
/// starts at bytecode 0 on the code object's first line; each pair first
/// advances the bytecode, and once that moves strictly past the target
/// offset the current line stands without this pair's line delta. Line
/// deltas are unsigned before 3.6 and signed two's-complement after, which
/// is why the interpreter version gates `signed_deltas`.
///
/// A negative offset (frame not yet executing) or an empty table yields 0,
/// the unknown-line marker.
pub fn translate_line(lnotab: &[u8], first_line: i32, offset: i32, signed_deltas: bool) -> u32 {
    if offset < 0 || lnotab.is_empty() {
        return 0;
    }
    let mut line = i64::from(first_line);
    let mut addr = 0i64;
    for pair in lnotab.chunks_exact(2) {
        addr += i64::from(pair[0]);
        if addr > i64::from(offset) {
            break;
        }
        line += if signed_deltas {
            i64::from(pair[1] as i8)
        } else {
            i64::from(pair[1])
        };
    }
    line.max(0) as u32
}

/// The emitter joins frames with ';', so the separator may not appear inside
/// a component.
fn sanitize(s: String) -> String {
    if s.contains(';') {
        s.replace(';', ":")
    } else {
        s
    }
}
