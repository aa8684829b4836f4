use crate::error::{Error, Result};
use std::fmt;

/// Interpreter release the target is running. Only major.minor matters for
/// struct layout and line-table decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// Parse a version out of an image name such as `libpython2.7.so.1.0`,
    /// `libpython3.6m.so.1.0` or `python3.6`. Returns None when no
    /// major.minor pair follows the word "python".
    pub fn from_image_name(name: &str) -> Option<Version> {
        let idx = name.find("python")?;
        let rest = &name[idx + "python".len()..];
        let mut parts = rest.splitn(2, '.');
        let major: u8 = leading_number(parts.next()?)?;
        let minor: u8 = leading_number(parts.next()?)?;
        Some(Version { major, minor })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn leading_number(s: &str) -> Option<u8> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Byte offsets into the target interpreter's structs, on x86-64. The
/// interpreter is not debuggable cooperatively, so these mirror the C struct
/// layouts of each supported release.
///
/// Strings come in two shapes: 2.x str objects and 3.x bytes objects keep
/// their payload inline after the header (`bytes_data`); 3.x name and
/// filename strings are compact ASCII unicode objects with the payload at
/// `text_data`.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub tstate_next: u64,
    pub tstate_frame: u64,
    pub frame_back: u64,
    pub frame_code: u64,
    pub frame_lasti: u64,
    pub code_filename: u64,
    pub code_name: u64,
    pub code_firstlineno: u64,
    pub code_lnotab: u64,
    /// Inline payload offset for name/filename string objects.
    pub text_data: u64,
    /// ob_size offset shared by 2.x str and 3.x bytes objects.
    pub bytes_size: u64,
    /// Inline payload offset for the line-table bytes object.
    pub bytes_data: u64,
    /// Line deltas are signed two's-complement from 3.6 on.
    pub signed_line_deltas: bool,
}

impl Layout {
    pub fn for_version(version: Version) -> Result<Layout> {
        match (version.major, version.minor) {
            (2, 6) | (2, 7) => Ok(Layout {
                tstate_next: 0,
                tstate_frame: 16,
                frame_back: 24,
                frame_code: 32,
                frame_lasti: 120,
                code_filename: 80,
                code_name: 88,
                code_firstlineno: 96,
                code_lnotab: 104,
                text_data: 36,
                bytes_size: 16,
                bytes_data: 36,
                signed_line_deltas: false,
            }),
            (3, 3) => Ok(Layout {
                tstate_next: 0,
                tstate_frame: 16,
                ..LAYOUT_PY3_COMMON
            }),
            (3, 4) | (3, 5) => Ok(LAYOUT_PY3_COMMON),
            (3, 6) => Ok(Layout {
                code_firstlineno: 36,
                code_lnotab: 112,
                signed_line_deltas: true,
                ..LAYOUT_PY3_COMMON
            }),
            _ => Err(Error::UnsupportedInterpreter(format!(
                "Python {} (supported: 2.6-2.7, 3.3-3.6)",
                version
            ))),
        }
    }
}

// 3.4/3.5 shape. 3.4 put a prev pointer at the head of the thread state, and
// 3.6 reshuffled the leading code-object fields; both deviations are patched
// in above.
const LAYOUT_PY3_COMMON: Layout = Layout {
    tstate_next: 8,
    tstate_frame: 24,
    frame_back: 24,
    frame_code: 32,
    frame_lasti: 120,
    code_filename: 96,
    code_name: 104,
    code_firstlineno: 112,
    code_lnotab: 120,
    text_data: 48,
    bytes_size: 16,
    bytes_data: 32,
    signed_line_deltas: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_from_library_names() {
        assert_eq!(
            Version::from_image_name("libpython2.7.so.1.0"),
            Some(Version { major: 2, minor: 7 })
        );
        assert_eq!(
            Version::from_image_name("libpython3.6m.so.1.0"),
            Some(Version { major: 3, minor: 6 })
        );
        assert_eq!(
            Version::from_image_name("python3.4"),
            Some(Version { major: 3, minor: 4 })
        );
    }

    #[test]
    fn version_needs_minor() {
        assert_eq!(Version::from_image_name("python3"), None);
        assert_eq!(Version::from_image_name("python"), None);
        assert_eq!(Version::from_image_name("bash"), None);
    }

    #[test]
    fn py2_layout() {
        let layout = Layout::for_version(Version { major: 2, minor: 7 }).unwrap();
        assert_eq!(layout.tstate_frame, 16);
        assert_eq!(layout.code_lnotab, 104);
        assert_eq!(layout.text_data, layout.bytes_data);
        assert!(!layout.signed_line_deltas);
    }

    #[test]
    fn py36_layout_is_signed_and_reshuffled() {
        let layout = Layout::for_version(Version { major: 3, minor: 6 }).unwrap();
        assert_eq!(layout.tstate_frame, 24);
        assert_eq!(layout.code_firstlineno, 36);
        assert_eq!(layout.code_lnotab, 112);
        assert!(layout.signed_line_deltas);
    }

    #[test]
    fn py33_thread_state_has_no_prev_link() {
        let layout = Layout::for_version(Version { major: 3, minor: 3 }).unwrap();
        assert_eq!(layout.tstate_next, 0);
        assert_eq!(layout.tstate_frame, 16);
        let layout35 = Layout::for_version(Version { major: 3, minor: 5 }).unwrap();
        assert_eq!(layout35.tstate_frame, 24);
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        for version in [
            Version { major: 3, minor: 7 },
            Version { major: 3, minor: 11 },
            Version { major: 4, minor: 0 },
        ] {
            assert!(matches!(
                Layout::for_version(version),
                Err(Error::UnsupportedInterpreter(_))
            ));
        }
    }
}
