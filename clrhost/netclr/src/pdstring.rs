//! Platform-dependent native strings ("pdchar" in hostfxr headers).
//!
//! hostfxr and nethost take UTF-16 strings on Windows and UTF-8 everywhere
//! else. [`NativeEncoding`] captures one such encoding; [`PlatformEncoding`]
//! is the one the hosting libraries of this process expect.

use std::ffi::{c_char, OsStr};
use std::path::PathBuf;

use crate::platform::CharWidth;
use crate::NetClrError;

pub trait NativeEncoding {
    type Char: Copy + Eq + 'static;

    const WIDTH: CharWidth;
    const NUL: Self::Char;

    /// Encodes `s` without a terminator.
    fn encode(s: &str) -> Vec<Self::Char>;

    /// Decodes units without a terminator. Invalid sequences are replaced.
    fn decode(units: &[Self::Char]) -> String;
}

pub struct Utf8;

impl NativeEncoding for Utf8 {
    type Char = c_char;

    const WIDTH: CharWidth = CharWidth::Utf8;
    const NUL: c_char = 0;

    fn encode(s: &str) -> Vec<c_char> {
        s.bytes().map(|b| b as c_char).collect()
    }

    fn decode(units: &[c_char]) -> String {
        let bytes: Vec<u8> = units.iter().map(|&c| c as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

pub struct Utf16;

impl NativeEncoding for Utf16 {
    type Char = u16;

    const WIDTH: CharWidth = CharWidth::Utf16;
    const NUL: u16 = 0;

    fn encode(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn decode(units: &[u16]) -> String {
        String::from_utf16_lossy(units)
    }
}

#[cfg(windows)]
pub type PlatformEncoding = Utf16;
#[cfg(not(windows))]
pub type PlatformEncoding = Utf8;

pub type PdChar = <PlatformEncoding as NativeEncoding>::Char;

/// Owned, null-terminated native string.
#[derive(Clone, PartialEq, Eq)]
pub struct PdCString {
    units: Vec<PdChar>,
}

impl PdCString {
    fn from_units(mut units: Vec<PdChar>, what: &str) -> Result<Self, NetClrError> {
        if let Some(position) = units.iter().position(|&c| c == PlatformEncoding::NUL) {
            return Err(NetClrError::InteriorNul {
                what: what.to_string(),
                position,
            });
        }
        units.push(PlatformEncoding::NUL);
        Ok(Self { units })
    }

    pub fn new(s: &str) -> Result<Self, NetClrError> {
        Self::from_units(PlatformEncoding::encode(s), s)
    }

    /// Encodes an OS string losslessly (wide on Windows, raw bytes elsewhere).
    pub fn from_os_str(s: impl AsRef<OsStr>) -> Result<Self, NetClrError> {
        let s = s.as_ref();
        #[cfg(windows)]
        let units = {
            use std::os::windows::ffi::OsStrExt;
            s.encode_wide().collect()
        };
        #[cfg(unix)]
        let units = {
            use std::os::unix::ffi::OsStrExt;
            s.as_bytes().iter().map(|&b| b as c_char).collect()
        };
        Self::from_units(units, &s.to_string_lossy())
    }

    pub fn as_ptr(&self) -> *const PdChar {
        self.units.as_ptr()
    }

    /// Units without the terminator.
    pub fn as_units(&self) -> &[PdChar] {
        &self.units[..self.units.len() - 1]
    }
}

impl std::fmt::Debug for PdCString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", PlatformEncoding::decode(self.as_units()))
    }
}

/// Units of a null-terminated string, terminator excluded.
///
/// # Safety
/// `ptr` must be non-null and point to a null-terminated string that stays
/// valid for `'a`.
pub unsafe fn units_from_ptr<'a>(ptr: *const PdChar) -> &'a [PdChar] {
    let mut len = 0;
    while *ptr.add(len) != PlatformEncoding::NUL {
        len += 1;
    }
    std::slice::from_raw_parts(ptr, len)
}

/// Decodes a null-terminated native string. A null pointer decodes to "".
///
/// # Safety
/// See [`units_from_ptr`].
pub unsafe fn decode_ptr(ptr: *const PdChar) -> String {
    if ptr.is_null() {
        return String::new();
    }
    PlatformEncoding::decode(units_from_ptr(ptr))
}

/// Decodes the null-terminated prefix of `buffer` as a path.
pub fn path_from_buffer(buffer: &[PdChar]) -> PathBuf {
    let len = buffer
        .iter()
        .position(|&c| c == PlatformEncoding::NUL)
        .unwrap_or(buffer.len());
    let units = &buffer[..len];
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_wide(units))
    }
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        let bytes: Vec<u8> = units.iter().map(|&c| c as u8).collect();
        PathBuf::from(OsStr::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_encodes_surrogate_pairs() {
        let units = Utf16::encode("a\u{1F600}");
        assert_eq!(units.len(), 3);
        assert_eq!(Utf16::decode(&units), "a\u{1F600}");
    }

    #[test]
    fn utf8_encodes_bytes() {
        let units = Utf8::encode("né");
        assert_eq!(units.len(), 3);
        assert_eq!(Utf8::decode(&units), "né");
    }

    #[test]
    fn pdcstring_is_null_terminated() {
        let s = PdCString::new("TFM").unwrap();
        assert_eq!(s.as_units().len(), 3);
        let decoded = unsafe { decode_ptr(s.as_ptr()) };
        assert_eq!(decoded, "TFM");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = PdCString::new("bad\0name").unwrap_err();
        assert!(matches!(err, NetClrError::InteriorNul { position: 3, .. }));
    }

    #[test]
    fn null_pointer_decodes_empty() {
        assert_eq!(unsafe { decode_ptr(std::ptr::null()) }, "");
    }

    #[test]
    fn path_buffer_stops_at_terminator() {
        let mut buffer = vec![PlatformEncoding::NUL; 16];
        let encoded = PlatformEncoding::encode("/usr/lib");
        buffer[..encoded.len()].copy_from_slice(&encoded);
        assert_eq!(path_from_buffer(&buffer), PathBuf::from("/usr/lib"));
    }
}
