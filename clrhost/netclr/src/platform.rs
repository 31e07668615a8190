//! Platform facts resolved at compile time: runtime identifier, native
//! library file names, string width and the calling convention used by
//! runtime-provided delegates.

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(not(any(
    all(windows, any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")),
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_os = "macos", any(target_arch = "x86_64", target_arch = "aarch64")),
)))]
compile_error!("netclr: no .NET hosting libraries are published for this OS/architecture");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    Windows,
    Linux,
    MacOs,
}

/// Width of one native character as seen by the hosting libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharWidth {
    /// Null-terminated UTF-8 bytes.
    Utf8,
    /// Null-terminated UTF-16 code units.
    Utf16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallingConvention {
    Cdecl,
    Stdcall,
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::Cdecl => f.write_str("cdecl"),
            CallingConvention::Stdcall => f.write_str("stdcall"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub os: OsKind,
    /// Runtime identifier, also the name of the directory holding the locator library.
    pub rid: &'static str,
    pub char_width: CharWidth,
    /// Convention of delegates handed out by the runtime. hostfxr's own
    /// exports are always cdecl; delegates follow `extern "system"`.
    pub delegate_convention: CallingConvention,
    pub nethost_library: &'static str,
    pub hostfxr_library: &'static str,
}

impl PlatformProfile {
    /// Path of the locator library below `install_root`.
    pub fn nethost_path(&self, install_root: &Path) -> PathBuf {
        install_root.join(self.rid).join(self.nethost_library)
    }
}

const OS: OsKind = if cfg!(windows) {
    OsKind::Windows
} else if cfg!(target_os = "macos") {
    OsKind::MacOs
} else {
    OsKind::Linux
};

const RID: &str = if cfg!(windows) {
    if cfg!(target_arch = "x86") {
        "win-x86"
    } else if cfg!(target_arch = "aarch64") {
        "win-arm64"
    } else {
        "win-x64"
    }
} else if cfg!(target_os = "macos") {
    if cfg!(target_arch = "aarch64") {
        "osx-arm64"
    } else {
        "osx-x64"
    }
} else if cfg!(target_arch = "aarch64") {
    "linux-arm64"
} else {
    "linux-x64"
};

const CURRENT: PlatformProfile = PlatformProfile {
    os: OS,
    rid: RID,
    char_width: if cfg!(windows) { CharWidth::Utf16 } else { CharWidth::Utf8 },
    delegate_convention: if cfg!(all(windows, target_arch = "x86")) {
        CallingConvention::Stdcall
    } else {
        CallingConvention::Cdecl
    },
    nethost_library: match OS {
        OsKind::Windows => "nethost.dll",
        OsKind::Linux => "libnethost.so",
        OsKind::MacOs => "libnethost.dylib",
    },
    hostfxr_library: match OS {
        OsKind::Windows => "hostfxr.dll",
        OsKind::Linux => "libhostfxr.so",
        OsKind::MacOs => "libhostfxr.dylib",
    },
};

/// The profile of the running process. Never changes for the process lifetime.
pub fn current() -> &'static PlatformProfile {
    &CURRENT
}
