//! Hosting of the .NET runtime through hostfxr.
//!
//! A [`HostSession`] owns one hostfxr context: it locates and loads the
//! hosting library, initializes the runtime from a `runtimeconfig.json`,
//! exchanges runtime properties and hands out typed function pointers into
//! managed code.

mod delegates;
mod discovery;
mod hosting;
mod marshaling;
pub mod pdstring;
pub mod platform;
mod session;
mod status;

use std::fmt;
use std::path::PathBuf;

pub use delegates::{ComponentEntryPoint, DelegateKind, ManagedFunction, RawDelegate};
pub use discovery::{
    locate_hosting_library, locate_hosting_library_with, nethost_install_root, LocateOptions,
    NETHOST_DIR_ENV,
};
pub use hosting::{Hostfxr, HostfxrApi};
pub use marshaling::{GetHostfxrParams, InitParams};
pub use session::{
    HostSession, PropertyPair, SessionOptions, SessionState, DEFAULT_PROPERTY_CAPACITY,
};
pub use status::StatusCode;

/// Opaque hostfxr context handle (`hostfxr_handle`).
pub type RawContextHandle = *mut std::ffi::c_void;

/// Native call that failed, reported with every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LocateHostfxr,
    InitializeForRuntimeConfig,
    InitializeForCommandLine,
    GetRuntimeProperty,
    SetRuntimeProperty,
    GetRuntimeProperties,
    GetRuntimeDelegate,
    LoadAssemblyAndGetFunctionPointer,
    RunApp,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operation::LocateHostfxr => "hostfxr discovery",
            Operation::InitializeForRuntimeConfig => "runtime initialization from config",
            Operation::InitializeForCommandLine => "runtime initialization from command line",
            Operation::GetRuntimeProperty => "runtime property query",
            Operation::SetRuntimeProperty => "runtime property update",
            Operation::GetRuntimeProperties => "runtime property exchange",
            Operation::GetRuntimeDelegate => "runtime delegate acquisition",
            Operation::LoadAssemblyAndGetFunctionPointer => {
                "assembly load and function pointer resolution"
            }
            Operation::RunApp => "application run",
            Operation::Close => "context close",
        };
        f.write_str(text)
    }
}

/// Errors surfaced by the hosting layer
#[derive(Debug, thiserror::Error)]
pub enum NetClrError {
    #[error("Failed to load native library {path:?}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("Entry point {name} not found: {source}")]
    MissingEntryPoint {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("nethost locator not found at {path:?}; pass an explicit hostfxr path instead")]
    NethostMissing { path: PathBuf },
    #[error("{operation} failed: {status}")]
    Status {
        operation: Operation,
        status: StatusCode,
    },
    #[error("{operation} needs a buffer of {required} elements")]
    BufferTooSmall { operation: Operation, required: usize },
    #[error("assembly load and function pointer resolution failed with code {code:#010x}")]
    DelegateResolution { code: i32 },
    #[error("Cannot perform {operation}: session is {state}")]
    InvalidState {
        operation: Operation,
        state: SessionState,
    },
    #[error("String {what:?} contains a nul at position {position}")]
    InteriorNul { what: String, position: usize },
}

impl NetClrError {
    /// Raw foreign code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            NetClrError::Status { status, .. } => Some(status.raw()),
            NetClrError::DelegateResolution { code } => Some(*code),
            NetClrError::BufferTooSmall { .. } => Some(StatusCode::HOST_API_BUFFER_TOO_SMALL.raw()),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.code().map(StatusCode::from_raw)
    }
}

pub type Result<T> = std::result::Result<T, NetClrError>;
