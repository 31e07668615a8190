use std::ptr;

use crate::pdstring::{PdCString, PdChar};

fn opt_ptr(s: Option<&PdCString>) -> *const PdChar {
    s.map_or(ptr::null(), PdCString::as_ptr)
}

/// `hostfxr_initialize_parameters`.
///
/// hostfxr reads `size` to tell which version of the struct it received.
/// The strings are only read during the initialize call; they must stay
/// alive until it returns.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InitParams {
    pub size: usize,
    pub host_path: *const PdChar,
    pub dotnet_root: *const PdChar,
}

impl InitParams {
    pub fn new(host_path: Option<&PdCString>, dotnet_root: Option<&PdCString>) -> Self {
        Self {
            size: std::mem::size_of::<Self>(),
            host_path: opt_ptr(host_path),
            dotnet_root: opt_ptr(dotnet_root),
        }
    }
}

/// `get_hostfxr_parameters`, consumed by nethost's `get_hostfxr_path`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetHostfxrParams {
    pub size: usize,
    pub assembly_path: *const PdChar,
    pub dotnet_root: *const PdChar,
}

impl GetHostfxrParams {
    pub fn new(assembly_path: Option<&PdCString>, dotnet_root: Option<&PdCString>) -> Self {
        Self {
            size: std::mem::size_of::<Self>(),
            assembly_path: opt_ptr(assembly_path),
            dotnet_root: opt_ptr(dotnet_root),
        }
    }
}
