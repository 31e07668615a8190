use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};

use libloading::{Library, Symbol};
use log::{debug, warn};
use once_cell::sync::Lazy;

use crate::delegates::DelegateKind;
use crate::marshaling::InitParams;
use crate::pdstring::{decode_ptr, PdCString, PdChar};
use crate::{NetClrError, Operation, RawContextHandle, Result, StatusCode};

// hostfxr exports are cdecl on every platform.
pub type InitializeForRuntimeConfigFn = unsafe extern "C" fn(
    runtime_config_path: *const PdChar,
    parameters: *const InitParams,
    host_context_handle: *mut RawContextHandle,
) -> i32;
pub type InitializeForDotnetCommandLineFn = unsafe extern "C" fn(
    argc: i32,
    argv: *const *const PdChar,
    parameters: *const InitParams,
    host_context_handle: *mut RawContextHandle,
) -> i32;
pub type GetRuntimePropertyValueFn = unsafe extern "C" fn(
    host_context_handle: RawContextHandle,
    name: *const PdChar,
    value: *mut *const PdChar,
) -> i32;
pub type SetRuntimePropertyValueFn = unsafe extern "C" fn(
    host_context_handle: RawContextHandle,
    name: *const PdChar,
    value: *const PdChar,
) -> i32;
pub type GetRuntimePropertiesFn = unsafe extern "C" fn(
    host_context_handle: RawContextHandle,
    count: *mut usize,
    keys: *mut *const PdChar,
    values: *mut *const PdChar,
) -> i32;
pub type GetRuntimeDelegateFn = unsafe extern "C" fn(
    host_context_handle: RawContextHandle,
    delegate_type: i32,
    delegate: *mut *mut c_void,
) -> i32;
pub type RunAppFn = unsafe extern "C" fn(host_context_handle: RawContextHandle) -> i32;
pub type CloseFn = unsafe extern "C" fn(host_context_handle: RawContextHandle) -> i32;

/// The hostfxr entry points used by a session.
#[derive(Debug, Clone, Copy)]
pub struct HostfxrApi {
    pub initialize_for_runtime_config: InitializeForRuntimeConfigFn,
    pub initialize_for_dotnet_command_line: InitializeForDotnetCommandLineFn,
    pub get_runtime_property_value: GetRuntimePropertyValueFn,
    pub set_runtime_property_value: SetRuntimePropertyValueFn,
    pub get_runtime_properties: GetRuntimePropertiesFn,
    pub get_runtime_delegate: GetRuntimeDelegateFn,
    pub run_app: RunAppFn,
    pub close: CloseFn,
}

pub(crate) unsafe fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T> {
    let sym: Symbol<T> = lib
        .get(name.as_bytes())
        .map_err(|source| NetClrError::MissingEntryPoint { name, source })?;
    Ok(*sym)
}

impl HostfxrApi {
    /// # Safety
    /// `lib` must be a hostfxr build exporting these symbols with the
    /// declared signatures. The returned pointers dangle once `lib` is dropped.
    unsafe fn bind(lib: &Library) -> Result<Self> {
        Ok(Self {
            initialize_for_runtime_config: symbol(lib, "hostfxr_initialize_for_runtime_config")?,
            initialize_for_dotnet_command_line: symbol(
                lib,
                "hostfxr_initialize_for_dotnet_command_line",
            )?,
            get_runtime_property_value: symbol(lib, "hostfxr_get_runtime_property_value")?,
            set_runtime_property_value: symbol(lib, "hostfxr_set_runtime_property_value")?,
            get_runtime_properties: symbol(lib, "hostfxr_get_runtime_properties")?,
            get_runtime_delegate: symbol(lib, "hostfxr_get_runtime_delegate")?,
            run_app: symbol(lib, "hostfxr_run_app")?,
            close: symbol(lib, "hostfxr_close")?,
        })
    }
}

/// Owned hostfxr context. Not `Clone`: exactly one owner closes it.
#[derive(Debug)]
pub(crate) struct ContextHandle(NonNull<c_void>);

impl ContextHandle {
    fn raw(&self) -> RawContextHandle {
        self.0.as_ptr()
    }
}

pub(crate) fn check(operation: Operation, raw: i32) -> Result<StatusCode> {
    let status = StatusCode::from_raw(raw);
    if status.is_success() {
        Ok(status)
    } else {
        Err(NetClrError::Status { operation, status })
    }
}

static LOADED: Lazy<Mutex<HashMap<PathBuf, Arc<Hostfxr>>>> = Lazy::new(Default::default);

/// A loaded hostfxr library and its bound entry points.
pub struct Hostfxr {
    path: Option<PathBuf>,
    api: HostfxrApi,
    _lib: Option<Library>,
}

impl std::fmt::Debug for Hostfxr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hostfxr").field("path", &self.path).finish()
    }
}

impl Hostfxr {
    /// Loads hostfxr from `path`, reusing the instance already loaded from
    /// the same path.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Hostfxr>> {
        let path = path.as_ref();
        let mut loaded = LOADED.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hostfxr) = loaded.get(path) {
            return Ok(Arc::clone(hostfxr));
        }

        debug!("Loading hostfxr from {:?}", path);
        let hostfxr = unsafe {
            let lib = Library::new(path).map_err(|source| NetClrError::LibraryLoad {
                path: path.to_path_buf(),
                source,
            })?;
            let api = HostfxrApi::bind(&lib)?;
            Arc::new(Hostfxr {
                path: Some(path.to_path_buf()),
                api,
                _lib: Some(lib),
            })
        };
        loaded.insert(path.to_path_buf(), Arc::clone(&hostfxr));
        Ok(hostfxr)
    }

    /// Wraps entry points that are already resident in the process.
    ///
    /// # Safety
    /// Every pointer in `api` must follow the hostfxr contract for its
    /// signature and stay callable for the life of the returned value.
    pub unsafe fn from_api(api: HostfxrApi) -> Arc<Hostfxr> {
        Arc::new(Hostfxr {
            path: None,
            api,
            _lib: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn take_handle(
        &self,
        operation: Operation,
        raw: i32,
        handle: RawContextHandle,
    ) -> Result<(ContextHandle, StatusCode)> {
        let status = check(operation, raw)?;
        let handle = NonNull::new(handle).ok_or(NetClrError::Status {
            operation,
            status: StatusCode::HOST_INVALID_STATE,
        })?;
        debug!("Opened hostfxr context {:p} ({})", handle, status);
        Ok((ContextHandle(handle), status))
    }

    pub(crate) fn initialize_for_runtime_config(
        &self,
        config_path: &PdCString,
        params: Option<&InitParams>,
    ) -> Result<(ContextHandle, StatusCode)> {
        let mut handle: RawContextHandle = ptr::null_mut();
        let raw = unsafe {
            (self.api.initialize_for_runtime_config)(
                config_path.as_ptr(),
                params.map_or(ptr::null(), |p| p as *const InitParams),
                &mut handle,
            )
        };
        self.take_handle(Operation::InitializeForRuntimeConfig, raw, handle)
    }

    pub(crate) fn initialize_for_dotnet_command_line(
        &self,
        args: &[PdCString],
        params: Option<&InitParams>,
    ) -> Result<(ContextHandle, StatusCode)> {
        let argv: Vec<*const PdChar> = args.iter().map(PdCString::as_ptr).collect();
        let argc = i32::try_from(argv.len()).map_err(|_| NetClrError::Status {
            operation: Operation::InitializeForCommandLine,
            status: StatusCode::INVALID_ARG_FAILURE,
        })?;
        let mut handle: RawContextHandle = ptr::null_mut();
        let raw = unsafe {
            (self.api.initialize_for_dotnet_command_line)(
                argc,
                argv.as_ptr(),
                params.map_or(ptr::null(), |p| p as *const InitParams),
                &mut handle,
            )
        };
        self.take_handle(Operation::InitializeForCommandLine, raw, handle)
    }

    pub(crate) fn get_runtime_property_value(
        &self,
        handle: &ContextHandle,
        name: &PdCString,
    ) -> Result<String> {
        let mut value: *const PdChar = ptr::null();
        let raw = unsafe {
            (self.api.get_runtime_property_value)(handle.raw(), name.as_ptr(), &mut value)
        };
        check(Operation::GetRuntimeProperty, raw)?;
        Ok(unsafe { decode_ptr(value) })
    }

    pub(crate) fn set_runtime_property_value(
        &self,
        handle: &ContextHandle,
        name: &PdCString,
        value: Option<&PdCString>,
    ) -> Result<()> {
        let raw = unsafe {
            (self.api.set_runtime_property_value)(
                handle.raw(),
                name.as_ptr(),
                value.map_or(ptr::null(), PdCString::as_ptr),
            )
        };
        check(Operation::SetRuntimeProperty, raw).map(|_| ())
    }

    /// One bounded exchange. Fails with `BufferTooSmall` carrying the true
    /// count when the context holds more than `capacity` properties.
    pub(crate) fn get_runtime_properties(
        &self,
        handle: &ContextHandle,
        capacity: usize,
    ) -> Result<Vec<(String, String)>> {
        let mut keys: Vec<*const PdChar> = vec![ptr::null(); capacity];
        let mut values: Vec<*const PdChar> = vec![ptr::null(); capacity];
        let (keys_ptr, values_ptr) = if capacity == 0 {
            (ptr::null_mut(), ptr::null_mut())
        } else {
            (keys.as_mut_ptr(), values.as_mut_ptr())
        };

        let mut count = capacity;
        let raw = unsafe {
            (self.api.get_runtime_properties)(handle.raw(), &mut count, keys_ptr, values_ptr)
        };
        let status = StatusCode::from_raw(raw);
        let overflowed = status.is_success() && count > capacity;
        if status == StatusCode::HOST_API_BUFFER_TOO_SMALL || overflowed {
            return Err(NetClrError::BufferTooSmall {
                operation: Operation::GetRuntimeProperties,
                required: count,
            });
        }
        check(Operation::GetRuntimeProperties, raw)?;

        Ok(keys
            .iter()
            .zip(values.iter())
            .take(count)
            .map(|(&k, &v)| unsafe { (decode_ptr(k), decode_ptr(v)) })
            .collect())
    }

    pub(crate) fn get_runtime_delegate(
        &self,
        handle: &ContextHandle,
        kind: DelegateKind,
    ) -> Result<NonNull<c_void>> {
        let mut delegate: *mut c_void = ptr::null_mut();
        let raw =
            unsafe { (self.api.get_runtime_delegate)(handle.raw(), kind as i32, &mut delegate) };
        check(Operation::GetRuntimeDelegate, raw)?;
        NonNull::new(delegate).ok_or(NetClrError::Status {
            operation: Operation::GetRuntimeDelegate,
            status: StatusCode::HOST_API_FAILED,
        })
    }

    /// Runs the application of a command-line context and returns its exit
    /// code. Only hosting failure codes are treated as errors.
    pub(crate) fn run_app(&self, handle: &ContextHandle) -> Result<i32> {
        let raw = unsafe { (self.api.run_app)(handle.raw()) };
        let status = StatusCode::from_raw(raw);
        if status.is_failure() && status.name().is_some() {
            return Err(NetClrError::Status {
                operation: Operation::RunApp,
                status,
            });
        }
        Ok(raw)
    }

    /// Closes `handle`. Never fails: runs on teardown paths, so a bad
    /// status is only logged.
    pub(crate) fn close(&self, handle: ContextHandle) -> StatusCode {
        let status = StatusCode::from_raw(unsafe { (self.api.close)(handle.raw()) });
        if status.is_success() {
            debug!("Closed hostfxr context {:p}", handle.0);
        } else {
            warn!("Closing hostfxr context {:p} failed: {}", handle.0, status);
        }
        status
    }
}
