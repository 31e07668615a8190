use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use once_cell::unsync::OnceCell;

use crate::delegates::{AssemblyLoader, DelegateKind, DelegateType};
use crate::discovery::locate_hosting_library;
use crate::hosting::ContextHandle;
use crate::marshaling::InitParams;
use crate::pdstring::PdCString;
use crate::{
    ComponentEntryPoint, Hostfxr, ManagedFunction, NetClrError, Operation, RawDelegate, Result,
    StatusCode,
};

/// Capacity of a single bounded property exchange.
pub const DEFAULT_PROPERTY_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No context yet. A failed construction never yields a session.
    Uninitialized,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => f.write_str("uninitialized"),
            SessionState::Active => f.write_str("active"),
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Path of the native host executable, reported to the runtime.
    pub host_path: Option<PathBuf>,
    /// Root of the dotnet installation to run on.
    pub dotnet_root: Option<PathBuf>,
    /// hostfxr to load; located through nethost when unset.
    pub hostfxr_path: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_path = Some(path.into());
        self
    }

    pub fn dotnet_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotnet_root = Some(path.into());
        self
    }

    pub fn hostfxr_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.hostfxr_path = Some(path.into());
        self
    }

    fn resolve_hostfxr(&self) -> Result<Arc<Hostfxr>> {
        match &self.hostfxr_path {
            Some(path) => Hostfxr::load(path),
            None => Hostfxr::load(locate_hosting_library()?),
        }
    }
}

/// Encoded `host_path`/`dotnet_root`, alive across the initialize call.
struct EncodedParams {
    host_path: Option<PdCString>,
    dotnet_root: Option<PdCString>,
}

impl EncodedParams {
    fn new(options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            host_path: options.host_path.as_ref().map(PdCString::from_os_str).transpose()?,
            dotnet_root: options.dotnet_root.as_ref().map(PdCString::from_os_str).transpose()?,
        })
    }

    /// Only built when there is something to pass.
    fn init_params(&self) -> Option<InitParams> {
        if self.host_path.is_none() && self.dotnet_root.is_none() {
            return None;
        }
        Some(InitParams::new(self.host_path.as_ref(), self.dotnet_root.as_ref()))
    }
}

/// One initialized hostfxr context.
///
/// The context is closed by [`HostSession::close`] or on drop. Not thread
/// safe: hostfxr contexts are driven from one thread.
pub struct HostSession {
    hostfxr: Arc<Hostfxr>,
    handle: Option<ContextHandle>,
    init_status: StatusCode,
    loader: OnceCell<AssemblyLoader>,
}

impl HostSession {
    /// Initializes a context from a `runtimeconfig.json`, locating hostfxr
    /// through nethost.
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(config_path, &SessionOptions::default())
    }

    pub fn with_options(config_path: impl AsRef<Path>, options: &SessionOptions) -> Result<Self> {
        let hostfxr = options.resolve_hostfxr()?;
        Self::with_hostfxr(hostfxr, config_path, options)
    }

    /// Initializes a context on an already loaded hostfxr.
    /// `options.hostfxr_path` is ignored.
    pub fn with_hostfxr(
        hostfxr: Arc<Hostfxr>,
        config_path: impl AsRef<Path>,
        options: &SessionOptions,
    ) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config = PdCString::from_os_str(config_path)?;
        let encoded = EncodedParams::new(options)?;
        let params = encoded.init_params();

        debug!("Initializing runtime from {:?}", config_path);
        let (handle, status) = hostfxr.initialize_for_runtime_config(&config, params.as_ref())?;
        info!("Runtime context ready for {:?} ({})", config_path, status);
        Ok(Self::from_handle(hostfxr, handle, status))
    }

    /// Initializes a context for running an app: `args[0]` is the app
    /// assembly, the rest are its arguments.
    pub fn for_command_line<S: AsRef<OsStr>>(args: &[S], options: &SessionOptions) -> Result<Self> {
        let hostfxr = options.resolve_hostfxr()?;
        Self::for_command_line_with_hostfxr(hostfxr, args, options)
    }

    pub fn for_command_line_with_hostfxr<S: AsRef<OsStr>>(
        hostfxr: Arc<Hostfxr>,
        args: &[S],
        options: &SessionOptions,
    ) -> Result<Self> {
        let args = args
            .iter()
            .map(PdCString::from_os_str)
            .collect::<Result<Vec<_>>>()?;
        let encoded = EncodedParams::new(options)?;
        let params = encoded.init_params();

        debug!("Initializing runtime for command line {:?}", args);
        let (handle, status) = hostfxr.initialize_for_dotnet_command_line(&args, params.as_ref())?;
        info!("Runtime context ready for command line ({})", status);
        Ok(Self::from_handle(hostfxr, handle, status))
    }

    fn from_handle(hostfxr: Arc<Hostfxr>, handle: ContextHandle, init_status: StatusCode) -> Self {
        Self {
            hostfxr,
            handle: Some(handle),
            init_status,
            loader: OnceCell::new(),
        }
    }

    /// Which success code initialization returned. All of them mean ready.
    pub fn init_status(&self) -> StatusCode {
        self.init_status
    }

    pub fn state(&self) -> SessionState {
        if self.handle.is_some() {
            SessionState::Active
        } else {
            SessionState::Closed
        }
    }

    pub fn hostfxr(&self) -> &Arc<Hostfxr> {
        &self.hostfxr
    }

    fn active(&self, operation: Operation) -> Result<&ContextHandle> {
        self.handle.as_ref().ok_or(NetClrError::InvalidState {
            operation,
            state: self.state(),
        })
    }

    /// All runtime properties, in the order hostfxr reports them.
    ///
    /// Reads with [`DEFAULT_PROPERTY_CAPACITY`] first; if the context holds
    /// more, reads once more with the count hostfxr reported. A second
    /// `BufferTooSmall` is returned as is.
    pub fn get_runtime_properties(&self) -> Result<Vec<PropertyPair>> {
        match self.get_runtime_properties_with_capacity(DEFAULT_PROPERTY_CAPACITY) {
            Err(NetClrError::BufferTooSmall { required, .. })
                if required > DEFAULT_PROPERTY_CAPACITY =>
            {
                debug!("Context holds {} properties, reading again", required);
                self.get_runtime_properties_with_capacity(required)
            }
            other => other,
        }
    }

    /// Reads at most `capacity` properties in one exchange. More properties
    /// than that is a `BufferTooSmall` error, never a truncated list.
    pub fn get_runtime_properties_with_capacity(
        &self,
        capacity: usize,
    ) -> Result<Vec<PropertyPair>> {
        let handle = self.active(Operation::GetRuntimeProperties)?;
        let pairs = self.hostfxr.get_runtime_properties(handle, capacity)?;
        Ok(pairs
            .into_iter()
            .map(|(key, value)| PropertyPair { key, value })
            .collect())
    }

    pub fn get_runtime_property(&self, name: &str) -> Result<String> {
        let handle = self.active(Operation::GetRuntimeProperty)?;
        let name = PdCString::new(name)?;
        self.hostfxr.get_runtime_property_value(handle, &name)
    }

    /// Only allowed before the runtime starts, i.e. before the first delegate.
    pub fn set_runtime_property(&self, name: &str, value: &str) -> Result<()> {
        let handle = self.active(Operation::SetRuntimeProperty)?;
        let name = PdCString::new(name)?;
        let value = PdCString::new(value)?;
        self.hostfxr.set_runtime_property_value(handle, &name, Some(&value))
    }

    pub fn remove_runtime_property(&self, name: &str) -> Result<()> {
        let handle = self.active(Operation::SetRuntimeProperty)?;
        let name = PdCString::new(name)?;
        self.hostfxr.set_runtime_property_value(handle, &name, None)
    }

    /// The runtime's assembly loader, fetched once per session.
    fn assembly_loader(&self) -> Result<AssemblyLoader> {
        let handle = self.active(Operation::GetRuntimeDelegate)?;
        self.loader
            .get_or_try_init(|| {
                let delegate = self
                    .hostfxr
                    .get_runtime_delegate(handle, DelegateKind::LoadAssemblyAndGetFunctionPointer)?;
                debug!("Acquired load_assembly_and_get_function_pointer delegate");
                Ok::<_, NetClrError>(unsafe { AssemblyLoader::from_raw(delegate) })
            })
            .copied()
    }

    fn resolve(
        &self,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
        delegate_type: DelegateType<'_>,
    ) -> Result<std::ptr::NonNull<std::ffi::c_void>> {
        let loader = self.assembly_loader()?;
        let assembly_path = PdCString::from_os_str(assembly_path)?;
        let type_name = PdCString::new(type_name)?;
        let method_name = PdCString::new(method_name)?;
        loader.load(&assembly_path, &type_name, &method_name, delegate_type)
    }

    /// Loads `assembly_path` and resolves `type_name::method_name`.
    ///
    /// Without `delegate_name` the method must have the component entry
    /// point signature `int (IntPtr args, int size)` and comes back as
    /// [`ManagedFunction::EntryPoint`]. With it, the runtime wraps the
    /// method in that delegate type and the result is a
    /// [`ManagedFunction::Delegate`].
    pub fn load_assembly_and_get_function_pointer(
        &self,
        assembly_path: impl AsRef<Path>,
        type_name: &str,
        method_name: &str,
        delegate_name: Option<&str>,
    ) -> Result<ManagedFunction> {
        let assembly_path = assembly_path.as_ref();
        match delegate_name {
            None => {
                let ptr = self.resolve(
                    assembly_path,
                    type_name,
                    method_name,
                    DelegateType::ComponentEntryPoint,
                )?;
                let hostfxr = Arc::clone(&self.hostfxr);
                let entry = unsafe { ComponentEntryPoint::from_raw(ptr, hostfxr) };
                Ok(ManagedFunction::EntryPoint(entry))
            }
            Some(name) => {
                let name = PdCString::new(name)?;
                let ptr = self.resolve(
                    assembly_path,
                    type_name,
                    method_name,
                    DelegateType::Named(&name),
                )?;
                Ok(ManagedFunction::Delegate(RawDelegate::new(
                    ptr,
                    Arc::clone(&self.hostfxr),
                )))
            }
        }
    }

    pub fn get_function_with_default_signature(
        &self,
        assembly_path: impl AsRef<Path>,
        type_name: &str,
        method_name: &str,
    ) -> Result<ComponentEntryPoint> {
        let ptr = self.resolve(
            assembly_path.as_ref(),
            type_name,
            method_name,
            DelegateType::ComponentEntryPoint,
        )?;
        Ok(unsafe { ComponentEntryPoint::from_raw(ptr, Arc::clone(&self.hostfxr)) })
    }

    /// Resolves a method marked `[UnmanagedCallersOnly]`. Cast the result to
    /// its `extern "system"` signature with [`RawDelegate::cast`].
    pub fn get_function_with_unmanaged_callers_only(
        &self,
        assembly_path: impl AsRef<Path>,
        type_name: &str,
        method_name: &str,
    ) -> Result<RawDelegate> {
        let ptr = self.resolve(
            assembly_path.as_ref(),
            type_name,
            method_name,
            DelegateType::UnmanagedCallersOnly,
        )?;
        Ok(RawDelegate::new(ptr, Arc::clone(&self.hostfxr)))
    }

    /// Runs the app of a command-line session and returns its exit code.
    pub fn run_app(&self) -> Result<i32> {
        let handle = self.active(Operation::RunApp)?;
        self.hostfxr.run_app(handle)
    }

    /// Closes the context. Later calls, and the drop, do nothing. A failing
    /// close is logged, never returned.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.loader.take();
            self.hostfxr.close(handle);
        }
    }
}

impl fmt::Debug for HostSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSession")
            .field("hostfxr", &self.hostfxr)
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("init_status", &self.init_status)
            .finish()
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.close();
    }
}
