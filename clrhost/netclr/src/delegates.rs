use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::pdstring::{PdCString, PdChar};
use crate::{Hostfxr, NetClrError, Result};

/// `hostfxr_delegate_type`
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateKind {
    ComActivation = 0,
    LoadInMemoryAssembly = 1,
    WinrtActivation = 2,
    ComRegister = 3,
    ComUnregister = 4,
    LoadAssemblyAndGetFunctionPointer = 5,
}

// Runtime-provided delegates use the platform default convention (stdcall on win-x86).
pub type LoadAssemblyAndGetFunctionPointerFn = unsafe extern "system" fn(
    assembly_path: *const PdChar,
    type_name: *const PdChar,
    method_name: *const PdChar,
    delegate_type_name: *const PdChar,
    reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32;

/// `component_entry_point_fn`: `int (void* args, int32 size)`.
pub type ComponentEntryPointFn = unsafe extern "system" fn(args: *mut c_void, size: i32) -> i32;

// UNMANAGEDCALLERSONLY_METHOD
const UNMANAGED_CALLERS_ONLY_METHOD: *const PdChar = usize::MAX as *const PdChar;

/// Which managed signature the requested method is exposed as.
pub(crate) enum DelegateType<'a> {
    ComponentEntryPoint,
    UnmanagedCallersOnly,
    Named(&'a PdCString),
}

impl DelegateType<'_> {
    fn as_ptr(&self) -> *const PdChar {
        match self {
            DelegateType::ComponentEntryPoint => ptr::null(),
            DelegateType::UnmanagedCallersOnly => UNMANAGED_CALLERS_ONLY_METHOD,
            DelegateType::Named(name) => name.as_ptr(),
        }
    }
}

/// The runtime's `load_assembly_and_get_function_pointer` delegate.
#[derive(Clone, Copy)]
pub(crate) struct AssemblyLoader(LoadAssemblyAndGetFunctionPointerFn);

impl AssemblyLoader {
    /// # Safety
    /// `delegate` must come from `hostfxr_get_runtime_delegate` for
    /// [`DelegateKind::LoadAssemblyAndGetFunctionPointer`].
    pub(crate) unsafe fn from_raw(delegate: NonNull<c_void>) -> Self {
        Self(mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(
            delegate.as_ptr(),
        ))
    }

    /// Its status is not a hostfxr status: any negative value is a failure.
    pub(crate) fn load(
        &self,
        assembly_path: &PdCString,
        type_name: &PdCString,
        method_name: &PdCString,
        delegate_type: DelegateType<'_>,
    ) -> Result<NonNull<c_void>> {
        let mut delegate: *mut c_void = ptr::null_mut();
        let code = unsafe {
            (self.0)(
                assembly_path.as_ptr(),
                type_name.as_ptr(),
                method_name.as_ptr(),
                delegate_type.as_ptr(),
                ptr::null_mut(),
                &mut delegate,
            )
        };
        if code < 0 {
            return Err(NetClrError::DelegateResolution { code });
        }
        NonNull::new(delegate).ok_or(NetClrError::DelegateResolution { code })
    }
}

/// A managed method exposed with the default component entry point
/// signature. Keeps the hosting library loaded while it exists.
#[derive(Clone)]
pub struct ComponentEntryPoint {
    function: ComponentEntryPointFn,
    _hostfxr: Arc<Hostfxr>,
}

impl ComponentEntryPoint {
    pub(crate) unsafe fn from_raw(delegate: NonNull<c_void>, hostfxr: Arc<Hostfxr>) -> Self {
        Self {
            function: mem::transmute::<*mut c_void, ComponentEntryPointFn>(delegate.as_ptr()),
            _hostfxr: hostfxr,
        }
    }

    /// Calls into managed code.
    ///
    /// # Safety
    /// `args` and `size` must be what the managed method expects. A fault in
    /// managed code takes down the process; it cannot be caught here.
    pub unsafe fn call(&self, args: *mut c_void, size: i32) -> i32 {
        (self.function)(args, size)
    }

    /// Passes `args` by address with its byte size.
    ///
    /// # Safety
    /// See [`ComponentEntryPoint::call`].
    pub unsafe fn call_with<T>(&self, args: &mut T) -> i32 {
        self.call(args as *mut T as *mut c_void, ArgsSize::<T>::BYTES)
    }

    pub fn as_fn(&self) -> ComponentEntryPointFn {
        self.function
    }
}

impl std::fmt::Debug for ComponentEntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ComponentEntryPoint({:p})", self.function as *const c_void)
    }
}

// Both checks fail the build when instantiated with an unfit type.
struct ArgsSize<T>(PhantomData<T>);

impl<T> ArgsSize<T> {
    const BYTES: i32 = {
        assert!(
            mem::size_of::<T>() <= i32::MAX as usize,
            "entry point arguments must fit in an i32 byte count"
        );
        mem::size_of::<T>() as i32
    };
}

struct PointerSized<F>(PhantomData<F>);

impl<F> PointerSized<F> {
    const CHECK: () = assert!(
        mem::size_of::<F>() == mem::size_of::<*mut c_void>(),
        "delegate can only be cast to a function pointer type"
    );
}

/// A function pointer whose signature is only known to the caller.
#[derive(Clone)]
pub struct RawDelegate {
    ptr: NonNull<c_void>,
    _hostfxr: Arc<Hostfxr>,
}

impl RawDelegate {
    pub(crate) fn new(ptr: NonNull<c_void>, hostfxr: Arc<Hostfxr>) -> Self {
        Self {
            ptr,
            _hostfxr: hostfxr,
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// Reinterprets the pointer as the function pointer type `F`.
    ///
    /// # Safety
    /// `F` must be an `extern "system"` function pointer type matching the
    /// managed method or delegate this was resolved from.
    pub unsafe fn cast<F: Copy>(&self) -> F {
        let () = PointerSized::<F>::CHECK;
        mem::transmute_copy(&self.ptr)
    }
}

impl std::fmt::Debug for RawDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawDelegate({:p})", self.ptr)
    }
}

/// Result of resolving a managed method.
#[derive(Debug, Clone)]
pub enum ManagedFunction {
    /// Requested without a delegate type name.
    EntryPoint(ComponentEntryPoint),
    /// Requested with a delegate type name or as `UnmanagedCallersOnly`.
    Delegate(RawDelegate),
}

impl ManagedFunction {
    pub fn into_entry_point(self) -> Option<ComponentEntryPoint> {
        match self {
            ManagedFunction::EntryPoint(entry) => Some(entry),
            ManagedFunction::Delegate(_) => None,
        }
    }

    pub fn into_delegate(self) -> Option<RawDelegate> {
        match self {
            ManagedFunction::Delegate(delegate) => Some(delegate),
            ManagedFunction::EntryPoint(_) => None,
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        match self {
            ManagedFunction::EntryPoint(entry) => entry.function as *mut c_void,
            ManagedFunction::Delegate(delegate) => delegate.as_ptr(),
        }
    }
}
