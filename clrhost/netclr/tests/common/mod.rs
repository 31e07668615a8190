//! In-process stand-in for hostfxr. Each runtime config path (or argv[0])
//! selects a registered [`Scenario`]; context handles are boxed
//! [`MockContext`]s.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use netclr::pdstring::{decode_ptr, PdCString, PdChar};
use netclr::{Hostfxr, HostfxrApi, InitParams, RawContextHandle, StatusCode};
use once_cell::sync::Lazy;

/// HRESULT for FileNotFoundException.
pub const E_FILE_NOT_FOUND: i32 = 0x8007_0002u32 as i32;
/// HRESULT for MissingMethodException.
pub const E_MISSING_METHOD: i32 = 0x8013_1513u32 as i32;

#[derive(Default)]
pub struct Scenario {
    pub properties: Mutex<Vec<(String, String)>>,
    pub inits: AtomicUsize,
    pub closes: AtomicUsize,
    pub active: AtomicUsize,
    pub delegate_requests: AtomicUsize,
    pub params_seen: AtomicBool,
    pub dotnet_root: Mutex<Option<String>>,
    pub exit_code: Mutex<i32>,
    pub fail_close: AtomicBool,
    /// Every property read reports one more property than it was given room for.
    pub growing: AtomicBool,
    pub property_reads: AtomicUsize,
}

static SCENARIOS: Lazy<Mutex<HashMap<String, Arc<Scenario>>>> = Lazy::new(Default::default);

pub fn register(key: &str, properties: &[(&str, &str)]) -> Arc<Scenario> {
    let scenario = Arc::new(Scenario::default());
    *scenario.properties.lock().unwrap() = properties
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SCENARIOS
        .lock()
        .unwrap()
        .insert(key.to_string(), Arc::clone(&scenario));
    scenario
}

fn lookup(key: &str) -> Option<Arc<Scenario>> {
    SCENARIOS.lock().unwrap().get(key).cloned()
}

struct MockContext {
    scenario: Arc<Scenario>,
    strings: Vec<(PdCString, PdCString)>,
    value: Option<PdCString>,
}

unsafe fn context<'a>(handle: RawContextHandle) -> &'a mut MockContext {
    &mut *(handle as *mut MockContext)
}

fn encode(s: &str) -> PdCString {
    PdCString::new(s).unwrap()
}

unsafe fn read_params(scenario: &Scenario, params: *const InitParams) -> bool {
    if params.is_null() {
        return true;
    }
    let params = &*params;
    if params.size != size_of::<InitParams>() {
        return false;
    }
    scenario.params_seen.store(true, Ordering::SeqCst);
    if !params.dotnet_root.is_null() {
        *scenario.dotnet_root.lock().unwrap() = Some(decode_ptr(params.dotnet_root));
    }
    true
}

unsafe fn open_context(scenario: Arc<Scenario>, handle: *mut RawContextHandle) -> i32 {
    scenario.inits.fetch_add(1, Ordering::SeqCst);
    let already_active = scenario.active.fetch_add(1, Ordering::SeqCst) > 0;
    let ctx = Box::new(MockContext {
        scenario,
        strings: Vec::new(),
        value: None,
    });
    *handle = Box::into_raw(ctx) as RawContextHandle;
    if already_active {
        StatusCode::SUCCESS_HOST_ALREADY_INITIALIZED.raw()
    } else {
        StatusCode::SUCCESS.raw()
    }
}

unsafe extern "C" fn initialize_for_runtime_config(
    runtime_config_path: *const PdChar,
    parameters: *const InitParams,
    handle: *mut RawContextHandle,
) -> i32 {
    let Some(scenario) = lookup(&decode_ptr(runtime_config_path)) else {
        return StatusCode::INVALID_CONFIG_FILE.raw();
    };
    if !read_params(&scenario, parameters) {
        return StatusCode::INVALID_ARG_FAILURE.raw();
    }
    open_context(scenario, handle)
}

unsafe extern "C" fn initialize_for_dotnet_command_line(
    argc: i32,
    argv: *const *const PdChar,
    parameters: *const InitParams,
    handle: *mut RawContextHandle,
) -> i32 {
    if argc < 1 {
        return StatusCode::INVALID_ARG_FAILURE.raw();
    }
    let Some(scenario) = lookup(&decode_ptr(*argv)) else {
        return StatusCode::APP_ARG_NOT_RUNNABLE.raw();
    };
    if !read_params(&scenario, parameters) {
        return StatusCode::INVALID_ARG_FAILURE.raw();
    }
    open_context(scenario, handle)
}

unsafe extern "C" fn get_runtime_property_value(
    handle: RawContextHandle,
    name: *const PdChar,
    value: *mut *const PdChar,
) -> i32 {
    let ctx = context(handle);
    let name = decode_ptr(name);
    let found = ctx
        .scenario
        .properties
        .lock()
        .unwrap()
        .iter()
        .find(|(k, _)| *k == name)
        .map(|(_, v)| encode(v));
    match found {
        Some(encoded) => {
            *value = encoded.as_ptr();
            ctx.value = Some(encoded);
            StatusCode::SUCCESS.raw()
        }
        None => StatusCode::HOST_PROPERTY_NOT_FOUND.raw(),
    }
}

unsafe extern "C" fn set_runtime_property_value(
    handle: RawContextHandle,
    name: *const PdChar,
    value: *const PdChar,
) -> i32 {
    let ctx = context(handle);
    let name = decode_ptr(name);
    let mut properties = ctx.scenario.properties.lock().unwrap();
    let position = properties.iter().position(|(k, _)| *k == name);
    match (position, value.is_null()) {
        (Some(i), true) => {
            properties.remove(i);
        }
        (Some(i), false) => properties[i].1 = decode_ptr(value),
        (None, false) => properties.push((name, decode_ptr(value))),
        (None, true) => {}
    }
    StatusCode::SUCCESS.raw()
}

unsafe extern "C" fn get_runtime_properties(
    handle: RawContextHandle,
    count: *mut usize,
    keys: *mut *const PdChar,
    values: *mut *const PdChar,
) -> i32 {
    let ctx = context(handle);
    ctx.scenario.property_reads.fetch_add(1, Ordering::SeqCst);
    if ctx.scenario.growing.load(Ordering::SeqCst) {
        *count += 1;
        return StatusCode::HOST_API_BUFFER_TOO_SMALL.raw();
    }
    let properties = ctx.scenario.properties.lock().unwrap().clone();
    if *count < properties.len() {
        *count = properties.len();
        return StatusCode::HOST_API_BUFFER_TOO_SMALL.raw();
    }

    ctx.strings = properties.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    for (i, (k, v)) in ctx.strings.iter().enumerate() {
        *keys.add(i) = k.as_ptr();
        *values.add(i) = v.as_ptr();
    }
    *count = properties.len();
    StatusCode::SUCCESS.raw()
}

unsafe extern "C" fn get_runtime_delegate(
    handle: RawContextHandle,
    delegate_type: i32,
    delegate: *mut *mut c_void,
) -> i32 {
    let ctx = context(handle);
    ctx.scenario.delegate_requests.fetch_add(1, Ordering::SeqCst);
    if delegate_type != 5 {
        return StatusCode::HOST_API_UNSUPPORTED_SCENARIO.raw();
    }
    *delegate = load_assembly_and_get_function_pointer as *mut c_void;
    StatusCode::SUCCESS.raw()
}

unsafe extern "C" fn run_app(handle: RawContextHandle) -> i32 {
    *context(handle).scenario.exit_code.lock().unwrap()
}

unsafe extern "C" fn close(handle: RawContextHandle) -> i32 {
    let ctx = Box::from_raw(handle as *mut MockContext);
    ctx.scenario.closes.fetch_add(1, Ordering::SeqCst);
    ctx.scenario.active.fetch_sub(1, Ordering::SeqCst);
    if ctx.scenario.fail_close.load(Ordering::SeqCst) {
        StatusCode::HOST_INVALID_STATE.raw()
    } else {
        StatusCode::SUCCESS.raw()
    }
}

/// Managed stand-in: `int Increment(IntPtr args, int size)` bumps the
/// `usize` counter `args` points at.
unsafe extern "system" fn increment(args: *mut c_void, size: i32) -> i32 {
    if args.is_null() {
        return 0;
    }
    if size as usize != size_of::<usize>() {
        return -1;
    }
    *(args as *mut usize) += 1;
    1
}

/// Managed stand-in for an `[UnmanagedCallersOnly]` method.
unsafe extern "system" fn add(a: i32, b: i32) -> i32 {
    a + b
}

pub type AddFn = unsafe extern "system" fn(i32, i32) -> i32;

unsafe extern "system" fn load_assembly_and_get_function_pointer(
    assembly_path: *const PdChar,
    _type_name: *const PdChar,
    method_name: *const PdChar,
    delegate_type_name: *const PdChar,
    _reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    if decode_ptr(assembly_path).contains("missing") {
        return E_FILE_NOT_FOUND;
    }
    let function = match (decode_ptr(method_name).as_str(), delegate_type_name as usize) {
        ("Add", usize::MAX) => add as *mut c_void,
        ("Increment", usize::MAX) => return E_MISSING_METHOD,
        ("Increment", _) => increment as *mut c_void,
        _ => return E_MISSING_METHOD,
    };
    *delegate = function;
    0
}

pub fn hostfxr() -> Arc<Hostfxr> {
    let api = HostfxrApi {
        initialize_for_runtime_config,
        initialize_for_dotnet_command_line,
        get_runtime_property_value,
        set_runtime_property_value,
        get_runtime_properties,
        get_runtime_delegate,
        run_app,
        close,
    };
    unsafe { Hostfxr::from_api(api) }
}
