use std::fmt;

/// Result code of a hostfxr or nethost call.
///
/// Non-negative values are successes, negative values are the
/// `0x8000_80xx` failure codes of the hosting layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(i32);

macro_rules! status_codes {
    ($($name:ident = $value:expr => $label:literal,)*) => {
        impl StatusCode {
            $(pub const $name: StatusCode = StatusCode($value as i32);)*

            /// Name used by the hosting layer for this code, if known.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(StatusCode::$name => Some($label),)*
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    SUCCESS = 0 => "Success",
    SUCCESS_HOST_ALREADY_INITIALIZED = 1 => "Success_HostAlreadyInitialized",
    SUCCESS_DIFFERENT_RUNTIME_PROPERTIES = 2 => "Success_DifferentRuntimeProperties",

    INVALID_ARG_FAILURE = 0x8000_8081u32 => "InvalidArgFailure",
    CORE_HOST_LIB_LOAD_FAILURE = 0x8000_8082u32 => "CoreHostLibLoadFailure",
    CORE_HOST_LIB_MISSING_FAILURE = 0x8000_8083u32 => "CoreHostLibMissingFailure",
    CORE_HOST_ENTRY_POINT_FAILURE = 0x8000_8084u32 => "CoreHostEntryPointFailure",
    CORE_HOST_CUR_HOST_FIND_FAILURE = 0x8000_8085u32 => "CoreHostCurHostFindFailure",
    CORE_CLR_RESOLVE_FAILURE = 0x8000_8087u32 => "CoreClrResolveFailure",
    CORE_CLR_BIND_FAILURE = 0x8000_8088u32 => "CoreClrBindFailure",
    CORE_CLR_INIT_FAILURE = 0x8000_8089u32 => "CoreClrInitFailure",
    CORE_CLR_EXE_FAILURE = 0x8000_808au32 => "CoreClrExeFailure",
    RESOLVER_INIT_FAILURE = 0x8000_808bu32 => "ResolverInitFailure",
    RESOLVER_RESOLVE_FAILURE = 0x8000_808cu32 => "ResolverResolveFailure",
    LIB_HOST_CUR_EXE_FIND_FAILURE = 0x8000_808du32 => "LibHostCurExeFindFailure",
    LIB_HOST_INIT_FAILURE = 0x8000_808eu32 => "LibHostInitFailure",
    LIB_HOST_EXEC_MODE_FAILURE = 0x8000_8090u32 => "LibHostExecModeFailure",
    LIB_HOST_SDK_FIND_FAILURE = 0x8000_8091u32 => "LibHostSdkFindFailure",
    LIB_HOST_INVALID_ARGS = 0x8000_8092u32 => "LibHostInvalidArgs",
    INVALID_CONFIG_FILE = 0x8000_8093u32 => "InvalidConfigFile",
    APP_ARG_NOT_RUNNABLE = 0x8000_8094u32 => "AppArgNotRunnable",
    APP_HOST_EXE_NOT_BOUND_FAILURE = 0x8000_8095u32 => "AppHostExeNotBoundFailure",
    FRAMEWORK_MISSING_FAILURE = 0x8000_8096u32 => "FrameworkMissingFailure",
    HOST_API_FAILED = 0x8000_8097u32 => "HostApiFailed",
    HOST_API_BUFFER_TOO_SMALL = 0x8000_8098u32 => "HostApiBufferTooSmall",
    LIB_HOST_UNKNOWN_COMMAND = 0x8000_8099u32 => "LibHostUnknownCommand",
    LIB_HOST_APP_ROOT_FIND_FAILURE = 0x8000_809au32 => "LibHostAppRootFindFailure",
    SDK_RESOLVER_RESOLVE_FAILURE = 0x8000_809bu32 => "SdkResolverResolveFailure",
    FRAMEWORK_COMPAT_FAILURE = 0x8000_809cu32 => "FrameworkCompatFailure",
    FRAMEWORK_COMPAT_RETRY = 0x8000_809du32 => "FrameworkCompatRetry",
    BUNDLE_EXTRACTION_FAILURE = 0x8000_809fu32 => "BundleExtractionFailure",
    BUNDLE_EXTRACTION_IO_ERROR = 0x8000_80a0u32 => "BundleExtractionIOError",
    LIB_HOST_DUPLICATE_PROPERTY = 0x8000_80a1u32 => "LibHostDuplicateProperty",
    HOST_API_UNSUPPORTED_VERSION = 0x8000_80a2u32 => "HostApiUnsupportedVersion",
    HOST_INVALID_STATE = 0x8000_80a3u32 => "HostInvalidState",
    HOST_PROPERTY_NOT_FOUND = 0x8000_80a4u32 => "HostPropertyNotFound",
    CORE_HOST_INCOMPATIBLE_CONFIG = 0x8000_80a5u32 => "CoreHostIncompatibleConfig",
    HOST_API_UNSUPPORTED_SCENARIO = 0x8000_80a6u32 => "HostApiUnsupportedScenario",
    HOST_FEATURE_DISABLED = 0x8000_80a7u32 => "HostFeatureDisabled",
}

impl StatusCode {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl From<i32> for StatusCode {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08x})", name, self.0 as u32),
            None => write!(f, "0x{:08x}", self.0 as u32),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusCode({})", self)
    }
}
