//! Finding hostfxr through the nethost locator library.

use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;
use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::hosting::{check, symbol};
use crate::marshaling::GetHostfxrParams;
use crate::pdstring::{path_from_buffer, NativeEncoding, PdCString, PdChar, PlatformEncoding};
use crate::{platform, NetClrError, Operation, Result, StatusCode};

/// Overrides the directory searched for `<rid>/<nethost library>`.
pub const NETHOST_DIR_ENV: &str = "NETCLR_NETHOST_DIR";

const PATH_BUFFER_LEN: usize = 4096;

// nethost uses the platform default convention, unlike hostfxr.
type GetHostfxrPathFn = unsafe extern "system" fn(
    buffer: *mut PdChar,
    buffer_size: *mut usize,
    parameters: *const GetHostfxrParams,
) -> i32;

static NETHOST: OnceCell<Nethost> = OnceCell::new();

struct Nethost {
    get_hostfxr_path: GetHostfxrPathFn,
    _lib: Library,
}

impl Nethost {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NetClrError::NethostMissing {
                path: path.to_path_buf(),
            });
        }

        debug!("Loading nethost from {:?}", path);
        unsafe {
            let lib = Library::new(path).map_err(|source| NetClrError::LibraryLoad {
                path: path.to_path_buf(),
                source,
            })?;
            let get_hostfxr_path = symbol(&lib, "get_hostfxr_path")?;
            Ok(Self {
                get_hostfxr_path,
                _lib: lib,
            })
        }
    }

    /// The locator for this platform under `root`.
    fn load_from(root: &Path) -> Result<Self> {
        Self::load(&platform::current().nethost_path(root))
    }

    fn hostfxr_path(&self, params: Option<&GetHostfxrParams>) -> Result<PathBuf> {
        let mut buffer: Vec<PdChar> = vec![PlatformEncoding::NUL; PATH_BUFFER_LEN];
        let mut size = buffer.len();
        let raw = unsafe {
            (self.get_hostfxr_path)(
                buffer.as_mut_ptr(),
                &mut size,
                params.map_or(ptr::null(), |p| p as *const GetHostfxrParams),
            )
        };

        if StatusCode::from_raw(raw) == StatusCode::HOST_API_BUFFER_TOO_SMALL {
            return Err(NetClrError::BufferTooSmall {
                operation: Operation::LocateHostfxr,
                required: size,
            });
        }
        check(Operation::LocateHostfxr, raw)?;
        Ok(path_from_buffer(&buffer))
    }
}

/// Directory holding the per-platform nethost folders: `$NETCLR_NETHOST_DIR`
/// if set, otherwise the directory of the running executable.
pub fn nethost_install_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(NETHOST_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn nethost() -> Result<&'static Nethost> {
    NETHOST.get_or_try_init(|| Nethost::load_from(&nethost_install_root()))
}

/// Inputs nethost may use to pick a runtime installation.
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    /// App the runtime is for; its `runtimeconfig.json` steers the search.
    pub assembly_path: Option<PathBuf>,
    /// Search this dotnet root instead of the global installation.
    pub dotnet_root: Option<PathBuf>,
}

/// Full path of the hostfxr library installed on this machine.
pub fn locate_hosting_library() -> Result<PathBuf> {
    locate(nethost()?, None)
}

pub fn locate_hosting_library_with(options: &LocateOptions) -> Result<PathBuf> {
    locate(nethost()?, Some(options))
}

fn locate(nethost: &Nethost, options: Option<&LocateOptions>) -> Result<PathBuf> {
    let path = match options {
        None => nethost.hostfxr_path(None)?,
        Some(options) => {
            let assembly_path = options
                .assembly_path
                .as_ref()
                .map(PdCString::from_os_str)
                .transpose()?;
            let dotnet_root = options
                .dotnet_root
                .as_ref()
                .map(PdCString::from_os_str)
                .transpose()?;
            let params = GetHostfxrParams::new(assembly_path.as_ref(), dotnet_root.as_ref());
            nethost.hostfxr_path(Some(&params))?
        }
    };
    info!("Located hostfxr at {:?}", path);
    Ok(path)
}
