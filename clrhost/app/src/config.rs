use anyhow::Result;
use log::info;
use netclr::SessionOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub assembly: PathBuf,
    /// Assembly-qualified, e.g. `Demo.Lib, Demo`.
    pub type_name: String,
    pub method: String,
    /// Managed delegate type to expose the method as. Unset means the
    /// default `int (IntPtr, int)` entry point signature.
    #[serde(default)]
    pub delegate_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub runtime_config: PathBuf,
    pub hostfxr_path: Option<PathBuf>,
    pub dotnet_root: Option<PathBuf>,
    pub host_path: Option<PathBuf>,
    /// Applied with set-property before anything runs.
    pub properties: BTreeMap<String, String>,
    pub entry: Option<EntryConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_config: PathBuf::from("app.runtimeconfig.json"),
            hostfxr_path: None,
            dotnet_root: None,
            host_path: None,
            properties: BTreeMap::new(),
            entry: None,
        }
    }
}

impl HostConfig {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            host_path: self.host_path.clone(),
            dotnet_root: self.dotnet_root.clone(),
            hostfxr_path: self.hostfxr_path.clone(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<HostConfig> {
    if path.exists() {
        info!("Loading config from {:?}", path);
        let file = fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    } else {
        info!("Config not found. Creating default at {:?}", path);
        let config = HostConfig::default();
        let file = fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &config)?;
        Ok(config)
    }
}
