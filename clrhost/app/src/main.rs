mod config;

use anyhow::{bail, Context, Result};
use config::{load_config, EntryConfig};
use log::{debug, info, warn};
use netclr::{HostSession, ManagedFunction};
use std::path::PathBuf;

fn run_entry(session: &HostSession, entry: &EntryConfig) -> Result<()> {
    let function = session
        .load_assembly_and_get_function_pointer(
            &entry.assembly,
            &entry.type_name,
            &entry.method,
            entry.delegate_type.as_deref(),
        )
        .with_context(|| format!("Failed to resolve {}::{}", entry.type_name, entry.method))?;

    match function {
        ManagedFunction::EntryPoint(entry_point) => {
            info!("Invoking {}::{}", entry.type_name, entry.method);
            let result = unsafe { entry_point.call(std::ptr::null_mut(), 0) };
            info!("{} returned {}", entry.method, result);
        }
        ManagedFunction::Delegate(delegate) => {
            // The signature of a custom delegate is unknown here.
            warn!(
                "Resolved {} as {:?}; not invoking a custom delegate type",
                entry.method, delegate
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut config_path = PathBuf::from("clrhost.json");
    let mut list_only = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .context("--config needs a path")?;
            }
            "--list-only" => list_only = true,
            other => bail!("Unknown argument: {}", other),
        }
    }

    let config = load_config(&config_path)?;
    debug!("Loaded Config: {:?}", config);

    let mut session = HostSession::with_options(&config.runtime_config, &config.session_options())
        .with_context(|| format!("Failed to initialize runtime from {:?}", config.runtime_config))?;

    for (key, value) in &config.properties {
        session
            .set_runtime_property(key, value)
            .with_context(|| format!("Failed to set runtime property {}", key))?;
    }

    for property in session.get_runtime_properties()? {
        println!("{} = {}", property.key, property.value);
    }

    match (&config.entry, list_only) {
        (Some(entry), false) => run_entry(&session, entry)?,
        (None, false) => info!("No entry configured. Nothing to invoke."),
        (_, true) => {}
    }

    session.close();
    Ok(())
}
