use std::ops::Deref;
use std::path::PathBuf;
use std::sync::RwLock;

use config::{Config, Environment};
use lazy_static::lazy_static;
use serde::Deserialize;

use super::error::Result;

// CONFIG static variable. It's actually an AppConfig
// inside an RwLock.
lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

/// Ambient application settings: output directory, debug toggle. This is
/// deliberately *not* where scenario topology lives — scenarios are built
/// in-memory by Rust code (spec §6); this only configures where traces and
/// result dumps land and how verbosely the run logs.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/shopsim-out")
}

/// Snapshot of the raw merged config, for subsystems (e.g. logging) that
/// need to deserialize a sub-table of their own rather than the whole
/// [`AppConfig`].
pub fn config() -> Config {
    CONFIG.read().unwrap().deref().clone()
}

impl AppConfig {
    pub fn init(default_config: Option<&str>) -> Result<()> {
        let mut settings = Config::new();

        // Embed file into executable.
        if let Some(config_contents) = default_config {
            settings.merge(config::File::from_str(config_contents, config::FileFormat::Toml))?;
        }

        // Merge settings with env variables.
        settings.merge(Environment::with_prefix("APP"))?;

        // Save Config to RwLock.
        {
            let mut w = CONFIG.write().unwrap();
            *w = settings;
        }

        Ok(())
    }

    pub fn merge_config(config_file: Option<&str>) -> Result<()> {
        if let Some(config_file_path) = config_file {
            {
                CONFIG
                    .write()
                    .unwrap()
                    .merge(config::File::with_name(config_file_path))?;
            }
        }
        Ok(())
    }

    // Set CONFIG
    pub fn set(key: &str, value: &str) -> Result<()> {
        {
            CONFIG.write().unwrap().set(key, value)?;
        }

        Ok(())
    }

    // Get a single value
    pub fn get<'de, T>(key: &'de str) -> Result<T>
    where
        T: serde::Deserialize<'de>,
    {
        Ok(CONFIG.read().unwrap().get::<T>(key)?)
    }

    // Get CONFIG
    //
    // This clones Config (from RwLock<Config>) into a new AppConfig object.
    // This means you have to fetch this again if you changed the
    // configuration.
    pub fn fetch() -> Result<AppConfig> {
        let r = CONFIG.read().unwrap();
        let config_clone = r.deref().clone();
        Ok(config_clone.try_into()?)
    }
}

pub mod prelude {
    pub use super::AppConfig;
}
