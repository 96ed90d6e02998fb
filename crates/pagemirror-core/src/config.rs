use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_batch_reset_delay_ms() -> u64 {
    1000
}

/// Global configuration loaded from `~/.config/pagemirror/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Maximum number of transfers in flight at once.
    pub max_concurrent_downloads: usize,
    /// Root directory all mirrored files are written under. Relative paths
    /// are resolved against the directory `pagemirror serve` runs in.
    pub destination_root: PathBuf,
    /// Delay before batch counters reset to zero after completion, so a
    /// client polling progress can still observe the final count.
    #[serde(default = "default_batch_reset_delay_ms")]
    pub batch_reset_delay_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 5,
            destination_root: PathBuf::from("cloned-project"),
            batch_reset_delay_ms: default_batch_reset_delay_ms(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pagemirror")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MirrorConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MirrorConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MirrorConfig = toml::from_str(&data)?;
    Ok(cfg)
}
