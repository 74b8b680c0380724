//! `pvz-loadtest init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

use pvz_loadtest::loadtest::presets::starter_toml;

use super::{CONFIG_DIR, CONFIG_FILE};

/// Execute the `init` command in the current directory.
pub fn execute_init(force: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let path = write_starter_config(&cwd, force)?;
    eprintln!("Created {}", path.display());
    eprintln!("Edit the file to customize your load test scenarios.");
    Ok(())
}

/// Write the starter config under `base_dir`, refusing to clobber an
/// existing file unless `force` is set.
fn write_starter_config(base_dir: &Path, force: bool) -> Result<PathBuf> {
    let config_dir = base_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, starter_toml())?;
    Ok(config_path)
}
