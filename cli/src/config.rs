use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

use fittrack_core::DEFAULT_POOL_SIZE;

pub struct Config {
    pub db_path: PathBuf,
    pub workers: usize,
}

impl Config {
    /// Resolve settings from the platform data directory, overridden by
    /// `FITTRACK_DB` and `FITTRACK_WORKERS`.
    pub fn load() -> Result<Self> {
        let db_path = match std::env::var_os("FITTRACK_DB") {
            Some(path) => PathBuf::from(path),
            None => {
                let proj_dirs = ProjectDirs::from("", "", "fittrack")
                    .context("Could not determine home directory")?;
                proj_dirs.data_dir().join("fittrack.db")
            }
        };

        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        }

        let workers = parse_workers(std::env::var("FITTRACK_WORKERS").ok().as_deref())?;

        Ok(Config { db_path, workers })
    }
}

fn parse_workers(value: Option<&str>) -> Result<usize> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_POOL_SIZE);
    };
    let workers: usize = raw
        .parse()
        .with_context(|| format!("Invalid FITTRACK_WORKERS '{raw}'. Use a whole number"))?;
    if workers == 0 {
        bail!("FITTRACK_WORKERS must be at least 1");
    }
    Ok(workers)
}
