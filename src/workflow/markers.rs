//! Completion Markers
//!
//! Every job records success by leaving a zero-byte sentinel file at
//! `data/<region>/snakemake_log/<stage>.done`. The presence and modification
//! time of these files is the only state the runner consults between runs.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;

use crate::error::{PipelineError, Result};

use super::model::Region;

/// Top-level directory holding per-region data.
pub const DATA_DIR: &str = "data";

/// Per-region directory holding completion markers.
pub const LOG_DIR: &str = "snakemake_log";

/// Returns the directory holding markers for `region`, relative to the
/// working directory.
pub fn marker_dir(region: &str) -> PathBuf {
    PathBuf::from(format!("{}/{}/{}", DATA_DIR, region, LOG_DIR))
}

/// Returns the marker file path for `region` and `filename`.
///
/// Neither argument is validated or normalized: the result is always the
/// literal `data/<region>/snakemake_log/<filename>`. Region names are checked
/// once when they are loaded.
///
/// # Example
///
/// ```
/// use regionrunner::workflow::markers::marker_path;
///
/// let path = marker_path("Beijing", "suitability.done");
/// assert_eq!(path.to_str(), Some("data/Beijing/snakemake_log/suitability.done"));
/// ```
pub fn marker_path(region: &str, filename: &str) -> PathBuf {
    PathBuf::from(format!("{}/{}/{}/{}", DATA_DIR, region, LOG_DIR, filename))
}

/// Creates the marker directory of every region under `root`.
///
/// Runs once before the job graph is evaluated. Existing directories are
/// left untouched, so calling this repeatedly is a no-op.
pub fn prepare_marker_dirs(root: &Path, regions: &[Region]) -> Result<()> {
    for region in regions {
        let dir = root.join(marker_dir(region.as_str()));
        fs::create_dir_all(&dir).map_err(|source| PipelineError::Marker {
            path: dir.clone(),
            source,
        })?;
        debug!("Marker directory ready: {}", dir.display());
    }
    Ok(())
}

/// Creates or refreshes a zero-byte marker file.
///
/// The modification time is always set to now, so a refreshed marker is
/// never older than the markers it was derived from.
pub fn touch_marker(path: &Path) -> Result<()> {
    let io_err = |source| PipelineError::Marker {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(io_err)?;
    file.set_modified(SystemTime::now()).map_err(io_err)?;

    debug!("Touched marker: {}", path.display());
    Ok(())
}
