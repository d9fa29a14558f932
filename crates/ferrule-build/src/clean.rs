//! Removes everything a build produces: the staging tree, the output tree
//! and the compile cache.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::info;

use crate::builder::BuildError;
use crate::config::BuildConfig;

/// Delete the generated directories. Directories that do not exist are
/// skipped; the returned list holds what was actually removed.
pub fn clean(config: &BuildConfig) -> Result<Vec<PathBuf>, BuildError> {
    let targets = [
        config.staging_root(),
        config.output_root(),
        config.cache_root(),
    ];

    let mut removed = Vec::new();
    for target in targets {
        match fs::remove_dir_all(&target) {
            Ok(()) => {
                info!(path = %target.display(), "removed");
                removed.push(target);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BuildError::Write {
                    path: target.display().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(removed)
}
