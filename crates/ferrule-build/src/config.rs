//! Build configuration.
//!
//! Every directory the pipeline touches is named here and threaded through
//! explicitly; no step hard-codes a path.

use std::path::{Path, PathBuf};

/// Configuration for a full pipeline run. Directory fields are relative to
/// `root` unless given as absolute paths.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root the relative directories resolve against.
    pub root: PathBuf,

    /// Source tree with `.tsx`/`.ts`/`.styl` files and static assets.
    pub source_dir: PathBuf,

    /// Staging tree for transpiled CSS, declarations and copied sources.
    pub staging_dir: PathBuf,

    /// Output directory for the bundle and static files.
    pub output_dir: PathBuf,

    /// Compile cache directory.
    pub cache_dir: PathBuf,

    /// Installed packages directory.
    pub packages_dir: PathBuf,

    /// Entry module, relative to the source root.
    pub entry: PathBuf,

    /// The HTML shell copied to the output directory.
    pub html: PathBuf,

    /// Static assets directory inside the source tree.
    pub assets_dir: PathBuf,

    /// Minify the output CSS.
    pub minify: bool,

    /// Value substituted for `process.env.NODE_ENV` in the bundle.
    pub node_env: Option<String>,
}

impl BuildConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_dir: PathBuf::from("src"),
            staging_dir: PathBuf::from("build"),
            output_dir: PathBuf::from("dist"),
            cache_dir: PathBuf::from(".ferrule-cache"),
            packages_dir: PathBuf::from("node_modules"),
            entry: PathBuf::from("index.tsx"),
            html: PathBuf::from("index.html"),
            assets_dir: PathBuf::from("assets"),
            minify: true,
            node_env: None,
        }
    }

    pub fn source_root(&self) -> PathBuf {
        self.resolve(&self.source_dir)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.resolve(&self.staging_dir)
    }

    pub fn output_root(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }

    pub fn packages_root(&self) -> PathBuf {
        self.resolve(&self.packages_dir)
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_relative_directories_against_root() {
        let config = BuildConfig::new("/project");
        assert_eq!(config.source_root(), PathBuf::from("/project/src"));
        assert_eq!(config.staging_root(), PathBuf::from("/project/build"));
        assert_eq!(config.output_root(), PathBuf::from("/project/dist"));
        assert_eq!(config.cache_root(), PathBuf::from("/project/.ferrule-cache"));
    }

    #[test]
    fn keeps_absolute_directories() {
        let mut config = BuildConfig::new("/project");
        config.output_dir = PathBuf::from("/elsewhere/out");
        assert_eq!(config.output_root(), PathBuf::from("/elsewhere/out"));
    }
}
