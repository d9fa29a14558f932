//! Project build command.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ferrule_build::{BuildConfig, Builder};
use serde::Deserialize;

/// Configuration file structure (ferrule.toml).
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    build: BuildSettings,
}

#[derive(Debug, Deserialize)]
struct PathsConfig {
    #[serde(default = "default_source")]
    source: String,
    #[serde(default = "default_staging")]
    staging: String,
    #[serde(default = "default_output")]
    output: String,
    #[serde(default = "default_cache")]
    cache: String,
    #[serde(default = "default_packages")]
    packages: String,
}

#[derive(Debug, Deserialize)]
struct BuildSettings {
    #[serde(default = "default_entry")]
    entry: String,
    #[serde(default = "default_html")]
    html: String,
    #[serde(default = "default_assets")]
    assets: String,
    #[serde(default = "default_minify")]
    minify: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            staging: default_staging(),
            output: default_output(),
            cache: default_cache(),
            packages: default_packages(),
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            html: default_html(),
            assets: default_assets(),
            minify: default_minify(),
        }
    }
}

fn default_source() -> String {
    "src".to_string()
}
fn default_staging() -> String {
    "build".to_string()
}
fn default_output() -> String {
    "dist".to_string()
}
fn default_cache() -> String {
    ".ferrule-cache".to_string()
}
fn default_packages() -> String {
    "node_modules".to_string()
}
fn default_entry() -> String {
    "index.tsx".to_string()
}
fn default_html() -> String {
    "index.html".to_string()
}
fn default_assets() -> String {
    "assets".to_string()
}
fn default_minify() -> bool {
    true
}

/// Load ferrule.toml if it exists and fold it into a build configuration.
/// Returns an error if the config file exists but is malformed.
pub(super) fn load_build_config(root: &Path, config_path: &Path) -> Result<BuildConfig> {
    let config_path = if config_path.is_absolute() {
        config_path.to_path_buf()
    } else {
        root.join(config_path)
    };

    let file_config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e)
        })?;
        let parsed: ConfigFile = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse {}: {}", config_path.display(), e)
        })?;
        tracing::info!("Loaded config from {}", config_path.display());
        parsed
    } else {
        ConfigFile::default()
    };

    let mut config = BuildConfig::new(root);
    config.source_dir = PathBuf::from(&file_config.paths.source);
    config.staging_dir = PathBuf::from(&file_config.paths.staging);
    config.output_dir = PathBuf::from(&file_config.paths.output);
    config.cache_dir = PathBuf::from(&file_config.paths.cache);
    config.packages_dir = PathBuf::from(&file_config.paths.packages);
    config.entry = PathBuf::from(&file_config.build.entry);
    config.html = PathBuf::from(&file_config.build.html);
    config.assets_dir = PathBuf::from(&file_config.build.assets);
    config.minify = file_config.build.minify;
    config.node_env = env::var("NODE_ENV").ok();

    Ok(config)
}

/// Run the build command.
pub async fn run(root: PathBuf, config_path: PathBuf, minify: Option<bool>) -> Result<()> {
    tracing::info!("Building project...");

    let mut config = load_build_config(&root, &config_path)?;
    if let Some(minify) = minify {
        config.minify = minify;
    }

    let result = Builder::new(config).build().await?;

    tracing::info!(
        "Staged {} sources and {} stylesheets, bundled {} modules in {}ms",
        result.sources,
        result.stylesheets,
        result.modules,
        result.duration_ms
    );

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
