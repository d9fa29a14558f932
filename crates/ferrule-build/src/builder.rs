//! The build orchestrator: staging, declarations, static files and the
//! bundle, in dependency order.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use tracing::info;

use ferrule_bundle::{BundleConfig, BundleError, Bundler};
use ferrule_style::{transpile_tree, StyleError};

use crate::config::BuildConfig;
use crate::copy;

/// Errors that can occur during a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error("build task failed: {0}")]
    Task(String),
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildResult {
    /// Stylesheets transpiled into the staging tree.
    pub stylesheets: usize,

    /// Script sources copied into the staging tree.
    pub sources: usize,

    /// Declaration files written next to the stylesheets.
    pub declarations: usize,

    /// Static files copied to the output tree.
    pub static_files: usize,

    /// Modules in the bundle.
    pub modules: usize,

    /// Total build time in milliseconds.
    pub duration_ms: u64,

    /// Output directory.
    pub output_dir: PathBuf,
}

pub struct Builder {
    config: BuildConfig,
}

impl Builder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline.
    ///
    /// Stylesheet transpilation and source staging run concurrently; the
    /// declaration files wait on the stylesheets, and the bundle waits on
    /// the whole staging tree.
    pub async fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let source_root = self.config.source_root();
        if !source_root.is_dir() {
            return Err(BuildError::Read {
                path: source_root.display().to_string(),
                message: "source directory not found".to_string(),
            });
        }

        let staging_root = self.config.staging_root();
        fs::create_dir_all(&staging_root).map_err(|e| BuildError::Write {
            path: staging_root.display().to_string(),
            message: e.to_string(),
        })?;

        let (stylesheets, sources) = tokio::try_join!(
            blocking({
                let (source, staging) = (source_root.clone(), staging_root.clone());
                move || transpile_tree(&source, &staging).map_err(BuildError::from)
            }),
            blocking({
                let (source, staging) = (source_root.clone(), staging_root.clone());
                move || copy::stage_sources(&source, &staging)
            }),
        )?;

        let declarations = blocking({
            let staging = staging_root.clone();
            move || ferrule_style::dts::write_declarations(&staging).map_err(BuildError::from)
        })
        .await?;

        info!(stylesheets, sources, declarations, "staging tree ready");

        let bundle_config = self.bundle_config();
        let (static_files, stats) = tokio::try_join!(
            blocking({
                let (source, output) = (source_root.clone(), self.config.output_root());
                let (html, assets) = (self.config.html.clone(), self.config.assets_dir.clone());
                move || copy::copy_static(&source, &output, &html, &assets)
            }),
            blocking(move || Bundler::new(bundle_config).bundle().map_err(BuildError::from)),
        )?;

        let duration = start.elapsed();
        info!(
            modules = stats.modules,
            script_bytes = stats.script_bytes,
            stylesheet_bytes = stats.stylesheet_bytes,
            duration_ms = duration.as_millis() as u64,
            "build finished"
        );

        Ok(BuildResult {
            stylesheets,
            sources,
            declarations,
            static_files,
            modules: stats.modules,
            duration_ms: duration.as_millis() as u64,
            output_dir: self.config.output_root(),
        })
    }

    fn bundle_config(&self) -> BundleConfig {
        let stem = self
            .config
            .entry
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("index")
            .to_string();
        let output = self.config.output_root();

        BundleConfig::new(self.config.staging_root(), self.config.packages_root())
            .cache_root(self.config.cache_root())
            .entry(self.config.entry.clone())
            .outputs(
                output.join(format!("{stem}.js")),
                output.join(format!("{stem}.css")),
            )
            .node_env(self.config.node_env.clone())
            .minify(self.config.minify)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, BuildError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BuildError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BuildError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture(temp: &tempfile::TempDir) -> BuildConfig {
        let root = temp.path();
        write(
            &root.join("node_modules/react/package.json"),
            r#"{ "main": "index.js" }"#,
        );
        write(
            &root.join("node_modules/react/index.js"),
            "module.exports = { createElement: function () {}, Component: function () {} };\n",
        );
        write(
            &root.join("node_modules/react-dom/package.json"),
            r#"{ "main": "index.js" }"#,
        );
        write(
            &root.join("node_modules/react-dom/index.js"),
            "module.exports = { render: function () {} };\n",
        );

        write(
            &root.join("src/index.tsx"),
            "import * as React from 'react';\nimport { render } from 'react-dom';\nimport { Hello } from './Hello';\nrender(<Hello />, document.getElementById('app'));\n",
        );
        write(
            &root.join("src/Hello/index.tsx"),
            "import * as React from 'react';\nimport style from './index.css';\nexport const Hello = () => <h1 className={style.hello}>Hi</h1>;\n",
        );
        write(&root.join("src/Hello/index.styl"), ".hello\n  color red\n");
        write(&root.join("src/index.html"), "<html><div id=\"app\"></div></html>\n");
        write(&root.join("src/assets/logo.svg"), "<svg/>\n");

        BuildConfig::new(root)
    }

    #[tokio::test]
    async fn builds_a_full_project() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(&temp);

        let result = Builder::new(config.clone()).build().await.unwrap();

        assert_eq!(result.stylesheets, 1);
        assert_eq!(result.sources, 2);
        assert_eq!(result.declarations, 1);
        assert_eq!(result.static_files, 2);

        // Staging tree.
        assert!(config.staging_root().join("Hello/index.css").is_file());
        assert!(config.staging_root().join("Hello/index.css.d.ts").is_file());

        // Outputs.
        let script = fs::read_to_string(config.output_root().join("index.js")).unwrap();
        assert!(script.starts_with("(function () {"), "{script}");
        let css = fs::read_to_string(config.output_root().join("index.css")).unwrap();
        assert!(css.contains("index_hello_"), "{css}");
        assert!(config.output_root().join("index.html").is_file());
        assert!(config.output_root().join("assets/logo.svg").is_file());
    }

    #[tokio::test]
    async fn rebuild_is_byte_identical() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(&temp);
        let builder = Builder::new(config.clone());

        builder.build().await.unwrap();
        let first_js = fs::read(config.output_root().join("index.js")).unwrap();
        let first_css = fs::read(config.output_root().join("index.css")).unwrap();

        builder.build().await.unwrap();
        let second_js = fs::read(config.output_root().join("index.js")).unwrap();
        let second_css = fs::read(config.output_root().join("index.css")).unwrap();

        assert_eq!(first_js, second_js);
        assert_eq!(first_css, second_css);
    }

    #[tokio::test]
    async fn broken_stylesheet_fails_before_any_output() {
        let temp = tempfile::tempdir().unwrap();
        let config = fixture(&temp);
        write(
            &config.source_root().join("Hello/index.styl"),
            ".hello\n      color red\n  broken\n",
        );

        let err = Builder::new(config.clone()).build().await.unwrap_err();

        assert!(matches!(err, BuildError::Style(_)), "{err}");
        assert!(!config.output_root().join("index.js").exists());
    }

    #[tokio::test]
    async fn missing_source_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = BuildConfig::new(temp.path());

        let err = Builder::new(config).build().await.unwrap_err();
        assert!(matches!(err, BuildError::Read { .. }), "{err}");
    }
}
