//! The bundler entry point: builds the module graph, runs the transform
//! stages in order, and writes the two outputs only once every stage has
//! succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::emit;
use crate::resolve::Resolver;
use crate::stages::{pipeline, BundleState};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("cannot resolve '{specifier}' imported by {importer}")]
    Resolve { specifier: String, importer: String },

    #[error("'{name}' is not a known named export of package '{package}' (imported by {importer})")]
    MissingNamedExport {
        package: String,
        name: String,
        importer: String,
    },

    #[error("stylesheet {path}: {message}")]
    Css { path: String, message: String },

    #[error("compile failed in {path}: {message}")]
    Compile { path: String, message: String },

    #[error("emit failed: {message}")]
    Emit { message: String },
}

/// Everything the bundler needs to know, handed in explicitly by the build
/// orchestrator.
#[derive(Debug, Clone)]
pub struct BundleConfig {
    pub staging_root: PathBuf,
    pub packages_root: PathBuf,
    pub cache_root: PathBuf,
    /// Entry module, relative to the staging root.
    pub entry: PathBuf,
    pub output_script: PathBuf,
    pub output_stylesheet: PathBuf,
    /// Replacement for `process.env.NODE_ENV`; `None` means `undefined`.
    pub node_env: Option<String>,
    pub minify: bool,
    /// Named exports vouched for per CommonJS package.
    pub named_exports: IndexMap<String, Vec<String>>,
}

impl BundleConfig {
    pub fn new(staging_root: impl Into<PathBuf>, packages_root: impl Into<PathBuf>) -> Self {
        let staging_root = staging_root.into();
        Self {
            cache_root: PathBuf::from(".ferrule-cache"),
            entry: PathBuf::from("index.tsx"),
            output_script: PathBuf::from("dist/index.js"),
            output_stylesheet: PathBuf::from("dist/index.css"),
            node_env: None,
            minify: true,
            named_exports: default_named_exports(),
            staging_root,
            packages_root: packages_root.into(),
        }
    }

    pub fn cache_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_root = path.into();
        self
    }

    pub fn entry(mut self, path: impl Into<PathBuf>) -> Self {
        self.entry = path.into();
        self
    }

    pub fn outputs(
        mut self,
        script: impl Into<PathBuf>,
        stylesheet: impl Into<PathBuf>,
    ) -> Self {
        self.output_script = script.into();
        self.output_stylesheet = stylesheet.into();
        self
    }

    pub fn node_env(mut self, value: Option<String>) -> Self {
        self.node_env = value;
        self
    }

    pub fn minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }
}

/// The packages whose CommonJS builds are known to carry these properties.
pub fn default_named_exports() -> IndexMap<String, Vec<String>> {
    let mut map = IndexMap::new();
    map.insert("react-dom".to_string(), vec!["render".to_string()]);
    map.insert(
        "react".to_string(),
        vec!["createElement".to_string(), "Component".to_string()],
    );
    map
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleStats {
    pub modules: usize,
    pub script_bytes: usize,
    pub stylesheet_bytes: usize,
}

pub struct Bundler {
    config: BundleConfig,
}

impl Bundler {
    pub fn new(config: BundleConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline. Nothing is written unless every stage and the
    /// emitter succeed, so a failed build never leaves partial outputs.
    pub fn bundle(&self) -> Result<BundleStats, BundleError> {
        let entry = self.config.staging_root.join(&self.config.entry);
        let resolver = Resolver::new(&self.config.staging_root, &self.config.packages_root);

        let graph = resolver.build_graph(&entry)?;
        info!(modules = graph.len(), entry = %entry.display(), "module graph built");

        let mut state = BundleState::new(graph);
        for stage in pipeline() {
            debug!(stage = stage.name(), "running stage");
            stage.run(&mut state, &self.config)?;
        }

        let script = emit::emit(&state.graph).map_err(|message| BundleError::Emit { message })?;
        let stylesheet = state.stylesheet.unwrap_or_default();

        write_output(&self.config.output_script, &script)?;
        write_output(&self.config.output_stylesheet, &stylesheet)?;

        Ok(BundleStats {
            modules: state.graph.len(),
            script_bytes: script.len(),
            stylesheet_bytes: stylesheet.len(),
        })
    }
}

fn write_output(path: &Path, contents: &str) -> Result<(), BundleError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BundleError::Write {
            path: parent.display().to_string(),
            message: e.to_string(),
        })?;
    }
    fs::write(path, contents).map_err(|e| BundleError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
