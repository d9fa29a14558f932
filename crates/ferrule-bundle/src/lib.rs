//! Script and stylesheet bundling for the ferrule pipeline.
//!
//! Builds a module graph from the staged sources, runs the ordered transform
//! stages (package interop checks, JSX lowering and type stripping, CSS
//! Modules scoping, environment substitution), and emits a single
//! self-executing script plus a single stylesheet.

pub mod bundler;
pub mod compile;
pub mod css;
pub mod emit;
pub mod graph;
pub mod jsx;
pub mod resolve;
pub mod sourcemap;
pub mod stages;

pub use bundler::{default_named_exports, BundleConfig, BundleError, BundleStats, Bundler};
pub use graph::{Module, ModuleGraph, ModuleId, ModuleKind};
