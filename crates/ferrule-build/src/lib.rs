//! Build orchestration for the ferrule pipeline.
//!
//! Ties the stylesheet tooling and the bundler together: transpiles and
//! stages the source tree, writes the typed declarations, copies static
//! files, and produces the bundled outputs.

pub mod builder;
pub mod clean;
pub mod config;
pub mod copy;

pub use builder::{BuildError, BuildResult, Builder};
pub use clean::clean;
pub use config::BuildConfig;
