//! Stylesheet tooling for the ferrule pipeline.
//!
//! Transpiles the stylus-subset sources to plain CSS and derives the typed
//! class-name map both the declaration files and the bundler share.

pub mod classmap;
pub mod dts;
pub mod transpile;

pub use classmap::{camel_case_class, class_identifiers, extract_class_names};
pub use transpile::{transpile, transpile_tree, StyleError, SyntaxError};
