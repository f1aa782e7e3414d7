//! Enumerate DNA-encoded library members from a reaction catalog and
//! per-position building-block whitelists.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use del_library::{
//!     chemistry::CommandReactor,
//!     config::Config,
//!     library::{enumerate_library, EnumerateOptions},
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_path(Path::new("config.yaml"))?;
//! let reactor = CommandReactor::spawn("python", &["rdkit_reactor.py"])?;
//! let outcome = enumerate_library(&config, Some(&reactor), &EnumerateOptions::default())?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

// Typed reaction graphs, node roles and attribute overlays
pub mod graph;

// Reaction application and structure parsing
pub mod chemistry;

// Experiment configuration
pub mod config;

// Cartesian product over whitelists, candidate edges per combination
pub mod enumerate;

// Single-terminal check on per-combination subgraphs
pub mod validate;

// The hard bit: resolve every reaction of a combination
pub mod complete;

// Records, the library table and the run driver
pub mod library;

// Graphviz output
pub mod visualize;

// Utility functions
mod utils;

// Python library
#[cfg(feature = "python")]
pub mod python;
