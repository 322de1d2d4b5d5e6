//! # genome-release
//!
//! Turns normalized genomic collections into release documents: donor
//! clinical trees, mutation occurrences and the fifteen searchable document
//! types built from them.
//!
//! ## Usage
//!
//! ```bash
//! genome-release [-v] [-c release.yml] <registry|join|index|export>
//! ```
//!
//! ## Modules
//!
//! - `model` - records, join keys and collection names
//! - `join` - left-outer and combine joins, clinical and observation joins
//! - `consequence` - severity ranking and per-transcript aggregation
//! - `broadcast` - read-only lookup tables shared by every partition
//! - `document` - document type registry, field projection and assembly
//! - `sink` - per-partition writer lifecycle and destinations
//! - `pipeline` - partitioned stage execution
//! - `release` - file-backed runs used by the CLI
//! - `config` - release configuration
//! - `io` - JSON-lines collection files
pub mod broadcast;
pub mod config;
pub mod consequence;
pub mod document;
pub mod error;
pub mod io;
pub mod join;
pub mod model;
pub mod pipeline;
pub mod release;
pub mod sink;

pub use error::{ReleaseError, ReleaseResult};
