//! # nestarc archive
//!
//! Container accessors, the format registry and nested-archive navigation.
//!
//! - **ZIP**: central-directory reader with ZIP64 and local-header fallback,
//!   plus a writer for stored and DEFLATE entries
//! - **GZIP**: a member scanner that exposes every member of a concatenated
//!   stream as an entry, and a thin single-entry stream wrapper
//! - **Registry**: maps `(Format, Implementation)` to accessor constructors
//! - **Nested navigation**: lists and reads through containers stored inside
//!   other containers
//!
//! ## Example
//!
//! ```rust,no_run
//! use nestarc_archive::{nested, open_path};
//! use nestarc_core::traits::AccessMode;
//!
//! let mut archive = open_path("bundle.zip", AccessMode::Read).unwrap();
//! for entry in nested::list_entries(archive.as_mut(), "", false, true).unwrap() {
//!     println!("{}", entry);
//! }
//! ```
//!
//! ## Format Detection
//!
//! [`open_path`] picks the format from the outermost file-name suffix and
//! falls back to magic-number detection for unsuffixed files.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod gzip;
pub mod nested;
pub mod open;
pub mod registry;
pub mod zip;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::ArchiveConfig;
pub use gzip::{GzipArchive, GzipHeader, GzipMember, GzipStream};
pub use nested::{NestedArchive, Navigator};
pub use open::{open_path, open_path_with, open_stream};
pub use registry::{Constructor, OpenRequest, Registry};
pub use zip::{LocalFileHeader, ZipArchive, ZipCompressionLevel, ZipReader, ZipWriter};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ArchiveConfig;
    pub use crate::nested::{Navigator, NestedArchive};
    pub use crate::open::{open_path, open_path_with};
    pub use crate::registry::Registry;
    pub use nestarc_core::prelude::*;
}
