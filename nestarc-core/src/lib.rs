//! # nestarc core
//!
//! Core components for the nestarc archive library.
//!
//! This crate provides the vocabulary shared by every backend:
//!
//! - [`entry`]: the single `Entry` type every container produces
//! - [`format`]: container formats, implementation kinds, suffix and magic detection
//! - [`traits`]: the [`ArchiveAccess`] accessor contract and access modes
//! - [`stream`]: owned byte-stream handles
//! - [`path`]: case-insensitive path comparison for entry names
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Navigation                                              │
//! │     nested-archive resolution, virtual directories      │
//! ├─────────────────────────────────────────────────────────┤
//! │ Facade + Registry                                       │
//! │     (format, implementation) -> accessor constructor    │
//! ├─────────────────────────────────────────────────────────┤
//! │ Accessors                                               │
//! │     ZIP, GZIP member parser, GZIP stream wrapper        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     Entry, Format, ArchiveAccess, ByteStream, paths     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use nestarc_core::format::Format;
//! use nestarc_core::path;
//!
//! assert_eq!(Format::from_file_name("backup.zip.gz"), vec![Format::GZip, Format::Zip]);
//! assert!(path::paths_equal("Roms/Game.ROM", r"roms\game.rom"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod entry;
pub mod error;
pub mod format;
pub mod path;
pub mod stream;
pub mod traits;

// Re-exports for convenience
pub use entry::{CompressionMethod, Entry};
pub use error::{ArchiveError, Result};
pub use format::{ArchiveId, Format, Implementation};
pub use stream::{BoxStream, ByteStream};
pub use traits::{AccessMode, ArchiveAccess, validate_open};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entry::{CompressionMethod, Entry};
    pub use crate::error::{ArchiveError, Result};
    pub use crate::format::{ArchiveId, Format, Implementation};
    pub use crate::stream::{BoxStream, ByteStream};
    pub use crate::traits::{AccessMode, ArchiveAccess};
}
