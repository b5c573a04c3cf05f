//! Opening containers by path or stream.
//!
//! The format comes from the outermost file-name suffix. Files whose names
//! carry no known suffix are sniffed by magic number when they already
//! exist.

use crate::config::ArchiveConfig;
use crate::registry::{OpenRequest, Registry};
use log::debug;
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{Format, Implementation};
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Open a container file with the global registry and default settings.
pub fn open_path(path: impl AsRef<Path>, mode: AccessMode) -> Result<Box<dyn ArchiveAccess>> {
    open_path_with(
        Registry::global(),
        &ArchiveConfig::default(),
        path.as_ref(),
        mode,
        None,
    )
}

/// Open a container file.
///
/// `implementation` overrides the configured and preferred implementation
/// for the detected format.
pub fn open_path_with(
    registry: &Registry,
    config: &ArchiveConfig,
    path: &Path,
    mode: AccessMode,
    implementation: Option<Implementation>,
) -> Result<Box<dyn ArchiveAccess>> {
    let mut file = open_file(path, mode)?;

    let mut format = Format::from_path_suffix(&path.to_string_lossy());
    if format == Format::None && mode != AccessMode::Create {
        let (detected, _) = Format::detect(&mut file)?;
        file.seek(SeekFrom::Start(0))?;
        format = detected;
    }
    if format == Format::None {
        return Err(ArchiveError::not_supported(format!(
            "unrecognised container format: {}",
            path.display()
        )));
    }

    debug!("opening {} as {} ({:?})", path.display(), format, mode);
    open_stream(
        registry,
        config,
        format,
        Box::new(file),
        Some(path.to_path_buf()),
        mode,
        implementation,
    )
}

/// Open a container from an owned stream.
pub fn open_stream(
    registry: &Registry,
    config: &ArchiveConfig,
    format: Format,
    stream: BoxStream,
    root_location: Option<PathBuf>,
    mode: AccessMode,
    implementation: Option<Implementation>,
) -> Result<Box<dyn ArchiveAccess>> {
    let implementation = implementation.or_else(|| config.implementation_for(format));
    let request = OpenRequest {
        stream,
        root_location,
        mode,
        max_gzip_members: config.max_gzip_members,
    };
    registry.open(format, implementation, request)
}

fn open_file(path: &Path, mode: AccessMode) -> Result<File> {
    let file = match mode {
        AccessMode::Read => File::open(path)?,
        AccessMode::Create => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
        AccessMode::Update => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?,
    };
    Ok(file)
}
