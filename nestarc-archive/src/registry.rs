//! Format/implementation registry.
//!
//! Maps an [`ArchiveId`] to the constructor that opens an accessor for it.
//! Lookups try the exact pair first and then the format's `Any` slot, so a
//! caller can install a catch-all backend for a format without naming an
//! implementation kind.

use crate::gzip::{GzipArchive, GzipStream};
use crate::zip::ZipArchive;
use log::debug;
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{ArchiveId, Format, Implementation};
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Everything a constructor needs to open one accessor.
pub struct OpenRequest {
    /// Stream the accessor takes ownership of.
    pub stream: BoxStream,
    /// File-system location of the container, if any.
    pub root_location: Option<PathBuf>,
    /// Access mode.
    pub mode: AccessMode,
    /// Bound on GZIP member discovery; negative scans everything.
    pub max_gzip_members: i64,
}

impl OpenRequest {
    /// Request to open `stream` with no root location and no member bound.
    pub fn new(stream: BoxStream, mode: AccessMode) -> Self {
        Self {
            stream,
            root_location: None,
            mode,
            max_gzip_members: -1,
        }
    }

    /// Attach the container's file-system location.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_location = Some(root.into());
        self
    }

    /// Bound GZIP member discovery.
    pub fn with_max_gzip_members(mut self, max: i64) -> Self {
        self.max_gzip_members = max;
        self
    }
}

/// Opens an accessor from a request.
pub type Constructor = Arc<dyn Fn(OpenRequest) -> Result<Box<dyn ArchiveAccess>> + Send + Sync>;

/// Thread-safe table of accessor constructors.
pub struct Registry {
    table: RwLock<BTreeMap<ArchiveId, Constructor>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry holding the built-in ZIP and GZIP backends.
    ///
    /// `(Zip, Native)`, `(GZip, Native)` and `(GZip, Stream)` are
    /// registered, and the `Any` slots of both formats point at the native
    /// backends.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let mut table = registry.table.write();

        let zip: Constructor = Arc::new(|req: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
            Ok(Box::new(ZipArchive::new(req.stream, req.root_location, req.mode)?))
        });
        let gzip: Constructor = Arc::new(|req: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
            Ok(Box::new(GzipArchive::new(
                req.stream,
                req.root_location,
                req.mode,
                req.max_gzip_members,
            )?))
        });
        let gzip_stream: Constructor =
            Arc::new(|req: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
                Ok(Box::new(GzipStream::new(req.stream, req.root_location, req.mode)?))
            });

        table.insert(ArchiveId::new(Format::Zip, Implementation::Native), zip.clone());
        table.insert(ArchiveId::any(Format::Zip), zip);
        table.insert(ArchiveId::new(Format::GZip, Implementation::Native), gzip.clone());
        table.insert(ArchiveId::any(Format::GZip), gzip);
        table.insert(
            ArchiveId::new(Format::GZip, Implementation::Stream),
            gzip_stream,
        );

        drop(table);
        registry
    }

    /// The process-wide registry, built with the built-ins on first use.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::with_builtins)
    }

    /// Register a constructor for a concrete format and implementation.
    ///
    /// Returns `false` when the slot is already taken; the existing
    /// constructor is kept.
    pub fn register<F>(
        &self,
        format: Format,
        implementation: Implementation,
        constructor: F,
    ) -> Result<bool>
    where
        F: Fn(OpenRequest) -> Result<Box<dyn ArchiveAccess>> + Send + Sync + 'static,
    {
        if format == Format::None {
            return Err(ArchiveError::out_of_range("format", format));
        }
        if matches!(implementation, Implementation::None | Implementation::Any) {
            return Err(ArchiveError::out_of_range("implementation", implementation));
        }
        Ok(self.insert(ArchiveId::new(format, implementation), Arc::new(constructor)))
    }

    /// Register the catch-all constructor for a format, used when no exact
    /// implementation matches.
    pub fn register_fallback<F>(&self, format: Format, constructor: F) -> Result<bool>
    where
        F: Fn(OpenRequest) -> Result<Box<dyn ArchiveAccess>> + Send + Sync + 'static,
    {
        if format == Format::None {
            return Err(ArchiveError::out_of_range("format", format));
        }
        Ok(self.insert(ArchiveId::any(format), Arc::new(constructor)))
    }

    fn insert(&self, id: ArchiveId, constructor: Constructor) -> bool {
        let mut table = self.table.write();
        if table.contains_key(&id) {
            debug!("{} already registered", id);
            return false;
        }
        table.insert(id, constructor);
        debug!("registered {}", id);
        true
    }

    /// Find the constructor for a format.
    ///
    /// Without an explicit implementation the format's preferred one is
    /// used. The exact pair is tried first, then the `Any` slot.
    pub fn resolve(
        &self,
        format: Format,
        implementation: Option<Implementation>,
    ) -> Result<(ArchiveId, Constructor)> {
        let implementation = implementation
            .filter(|i| *i != Implementation::None)
            .unwrap_or_else(|| format.preferred_implementation());
        let exact = ArchiveId::new(format, implementation);

        let table = self.table.read();
        let found = table
            .get_key_value(&exact)
            .or_else(|| table.get_key_value(&ArchiveId::any(format)));
        match found {
            Some((id, constructor)) => {
                debug!("resolved {} to {}", exact, id);
                Ok((*id, constructor.clone()))
            }
            None => Err(ArchiveError::no_implementation(format, implementation)),
        }
    }

    /// Resolve and construct an accessor.
    pub fn open(
        &self,
        format: Format,
        implementation: Option<Implementation>,
        request: OpenRequest,
    ) -> Result<Box<dyn ArchiveAccess>> {
        let (_, constructor) = self.resolve(format, implementation)?;
        constructor(request)
    }

    /// Whether any constructor is registered for a format.
    pub fn is_supported(&self, format: Format) -> bool {
        format != Format::None && self.table.read().keys().any(|id| id.format == format)
    }

    /// All registered identifiers, in order.
    pub fn registered(&self) -> Vec<ArchiveId> {
        self.table.read().keys().copied().collect()
    }

    /// Formats with at least one constructor.
    pub fn supported_formats(&self) -> Vec<Format> {
        let mut formats: Vec<Format> = self.registered().into_iter().map(|id| id.format).collect();
        formats.dedup();
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn one_entry_zip() -> BoxStream {
        let mut writer = crate::zip::ZipWriter::new(Vec::new());
        writer.add_file("only.txt", b"x").unwrap();
        Box::new(Cursor::new(writer.finish().unwrap()))
    }

    #[test]
    fn test_register_rejects_none_and_any() {
        let registry = Registry::new();
        let ctor = |_: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
            Err(ArchiveError::not_supported("test"))
        };
        assert!(matches!(
            registry.register(Format::None, Implementation::Native, ctor),
            Err(ArchiveError::ArgumentOutOfRange { .. })
        ));
        assert!(matches!(
            registry.register(Format::Zip, Implementation::Any, ctor),
            Err(ArchiveError::ArgumentOutOfRange { .. })
        ));
        assert!(matches!(
            registry.register(Format::Zip, Implementation::None, ctor),
            Err(ArchiveError::ArgumentOutOfRange { .. })
        ));
        assert!(registry.registered().is_empty());
    }

    #[test]
    fn test_reregistration_rejected() {
        let registry = Registry::new();
        let first = |_: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
            Err(ArchiveError::not_supported("first"))
        };
        let second = |_: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
            Err(ArchiveError::not_supported("second"))
        };
        assert!(registry.register(Format::Tar, Implementation::Native, first).unwrap());
        assert!(!registry.register(Format::Tar, Implementation::Native, second).unwrap());

        let err = registry
            .open(Format::Tar, None, OpenRequest::new(one_entry_zip(), AccessMode::Read))
            .err()
            .unwrap();
        assert!(err.to_string().contains("first"));
    }

    #[test]
    fn test_fallback_slot() {
        let registry = Registry::new();
        registry
            .register_fallback(Format::Zip, |req: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
                Ok(Box::new(ZipArchive::new(req.stream, req.root_location, req.mode)?))
            })
            .unwrap();

        let (id, _) = registry.resolve(Format::Zip, None).unwrap();
        assert_eq!(id, ArchiveId::any(Format::Zip));

        let mut access = registry
            .open(Format::Zip, None, OpenRequest::new(one_entry_zip(), AccessMode::Read))
            .unwrap();
        assert_eq!(access.entries().unwrap()[0].name, "only.txt");
    }

    #[test]
    fn test_missing_implementation() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve(Format::BZip2, None),
            Err(ArchiveError::NoImplementation { .. })
        ));
        assert!(!registry.is_supported(Format::BZip2));
    }

    #[test]
    fn test_builtins() {
        let registry = Registry::with_builtins();
        assert!(registry.is_supported(Format::Zip));
        assert!(registry.is_supported(Format::GZip));
        assert!(!registry.is_supported(Format::Tar));
        assert!(!registry.is_supported(Format::None));
        assert_eq!(
            registry.supported_formats(),
            vec![Format::Zip, Format::GZip]
        );

        let (id, _) = registry
            .resolve(Format::GZip, Some(Implementation::Stream))
            .unwrap();
        assert_eq!(id.implementation, Implementation::Stream);
        let (id, _) = registry.resolve(Format::GZip, None).unwrap();
        assert_eq!(id.implementation, Implementation::Native);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Registry::global(), Registry::global()));
        assert!(Registry::global().is_supported(Format::Zip));
    }

    #[test]
    fn test_concurrent_register_and_resolve() {
        let registry = Registry::with_builtins();
        let wins: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || {
                        let won = registry
                            .register(
                                Format::Tar,
                                Implementation::Native,
                                move |_: OpenRequest| -> Result<Box<dyn ArchiveAccess>> {
                                    Err(ArchiveError::not_supported(format!("tar {}", i)))
                                },
                            )
                            .unwrap();
                        for _ in 0..100 {
                            assert!(registry.resolve(Format::Zip, None).is_ok());
                            assert!(registry.is_supported(Format::Tar));
                        }
                        won
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(wins.iter().filter(|&&won| won).count(), 1);
        let winner = wins.iter().position(|&won| won).unwrap();
        let (id, constructor) = registry
            .resolve(Format::Tar, Some(Implementation::Native))
            .unwrap();
        assert_eq!(id, ArchiveId::new(Format::Tar, Implementation::Native));
        let err = constructor(OpenRequest::new(one_entry_zip(), AccessMode::Read))
            .err()
            .unwrap();
        let expected = ArchiveError::not_supported(format!("tar {}", winner));
        assert_eq!(err.to_string(), expected.to_string());
    }
}
