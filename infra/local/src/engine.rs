//! The local filesystem provider.
//!
//! [`LocalStorage`] wraps the pure [`resolver`](crate::resolver) functions with
//! the filesystem operations a storage manager needs: whole-file and streaming
//! reads, whole-file and streaming writes, and idempotent deletes.

use crate::builder::{LocalStorageBuilder, NoBase};
use crate::config::LocalStorageConfig;
use crate::error::{StorageError, StorageErrorExt};
use crate::locator::{FILE_SCHEME, Locator, scheme_of};
use crate::observer::{SharedObserver, observe};
use crate::options::{Encoding, Payload, PlacementOptions, ResolvedPlacement};
use crate::resolver;
use crate::stream::{LocalReadStream, LocalWriteStream};
use std::borrow::Cow;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Identifying token of this provider.
pub const PROVIDER_NAME: &str = "ms-local";

/// Locator schemes served by this provider.
pub const SCHEMES: &[&str] = &[FILE_SCHEME];

/// The internal shared state of a [`LocalStorage`] instance.
#[derive(Debug)]
pub struct LocalStorageInner {
    /// Absolute root under which every managed file lives.
    pub(crate) base_directory: PathBuf,
    pub(crate) create_directories: bool,
    pub(crate) flatten_directories: bool,
    pub(crate) flatten_separator: String,
    pub(crate) observer: SharedObserver,
}

/// A handle to a local filesystem storage provider.
///
/// Holds nothing but its immutable configuration, so concurrent operations need
/// no locking. Two writers targeting the same locator race at the OS level and
/// the last one wins.
///
/// The handle is internally reference-counted (`Arc`) and can be cheaply cloned
/// across threads or tasks.
///
/// # Example
///
/// ```rust
/// use mstore_local::{Encoding, LocalStorage, PlacementOptions, StorageError};
///
/// #[tokio::main]
/// async fn main() -> Result<(), StorageError> {
///     # let tmp = tempfile::tempdir().unwrap();
///     let storage = LocalStorage::builder().base_directory(tmp.path()).build()?;
///
///     let locator = storage
///         .write("some data", &PlacementOptions::named("hello.txt").path("greetings"))
///         .await?;
///     assert_eq!(locator, "file://greetings/hello.txt");
///
///     let data = storage.read(&locator, Encoding::Utf8).await?;
///     assert_eq!(data.as_text(), Some("some data"));
///
///     storage.delete(&locator).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalStorage {
    pub(crate) inner: Arc<LocalStorageInner>,
}

impl Deref for LocalStorage {
    type Target = LocalStorageInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl LocalStorage {
    #[must_use = "The provider is not created until you call .build()"]
    pub fn builder() -> LocalStorageBuilder<NoBase> {
        LocalStorageBuilder::new()
    }

    /// Builds a provider from a loaded configuration, without an observer.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if a relative base directory cannot be made absolute.
    pub fn from_config(config: LocalStorageConfig) -> Result<Self, StorageError> {
        LocalStorageBuilder::from_config(config).build()
    }

    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    #[must_use]
    pub fn creates_directories(&self) -> bool {
        self.inner.create_directories
    }

    #[must_use]
    pub fn flattens_directories(&self) -> bool {
        self.inner.flatten_directories
    }

    /// Absolute target path for `options`, see [`resolver::path_for_options`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathTraversalAttempt`] if the options escape the base directory.
    pub fn path_for_options(&self, options: &PlacementOptions) -> Result<PathBuf, StorageError> {
        resolver::path_for_options(
            &self.base_directory,
            self.flatten_directories,
            &self.flatten_separator,
            options,
        )
    }

    /// Flattens `path` with the configured separator.
    #[must_use]
    pub fn flattened_path_for_path(&self, path: &str) -> String {
        resolver::flattened_path_for_path(path, &self.flatten_separator)
    }

    /// Resolves `locator` using the current flattening policy.
    #[must_use]
    pub fn file_path_for_url(&self, locator: impl AsRef<str>) -> Option<PathBuf> {
        resolver::file_path_for_url(
            locator,
            &self.base_directory,
            self.flatten_directories,
            &self.flatten_separator,
        )
    }

    #[must_use]
    pub fn url_for_file_path(&self, path: impl AsRef<Path>) -> Option<Locator> {
        resolver::url_for_file_path(path.as_ref(), &self.base_directory)
    }

    /// Returns `true` if `locator` uses one of [`SCHEMES`].
    #[must_use]
    pub fn supports(&self, locator: &str) -> bool {
        scheme_of(locator).is_some_and(|scheme| SCHEMES.contains(&scheme))
    }

    /// Checks the scheme and resolves `locator` to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedScheme`] for a foreign scheme and
    /// [`StorageError::InvalidLocator`] if the locator does not resolve.
    pub fn resolve(&self, locator: impl AsRef<str>) -> Result<PathBuf, StorageError> {
        let locator = locator.as_ref();
        if !self.supports(locator) {
            return Err(StorageError::UnsupportedScheme {
                locator: locator.to_owned().into(),
                context: Some(format!("{PROVIDER_NAME} handles {}", SCHEMES.join(", ")).into()),
            });
        }

        self.file_path_for_url(locator).ok_or_else(|| StorageError::InvalidLocator {
            locator: locator.to_owned().into(),
            context: None,
        })
    }

    /// Reads a whole file.
    ///
    /// `Encoding::Utf8` yields [`Payload::Text`], `Encoding::Binary` yields
    /// [`Payload::Bytes`]. Opening the file doubles as the read-access check, so
    /// an unreadable file fails before any content is read.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnsupportedScheme`] / [`StorageError::InvalidLocator`] before any I/O.
    /// - [`StorageError::NotFound`] if the file is absent or is a directory.
    /// - [`StorageError::AccessDenied`] if the file is not readable.
    /// - [`StorageError::InvalidEncoding`] if UTF-8 was requested for binary content.
    pub async fn read(
        &self,
        locator: impl AsRef<str>,
        encoding: Encoding,
    ) -> Result<Payload, StorageError> {
        let resolved = self.resolve(locator)?;
        let (mut file, len) = open_readable(&resolved).await?;

        let mut data = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
        file.read_to_end(&mut data)
            .await
            .context(format!("Read failed: {}", resolved.display()))?;

        encoding.decode(data).context(format!("{} is not valid UTF-8", resolved.display()))
    }

    /// Opens a file for streaming reads.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read), minus decoding. Faults after the file has been
    /// opened surface from the stream.
    pub async fn read_stream(
        &self,
        locator: impl AsRef<str>,
    ) -> Result<LocalReadStream, StorageError> {
        let resolved = self.resolve(locator)?;
        let (file, _) = open_readable(&resolved).await?;
        Ok(LocalReadStream::new(file, resolved))
    }

    /// Writes `data` to the location described by `options` and returns its locator.
    ///
    /// 1. Defaults are merged into `options` and the target path is computed.
    /// 2. Missing parent directories are created if the provider is configured to.
    /// 3. The file is created (or truncated) with the requested mode, written,
    ///    flushed and synced.
    /// 4. If anything fails after the file was opened, the partial file is removed.
    ///
    /// `data` is stored as is; `options.encoding` has no effect here.
    ///
    /// The returned locator is not tagged with the flattening used. When
    /// `options.flatten` differs from the provider's policy, reading that locator
    /// back through this provider resolves to another path.
    ///
    /// # Errors
    ///
    /// - [`StorageError::PathTraversalAttempt`] if the options escape the base directory.
    /// - [`StorageError::DirectoryCreateFailed`] if the parent chain cannot be created.
    /// - [`StorageError::AccessDenied`] if the target cannot be opened for lack of permissions.
    /// - [`StorageError::WriteFailed`] for any other fault; a failed cleanup is kept in `cleanup`.
    pub async fn write(
        &self,
        data: impl AsRef<[u8]>,
        options: &PlacementOptions,
    ) -> Result<Locator, StorageError> {
        let placement = options.resolve(self.flatten_directories);
        let target = self.path_for_options(options)?;

        self.ensure_parent(&target).await?;
        let mut file = open_writable(&target, &placement).await?;

        let written = async {
            file.write_all(data.as_ref()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(source) = written {
            let cleanup = self.remove_partial(&target).await;
            return Err(StorageError::WriteFailed {
                source,
                cleanup,
                context: Some(format!("Write failed: {}", target.display()).into()),
            });
        }

        let locator = self.locator_for_written(&target).await?;
        debug!(path = %target.display(), encoding = ?placement.encoding, "File written");
        Ok(locator)
    }

    /// Opens a write stream for the location described by `options`.
    ///
    /// Directory creation and opening the target both happen before the stream
    /// is returned, so an unwritable target fails here rather than on the first
    /// write. The resulting locator is available from [`LocalWriteStream::locator`]
    /// right away.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write) for everything up to and including the open.
    pub async fn write_stream(
        &self,
        options: &PlacementOptions,
    ) -> Result<LocalWriteStream, StorageError> {
        let placement = options.resolve(self.flatten_directories);
        let target = self.path_for_options(options)?;

        self.ensure_parent(&target).await?;
        let file = open_writable(&target, &placement).await?;

        let locator = match self.url_for_file_path(&target) {
            Some(locator) => locator,
            None => {
                drop(file);
                return Err(self.unaddressable(&target).await);
            },
        };

        debug!(path = %target.display(), "Write stream opened");
        Ok(LocalWriteStream::new(file, target, locator, self.observer.clone()))
    }

    /// Deletes the file behind `locator`. Deleting a missing file succeeds.
    ///
    /// # Errors
    ///
    /// - [`StorageError::UnsupportedScheme`] / [`StorageError::InvalidLocator`] before any I/O.
    /// - [`StorageError::AccessDenied`] if the file cannot be removed for lack of permissions.
    /// - [`StorageError::Io`] for any other fault.
    pub async fn delete(&self, locator: impl AsRef<str>) -> Result<(), StorageError> {
        let resolved = self.resolve(locator)?;
        match fs::remove_file(&resolved).await {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %resolved.display(), "Delete skipped, file does not exist");
                observe!(
                    self.observer,
                    debug,
                    "{} does not exist, nothing to delete",
                    resolved.display()
                );
                return Ok(());
            },
            Err(err) => {
                return Err(match StorageError::from_io(err, &resolved) {
                    StorageError::Io { source, .. } => StorageError::Io {
                        source,
                        context: Some(format!("Failed to delete: {}", resolved.display()).into()),
                    },
                    other => other,
                });
            },
        }
        debug!(path = %resolved.display(), "File deleted");
        Ok(())
    }

    /// Creates the parent chain of `target` if enabled and missing.
    async fn ensure_parent(&self, target: &Path) -> Result<(), StorageError> {
        if !self.create_directories {
            return Ok(());
        }
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        // A regular file in the way is left to create_dir_all to report.
        if fs::metadata(parent).await.is_ok_and(|meta| meta.is_dir()) {
            return Ok(());
        }

        observe!(self.observer, debug, "Creating directory {}", parent.display());
        // create_dir_all tolerates a concurrent creator finishing first.
        fs::create_dir_all(parent).await.map_err(|source| StorageError::DirectoryCreateFailed {
            source,
            context: Some(Cow::Owned(parent.display().to_string())),
        })?;
        debug!(path = %parent.display(), "Created parent directories");
        Ok(())
    }

    async fn locator_for_written(&self, target: &Path) -> Result<Locator, StorageError> {
        match self.url_for_file_path(target) {
            Some(locator) => Ok(locator),
            None => Err(self.unaddressable(target).await),
        }
    }

    /// Removes a file that was opened but cannot be addressed by a locator.
    async fn unaddressable(&self, target: &Path) -> StorageError {
        let cleanup = self.remove_partial(target).await;
        StorageError::WriteFailed {
            source: io::Error::new(io::ErrorKind::InvalidInput, "target has no locator"),
            cleanup,
            context: Some(target.display().to_string().into()),
        }
    }

    /// Best-effort removal of a partially written file.
    async fn remove_partial(&self, target: &Path) -> Option<io::Error> {
        match fs::remove_file(target).await {
            Ok(()) => None,
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %target.display(), error = %err, "Partial file cleanup failed");
                observe!(
                    self.observer,
                    error,
                    "Could not remove partial file {}: {err}",
                    target.display()
                );
                Some(err)
            },
        }
    }
}

/// Opens `path` for reading and returns it with its length.
async fn open_readable(path: &Path) -> Result<(File, u64), StorageError> {
    let file = File::open(path).await.map_err(|err| StorageError::from_io(err, path))?;
    let meta = file.metadata().await.map_err(|err| StorageError::from_io(err, path))?;
    if meta.is_dir() {
        return Err(StorageError::NotFound {
            message: path.display().to_string().into(),
            context: Some("Target is a directory".into()),
        });
    }
    Ok((file, meta.len()))
}

async fn open_writable(
    path: &Path,
    placement: &ResolvedPlacement<'_>,
) -> Result<File, StorageError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(placement.mode);
    #[cfg(not(unix))]
    let _ = placement;

    options.open(path).await.map_err(|source| {
        let context = Some(Cow::Owned(format!("Failed to open {}", path.display())));
        if source.kind() == io::ErrorKind::PermissionDenied {
            StorageError::AccessDenied { source, context }
        } else {
            StorageError::WriteFailed { source, cleanup: None, context }
        }
    })
}
