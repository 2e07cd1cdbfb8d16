use std::borrow::Cow;
use std::io;
use std::path::Path;

/// A specialized [`StorageError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unsupported locator scheme{}: {locator}", format_context(.context))]
    UnsupportedScheme { locator: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid locator{}: {locator}", format_context(.context))]
    InvalidLocator { locator: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("File not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Access denied{}: {source}", format_context(.context))]
    AccessDenied { source: io::Error, context: Option<Cow<'static, str>> },

    #[error("Write failed{}: {source}{}", format_context(.context), format_cleanup(.cleanup))]
    WriteFailed {
        source: io::Error,
        /// Secondary failure raised while removing the partial file.
        cleanup: Option<io::Error>,
        context: Option<Cow<'static, str>>,
    },

    #[error("Directory creation failed{}: {source}", format_context(.context))]
    DirectoryCreateFailed { source: io::Error, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid text encoding{}: {source}", format_context(.context))]
    InvalidEncoding { source: std::string::FromUtf8Error, context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: io::Error, context: Option<Cow<'static, str>> },

    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

impl StorageError {
    /// Maps a filesystem fault on `path` onto the matching error kind.
    ///
    /// `NotFound` and `PermissionDenied` keep their identity, everything else
    /// is reported as a generic [`StorageError::Io`].
    pub(crate) fn from_io(source: io::Error, path: &Path) -> Self {
        let context = Some(Cow::Owned(path.display().to_string()));
        match source.kind() {
            io::ErrorKind::NotFound => {
                Self::NotFound { message: path.display().to_string().into(), context: None }
            },
            io::ErrorKind::PermissionDenied => Self::AccessDenied { source, context },
            _ => Self::Io { source, context },
        }
    }

    /// Returns `true` when the error means the target does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Attaches a human-readable context to a failing result.
pub trait StorageErrorExt<T> {
    /// Adds `context` to the error, converting foreign errors into [`StorageError`].
    ///
    /// # Errors
    ///
    /// Returns the original error, enriched with `context`.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError>;
}

impl<T> StorageErrorExt<T> for Result<T, StorageError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                StorageError::UnsupportedScheme { context: c, .. }
                | StorageError::InvalidLocator { context: c, .. }
                | StorageError::NotFound { context: c, .. }
                | StorageError::AccessDenied { context: c, .. }
                | StorageError::WriteFailed { context: c, .. }
                | StorageError::DirectoryCreateFailed { context: c, .. }
                | StorageError::PathTraversalAttempt { context: c, .. }
                | StorageError::InvalidEncoding { context: c, .. }
                | StorageError::Io { context: c, .. }
                | StorageError::Config { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> StorageErrorExt<T> for Result<T, io::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::Io { source, context: Some(context.into()) })
    }
}

impl<T> StorageErrorExt<T> for Result<T, config::ConfigError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::Config { source, context: Some(context.into()) })
    }
}

impl<T> StorageErrorExt<T> for Result<T, std::string::FromUtf8Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::InvalidEncoding {
            source,
            context: Some(context.into()),
        })
    }
}

impl From<io::Error> for StorageError {
    #[inline]
    fn from(source: io::Error) -> Self {
        Self::Io { source, context: None }
    }
}

impl From<config::ConfigError> for StorageError {
    #[inline]
    fn from(source: config::ConfigError) -> Self {
        Self::Config { source, context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

fn format_cleanup(cleanup: &Option<io::Error>) -> Cow<'static, str> {
    cleanup
        .as_ref()
        .map_or(Cow::Borrowed(""), |e| Cow::Owned(format!(" [cleanup failed: {e}]")))
}
