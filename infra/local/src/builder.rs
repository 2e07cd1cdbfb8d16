use crate::config::LocalStorageConfig;
use crate::engine::{LocalStorage, LocalStorageInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::observer::StorageObserver;
use crate::resolver::DEFAULT_FLATTEN_SEPARATOR;
use private::Sealed;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct BuilderConfig {
    create_directories: bool,
    flatten_directories: bool,
    flatten_separator: String,
    observer: Option<Arc<dyn StorageObserver>>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            create_directories: true,
            flatten_directories: false,
            flatten_separator: DEFAULT_FLATTEN_SEPARATOR.to_owned(),
            observer: None,
        }
    }
}

impl fmt::Debug for BuilderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderConfig")
            .field("create_directories", &self.create_directories)
            .field("flatten_directories", &self.flatten_directories)
            .field("flatten_separator", &self.flatten_separator)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct NoBase;
#[derive(Debug)]
pub struct WithBase(PathBuf);

mod private {
    pub(super) trait Sealed {}
}
impl Sealed for NoBase {}
impl Sealed for WithBase {}

/// Fluent builder for [`LocalStorage`]. A base directory is required before
/// [`build`](LocalStorageBuilder::build) becomes available.
#[allow(private_bounds)]
#[derive(Debug, Default)]
pub struct LocalStorageBuilder<S: Sealed = NoBase> {
    state: S,
    config: BuilderConfig,
}

#[allow(private_bounds)]
impl<S: Sealed> LocalStorageBuilder<S> {
    #[must_use = "Sets whether missing parent directories are created on write"]
    pub const fn create_directories(mut self, enable: bool) -> Self {
        self.config.create_directories = enable;
        self
    }

    #[must_use = "Sets the default flattening policy"]
    pub const fn flatten_directories(mut self, enable: bool) -> Self {
        self.config.flatten_directories = enable;
        self
    }

    #[must_use = "Sets the substitution used for '/' when flattening"]
    pub fn flatten_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.flatten_separator = separator.into();
        self
    }

    #[must_use = "Attaches a diagnostic observer"]
    pub fn observer(mut self, observer: Arc<dyn StorageObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    fn transition<N: Sealed>(self, state: N) -> LocalStorageBuilder<N> {
        LocalStorageBuilder { state, config: self.config }
    }
}

impl LocalStorageBuilder<NoBase> {
    #[must_use = "Creates a new builder with default configuration"]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "Sets the base directory every locator is relative to"]
    pub fn base_directory(self, path: impl Into<PathBuf>) -> LocalStorageBuilder<WithBase> {
        self.transition(WithBase(path.into()))
    }

    /// Seeds a builder with every value of a loaded configuration.
    #[must_use]
    pub fn from_config(config: LocalStorageConfig) -> LocalStorageBuilder<WithBase> {
        Self::new()
            .create_directories(config.create_directories)
            .flatten_directories(config.flatten_directories)
            .flatten_separator(config.flatten_separator)
            .base_directory(config.base_directory)
    }
}

impl LocalStorageBuilder<WithBase> {
    /// Consumes the configuration and creates the provider.
    ///
    /// A relative base directory is made absolute against the current working
    /// directory. Nothing is created on disk: directories appear on the first
    /// write if `create_directories(true)` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the base directory is empty or the working
    /// directory cannot be determined.
    pub fn build(self) -> Result<LocalStorage, StorageError> {
        let base = &self.state.0;

        let base_directory = std::path::absolute(base)
            .context(format!("Failed to resolve base directory: {}", base.display()))?;

        info!(
            path = %base_directory.display(),
            create_directories = self.config.create_directories,
            flatten_directories = self.config.flatten_directories,
            "Local storage provider ready"
        );

        Ok(LocalStorage {
            inner: Arc::new(LocalStorageInner {
                base_directory,
                create_directories: self.config.create_directories,
                flatten_directories: self.config.flatten_directories,
                flatten_separator: self.config.flatten_separator,
                observer: self.config.observer,
            }),
        })
    }
}
