use crate::error::{StorageError, StorageErrorExt};
use crate::resolver::DEFAULT_FLATTEN_SEPARATOR;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory name used under the working directory when no base is configured.
pub const DEFAULT_BASE_DIRECTORY: &str = "multi-storage-local";

/// Provider configuration, fixed for the lifetime of a [`LocalStorage`](crate::LocalStorage).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocalStorageConfig {
    /// Root under which every managed file lives. Relative values are resolved
    /// against the working directory when the provider is built.
    pub base_directory: PathBuf,
    /// Create missing parent directories on write.
    pub create_directories: bool,
    /// Default flattening policy, overridable per call.
    pub flatten_directories: bool,
    /// Substitution for `/` when flattening.
    pub flatten_separator: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_directory: std::env::current_dir()
                .unwrap_or_default()
                .join(DEFAULT_BASE_DIRECTORY),
            create_directories: true,
            flatten_directories: false,
            flatten_separator: DEFAULT_FLATTEN_SEPARATOR.to_owned(),
        }
    }
}

/// Loads a [`LocalStorageConfig`] from a file, overlaid with environment overrides.
///
/// 1. **Base File**: the format is inferred from the extension (e.g. `local.toml`).
/// 2. **Environment Overrides**: variables prefixed with `MSTORE__`
///    (e.g. `MSTORE__BASE_DIRECTORY`, `MSTORE__FLATTEN_DIRECTORIES`).
///
/// Keys missing from both sources keep their [`Default`] values.
///
/// # Errors
///
/// Returns [`StorageError::Config`] if the file is missing or the merged values
/// do not match the structure of [`LocalStorageConfig`].
pub fn load_config(path: impl AsRef<Path>) -> Result<LocalStorageConfig, StorageError> {
    let path = path.as_ref();

    let builder = Config::builder().add_source(File::from(path).required(true)).add_source(
        Environment::with_prefix("MSTORE").separator("__").convert_case(config::Case::Snake),
    );

    info!("Loading storage config from {}", path.display());

    builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<LocalStorageConfig>()
        .context("Failed to deserialize config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_sane() {
        let config = LocalStorageConfig::default();
        assert!(config.create_directories);
        assert!(!config.flatten_directories);
        assert_eq!(config.flatten_separator, "-");
        assert!(config.base_directory.ends_with(DEFAULT_BASE_DIRECTORY));
    }

    #[test]
    fn partial_config_deserializes() {
        let raw = json!({ "base_directory": "/srv/files", "flatten_directories": true });
        let config: LocalStorageConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.base_directory, PathBuf::from("/srv/files"));
        assert!(config.flatten_directories);
        assert!(config.create_directories);
    }

    #[test]
    fn loads_from_toml_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("local.toml");
        std::fs::write(
            &file,
            concat!(
                "base_directory = \"/srv/files\"\n",
                "create_directories = false\n",
                "flatten_separator = \"_\"\n",
            ),
        )
        .unwrap();

        let config = load_config(&file).unwrap();
        assert_eq!(config.base_directory, PathBuf::from("/srv/files"));
        assert!(!config.create_directories);
        assert_eq!(config.flatten_separator, "_");
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = load_config(temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StorageError::Config { .. }));
    }
}
