//! A local filesystem storage provider.
//!
//! It maps `file://` locators onto files below a base directory and offers the
//! read, write and delete operations a multi-provider storage manager dispatches
//! to its backends. All examples use temporary directories to avoid writing to
//! the real filesystem.
//!
//! # Core Features
//!
//! - **Locator Codec**: Bidirectional mapping between absolute paths and
//!   percent-encoded `file://` locators relative to the base directory.
//! - **Placement Options**: Per-call name, subdirectory and flattening, merged
//!   over the provider configuration in one place.
//! - **Flattening**: Optional single-level layout where `/` is replaced by a
//!   configurable separator (`dir/a.txt` becomes `dir-a.txt`).
//! - **Streaming**: `tokio` [`AsyncRead`](tokio::io::AsyncRead) /
//!   [`AsyncWrite`](tokio::io::AsyncWrite) handles; the write stream knows its
//!   locator up front and removes its partial file on failure.
//! - **Idempotent Deletes**: Deleting a file that is already gone succeeds.
//! - **Containment**: `..` segments may never climb above the base directory.
//!
//! # Architectural Overview
//!
//! 1.  **[`resolver`]**: Pure path and locator functions, no I/O.
//! 2.  **[`LocalStorage`]**: The thread-safe provider handle performing the I/O.
//! 3.  **[`StorageProvider`]**: The capability trait a storage manager consumes.
//! 4.  **[`LocalStorageBuilder`]**: A type-safe fluent builder for configuration.
//!
//! # Examples
//!
//! ```rust
//! use mstore_local::{Encoding, LocalStorage, PlacementOptions, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     let storage = LocalStorage::builder()
//!         .base_directory(tmp.path())
//!         .flatten_directories(true)
//!         .build()?;
//!
//!     let locator = storage
//!         .write(b"important data", &PlacementOptions::named("config.bin").path("etc"))
//!         .await?;
//!     assert_eq!(locator, "file://etc-config.bin");
//!
//!     let data = storage.read(&locator, Encoding::Binary).await?;
//!     assert_eq!(data.as_bytes(), b"important data");
//!
//!     Ok(())
//! }
//! ```
//!
//! ```rust
//! # use mstore_local::{LocalStorage, PlacementOptions, StorageError};
//! use tokio::io::AsyncWriteExt;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), StorageError> {
//! # let tmp = tempfile::tempdir().unwrap();
//! # let storage = LocalStorage::builder().base_directory(tmp.path()).build()?;
//! let mut stream = storage.write_stream(&PlacementOptions::named("log.txt").path("a/b")).await?;
//! println!("Writing to {}", stream.locator());
//!
//! stream.write_all(b"line 1\n").await?;
//! stream.write_all(b"line 2\n").await?;
//! let locator = stream.finish().await?;
//! assert_eq!(locator, "file://a/b/log.txt");
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod engine;
mod error;
mod locator;
mod observer;
mod options;
mod provider;
pub mod resolver;
mod stream;

pub use builder::{LocalStorageBuilder, NoBase, WithBase};
pub use config::{DEFAULT_BASE_DIRECTORY, LocalStorageConfig, load_config};
pub use engine::{LocalStorage, PROVIDER_NAME, SCHEMES};
pub use error::{StorageError, StorageErrorExt};
pub use locator::{FILE_SCHEME, Locator, SCHEME_DELIMITER, SEGMENT_SEPARATOR, scheme_of};
pub use observer::{StorageObserver, TracingObserver};
pub use options::{DEFAULT_MODE, Encoding, Payload, PlacementOptions, ResolvedPlacement};
pub use provider::StorageProvider;
pub use stream::{LocalReadStream, LocalWriteStream};
