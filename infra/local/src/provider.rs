//! The capability surface a multi-provider storage manager consumes.

use crate::engine::{LocalStorage, PROVIDER_NAME, SCHEMES};
use crate::error::StorageError;
use crate::locator::{Locator, scheme_of};
use crate::options::{Encoding, Payload, PlacementOptions};
use crate::stream::{LocalReadStream, LocalWriteStream};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

/// A storage backend resolving locators of one or more schemes.
///
/// Each operation runs exactly once and reports success or failure; retries,
/// quotas and fan-out across providers are the manager's concern.
pub trait StorageProvider: Send + Sync {
    type ReadStream: AsyncRead + Send + Unpin;
    type WriteStream: AsyncWrite + Send + Unpin;

    /// Identifying token of the provider.
    fn name(&self) -> &'static str;

    /// Locator schemes this provider resolves.
    fn schemes(&self) -> &'static [&'static str];

    /// Returns `true` if `locator` uses one of [`schemes`](Self::schemes).
    fn supports(&self, locator: &str) -> bool {
        scheme_of(locator).is_some_and(|scheme| self.schemes().contains(&scheme))
    }

    fn read(
        &self,
        locator: &str,
        encoding: Encoding,
    ) -> impl Future<Output = Result<Payload, StorageError>> + Send;

    fn read_stream(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<Self::ReadStream, StorageError>> + Send;

    fn write(
        &self,
        data: &[u8],
        options: &PlacementOptions,
    ) -> impl Future<Output = Result<Locator, StorageError>> + Send;

    fn write_stream(
        &self,
        options: &PlacementOptions,
    ) -> impl Future<Output = Result<Self::WriteStream, StorageError>> + Send;

    fn delete(&self, locator: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl StorageProvider for LocalStorage {
    type ReadStream = LocalReadStream;
    type WriteStream = LocalWriteStream;

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn schemes(&self) -> &'static [&'static str] {
        SCHEMES
    }

    fn read(
        &self,
        locator: &str,
        encoding: Encoding,
    ) -> impl Future<Output = Result<Payload, StorageError>> + Send {
        Self::read(self, locator, encoding)
    }

    fn read_stream(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<LocalReadStream, StorageError>> + Send {
        Self::read_stream(self, locator)
    }

    fn write(
        &self,
        data: &[u8],
        options: &PlacementOptions,
    ) -> impl Future<Output = Result<Locator, StorageError>> + Send {
        Self::write(self, data, options)
    }

    fn write_stream(
        &self,
        options: &PlacementOptions,
    ) -> impl Future<Output = Result<LocalWriteStream, StorageError>> + Send {
        Self::write_stream(self, options)
    }

    fn delete(&self, locator: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
        Self::delete(self, locator)
    }
}
