//! Injectable diagnostic hooks.
//!
//! The provider reports a few lifecycle events (directory creation, write-stream
//! failure, write-stream close, delete of a missing file) to an optional
//! [`StorageObserver`]. Without an observer the events are simply not reported;
//! behavior is otherwise identical.

use std::fmt;
use std::sync::Arc;

/// Receives diagnostic messages from a [`LocalStorage`](crate::LocalStorage).
pub trait StorageObserver: fmt::Debug + Send + Sync {
    fn debug(&self, message: fmt::Arguments<'_>);
    fn error(&self, message: fmt::Arguments<'_>);
}

/// Forwards observer events to `tracing` under the `mstore_local::observer` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StorageObserver for TracingObserver {
    fn debug(&self, message: fmt::Arguments<'_>) {
        tracing::debug!(target: "mstore_local::observer", "{message}");
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        tracing::error!(target: "mstore_local::observer", "{message}");
    }
}

pub(crate) type SharedObserver = Option<Arc<dyn StorageObserver>>;

macro_rules! observe {
    ($observer:expr, debug, $($arg:tt)+) => {
        if let Some(observer) = $observer.as_deref() {
            observer.debug(format_args!($($arg)+));
        }
    };
    ($observer:expr, error, $($arg:tt)+) => {
        if let Some(observer) = $observer.as_deref() {
            observer.error(format_args!($($arg)+));
        }
    };
}

pub(crate) use observe;
