//! Streaming handles returned by [`LocalStorage::read_stream`](crate::LocalStorage::read_stream)
//! and [`LocalStorage::write_stream`](crate::LocalStorage::write_stream).

use crate::error::StorageError;
use crate::locator::Locator;
use crate::observer::{SharedObserver, observe};
use std::fmt;
use std::future::{Future, poll_fn};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::{debug, warn};

/// A readable stream over a stored file, positioned at its start.
///
/// Faults that happen while reading (e.g. the file disappearing underneath)
/// are reported by the stream itself as [`io::Error`]s.
#[derive(Debug)]
pub struct LocalReadStream {
    inner: File,
    path: PathBuf,
}

impl LocalReadStream {
    pub(crate) const fn new(inner: File, path: PathBuf) -> Self {
        Self { inner, path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsyncRead for LocalReadStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

type CleanupTask = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

enum WriteState {
    Open(File),
    /// The partial file is being removed; `error` is handed back once it is gone.
    Cleaning { task: CleanupTask, error: io::Error },
    Failed,
    Closed,
}

/// What went wrong with a write stream, kept for [`LocalWriteStream::finish`].
#[derive(Debug)]
struct Failure {
    kind: io::ErrorKind,
    message: String,
    cleanup: Option<io::Error>,
}

/// A writable stream bound to a file that is already open.
///
/// The final [`Locator`] is known up front. Any write, flush or shutdown fault
/// poisons the stream: the handle is closed, the partial file is removed, and the
/// original error is returned. A failure to remove the partial file is reported
/// to the observer and kept as secondary information; it never replaces the
/// original error.
///
/// Call [`finish`](Self::finish) to sync the data to disk and obtain the locator.
/// Dropping an unfinished stream leaves whatever was written on disk.
pub struct LocalWriteStream {
    state: WriteState,
    path: PathBuf,
    locator: Locator,
    bytes_written: u64,
    failure: Option<Failure>,
    observer: SharedObserver,
}

impl fmt::Debug for LocalWriteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            WriteState::Open(_) => "open",
            WriteState::Cleaning { .. } => "cleaning",
            WriteState::Failed => "failed",
            WriteState::Closed => "closed",
        };
        f.debug_struct("LocalWriteStream")
            .field("state", &state)
            .field("path", &self.path)
            .field("locator", &self.locator)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl LocalWriteStream {
    pub(crate) const fn new(
        file: File,
        path: PathBuf,
        locator: Locator,
        observer: SharedObserver,
    ) -> Self {
        Self {
            state: WriteState::Open(file),
            path,
            locator,
            bytes_written: 0,
            failure: None,
            observer,
        }
    }

    /// The locator the data will be reachable under.
    #[must_use]
    pub const fn locator(&self) -> &Locator {
        &self.locator
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, WriteState::Cleaning { .. } | WriteState::Failed)
    }

    /// Flushes and syncs the file, closes it and returns its locator.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] if the stream already failed or the
    /// final flush/sync fails; the partial file is removed in both cases.
    pub async fn finish(mut self) -> Result<Locator, StorageError> {
        let synced = match &mut self.state {
            WriteState::Open(file) => match file.flush().await {
                Ok(()) => file.sync_all().await,
                Err(err) => Err(err),
            },
            _ => Ok(()),
        };
        if let Err(err) = synced {
            self.begin_cleanup(err);
        }

        if matches!(self.state, WriteState::Cleaning { .. }) {
            poll_fn(|cx| self.poll_cleanup(cx)).await;
        }

        match self.state {
            WriteState::Open(_) => self.close(),
            WriteState::Closed => {},
            WriteState::Cleaning { .. } | WriteState::Failed => return Err(self.take_failure()),
        }

        Ok(self.locator)
    }

    /// Closes the stream and removes everything written so far.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the partial file exists but cannot be removed.
    pub async fn abort(mut self) -> Result<(), StorageError> {
        if let WriteState::Cleaning { task, .. } = &mut self.state {
            let _ = task.await;
        }
        self.state = WriteState::Closed;

        match fs::remove_file(&self.path).await {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => return Err(StorageError::from_io(err, &self.path)),
        }
        debug!(path = %self.path.display(), "Write stream aborted");
        Ok(())
    }

    /// Runs `op` against the open file; a fault switches the stream to cleanup.
    fn drive<T>(
        &mut self,
        cx: &mut Context<'_>,
        mut op: impl FnMut(Pin<&mut File>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        loop {
            let outcome = match &mut self.state {
                WriteState::Open(file) => op(Pin::new(file), cx),
                WriteState::Cleaning { .. } => return self.poll_cleanup(cx).map(Err),
                WriteState::Failed => return Poll::Ready(Err(self.replay_failure())),
                WriteState::Closed => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "write stream is closed",
                    )));
                },
            };
            match outcome {
                Poll::Ready(Err(err)) => self.begin_cleanup(err),
                other => return other,
            }
        }
    }

    fn begin_cleanup(&mut self, error: io::Error) {
        warn!(path = %self.path.display(), error = %error, "Write stream failed");
        observe!(self.observer, error, "Write to {} failed: {error}", self.path.display());

        self.failure =
            Some(Failure { kind: error.kind(), message: error.to_string(), cleanup: None });
        // Replacing the state drops the file handle before the unlink runs.
        self.state = WriteState::Cleaning {
            task: Box::pin(fs::remove_file(self.path.clone())),
            error,
        };
    }

    fn poll_cleanup(&mut self, cx: &mut Context<'_>) -> Poll<io::Error> {
        let WriteState::Cleaning { task, .. } = &mut self.state else {
            return Poll::Ready(self.replay_failure());
        };
        let outcome = ready!(task.as_mut().poll(cx));

        let previous = std::mem::replace(&mut self.state, WriteState::Failed);
        let WriteState::Cleaning { error, .. } = previous else {
            return Poll::Ready(self.replay_failure());
        };

        match outcome {
            Err(cleanup) if cleanup.kind() != io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), error = %cleanup, "Partial file cleanup failed");
                observe!(
                    self.observer,
                    error,
                    "Could not remove partial file {}: {cleanup}",
                    self.path.display()
                );
                if let Some(failure) = self.failure.as_mut() {
                    failure.cleanup = Some(cleanup);
                }
            },
            _ => debug!(path = %self.path.display(), "Partial file removed"),
        }

        Poll::Ready(error)
    }

    fn replay_failure(&self) -> io::Error {
        self.failure.as_ref().map_or_else(
            || io::Error::other("write stream failed"),
            |failure| io::Error::new(failure.kind, failure.message.clone()),
        )
    }

    fn take_failure(&mut self) -> StorageError {
        let source = self.replay_failure();
        let cleanup = self.failure.take().and_then(|failure| failure.cleanup);
        StorageError::WriteFailed {
            source,
            cleanup,
            context: Some(format!("Write stream to {}", self.path.display()).into()),
        }
    }

    fn close(&mut self) {
        self.state = WriteState::Closed;
        debug!(path = %self.path.display(), bytes = self.bytes_written, "Write stream closed");
        observe!(
            self.observer,
            debug,
            "Closed {} after writing {} bytes",
            self.path.display(),
            self.bytes_written
        );
    }
}

impl AsyncWrite for LocalWriteStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = this.drive(cx, |file, cx| file.poll_write(cx, buf));
        if let Poll::Ready(Ok(written)) = &poll {
            this.bytes_written += u64::try_from(*written).unwrap_or(u64::MAX);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().drive(cx, |file, cx| file.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if matches!(this.state, WriteState::Closed) {
            return Poll::Ready(Ok(()));
        }
        ready!(this.drive(cx, |file, cx| file.poll_shutdown(cx)))?;
        this.close();
        Poll::Ready(Ok(()))
    }
}
