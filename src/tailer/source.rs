//! Readable log sources: regular files and named pipes.

use std::fs::{FileType, Metadata};
use std::io::{self, SeekFrom};
use std::os::fd::AsFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::unix::pipe;

use crate::error::TailerError;

/// Upper bound on a single read, so an idle pipe cannot stall a read pass.
pub const READ_DEADLINE: Duration = Duration::from_secs(5);

/// An open descriptor on a log source.
#[derive(Debug)]
pub(crate) enum Source {
    /// Seekable regular file.
    Regular(File),
    /// Named pipe, opened non-blocking and never seeked.
    Pipe(pipe::Receiver),
}

impl Source {
    /// Open `path` read-only.
    ///
    /// Only regular files and named pipes are accepted.
    pub(crate) async fn open(path: &Path) -> Result<Self, TailerError> {
        let display = path.display().to_string();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| TailerError::open(&display, &e))?;
        let file_type = metadata.file_type();

        if file_type.is_file() {
            let file = File::open(path)
                .await
                .map_err(|e| TailerError::open(&display, &e))?;
            Ok(Self::Regular(file))
        } else if file_type.is_fifo() {
            let receiver = pipe::OpenOptions::new()
                .open_receiver(path)
                .map_err(|e| TailerError::open(&display, &e))?;
            Ok(Self::Pipe(receiver))
        } else {
            Err(TailerError::UnsupportedFileType {
                path: display,
                mode: describe(file_type).to_string(),
            })
        }
    }

    pub(crate) const fn is_regular(&self) -> bool {
        matches!(self, Self::Regular(_))
    }

    /// Read into `buf`, giving up after [`READ_DEADLINE`].
    ///
    /// `Ok(0)` is end-of-stream; an elapsed deadline is `ErrorKind::TimedOut`.
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = async {
            match self {
                Self::Regular(file) => file.read(buf).await,
                Self::Pipe(receiver) => receiver.read(buf).await,
            }
        };
        match tokio::time::timeout(READ_DEADLINE, read).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "read deadline exceeded",
            )),
        }
    }

    /// Stat the open descriptor.
    pub(crate) async fn metadata(&self) -> io::Result<Metadata> {
        match self {
            Self::Regular(file) => file.metadata().await,
            Self::Pipe(receiver) => {
                let fd = receiver.as_fd().try_clone_to_owned()?;
                std::fs::File::from(fd).metadata()
            }
        }
    }

    /// Current read offset.
    pub(crate) async fn position(&mut self) -> io::Result<u64> {
        match self {
            Self::Regular(file) => file.stream_position().await,
            Self::Pipe(_) => Err(not_seekable()),
        }
    }

    pub(crate) async fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Regular(file) => file.seek(pos).await,
            Self::Pipe(_) => Err(not_seekable()),
        }
    }
}

/// Whether two stats describe the same file (device and inode).
pub(crate) fn same_file(a: &Metadata, b: &Metadata) -> bool {
    a.dev() == b.dev() && a.ino() == b.ino()
}

fn not_seekable() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "named pipes are not seekable")
}

fn describe(file_type: FileType) -> &'static str {
    if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else if file_type.is_socket() {
        "socket"
    } else if file_type.is_block_device() {
        "block device"
    } else if file_type.is_char_device() {
        "character device"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_open_regular_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "abc").unwrap();

        let mut source = Source::open(file.path()).await.unwrap();
        assert!(source.is_regular());

        let mut buf = [0u8; 16];
        assert_eq!(source.read(&mut buf).await.unwrap(), 3);
        assert_eq!(source.read(&mut buf).await.unwrap(), 0);
        assert_eq!(source.position().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_open_directory_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = Source::open(tmp.path()).await.unwrap_err();
        assert!(matches!(
            err,
            TailerError::UnsupportedFileType { ref mode, .. } if mode == "directory"
        ));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = Source::open(&tmp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, TailerError::Open { .. }));
    }

    #[tokio::test]
    async fn test_same_file_compares_inodes() {
        let a = NamedTempFile::new().unwrap();
        let b = NamedTempFile::new().unwrap();
        let source = Source::open(a.path()).await.unwrap();

        let open = source.metadata().await.unwrap();
        assert!(same_file(&open, &std::fs::metadata(a.path()).unwrap()));
        assert!(!same_file(&open, &std::fs::metadata(b.path()).unwrap()));
    }
}
