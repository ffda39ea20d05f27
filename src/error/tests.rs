//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid poll interval");
        assert_eq!(err.to_string(), "configuration error: invalid poll interval");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/var/log".to_string(),
            reason: "no space left on device".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_tailer_error_conversion() {
        let tail_err = TailerError::SinkClosed("app.log".to_string());
        let err: Error = tail_err.into();
        assert!(matches!(err, Error::Tailer(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_unknown_handle_display() {
        let err = WatcherError::UnknownHandle(7);
        assert_eq!(err.to_string(), "no such event handle 7");
    }

    #[test]
    fn test_unsupported_file_type_display() {
        let err = TailerError::UnsupportedFileType {
            path: "/tmp".to_string(),
            mode: "directory".to_string(),
        };
        assert_eq!(err.to_string(), "can't open files with mode directory: /tmp");
    }

    #[test]
    fn test_open_error_keeps_reason() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = TailerError::open("/var/log/app.log", &io_err);
        assert_eq!(err.to_string(), "failed to open '/var/log/app.log': gone");
    }

    #[test]
    fn test_read_error_has_source() {
        use std::error::Error as _;

        let err = TailerError::Read {
            path: "/var/log/app.log".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "bad descriptor"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("bad descriptor"));
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("test internal error");
        assert_eq!(err.to_string(), "internal error: test internal error");
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(WatcherError::Closed.into())
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert_eq!(
            result.unwrap_err().to_string(),
            "watcher error: watcher is closed"
        );
    }
}
