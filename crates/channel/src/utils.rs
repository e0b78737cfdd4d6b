//! Utility macros shared by the channel implementation.

/// Returns early with an error if a condition is not met.
///
/// Like `assert!`, but returns the error instead of panicking.
///
/// ```ignore
/// ensure!(segment.remaining_capacity() > 0, ChannelError::BufferFull { capacity });
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
