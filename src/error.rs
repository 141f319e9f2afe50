//! Error types for the poolcore crate.

use core::fmt;

/// Result type alias using the poolcore status type.
///
/// Success is expressed through `Result::Ok`; `Status` only carries the
/// non-fatal failure arms. Fatal conditions (allocator exhaustion, context
/// stack over/underflow, a magic-tag mismatch at the pool boundary) panic
/// instead of being reported here.
pub type Result<T> = core::result::Result<T, Status>;

/// Non-fatal status codes returned by pool, user-data, and I/O operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    /// The operation was valid but the callee chose not to perform it.
    Declined,

    /// The operation cannot make progress right now and should be retried.
    Suspended,

    /// The operation performed only part of the requested work.
    Incomplete,

    /// An argument failed validation.
    InvalidArgument {
        /// Description of what was invalid
        message: &'static str,
    },

    /// An alignment value was invalid (must be a power of two).
    InvalidAlignment {
        /// The invalid alignment value
        alignment: usize,
    },

    /// An operating-system call failed with the given `errno` /
    /// `GetLastError` code. A code of `0` means the OS did not supply one.
    Io {
        /// Raw OS error code
        code: i32,
    },
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Declined => write!(f, "Operation declined"),
            Status::Suspended => write!(f, "Operation suspended; retry later"),
            Status::Incomplete => write!(f, "Operation completed partially"),
            Status::InvalidArgument { message } => {
                write!(f, "Invalid argument: {}", message)
            }
            Status::InvalidAlignment { alignment } => {
                write!(
                    f,
                    "Invalid alignment: {}. Alignment must be a power of two.",
                    alignment
                )
            }
            Status::Io { code } => {
                write!(
                    f,
                    "OS error {}: {}",
                    code,
                    std::io::Error::from_raw_os_error(*code)
                )
            }
        }
    }
}

impl std::error::Error for Status {}

impl Status {
    /// Creates a new invalid-argument status.
    #[inline]
    pub fn invalid_arg(message: &'static str) -> Self {
        Status::InvalidArgument { message }
    }

    /// Maps an `std::io::Error` onto the OS-error arm, preserving the raw
    /// `errno` / `GetLastError` code when one is available.
    #[inline]
    pub fn from_io(err: &std::io::Error) -> Self {
        Status::Io {
            code: err.raw_os_error().unwrap_or(0),
        }
    }

    /// Returns true for the "try again" statuses (`Declined`, `Suspended`).
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Status::Declined | Status::Suspended)
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Status::from_io(&err)
    }
}
