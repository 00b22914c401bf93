//! Error taxonomy shared by every layer of the storage engine.
//!
//! Mirrors the error handling style of `rdms`: a single enum plus a
//! `err_at!` macro that stamps each error with the `file:line` it was
//! raised at, so failures deep inside the page-tree are traceable without
//! a backtrace-capturing dependency.

use std::{fmt, io, result};

/// Crate-wide result alias.
pub type Result<T> = result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Underlying file or transaction-log IO failed.
    IOError(String, String),
    /// A page pointed to by a live reference could not be found or failed
    /// to deserialize.
    PageNotFound(String, String),
    /// A page or record was read but its bytes did not decode to a valid
    /// value.
    Corruption(String, String),
    /// An operation would violate one of the structural invariants in
    /// §3.3 (cycle, dangling reference, unbalanced index, ...).
    InvariantViolation(String, String),
    /// Caller supplied an argument that is invalid regardless of engine
    /// state (negative key, unknown revision, unknown index number, ...).
    InvalidArgument(String, String),
    /// Requested key has no entry.
    KeyNotFound(String, String),
    /// Failed to convert between numeric/byte representations.
    FailConvert(String, String),
    /// Invariant that should be impossible to violate from outside the
    /// crate; indicates a bug in this implementation.
    Fatal(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            PageNotFound(p, msg) => write!(f, "{} PageNotFound: {}", p, msg),
            Corruption(p, msg) => write!(f, "{} Corruption: {}", p, msg),
            InvariantViolation(p, msg) => write!(f, "{} InvariantViolation: {}", p, msg),
            InvalidArgument(p, msg) => write!(f, "{} InvalidArgument: {}", p, msg),
            KeyNotFound(p, msg) => write!(f, "{} KeyNotFound: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IOError("<conv>".to_string(), err.to_string())
    }
}

/// Stamp an [Error] variant with the call-site and format its message.
///
/// ```ignore
/// err_at!(IOError, fd.write(buf))?;
/// err_at!(InvalidArgument, msg: "revision {} does not exist", rev)?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{}: {}", msg, err)))
            }
        }
    }};
}
