//! File handling helpers for the resource file and the transaction log.

use std::{ffi, fs, path};

use crate::{Error, Result};

/// Read `$n` bytes from `$fd` after seeking to `$seek`. Errors with
/// `Fatal` on a short read, since a resource file is never expected to be
/// truncated under a live page offset.
#[macro_export]
macro_rules! read_file {
    ($fd:expr, $seek:expr, $n:expr, $msg:expr) => {{
        use std::convert::TryFrom;
        use std::io::{Read, Seek};

        match $fd.seek($seek) {
            Ok(_) => {
                let mut buf = vec![0; usize::try_from($n).unwrap()];
                match $fd.read(&mut buf) {
                    Ok(n) if buf.len() == n => Ok(buf),
                    Ok(n) => {
                        let m = buf.len();
                        err_at!(Fatal, msg: concat!($msg, " {}/{} at {:?}"), m, n, $seek)
                    }
                    Err(err) => err_at!(IOError, Err(err)),
                }
            }
            Err(err) => err_at!(IOError, Err(err)),
        }
    }};
}

/// Write `$buffer` to `$fd`, erroring if the write was partial.
#[macro_export]
macro_rules! write_file {
    ($fd:expr, $buffer:expr, $file:expr, $msg:expr) => {{
        use std::io::Write;

        match err_at!(IOError, $fd.write($buffer))? {
            n if $buffer.len() == n => Ok(n),
            n => err_at!(
                Fatal, msg: "partial-wr {}, {:?}, {}/{}", $msg, $file, $buffer.len(), n
            ),
        }
    }};
}

/// Create a fresh resource file, truncating anything already at `file`.
pub fn create_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    if let Some(parent) = os_file.parent() {
        err_at!(IOError, fs::create_dir_all(parent))?;
    }

    let mut opts = fs::OpenOptions::new();
    err_at!(
        IOError,
        opts.read(true).write(true).create(true).truncate(true).open(os_file)
    )
}

/// Open an existing resource file for random-access read and write.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.read(true).write(true).open(os_file))
}

/// Open an existing file for read-only access, used by read transactions
/// that must never mutate the resource.
pub fn open_file_r(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    err_at!(IOError, fs::OpenOptions::new().read(true).open(os_file))
}

/// Append bytes to `file` and fsync, used for the append-only page
/// sequence described in spec.md §6.1.
pub fn sync_write(file: &mut fs::File, data: &[u8]) -> Result<usize> {
    use std::io::Write;

    let n = err_at!(IOError, file.write(data))?;
    if n != data.len() {
        err_at!(IOError, msg: "partial write to file {} {}", n, data.len())?
    }
    err_at!(IOError, file.sync_all())?;
    Ok(n)
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
