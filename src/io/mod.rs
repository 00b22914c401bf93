//! Random-access reader/writer over a resource file: a fixed header
//! (§header) followed by an append-only sequence of length-prefixed
//! pages (spec.md §6.1). Grounded in `rdms::robt::reader::Reader`'s
//! file-handle-plus-advisory-lock shape, adapted from robt's
//! read-only index file to one file that is both appended to by the
//! single writer and read by any number of concurrent readers.

pub mod header;

use fs2::FileExt;
use std::convert::TryFrom;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::io::header::{Header, HEADER_SIZE};
use crate::util::files;
use crate::{Error, Result};

/// A page's position is just its byte offset into the resource file;
/// every page is stored as `[len: u32 BE][body: len bytes]` so a reader
/// can fetch it with a single seek + two reads.
pub type PageOffset = u64;

pub struct ResourceFile {
    fd: File,
    header: Header,
}

impl ResourceFile {
    /// Create a brand-new resource file with the given tunables and an
    /// empty uber page, taking an exclusive lock for the lifetime of
    /// the returned handle (spec.md §5: writer exclusivity).
    pub fn create<P: AsRef<Path>>(
        path: P,
        page_size: u32,
        fan_out: u32,
        window: u32,
        full_dump_every: u32,
    ) -> Result<ResourceFile> {
        let os_path = path.as_ref().as_os_str();
        let mut fd = files::create_file_rw(os_path)?;
        err_at!(IOError, fd.lock_exclusive())?;

        let header = Header::new(page_size, fan_out, window, full_dump_every);
        write_file!(fd, &header.encode(), path.as_ref(), "header")?;
        err_at!(IOError, fd.sync_all())?;

        Ok(ResourceFile { fd, header })
    }

    /// Open an existing resource file for the writer: exclusive lock,
    /// read-write handle.
    pub fn open_writer<P: AsRef<Path>>(path: P) -> Result<ResourceFile> {
        let os_path = path.as_ref().as_os_str();
        let mut fd = files::open_file_rw(os_path)?;
        err_at!(IOError, fd.try_lock_exclusive())?;
        let header = Self::read_header(&mut fd)?;
        Ok(ResourceFile { fd, header })
    }

    /// Open an existing resource file for a reader: shared lock,
    /// read-only handle. Any number of readers may hold this
    /// concurrently with each other, but never with the single writer
    /// (spec.md §5).
    pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<ResourceFile> {
        let os_path = path.as_ref().as_os_str();
        let mut fd = files::open_file_r(os_path)?;
        err_at!(IOError, fd.lock_shared())?;
        let header = Self::read_header(&mut fd)?;
        Ok(ResourceFile { fd, header })
    }

    fn read_header(fd: &mut File) -> Result<Header> {
        let buf = read_file!(fd, SeekFrom::Start(0), HEADER_SIZE, "short read on header")?;
        Header::decode(&buf)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Append `body` as a new page at EOF and return its offset. Does
    /// not update the trailer pointer; callers commit a new uber page
    /// via [Self::commit_uber_offset] only after this page (and every
    /// page it depends on) is durable.
    pub fn append_page(&mut self, body: &[u8]) -> Result<PageOffset> {
        let offset = err_at!(IOError, self.fd.seek(SeekFrom::End(0)))?;
        let len = u32::try_from(body.len())
            .map_err(|_| Error::InvalidArgument("io".to_string(), "page too large".to_string()))?;
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(body);
        write_file!(self.fd, &framed, "resource", "page body")?;
        Ok(offset)
    }

    /// Read the page body stored at `offset`.
    pub fn read_page(&mut self, offset: PageOffset) -> Result<Vec<u8>> {
        let len_buf = read_file!(self.fd, SeekFrom::Start(offset), 4u64, "short read on page length")?;
        let len = u32::from_be_bytes(len_buf.try_into().unwrap()) as u64;
        read_file!(self.fd, SeekFrom::Start(offset + 4), len, "short read on page body")
    }

    /// Fsync the appended pages, then atomically advance the trailer
    /// pointer to `uber_offset` with a single in-place write, and fsync
    /// again (spec.md §6.1: "a crash-safe protocol writes a new uber
    /// page at a fresh offset, fsyncs, then rewrites the fixed trailer
    /// pointer").
    pub fn commit_uber_offset(&mut self, uber_offset: PageOffset) -> Result<()> {
        err_at!(IOError, self.fd.sync_all())?;
        self.header.uber_offset = uber_offset;
        err_at!(IOError, self.fd.seek(SeekFrom::Start(Header::uber_offset_field_offset())))?;
        write_file!(self.fd, &uber_offset.to_be_bytes(), "resource", "trailer pointer")?;
        err_at!(IOError, self.fd.sync_all())?;
        Ok(())
    }
}
