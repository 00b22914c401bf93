//! Fixed-size resource header (spec.md §6.1): magic, format version and
//! the tunables that must not change across reopen, plus the trailer
//! pointer to the latest durable uber page.

use lazy_static::lazy_static;

use crate::{Error, Result};

lazy_static! {
    /// 8-byte magic stamped at the front of every resource file.
    static ref MAGIC: [u8; 8] = *b"SIRIXv01";
}

pub const FORMAT_VERSION: u32 = 1;

/// Byte length of the on-disk header, fixed so the trailer pointer
/// always lives at the same offset and can be rewritten with a single
/// word-sized write (spec.md §6.1 crash-safety note).
pub const HEADER_SIZE: u64 = 8 + 4 + 4 + 4 + 4 + 4 + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub format_version: u32,
    pub page_size: u32,
    pub fan_out: u32,
    pub window: u32,
    pub full_dump_every: u32,
    /// Offset of the most recently committed uber page, 0 before the
    /// first commit. This is the single field rewritten in place by
    /// every commit (the "fixed trailer pointer").
    pub uber_offset: u64,
}

impl Header {
    pub fn new(page_size: u32, fan_out: u32, window: u32, full_dump_every: u32) -> Self {
        Header { format_version: FORMAT_VERSION, page_size, fan_out, window, full_dump_every, uber_offset: 0 }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
        buf.extend_from_slice(&*MAGIC);
        buf.extend_from_slice(&self.format_version.to_be_bytes());
        buf.extend_from_slice(&self.page_size.to_be_bytes());
        buf.extend_from_slice(&self.fan_out.to_be_bytes());
        buf.extend_from_slice(&self.window.to_be_bytes());
        buf.extend_from_slice(&self.full_dump_every.to_be_bytes());
        buf.extend_from_slice(&self.uber_offset.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE as usize {
            err_at!(Corruption, msg: "truncated resource header")?;
        }
        if buf[0..8] != *MAGIC {
            err_at!(Corruption, msg: "bad magic, not a sirix resource file")?;
        }
        let format_version = u32::from_be_bytes(buf[8..12].try_into().unwrap());
        if format_version != FORMAT_VERSION {
            err_at!(InvalidArgument, msg: "unsupported format version {}", format_version)?;
        }
        let page_size = u32::from_be_bytes(buf[12..16].try_into().unwrap());
        let fan_out = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        let window = u32::from_be_bytes(buf[20..24].try_into().unwrap());
        let full_dump_every = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        let uber_offset = u64::from_be_bytes(buf[28..36].try_into().unwrap());
        Ok(Header { format_version, page_size, fan_out, window, full_dump_every, uber_offset })
    }

    /// Byte offset of the `uber_offset` field within the header, used by
    /// [super::ResourceFile::commit_uber_offset] to rewrite just that
    /// word without touching the rest of the header.
    pub fn uber_offset_field_offset() -> u64 {
        8 + 4 + 4 + 4 + 4 + 4
    }
}

#[cfg(test)]
#[path = "header_test.rs"]
mod header_test;
