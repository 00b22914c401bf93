//! Persistent transaction log (spec.md §4.4): staging area for pages a
//! write transaction has dirtied but not yet folded into the resource
//! file. Grounded in `rdms::wral`'s journal: every mutation is appended
//! to a file before being acknowledged, and an in-memory index gives
//! `O(1)` lookup of the latest value for a key without re-reading the
//! file. Spilled entries are cleared once [super::pagetree::write]
//! finishes folding the transaction into durable pages.

pub mod key;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::page::Page;
use crate::txlog::key::LogKey;
use crate::util::files;
use crate::{Error, Result};

fn encode_key(key: &LogKey) -> Vec<u8> {
    match key {
        LogKey::Indirect(ik) => {
            let mut buf = vec![0u8, ik.kind];
            buf.extend_from_slice(&ik.level.to_be_bytes());
            buf.extend_from_slice(&ik.index.to_be_bytes());
            buf
        }
        LogKey::Leaf { kind, bucket } => {
            let mut buf = vec![1u8, kind.tag()];
            buf.extend_from_slice(&bucket.to_be_bytes());
            buf
        }
        LogKey::RevisionRoot => vec![2u8],
        LogKey::Uber => vec![3u8],
    }
}

/// Builder-style configuration, following `rdms::wral::Config`.
#[derive(Clone, Debug)]
pub struct Config {
    pub fsync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { fsync: true }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub puts: u64,
    pub deletes: u64,
    pub syncs: u64,
}

/// Append-only staging journal for one open write transaction.
pub struct TransactionLog {
    path: PathBuf,
    file: File,
    index: HashMap<LogKey, Page>,
    config: Config,
    stats: Stats,
}

impl TransactionLog {
    pub fn create<P: AsRef<Path>>(path: P, config: Config) -> Result<TransactionLog> {
        let path = path.as_ref().to_path_buf();
        let file = files::create_file_rw(path.as_os_str())?;
        Ok(TransactionLog { path, file, index: HashMap::new(), config, stats: Stats::default() })
    }

    /// Stage `page` under `key`, overwriting any previous value staged
    /// for the same key in this transaction.
    pub fn put(&mut self, key: LogKey, page: Page) -> Result<()> {
        let kb = encode_key(&key);
        let pb = page.encode();
        let mut entry = Vec::with_capacity(4 + kb.len() + 4 + pb.len());
        entry.extend_from_slice(&(kb.len() as u32).to_be_bytes());
        entry.extend_from_slice(&kb);
        entry.extend_from_slice(&(pb.len() as u32).to_be_bytes());
        entry.extend_from_slice(&pb);
        err_at!(IOError, self.file.seek(SeekFrom::End(0)))?;
        err_at!(IOError, self.file.write_all(&entry))?;
        self.stats.puts += 1;
        self.index.insert(key, page);
        Ok(())
    }

    pub fn get(&self, key: &LogKey) -> Option<&Page> {
        self.index.get(key)
    }

    pub fn delete(&mut self, key: &LogKey) {
        self.index.remove(key);
        self.stats.deletes += 1;
    }

    /// Iterate every page currently staged, in no particular order,
    /// used when folding the transaction into durable resource pages.
    pub fn iter(&self) -> impl Iterator<Item = (&LogKey, &Page)> {
        self.index.iter()
    }

    /// Fsync the journal file so every `put` so far survives a crash
    /// before the engine proceeds (spec.md §4.4: durable put).
    pub fn sync(&mut self) -> Result<()> {
        if self.config.fsync {
            err_at!(IOError, self.file.sync_all())?;
        }
        self.stats.syncs += 1;
        Ok(())
    }

    /// Truncate the journal and drop the in-memory index, called after
    /// the transaction's pages have all been folded into the resource
    /// file durably.
    pub fn clear(&mut self) -> Result<()> {
        self.index.clear();
        err_at!(IOError, self.file.set_len(0))?;
        err_at!(IOError, self.file.seek(SeekFrom::Start(0)))?;
        Ok(())
    }

    pub fn to_stats(&self) -> Stats {
        self.stats.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
