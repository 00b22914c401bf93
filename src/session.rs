//! Top-level embedding API (spec.md §5-§6): a [Database] owns a
//! directory of named resources; a [Resource] is one resource file plus
//! the bookkeeping that enforces "at most one node write transaction
//! per resource" and tracks how many readers are currently open.
//! Grounded in `rdms::llrb::index::Index`'s `Arc<Mutex<u32>>` writer
//! counter — here repurposed as an in-process fast-fail in front of the
//! OS-level advisory lock [crate::io::ResourceFile] already takes, so a
//! second writer attempt gets a clear [crate::Error::InvariantViolation]
//! instead of waiting on (or erroring out of) `flock`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cache::{Config as CacheConfig, PageCache};
use crate::nodetx::{Config as NodeTxConfig, NodeWriteTransaction};
use crate::pagetree::read::PageReadTransaction;
use crate::Result;

/// Tunables fixed at resource-creation time (spec.md §6.1 header
/// fields), builder-style like `rdms::robt::config::Config`.
#[derive(Clone, Copy, Debug)]
pub struct ResourceConfig {
    pub page_size: u32,
    pub fan_out: u32,
    pub window: u32,
    pub full_dump_every: u32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig { page_size: 4096, fan_out: 128, window: 8, full_dump_every: 100 }
    }
}

impl ResourceConfig {
    pub fn set_page_size(&mut self, page_size: u32) -> &mut Self {
        self.page_size = page_size;
        self
    }

    pub fn set_fan_out(&mut self, fan_out: u32) -> &mut Self {
        self.fan_out = fan_out;
        self
    }

    pub fn set_window(&mut self, window: u32) -> &mut Self {
        self.window = window;
        self
    }

    pub fn set_full_dump_every(&mut self, full_dump_every: u32) -> &mut Self {
        self.full_dump_every = full_dump_every;
        self
    }
}

/// One resource file: a data path, a transaction-log path, the cache it
/// shares with every reader/writer opened against it, and the
/// in-process writer-exclusivity guard (spec.md §5).
pub struct Resource {
    name: String,
    resource_id: u32,
    path: PathBuf,
    log_path: PathBuf,
    cache: Arc<PageCache>,
    writer_open: Mutex<bool>,
    reader_count: AtomicUsize,
}

impl Resource {
    fn new(name: String, resource_id: u32, path: PathBuf, log_path: PathBuf, cache: Arc<PageCache>) -> Self {
        Resource {
            name,
            resource_id,
            path,
            log_path,
            cache,
            writer_open: Mutex::new(false),
            reader_count: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_id(&self) -> u32 {
        self.resource_id
    }

    pub fn reader_count(&self) -> usize {
        self.reader_count.load(Ordering::Relaxed)
    }

    /// Open the single node write transaction for this resource. Fails
    /// fast with [crate::Error::InvariantViolation] if one is already
    /// open in this process; a second process attempting the same
    /// thing is still caught by the OS-level exclusive lock
    /// [crate::io::ResourceFile::open_writer] takes.
    pub fn open_writer(&self, config: NodeTxConfig) -> Result<ResourceWriter<'_>> {
        let mut guard = self.writer_open.lock().expect("writer_open mutex poisoned");
        if *guard {
            return err_at!(InvariantViolation, msg: "resource {} already has an open writer", self.name);
        }
        let wtx = NodeWriteTransaction::open(self.path.clone(), self.resource_id, Arc::clone(&self.cache), self.log_path.clone(), config)?;
        *guard = true;
        log::info!("opened writer for resource {}", self.name);
        Ok(ResourceWriter { resource: self, wtx: Some(wtx) })
    }

    /// Pin a read-only snapshot of `revision` (or the latest committed
    /// revision if `None`). Any number may be open concurrently with
    /// each other and with the single writer (spec.md §5).
    pub fn open_reader(&self, revision: Option<u32>) -> Result<ResourceReader<'_>> {
        let rtx = PageReadTransaction::begin(&self.path, revision, self.resource_id, Arc::clone(&self.cache))?;
        self.reader_count.fetch_add(1, Ordering::Relaxed);
        Ok(ResourceReader { resource: self, rtx: Some(rtx) })
    }
}

/// The single open writer for a [Resource]. Dropping this (including
/// via an early return after an error) releases the in-process
/// writer-exclusivity guard so a later caller can open a new one.
pub struct ResourceWriter<'a> {
    resource: &'a Resource,
    wtx: Option<NodeWriteTransaction>,
}

impl<'a> std::ops::Deref for ResourceWriter<'a> {
    type Target = NodeWriteTransaction;
    fn deref(&self) -> &NodeWriteTransaction {
        self.wtx.as_ref().expect("write transaction already closed")
    }
}

impl<'a> std::ops::DerefMut for ResourceWriter<'a> {
    fn deref_mut(&mut self) -> &mut NodeWriteTransaction {
        self.wtx.as_mut().expect("write transaction already closed")
    }
}

impl<'a> Drop for ResourceWriter<'a> {
    fn drop(&mut self) {
        *self.resource.writer_open.lock().expect("writer_open mutex poisoned") = false;
    }
}

/// One open read-only snapshot. Dropping it decrements the resource's
/// reader count (tracked for introspection/`Stats` only; the
/// underlying OS shared lock is released by [PageReadTransaction]'s own
/// `Drop` via its file handle).
pub struct ResourceReader<'a> {
    resource: &'a Resource,
    rtx: Option<PageReadTransaction>,
}

impl<'a> std::ops::Deref for ResourceReader<'a> {
    type Target = PageReadTransaction;
    fn deref(&self) -> &PageReadTransaction {
        self.rtx.as_ref().expect("read transaction already closed")
    }
}

impl<'a> std::ops::DerefMut for ResourceReader<'a> {
    fn deref_mut(&mut self) -> &mut PageReadTransaction {
        self.rtx.as_mut().expect("read transaction already closed")
    }
}

impl<'a> Drop for ResourceReader<'a> {
    fn drop(&mut self) {
        self.resource.reader_count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A directory of named resources sharing one [PageCache]. The
/// embedding entry point (spec.md §6.4): applications open or create a
/// [Database], then create/open individual [Resource]s by name.
pub struct Database {
    root: PathBuf,
    cache: Arc<PageCache>,
    next_resource_id: AtomicU32,
    resources: Mutex<HashMap<String, Arc<Resource>>>,
}

impl Database {
    /// Open (creating if necessary) a database rooted at `root`, with a
    /// page cache sized by `cache_config`.
    pub fn open<P: AsRef<Path>>(root: P, cache_config: CacheConfig) -> Result<Database> {
        let root = root.as_ref().to_path_buf();
        err_at!(IOError, fs::create_dir_all(&root))?;
        Ok(Database {
            root,
            cache: Arc::new(PageCache::new(cache_config)),
            next_resource_id: AtomicU32::new(1),
            resources: Mutex::new(HashMap::new()),
        })
    }

    fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (self.root.join(format!("{}.sirix", name)), self.root.join(format!("{}.txlog", name)))
    }

    /// Create a brand-new resource named `name` and return it wrapped
    /// in an `Arc` so readers/writers opened against it can outlive a
    /// single borrow of the `Database`.
    pub fn create_resource(&self, name: &str, config: ResourceConfig) -> Result<Arc<Resource>> {
        let mut resources = self.resources.lock().expect("resources mutex poisoned");
        if resources.contains_key(name) {
            return err_at!(InvariantViolation, msg: "resource {} already exists", name);
        }
        let resource_id = self.next_resource_id.fetch_add(1, Ordering::Relaxed);
        let (path, log_path) = self.paths(name);
        let mut wtx = NodeWriteTransaction::create(
            path.clone(),
            config.page_size,
            config.fan_out,
            config.window,
            config.full_dump_every,
            resource_id,
            Arc::clone(&self.cache),
            log_path.clone(),
            NodeTxConfig::default(),
        )?;
        wtx.commit(0)?;
        log::info!("created resource {} (id {})", name, resource_id);

        let resource = Arc::new(Resource::new(name.to_string(), resource_id, path, log_path, Arc::clone(&self.cache)));
        resources.insert(name.to_string(), Arc::clone(&resource));
        Ok(resource)
    }

    /// Open a previously created resource by name. Reassigns a fresh
    /// in-process resource id on every process start (resource ids are
    /// only used to namespace the shared [PageCache] within this
    /// process, not persisted on disk).
    pub fn open_resource(&self, name: &str) -> Result<Arc<Resource>> {
        let mut resources = self.resources.lock().expect("resources mutex poisoned");
        if let Some(resource) = resources.get(name) {
            return Ok(Arc::clone(resource));
        }
        let (path, log_path) = self.paths(name);
        if !path.exists() {
            return err_at!(InvalidArgument, msg: "resource {} does not exist", name);
        }
        let resource_id = self.next_resource_id.fetch_add(1, Ordering::Relaxed);
        let resource = Arc::new(Resource::new(name.to_string(), resource_id, path, log_path, Arc::clone(&self.cache)));
        resources.insert(name.to_string(), Arc::clone(&resource));
        Ok(resource)
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.resources.lock().expect("resources mutex poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
