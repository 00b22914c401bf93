//! Manual-inspection CLI (SPEC_FULL.md §2 ambient-stack item 4):
//! `open`/`dump-revision`/`stats`/`validate` against a resource file.
//! Not part of the storage-engine API surface, mirrors `rdms`'s own
//! `src/bin/rdms` as a thin driver over the library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use sirix_core::cache::{Config as CacheConfig, PageCache};
use sirix_core::codec::DOCUMENT_NODE_KEY;
use sirix_core::nodetx::{Config as NodeTxConfig, NodeWriteTransaction};
use sirix_core::pagetree::read::PageReadTransaction;
use sirix_core::record::cursor::{NodeCursor, ResourceCursor};
use sirix_core::Result;

#[derive(Parser)]
#[command(name = "sirix", about = "Inspect and drive a sirix-core resource file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a brand-new, empty resource file.
    Create {
        path: PathBuf,
        #[arg(long, default_value_t = 4096)]
        page_size: u32,
        #[arg(long, default_value_t = 128)]
        fan_out: u32,
        #[arg(long, default_value_t = 8)]
        window: u32,
        #[arg(long, default_value_t = 100)]
        full_dump_every: u32,
    },
    /// Print the document tree as stored in a given (or latest) revision.
    DumpRevision {
        path: PathBuf,
        #[arg(long)]
        revision: Option<u32>,
    },
    /// Print page-cache and resource header statistics.
    Stats { path: PathBuf },
    /// Walk the whole document tree and every secondary index, checking
    /// the structural and AVL-balance invariants.
    Validate { path: PathBuf },
}

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

fn log_path_for(path: &std::path::Path) -> PathBuf {
    path.with_extension("txlog")
}

fn dump_subtree(cursor: &mut ResourceCursor<'_>, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match cursor.name() {
        Some((_, local_name_key, _)) => {
            let local = cursor.resolve_name(local_name_key)?.unwrap_or_else(|| format!("#{}", local_name_key));
            println!("{}{:?} #{} name={}", indent, cursor.kind(), cursor.node_key(), local)
        }
        None => println!("{}{:?} #{}", indent, cursor.kind(), cursor.node_key()),
    }
    if cursor.move_to_first_child()? {
        loop {
            dump_subtree(cursor, depth + 1)?;
            if !cursor.move_to_right_sibling()? {
                break;
            }
        }
        cursor.move_to_parent()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger_init();
    let cli = Cli::parse();

    match cli.command {
        Command::Create { path, page_size, fan_out, window, full_dump_every } => {
            let log_path = log_path_for(&path);
            let mut wtx = NodeWriteTransaction::create(
                path.clone(),
                page_size,
                fan_out,
                window,
                full_dump_every,
                1,
                new_cache(),
                log_path,
                NodeTxConfig::default(),
            )?;
            let revision = wtx.commit(0)?;
            println!("created {:?} at revision {}", path, revision);
        }
        Command::DumpRevision { path, revision } => {
            let mut rtx = PageReadTransaction::begin(&path, revision, 1, new_cache())?;
            println!("revision {}", rtx.revision());
            let mut cursor = ResourceCursor::new(&mut rtx, DOCUMENT_NODE_KEY)?;
            dump_subtree(&mut cursor, 0)?;
        }
        Command::Stats { path } => {
            let rtx = PageReadTransaction::begin(&path, None, 1, new_cache())?;
            println!("latest revision: {}", rtx.revision());
            println!("max node key: {}", rtx.max_node_key());
        }
        Command::Validate { path } => {
            let log_path = log_path_for(&path);
            let mut wtx = NodeWriteTransaction::open(path.clone(), 1, new_cache(), log_path, NodeTxConfig::default())?;
            wtx.validate_invariants()?;
            wtx.abort()?;
            println!("{:?} is consistent", path);
        }
    }
    Ok(())
}

fn env_logger_init() {
    let _ = env_logger::try_init();
}
