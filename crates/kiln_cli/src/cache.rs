//! `kiln cache`: the cache administration surface.

use std::error::Error;
use std::path::{Path, PathBuf};

use kiln_cache::{resolve_cache_root, CacheRecord, CacheRoot, CacheStore};
use kiln_common::ProcessEnv;

use crate::{CacheAction, GlobalArgs};

/// Runs one `kiln cache` action.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = global.load_config()?;
    let root = resolve_cache_root(config.build_dir.as_deref(), &ProcessEnv);
    let store = CacheStore::open(&root.path);
    match action {
        CacheAction::Info => info(&root, &store),
        CacheAction::List => list(&store),
        CacheAction::Inspect { target } => inspect(&store, target),
        CacheAction::Clear { target, all } => clear(&store, target.as_deref(), *all),
    }
}

fn info(root: &CacheRoot, store: &CacheStore) -> Result<i32, Box<dyn Error>> {
    println!("location: {} ({})", root.path.display(), root.source);
    println!("entries:  {}", store.entries()?.len());
    println!("size:     {}", format_size(store.size_bytes()?));
    Ok(0)
}

fn list(store: &CacheStore) -> Result<i32, Box<dyn Error>> {
    let records = store.entries()?;
    if records.is_empty() {
        eprintln!("cache is empty");
    }
    for record in records {
        println!(
            "{:<24} {:<8} {} {}",
            record.identity.module_name,
            record.kind,
            record.fingerprint.hash().short(),
            record.identity.path.display()
        );
    }
    Ok(0)
}

fn inspect(store: &CacheStore, target: &Path) -> Result<i32, Box<dyn Error>> {
    let matches = records_for(store, target)?;
    if matches.is_empty() {
        eprintln!("no cache entry for {}", target.display());
        return Ok(1);
    }
    for record in matches {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(0)
}

fn clear(store: &CacheStore, target: Option<&Path>, all: bool) -> Result<i32, Box<dyn Error>> {
    if all {
        store.clear_all()?;
        eprintln!("cleared {}", store.root().display());
        return Ok(0);
    }
    let Some(target) = target else {
        return Err("specify a target or --all".into());
    };
    let mut cleared = 0;
    for record in records_for(store, target)? {
        if store.invalidate(&record.identity)? {
            eprintln!("cleared {}", record.identity);
            cleared += 1;
        }
    }
    if cleared == 0 {
        eprintln!("no cache entry for {}", target.display());
    }
    Ok(0)
}

/// Records whose target path is `target`, compared after canonicalization.
fn records_for(store: &CacheStore, target: &Path) -> Result<Vec<CacheRecord>, Box<dyn Error>> {
    let wanted = canonical(target);
    Ok(store
        .entries()?
        .into_iter()
        .filter(|r| canonical(&r.identity.path) == wanted)
        .collect())
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
