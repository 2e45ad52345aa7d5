use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{BackupArgs, GlobalArgs, InitDbArgs};
use crate::store::Store;

pub fn init_db(global: &GlobalArgs, args: InitDbArgs) -> Result<()> {
    let db_path = &global.db_path;

    if args.force && db_path.exists() {
        warn!(path = %db_path.display(), "removing existing database");
        for path in database_files(db_path) {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }
    }

    let store = Store::initialize(db_path)?;
    let stats = store.stats()?;
    info!(
        path = %store.path().display(),
        titles = stats.titles,
        sections = stats.sections,
        "database ready"
    );
    Ok(())
}

pub fn backup(global: &GlobalArgs, args: BackupArgs) -> Result<()> {
    let store = Store::open(&global.db_path)?;
    let bytes = store.backup(&args.destination)?;
    info!(
        source = %store.path().display(),
        destination = %args.destination.display(),
        bytes,
        "backup complete"
    );
    Ok(())
}

pub fn vacuum(global: &GlobalArgs) -> Result<()> {
    let before = file_size(&global.db_path)?;
    let store = Store::open(&global.db_path)?;
    store.compact()?;
    drop(store);

    let after = file_size(&global.db_path)?;
    info!(
        path = %global.db_path.display(),
        bytes_before = before,
        bytes_after = after,
        "vacuum complete"
    );
    Ok(())
}

fn database_files(db_path: &Path) -> Vec<PathBuf> {
    let mut files = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn file_size(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    Ok(fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len())
}
