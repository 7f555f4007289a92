//! CLI command implementations.

pub mod checkpoint;
pub mod inspect;
pub mod serve;

use deltasync_store::{Database, StoreConfig};
use std::path::Path;

/// Opens an existing data directory without creating it.
///
/// Fails while a server (or another writer) holds the directory lock.
fn open_existing(data_dir: &Path, read_only: bool) -> Result<Database, Box<dyn std::error::Error>> {
    if !data_dir.is_dir() {
        return Err(format!("No data directory found at {:?}", data_dir).into());
    }
    Ok(Database::open_with_config(
        data_dir,
        StoreConfig::new()
            .create_if_missing(false)
            .read_only(read_only),
    )?)
}
