//! Checkpoint command implementation.

use std::path::Path;

/// Runs the checkpoint command.
///
/// Replays the journal into memory, writes a fresh snapshot and truncates
/// the journal.
pub fn run(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let db = super::open_existing(data_dir, false)?;
    let seq = db.committed_seq();
    db.checkpoint()?;
    db.close()?;

    println!("Checkpoint written at seq {} in {}", seq, data_dir.display());
    Ok(())
}
