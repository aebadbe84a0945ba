use super::load_context;
use anyhow::Result;
use std::path::Path;

pub fn run(game_path: Option<&Path>, identity: String) -> Result<()> {
    let context = load_context(game_path)?;
    let installer = context.installer();

    let record = installer.metadata().load_record(&identity)?;

    println!("Uninstalling map: {}", record.label());
    println!();

    let report = installer.uninstall_map(&identity)?;

    println!("  ✓ Deleted {} file(s)", report.files_deleted);
    if report.dirs_removed > 0 {
        println!("  ✓ Removed {} empty folder(s)", report.dirs_removed);
    }
    println!();
    println!("✓ Successfully uninstalled {}", record.label());
    println!();

    Ok(())
}
