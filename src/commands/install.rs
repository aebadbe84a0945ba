use super::{create_spinner_callback, load_context};
use anyhow::Result;
use std::path::{Path, PathBuf};

pub fn run(game_path: Option<&Path>, path: PathBuf, asset_id: Option<String>) -> Result<()> {
    let context = load_context(game_path)?;

    println!("Installing map from {}", path.display());
    println!();

    let record = context.installer().install_map(
        &path,
        asset_id.as_deref(),
        Some(create_spinner_callback()),
    )?;

    println!();
    println!("✓ Installed {}", record.label());
    println!("  Identity: {}", record.identity);
    println!("  Location: {}", record.source_directory.display());
    println!("  Files:    {}", record.file_paths.len());

    if record.file_paths.is_empty() {
        println!();
        println!("⚠ No files were copied (everything matched the exclusion rules).");
    }

    println!();
    Ok(())
}
