use super::load_context;
use anyhow::Result;
use std::path::Path;

pub fn run_rename(game_path: Option<&Path>, identity: String, name: String) -> Result<()> {
    let context = load_context(game_path)?;
    let record = context
        .installer()
        .set_display(&identity, Some(name.trim()), None)?;

    println!("✓ {} is now shown as '{}'", record.identity, record.label());
    Ok(())
}

pub fn run_hide(game_path: Option<&Path>, identity: String, hidden: bool) -> Result<()> {
    let context = load_context(game_path)?;
    let record = context
        .installer()
        .set_display(&identity, None, Some(hidden))?;

    if hidden {
        println!("✓ Hid {}", record.label());
        println!("  Show it again with: sessionmm unhide {}", record.identity);
    } else {
        println!("✓ {} is visible again", record.label());
    }
    Ok(())
}
