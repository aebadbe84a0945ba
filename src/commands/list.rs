use super::load_context;
use anyhow::Result;
use std::path::Path;

pub fn run(game_path: Option<&Path>, all: bool) -> Result<()> {
    let context = load_context(game_path)?;
    let maps = context.installer().list_maps(all);

    if maps.is_empty() {
        println!("No maps installed.");
        println!();
        println!("Install maps with: sessionmm install <folder-or-archive>");
        return Ok(());
    }

    println!("Installed maps:");
    for map in &maps {
        let hidden = if map.hidden { " (hidden)" } else { "" };
        if map.label() == map.identity {
            println!("  {}{}", map.identity, hidden);
        } else {
            println!("  {} [{}]{}", map.label(), map.identity, hidden);
        }

        if map.file_paths.is_empty() {
            println!("    ⚠ files not tracked, remove manually");
        } else {
            println!("    {} file(s) in {}", map.file_paths.len(), map.source_directory.display());
        }
    }
    println!();

    println!(
        "Total: {} map{}",
        maps.len(),
        if maps.len() == 1 { "" } else { "s" }
    );

    Ok(())
}
