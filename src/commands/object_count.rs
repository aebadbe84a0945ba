use super::load_context;
use anyhow::{bail, Result};
use sessionmm::patcher::backup_path;
use std::path::Path;

pub fn run(game_path: Option<&Path>, action: &crate::ObjectCountAction) -> Result<()> {
    use crate::ObjectCountAction;

    let context = load_context(game_path)?;
    let file = context.paths().object_placement_file();

    if !file.is_file() {
        bail!(
            "Object placement file not found at {}\n\n\
             Hint: Start the game and place an object once so the file is created.",
            file.display()
        );
    }

    let patcher = context.patcher()?;

    match action {
        ObjectCountAction::Get => {
            let field = patcher.inspect(&file)?;
            let count = patcher.get_object_count(&file)?;

            println!("Object count: {}", count);
            println!("  {} quantity slot(s) in {}", field.offsets.len(), file.display());
            if !field.is_consistent() {
                println!();
                println!("⚠ Slots hold different values: {:?}", field.values);
                println!("  Run 'sessionmm object-count set <n>' to bring them back in line.");
            }
        }
        ObjectCountAction::Set { count } => {
            let backup = backup_path(&file);
            let had_backup = backup.exists();

            let value = patcher.set_object_count(&file, count)?;

            println!("✓ Object count set to {}", value);
            if !had_backup {
                println!("  Original file backed up to {}", backup.display());
            }
            println!("  Restart the game for the change to take effect.");
        }
    }

    Ok(())
}
