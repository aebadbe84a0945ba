use super::{create_spinner_callback, load_context};
use anyhow::Result;
use std::path::Path;

pub fn run(game_path: Option<&Path>, action: &crate::TexturesAction) -> Result<()> {
    use crate::TexturesAction;

    let context = load_context(game_path)?;
    let installer = context.installer();

    match action {
        TexturesAction::List => {
            let textures = installer.textures().load()?;
            if textures.is_empty() {
                println!("No texture packs installed.");
                println!();
                println!("Install one with: sessionmm textures install <folder-or-archive>");
                return Ok(());
            }

            println!("Installed texture packs:");
            for texture in &textures {
                println!(
                    "  {} [{}] - {} file(s)",
                    texture.label(),
                    texture.asset_name,
                    texture.file_paths.len()
                );
            }
            Ok(())
        }
        TexturesAction::Install { path, name } => {
            println!("Installing texture pack from {}", path.display());
            println!();

            let record = installer.install_texture(
                path,
                name.as_deref(),
                Some(create_spinner_callback()),
            )?;

            println!();
            println!(
                "✓ Installed {} ({} file(s))",
                record.label(),
                record.file_paths.len()
            );
            Ok(())
        }
        TexturesAction::Uninstall { asset } => {
            let report = installer.uninstall_texture(asset)?;
            println!("✓ Uninstalled {} ({} file(s) deleted)", asset, report.files_deleted);
            Ok(())
        }
    }
}
