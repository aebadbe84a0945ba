use anyhow::{bail, Result};
use sessionmm::{detect_game_path, Config, GamePaths};
use std::path::Path;

pub fn run(action: &crate::ConfigAction) -> Result<()> {
    use crate::ConfigAction;

    match action {
        ConfigAction::Show => show_config(),
        ConfigAction::SetGamePath { path } => set_game_path(path),
        ConfigAction::Detect { save } => detect(*save),
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::default_path()?;

    println!();
    println!("  Config file: {}", config_path.display());
    println!();

    println!("[game]");
    match config.game_root() {
        Some(root) => {
            let status = if GamePaths::new(&root).validate().is_ok() {
                "✓"
            } else {
                "✗ not a valid installation"
            };
            println!("  path = {} {}", root.display(), status);
        }
        None => println!("  path = (not set)"),
    }
    println!();

    println!("[install]");
    println!("  exclude_files   = {}", config.install.exclude_files.join(", "));
    println!(
        "  exclude_folders = {} folder(s)",
        config.install.exclude_folders.len()
    );
    println!("  contains_search = {}", config.install.contains_search);
    println!();

    println!("[downloads]");
    println!("  directory            = {}", config.download_dir()?.display());
    println!(
        "  delete_after_install = {}",
        config.downloads.delete_after_install
    );
    println!();

    println!("[patch]");
    println!("  atomic_writes = {}", config.patch.atomic_writes);
    println!();

    println!("[catalog]");
    for url in &config.catalog.urls {
        println!("  {}", url);
    }
    println!();

    Ok(())
}

fn set_game_path(path: &Path) -> Result<()> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    GamePaths::new(&expanded).validate()?;

    let mut config = Config::load()?;
    config.game.path = Some(expanded.clone());
    config.save()?;

    println!("✓ Game path set to {}", expanded);
    Ok(())
}

fn detect(save: bool) -> Result<()> {
    let Some(found) = detect_game_path() else {
        bail!(
            "Could not find Session in any Steam library\n\n\
             Set the path manually: sessionmm config set-game-path \"/path/to/Session\""
        );
    };

    println!("✓ Found Session at {}", found.display());

    if save {
        let mut config = Config::load()?;
        config.game.path = Some(found.to_string_lossy().into_owned());
        config.save()?;
        println!("  Saved to {}", Config::default_path()?.display());
    } else {
        println!("  Save it with: sessionmm config detect --save");
    }

    Ok(())
}
