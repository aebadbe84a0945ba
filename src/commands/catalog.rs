use super::new_spinner;
use anyhow::{bail, Result};
use sessionmm::catalog::load_subscribed;
use sessionmm::Config;

pub fn run(action: &crate::CatalogAction) -> Result<()> {
    use crate::CatalogAction;

    match action {
        CatalogAction::List { category } => list(category.as_deref()),
        CatalogAction::Add { url } => add(url),
        CatalogAction::Remove { url } => remove(url),
    }
}

fn list(category: Option<&str>) -> Result<()> {
    let config = Config::load()?;

    let spinner = new_spinner("Loading catalogs...");
    let catalog = load_subscribed(&config.catalog);
    spinner.finish_and_clear();
    let catalog = catalog?;

    let assets: Vec<_> = match category {
        Some(category) => catalog.in_category(category).collect(),
        None => catalog.assets.iter().collect(),
    };

    if assets.is_empty() {
        println!("No assets found.");
        return Ok(());
    }

    for asset in &assets {
        println!("  {} [{}] v{}", asset.label(), asset.id, asset.version);
        if !asset.author.is_empty() {
            println!("    by {} - {}", asset.author, asset.category);
        }
    }
    println!();
    println!("Total: {} asset(s)", assets.len());
    println!("Install one with: sessionmm download --asset <ID>");

    Ok(())
}

fn add(url: &str) -> Result<()> {
    let mut config = Config::load()?;
    if config.catalog.urls.iter().any(|u| u == url) {
        println!("Already subscribed to {}", url);
        return Ok(());
    }

    config.catalog.urls.push(url.to_string());
    config.save()?;
    println!("✓ Subscribed to {}", url);
    Ok(())
}

fn remove(url: &str) -> Result<()> {
    let mut config = Config::load()?;
    let before = config.catalog.urls.len();
    config.catalog.urls.retain(|u| u != url);

    if config.catalog.urls.len() == before {
        bail!("Not subscribed to {}", url);
    }

    config.save()?;
    println!("✓ Unsubscribed from {}", url);
    Ok(())
}
