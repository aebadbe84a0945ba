use super::load_context;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sessionmm::catalog::load_subscribed;
use sessionmm::{Config, DownloadEvent, DownloadKind, HttpBackend, Installed};
use std::path::Path;
use std::sync::Arc;

pub fn run(
    game_path: Option<&Path>,
    url: String,
    texture: bool,
    asset_id: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let kind = if texture {
        DownloadKind::Texture { display_name: name }
    } else {
        DownloadKind::Map { asset_id }
    };

    println!("Downloading {}", url);
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    let installed = runtime.block_on(async {
        let context = load_context(game_path)?.with_downloads(Arc::new(HttpBackend::new()));
        let bar = new_download_bar();

        let result = context
            .download_and_install(&url, kind, |event| show_event(&bar, event))
            .await;

        if result.is_err() && !bar.is_finished() {
            bar.abandon();
        }
        anyhow::Ok(result?)
    })?;

    print_installed(&installed);
    Ok(())
}

/// Download and install an asset from the subscribed catalogs
pub fn run_asset(game_path: Option<&Path>, asset_id: String) -> Result<()> {
    let config = Config::load()?;

    let spinner = super::new_spinner("Loading catalogs...");
    let catalog = load_subscribed(&config.catalog);
    spinner.finish_and_clear();
    let catalog = catalog?;

    let label = catalog
        .get_asset(&asset_id)
        .map(|a| a.label().to_string())
        .unwrap_or_else(|| asset_id.clone());
    println!("Downloading {}", label);
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    let installed = runtime.block_on(async {
        let context = load_context(game_path)?.with_downloads(Arc::new(HttpBackend::new()));
        let bar = new_download_bar();

        let result = context
            .download_asset(&catalog, &asset_id, |event| show_event(&bar, event))
            .await;

        if result.is_err() && !bar.is_finished() {
            bar.abandon();
        }
        anyhow::Ok(result?)
    })?;

    print_installed(&installed);
    Ok(())
}

fn new_download_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    bar
}

fn print_installed(installed: &Installed) {
    println!();
    match installed {
        Installed::Map(record) => {
            println!("✓ Installed map {}", record.label());
            println!("  Identity: {}", record.identity);
            println!("  Files:    {}", record.file_paths.len());
        }
        Installed::Texture(record) => {
            println!("✓ Installed texture pack {}", record.label());
            println!("  Files:    {}", record.file_paths.len());
        }
    }
    println!();
}

fn show_event(bar: &ProgressBar, event: &DownloadEvent) {
    match event {
        DownloadEvent::Started(_) => bar.set_message("starting"),
        DownloadEvent::Progress {
            received,
            total,
            speed_kbps,
        } => {
            if let Some(total) = total {
                bar.set_length(*total);
            }
            bar.set_position(*received);
            if *speed_kbps > 0.0 {
                bar.set_message(format!("{:.0} KB/s", speed_kbps));
            }
        }
        DownloadEvent::Completed(_) => bar.finish_with_message("✓ downloaded, installing..."),
        DownloadEvent::Failed(_) | DownloadEvent::Cancelled => bar.abandon(),
    }
}
