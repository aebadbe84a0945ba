use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// SessionMM - Install and manage custom maps and textures for Session
#[derive(Parser)]
#[command(name = "sessionmm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Game installation folder (overrides the configured path)
    #[arg(long, global = true)]
    game_path: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a map from a folder or archive
    Install {
        /// Folder or .zip/.tar.gz archive containing the map
        path: PathBuf,

        /// Catalog asset id to record for this map
        #[arg(long)]
        asset_id: Option<String>,
    },

    /// Uninstall a map
    Uninstall {
        /// Map identity (see `sessionmm list`)
        identity: String,
    },

    /// List installed maps
    List {
        /// Include hidden maps
        #[arg(short, long)]
        all: bool,
    },

    /// Change the name a map is shown with
    Rename {
        identity: String,

        /// New display name
        name: String,
    },

    /// Hide a map from `list`
    Hide { identity: String },

    /// Show a hidden map again
    Unhide { identity: String },

    /// Manage texture packs
    Textures {
        #[command(subcommand)]
        action: TexturesAction,
    },

    /// Download an archive and install it
    Download {
        /// http(s) URL of the archive
        #[arg(required_unless_present = "asset")]
        url: Option<String>,

        /// Install a catalog asset by ID instead of a URL
        #[arg(long, conflicts_with_all = ["url", "texture", "asset_id", "name"])]
        asset: Option<String>,

        /// Install as a texture pack instead of a map
        #[arg(long)]
        texture: bool,

        /// Catalog asset id (defaults to the archive file name)
        #[arg(long, conflicts_with = "texture")]
        asset_id: Option<String>,

        /// Display name for a texture pack
        #[arg(long, requires = "texture")]
        name: Option<String>,
    },

    /// Browse and manage asset catalogs
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Read or change the placeable object count
    ObjectCount {
        #[command(subcommand)]
        action: ObjectCountAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum TexturesAction {
    /// List installed texture packs
    List,

    /// Install a texture pack from a folder or archive
    Install {
        path: PathBuf,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Uninstall a texture pack
    Uninstall {
        /// Asset name (see `sessionmm textures list`)
        asset: String,
    },
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// List assets from every subscribed catalog
    List {
        /// Only show this category (Maps, Decks, Griptapes, ...)
        #[arg(long)]
        category: Option<String>,
    },

    /// Subscribe to a catalog URL or file
    Add { url: String },

    /// Unsubscribe from a catalog
    Remove { url: String },
}

#[derive(Subcommand)]
pub enum ObjectCountAction {
    /// Show the current object count
    Get,

    /// Set the object count (1-65535)
    Set { count: String },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show configuration
    Show,

    /// Save the game installation folder
    SetGamePath { path: PathBuf },

    /// Look for the game in Steam libraries
    Detect {
        /// Save the detected path
        #[arg(long)]
        save: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("sessionmm=debug")
    } else {
        EnvFilter::try_from_env("SESSIONMM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let game_path = cli.game_path.as_deref();

    let result = match cli.command {
        Commands::Install { path, asset_id } => commands::install::run(game_path, path, asset_id),
        Commands::Uninstall { identity } => commands::uninstall::run(game_path, identity),
        Commands::List { all } => commands::list::run(game_path, all),
        Commands::Rename { identity, name } => commands::display::run_rename(game_path, identity, name),
        Commands::Hide { identity } => commands::display::run_hide(game_path, identity, true),
        Commands::Unhide { identity } => commands::display::run_hide(game_path, identity, false),
        Commands::Textures { action } => commands::textures::run(game_path, &action),
        Commands::Download {
            url,
            asset,
            texture,
            asset_id,
            name,
        } => match (url, asset) {
            (_, Some(asset)) => commands::download::run_asset(game_path, asset),
            (Some(url), None) => commands::download::run(game_path, url, texture, asset_id, name),
            (None, None) => Err(anyhow::anyhow!("Provide a URL or --asset <ID>")),
        },
        Commands::Catalog { action } => commands::catalog::run(&action),
        Commands::ObjectCount { action } => commands::object_count::run(game_path, &action),
        Commands::Config { action } => commands::config::run(&action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sessionmm", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
