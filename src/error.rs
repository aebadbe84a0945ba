use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    PathInvalid(String),

    #[error("Failed to parse {0}")]
    ParseFailure(String),

    #[error("Patch failed: {0}")]
    PatchFailure(String),

    #[error("No tracked files are stored for '{0}'\n\n\
             Hint: This content was installed without a file list (or by an older tool),\n\
             so it cannot be removed automatically. Delete its files from the game's\n\
             Content folder manually.")]
    ManualCleanupRequired(String),

    #[error("Game installation not found{}\n\n\
             Hint: The game path must point at the folder that contains both\n\
             'Engine' and 'SessionGame/Content'.\n\n\
             Example structure:\n\
             Session/\n\
             ├── SessionGame/\n\
             │   └── Content/   ← maps and textures are installed here\n\
             └── Engine/\n\n\
             Solutions:\n\
             1. Pass the path explicitly: sessionmm --game-path \"/path/to/Session\" ...\n\
             2. Save it once: sessionmm config set-game-path \"/path/to/Session\"\n\
             3. Try auto-detection: sessionmm config detect",
             .0)]
    InvalidGamePath(String),

    #[error("{0}")]
    Other(String),
}
